//! Test harness for courier integration tests.
//!
//! Provides:
//! - MockTransport: a scripted [`DeliveryTransport`] that records every request
//! - ScriptedHttpServer: a one-request-per-connection HTTP/1.1 responder
//! - Record and submitter builders

use crate::classifier::Classification;
use crate::error::DeliveryError;
use crate::record::Record;
use crate::submitter::{RetryPolicy, Submitter};
use crate::transport::{DeliveryTransport, TransportRequest, TransportResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DESTINATION: &str = "https://council.test/v1/memories";

type Reply = Result<TransportResponse, DeliveryError>;
type Responder = Box<dyn Fn(&TransportRequest) -> Reply + Send + Sync>;

/// A request seen by the mock transport.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub request: TransportRequest,
    pub sent_at: Instant,
}

impl SentRequest {
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.request.body).unwrap()
    }
}

/// Scripted transport.
///
/// Replies come from the queue first, then from the responder.
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    responder: Responder,
    sent: Mutex<Vec<SentRequest>>,
}

impl MockTransport {
    /// Transport that answers every request with `reply` once the queue is empty.
    pub fn always(reply: Reply) -> Arc<Self> {
        Self::with_responder(move |_| reply.clone())
    }

    /// Transport that computes each reply from the request.
    pub fn with_responder(
        responder: impl Fn(&TransportRequest) -> Reply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Transport that plays `replies` in order, then keeps accepting.
    pub fn scripted(replies: Vec<Reply>) -> Arc<Self> {
        let transport = Self::always(Ok(accepted("fallback")));
        transport.script.lock().unwrap().extend(replies);
        transport
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Time between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        self.sent
            .lock()
            .unwrap()
            .windows(2)
            .map(|pair| pair[1].sent_at.duration_since(pair[0].sent_at))
            .collect()
    }
}

#[async_trait]
impl DeliveryTransport for MockTransport {
    async fn post(&self, request: TransportRequest) -> Reply {
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (self.responder)(&request));

        self.sent.lock().unwrap().push(SentRequest {
            request,
            sent_at: Instant::now(),
        });

        reply
    }
}

/// 200 with `{"memory_id": id}`.
pub fn accepted(id: &str) -> TransportResponse {
    TransportResponse::new(200).with_body(json!({ "memory_id": id }).to_string())
}

/// 429, optionally with a `Retry-After` header.
pub fn rate_limited(retry_after: Option<&str>) -> TransportResponse {
    let response = TransportResponse::new(429);
    match retry_after {
        Some(value) => response.with_header("Retry-After", value),
        None => response,
    }
}

pub fn status(code: u16) -> TransportResponse {
    TransportResponse::new(code).with_body(format!("status {}", code))
}

pub fn standard_record() -> Record {
    Record::builder(Classification::Standard)
        .payload(json!({
            "action": "text_generation",
            "input_hash": "abc123",
            "output_hash": "def456"
        }))
        .build()
}

pub fn sacred_zero_record() -> Record {
    Record::builder(Classification::SacredZero {
        trigger: "planetary_harm".to_string(),
    })
    .payload(json!({"action": "FIRE_LASER", "target": "UNKNOWN_OBJECT"}))
    .context(&json!({"sector": 7, "confidence": 0.1}))
    .unwrap()
    .build()
}

pub fn submitter(transport: Arc<MockTransport>, max_attempts: u32) -> Submitter {
    Submitter::new(transport, RetryPolicy::with_max_attempts(max_attempts)).unwrap()
}

/// A request received by [`ScriptedHttpServer`].
#[derive(Debug, Clone)]
pub struct ReceivedHttpRequest {
    pub request_line: String,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Minimal HTTP/1.1 server that answers each connection with the next
/// scripted raw response (repeating the last one when the script runs out).
pub struct ScriptedHttpServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedHttpRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedHttpServer {
    pub async fn start(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "server needs at least one response");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let handle = tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };

                if let Some(request) = read_request(&mut stream).await {
                    log.lock().unwrap().push(request);
                }

                let response = &responses[served.min(responses.len() - 1)];
                served += 1;

                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            received,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/memories", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedHttpRequest> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for ScriptedHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build a raw HTTP/1.1 response that closes the connection.
pub fn http_response(status: u16, reason: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut raw = format!("HTTP/1.1 {} {}\r\n", status, reason);
    for (name, value) in headers {
        raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
    raw.push_str("Connection: close\r\n\r\n");
    raw.push_str(body);
    raw
}

async fn read_request(stream: &mut TcpStream) -> Option<ReceivedHttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_end = buf.len().min(body_start + content_length);
    Some(ReceivedHttpRequest {
        request_line,
        headers,
        body: buf[body_start..body_end].to_vec(),
    })
}
