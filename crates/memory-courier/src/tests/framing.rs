//! Request framing tests.

use super::harness::{
    accepted, sacred_zero_record, standard_record, status, submitter, MockTransport, DESTINATION,
};
use crate::submitter::{FRAMEWORK_TAG, MEMORY_TYPE_HEADER, PROTOCOL_VERSION, VERSION_HEADER};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn sacred_zero_headers_and_body() {
    let transport = MockTransport::always(Ok(accepted("sz-1")));
    let record = sacred_zero_record();

    submitter(transport.clone(), 3)
        .submit(&record, DESTINATION)
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let request = &sent[0].request;
    assert_eq!(request.url.as_str(), DESTINATION);
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header(VERSION_HEADER), Some(PROTOCOL_VERSION));
    assert_eq!(request.header(MEMORY_TYPE_HEADER), Some("sacred-zero"));

    let body = sent[0].json_body();
    assert_eq!(body["framework"], FRAMEWORK_TAG);
    assert_eq!(body["classification"], 0);
    assert_eq!(body["trigger"], "planetary_harm");
    assert_eq!(body["requires_human_review"], true);
    assert_eq!(
        body["context_fingerprint"],
        record.context_fingerprint().unwrap()
    );
    assert_eq!(body["payload"]["action"], "FIRE_LASER");
    assert!(body["timestamp"].is_string());
}

#[tokio::test(start_paused = true)]
async fn standard_headers_and_body() {
    let transport = MockTransport::always(Ok(accepted("std-1")));

    submitter(transport.clone(), 3)
        .submit(&standard_record(), DESTINATION)
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].request.header("x-memory-type"), Some("standard"));

    let body = sent[0].json_body();
    assert_eq!(body["classification"], 1);
    assert_eq!(body["requires_human_review"], false);
    assert!(body.get("trigger").is_none());
    assert!(body.get("context_fingerprint").is_none());
    assert_eq!(
        body["payload"],
        json!({"action": "text_generation", "input_hash": "abc123", "output_hash": "def456"})
    );
}

#[tokio::test(start_paused = true)]
async fn retries_send_identical_requests() {
    let transport = MockTransport::scripted(vec![Ok(status(500)), Ok(status(503))]);
    let record = sacred_zero_record();

    submitter(transport.clone(), 3)
        .submit(&record, DESTINATION)
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    for later in &sent[1..] {
        assert_eq!(later.request.body, sent[0].request.body);
        assert_eq!(later.request.headers, sent[0].request.headers);
    }
}

#[tokio::test(start_paused = true)]
async fn submission_leaves_record_unchanged() {
    let transport = MockTransport::scripted(vec![Ok(status(500))]);
    let record = sacred_zero_record();
    let before = record.clone();

    submitter(transport.clone(), 3)
        .submit(&record, DESTINATION)
        .await
        .unwrap();

    assert_eq!(record, before);
    assert!(record.requires_human_review());
    assert_eq!(record.trigger(), Some("planetary_harm"));
}
