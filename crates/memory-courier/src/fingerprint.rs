//! Context fingerprints.
//!
//! A fingerprint is a short correlation id derived from arbitrary context
//! data. The context is serialized to JSON with object keys sorted at every
//! level, hashed with SHA-256, and the URL-safe base64 digest is cut to
//! [`FINGERPRINT_LEN`] characters. Two structurally equal contexts always
//! produce the same fingerprint, regardless of member order.
//!
//! This is not an integrity check: truncation gives up collision resistance.

use crate::error::{CourierError, CourierResult};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of every fingerprint, in characters.
pub const FINGERPRINT_LEN: usize = 16;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Compute the fingerprint of a context value.
///
/// Fails with [`CourierError::Unserializable`] when the value has no JSON
/// representation (non-string map keys, a failing `Serialize` impl).
pub fn fingerprint<T: Serialize + ?Sized>(context: &T) -> CourierResult<String> {
    let value =
        serde_json::to_value(context).map_err(|e| CourierError::Unserializable(e.to_string()))?;

    let canonical = canonical_json(&value)?;
    let digest = Sha256::digest(canonical.as_bytes());

    let mut encoded = BASE64.encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    Ok(encoded)
}

/// Encode a JSON value compactly with object keys in sorted order.
pub fn canonical_json(value: &Value) -> CourierResult<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> CourierResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_scalar(&Value::String(key.clone()))?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&encode_scalar(scalar)?),
    }
    Ok(())
}

fn encode_scalar(value: &Value) -> CourierResult<String> {
    serde_json::to_string(value).map_err(|e| CourierError::Unserializable(e.to_string()))
}
