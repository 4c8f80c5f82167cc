//! Payload decoding.
//!
//! Devices publish either a bare JSON scalar (`21.5`, `true`, `"open"`) or an
//! envelope object whose `value` member holds the scalar, possibly wrapped in
//! further envelopes. Both decode to the same [`FieldValue`].

use crate::core::{FieldValue, HomeMetricsError, Result};
use serde_json::Value;

const VALUE_MEMBER: &str = "value";

/// Decode a raw payload.
///
/// `Ok(None)` means "no value present" (empty payload, JSON `null`, or an
/// envelope without a `value` member). Malformed JSON at any level is an
/// error and the message should be dropped.
pub fn decode_value(payload: &[u8]) -> Result<Option<FieldValue>> {
    let payload = payload.trim_ascii_start();
    if payload.is_empty() {
        return Ok(None);
    }

    let parsed: Value = serde_json::from_slice(payload)
        .map_err(|e| HomeMetricsError::decode(format!("invalid JSON payload: {e}")))?;

    match payload[0] {
        b'{' | b'[' => unwrap_envelope(parsed),
        _ => scalar(parsed),
    }
}

fn unwrap_envelope(envelope: Value) -> Result<Option<FieldValue>> {
    match envelope {
        Value::Object(mut members) => match members.remove(VALUE_MEMBER) {
            None => Ok(None),
            Some(inner @ (Value::Object(_) | Value::Array(_))) => unwrap_envelope(inner),
            Some(inner) => scalar(inner),
        },
        Value::Array(_) => Err(HomeMetricsError::decode(
            "array payload is not a value envelope",
        )),
        other => scalar(other),
    }
}

fn scalar(value: Value) -> Result<Option<FieldValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(FieldValue::Bool(b))),
        Value::Number(n) => n
            .as_f64()
            .map(|n| Some(FieldValue::Number(n)))
            .ok_or_else(|| HomeMetricsError::decode(format!("number {n} is out of range"))),
        Value::String(s) => Ok(Some(FieldValue::Text(s))),
        Value::Object(_) | Value::Array(_) => {
            Err(HomeMetricsError::decode("expected a scalar value"))
        }
    }
}
