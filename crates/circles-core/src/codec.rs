//! JSON text framing for the presence connection.
//!
//! Wire format: one JSON object per WebSocket text message.

use crate::error::{CircleError, CircleResult};
use crate::messages::RawFrame;
use serde_json::Value;

/// Encode a serializable value into a single text frame.
pub fn encode_frame<T: serde::Serialize>(value: &T) -> CircleResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a text frame into a typed value (used by clients and tests).
pub fn decode_frame<T: serde::de::DeserializeOwned>(text: &str) -> CircleResult<T> {
    Ok(serde_json::from_str(text)?)
}

/// Split an inbound text frame into its `type` tag and remaining fields.
///
/// Fails when the text is not JSON, is not an object, or has no string
/// `type`. No other field is inspected.
pub fn parse_envelope(text: &str) -> CircleResult<RawFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| CircleError::protocol("payload", "Invalid JSON format"))?;

    let Value::Object(mut fields) = value else {
        return Err(CircleError::protocol("payload", "Invalid message format"));
    };

    match fields.remove("type") {
        Some(Value::String(kind)) => Ok(RawFrame { kind, fields }),
        _ => Err(CircleError::protocol("type", "Message type must be string")),
    }
}
