//! Request body normalization.
//!
//! Depending on how the sink is hosted, the metrics JSON arrives either as
//! the request body itself or base64-encoded under the `__ow_body` field of
//! an outer JSON object. Both shapes are reduced to the same JSON object
//! here, before anything looks at the fields.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::SinkError;

/// Envelope field that carries a base64-encoded body.
pub const WRAPPED_BODY_FIELD: &str = "__ow_body";

/// Standard alphabet, padding optional. Senders differ on whether they pad.
const WRAPPED_BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a raw request body into the metrics JSON object.
///
/// An empty body is treated as `{}` so that it is refused for its missing
/// fields rather than as undecodable.
pub fn normalize(body: &[u8]) -> Result<Value, SinkError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let outer: Value = serde_json::from_slice(body)
        .map_err(|e| SinkError::Decode(format!("body is not valid JSON: {e}")))?;

    let payload = match outer.get(WRAPPED_BODY_FIELD) {
        Some(Value::String(encoded)) => unwrap_base64(encoded)?,
        _ => outer,
    };

    if !payload.is_object() {
        return Err(SinkError::Decode(
            "metrics payload must be a JSON object".into(),
        ));
    }
    Ok(payload)
}

/// Line breaks and other ASCII whitespace inside the encoded text are
/// ignored, as MIME-style encoders wrap long output.
fn unwrap_base64(encoded: &str) -> Result<Value, SinkError> {
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = WRAPPED_BODY_ENGINE.decode(&compact).map_err(|e| {
        SinkError::Decode(format!("{WRAPPED_BODY_FIELD} is not valid base64: {e}"))
    })?;
    serde_json::from_slice(&raw).map_err(|e| {
        SinkError::Decode(format!("{WRAPPED_BODY_FIELD} does not hold valid JSON: {e}"))
    })
}
