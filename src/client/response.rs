//! Decoding of successful (2xx) response bodies

use serde_json::{Map, Value};

use super::error::{ApiError, STATUS_UNKNOWN, extract_message};
use crate::locale::Locale;

/// Parse a 2xx body and strip the `{success, data}` envelope when present
///
/// - empty body: `null`
/// - `{"success": true, "data": X}`: `X`
/// - `{"success": false, ...}`: an error, message taken from the usual fields
/// - anything else: returned unchanged
pub fn decode_success(endpoint: &str, body: &[u8], locale: Locale) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::unexpected(endpoint, e, locale))?;

    match value {
        Value::Object(map) => unwrap_envelope(map, locale),
        other => Ok(other),
    }
}

fn unwrap_envelope(mut map: Map<String, Value>, locale: Locale) -> Result<Value, ApiError> {
    match map.get("success").and_then(Value::as_bool) {
        Some(true) if map.contains_key("data") => Ok(map.remove("data").unwrap_or(Value::Null)),
        Some(false) => {
            let payload = Value::Object(map);
            let message =
                extract_message(&payload).unwrap_or_else(|| locale.request_failed(STATUS_UNKNOWN));
            Err(ApiError::new(STATUS_UNKNOWN, payload, message))
        }
        _ => Ok(Value::Object(map)),
    }
}
