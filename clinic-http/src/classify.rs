//! Response classification.

use clinic_core::{ClinicError, ErrorEnvelope};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Classify a received response. `None` means success.
pub fn classify_status(status: StatusCode, body: &[u8]) -> Option<ClinicError> {
    if status.is_success() {
        return None;
    }
    Some(ClinicError::from_response(status.as_u16(), ErrorEnvelope::parse_bytes(body)))
}

/// No (complete) response was received.
pub fn classify_transport(err: reqwest::Error) -> ClinicError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "could not connect to the backend".to_string()
    } else {
        format!("request failed: {err}")
    };
    ClinicError::network_error(message).with_source(err.into())
}

/// Decode a 2xx body. An empty body decodes as JSON `null`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClinicError> {
    let decoded = if body.is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(body)
    };
    decoded.map_err(|e| {
        ClinicError::server_error(format!("undecodable response body: {e}")).with_source(e.into())
    })
}
