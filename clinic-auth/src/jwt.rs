// Bearer token helpers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use clinic_core::Credential;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use serde_json::Value;

/// Authorization schemes accepted when a backend hands the token back in a
/// header instead of the body.
pub const TOKEN_SCHEMES: [&str; 3] = ["Bearer", "Token", "JWT"];

/// Pull the token out of `Authorization: <scheme> <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = v.split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    TOKEN_SCHEMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme.trim()))
        .then(|| token.to_string())
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// The backend is the authority on validity; this only lets the console
/// drop a session it already knows is dead. Opaque tokens yield `None`.
pub fn jwt_expiry(token: &Credential) -> Option<DateTime<Utc>> {
    let mut parts = token.secret().split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
