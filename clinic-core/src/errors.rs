//! # Errors
//!
//! Every failure the console surfaces to the UI layer is one of a small,
//! closed set of classes. Core goals:
//! - one classification per failure, driven by the HTTP status
//! - can be carried through `anyhow::Error` (services, session, tenancy)
//! - validation payloads keep their per-field messages
//!
//! The backend error envelope looks like `{ "detail": "...", "<field>": ["..."] }`.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Error as AnyError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A convenience result type for the console APIs.
pub type ClinicResult<T> = std::result::Result<T, AnyError>;

/// Failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCredentials, // login rejected
    Unauthorized,       // 401
    Forbidden,          // 403
    NotFound,           // 404
    Validation,         // other 4xx
    ServerError,        // 5xx
    NetworkError,       // no response
}

impl ErrorKind {
    /// Canonical status for the class. `NetworkError` has none and reports 0.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidCredentials => 401,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 422,
            ErrorKind::ServerError => 500,
            ErrorKind::NetworkError => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "InvalidCredentials",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Validation => "Validation",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::NetworkError => "NetworkError",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "invalid-credentials",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Validation => "validation",
            ErrorKind::ServerError => "server-error",
            ErrorKind::NetworkError => "network-error",
        }
    }

    /// Classify a response status. Returns `None` for 2xx.
    ///
    /// Anything outside 2xx/4xx (an unfollowed 3xx, a 1xx) is treated
    /// as a server fault.
    pub fn from_status(status: u16) -> Option<ErrorKind> {
        match status {
            200..=299 => None,
            401 => Some(ErrorKind::Unauthorized),
            403 => Some(ErrorKind::Forbidden),
            404 => Some(ErrorKind::NotFound),
            400..=499 => Some(ErrorKind::Validation),
            _ => Some(ErrorKind::ServerError),
        }
    }
}

/// Per-field validation messages, keyed by field name.
///
/// Nested serializer errors are flattened to dotted keys (`address.city`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn collect(&mut self, prefix: &str, value: &Value) {
        match value {
            Value::String(s) => self.push(prefix, s.clone()),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => self.push(prefix, s.clone()),
                        Value::Object(_) => self.collect(prefix, item),
                        Value::Null => {}
                        other => self.push(prefix, other.to_string()),
                    }
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    self.collect(&key, v);
                }
            }
            Value::Null => {}
            other => self.push(prefix, other.to_string()),
        }
    }
}

/// Parsed backend error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub detail: Option<String>,
    pub field_errors: FieldErrors,
}

impl ErrorEnvelope {
    /// Parse `{ detail?: string, <field>: string[] }`.
    ///
    /// A bare string body becomes the detail; a bare array is kept under
    /// `non_field_errors`.
    pub fn parse(body: &Value) -> Self {
        let mut envelope = ErrorEnvelope::default();
        match body {
            Value::Object(map) => {
                for (k, v) in map {
                    if k == "detail" {
                        if let Value::String(s) = v {
                            envelope.detail = Some(s.clone());
                            continue;
                        }
                    }
                    envelope.field_errors.collect(k, v);
                }
            }
            Value::String(s) if !s.trim().is_empty() => envelope.detail = Some(s.clone()),
            Value::Array(_) => envelope.field_errors.collect("non_field_errors", body),
            _ => {}
        }
        envelope
    }

    /// Parse raw response bytes; anything that is not JSON is read as text.
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ErrorEnvelope::default();
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v) => Self::parse(&v),
            Err(_) => {
                let text = String::from_utf8_lossy(bytes).trim().to_string();
                ErrorEnvelope {
                    detail: (!text.is_empty()).then_some(text),
                    field_errors: FieldErrors::default(),
                }
            }
        }
    }
}

/// A structured console error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct ClinicError {
    pub kind: ErrorKind,
    pub message: String,
    /// Actual HTTP status when the error came from a response.
    pub status: Option<u16>,
    pub field_errors: FieldErrors,
    pub source: Option<AnyError>,
}

impl ClinicError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            field_errors: FieldErrors::default(),
            source: None,
        }
    }

    /// Build from a non-2xx response status and its parsed envelope.
    pub fn from_response(status: u16, envelope: ErrorEnvelope) -> Self {
        let kind = ErrorKind::from_status(status).unwrap_or(ErrorKind::ServerError);
        let message = envelope
            .detail
            .unwrap_or_else(|| default_message(kind).to_string());
        Self::new(kind, message)
            .with_status(status)
            .with_field_errors(envelope.field_errors)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_field_errors(mut self, errors: FieldErrors) -> Self {
        self.field_errors = errors;
        self
    }

    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors.push(field, message);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.status.unwrap_or_else(|| self.kind.status_code())
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Validation failures with field messages render next to their inputs;
    /// everything else renders as a single dismissible banner.
    pub fn is_field_level(&self) -> bool {
        self.kind == ErrorKind::Validation && !self.field_errors.is_empty()
    }

    /// Localisation key for the generic banner message of this error.
    pub fn banner_key(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidCredentials => "errors.invalid_credentials",
            ErrorKind::Unauthorized => "errors.session_expired",
            ErrorKind::Forbidden => "errors.forbidden",
            ErrorKind::NotFound => "errors.not_found",
            ErrorKind::Validation => "errors.validation",
            ErrorKind::ServerError => "errors.server",
            ErrorKind::NetworkError => "errors.network",
        }
    }

    /// Convert into `anyhow::Error` so it flows through service results.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Downcast an `anyhow::Error` to a `ClinicError` if possible.
    pub fn from_anyhow(err: &AnyError) -> Option<&ClinicError> {
        err.downcast_ref::<ClinicError>()
    }

    /// Error class of an `anyhow::Error`, if it carries a `ClinicError`.
    pub fn kind_of(err: &AnyError) -> Option<ErrorKind> {
        Self::from_anyhow(err).map(|e| e.kind)
    }

    /// Turn any error into a `ClinicError`, wrapping foreign errors as `ServerError`.
    pub fn normalize(err: AnyError) -> ClinicError {
        match err.downcast::<ClinicError>() {
            Ok(clinic) => clinic,
            Err(other) => ClinicError::new(ErrorKind::ServerError, other.to_string()).with_source(other),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });
        if !self.field_errors.is_empty() {
            base["errors"] = json!(self.field_errors);
        }
        base
    }

    // ---- Constructors ----

    pub fn invalid_credentials(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, msg)
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }
    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, msg)
    }
    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, msg)
    }
}

fn default_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidCredentials => "Invalid email or password",
        ErrorKind::Unauthorized => "Authentication credentials were not provided or have expired",
        ErrorKind::Forbidden => "You do not have permission to perform this action",
        ErrorKind::NotFound => "Not found",
        ErrorKind::Validation => "Invalid input",
        ErrorKind::ServerError => "Unexpected server error",
        ErrorKind::NetworkError => "Network unavailable",
    }
}

impl fmt::Display for ClinicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for ClinicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience helper for "bail with ClinicError".
#[macro_export]
macro_rules! bail_clinic {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::ClinicError::$ctor($msg).into_anyhow());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::ClinicError::$ctor(format!($fmt, $($arg)*)).into_anyhow());
    };
}
