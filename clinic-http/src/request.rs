use clinic_core::{ExtraHeaders, ListParams, TenantScope};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub params: ListParams,
    pub extra: ExtraHeaders,
    /// Skip the credential and tenant hooks, and never clear the session on
    /// a 401. Login and pre-session calls use this.
    pub anonymous: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: ListParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_extra(mut self, extra: ExtraHeaders) -> Self {
        self.extra = extra;
        self
    }
}

/// An outgoing call after the pre-send pipeline ran.
///
/// `scope` is the tenant selection captured at dispatch; it travels back on
/// the response so late answers for an old selection can be discarded.
#[derive(Debug, Clone)]
pub struct ScopedRequest {
    pub method: Method,
    pub path: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub scope: TenantScope,
    pub anonymous: bool,
}

/// A successful response, tagged with the scope its request was sent under.
#[derive(Debug, Clone)]
pub struct ScopedResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub scope: TenantScope,
}

impl<T> ScopedResponse<T> {
    pub fn map<U, F>(self, f: F) -> ScopedResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        ScopedResponse {
            value: f(self.value),
            status: self.status,
            headers: self.headers,
            scope: self.scope,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
