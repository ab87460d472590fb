//! Pre-send and post-receive hooks.
//!
//! Request hooks run in registration order before a call leaves; response
//! hooks see every classified failure. Explicit per-call headers are merged
//! last, after all request hooks, so they always win.

use anyhow::{anyhow, Result};
use clinic_core::{ClinicError, ErrorKind, ExtraHeaders, TenantOverride};
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use tracing::warn;

use crate::request::ScopedRequest;
use crate::scope::ScopeSource;

pub trait RequestHook: Send + Sync {
    fn before_send(&self, req: &mut ScopedRequest, source: &dyn ScopeSource) -> Result<()>;
}

pub trait ResponseHook: Send + Sync {
    fn on_failure(&self, req: &ScopedRequest, err: &ClinicError, source: &dyn ScopeSource);
}

/// Attaches `Authorization: Bearer <token>`.
///
/// A non-anonymous call with no credential is flagged in the log but still
/// sent; the backend decides what it may see.
#[derive(Debug, Default, Clone, Copy)]
pub struct BearerAuth;

impl RequestHook for BearerAuth {
    fn before_send(&self, req: &mut ScopedRequest, source: &dyn ScopeSource) -> Result<()> {
        if req.anonymous {
            return Ok(());
        }

        match source.credential() {
            Some(token) if !token.is_blank() => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
                    .map_err(|_| anyhow!("credential contains characters not allowed in a header"))?;
                value.set_sensitive(true);
                req.headers.insert(AUTHORIZATION, value);
            }
            _ => {
                warn!(
                    unauthenticated_request = true,
                    method = %req.method,
                    path = %req.path,
                    "sending request without a bearer credential"
                );
            }
        }
        Ok(())
    }
}

/// Attaches the tenant header when a tenant is selected.
#[derive(Debug, Clone)]
pub struct TenantScoping {
    header: HeaderName,
}

impl TenantScoping {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl RequestHook for TenantScoping {
    fn before_send(&self, req: &mut ScopedRequest, _source: &dyn ScopeSource) -> Result<()> {
        if req.anonymous {
            return Ok(());
        }
        if let Some(tenant) = &req.scope.tenant {
            let value = HeaderValue::from_str(tenant.as_str())
                .map_err(|_| anyhow!("tenant id {tenant} is not a valid header value"))?;
            req.headers.insert(self.header.clone(), value);
        }
        Ok(())
    }
}

/// A rejected credential clears the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpireSessionOnUnauthorized;

impl ResponseHook for ExpireSessionOnUnauthorized {
    fn on_failure(&self, req: &ScopedRequest, err: &ClinicError, source: &dyn ScopeSource) {
        if err.kind == ErrorKind::Unauthorized && !req.anonymous {
            warn!(method = %req.method, path = %req.path, "credential rejected, clearing session");
            source.on_unauthorized();
        }
    }
}

/// Merge caller-supplied headers over the context-derived ones.
///
/// Precedence: explicit > context-derived > none. A tenant override replaces
/// (or removes) the tenant header; other explicit headers replace every
/// value of the same name.
pub fn merge_explicit_headers(req: &mut ScopedRequest, extra: &ExtraHeaders, tenant_header: &HeaderName) -> Result<()> {
    match &extra.tenant {
        Some(TenantOverride::Use(tenant)) => {
            let value = HeaderValue::from_str(tenant.as_str())
                .map_err(|_| anyhow!("tenant id {tenant} is not a valid header value"))?;
            req.headers.insert(tenant_header.clone(), value);
        }
        Some(TenantOverride::Omit) => {
            req.headers.remove(tenant_header);
        }
        None => {}
    }

    for name in extra.headers.keys() {
        req.headers.remove(name);
    }
    for (name, value) in extra.headers.iter() {
        req.headers.append(name.clone(), value.clone());
    }
    Ok(())
}
