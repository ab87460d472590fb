use anyhow::{anyhow, Result};
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Standard resource methods.
///
/// Custom endpoints are declared via `Custom("name")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceMethodKind {
    List,
    Get,
    Create,
    Update,
    Patch,
    Remove,
    Custom(&'static str),
}

/// Which methods a resource supports on the backend.
#[derive(Debug, Clone)]
pub struct ServiceCapabilities {
    pub allowed_methods: Vec<ServiceMethodKind>,
}

impl ServiceCapabilities {
    /// Full CRUD.
    pub fn standard_crud() -> Self {
        use ServiceMethodKind::*;
        Self {
            allowed_methods: vec![List, Get, Create, Update, Patch, Remove],
        }
    }

    /// `list` and `get` only.
    pub fn read_only() -> Self {
        use ServiceMethodKind::*;
        Self {
            allowed_methods: vec![List, Get],
        }
    }

    pub fn from_methods(methods: Vec<ServiceMethodKind>) -> Self {
        Self {
            allowed_methods: methods,
        }
    }

    pub fn allows(&self, method: &ServiceMethodKind) -> bool {
        self.allowed_methods.contains(method)
    }
}

/// Query parameters for `list` (filters, search, ordering, paging).
///
/// Order is preserved; the same key may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pairs: Vec<(String, String)>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn search(self, term: impl Into<String>) -> Self {
        self.filter("search", term)
    }

    pub fn ordering(self, field: impl Into<String>) -> Self {
        self.filter("ordering", field)
    }

    pub fn page(self, page: u32) -> Self {
        self.filter("page", page.to_string())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// How a call wants the tenant header handled, overriding the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantOverride {
    /// Scope this call to the given tenant.
    Use(TenantId),
    /// Send no tenant header at all.
    Omit,
}

/// Headers supplied explicitly by a caller.
///
/// Precedence when a request is built: explicit > context-derived > none.
#[derive(Debug, Clone, Default)]
pub struct ExtraHeaders {
    pub tenant: Option<TenantOverride>,
    pub headers: HeaderMap,
}

impl ExtraHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Act on `tenant` for this call regardless of the current selection.
    pub fn tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = Some(TenantOverride::Use(tenant.into()));
        self
    }

    /// Drop the tenant header for this call.
    pub fn without_tenant(mut self) -> Self {
        self.tenant = Some(TenantOverride::Omit);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Like [`Self::header`], validating string input.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| anyhow!("invalid header name {name:?}: {e}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| anyhow!("invalid value for header {name}: {e}"))?;
        Ok(self.header(name, value))
    }

    pub fn is_empty(&self) -> bool {
        self.tenant.is_none() && self.headers.is_empty()
    }
}

/// A paginated envelope: `{ count, next, previous, results }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<R> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<R>,
}

/// The body of a `list` call, exactly as the backend sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<R> {
    Items(Vec<R>),
    Page(Page<R>),
}

impl<R> Listing<R> {
    pub fn items(&self) -> &[R] {
        match self {
            Listing::Items(items) => items,
            Listing::Page(page) => &page.results,
        }
    }

    pub fn into_items(self) -> Vec<R> {
        match self {
            Listing::Items(items) => items,
            Listing::Page(page) => page.results,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Total count across all pages when the backend reports it.
    pub fn total(&self) -> usize {
        match self {
            Listing::Items(items) => items.len(),
            Listing::Page(page) => page
                .count
                .map(|c| c as usize)
                .unwrap_or(page.results.len()),
        }
    }

    /// Link to the next page, if any.
    pub fn next(&self) -> Option<&str> {
        match self {
            Listing::Items(_) => None,
            Listing::Page(page) => page.next.as_deref(),
        }
    }
}

/// Per-resource request builder on top of the scoped client:
///
/// - `list`   → query many
/// - `get`    → fetch one by id
/// - `create` → create one
/// - `update` → full replace
/// - `remove` → delete one
///
/// All methods default to "Method not implemented", so a service
/// overrides only what its backend resource supports. `extra` lets a caller
/// override the tenant header for one call.
#[async_trait]
pub trait ResourceService<R>: Send + Sync
where
    R: Send + 'static,
{
    /// Resource name, e.g. `"patients"`.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities::standard_crud()
    }

    async fn list(&self, _params: ListParams, _extra: ExtraHeaders) -> Result<Listing<R>> {
        Err(anyhow!("Method not implemented: list"))
    }

    async fn get(&self, _id: &str, _extra: ExtraHeaders) -> Result<R> {
        Err(anyhow!("Method not implemented: get"))
    }

    async fn create(&self, _payload: R, _extra: ExtraHeaders) -> Result<R> {
        Err(anyhow!("Method not implemented: create"))
    }

    async fn update(&self, _id: &str, _payload: R, _extra: ExtraHeaders) -> Result<R> {
        Err(anyhow!("Method not implemented: update"))
    }

    /// Returns the deleted record when the backend echoes one, else `None`.
    async fn remove(&self, _id: &str, _extra: ExtraHeaders) -> Result<Option<R>> {
        Err(anyhow!("Method not implemented: remove"))
    }
}
