//! Read-only view of the session credential and tenant selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use clinic_core::{Credential, TenantId, TenantScope};
use parking_lot::RwLock;

/// Where the client reads the credential and the current tenant selection.
///
/// Implementations own the state; the client never mutates it directly.
/// `on_unauthorized` is the one side effect the client may trigger: the
/// backend rejected the credential and the session must be cleared.
pub trait ScopeSource: Send + Sync {
    fn credential(&self) -> Option<Credential>;
    fn tenant_scope(&self) -> TenantScope;
    fn on_unauthorized(&self);
}

/// A settable source for tools and tests.
///
/// `on_unauthorized` drops the credential and counts how often it fired.
#[derive(Debug, Default)]
pub struct StaticScope {
    credential: RwLock<Option<Credential>>,
    scope: RwLock<TenantScope>,
    unauthorized: AtomicUsize,
}

impl StaticScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(self, token: impl Into<String>) -> Self {
        *self.credential.write() = Some(Credential::new(token));
        self
    }

    pub fn with_tenant(self, tenant: impl Into<TenantId>) -> Self {
        self.select(Some(tenant.into()));
        self
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.write() = credential;
    }

    /// Change the selection, bumping the epoch.
    pub fn select(&self, tenant: Option<TenantId>) {
        let mut scope = self.scope.write();
        let epoch = scope.epoch + 1;
        *scope = TenantScope::new(tenant, epoch);
    }

    pub fn unauthorized_count(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }
}

impl ScopeSource for StaticScope {
    fn credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    fn tenant_scope(&self) -> TenantScope {
        self.scope.read().clone()
    }

    fn on_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::SeqCst);
        *self.credential.write() = None;
    }
}
