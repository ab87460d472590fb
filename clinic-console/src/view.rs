//! Tag-and-discard for tenant-scoped data.
//!
//! A response carries the [`TenantScope`] its request was sent under. The
//! view installs it only while that scope is still current; an answer that
//! arrives after a tenant switch is dropped instead of overwriting what the
//! new tenant's view shows.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use clinic_core::TenantScope;
use clinic_http::ScopedResponse;
use parking_lot::RwLock;
use tracing::debug;

use crate::tenancy::TenantContext;

/// What [`TenantBoundView::apply`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Installed,
    Discarded,
}

#[derive(Debug, Clone)]
struct Displayed<T> {
    scope: TenantScope,
    value: T,
}

/// Data displayed for the current tenant.
pub struct TenantBoundView<T> {
    tenants: Arc<TenantContext>,
    slot: RwLock<Option<Displayed<T>>>,
}

impl<T: Clone> TenantBoundView<T> {
    pub fn new(tenants: Arc<TenantContext>) -> Self {
        Self {
            tenants,
            slot: RwLock::new(None),
        }
    }

    /// Install `response` unless the selection moved on since it was sent.
    pub fn apply(&self, response: ScopedResponse<T>) -> Applied {
        let current = self.tenants.scope();
        if !current.matches(&response.scope) {
            debug!(
                sent_under = response.scope.tenant_id().unwrap_or("-"),
                sent_epoch = response.scope.epoch,
                current = current.tenant_id().unwrap_or("-"),
                current_epoch = current.epoch,
                "discarding stale response"
            );
            return Applied::Discarded;
        }

        *self.slot.write() = Some(Displayed {
            scope: response.scope,
            value: response.value,
        });
        Applied::Installed
    }

    /// Await `fetch` and apply its result. Errors leave the view untouched.
    pub async fn refresh<F>(&self, fetch: F) -> Result<Applied>
    where
        F: Future<Output = Result<ScopedResponse<T>>>,
    {
        let response = fetch.await?;
        Ok(self.apply(response))
    }

    pub fn get(&self) -> Option<T> {
        self.slot.read().as_ref().map(|d| d.value.clone())
    }

    /// Scope of the displayed value.
    pub fn scope(&self) -> Option<TenantScope> {
        self.slot.read().as_ref().map(|d| d.scope.clone())
    }

    /// True when something is displayed that belongs to an older selection.
    pub fn is_stale(&self) -> bool {
        self.slot
            .read()
            .as_ref()
            .is_some_and(|d| !self.tenants.is_current(&d.scope))
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}
