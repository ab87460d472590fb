//! # Tenant context
//!
//! Holds the accounts the signed-in user may act on and which one is
//! current. Invariants:
//! - the selection is always a member of the last fetched list, or empty
//! - a non-empty list with no valid selection selects its first entry
//! - every change of the selection bumps the epoch, so responses fetched
//!   under an older selection can be recognised and dropped
//!
//! The selected id is persisted and revalidated on every load. A load whose
//! answer arrives after `reset` or `clear_tenant` (logout, another user
//! signing in, a rejected credential) is dropped.

use std::sync::Arc;

use anyhow::Result;
use clinic_core::errors::ClinicError;
use clinic_core::storage::{DurableStorage, ACCOUNT_KEY};
use clinic_core::{ExtraHeaders, Listing, Tenant, TenantId, TenantScope, UserIdentity};
use clinic_http::{RequestOptions, ScopedClient};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TenancyState {
    tenants: Vec<Tenant>,
    selected: Option<TenantId>,
    epoch: u64,
    /// Bumped whenever the state is torn down; loads started under an older
    /// generation are not applied.
    generation: u64,
}

impl TenancyState {
    fn scope(&self) -> TenantScope {
        TenantScope::new(self.selected.clone(), self.epoch)
    }
}

pub struct TenantContext {
    storage: Arc<dyn DurableStorage>,
    state: RwLock<TenancyState>,
    selection: watch::Sender<TenantScope>,
}

impl TenantContext {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        let (selection, _) = watch::channel(TenantScope::default());
        Self {
            storage,
            state: RwLock::new(TenancyState::default()),
            selection,
        }
    }

    /// Tenants from the last successful load, in backend order.
    pub fn tenants(&self) -> Vec<Tenant> {
        self.state.read().tenants.clone()
    }

    pub fn selected(&self) -> Option<Tenant> {
        let state = self.state.read();
        let id = state.selected.as_ref()?;
        state.tenants.iter().find(|t| &t.id == id).cloned()
    }

    pub fn selected_id(&self) -> Option<TenantId> {
        self.state.read().selected.clone()
    }

    /// Current selection and its epoch.
    pub fn scope(&self) -> TenantScope {
        self.state.read().scope()
    }

    /// Was `scope` captured from the selection that is current now?
    pub fn is_current(&self, scope: &TenantScope) -> bool {
        self.scope().matches(scope)
    }

    pub fn subscribe(&self) -> watch::Receiver<TenantScope> {
        self.selection.subscribe()
    }

    /// Fetch the tenants visible to `user` and resolve the selection.
    ///
    /// Staff identities get an empty list; their cross-account access runs
    /// through a separate flow. On failure the list and the selection are
    /// cleared (the persisted id is kept for the next successful load) and
    /// the classified error is returned.
    pub async fn load_tenants(&self, client: &ScopedClient, user: &UserIdentity) -> Result<Vec<Tenant>> {
        if user.is_staff {
            info!(user_id = %user.id, "staff identity, tenant list left empty");
            self.reset();
            return Ok(Vec::new());
        }

        let generation = self.state.read().generation;
        let path = client.options().tenants_path.clone();
        let res = client
            .get_json::<Listing<Tenant>>(
                &path,
                RequestOptions::new().with_extra(ExtraHeaders::new().without_tenant()),
            )
            .await;

        let mut state = self.state.write();
        if state.generation != generation {
            debug!(
                started = generation,
                current = state.generation,
                "discarding tenant list fetched for a previous session"
            );
            return Ok(state.tenants.clone());
        }

        let tenants = match res {
            Ok(res) => res.value.into_items(),
            Err(e) => {
                warn!(error = %e, "failed to load tenants");
                Self::teardown(&mut state);
                self.select(&mut state, None, false);
                return Err(e);
            }
        };

        let persisted = self
            .storage
            .get(ACCOUNT_KEY)
            .filter(|id| !id.trim().is_empty())
            .map(TenantId::from);

        let candidate = state.selected.clone().or(persisted);
        let next = candidate
            .filter(|id| tenants.iter().any(|t| &t.id == id))
            .or_else(|| tenants.first().map(|t| t.id.clone()));

        state.tenants = tenants.clone();
        self.select(&mut state, next, false);
        self.persist(state.selected.as_ref());

        info!(
            count = tenants.len(),
            selected = state.selected.as_ref().map(|t| t.as_str()).unwrap_or("-"),
            "tenants loaded"
        );
        Ok(tenants)
    }

    /// Make `id` the current tenant. It must be in the current list.
    ///
    /// No backend call: only local state and the scoping of later requests
    /// change.
    pub fn switch_tenant(&self, id: &TenantId) -> Result<Tenant> {
        let mut state = self.state.write();
        let Some(tenant) = state.tenants.iter().find(|t| &t.id == id).cloned() else {
            return Err(ClinicError::validation(format!("account {id} is not available"))
                .with_field_error("account", "Select a valid account.")
                .into_anyhow());
        };

        self.select(&mut state, Some(id.clone()), true);
        self.persist(Some(id));
        info!(tenant = %id, epoch = state.epoch, "switched tenant");
        Ok(tenant)
    }

    /// Drop the selection and its persisted id.
    pub fn clear_tenant(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        self.select(&mut state, None, true);
        self.persist(None);
        debug!(epoch = state.epoch, "tenant selection cleared");
    }

    /// Forget the list and the selection in memory.
    pub fn reset(&self) {
        let mut state = self.state.write();
        Self::teardown(&mut state);
        self.select(&mut state, None, false);
    }

    fn teardown(state: &mut TenancyState) {
        state.tenants.clear();
        state.generation += 1;
    }

    fn select(&self, state: &mut TenancyState, next: Option<TenantId>, always_bump: bool) {
        if !always_bump && state.selected == next {
            return;
        }
        state.selected = next;
        state.epoch += 1;
        self.selection.send_replace(state.scope());
    }

    fn persist(&self, id: Option<&TenantId>) {
        let res = match id {
            Some(id) => self.storage.set(ACCOUNT_KEY, id.as_str()),
            None => self.storage.remove(ACCOUNT_KEY),
        };
        if let Err(e) = res {
            warn!(error = %e, "failed to persist tenant selection");
        }
    }
}
