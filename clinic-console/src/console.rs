use std::sync::Arc;

use anyhow::Result;
use clinic_auth::SessionState;
use clinic_core::errors::ClinicError;
use clinic_core::storage::{DurableStorage, FileStorage, MemoryStorage};
use clinic_core::{ClientOptions, ClinicConfig, Credential, Tenant, TenantId, TenantScope, UserIdentity};
use clinic_http::{ScopeSource, ScopedClient};
use tokio::sync::watch;
use tracing::info;

use crate::services::Services;
use crate::tenancy::TenantContext;
use crate::view::TenantBoundView;

/// What the client reads on every request.
struct ConsoleScope {
    session: Arc<SessionState>,
    tenants: Arc<TenantContext>,
}

impl ScopeSource for ConsoleScope {
    fn credential(&self) -> Option<Credential> {
        self.session.credential()
    }

    /// A session that lapsed on its own (known expiry) takes the tenant
    /// state with it, like a rejected one.
    fn tenant_scope(&self) -> TenantScope {
        let scope = self.tenants.scope();
        if scope.tenant.is_none() || self.session.is_authenticated() {
            return scope;
        }
        self.tenants.reset();
        self.tenants.scope()
    }

    fn on_unauthorized(&self) {
        self.session.expire();
        self.tenants.reset();
    }
}

/// Owns the session, the tenant context and the client built on them.
///
/// Session and tenant state only change through the methods here; the
/// client sees them read-only through its scope.
pub struct Console {
    options: ClientOptions,
    storage: Arc<dyn DurableStorage>,
    session: Arc<SessionState>,
    tenants: Arc<TenantContext>,
    client: ScopedClient,
    services: Services,
}

impl Console {
    /// Persist to `options.storage_path` when set, else keep state in memory.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let storage: Arc<dyn DurableStorage> = match &options.storage_path {
            Some(path) => Arc::new(FileStorage::open(path)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::with_storage(options, storage)
    }

    pub fn with_storage(options: ClientOptions, storage: Arc<dyn DurableStorage>) -> Result<Self> {
        let session = Arc::new(SessionState::new(storage.clone()));
        let tenants = Arc::new(TenantContext::new(storage.clone()));
        let scope = Arc::new(ConsoleScope {
            session: session.clone(),
            tenants: tenants.clone(),
        });
        let client = ScopedClient::new(options.clone(), scope)?;
        let services = Services::new(&client);

        Ok(Self {
            options,
            storage,
            session,
            tenants,
            client,
            services,
        })
    }

    /// Build from `{prefix}__*` environment variables.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut cfg = ClinicConfig::new();
        cfg.load_env(prefix);
        Self::new(ClientOptions::from_config(&cfg)?)
    }

    /// Restore a persisted session and, if there is one, its tenants.
    pub async fn start(&self) -> Result<Option<UserIdentity>> {
        let Some(user) = self.session.restore(&self.client).await? else {
            info!(base_url = %self.options.base_url, "console started, signed out");
            return Ok(None);
        };
        self.tenants.load_tenants(&self.client, &user).await?;
        info!(user_id = %user.id, "console started");
        Ok(Some(user))
    }

    /// Sign in and load the tenants of the new identity.
    ///
    /// Signing in as someone else drops the previous user's selection.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let previous = self.session.user();
        let user = self.session.login(&self.client, email, password).await?;
        if previous.is_some_and(|p| p.id != user.id) {
            self.tenants.reset();
            self.tenants.clear_tenant();
        }
        self.tenants.load_tenants(&self.client, &user).await?;
        Ok(user)
    }

    /// Sign out. Afterwards requests carry neither credential nor tenant.
    pub fn logout(&self) {
        self.session.logout();
        self.tenants.reset();
        self.tenants.clear_tenant();
    }

    pub async fn reload_tenants(&self) -> Result<Vec<Tenant>> {
        let Some(user) = self.session.user() else {
            return Err(ClinicError::unauthorized("Authentication required").into_anyhow());
        };
        self.tenants.load_tenants(&self.client, &user).await
    }

    pub fn switch_tenant(&self, id: impl Into<TenantId>) -> Result<Tenant> {
        self.tenants.switch_tenant(&id.into())
    }

    pub fn clear_tenant(&self) {
        self.tenants.clear_tenant();
    }

    /// A view that only ever shows data for the current tenant.
    pub fn view<T: Clone>(&self) -> TenantBoundView<T> {
        TenantBoundView::new(self.tenants.clone())
    }

    pub fn identity_changes(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.session.subscribe()
    }

    pub fn selection_changes(&self) -> watch::Receiver<TenantScope> {
        self.tenants.subscribe()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn DurableStorage> {
        &self.storage
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn tenants(&self) -> &TenantContext {
        &self.tenants
    }

    pub fn client(&self) -> &ScopedClient {
        &self.client
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Stop the console. Persisted state stays for the next start.
    pub fn shutdown(self) {
        info!(
            signed_in = self.session.is_authenticated(),
            tenant = self.tenants.selected_id().as_ref().map(|t| t.as_str()).unwrap_or("-"),
            "console shut down"
        );
    }
}
