//! Backend resources as [`ResourceService`]s over the scoped client.
//!
//! Paths are relative to the API prefix and always end in `/`:
//! `patients/` for the collection, `patients/{id}/` for one record,
//! `patients/{id}/{action}/` or `patients/{action}/` for custom endpoints.

use std::fmt;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use clinic_core::errors::ClinicError;
use clinic_core::{ExtraHeaders, ListParams, Listing, ResourceService, ServiceCapabilities, ServiceMethodKind};
use clinic_http::{RequestOptions, ScopedClient, ScopedResponse};
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// A REST resource with standard list/get/create/update/remove.
///
/// Each call takes the credential and tenant from the client's scope at
/// dispatch; `extra` headers win over both.
pub struct RestService<R = Value> {
    client: ScopedClient,
    name: &'static str,
    path: String,
    capabilities: ServiceCapabilities,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for RestService<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: self.name,
            path: self.path.clone(),
            capabilities: self.capabilities.clone(),
            _record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for RestService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestService")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<R> RestService<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(client: ScopedClient, name: &'static str, path: &str) -> Self {
        let mut path = path.trim_matches('/').to_string();
        path.push('/');
        Self {
            client,
            name,
            path,
            capabilities: ServiceCapabilities::standard_crud(),
            _record: PhantomData,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServiceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Collection path, e.g. `patients/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Like `list`, keeping the scope tag for tenant-bound views.
    pub async fn list_scoped(&self, params: ListParams, extra: ExtraHeaders) -> Result<ScopedResponse<Listing<R>>> {
        self.ensure(&ServiceMethodKind::List)?;
        let opts = RequestOptions::new().with_params(params).with_extra(extra);
        self.client.get_json(&self.path, opts).await
    }

    /// Partial update.
    pub async fn patch(&self, id: &str, changes: Value, extra: ExtraHeaders) -> Result<R> {
        self.ensure(&ServiceMethodKind::Patch)?;
        let path = self.item_path(id)?;
        let res = self
            .client
            .patch_json(&path, changes, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }

    /// Call a custom endpoint, on one record when `id` is given.
    pub async fn action<T: DeserializeOwned>(
        &self,
        method: Method,
        id: Option<&str>,
        action: &'static str,
        body: Option<Value>,
        opts: RequestOptions,
    ) -> Result<ScopedResponse<T>> {
        self.ensure(&ServiceMethodKind::Custom(action))?;
        let base = match id {
            Some(id) => self.item_path(id)?,
            None => self.path.clone(),
        };
        let path = format!("{base}{}/", action.trim_matches('/'));
        self.client.send(method, &path, body, opts).await
    }

    /// One path segment made of unreserved characters, never `.` or `..`.
    fn item_path(&self, id: &str) -> Result<String> {
        let id = id.trim();
        let unreserved = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~');
        if id.is_empty() || id == "." || id == ".." || !id.chars().all(unreserved) {
            return Err(ClinicError::validation(format!("invalid {} id: {id:?}", self.name))
                .with_field_error("id", "Invalid identifier.")
                .into_anyhow());
        }
        Ok(format!("{}{id}/", self.path))
    }

    fn ensure(&self, method: &ServiceMethodKind) -> Result<()> {
        if self.capabilities.allows(method) {
            Ok(())
        } else {
            Err(
                ClinicError::validation(format!("Method not allowed: {method:?} on {}", self.name))
                    .with_status(405)
                    .into_anyhow(),
            )
        }
    }
}

#[async_trait]
impl<R> ResourceService<R> for RestService<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> ServiceCapabilities {
        self.capabilities.clone()
    }

    async fn list(&self, params: ListParams, extra: ExtraHeaders) -> Result<Listing<R>> {
        Ok(self.list_scoped(params, extra).await?.value)
    }

    async fn get(&self, id: &str, extra: ExtraHeaders) -> Result<R> {
        self.ensure(&ServiceMethodKind::Get)?;
        let path = self.item_path(id)?;
        let res = self.client.get_json(&path, RequestOptions::new().with_extra(extra)).await?;
        Ok(res.value)
    }

    async fn create(&self, payload: R, extra: ExtraHeaders) -> Result<R> {
        self.ensure(&ServiceMethodKind::Create)?;
        let body = to_body(&payload)?;
        let res = self
            .client
            .post_json(&self.path, body, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }

    async fn update(&self, id: &str, payload: R, extra: ExtraHeaders) -> Result<R> {
        self.ensure(&ServiceMethodKind::Update)?;
        let path = self.item_path(id)?;
        let body = to_body(&payload)?;
        let res = self
            .client
            .put_json(&path, body, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }

    async fn remove(&self, id: &str, extra: ExtraHeaders) -> Result<Option<R>> {
        self.ensure(&ServiceMethodKind::Remove)?;
        let path = self.item_path(id)?;
        let res = self
            .client
            .delete::<Option<R>>(&path, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }
}

fn to_body<R: Serialize>(payload: &R) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ClinicError::validation(format!("payload is not serializable: {e}")).into_anyhow())
}

/// Every resource the console talks to.
#[derive(Debug, Clone)]
pub struct Services {
    pub patients: RestService,
    pub treatments: RestService,
    pub locations: RestService,
    pub catalog_items: RestService,
    pub specialties: RestService,
    pub contracts: RestService,
    pub accounts: RestService,
    pub users: RestService,
    pub invitations: RestService,
    pub team_members: RestService,
    pub plans: RestService,
}

impl Services {
    pub fn new(client: &ScopedClient) -> Self {
        use ServiceMethodKind::*;
        let rest = |name: &'static str| -> RestService { RestService::new(client.clone(), name, name) };

        Self {
            patients: rest("patients"),
            treatments: rest("treatments").with_capabilities(ServiceCapabilities::from_methods(vec![
                List,
                Get,
                Create,
                Update,
                Patch,
                Remove,
                Custom("form-options"),
            ])),
            locations: rest("locations"),
            catalog_items: rest("catalog-items"),
            specialties: rest("specialties").with_capabilities(ServiceCapabilities::from_methods(vec![
                List,
                Get,
                Create,
                Update,
                Patch,
                Remove,
                Custom("doctors"),
            ])),
            contracts: rest("contracts"),
            accounts: rest("accounts"),
            users: rest("users"),
            invitations: rest("invitations").with_capabilities(ServiceCapabilities::from_methods(vec![
                List,
                Get,
                Create,
                Remove,
                Custom("accept"),
                Custom("resend"),
            ])),
            team_members: rest("team-members"),
            plans: rest("plans").with_capabilities(ServiceCapabilities::read_only()),
        }
    }

    /// Look a resource up by its backend name, e.g. `"catalog-items"`.
    pub fn service(&self, name: &str) -> Result<&RestService> {
        let svc = match name {
            "patients" => &self.patients,
            "treatments" => &self.treatments,
            "locations" => &self.locations,
            "catalog-items" => &self.catalog_items,
            "specialties" => &self.specialties,
            "contracts" => &self.contracts,
            "accounts" => &self.accounts,
            "users" => &self.users,
            "invitations" => &self.invitations,
            "team-members" => &self.team_members,
            "plans" => &self.plans,
            _ => return Err(ClinicError::not_found(format!("No service named {name}")).into_anyhow()),
        };
        Ok(svc)
    }

    /// Doctors practising a specialty, in the current tenant.
    pub async fn specialty_doctors(&self, specialty_id: &str, extra: ExtraHeaders) -> Result<Listing<Value>> {
        let res = self
            .specialties
            .action(Method::GET, Some(specialty_id), "doctors", None, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }

    /// Choices for the treatment form (locations, catalog items, ...).
    pub async fn treatment_form_options(&self, extra: ExtraHeaders) -> Result<Value> {
        let res = self
            .treatments
            .action(Method::GET, None, "form-options", None, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }

    /// Redeem an invitation token. Works without a session.
    pub async fn accept_invitation(&self, token: &str, mut details: Value) -> Result<Value> {
        match details.as_object_mut() {
            Some(fields) => {
                fields.insert("token".into(), json!(token));
            }
            None => details = json!({ "token": token }),
        }
        let res = self
            .invitations
            .action(Method::POST, None, "accept", Some(details), RequestOptions::anonymous())
            .await?;
        Ok(res.value)
    }

    pub async fn resend_invitation(&self, id: &str, extra: ExtraHeaders) -> Result<Value> {
        let res = self
            .invitations
            .action(Method::POST, Some(id), "resend", None, RequestOptions::new().with_extra(extra))
            .await?;
        Ok(res.value)
    }
}
