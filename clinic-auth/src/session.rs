// Session state.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clinic_core::errors::{ClinicError, ErrorKind};
use clinic_core::storage::{DurableStorage, TOKEN_KEY, USER_KEY};
use clinic_core::{Credential, ExtraHeaders, Session, UserIdentity};
use clinic_http::{RequestOptions, ScopedClient};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::jwt::{extract_bearer_token, jwt_expiry};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default, alias = "key", alias = "access", alias = "access_token")]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserIdentity>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Who is signed in, with which credential.
///
/// The only owner of the session: everything else reads it. Credential and
/// identity are persisted to durable storage so a restart does not force a
/// new login; observers are told whenever the identity changes.
pub struct SessionState {
    storage: Arc<dyn DurableStorage>,
    current: RwLock<Option<Session>>,
    identity: watch::Sender<Option<UserIdentity>>,
}

impl SessionState {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            storage,
            current: RwLock::new(None),
            identity,
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.current.read().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    /// The live credential. A session past its known expiry is cleared here.
    pub fn credential(&self) -> Option<Credential> {
        {
            let current = self.current.read();
            match current.as_ref() {
                None => return None,
                Some(session) if !session.is_expired(Utc::now()) => return Some(session.token.clone()),
                Some(_) => {}
            }
        }
        warn!("session credential expired");
        self.clear();
        None
    }

    /// Observe identity changes (`None` = signed out).
    pub fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.identity.subscribe()
    }

    /// Re-establish the session from durable storage.
    ///
    /// A stored token without a stored identity is resolved against the
    /// backend; a rejected or expired token is dropped.
    pub async fn restore(&self, client: &ScopedClient) -> Result<Option<UserIdentity>> {
        let Some(raw) = self.storage.get(TOKEN_KEY).filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        let token = Credential::new(raw);
        let expires_at = jwt_expiry(&token);
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            info!("stored credential has expired, discarding");
            self.clear();
            return Ok(None);
        }

        let stored_user = self
            .storage
            .get(USER_KEY)
            .and_then(|raw| serde_json::from_str::<UserIdentity>(&raw).ok());

        let user = match stored_user {
            Some(user) => user,
            None => match fetch_identity(client, &token).await {
                Ok(user) => user,
                Err(e) if ClinicError::kind_of(&e) == Some(ErrorKind::Unauthorized) => {
                    info!("stored credential was rejected, discarding");
                    self.clear();
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
        };

        self.install(Session::new(user.clone(), token).with_expiry(expires_at));
        info!(user_id = %user.id, "session restored");
        Ok(Some(user))
    }

    /// Authenticate against the backend.
    ///
    /// On failure the previous session, if any, is left exactly as it was.
    pub async fn login(&self, client: &ScopedClient, email: &str, password: &str) -> Result<UserIdentity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            let mut err = ClinicError::invalid_credentials("Email and password are required");
            if email.is_empty() {
                err = err.with_field_error("email", "This field is required.");
            }
            if password.is_empty() {
                err = err.with_field_error("password", "This field is required.");
            }
            return Err(err.into_anyhow());
        }

        let login_path = client.options().login_path.clone();
        let res = client
            .post_json::<Value>(
                &login_path,
                json!({ "email": email, "password": password }),
                RequestOptions::anonymous(),
            )
            .await
            .map_err(rejected_as_invalid_credentials)?;

        let body: LoginResponse = serde_json::from_value(res.value).map_err(|e| {
            ClinicError::server_error(format!("unexpected login response: {e}")).into_anyhow()
        })?;

        let token = body
            .token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| extract_bearer_token(&res.headers))
            .map(Credential::new)
            .ok_or_else(|| ClinicError::server_error("login response carried no token").into_anyhow())?;

        let user = match body.user {
            Some(user) => user,
            None => fetch_identity(client, &token).await?,
        };
        let expires_at = body.expires_at.or_else(|| jwt_expiry(&token));

        self.install(Session::new(user.clone(), token).with_expiry(expires_at));
        info!(user_id = %user.id, staff = user.is_staff, "signed in");
        Ok(user)
    }

    /// Sign out. Always succeeds.
    pub fn logout(&self) {
        self.clear();
        info!("signed out");
    }

    /// The backend rejected the credential: drop the session.
    pub fn expire(&self) {
        if self.current.read().is_some() {
            warn!("session expired, authentication required");
        }
        self.clear();
    }

    fn install(&self, session: Session) {
        if let Err(e) = self.storage.set(TOKEN_KEY, session.token.secret()) {
            warn!(error = %e, "failed to persist credential");
        }
        match serde_json::to_string(&session.user) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(USER_KEY, &raw) {
                    warn!(error = %e, "failed to persist identity");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize identity"),
        }

        let user = session.user.clone();
        *self.current.write() = Some(session);
        self.notify(Some(user));
    }

    fn clear(&self) {
        *self.current.write() = None;
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to remove persisted session key");
            }
        }
        self.notify(None);
    }

    fn notify(&self, user: Option<UserIdentity>) {
        self.identity.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }
}

/// Ask the backend who a token belongs to.
///
/// Sent anonymously with the token as an explicit header, so a rejection
/// never touches the current session.
pub async fn fetch_identity(client: &ScopedClient, token: &Credential) -> Result<UserIdentity> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
        .map_err(|_| ClinicError::server_error("credential is not a valid header value").into_anyhow())?;
    bearer.set_sensitive(true);

    let me_path = client.options().me_path.clone();
    let res = client
        .get_json::<UserIdentity>(
            &me_path,
            RequestOptions::anonymous().with_extra(ExtraHeaders::new().header(AUTHORIZATION, bearer)),
        )
        .await?;
    Ok(res.value)
}

/// Only a rejection of the submitted credentials becomes `InvalidCredentials`;
/// throttling and other 4xx answers keep their own classification.
fn rejected_as_invalid_credentials(err: anyhow::Error) -> anyhow::Error {
    let clinic = ClinicError::normalize(err);
    match clinic.status {
        Some(status @ (400 | 401 | 403)) => ClinicError::invalid_credentials(clinic.message)
            .with_field_errors(clinic.field_errors)
            .with_status(status)
            .into_anyhow(),
        _ => clinic.into_anyhow(),
    }
}
