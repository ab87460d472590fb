//! In-process clinic backend for console tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clinic_console::Console;
use clinic_core::{ClientOptions, DurableStorage, MemoryStorage};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub account: Option<String>,
}

#[derive(Default)]
pub struct Backend {
    seen: Mutex<Vec<Seen>>,
    accounts_delay: Mutex<Option<Duration>>,
}

impl Backend {
    /// Hold every later tenant list response back by `delay`.
    pub fn delay_accounts(&self, delay: Duration) {
        *self.accounts_delay.lock() = Some(delay);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    /// Last request to `path` (full path, e.g. `/api/v1/patients/`).
    pub fn last(&self, path: &str) -> Option<Seen> {
        self.seen.lock().iter().rev().find(|s| s.path == path).cloned()
    }

    pub fn count(&self, path: &str) -> usize {
        self.seen.lock().iter().filter(|s| s.path == path).count()
    }

    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Seen {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        let seen = Seen {
            method: method.to_string(),
            path: uri.path().to_string(),
            authorization: header("authorization"),
            account: header("x-account-context"),
        };
        self.seen.lock().push(seen.clone());
        seen
    }
}

type Shared = State<Arc<Backend>>;

/// Lifetime of the `brief@clinic.test` session.
pub const BRIEF_SESSION_MS: i64 = 300;

struct Account {
    token: &'static str,
    user: Value,
    tenants: Value,
}

fn account_by_email(email: &str) -> Option<Account> {
    let tenant = |id: &str| json!({"id": id, "name": format!("Clinic {id}"), "status": "active"});
    let account = match email {
        "ana@clinic.test" => Account {
            token: "tok-ana",
            user: json!({"id": 1, "email": email, "name": "Ana"}),
            tenants: json!({"count": 2, "next": null, "previous": null, "results": [tenant("acc1"), tenant("acc2")]}),
        },
        "bo@clinic.test" => Account {
            token: "tok-bo",
            user: json!({"id": 2, "email": email}),
            tenants: json!([tenant("acc3"), tenant("acc2")]),
        },
        "solo@clinic.test" => Account {
            token: "tok-solo",
            user: json!({"id": 3, "email": email}),
            tenants: json!([tenant("acc1")]),
        },
        "none@clinic.test" => Account {
            token: "tok-none",
            user: json!({"id": 4, "email": email}),
            tenants: json!([]),
        },
        "staff@clinic.test" => Account {
            token: "tok-staff",
            user: json!({"id": 5, "email": email, "is_staff": true}),
            tenants: json!([tenant("acc1")]),
        },
        "broken@clinic.test" => Account {
            token: "tok-broken",
            user: json!({"id": 6, "email": email}),
            tenants: Value::Null,
        },
        "brief@clinic.test" => Account {
            token: "tok-brief",
            user: json!({"id": 7, "email": email}),
            tenants: json!([tenant("acc4")]),
        },
        _ => return None,
    };
    Some(account)
}

fn account_by_token(headers: &HeaderMap) -> Option<Account> {
    let token = headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .to_string();
    [
        "ana@clinic.test",
        "bo@clinic.test",
        "solo@clinic.test",
        "none@clinic.test",
        "staff@clinic.test",
        "broken@clinic.test",
        "brief@clinic.test",
    ]
    .into_iter()
    .filter_map(account_by_email)
    .find(|a| a.token == token)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Invalid token."}))).into_response()
}

async fn login(State(backend): Shared, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    backend.record(&method, &uri, &headers);
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let email = body["email"].as_str().unwrap_or_default();

    match account_by_email(email) {
        Some(account) if body["password"] == "secret" && email == "brief@clinic.test" => {
            let expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(BRIEF_SESSION_MS);
            Json(json!({"token": account.token, "user": account.user, "expires_at": expires_at})).into_response()
        }
        Some(account) if body["password"] == "secret" => {
            Json(json!({"token": account.token, "user": account.user})).into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"non_field_errors": ["Unable to log in with provided credentials."]})),
        )
            .into_response(),
    }
}

async fn me(State(backend): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    backend.record(&method, &uri, &headers);
    match account_by_token(&headers) {
        Some(account) => Json(account.user).into_response(),
        None => unauthorized(),
    }
}

async fn accounts(State(backend): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    backend.record(&method, &uri, &headers);
    let delay = *backend.accounts_delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    match account_by_token(&headers) {
        Some(account) if account.tenants.is_null() => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "boom"}))).into_response()
        }
        Some(account) => Json(account.tenants).into_response(),
        None => unauthorized(),
    }
}

async fn patients(
    State(backend): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let seen = backend.record(&method, &uri, &headers);
    if account_by_token(&headers).is_none() {
        return unauthorized();
    }
    if let Some(ms) = query.get("delay_ms").and_then(|v| v.parse().ok()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    if method == Method::POST {
        let mut created: Value = serde_json::from_slice(&body).unwrap_or_default();
        created["id"] = json!("p-new");
        created["account"] = json!(seen.account);
        return (StatusCode::CREATED, Json(created)).into_response();
    }

    let results = match &seen.account {
        Some(account) => json!([{"id": format!("p-{account}"), "account": account}]),
        None => json!([]),
    };
    Json(results).into_response()
}

async fn patient(
    State(backend): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let seen = backend.record(&method, &uri, &headers);
    if account_by_token(&headers).is_none() {
        return unauthorized();
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response();
    }

    match method {
        Method::DELETE => StatusCode::NO_CONTENT.into_response(),
        Method::PUT | Method::PATCH => {
            let mut record: Value = serde_json::from_slice(&body).unwrap_or_default();
            record["id"] = json!(id);
            record["method"] = json!(seen.method);
            Json(record).into_response()
        }
        _ => Json(json!({"id": id, "account": seen.account})).into_response(),
    }
}

async fn specialty_doctors(
    State(backend): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    backend.record(&method, &uri, &headers);
    Json(json!([{"id": "d1", "specialty": id}])).into_response()
}

async fn form_options(State(backend): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    let seen = backend.record(&method, &uri, &headers);
    Json(json!({"locations": [{"id": "l1"}], "account": seen.account})).into_response()
}

async fn accept_invitation(
    State(backend): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.record(&method, &uri, &headers);
    let mut accepted: Value = serde_json::from_slice(&body).unwrap_or_default();
    accepted["accepted"] = json!(true);
    Json(accepted).into_response()
}

async fn resend_invitation(
    State(backend): Shared,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let seen = backend.record(&method, &uri, &headers);
    Json(json!({"id": id, "resent": true, "account": seen.account})).into_response()
}

async fn expired(State(backend): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    backend.record(&method, &uri, &headers);
    unauthorized()
}

pub async fn spawn_backend() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let router = Router::new()
        .route("/api/v1/auth/login/", post(login))
        .route("/api/v1/auth/me/", get(me))
        .route("/api/v1/accounts/", get(accounts))
        .route("/api/v1/patients/", get(patients).post(patients))
        .route(
            "/api/v1/patients/{id}/",
            get(patient).put(patient).patch(patient).delete(patient),
        )
        .route("/api/v1/specialties/{id}/doctors/", get(specialty_doctors))
        .route("/api/v1/treatments/form-options/", get(form_options))
        .route("/api/v1/invitations/accept/", post(accept_invitation))
        .route("/api/v1/invitations/{id}/resend/", post(resend_invitation))
        .route("/api/v1/expired/", get(expired))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), backend)
}

/// A console on a fresh backend with in-memory storage.
pub async fn console() -> (Console, Arc<Backend>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let (console, backend) = console_with(storage.clone()).await;
    (console, backend, storage)
}

pub async fn console_with(storage: Arc<dyn DurableStorage>) -> (Console, Arc<Backend>) {
    let (base, backend) = spawn_backend().await;
    let console = Console::with_storage(ClientOptions::new(base), storage).unwrap();
    (console, backend)
}
