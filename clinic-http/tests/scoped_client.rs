use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use clinic_core::{ClientOptions, ClinicError, ErrorKind, ExtraHeaders, ListParams};
use clinic_http::{RequestOptions, ScopeSource, ScopedClient, StaticScope};
use serde_json::{json, Value};

async fn echo(headers: HeaderMap, RawQuery(query): RawQuery) -> Json<Value> {
    Json(json!({
        "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
        "account": headers.get("x-account-context").and_then(|v| v.to_str().ok()),
        "query": query,
    }))
}

async fn status(Path(code): Path<u16>) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(code).unwrap();
    let body = match code {
        400 => json!({"email": ["Enter a valid email address."]}),
        _ => json!({"detail": format!("status {code}")}),
    };
    (status, Json(body))
}

async fn remove_patient(Path(_id): Path<String>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({}))
}

async fn spawn_backend() -> String {
    let router = Router::new()
        .route("/api/v1/echo/", get(echo))
        .route("/api/v1/status/{code}/", get(status))
        .route("/api/v1/patients/{id}/", delete(remove_patient))
        .route("/api/v1/slow/", get(slow));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: String, scope: Arc<StaticScope>) -> ScopedClient {
    ScopedClient::new(ClientOptions::new(base_url), scope).unwrap()
}

#[tokio::test]
async fn context_headers_reach_the_backend() {
    let base = spawn_backend().await;
    let scope = Arc::new(StaticScope::new().with_credential("tok-1").with_tenant("acc1"));
    let client = client(base, scope.clone());

    let res = client
        .get_json::<Value>(
            "echo/",
            RequestOptions::new().with_params(ListParams::new().filter("status", "active")),
        )
        .await
        .unwrap();

    assert_eq!(res.status.as_u16(), 200);
    assert_eq!(res.value["authorization"], "Bearer tok-1");
    assert_eq!(res.value["account"], "acc1");
    assert_eq!(res.value["query"], "status=active");
    assert_eq!(res.scope, scope.tenant_scope());
}

#[tokio::test]
async fn switching_selection_changes_the_header_and_the_tag() {
    let base = spawn_backend().await;
    let scope = Arc::new(StaticScope::new().with_credential("tok-1").with_tenant("acc1"));
    let client = client(base, scope.clone());

    let first = client.get_json::<Value>("echo/", RequestOptions::new()).await.unwrap();
    scope.select(Some("acc2".into()));
    let second = client.get_json::<Value>("echo/", RequestOptions::new()).await.unwrap();

    assert_eq!(first.value["account"], "acc1");
    assert_eq!(second.value["account"], "acc2");
    assert!(!first.scope.matches(&scope.tenant_scope()));
    assert!(second.scope.matches(&scope.tenant_scope()));
}

#[tokio::test]
async fn explicit_tenant_override_is_sent() {
    let base = spawn_backend().await;
    let scope = Arc::new(StaticScope::new().with_credential("tok-1").with_tenant("acc1"));
    let client = client(base, scope);

    let res = client
        .get_json::<Value>(
            "echo/",
            RequestOptions::new().with_extra(ExtraHeaders::new().tenant("acc7")),
        )
        .await
        .unwrap();
    assert_eq!(res.value["account"], "acc7");
}

#[tokio::test]
async fn missing_credential_is_still_sent() {
    let base = spawn_backend().await;
    let client = client(base, Arc::new(StaticScope::new()));

    let res = client.get_json::<Value>("echo/", RequestOptions::new()).await.unwrap();
    assert_eq!(res.value["authorization"], Value::Null);
    assert_eq!(res.value["account"], Value::Null);
}

#[tokio::test]
async fn unauthorized_clears_the_session() {
    let base = spawn_backend().await;
    let scope = Arc::new(StaticScope::new().with_credential("expired"));
    let client = client(base, scope.clone());

    let err = client
        .get_json::<Value>("status/401/", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(ClinicError::kind_of(&err), Some(ErrorKind::Unauthorized));
    assert_eq!(scope.unauthorized_count(), 1);
    assert!(scope.credential().is_none());
}

#[tokio::test]
async fn anonymous_unauthorized_leaves_the_session_alone() {
    let base = spawn_backend().await;
    let scope = Arc::new(StaticScope::new().with_credential("still-good"));
    let client = client(base, scope.clone());

    let err = client
        .get_json::<Value>("status/401/", RequestOptions::anonymous())
        .await
        .unwrap_err();

    assert_eq!(ClinicError::kind_of(&err), Some(ErrorKind::Unauthorized));
    assert_eq!(scope.unauthorized_count(), 0);
    assert!(scope.credential().is_some());
}

#[tokio::test]
async fn failures_are_classified() {
    let base = spawn_backend().await;
    let client = client(base, Arc::new(StaticScope::new().with_credential("tok")));

    let cases = [
        (403, ErrorKind::Forbidden),
        (404, ErrorKind::NotFound),
        (409, ErrorKind::Validation),
        (500, ErrorKind::ServerError),
        (503, ErrorKind::ServerError),
    ];
    for (code, kind) in cases {
        let err = client
            .get_json::<Value>(&format!("status/{code}/"), RequestOptions::new())
            .await
            .unwrap_err();
        let err = ClinicError::from_anyhow(&err).unwrap();
        assert_eq!(err.kind, kind, "status {code}");
        assert_eq!(err.message, format!("status {code}"));
    }

    let err = client
        .get_json::<Value>("status/400/", RequestOptions::new())
        .await
        .unwrap_err();
    let err = ClinicError::from_anyhow(&err).unwrap();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.is_field_level());
    assert_eq!(
        err.field_errors.get("email"),
        Some(&["Enter a valid email address.".to_string()][..])
    );
}

#[tokio::test]
async fn no_content_decodes_as_none() {
    let base = spawn_backend().await;
    let client = client(base, Arc::new(StaticScope::new().with_credential("tok")));

    let res = client
        .delete::<Option<Value>>("patients/3/", RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(res.status.as_u16(), 204);
    assert!(res.value.is_none());
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let scope = Arc::new(StaticScope::new().with_credential("tok"));
    let client = client(format!("http://{addr}"), scope.clone());

    let err = client.get_json::<Value>("echo/", RequestOptions::new()).await.unwrap_err();
    assert_eq!(ClinicError::kind_of(&err), Some(ErrorKind::NetworkError));
    // no response, no session side effect
    assert_eq!(scope.unauthorized_count(), 0);
}

#[tokio::test]
async fn timeout_is_a_network_error() {
    let base = spawn_backend().await;
    let mut options = ClientOptions::new(base);
    options.timeout = Duration::from_millis(200);
    let client = ScopedClient::new(options, Arc::new(StaticScope::new())).unwrap();

    let err = client.get_json::<Value>("slow/", RequestOptions::new()).await.unwrap_err();
    let err = ClinicError::from_anyhow(&err).unwrap();
    assert_eq!(err.kind, ErrorKind::NetworkError);
    assert_eq!(err.message, "request timed out");
}
