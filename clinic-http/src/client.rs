use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clinic_core::{ClientOptions, ClinicError};
use http::{HeaderMap, HeaderName, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::classify::{classify_status, classify_transport, decode_body};
use crate::hooks::{
    merge_explicit_headers, BearerAuth, ExpireSessionOnUnauthorized, RequestHook, ResponseHook,
    TenantScoping,
};
use crate::request::{RequestOptions, ScopedRequest, ScopedResponse};
use crate::scope::ScopeSource;

struct ClientInner {
    http: reqwest::Client,
    options: ClientOptions,
    tenant_header: HeaderName,
    source: Arc<dyn ScopeSource>,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hooks: Vec<Arc<dyn ResponseHook>>,
}

/// HTTP client that scopes every call to the current session and tenant.
///
/// Every call is a fresh round trip: no caching, no deduplication, no
/// retries. Failures come back as a classified [`ClinicError`] inside
/// `anyhow::Error`.
#[derive(Clone)]
pub struct ScopedClient {
    inner: Arc<ClientInner>,
}

pub struct ScopedClientBuilder {
    options: ClientOptions,
    source: Arc<dyn ScopeSource>,
    http: Option<reqwest::Client>,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hooks: Vec<Arc<dyn ResponseHook>>,
}

impl ScopedClientBuilder {
    /// Extra pre-send hook, run after the bearer and tenant hooks.
    pub fn request_hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.request_hooks.push(hook);
        self
    }

    /// Extra post-receive hook, run after the session-expiry hook.
    pub fn response_hook(mut self, hook: Arc<dyn ResponseHook>) -> Self {
        self.response_hooks.push(hook);
        self
    }

    /// Use a preconfigured `reqwest::Client` (proxies, TLS roots, ...).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ScopedClient> {
        self.options.validate().map_err(|e| anyhow!(e))?;

        let tenant_header = HeaderName::from_bytes(self.options.tenant_header.as_bytes())
            .map_err(|e| anyhow!("invalid tenant header: {e}"))?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.options.timeout)
                .build()
                .map_err(|e| anyhow!("failed to build HTTP client: {e}"))?,
        };

        let mut request_hooks: Vec<Arc<dyn RequestHook>> = vec![
            Arc::new(BearerAuth),
            Arc::new(TenantScoping::new(tenant_header.clone())),
        ];
        request_hooks.extend(self.request_hooks);

        let mut response_hooks: Vec<Arc<dyn ResponseHook>> = vec![Arc::new(ExpireSessionOnUnauthorized)];
        response_hooks.extend(self.response_hooks);

        Ok(ScopedClient {
            inner: Arc::new(ClientInner {
                http,
                options: self.options,
                tenant_header,
                source: self.source,
                request_hooks,
                response_hooks,
            }),
        })
    }
}

impl ScopedClient {
    pub fn new(options: ClientOptions, source: Arc<dyn ScopeSource>) -> Result<Self> {
        Self::builder(options, source).build()
    }

    pub fn builder(options: ClientOptions, source: Arc<dyn ScopeSource>) -> ScopedClientBuilder {
        ScopedClientBuilder {
            options,
            source,
            http: None,
            request_hooks: Vec::new(),
            response_hooks: Vec::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn tenant_header(&self) -> &HeaderName {
        &self.inner.tenant_header
    }

    /// Build a request and run the pre-send pipeline, without sending it.
    pub fn prepare(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        opts: &RequestOptions,
    ) -> Result<ScopedRequest> {
        let source = self.inner.source.as_ref();

        let mut req = ScopedRequest {
            method,
            path: path.to_string(),
            url: self.inner.options.api_url(path),
            query: opts.params.pairs().to_vec(),
            headers: HeaderMap::new(),
            body,
            scope: source.tenant_scope(),
            anonymous: opts.anonymous,
        };

        for hook in &self.inner.request_hooks {
            hook.before_send(&mut req, source)?;
        }
        merge_explicit_headers(&mut req, &opts.extra, &self.inner.tenant_header)?;

        Ok(req)
    }

    /// Send and decode the JSON body as `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        opts: RequestOptions,
    ) -> Result<ScopedResponse<T>> {
        let req = self.prepare(method, path, body, &opts)?;
        self.execute(req).await
    }

    /// Send an already prepared request.
    pub async fn execute<T: DeserializeOwned>(&self, req: ScopedRequest) -> Result<ScopedResponse<T>> {
        let started = Instant::now();

        let mut builder = self
            .inner
            .http
            .request(req.method.clone(), &req.url)
            .headers(req.headers.clone());
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(&req, classify_transport(e))),
        };
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(&req, classify_transport(e))),
        };

        debug!(
            method = %req.method,
            path = %req.path,
            tenant = req.scope.tenant_id().unwrap_or("-"),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        if let Some(err) = classify_status(status, &bytes) {
            return Err(self.fail(&req, err));
        }
        let value = decode_body::<T>(&bytes).map_err(|e| self.fail(&req, e))?;

        Ok(ScopedResponse {
            value,
            status,
            headers,
            scope: req.scope,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> Result<ScopedResponse<T>> {
        self.send(Method::GET, path, None, opts).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        opts: RequestOptions,
    ) -> Result<ScopedResponse<T>> {
        self.send(Method::POST, path, Some(body), opts).await
    }

    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        opts: RequestOptions,
    ) -> Result<ScopedResponse<T>> {
        self.send(Method::PUT, path, Some(body), opts).await
    }

    pub async fn patch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
        opts: RequestOptions,
    ) -> Result<ScopedResponse<T>> {
        self.send(Method::PATCH, path, Some(body), opts).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> Result<ScopedResponse<T>> {
        self.send(Method::DELETE, path, None, opts).await
    }

    fn fail(&self, req: &ScopedRequest, err: ClinicError) -> anyhow::Error {
        debug!(
            method = %req.method,
            path = %req.path,
            kind = err.name(),
            code = err.code(),
            "request failed"
        );
        let source = self.inner.source.as_ref();
        for hook in &self.inner.response_hooks {
            hook.on_failure(req, &err, source);
        }
        err.into_anyhow()
    }
}
