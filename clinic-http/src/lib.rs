//! clinic-http: the scoped request pipeline.
//!
//! Every outgoing call passes through pre-send hooks (bearer credential,
//! tenant header), explicit per-call header overrides, and a post-receive
//! classification into [`clinic_core::ErrorKind`].

pub mod classify;
pub mod client;
pub mod hooks;
pub mod request;
pub mod scope;

pub use classify::{classify_status, classify_transport, decode_body};
pub use client::{ScopedClient, ScopedClientBuilder};
pub use hooks::{
    merge_explicit_headers, BearerAuth, ExpireSessionOnUnauthorized, RequestHook, ResponseHook, TenantScoping,
};
pub use request::{RequestOptions, ScopedRequest, ScopedResponse};
pub use scope::{ScopeSource, StaticScope};
