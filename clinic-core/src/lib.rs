//! clinic-core: framework-agnostic types for the clinic console client.

pub mod config;
pub mod errors;
pub mod identity;
pub mod service;
pub mod storage;
pub mod tenant;

pub use config::{ClientOptions, ClinicConfig};
pub use errors::{ClinicError, ClinicResult, ErrorEnvelope, ErrorKind, FieldErrors};
pub use identity::{Credential, Session, UserIdentity};
pub use service::{
    ExtraHeaders, ListParams, Listing, Page, ResourceService, ServiceCapabilities, ServiceMethodKind,
    TenantOverride,
};
pub use storage::{DurableStorage, FileStorage, MemoryStorage, StorageError, ACCOUNT_KEY, TOKEN_KEY, USER_KEY};
pub use tenant::{Tenant, TenantId, TenantScope, TenantStatus};
