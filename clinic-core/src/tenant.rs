//! Core multi-tenant types.
//!
//! A tenant is a clinic account whose data the backend isolates from every
//! other account. The console only ever holds a read-only projection of the
//! accounts visible to the signed-in user.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A tenant (account) identifier.
///
/// Backends hand these out either as strings or as integer primary keys;
/// both deserialize into the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        string_or_number(deserializer).map(TenantId)
    }
}

/// Accept either a JSON string or a JSON integer as an identifier.
pub fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
    })
}

/// Lifecycle of an account on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
}

/// A tenant (clinic account) as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
}

impl Tenant {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>, status: TenantStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// The selection a request was dispatched under.
///
/// `epoch` increases on every change of the selection, so two scopes with
/// the same epoch were taken from the same selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TenantScope {
    pub tenant: Option<TenantId>,
    pub epoch: u64,
}

impl TenantScope {
    pub fn new(tenant: Option<TenantId>, epoch: u64) -> Self {
        Self { tenant, epoch }
    }

    /// No tenant selected.
    pub fn unscoped(epoch: u64) -> Self {
        Self { tenant: None, epoch }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant.as_ref().map(|t| t.as_str())
    }

    /// True when `other` was captured from the same selection as `self`.
    pub fn matches(&self, other: &TenantScope) -> bool {
        self.epoch == other.epoch && self.tenant == other.tenant
    }
}
