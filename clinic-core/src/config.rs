//! # Configuration
//!
//! A minimal string key/value store, mirroring `app.set()` / `app.get()`,
//! plus the typed [`ClientOptions`] the rest of the console reads.
//!
//! ```rust
//! use clinic_core::{ClientOptions, ClinicConfig};
//!
//! let mut cfg = ClinicConfig::new();
//! cfg.set("api.base_url", "https://clinic.example.com");
//! cfg.set("api.timeout", "10s");
//!
//! let options = ClientOptions::from_config(&cfg).unwrap();
//! assert_eq!(options.tenant_header, "X-Account-Context");
//! assert_eq!(
//!     options.api_url("patients/"),
//!     "https://clinic.example.com/api/v1/patients/"
//! );
//! ```
//!
//! ## Environment overrides
//! [`ClinicConfig::load_env`] copies prefixed variables into the store:
//! `CLINIC__API__BASE_URL` becomes `api.base_url`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone)]
pub struct ClinicConfig {
    values: HashMap<String, String>,
}

impl ClinicConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }

    /// Overlay variables starting with `prefix` from the process environment.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    /// Overlay variables from any iterator (testable form of [`Self::load_env`]).
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped
                    .trim_start_matches('_')
                    .to_lowercase()
                    .replace("__", ".");
                if !normalized.is_empty() {
                    self.set(normalized, value);
                }
            }
        }
    }
}

/// Typed client settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientOptions {
    /// Backend origin, e.g. `https://clinic.example.com`.
    pub base_url: String,
    /// Versioned API base path.
    pub api_prefix: String,
    /// Header naming the tenant a request operates on.
    pub tenant_header: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub login_path: String,
    pub me_path: String,
    pub tenants_path: String,
    /// When set, session state is persisted to this JSON file.
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_prefix: "api/v1/".to_string(),
            tenant_header: "X-Account-Context".to_string(),
            timeout: Duration::from_secs(30),
            login_path: "auth/login/".to_string(),
            me_path: "auth/me/".to_string(),
            tenants_path: "accounts/".to_string(),
            storage_path: None,
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read `api.*` and `storage.path` keys over the defaults, then validate.
    pub fn from_config(cfg: &ClinicConfig) -> Result<Self> {
        let mut options = Self::default();

        if let Some(v) = cfg.get("api.base_url") {
            options.base_url = v.trim().to_string();
        }
        if let Some(v) = cfg.get("api.prefix") {
            options.api_prefix = v.trim().to_string();
        }
        if let Some(v) = cfg.get("api.tenant_header") {
            options.tenant_header = v.trim().to_string();
        }
        if let Some(v) = cfg.get("api.timeout") {
            options.timeout = humantime::parse_duration(v.trim())
                .map_err(|e| anyhow!("api.timeout: {e}"))?;
        }
        if let Some(v) = cfg.get("api.login_path") {
            options.login_path = v.trim().to_string();
        }
        if let Some(v) = cfg.get("api.me_path") {
            options.me_path = v.trim().to_string();
        }
        if let Some(v) = cfg.get("api.tenants_path") {
            options.tenants_path = v.trim().to_string();
        }
        if let Some(v) = cfg.get("storage.path") {
            let v = v.trim();
            if !v.is_empty() {
                options.storage_path = Some(PathBuf::from(v));
            }
        }

        options.validate().map_err(|e| anyhow!(e))?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("api.base_url must be set".to_string());
        }
        let uri: http::Uri = self
            .base_url
            .parse()
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => return Err("api.base_url must use http or https".to_string()),
        }
        if uri.host().is_none() {
            return Err("api.base_url must include a host".to_string());
        }

        if self.tenant_header.trim().is_empty() {
            return Err("api.tenant_header must not be empty".to_string());
        }
        http::HeaderName::from_bytes(self.tenant_header.as_bytes())
            .map_err(|_| format!("api.tenant_header is not a valid header name: {}", self.tenant_header))?;

        if self.timeout.is_zero() {
            return Err("api.timeout must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Absolute URL for an API path. Absolute URLs (pagination links) pass through.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        let path = path.trim_start_matches('/');

        if prefix.is_empty() {
            format!("{base}/{path}")
        } else {
            format!("{base}/{prefix}/{path}")
        }
    }
}
