//! clinic-console: tenant-scoped access to the clinic backend.
//!
//! [`Console`] owns the session and the tenant selection and hands out the
//! resource [`Services`], whose every call is scoped to both.

pub mod console;
pub mod services;
pub mod tenancy;
pub mod view;

pub use console::Console;
pub use services::{RestService, Services};
pub use tenancy::TenantContext;
pub use view::{Applied, TenantBoundView};
