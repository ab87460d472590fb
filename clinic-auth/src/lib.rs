//! Session state for the clinic console: login, logout, restore on start-up.

pub mod jwt;
pub mod session;

pub use jwt::{extract_bearer_token, jwt_expiry, TOKEN_SCHEMES};
pub use session::{fetch_identity, SessionState};
