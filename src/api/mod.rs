//! HTTP API.

pub mod auth;
pub mod error;
pub mod routes;

pub use auth::{CurrentUser, HeaderIdentityResolver, IdentityResolver};
pub use error::ApiError;
pub use routes::{AppState, router};
