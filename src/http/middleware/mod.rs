//! HTTP 中间件

pub mod auth;

pub use auth::{authorization_header, require_auth, NEAR_EXPIRY_HEADER};
