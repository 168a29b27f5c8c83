//! HTTP 接口 - 使用 Axum 暴露认证 API
//!
//! - `/api/auth/*`  登录、refresh、登出、当前用户
//! - `/api/admin/*` 运行期设置（X-Service-Key 认证）
//! - `/metrics`     Prometheus 抓取端点

pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{build_router, AuthHttpServer, HttpServerState};
