//! HTTP 路由模块
//!
//! 路由结构：
//! - `/api/auth/login`    用户名密码登录
//! - `/api/auth/refresh`  兑换 refresh token
//! - `/api/auth/logout`   撤销当前 access token
//! - `/api/auth/me`       当前用户（需要认证）
//! - `/api/admin/settings` 运行期认证设置（X-Service-Key）
//! - `/metrics`           Prometheus

pub mod admin;
pub mod auth;
pub mod metrics;

use crate::http::HttpServerState;
use axum::{routing::get, Router};

/// 创建所有路由
pub fn create_routes(state: HttpServerState) -> Router<HttpServerState> {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .merge(auth::create_route(state))
        .merge(admin::create_route())
}
