//! HTTP 服务器

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AuthGateway, RefreshCoordinator, ServiceKeyManager, SettingsResolver, TokenIssueService};
use crate::http::routes;

/// HTTP 共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub gateway: Arc<AuthGateway>,
    pub refresh_coordinator: Arc<RefreshCoordinator>,
    pub token_issue_service: Arc<TokenIssueService>,
    pub settings: Arc<SettingsResolver>,
    // 管理 API
    pub service_key_manager: Arc<ServiceKeyManager>,
}

/// 构建完整路由（测试中直接对它调用 oneshot）
pub fn build_router(state: HttpServerState) -> Router {
    Router::new()
        .merge(routes::create_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 认证 HTTP 服务器
pub struct AuthHttpServer {
    state: HttpServerState,
    bind_address: String,
}

impl AuthHttpServer {
    pub fn new(state: HttpServerState, bind_address: impl Into<String>) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
        }
    }

    /// 启动 HTTP 服务器，直到收到 Ctrl-C
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = build_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("🌐 HTTP 服务器启动在 {}", self.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("🛑 收到退出信号，正在关闭 HTTP 服务器");
            })
            .await?;

        Ok(())
    }
}
