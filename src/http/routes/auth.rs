//! 认证 API
//!
//! 登录、refresh、登出不经过认证中间件；`/api/auth/me` 需要有效的 access token。

use axum::{
    http::{HeaderMap, StatusCode},
    extract::State,
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::models::{LoginRequest, RefreshRequest};
use crate::auth::{AuthenticatedSession, RefreshResult, TokenPair};
use crate::error::Result;
use crate::http::middleware::{authorization_header, require_auth};
use crate::http::HttpServerState;

pub fn create_route(state: HttpServerState) -> Router<HttpServerState> {
    let protected = Router::new()
        .route("/api/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .merge(protected)
}

/// POST /api/auth/login
///
/// Body: `{"username": "...", "password": "..."}`
async fn login(
    State(state): State<HttpServerState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    debug!("收到登录请求: username={}", request.username);
    let pair = state
        .token_issue_service
        .login(&request.username, &request.password)
        .await?;
    Ok(Json(pair))
}

/// POST /api/auth/refresh
///
/// 未开启轮换时响应中没有 `refresh` 字段，客户端继续使用原 refresh token。
async fn refresh(
    State(state): State<HttpServerState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResult>> {
    let result = state.refresh_coordinator.refresh(&request.refresh).await?;
    Ok(Json(result))
}

/// POST /api/auth/logout
async fn logout(State(state): State<HttpServerState>, headers: HeaderMap) -> Result<StatusCode> {
    state.gateway.logout(authorization_header(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
async fn me(Extension(session): Extension<AuthenticatedSession>) -> Json<Value> {
    Json(json!({
        "user_id": session.principal.id,
        "username": session.principal.username,
        "seconds_to_expiry": session.seconds_to_expiry,
        "near_expiry": session.near_expiry,
    }))
}
