//! 认证中间件
//!
//! 通过 [`AuthGateway`](crate::auth::AuthGateway) 认证请求，成功后把
//! [`AuthenticatedSession`] 放入 request extensions，handler 用 `Extension` 取出。

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{AuthOutcome, AuthenticatedSession};
use crate::error::{Result, ServerError};
use crate::http::HttpServerState;

/// access token 即将过期时附加的响应头（仅提示，不影响请求结果）
pub const NEAR_EXPIRY_HEADER: &str = "x-token-near-expiry";

/// 读取 Authorization 头；含非 ASCII 字节时按未携带处理
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?;
    match value.to_str() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!("🔐 Authorization 头包含非 ASCII 字节，已忽略 ({} bytes)", value.len());
            None
        }
    }
}

/// 要求请求携带有效的 access token
pub async fn require_auth(
    State(state): State<HttpServerState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response> {
    let authorization = authorization_header(request.headers()).map(str::to_string);

    let session: AuthenticatedSession = match state.gateway.authenticate(authorization.as_deref()).await? {
        AuthOutcome::Authenticated(session) => session,
        AuthOutcome::Unauthenticated => {
            debug!("🔐 请求未携带 bearer token: {}", request.uri().path());
            return Err(ServerError::Unauthorized("missing bearer token".to_string()));
        }
        AuthOutcome::Rejected(reason) => return Err(reason.into()),
    };

    let near_expiry = session.near_expiry;
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;
    if near_expiry {
        response
            .headers_mut()
            .insert(NEAR_EXPIRY_HEADER, HeaderValue::from_static("1"));
    }
    Ok(response)
}
