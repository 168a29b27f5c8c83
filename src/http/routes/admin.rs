//! 管理 API 路由模块
//!
//! 使用 X-Service-Key 认证，读取与更新运行期认证设置。

use crate::auth::{EffectiveAuthSettings, SettingsUpdate};
use crate::error::{Result, ServerError};
use crate::http::HttpServerState;
use axum::{extract::State, http::HeaderMap, response::Json, routing::get, Router};
use tracing::{info, warn};

pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/api/admin/settings", get(get_settings).put(update_settings))
}

// =====================================================
// Service Key 验证
// =====================================================

fn verify_service_key(headers: &HeaderMap, state: &HttpServerState) -> Result<()> {
    let key = headers
        .get("x-service-key")
        .ok_or_else(|| {
            warn!("缺少 X-Service-Key 请求头");
            ServerError::Unauthorized("missing X-Service-Key".to_string())
        })?
        .to_str()
        .map_err(|_| {
            warn!("X-Service-Key 格式无效");
            ServerError::Unauthorized("malformed X-Service-Key".to_string())
        })?;

    if !state.service_key_manager.verify(key) {
        warn!("❌ 无效的 service key");
        return Err(ServerError::Unauthorized("invalid service key".to_string()));
    }
    Ok(())
}

// =====================================================
// 运行期设置
// =====================================================

/// GET /api/admin/settings
async fn get_settings(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
) -> Result<Json<EffectiveAuthSettings>> {
    verify_service_key(&headers, &state)?;
    Ok(Json(state.settings.resolve().await?))
}

/// PUT /api/admin/settings
///
/// Body 中只需提供要修改的字段；任何字段校验失败时不写入任何值。
async fn update_settings(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<EffectiveAuthSettings>> {
    verify_service_key(&headers, &state)?;

    if update.is_empty() {
        return Err(ServerError::BadRequest("no settings provided".to_string()));
    }

    info!("管理员更新认证设置: {:?}", update);
    Ok(Json(state.settings.update(&update).await?))
}
