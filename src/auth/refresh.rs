//! refresh token 兑换
//!
//! 空闲窗口从 refresh token 的签发时间（iat）起算；开启轮换时旧 refresh token 被撤销到它自己的 exp。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::boot_epoch::BootEpoch;
use crate::auth::effective_settings::SettingsResolver;
use crate::auth::jwt_service::JwtService;
use crate::auth::models::{RefreshResult, TokenType};
use crate::auth::token_revocation::Denylist;
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::repository::UserStore;

pub struct RefreshCoordinator {
    jwt: Arc<JwtService>,
    users: Arc<dyn UserStore>,
    settings: Arc<SettingsResolver>,
    boot_epoch: Arc<BootEpoch>,
    /// None 时不检查也不写入撤销列表
    denylist: Option<Arc<dyn Denylist>>,
    refresh_lifetime_seconds: i64,
}

impl RefreshCoordinator {
    pub fn new(
        jwt: Arc<JwtService>,
        users: Arc<dyn UserStore>,
        settings: Arc<SettingsResolver>,
        boot_epoch: Arc<BootEpoch>,
        denylist: Option<Arc<dyn Denylist>>,
        refresh_lifetime_seconds: i64,
    ) -> Self {
        Self {
            jwt,
            users,
            settings,
            boot_epoch,
            denylist,
            refresh_lifetime_seconds,
        }
    }

    /// 兑换 refresh token，返回新的 access token（轮换时附带新的 refresh token）
    pub async fn refresh(&self, raw_refresh: &str) -> Result<RefreshResult> {
        let result = self.redeem(raw_refresh).await;
        match &result {
            Ok(r) if r.refresh.is_some() => metrics::record_refresh("rotated"),
            Ok(_) => metrics::record_refresh("ok"),
            Err(e) => metrics::record_refresh(failure_label(e)),
        }
        result
    }

    async fn redeem(&self, raw_refresh: &str) -> Result<RefreshResult> {
        let claims = self.jwt.validate(raw_refresh.trim(), TokenType::Refresh)?;

        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti).await? {
                warn!("⚠️ 已撤销的 refresh token 被再次使用: sub={}, jti={}", claims.sub, claims.jti);
                return Err(ServerError::TokenRevoked);
            }
        }

        let settings = self.settings.resolve().await?;
        let now = self.jwt.clock().now();
        let idle_elapsed = now.saturating_sub(claims.iat);
        if idle_elapsed > settings.idle_timeout_seconds {
            debug!(
                "refresh 超出空闲窗口: sub={}, idle={}s, limit={}s",
                claims.sub, idle_elapsed, settings.idle_timeout_seconds
            );
            return Err(ServerError::SessionExpiredByInactivity);
        }

        let user_id = claims.user_id().ok_or(ServerError::InvalidToken)?;
        match self.users.find_by_id(user_id).await? {
            Some(p) if p.is_active => {}
            _ => return Err(ServerError::PrincipalMissing),
        }

        // 轮换时先原子占用旧 jti，并发兑换只有一方能拿到新 token
        if settings.rotate_refresh_tokens {
            match &self.denylist {
                Some(denylist) => {
                    if !denylist.try_revoke(&claims.jti, claims.exp).await? {
                        warn!("⚠️ refresh token 已被并发兑换: sub={}, jti={}", claims.sub, claims.jti);
                        return Err(ServerError::TokenRevoked);
                    }
                }
                None => debug!("撤销列表未启用，旧 refresh token 不会失效: jti={}", claims.jti),
            }
        }

        let access = self.jwt.issue_access(
            user_id,
            self.boot_epoch.current(),
            settings.access_lifetime_seconds,
        )?;

        if !settings.rotate_refresh_tokens {
            debug!("refresh 完成（未轮换）: user_id={}", user_id);
            return Ok(RefreshResult {
                access: access.token,
                refresh: None,
                access_expires_in: settings.access_lifetime_seconds,
            });
        }

        let rotated = self.jwt.issue_refresh(user_id, self.refresh_lifetime_seconds)?;

        info!("🔄 refresh token 已轮换: user_id={}", user_id);
        Ok(RefreshResult {
            access: access.token,
            refresh: Some(rotated.token),
            access_expires_in: settings.access_lifetime_seconds,
        })
    }
}

fn failure_label(err: &ServerError) -> &'static str {
    match err {
        ServerError::InvalidToken => "token_invalid",
        ServerError::TokenExpired => "token_expired",
        ServerError::TokenRevoked => "revoked",
        ServerError::SessionExpiredByInactivity => "session_expired_inactivity",
        ServerError::PrincipalMissing => "principal_missing",
        _ => "error",
    }
}
