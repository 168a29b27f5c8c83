//! 请求认证网关
//!
//! 每个请求按固定顺序判定：解析 bearer → 签名与过期 → 附加检查（撤销列表、boot epoch）→ 用户存在且启用。
//! 附加检查是可组合的 [`AccessCheck`]，由配置决定启用哪些。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::auth::boot_epoch::BootEpoch;
use crate::auth::effective_settings::SettingsResolver;
use crate::auth::jwt_service::{JwtService, TokenError};
use crate::auth::models::{TokenClaims, TokenType};
use crate::auth::session_state::{AuthFailure, AuthOutcome, AuthenticatedSession, RejectReason};
use crate::auth::token_revocation::Denylist;
use crate::config::AuthConfig;
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::repository::UserStore;

/// 从 Authorization 头提取 bearer token
///
/// 要求恰好两段（以空白分隔），scheme 不区分大小写。
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let mut parts = header?.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

/// 签名校验通过后的附加检查
#[async_trait]
pub trait AccessCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ok(None) 放行，Ok(Some) 拒绝；Err 表示检查本身不可用
    async fn check(&self, claims: &TokenClaims) -> Result<Option<RejectReason>>;
}

/// 撤销列表检查
pub struct DenylistCheck {
    denylist: Arc<dyn Denylist>,
}

impl DenylistCheck {
    pub fn new(denylist: Arc<dyn Denylist>) -> Self {
        Self { denylist }
    }
}

#[async_trait]
impl AccessCheck for DenylistCheck {
    fn name(&self) -> &'static str {
        "denylist"
    }

    async fn check(&self, claims: &TokenClaims) -> Result<Option<RejectReason>> {
        if self.denylist.is_revoked(&claims.jti).await? {
            return Ok(Some(RejectReason::AuthFailed(AuthFailure::Revoked)));
        }
        Ok(None)
    }
}

/// boot epoch 检查；缺少 boot_epoch 的 token 视为不一致
pub struct BootEpochCheck {
    epoch: Arc<BootEpoch>,
}

impl BootEpochCheck {
    pub fn new(epoch: Arc<BootEpoch>) -> Self {
        Self { epoch }
    }
}

#[async_trait]
impl AccessCheck for BootEpochCheck {
    fn name(&self) -> &'static str {
        "boot_epoch"
    }

    async fn check(&self, claims: &TokenClaims) -> Result<Option<RejectReason>> {
        let current = self.epoch.current();
        if claims.boot_epoch != Some(current) {
            debug!(
                "boot epoch 不一致: token={:?}, current={}, jti={}",
                claims.boot_epoch, current, claims.jti
            );
            return Ok(Some(RejectReason::SessionExpiredByRestart));
        }
        Ok(None)
    }
}

/// 认证网关
pub struct AuthGateway {
    jwt: Arc<JwtService>,
    checks: Vec<Box<dyn AccessCheck>>,
    users: Arc<dyn UserStore>,
    settings: Arc<SettingsResolver>,
    denylist: Arc<dyn Denylist>,
}

impl AuthGateway {
    pub fn new(
        jwt: Arc<JwtService>,
        checks: Vec<Box<dyn AccessCheck>>,
        users: Arc<dyn UserStore>,
        settings: Arc<SettingsResolver>,
        denylist: Arc<dyn Denylist>,
    ) -> Self {
        Self {
            jwt,
            checks,
            users,
            settings,
            denylist,
        }
    }

    /// 按配置组装检查：撤销列表在前，boot epoch 在后
    pub fn from_config(
        config: &AuthConfig,
        jwt: Arc<JwtService>,
        denylist: Arc<dyn Denylist>,
        boot_epoch: Arc<BootEpoch>,
        users: Arc<dyn UserStore>,
        settings: Arc<SettingsResolver>,
    ) -> Self {
        let mut checks: Vec<Box<dyn AccessCheck>> = Vec::new();
        if config.enforce_denylist {
            checks.push(Box::new(DenylistCheck::new(denylist.clone())));
        }
        if config.enforce_boot_epoch {
            checks.push(Box::new(BootEpochCheck::new(boot_epoch)));
        }

        let names: Vec<&str> = checks.iter().map(|c| c.name()).collect();
        info!("🔐 认证网关已启用检查: {:?}", names);

        Self::new(jwt, checks, users, settings, denylist)
    }

    pub fn settings(&self) -> &Arc<SettingsResolver> {
        &self.settings
    }

    /// 认证一个请求
    ///
    /// 存储不可用（撤销列表、用户库、设置库）时返回 Err，不会当作认证失败。
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthOutcome> {
        let outcome = self.decide(authorization).await?;
        metrics::record_auth_outcome(outcome.label());

        match &outcome {
            AuthOutcome::Rejected(reason) => debug!("❌ 认证被拒绝: {}", reason.as_str()),
            AuthOutcome::Authenticated(session) => debug!(
                "✅ 认证通过: user_id={}, seconds_to_expiry={}, near_expiry={}",
                session.principal.id, session.seconds_to_expiry, session.near_expiry
            ),
            AuthOutcome::Unauthenticated => {}
        }
        Ok(outcome)
    }

    async fn decide(&self, authorization: Option<&str>) -> Result<AuthOutcome> {
        let token = match extract_bearer(authorization) {
            Some(token) => token,
            None => return Ok(AuthOutcome::Unauthenticated),
        };

        let claims = match self.jwt.validate(token, TokenType::Access) {
            Ok(claims) => claims,
            Err(TokenError::Invalid) => return Ok(reject(AuthFailure::TokenInvalid)),
            Err(TokenError::Expired) => return Ok(reject(AuthFailure::TokenExpired)),
        };

        for check in &self.checks {
            if let Some(reason) = check.check(&claims).await? {
                return Ok(AuthOutcome::Rejected(reason));
            }
        }

        let user_id = match claims.user_id() {
            Some(id) => id,
            None => return Ok(reject(AuthFailure::TokenInvalid)),
        };
        let principal = match self.users.find_by_id(user_id).await? {
            Some(p) if p.is_active => p,
            _ => return Ok(reject(AuthFailure::PrincipalMissing)),
        };

        let settings = self.settings.resolve().await?;
        let seconds_to_expiry = claims.seconds_to_expiry(self.jwt.clock().now());
        let near_expiry =
            settings.rotate_refresh_tokens && seconds_to_expiry <= settings.renew_at_seconds;

        Ok(AuthOutcome::Authenticated(AuthenticatedSession {
            principal,
            jti: claims.jti,
            seconds_to_expiry,
            near_expiry,
        }))
    }

    /// 登出：撤销当前 access token，重复调用结果相同
    pub async fn logout(&self, authorization: Option<&str>) -> Result<()> {
        let token = extract_bearer(authorization)
            .ok_or_else(|| ServerError::Unauthorized("missing bearer token".to_string()))?;

        let claims = self.jwt.validate(token, TokenType::Access).map_err(|e| {
            debug!("登出使用的 token 无效: {}", e);
            ServerError::from(e)
        })?;

        self.denylist.revoke(&claims.jti, claims.exp).await.map_err(|e| {
            warn!("❌ 登出写入撤销列表失败: jti={}, error={}", claims.jti, e);
            e
        })?;

        metrics::record_logout();
        info!("👋 用户登出: sub={}, jti={}", claims.sub, claims.jti);
        Ok(())
    }
}

fn reject(cause: AuthFailure) -> AuthOutcome {
    AuthOutcome::Rejected(RejectReason::AuthFailed(cause))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("bearer   abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("BEARER abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("Bearer")), None);
        assert_eq!(extract_bearer(Some("Bearer abc def")), None);
        assert_eq!(extract_bearer(Some("Basic abc")), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(None), None);
    }
}
