use crate::auth::boot_epoch::BootEpoch;
use crate::auth::effective_settings::SettingsResolver;
use crate::auth::jwt_service::JwtService;
use crate::auth::models::TokenPair;
use crate::auth::password::{dummy_hash, verify_password};
use crate::error::{Result, ServerError};
use crate::infra::metrics;
use crate::repository::UserStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 登录失败统一返回的消息，不区分用户不存在与密码错误
const LOGIN_FAILED: &str = "invalid credentials";

/// Token 签发服务（用户名密码登录）
pub struct TokenIssueService {
    jwt: Arc<JwtService>,
    users: Arc<dyn UserStore>,
    settings: Arc<SettingsResolver>,
    boot_epoch: Arc<BootEpoch>,
    refresh_lifetime_seconds: i64,
}

impl TokenIssueService {
    pub fn new(
        jwt: Arc<JwtService>,
        users: Arc<dyn UserStore>,
        settings: Arc<SettingsResolver>,
        boot_epoch: Arc<BootEpoch>,
        refresh_lifetime_seconds: i64,
    ) -> Self {
        Self {
            jwt,
            users,
            settings,
            boot_epoch,
            refresh_lifetime_seconds,
        }
    }

    /// 校验凭据并签发 access + refresh
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let result = self.issue(username, password).await;
        metrics::record_login(if result.is_ok() { "ok" } else { "failed" });
        result
    }

    async fn issue(&self, username: &str, password: &str) -> Result<TokenPair> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ServerError::Unauthorized(LOGIN_FAILED.to_string()));
        }

        let credentials = match self.users.find_credentials(username).await? {
            Some(c) => c,
            None => {
                // 同样走一次 bcrypt，耗时不暴露用户名是否存在
                let _ = verify_password(password, dummy_hash());
                debug!("登录失败，用户不存在: {}", username);
                return Err(ServerError::Unauthorized(LOGIN_FAILED.to_string()));
            }
        };

        let password_ok = verify_password(password, &credentials.password_hash).unwrap_or_else(|e| {
            warn!("⚠️ 用户 {} 的密码哈希无法校验: {}", username, e);
            false
        });
        if !password_ok {
            debug!("登录失败，密码错误: {}", username);
            return Err(ServerError::Unauthorized(LOGIN_FAILED.to_string()));
        }

        if !credentials.principal.is_active {
            debug!("登录失败，账号已停用: {}", username);
            return Err(ServerError::Unauthorized(LOGIN_FAILED.to_string()));
        }

        let settings = self.settings.resolve().await?;
        let user_id = credentials.principal.id;
        let access = self.jwt.issue_access(
            user_id,
            self.boot_epoch.current(),
            settings.access_lifetime_seconds,
        )?;
        let refresh = self.jwt.issue_refresh(user_id, self.refresh_lifetime_seconds)?;

        info!("✅ 登录成功: user_id={}, username={}", user_id, username);

        Ok(TokenPair {
            access: access.token,
            refresh: refresh.token,
            access_expires_in: settings.access_lifetime_seconds,
        })
    }
}
