
use serde::{Deserialize, Serialize};

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT Claims（access 与 refresh 共用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// JWT 标准字段 - 签发者
    pub iss: String,
    /// JWT 标准字段 - 主题 (用户ID)
    pub sub: String,
    /// JWT 标准字段 - 签发时间 (Unix 秒)
    pub iat: i64,
    /// JWT 标准字段 - 过期时间 (Unix 秒)
    pub exp: i64,
    /// JWT 标准字段 - JWT ID (用于撤销)
    pub jti: String,
    /// 自定义字段 - 令牌类型
    pub token_type: TokenType,
    /// 自定义字段 - 签发时的服务实例纪元，仅 access token 携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_epoch: Option<i64>,
}

impl TokenClaims {
    /// 解析 sub 为用户ID
    pub fn user_id(&self) -> Option<u64> {
        self.sub.parse().ok()
    }

    /// 距过期的秒数（不小于 0）
    pub fn seconds_to_expiry(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }
}

/// 已认证主体（由外部用户存储持有，这里只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// 用户ID
    pub id: u64,
    /// 用户名
    pub username: String,
    /// 是否启用
    pub is_active: bool,
}

impl Principal {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_active: true,
        }
    }
}

/// 登录校验用的凭据记录
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub principal: Principal,
    /// bcrypt 哈希
    pub password_hash: String,
}

/// 登录签发的令牌对
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// access token 有效期（秒）
    pub access_expires_in: i64,
}

/// refresh 结果；未开启轮换时 refresh 为 None，原 refresh token 继续有效
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResult {
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    pub access_expires_in: i64,
}

/// 当前生效的认证设置快照（每次读取重新计算，不缓存）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAuthSettings {
    pub renew_at_seconds: i64,
    pub idle_timeout_seconds: i64,
    pub access_lifetime_seconds: i64,
    pub rotate_refresh_tokens: bool,
}

/// 管理员提交的部分设置更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub renew_at_seconds: Option<i64>,
    pub idle_timeout_seconds: Option<i64>,
    pub access_lifetime_seconds: Option<i64>,
    pub rotate_refresh_tokens: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.renew_at_seconds.is_none()
            && self.idle_timeout_seconds.is_none()
            && self.access_lifetime_seconds.is_none()
            && self.rotate_refresh_tokens.is_none()
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// refresh 请求
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}
