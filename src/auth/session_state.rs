// =====================================================
// 请求认证结果
// =====================================================

use serde::Serialize;

use crate::auth::models::Principal;
use crate::error::ServerError;

/// 认证失败的内部原因，只用于日志和指标，不对外区分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// 结构、签名、签发者或类型不符
    TokenInvalid,
    /// exp 已到
    TokenExpired,
    /// jti 在撤销列表中
    Revoked,
    /// 用户不存在或已停用
    PrincipalMissing,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::TokenInvalid => "token_invalid",
            AuthFailure::TokenExpired => "token_expired",
            AuthFailure::Revoked => "revoked",
            AuthFailure::PrincipalMissing => "principal_missing",
        }
    }
}

/// 拒绝原因
///
/// 只有服务重启导致的失效对客户端可见（客户端据此静默重新登录）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AuthFailed(AuthFailure),
    SessionExpiredByRestart,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::AuthFailed(cause) => cause.as_str(),
            RejectReason::SessionExpiredByRestart => "session_expired_restart",
        }
    }
}

impl From<RejectReason> for ServerError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::AuthFailed(AuthFailure::TokenInvalid) => ServerError::InvalidToken,
            RejectReason::AuthFailed(AuthFailure::TokenExpired) => ServerError::TokenExpired,
            RejectReason::AuthFailed(AuthFailure::Revoked) => ServerError::TokenRevoked,
            RejectReason::AuthFailed(AuthFailure::PrincipalMissing) => ServerError::PrincipalMissing,
            RejectReason::SessionExpiredByRestart => ServerError::SessionExpiredByRestart,
        }
    }
}

/// 已认证请求的上下文，由中间件放入 request extensions
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedSession {
    pub principal: Principal,
    pub jti: String,
    pub seconds_to_expiry: i64,
    /// 即将过期，客户端应尽快 refresh
    pub near_expiry: bool,
}

/// 一次认证的结果
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// 请求未携带 bearer 凭据（匿名，不是错误）
    Unauthenticated,
    Authenticated(AuthenticatedSession),
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            AuthOutcome::Unauthenticated => "unauthenticated",
            AuthOutcome::Authenticated(_) => "authenticated",
            AuthOutcome::Rejected(reason) => reason.as_str(),
        }
    }
}
