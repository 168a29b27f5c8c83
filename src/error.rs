use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response, Json},
};

/// 认证失败时对客户端统一返回的消息（不泄露具体原因）
pub const NOT_AUTHENTICATED: &str = "not authenticated";

/// 服务器错误类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerError {
    /// 内部错误
    Internal(String),
    /// 设置校验失败（逐字段错误信息，未写入任何值）
    SettingsValidation(Vec<String>),
    /// 数据库错误
    Database(String),
    /// 配置错误
    Configuration(String),
    /// 缓存错误
    Cache(String),
    /// 撤销列表存储不可用（可重试）
    DenylistUnavailable(String),
    /// 超时错误
    Timeout(String),
    /// 服务不可用
    ServiceUnavailable(String),
    /// 错误请求
    BadRequest(String),
    /// 未授权
    Unauthorized(String),
    /// 无效令牌（签名或结构错误）
    InvalidToken,
    /// 令牌已过期
    TokenExpired,
    /// 令牌已撤销
    TokenRevoked,
    /// 令牌主体不存在或已停用
    PrincipalMissing,
    /// 服务重启导致会话失效（boot epoch 不匹配）
    SessionExpiredByRestart,
    /// 空闲超时导致会话失效
    SessionExpiredByInactivity,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ServerError::SettingsValidation(errors) => {
                write!(f, "Settings validation error: {}", errors.join("; "))
            }
            ServerError::Database(msg) => write!(f, "Database error: {}", msg),
            ServerError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Cache(msg) => write!(f, "Cache error: {}", msg),
            ServerError::DenylistUnavailable(msg) => write!(f, "Denylist unavailable: {}", msg),
            ServerError::Timeout(msg) => write!(f, "Timeout error: {}", msg),
            ServerError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ServerError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ServerError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ServerError::InvalidToken => write!(f, "Invalid token"),
            ServerError::TokenExpired => write!(f, "Token expired"),
            ServerError::TokenRevoked => write!(f, "Token revoked"),
            ServerError::PrincipalMissing => write!(f, "Principal missing"),
            ServerError::SessionExpiredByRestart => write!(f, "Session expired by server restart"),
            ServerError::SessionExpiredByInactivity => write!(f, "Session expired by inactivity"),
        }
    }
}

impl StdError for ServerError {}

impl ServerError {
    /// 是否为认证失败（对外统一为 401）
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ServerError::Unauthorized(_)
                | ServerError::InvalidToken
                | ServerError::TokenExpired
                | ServerError::TokenRevoked
                | ServerError::PrincipalMissing
                | ServerError::SessionExpiredByRestart
                | ServerError::SessionExpiredByInactivity
        )
    }

    /// 是否可重试（存储连接类故障）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServerError::DenylistUnavailable(_)
                | ServerError::Database(_)
                | ServerError::Cache(_)
                | ServerError::Timeout(_)
                | ServerError::ServiceUnavailable(_)
        )
    }

    /// 客户端可据此自动恢复的会话失效原因
    pub fn session_reason(&self) -> Option<&'static str> {
        match self {
            ServerError::SessionExpiredByRestart => Some("session_expired_restart"),
            ServerError::SessionExpiredByInactivity => Some("session_expired_inactivity"),
            _ => None,
        }
    }

    /// 对外暴露的消息。认证失败统一为 "not authenticated"，避免成为探测 oracle
    pub fn public_message(&self) -> String {
        if self.is_auth_failure() {
            NOT_AUTHENTICATED.to_string()
        } else {
            self.to_string()
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_auth_failure() => StatusCode::UNAUTHORIZED,
            ServerError::SettingsValidation(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::DenylistUnavailable(_) | ServerError::ServiceUnavailable(_) | ServerError::Database(_) | ServerError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!("❌ 请求失败: {}", self);
        }

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ServerError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 成功
    Success = 0,
    /// 内部错误
    Internal = 1000,
    /// 认证错误
    Authentication = 1001,
    /// 验证错误
    Validation = 1003,
    /// 数据库错误
    Database = 2000,
    /// 配置错误
    Configuration = 2003,
    /// 缓存错误
    Cache = 2004,
    /// 超时错误
    Timeout = 3002,
    /// 服务不可用
    ServiceUnavailable = 5000,
    /// 错误请求
    BadRequest = 5004,
    /// 会话因服务重启失效
    SessionExpiredRestart = 6001,
    /// 会话因空闲超时失效
    SessionExpiredInactivity = 6002,
}

impl From<&ServerError> for ErrorCode {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::Internal(_) => ErrorCode::Internal,
            ServerError::SettingsValidation(_) => ErrorCode::Validation,
            ServerError::Database(_) => ErrorCode::Database,
            ServerError::Configuration(_) => ErrorCode::Configuration,
            ServerError::Cache(_) => ErrorCode::Cache,
            ServerError::DenylistUnavailable(_) | ServerError::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            ServerError::Timeout(_) => ErrorCode::Timeout,
            ServerError::BadRequest(_) => ErrorCode::BadRequest,
            ServerError::SessionExpiredByRestart => ErrorCode::SessionExpiredRestart,
            ServerError::SessionExpiredByInactivity => ErrorCode::SessionExpiredInactivity,
            ServerError::Unauthorized(_)
            | ServerError::InvalidToken
            | ServerError::TokenExpired
            | ServerError::TokenRevoked
            | ServerError::PrincipalMissing => ErrorCode::Authentication,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 可自动恢复的会话失效原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 详细信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &ServerError) -> Self {
        let details = match error {
            ServerError::SettingsValidation(errors) => Some(errors.clone()),
            _ => None,
        };
        Self {
            code: ErrorCode::from(error),
            message: error.public_message(),
            reason: error.session_reason().map(str::to_string),
            details,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}
