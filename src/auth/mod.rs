// 认证模块 - JWT 签发与校验、refresh、撤销列表、boot epoch、运行期设置

pub mod boot_epoch;
pub mod clock;
pub mod effective_settings;
pub mod gateway;
pub mod jwt_service;
pub mod models;
pub mod password;
pub mod refresh;
pub mod service_key_manager;
pub mod session_state;
pub mod token_issue_service;
pub mod token_revocation;

// 重新导出主要类型
pub use boot_epoch::BootEpoch;
pub use clock::{Clock, ManualClock, SystemClock};
pub use effective_settings::SettingsResolver;
pub use gateway::{extract_bearer, AccessCheck, AuthGateway, BootEpochCheck, DenylistCheck};
pub use jwt_service::{IssuedToken, JwtService, TokenError};
pub use models::{
    EffectiveAuthSettings, Principal, RefreshResult, SettingsUpdate, TokenClaims, TokenPair,
    TokenType,
};
pub use password::{hash_password, verify_password, PASSWORD_COST};
pub use refresh::RefreshCoordinator;
pub use service_key_manager::ServiceKeyManager;
pub use session_state::{AuthFailure, AuthOutcome, AuthenticatedSession, RejectReason};
pub use token_issue_service::TokenIssueService;
pub use token_revocation::{Denylist, MokaDenylist, RedisDenylist};
