//! 外部存储的访问层：用户与运行期设置

pub mod settings_repo;
pub mod user_repo;

pub use settings_repo::{InMemorySettingsStore, PgSettingsRepository, SettingsStore};
pub use user_repo::{InMemoryUserStore, UserRepository, UserStore};
