//! 生效中的认证设置
//!
//! 每个键先读设置存储，存在且能解析为目标类型时使用存储值，否则回落到编译期默认值（`AuthConfig`）。
//! 不做任何缓存：管理员写入后，下一次决策立即看到新值。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::models::{EffectiveAuthSettings, SettingsUpdate};
use crate::config::AuthConfig;
use crate::error::{Result, ServerError};
use crate::repository::SettingsStore;

pub const KEY_RENEW_AT_SECONDS: &str = "AUTH_RENEW_AT_SECONDS";
pub const KEY_IDLE_TIMEOUT_SECONDS: &str = "AUTH_IDLE_TIMEOUT_SECONDS";
pub const KEY_ACCESS_LIFETIME_SECONDS: &str = "AUTH_ACCESS_LIFETIME_SECONDS";
pub const KEY_ROTATE_REFRESH_TOKENS: &str = "AUTH_ROTATE_REFRESH_TOKENS";

const IDLE_TIMEOUT_RANGE: (i64, i64) = (60, 9999);
const ACCESS_LIFETIME_RANGE: (i64, i64) = (60, 86400);
const RENEW_AT_RANGE: (i64, i64) = (0, 3600);

/// 存储值到目标类型的转换
pub trait SettingValue: Sized {
    fn parse_setting(raw: &str) -> Option<Self>;
    fn to_setting(&self) -> String;
}

impl SettingValue for i64 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn to_setting(&self) -> String {
        self.to_string()
    }
}

impl SettingValue for bool {
    /// "1/true/yes/on" 与 "0/false/no/off"（忽略大小写），其余按整数处理，非零为真
    fn parse_setting(raw: &str) -> Option<Self> {
        let value = raw.trim().to_ascii_lowercase();
        match value.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => other.parse::<i64>().ok().map(|n| n != 0),
        }
    }

    fn to_setting(&self) -> String {
        let value = if *self { "true" } else { "false" };
        value.to_string()
    }
}

/// 存储值可解析时用存储值，否则用默认值
pub fn typed_or<T: SettingValue>(key: &str, raw: Option<&str>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match T::parse_setting(raw) {
            Some(value) => value,
            None => {
                warn!("⚠️ 设置 {} 的值无法解析，使用默认值: {:?}", key, raw);
                default
            }
        },
    }
}

/// 认证设置解析器
pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
    defaults: EffectiveAuthSettings,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn SettingsStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            defaults: EffectiveAuthSettings {
                renew_at_seconds: config.renew_at_seconds,
                idle_timeout_seconds: config.idle_timeout_seconds,
                access_lifetime_seconds: config.access_lifetime_seconds(),
                rotate_refresh_tokens: config.rotate_refresh_tokens,
            },
        }
    }

    /// 编译期默认值（未被存储覆盖时）
    pub fn defaults(&self) -> EffectiveAuthSettings {
        self.defaults
    }

    async fn read<T: SettingValue>(&self, key: &str, default: T) -> Result<T> {
        let raw = self.store.get(key).await?;
        Ok(typed_or(key, raw.as_deref(), default))
    }

    /// 读取当前生效设置
    ///
    /// 存储读取失败直接返回错误，不当作“未设置”。
    pub async fn resolve(&self) -> Result<EffectiveAuthSettings> {
        let d = self.defaults;
        let renew_at_seconds = self.read(KEY_RENEW_AT_SECONDS, d.renew_at_seconds).await?;
        let idle_timeout_seconds = self.read(KEY_IDLE_TIMEOUT_SECONDS, d.idle_timeout_seconds).await?;
        let access_lifetime_seconds = self
            .read(KEY_ACCESS_LIFETIME_SECONDS, d.access_lifetime_seconds)
            .await?;
        let rotate_refresh_tokens = self.read(KEY_ROTATE_REFRESH_TOKENS, d.rotate_refresh_tokens).await?;

        let settings = EffectiveAuthSettings {
            renew_at_seconds: renew_at_seconds.clamp(0, RENEW_AT_RANGE.1),
            idle_timeout_seconds: idle_timeout_seconds.clamp(1, IDLE_TIMEOUT_RANGE.1),
            access_lifetime_seconds: access_lifetime_seconds.clamp(1, ACCESS_LIFETIME_RANGE.1),
            rotate_refresh_tokens,
        };
        debug!("effective auth settings: {:?}", settings);
        Ok(settings)
    }

    /// 管理员更新设置：全部字段校验通过后才写入
    pub async fn update(&self, update: &SettingsUpdate) -> Result<EffectiveAuthSettings> {
        let current = self.resolve().await?;
        validate_update(update, &current)?;

        if let Some(v) = update.renew_at_seconds {
            self.store.set(KEY_RENEW_AT_SECONDS, &v.to_setting()).await?;
        }
        if let Some(v) = update.idle_timeout_seconds {
            self.store.set(KEY_IDLE_TIMEOUT_SECONDS, &v.to_setting()).await?;
        }
        if let Some(v) = update.access_lifetime_seconds {
            self.store.set(KEY_ACCESS_LIFETIME_SECONDS, &v.to_setting()).await?;
        }
        if let Some(v) = update.rotate_refresh_tokens {
            self.store.set(KEY_ROTATE_REFRESH_TOKENS, &v.to_setting()).await?;
        }

        let settings = self.resolve().await?;
        info!("✅ 认证设置已更新: {:?}", settings);
        Ok(settings)
    }
}

fn check_range(errors: &mut Vec<String>, field: &str, value: i64, (min, max): (i64, i64)) {
    if value < min || value > max {
        errors.push(format!("{} must be between {} and {}", field, min, max));
    }
}

/// 校验部分更新；未提供的字段用当前生效值参与 renew < access 的比较
fn validate_update(update: &SettingsUpdate, current: &EffectiveAuthSettings) -> Result<()> {
    let mut errors = Vec::new();

    if let Some(v) = update.idle_timeout_seconds {
        check_range(&mut errors, "idle_timeout_seconds", v, IDLE_TIMEOUT_RANGE);
    }
    if let Some(v) = update.access_lifetime_seconds {
        check_range(&mut errors, "access_lifetime_seconds", v, ACCESS_LIFETIME_RANGE);
    }
    if let Some(v) = update.renew_at_seconds {
        check_range(&mut errors, "renew_at_seconds", v, RENEW_AT_RANGE);
    }

    if update.renew_at_seconds.is_some() || update.access_lifetime_seconds.is_some() {
        let renew = update.renew_at_seconds.unwrap_or(current.renew_at_seconds);
        let access = update.access_lifetime_seconds.unwrap_or(current.access_lifetime_seconds);
        if renew >= access {
            errors.push(format!(
                "renew_at_seconds ({}) must be less than access_lifetime_seconds ({})",
                renew, access
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServerError::SettingsValidation(errors))
    }
}
