//! 运行期设置存储（authgate_settings 表，key 唯一）

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;

use crate::error::{Result, ServerError};

/// 设置键值存储。值不做格式校验，由调用方转换类型
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// 读取；不存在返回 None（不是错误）
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 按 key upsert
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// 设置 Repository（PostgreSQL）
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM authgate_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ServerError::Database(format!("get_setting: {}", e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO authgate_settings (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET value = $2, updated_at = $3
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ServerError::Database(format!("set_setting: {}", e)))?;
        Ok(())
    }
}

/// 内存设置存储（测试、无数据库的单机运行）
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    values: DashMap<String, String>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
