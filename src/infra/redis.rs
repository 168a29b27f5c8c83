// RedisClient - Redis客户端实现
// 基于 bb8-redis 连接池

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::ServerError;

/// Redis 客户端（基于连接池）
#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    /// 单条 Redis 命令的执行超时
    command_timeout: Duration,
}

impl RedisClient {
    /// 创建新的 Redis 客户端（从 RedisConfig 配置）
    pub async fn new(config: &RedisConfig) -> Result<Self, ServerError> {
        let manager = RedisConnectionManager::new(config.url.clone()).map_err(|e| {
            ServerError::Configuration(format!("Failed to create Redis manager: {}", e))
        })?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(config.connection_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .build(manager)
            .await
            .map_err(|e| ServerError::Cache(format!("Failed to create Redis pool: {}", e)))?;

        let client = Self {
            pool: Arc::new(pool),
            command_timeout: config.command_timeout(),
        };

        // 测试连接
        client.ping().await?;

        tracing::info!(
            "✅ Redis 连接池已创建 (pool_size={}, min_idle={}, conn_timeout={}s, cmd_timeout={}ms, idle_timeout={}s)",
            config.pool_size,
            config.min_idle,
            config.connection_timeout_secs,
            config.command_timeout_ms,
            config.idle_timeout_secs,
        );

        Ok(client)
    }

    /// 获取连接池状态（活跃连接数、空闲连接数）
    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }

    /// 从连接池获取连接
    async fn get_conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, ServerError> {
        self.pool
            .get()
            .await
            .map_err(|e| ServerError::Cache(format!("Failed to get Redis connection: {}", e)))
    }

    /// 执行带超时的 Redis 操作
    async fn with_timeout<F, T>(&self, op: F) -> Result<T, ServerError>
    where
        F: std::future::Future<Output = Result<T, ServerError>>,
    {
        tokio::time::timeout(self.command_timeout, op)
            .await
            .map_err(|_| {
                ServerError::Timeout(format!(
                    "Redis command timeout ({}ms)",
                    self.command_timeout.as_millis()
                ))
            })?
    }

    /// PING
    pub async fn ping(&self) -> Result<(), ServerError> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let _: String = conn
                .ping()
                .await
                .map_err(|e| ServerError::Cache(format!("Redis ping failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// SETEX key seconds value
    pub async fn setex(&self, key: &str, seconds: u64, value: &str) -> Result<(), ServerError> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            conn.set_ex::<_, _, ()>(key, value, seconds)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis SETEX failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// SET key value NX EX seconds；写入成功返回 true，key 已存在返回 false
    pub async fn set_nx_ex(&self, key: &str, seconds: u64, value: &str) -> Result<bool, ServerError> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(seconds)
                .query_async(&mut *conn)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis SET NX failed: {}", e)))?;
            Ok(reply.is_some())
        })
        .await
    }

    /// EXISTS key
    pub async fn exists(&self, key: &str) -> Result<bool, ServerError> {
        self.with_timeout(async {
            let mut conn = self.get_conn().await?;
            let exists: bool = conn
                .exists(key)
                .await
                .map_err(|e| ServerError::Cache(format!("Redis EXISTS failed: {}", e)))?;
            Ok(exists)
        })
        .await
    }
}
