//! Token 撤销列表（denylist）
//!
//! 以 jti 为键，条目在令牌自身的 exp 之后自动失效，存储规模约等于尚未过期的已撤销令牌数。
//! 存储不可用时返回 [`ServerError::DenylistUnavailable`]，调用方不得把它当作“未撤销”。

use crate::auth::clock::Clock;
use crate::error::{Result, ServerError};
use crate::infra::redis::RedisClient;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 撤销列表接口
#[async_trait]
pub trait Denylist: Send + Sync {
    /// 撤销 jti，直到 expires_at（Unix 秒）。重复撤销是幂等的
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<()>;

    /// jti 是否处于撤销状态
    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    /// 原子地占用 jti：本次调用写入返回 true，已被撤销返回 false
    ///
    /// refresh token 轮换用它保证同一个 token 只能兑换一次。
    async fn try_revoke(&self, jti: &str, expires_at: i64) -> Result<bool>;
}

/// 按条目自身过期时间计算 TTL
struct RevocationExpiry {
    clock: Arc<dyn Clock>,
}

impl RevocationExpiry {
    fn remaining(&self, expires_at: i64) -> Option<Duration> {
        let remaining = (expires_at - self.clock.now()).max(0) as u64;
        Some(Duration::from_secs(remaining))
    }
}

impl Expiry<String, i64> for RevocationExpiry {
    fn expire_after_create(&self, _key: &String, expires_at: &i64, _created_at: Instant) -> Option<Duration> {
        self.remaining(*expires_at)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        expires_at: &i64,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.remaining(*expires_at)
    }
}

/// 进程内撤销列表（Moka）
///
/// 单实例部署使用；多实例需要 [`RedisDenylist`]。
pub struct MokaDenylist {
    entries: Cache<String, i64>,
    clock: Arc<dyn Clock>,
}

impl MokaDenylist {
    pub fn new(max_capacity: u64, clock: Arc<dyn Clock>) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(RevocationExpiry { clock: clock.clone() })
            .build();

        Self { entries, clock }
    }

    /// 当前条目数（近似值）
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[async_trait]
impl Denylist for MokaDenylist {
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<()> {
        let now = self.clock.now();
        if expires_at <= now {
            debug!("令牌已自然过期，无需撤销: jti={}", jti);
            return Ok(());
        }

        // 已存在时保留较晚的过期时间
        let entry = self
            .entries
            .entry(jti.to_string())
            .and_upsert_with(|existing| async move {
                match existing {
                    Some(e) if *e.value() >= expires_at => *e.value(),
                    _ => expires_at,
                }
            })
            .await;

        info!("✅ 已撤销 token: jti={}, ttl={}s", jti, entry.value() - now);
        Ok(())
    }

    async fn try_revoke(&self, jti: &str, expires_at: i64) -> Result<bool> {
        let now = self.clock.now();
        if expires_at <= now {
            return Ok(false);
        }

        let entry = self
            .entries
            .entry(jti.to_string())
            .or_insert_with(async move { expires_at })
            .await;

        Ok(entry.is_fresh())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let revoked = match self.entries.get(jti).await {
            Some(expires_at) => expires_at > self.clock.now(),
            None => false,
        };
        Ok(revoked)
    }
}

/// Redis 撤销列表（多实例共享）
pub struct RedisDenylist {
    redis: RedisClient,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl RedisDenylist {
    pub fn new(redis: RedisClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            redis,
            clock,
            key_prefix: "authgate:denylist:".to_string(),
        }
    }

    fn key(&self, jti: &str) -> String {
        format!("{}{}", self.key_prefix, jti)
    }
}

#[async_trait]
impl Denylist for RedisDenylist {
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<()> {
        let ttl = expires_at - self.clock.now();
        if ttl <= 0 {
            debug!("令牌已自然过期，无需撤销: jti={}", jti);
            return Ok(());
        }

        self.redis
            .setex(&self.key(jti), ttl as u64, &expires_at.to_string())
            .await
            .map_err(|e| {
                warn!("❌ 写入撤销列表失败: jti={}, error={}", jti, e);
                ServerError::DenylistUnavailable(e.to_string())
            })?;

        info!("✅ 已撤销 token: jti={}, ttl={}s", jti, ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        self.redis.exists(&self.key(jti)).await.map_err(|e| {
            warn!("❌ 查询撤销列表失败: jti={}, error={}", jti, e);
            ServerError::DenylistUnavailable(e.to_string())
        })
    }

    async fn try_revoke(&self, jti: &str, expires_at: i64) -> Result<bool> {
        let ttl = expires_at - self.clock.now();
        if ttl <= 0 {
            return Ok(false);
        }

        self.redis
            .set_nx_ex(&self.key(jti), ttl as u64, &expires_at.to_string())
            .await
            .map_err(|e| {
                warn!("❌ 占用撤销列表失败: jti={}, error={}", jti, e);
                ServerError::DenylistUnavailable(e.to_string())
            })
    }
}
