//! 服务实例纪元（boot epoch）
//!
//! access token 签发时写入当前纪元；校验时纪元不一致即视为服务重启后的旧会话。
//! 解析顺序：显式配置值 > 环境变量 `AUTHGATE_BOOT_EPOCH` > 首次读取时的时间戳（进程内只取一次）。
//! 多实例部署时所有实例必须共享同一个显式值或环境变量，否则会互相踢掉会话。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::auth::clock::Clock;
use crate::config::BOOT_EPOCH_ENV;

enum EpochSource {
    Fixed(i64),
    /// 外部可变的值（测试中模拟重启）
    Shared(Arc<AtomicI64>),
    /// 首次读取时取时钟并固定
    FirstAccess {
        cell: OnceLock<i64>,
        clock: Arc<dyn Clock>,
    },
}

/// boot epoch 跟踪器
pub struct BootEpoch {
    source: EpochSource,
}

impl std::fmt::Debug for BootEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            EpochSource::Fixed(_) => "fixed",
            EpochSource::Shared(_) => "shared",
            EpochSource::FirstAccess { .. } => "first_access",
        };
        f.debug_struct("BootEpoch").field("source", &kind).finish()
    }
}

impl BootEpoch {
    /// 固定值
    pub fn fixed(epoch: i64) -> Self {
        Self {
            source: EpochSource::Fixed(epoch),
        }
    }

    /// 共享可变值（测试用）
    pub fn shared(epoch: Arc<AtomicI64>) -> Self {
        Self {
            source: EpochSource::Shared(epoch),
        }
    }

    /// 首次读取时取时间戳
    pub fn first_access(clock: Arc<dyn Clock>) -> Self {
        Self {
            source: EpochSource::FirstAccess {
                cell: OnceLock::new(),
                clock,
            },
        }
    }

    /// 按配置 > 环境变量 > 首次读取 的顺序构造
    pub fn from_config(configured: Option<i64>, clock: Arc<dyn Clock>) -> Self {
        Self::from_sources(configured, std::env::var(BOOT_EPOCH_ENV).ok(), clock)
    }

    pub fn from_sources(
        configured: Option<i64>,
        env_value: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if let Some(epoch) = configured {
            info!("🔖 boot epoch 使用配置值: {}", epoch);
            return Self::fixed(epoch);
        }

        if let Some(raw) = env_value {
            match raw.trim().parse::<i64>() {
                Ok(epoch) => {
                    info!("🔖 boot epoch 使用环境变量 {}: {}", BOOT_EPOCH_ENV, epoch);
                    return Self::fixed(epoch);
                }
                Err(_) => {
                    warn!("⚠️ 环境变量 {} 不是整数，忽略: {:?}", BOOT_EPOCH_ENV, raw);
                }
            }
        }

        warn!("⚠️ 未配置 boot epoch，使用进程首次读取时间戳（多实例部署请显式配置）");
        Self::first_access(clock)
    }

    /// 当前纪元；同一进程内多次调用结果稳定（Shared 除外）
    pub fn current(&self) -> i64 {
        match &self.source {
            EpochSource::Fixed(epoch) => *epoch,
            EpochSource::Shared(epoch) => epoch.load(Ordering::SeqCst),
            EpochSource::FirstAccess { cell, clock } => *cell.get_or_init(|| clock.now()),
        }
    }
}
