//! Prometheus 指标：认证结果、refresh 结果、登出次数、连接池状态
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。
//! 未初始化时各 `record_*` 调用是空操作。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_AUTH_OUTCOMES: &str = "authgate_auth_outcomes_total";
const COUNTER_REFRESH: &str = "authgate_refresh_total";
const COUNTER_LOGOUT: &str = "authgate_logout_total";
const COUNTER_LOGIN: &str = "authgate_login_total";
const GAUGE_REDIS_POOL_ACTIVE: &str = "authgate_redis_pool_active";
const GAUGE_REDIS_POOL_IDLE: &str = "authgate_redis_pool_idle";
const GAUGE_DB_POOL_ACTIVE: &str = "authgate_db_pool_active";
const GAUGE_DB_POOL_IDLE: &str = "authgate_db_pool_idle";

/// 初始化 Prometheus 指标（安装全局 Recorder）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 渲染当前指标为 Prometheus 文本格式
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一次请求认证结果（authenticated / unauthenticated / 拒绝原因）
pub fn record_auth_outcome(outcome: &'static str) {
    metrics::counter!(COUNTER_AUTH_OUTCOMES, "outcome" => outcome).increment(1);
}

/// 记录一次 refresh（ok / rotated / 失败原因）
pub fn record_refresh(result: &'static str) {
    metrics::counter!(COUNTER_REFRESH, "result" => result).increment(1);
}

pub fn record_logout() {
    metrics::counter!(COUNTER_LOGOUT).increment(1);
}

/// 记录一次登录（ok / failed）
pub fn record_login(result: &'static str) {
    metrics::counter!(COUNTER_LOGIN, "result" => result).increment(1);
}

/// 更新 Redis 连接池状态（Gauge）
pub fn record_redis_pool(active: u32, idle: u32) {
    metrics::gauge!(GAUGE_REDIS_POOL_ACTIVE).set(active as f64);
    metrics::gauge!(GAUGE_REDIS_POOL_IDLE).set(idle as f64);
}

/// 更新数据库连接池状态（Gauge）
pub fn record_db_pool(active: u32, idle: u32) {
    metrics::gauge!(GAUGE_DB_POOL_ACTIVE).set(active as f64);
    metrics::gauge!(GAUGE_DB_POOL_IDLE).set(idle as f64);
}
