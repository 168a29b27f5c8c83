// Infrastructure layer - 基础设施层
// 数据库连接池、Redis 连接池、Prometheus 指标

pub mod database;
pub mod metrics;
pub mod redis;

pub use database::Database;
pub use redis::RedisClient;
