/// 密码加密和验证模块
///
/// 使用 bcrypt 算法进行密码加密
use bcrypt::{hash, verify, DEFAULT_COST};
use crate::error::{Result, ServerError};
use std::sync::OnceLock;

/// 密码加密成本（默认值12）
///
/// - 10: 约 80ms
/// - 12: 约 300ms
/// - 14: 约 1200ms
pub const PASSWORD_COST: u32 = DEFAULT_COST;

/// 加密密码，返回 60 字符的 bcrypt 哈希
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with_cost(password, PASSWORD_COST)
}

/// 指定成本加密（测试中用最低成本加速）
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).map_err(|e| ServerError::Internal(format!("密码加密失败: {}", e)))
}

/// 验证密码
///
/// 哈希格式错误返回 Err，调用方应当作认证失败处理
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    verify(password, hash).map_err(|e| ServerError::Internal(format!("密码验证失败: {}", e)))
}

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// 与真实哈希同成本的占位哈希
///
/// 用户不存在时也对它做一次校验，使登录耗时与密码错误时一致。
pub fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        hash_password("authgate-unknown-user-placeholder").unwrap_or_else(|e| {
            tracing::warn!("⚠️ 占位哈希生成失败: {}", e);
            String::new()
        })
    })
}
