/// 管理接口 X-Service-Key 校验
pub struct ServiceKeyManager {
    master_key: String,
}

impl ServiceKeyManager {
    pub fn new(master_key: impl Into<String>) -> Self {
        Self {
            master_key: master_key.into(),
        }
    }

    /// 验证 service key；未配置主密钥时一律拒绝
    pub fn verify(&self, key: &str) -> bool {
        if self.master_key.is_empty() {
            return false;
        }
        // 使用恒定时间比较防止时序攻击
        constant_time_compare(key.as_bytes(), self.master_key.as_bytes())
    }
}

/// 恒定时间比较
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
