//! 用户仓库 - 认证核心只读取主体信息

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::models::{Principal, UserCredentials};
use crate::error::{Result, ServerError};

/// 外部用户存储
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 根据ID查找用户
    async fn find_by_id(&self, user_id: u64) -> Result<Option<Principal>>;

    /// 根据用户名查找凭据（登录用）
    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    username: String,
    password_hash: Option<String>,
    is_active: bool,
}

impl UserRow {
    fn principal(&self) -> Principal {
        Principal {
            id: self.user_id as u64,
            username: self.username.clone(),
            is_active: self.is_active,
        }
    }
}

/// 用户仓库 (PostgreSQL 实现)
#[derive(Clone)]
pub struct UserRepository {
    pool: Arc<PgPool>,
}

impl UserRepository {
    /// 创建新的用户仓库
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, user_id: u64) -> Result<Option<Principal>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password_hash, is_active
            FROM authgate_users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id as i64)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query user: {}", e)))?;

        Ok(row.map(|r| r.principal()))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password_hash, is_active
            FROM authgate_users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| ServerError::Database(format!("Failed to query user: {}", e)))?;

        // 没有密码哈希的账号（外部账号系统导入）不能通过密码登录
        Ok(row.and_then(|r| {
            let principal = r.principal();
            r.password_hash.map(|password_hash| UserCredentials {
                principal,
                password_hash,
            })
        }))
    }
}

/// 内存用户存储（测试用）
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<u64, UserCredentials>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal: Principal, password_hash: impl Into<String>) {
        self.users.insert(
            principal.id,
            UserCredentials {
                principal,
                password_hash: password_hash.into(),
            },
        );
    }

    pub fn remove(&self, user_id: u64) {
        self.users.remove(&user_id);
    }

    pub fn set_active(&self, user_id: u64, is_active: bool) {
        if let Some(mut entry) = self.users.get_mut(&user_id) {
            entry.principal.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: u64) -> Result<Option<Principal>> {
        Ok(self.users.get(&user_id).map(|u| u.principal.clone()))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.principal.username == username)
            .map(|u| u.value().clone()))
    }
}
