use crate::auth::clock::Clock;
use crate::auth::models::{TokenClaims, TokenType};
use crate::error::{Result, ServerError};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

/// 令牌校验失败原因（内部区分，对外统一为认证失败）
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// 结构错误、签名错误、签发者或令牌类型不符
    #[error("token invalid")]
    Invalid,
    /// exp 已到（含边界）
    #[error("token expired")]
    Expired,
}

impl From<TokenError> for ServerError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ServerError::InvalidToken,
            TokenError::Expired => ServerError::TokenExpired,
        }
    }
}

/// 签发的令牌及其 claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// JWT 签发和验证服务 (HS256)
///
/// 过期判断使用注入的 [`Clock`]，不依赖 jsonwebtoken 的墙钟校验。
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    /// 创建 JWT 服务 (HS256 对称加密)
    pub fn new(secret: &str, issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 签发 access token，携带 boot_epoch
    pub fn issue_access(
        &self,
        user_id: u64,
        boot_epoch: i64,
        lifetime_seconds: i64,
    ) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Access, Some(boot_epoch), lifetime_seconds)
    }

    /// 签发 refresh token
    pub fn issue_refresh(&self, user_id: u64, lifetime_seconds: i64) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Refresh, None, lifetime_seconds)
    }

    fn issue(
        &self,
        user_id: u64,
        token_type: TokenType,
        boot_epoch: Option<i64>,
        lifetime_seconds: i64,
    ) -> Result<IssuedToken> {
        let now = self.clock.now();
        let exp = now.checked_add(lifetime_seconds).ok_or_else(|| {
            ServerError::Internal(format!("令牌有效期溢出: lifetime={}s", lifetime_seconds))
        })?;
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
            token_type,
            boot_epoch,
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ServerError::Internal(format!("JWT 签发失败: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// 验证 token：签名、签发者、类型，再按 `exp - now <= 0` 判断过期
    pub fn validate(
        &self,
        token: &str,
        expected: TokenType,
    ) -> std::result::Result<TokenClaims, TokenError> {
        let claims = self.decode_signed(token)?;

        if claims.token_type != expected {
            tracing::debug!(
                "令牌类型不符: expected={}, actual={}",
                expected.as_str(),
                claims.token_type.as_str()
            );
            return Err(TokenError::Invalid);
        }

        if claims.exp.saturating_sub(self.clock.now()) <= 0 {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn decode_signed(&self, token: &str) -> std::result::Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_e| TokenError::Invalid)?;

        Ok(token_data.claims)
    }
}
