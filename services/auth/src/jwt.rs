//! JWT service for token generation, validation, and management
//!
//! This module creates RS256 access and refresh tokens, validates them with
//! the shared [`TokenVerifier`], and handles refresh token rotation and token
//! blacklisting using Redis.

use anyhow::Result;
use common::{
    cache::RedisPool,
    error::TokenError,
    settings::JwtSettings,
    token::{Claims, TokenType, TokenVerifier, blacklist_key, read_key_material, remaining_lifetime},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::models::User;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens (PEM)
    pub private_key: String,
    /// Public key for verifying tokens (PEM)
    pub public_key: String,
    /// Access token expiration time in seconds
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Build the configuration from the `[jwt]` settings, reading key files
    /// when the keys are given as paths
    pub fn from_settings(settings: &JwtSettings) -> Result<Self> {
        Ok(JwtConfig {
            private_key: read_key_material(&settings.private_key)?,
            public_key: read_key_material(&settings.public_key)?,
            access_token_expiry: settings.access_token_expiry,
            refresh_token_expiry: settings.refresh_token_expiry,
        })
    }
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let verifier = TokenVerifier::new(&config.public_key)?;

        Ok(JwtService {
            encoding_key,
            verifier,
            config,
        })
    }

    fn issue(&self, user: &User, token_type: TokenType, lifetime: u64) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name(),
            iat: now,
            exp: now + lifetime,
            token_type,
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Access, self.config.access_token_expiry)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Refresh, self.config.refresh_token_expiry)
    }

    /// Validate a token of the expected type and return the claims
    pub fn validate_token(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        self.verifier.verify_as(token, expected)
    }

    /// Check if a token is blacklisted in Redis
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, token: &str) -> Result<bool> {
        redis_pool.exists(&blacklist_key(token)).await
    }

    /// Blacklist a token in Redis until it would have expired anyway
    pub async fn blacklist_token(
        &self,
        redis_pool: &RedisPool,
        token: &str,
        claims: &Claims,
    ) -> Result<()> {
        redis_pool
            .set(&blacklist_key(token), "1", Some(remaining_lifetime(claims)))
            .await
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the refresh token expiry time
    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }

    /// Rotate a refresh token
    ///
    /// Blacklists the old refresh token for its remaining lifetime and
    /// issues a new one for the same user.
    pub async fn rotate_refresh_token(
        &self,
        redis_pool: &RedisPool,
        user: &User,
        old_refresh_token: &str,
        old_claims: &Claims,
    ) -> Result<String> {
        if old_claims.sub != user.id {
            return Err(anyhow::anyhow!("Token does not belong to user"));
        }

        self.blacklist_token(redis_pool, old_refresh_token, old_claims)
            .await?;
        info!("Rotated refresh token of user {}", user.id);

        self.generate_refresh_token(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    const PRIVATE_KEY: &str = include_str!("../../../libs/common/tests/fixtures/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../../libs/common/tests/fixtures/jwt_public.pem");

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            private_key: PRIVATE_KEY.to_string(),
            public_key: PUBLIC_KEY.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        })
        .unwrap()
    }

    fn user(display_name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "jane.doe@corp.com".to_string(),
            password_hash: String::new(),
            display_name: display_name.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_carries_identity() {
        let jwt = service();
        let user = user(None);

        let token = jwt.generate_access_token(&user).unwrap();
        let claims = jwt.validate_token(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "jane.doe@corp.com");
        assert_eq!(claims.name, "jane.doe");
        assert!(claims.exp - claims.iat == 900);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let jwt = service();
        let user = user(Some("Jane"));

        let refresh = jwt.generate_refresh_token(&user).unwrap();
        assert!(matches!(
            jwt.validate_token(&refresh, TokenType::Access),
            Err(TokenError::WrongType)
        ));

        let claims = jwt.validate_token(&refresh, TokenType::Refresh).unwrap();
        assert_eq!(claims.name, "Jane");
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_rejects_mismatched_keys() {
        let config = JwtConfig {
            private_key: PUBLIC_KEY.to_string(),
            public_key: PUBLIC_KEY.to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        };

        assert!(JwtService::new(config).is_err());
    }
}
