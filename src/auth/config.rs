use std::env;
use std::time::Duration;

use crate::auth::{AuthError, AuthResult};

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub token_leeway_secs: u64,
    pub session_store_url: String,
    pub session_key_prefix: String,
    pub session_store_timeout_ms: u64,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = env::var("AUTH_JWT_SECRET")
            .map_err(|_| AuthError::Config("AUTH_JWT_SECRET is required".into()))?;

        let config = Self {
            jwt_secret,
            issuer: env_string("AUTH_JWT_ISSUER", "starterkit-api"),
            access_token_ttl_secs: env_i64("AUTH_ACCESS_TOKEN_TTL_SECS", 900),
            refresh_token_ttl_secs: env_i64("AUTH_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60),
            token_leeway_secs: env_u64("AUTH_TOKEN_LEEWAY_SECS", 0),
            session_store_url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),
            session_key_prefix: env_string("AUTH_SESSION_KEY_PREFIX", "refresh_token"),
            session_store_timeout_ms: env_u64("AUTH_SESSION_STORE_TIMEOUT_MS", 2_000),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would break the token lifecycle: an empty signing
    /// secret, non-positive lifetimes, or a refresh token that does not outlive
    /// the access token it is used to renew.
    pub fn validate(&self) -> AuthResult<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(AuthError::Config("jwt secret must not be empty".into()));
        }
        if self.access_token_ttl_secs <= 0 {
            return Err(AuthError::Config(
                "access token lifetime must be positive".into(),
            ));
        }
        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(AuthError::Config(format!(
                "refresh token lifetime ({}s) must exceed access token lifetime ({}s)",
                self.refresh_token_ttl_secs, self.access_token_ttl_secs
            )));
        }
        if self.session_key_prefix.is_empty() {
            return Err(AuthError::Config("session key prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs.max(0) as u64)
    }

    pub fn session_store_timeout(&self) -> Duration {
        Duration::from_millis(self.session_store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "testkey".into(),
            issuer: "starterkit-test".into(),
            access_token_ttl_secs: 300,
            refresh_token_ttl_secs: 3000,
            token_leeway_secs: 0,
            session_store_url: "redis://127.0.0.1:6379".into(),
            session_key_prefix: "refresh_token".into(),
            session_store_timeout_ms: 500,
        }
    }

    #[test]
    fn accepts_refresh_lifetime_longer_than_access() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_token_ttl(), Duration::from_secs(3000));
        assert_eq!(config.session_store_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_blank_secret() {
        let mut config = valid_config();
        config.jwt_secret = "   ".into();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn rejects_refresh_lifetime_not_exceeding_access() {
        let mut config = valid_config();
        config.refresh_token_ttl_secs = config.access_token_ttl_secs;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        config.access_token_ttl_secs = 0;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }
}
