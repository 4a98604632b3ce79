use std::time::Duration;

use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    NotFound,
    #[error("invalid user password")]
    InvalidPassword,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("unauthorized")]
    Unauthorized,
    #[error("session store error: {0}")]
    SessionStore(String),
    #[error("{operation} did not complete within {after:?}")]
    BackendTimeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("database error: {0}")]
    Database(#[from] rocket_db_pools::sqlx::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::NotFound
            | AuthError::InvalidPassword
            | AuthError::InvalidRefreshToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::Unauthorized => Status::Unauthorized,
            AuthError::SessionStore(_)
            | AuthError::BackendTimeout { .. }
            | AuthError::Database(_) => Status::ServiceUnavailable,
            AuthError::Config(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }

    /// Text safe to hand back to clients. Unknown users and wrong passwords
    /// share one message so usernames cannot be enumerated.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::NotFound | AuthError::InvalidPassword => "invalid credentials",
            AuthError::InvalidRefreshToken => "invalid refresh token",
            AuthError::TokenExpired => "token expired",
            AuthError::TokenInvalid | AuthError::Unauthorized => "token is unauthorized",
            AuthError::SessionStore(_)
            | AuthError::BackendTimeout { .. }
            | AuthError::Database(_) => "service temporarily unavailable",
            AuthError::Config(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => "internal server error",
        }
    }

    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AuthError::SessionStore(_) | AuthError::BackendTimeout { .. } | AuthError::Database(_)
        )
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for AuthError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        AuthError::SessionStore(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for AuthError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        AuthError::SessionStore(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_unauthorized_never_forbidden() {
        for err in [
            AuthError::NotFound,
            AuthError::InvalidPassword,
            AuthError::InvalidRefreshToken,
            AuthError::TokenExpired,
            AuthError::TokenInvalid,
            AuthError::Unauthorized,
        ] {
            assert_eq!(err.status(), Status::Unauthorized, "{err}");
        }
    }

    #[test]
    fn backend_failures_map_to_service_unavailable() {
        let err = AuthError::SessionStore("connection refused".into());
        assert_eq!(err.status(), Status::ServiceUnavailable);
        assert!(err.is_backend_failure());
        assert_eq!(err.public_message(), "service temporarily unavailable");

        let timeout = AuthError::BackendTimeout {
            operation: "session store write",
            after: Duration::from_millis(10),
        };
        assert_eq!(timeout.status(), Status::ServiceUnavailable);
    }

    #[test]
    fn unknown_user_and_wrong_password_look_identical_to_clients() {
        assert_eq!(
            AuthError::NotFound.public_message(),
            AuthError::InvalidPassword.public_message()
        );
        assert_ne!(
            AuthError::TokenExpired.public_message(),
            AuthError::Unauthorized.public_message()
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = AuthError::PasswordHash("salt invalid: too short".into());
        assert_eq!(err.status(), Status::InternalServerError);
        assert!(!err.public_message().contains("salt"));
    }
}
