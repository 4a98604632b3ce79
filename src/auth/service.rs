use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::credentials::CredentialStore;
use crate::auth::jwt::{JwtService, SignedToken, TokenKind};
use crate::auth::passwords::PasswordService;
use crate::auth::session_store::{SessionStore, tokens_match};
use crate::auth::{AuthConfig, AuthError, AuthResult, UserId};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: UserId,
    pub access_token: SignedToken,
    pub refresh_token: SignedToken,
}

#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub user_id: UserId,
    pub access_token: SignedToken,
}

/// Login and refresh flows over the credential, token and session
/// collaborators. A user's session exists exactly while the session store
/// holds a refresh token for them.
#[derive(Clone)]
pub struct AuthService {
    jwt_service: Arc<JwtService>,
    password_service: Arc<PasswordService>,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    refresh_token_ttl: Duration,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        jwt_service: Arc<JwtService>,
        password_service: Arc<PasswordService>,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            jwt_service,
            password_service,
            credentials,
            sessions,
            refresh_token_ttl: config.refresh_token_ttl(),
            store_timeout: config.session_store_timeout(),
        }
    }

    /// Exchanges a username/password for a fresh token pair. The new refresh
    /// token replaces whatever the user had stored before.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<TokenPair> {
        let record = self
            .with_deadline("credential lookup", self.credentials.find_by_username(username))
            .await?;

        let record = match record {
            Some(record) => record,
            None => {
                self.password_service.verify_decoy(password);
                return Err(AuthError::NotFound);
            }
        };

        if !self
            .password_service
            .verify_password(password, &record.password_hash)?
        {
            return Err(AuthError::InvalidPassword);
        }

        let access_token = self.jwt_service.issue_access_token(record.user_id)?;
        let refresh_token = self.jwt_service.issue_refresh_token(record.user_id)?;

        self.with_deadline(
            "session store write",
            self.sessions
                .put(record.user_id, &refresh_token.token, self.refresh_token_ttl),
        )
        .await?;

        Ok(TokenPair {
            user_id: record.user_id,
            access_token,
            refresh_token,
        })
    }

    /// Issues a new access token for a refresh token that is both correctly
    /// signed and still the one on record for its user. The refresh token
    /// itself is left untouched.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedAccess> {
        let claims = self
            .jwt_service
            .verify(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let stored = self
            .with_deadline("session store read", self.sessions.get(user_id))
            .await?;

        match stored {
            Some(stored) if tokens_match(refresh_token, &stored) => {}
            _ => return Err(AuthError::InvalidRefreshToken),
        }

        let access_token = self.jwt_service.issue_access_token(user_id)?;

        Ok(RefreshedAccess {
            user_id,
            access_token,
        })
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, future: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::BackendTimeout {
                operation,
                after: self.store_timeout,
            }),
        }
    }
}
