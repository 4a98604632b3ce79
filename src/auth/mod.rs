//! Authentication module: configuration, credential checks, token minting,
//! the refresh-token session store, the bearer-token request guard, and the
//! HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod credentials;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod responses;
pub mod routes;
pub mod service;
pub mod session_store;

pub use config::AuthConfig;
pub use credentials::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
pub use error::{AuthError, AuthResult};
pub use guards::AuthUser;
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use service::AuthService;
pub use session_store::{MemorySessionStore, RedisSessionStore, SessionStore};

/// Identifier every token is issued against; the `users.id` primary key.
pub type UserId = i64;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub jwt_service: Arc<JwtService>,
    pub service: AuthService,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let jwt_service = Arc::new(jwt_service);
        let service = AuthService::new(
            &config,
            jwt_service.clone(),
            Arc::new(password_service),
            credentials,
            sessions,
        );

        Self {
            config,
            jwt_service,
            service,
        }
    }
}
