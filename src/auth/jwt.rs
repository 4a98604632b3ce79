use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult, UserId};

/// Purpose a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
}

impl TokenClaims {
    pub fn user_id(&self) -> AuthResult<UserId> {
        self.sub.parse().map_err(|_| AuthError::TokenInvalid)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JwtMetadata {
    pub algorithm: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
}

/// HS256 token codec. Keys are derived once from the shared secret and never
/// mutated, so one instance can be shared across request handlers.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = config.token_leeway_secs;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn issue_access_token(&self, user_id: UserId) -> AuthResult<SignedToken> {
        self.sign(user_id, TokenKind::Access, Utc::now())
    }

    pub fn issue_refresh_token(&self, user_id: UserId) -> AuthResult<SignedToken> {
        self.sign(user_id, TokenKind::Refresh, Utc::now())
    }

    fn sign(&self, user_id: UserId, kind: TokenKind, now: DateTime<Utc>) -> AuthResult<SignedToken> {
        let ttl = match kind {
            TokenKind::Access => self.access_token_ttl,
            TokenKind::Refresh => self.refresh_token_ttl,
        };
        let expires_at = now + ttl;

        let claims = TokenClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Checks signature, issuer and expiry. A correctly signed token whose
    /// `exp` has passed is `TokenExpired`; every other failure is
    /// `TokenInvalid`.
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                _ => Err(AuthError::TokenInvalid),
            },
        }
    }

    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    pub fn metadata(&self) -> JwtMetadata {
        JwtMetadata {
            algorithm: "HS256".to_string(),
            issuer: self.issuer.clone(),
            access_token_ttl_secs: self.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs: self.refresh_token_ttl.num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_JWT_SECRET: &str = "super-secret-test-key";

    fn make_test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: TEST_JWT_SECRET.into(),
            issuer: "starterkit-test".into(),
            access_token_ttl_secs: 300,
            refresh_token_ttl_secs: 3000,
            token_leeway_secs: 0,
            session_store_url: "redis://127.0.0.1:6379".into(),
            session_key_prefix: "refresh_token".into(),
            session_store_timeout_ms: 500,
        }
    }

    fn service() -> JwtService {
        JwtService::from_config(&make_test_config()).expect("jwt service")
    }

    #[test]
    fn access_token_round_trips_subject() {
        let service = service();
        let token = service.issue_access_token(42).expect("issue token");

        let claims = service.verify(&token.token).expect("verify token");

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().expect("numeric subject"), 42);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, "starterkit-test");
        assert_eq!(claims.exp - claims.iat, 300);
        assert_eq!(claims.exp, token.expires_at.timestamp());
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let service = service();
        let access = service.issue_access_token(7).expect("access");
        let refresh = service.issue_refresh_token(7).expect("refresh");

        let claims = service.verify(&refresh.token).expect("verify refresh");
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.exp - claims.iat, 3000);
        assert!(refresh.expires_at > access.expires_at);
    }

    #[test]
    fn tokens_issued_back_to_back_differ() {
        let service = service();
        let first = service.issue_refresh_token(10).expect("first");
        let second = service.issue_refresh_token(10).expect("second");
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn token_past_expiry_is_expired_not_invalid() {
        let service = service();
        let issued_at = Utc::now() - Duration::seconds(600);
        let token = service
            .sign(10, TokenKind::Access, issued_at)
            .expect("sign backdated token");

        assert!(matches!(service.verify(&token.token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn tampered_signature_is_invalid_not_expired() {
        let service = service();
        let token = service.issue_access_token(10).expect("issue");
        let signature_start = token.token.rfind('.').expect("three segments") + 1;
        let mut tampered = token.token.clone();
        let original = tampered.remove(signature_start);
        tampered.insert(signature_start, if original == 'A' { 'B' } else { 'A' });

        assert!(matches!(service.verify(&tampered), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn expired_token_with_bad_signature_is_invalid() {
        let service = service();
        let mut config = make_test_config();
        config.jwt_secret = "another-secret".into();
        let foreign = JwtService::from_config(&config).expect("foreign service");
        let token = foreign
            .sign(10, TokenKind::Access, Utc::now() - Duration::seconds(600))
            .expect("sign");

        assert!(matches!(service.verify(&token.token), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn garbage_is_invalid() {
        let service = service();
        for input in ["", "garbage-string", "a.b.c"] {
            assert!(matches!(service.verify(input), Err(AuthError::TokenInvalid)), "{input}");
        }
    }

    #[test]
    fn rejects_foreign_issuer() {
        let service = service();
        let mut config = make_test_config();
        config.issuer = "someone-else".into();
        let foreign = JwtService::from_config(&config).expect("foreign service");
        let token = foreign.issue_access_token(10).expect("issue");

        assert!(matches!(service.verify(&token.token), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn non_numeric_subject_is_invalid() {
        let claims = TokenClaims {
            sub: "alice".into(),
            iss: "starterkit-test".into(),
            exp: 0,
            iat: 0,
            jti: "jti".into(),
            kind: TokenKind::Access,
        };
        assert!(matches!(claims.user_id(), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn metadata_reports_lifetimes() {
        let meta = service().metadata();
        assert_eq!(meta.algorithm, "HS256");
        assert_eq!(meta.access_token_ttl_secs, 300);
        assert_eq!(meta.refresh_token_ttl_secs, 3000);
    }
}
