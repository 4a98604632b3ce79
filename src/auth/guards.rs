use chrono::{DateTime, Utc};
use rocket::Request;
use rocket::State;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::auth::jwt::{JwtService, TokenKind};
use crate::auth::{AuthError, AuthResult, AuthState, UserId};

const BEARER_SCHEME: &str = "Bearer";

/// Identity of the caller, available to any handler that takes it as an
/// argument. Handlers behind this guard never run for unauthenticated requests.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Why the gate turned a request away; read back by the error catcher so the
/// 401 body can tell an expired token apart from a missing or garbled one.
#[derive(Debug, Clone, Default)]
pub struct GateRejection(pub Option<&'static str>);

/// Set once the gate has accepted a request; used for request logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedId(pub Option<UserId>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request).await {
            Ok(user) => {
                request.local_cache(|| AuthenticatedId(Some(user.id)));
                Outcome::Success(user)
            }
            Err(err) => {
                log::debug!("rejected {} {}: {}", request.method(), request.uri(), err);
                request.local_cache(|| GateRejection(Some(err.public_message())));
                Outcome::Error((err.status(), err))
            }
        }
    }
}

impl<'r> OpenApiFromRequest<'r> for AuthUser {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        let scheme = SecurityScheme {
            description: Some("Access token issued by POST /auth/token.".to_owned()),
            data: SecuritySchemeData::Http {
                scheme: "bearer".to_owned(),
                bearer_format: Some("JWT".to_owned()),
            },
            extensions: Object::default(),
        };
        let mut requirement = SecurityRequirement::new();
        requirement.insert("BearerAuth".to_owned(), Vec::new());

        Ok(RequestHeaderInput::Security(
            "BearerAuth".to_owned(),
            scheme,
            requirement,
        ))
    }
}

async fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let auth_state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let header = request.headers().get_one("Authorization").unwrap_or_default();
    authorize_bearer(&auth_state.jwt_service, header)
}

/// Validates an `Authorization` header value of the form `Bearer <token>`.
///
/// Malformed headers and tokens that fail verification for any reason other
/// than expiry are `Unauthorized`; an expired access token is
/// `TokenExpired` so the client knows to refresh instead of logging in again.
pub fn authorize_bearer(jwt_service: &JwtService, header: &str) -> AuthResult<AuthUser> {
    let token = bearer_token(header)?;

    let claims = match jwt_service.verify(token) {
        Ok(claims) => claims,
        Err(AuthError::TokenExpired) => return Err(AuthError::TokenExpired),
        Err(_) => return Err(AuthError::Unauthorized),
    };

    if claims.kind != TokenKind::Access {
        return Err(AuthError::Unauthorized);
    }

    let id = claims.user_id().map_err(|_| AuthError::Unauthorized)?;

    Ok(AuthUser {
        id,
        expires_at: claims.expires_at(),
        token_id: claims.jti,
    })
}

fn bearer_token(header: &str) -> AuthResult<&str> {
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        [BEARER_SCHEME, token] if !token.is_empty() => Ok(*token),
        _ => Err(AuthError::Unauthorized),
    }
}
