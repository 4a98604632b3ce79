use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::{State, get, post};
use rocket_okapi::openapi;

use crate::auth::guards::AuthUser;
use crate::auth::responses::{
    RefreshRequest, SessionInfo, SigningKeyMetadata, TOKEN_TYPE, TokenRequest, TokenResponse,
};
use crate::auth::{AuthError, AuthState};
use crate::error::{ErrorReply, error_reply};

type AuthRouteResult<T> = Result<Json<T>, ErrorReply>;

const INVALID_PAYLOAD: &str = "invalid request payload";

/// Exchange username and password for an access/refresh token pair.
#[openapi(tag = "Auth")]
#[post("/auth/token", data = "<payload>")]
pub async fn issue_token(
    state: &State<AuthState>,
    payload: Result<Json<TokenRequest>, json::Error<'_>>,
) -> AuthRouteResult<TokenResponse> {
    let payload = payload.map_err(reject_payload)?;
    let username = payload.username.as_str();
    let password = payload.password.as_str();

    if username.is_empty() || password.is_empty() {
        return Err(error_reply(Status::BadRequest, INVALID_PAYLOAD));
    }

    let pair = match state.service.login(username, password).await {
        Ok(pair) => pair,
        Err(err) => {
            log_login_failure(username, &err);
            return Err(respond_error(err));
        }
    };

    log::info!("issued token pair for user {}", pair.user_id);

    Ok(Json(TokenResponse {
        token_type: TOKEN_TYPE.to_string(),
        access_token: pair.access_token.token,
        refresh_token: Some(pair.refresh_token.token),
        expires_in: state.jwt_service.access_token_ttl_secs(),
    }))
}

/// Exchange a refresh token for a new access token.
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh_token(
    state: &State<AuthState>,
    payload: Result<Json<RefreshRequest>, json::Error<'_>>,
) -> AuthRouteResult<TokenResponse> {
    let payload = payload.map_err(reject_payload)?;
    if payload.token.is_empty() {
        return Err(error_reply(Status::BadRequest, INVALID_PAYLOAD));
    }

    let refreshed = match state.service.refresh(&payload.token).await {
        Ok(refreshed) => refreshed,
        Err(err) => {
            if err.is_backend_failure() {
                log::error!("refresh failed: {}", err);
            } else {
                log::info!("refresh rejected: {}", err);
            }
            return Err(respond_error(err));
        }
    };

    Ok(Json(TokenResponse {
        token_type: TOKEN_TYPE.to_string(),
        access_token: refreshed.access_token.token,
        refresh_token: None,
        expires_in: state.jwt_service.access_token_ttl_secs(),
    }))
}

/// Identity behind the presented access token.
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub fn current_session(user: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: user.id,
        token_expires_at: user.expires_at,
    })
}

/// Signing algorithm, issuer and token lifetimes in use.
#[openapi(tag = "Auth")]
#[get("/auth/keys")]
pub fn signing_keys(state: &State<AuthState>, _user: AuthUser) -> Json<SigningKeyMetadata> {
    let jwt_meta = state.jwt_service.metadata();
    Json(SigningKeyMetadata {
        algorithm: jwt_meta.algorithm,
        issuer: jwt_meta.issuer,
        access_token_ttl_secs: jwt_meta.access_token_ttl_secs,
        refresh_token_ttl_secs: jwt_meta.refresh_token_ttl_secs,
    })
}

fn respond_error(err: AuthError) -> ErrorReply {
    error_reply(err.status(), err.public_message())
}

fn reject_payload(err: json::Error<'_>) -> ErrorReply {
    log::debug!("rejecting request body: {}", err);
    error_reply(Status::BadRequest, INVALID_PAYLOAD)
}

fn log_login_failure(username: &str, err: &AuthError) {
    match err {
        AuthError::NotFound => log::info!("login rejected for '{}': unknown user", username),
        AuthError::InvalidPassword => {
            log::info!("login rejected for '{}': wrong password", username)
        }
        err if err.is_backend_failure() => {
            log::error!("login for '{}' failed: {}", username, err)
        }
        err => log::warn!("login for '{}' failed: {}", username, err),
    }
}
