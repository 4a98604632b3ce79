use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::guards::GateRejection;

/// Error envelope shared by every non-2xx response: `{"errors":[{"message":..}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorMessage {
                message: message.into(),
            }],
        }
    }

    pub fn first_message(&self) -> Option<&str> {
        self.errors.first().map(|error| error.message.as_str())
    }
}

pub type ErrorReply = status::Custom<Json<ErrorResponse>>;

pub fn error_reply(status: Status, message: impl Into<String>) -> ErrorReply {
    status::Custom(status, Json(ErrorResponse::new(message)))
}

/// Renders errors raised outside a handler (failed guards, unknown routes,
/// unparsable bodies) in the same envelope handlers use.
#[catch(default)]
fn default_catcher(status: Status, request: &Request<'_>) -> ErrorReply {
    let rejection = request.local_cache(GateRejection::default);
    let message = match rejection.0 {
        Some(message) => message.to_string(),
        None => status.reason_lossy().to_lowercase(),
    };

    if status.code >= 500 {
        log::error!("{} {} failed with {}", request.method(), request.uri(), status);
    }

    error_reply(status, message)
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}
