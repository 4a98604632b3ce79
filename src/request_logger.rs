use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::auth::guards::AuthenticatedId;

/// Fairing that logs one line per HTTP request with its latency and, when the
/// bearer guard accepted the request, the caller's user id.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed_ms = request.local_cache(Instant::now).elapsed().as_secs_f64() * 1000.0;
        let status = response.status();
        let caller = match request.local_cache(AuthenticatedId::default).0 {
            Some(user_id) => format!("user {user_id}"),
            None => "anonymous".to_string(),
        };

        if status.code >= 500 {
            log::warn!(
                "{} {} -> {} ({:.2}ms, {})",
                request.method(),
                request.uri(),
                status.code,
                elapsed_ms,
                caller
            );
        } else {
            log::info!(
                "{} {} -> {} ({:.2}ms, {})",
                request.method(),
                request.uri(),
                status.code,
                elapsed_ms,
                caller
            );
        }
    }
}
