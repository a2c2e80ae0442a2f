use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::api;

/// Header carrying the operator's opaque session identifier.
pub const SESSION_HEADER: &str = "X-Session-Authenticator";

/// The raw session identifier, stored in request extensions.
///
/// Resolution to a principal happens inside each operation's gate check;
/// the middleware only guarantees the header is present.
#[derive(Clone, Debug)]
pub struct SessionContext(pub String);

/// Middleware enforcing the session header on protected routes.
pub async fn session_middleware(mut req: Request<Body>, next: Next) -> Response {
    let session = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match session {
        Some(session) if !session.is_empty() => {
            req.extensions_mut().insert(SessionContext(session));
            next.run(req).await
        }
        _ => api::failure_response("missing X-Session-Authenticator header"),
    }
}
