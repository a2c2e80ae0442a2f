//! Shared handler plumbing: the response envelope and the blocking
//! dispatch wrapper.
//!
//! Every operation answers HTTP 200 with `{ success, payload, message }`;
//! core failures are rendered as `success = false` carrying the error's
//! display message. No structured error codes are exposed beyond that.

use crate::AppState;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;

/// Builds a success envelope.
pub fn success(payload: Value, message: &str) -> Json<Value> {
    Json(json!({
        "success": true,
        "payload": payload,
        "message": message,
    }))
}

/// Builds a failure envelope.
pub fn failure(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({
        "success": false,
        "payload": null,
        "message": message.to_string(),
    }))
}

/// A failure envelope as a full response, for use outside handlers.
pub fn failure_response(message: &str) -> Response {
    failure(message).into_response()
}

/// Runs a database-and-platform operation on the blocking pool and renders
/// its outcome as an envelope.
///
/// The closure returns `(payload, message)` on success and the failure
/// message otherwise.
pub(crate) async fn dispatch<F>(state: Arc<AppState>, op: F) -> Json<Value>
where
    F: FnOnce(&AppState, &Connection) -> Result<(Value, String), String> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let conn = state.pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection");
            "internal storage error".to_string()
        })?;
        op(&state, &conn)
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "request task join error");
        Err("internal server error".to_string())
    });

    match result {
        Ok((payload, message)) => success(payload, &message),
        Err(message) => failure(message),
    }
}
