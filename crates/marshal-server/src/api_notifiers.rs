use crate::api::{dispatch, failure};
use crate::middleware::SessionContext;
use crate::AppState;
use axum::extract::{Extension, Path};
use axum::Json;
use marshal_types::FeedKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNotifierRequest {
    pub source: String,
    pub channel_id: String,
    pub message_template: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveNotifierRequest {
    pub source: String,
}

fn parse_kind(kind: &str) -> Result<FeedKind, Json<Value>> {
    FeedKind::from_str_key(kind).ok_or_else(|| failure(format!("unknown feed kind: {kind}")))
}

/// GET /api/communities/:communityId/notifiers/:kind
pub async fn list_notifiers_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, kind)): Path<(String, String)>,
) -> Json<Value> {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    dispatch(state, move |state, conn| {
        let listed = state
            .bindings
            .notifiers(conn, &session, &community_id, kind)
            .map_err(|e| e.to_string())?;
        Ok((json!(listed), String::new()))
    })
    .await
}

/// POST /api/communities/:communityId/notifiers/:kind
pub async fn add_notifier_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, kind)): Path<(String, String)>,
    Json(payload): Json<AddNotifierRequest>,
) -> Json<Value> {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    dispatch(state, move |state, conn| {
        state
            .bindings
            .add_notifier(
                conn,
                &session,
                &community_id,
                kind,
                &payload.source,
                &payload.channel_id,
                payload.message_template.as_deref(),
            )
            .map_err(|e| e.to_string())?;
        Ok((
            Value::Null,
            format!("{} subscription added", kind.as_str()),
        ))
    })
    .await
}

/// DELETE /api/communities/:communityId/notifiers/:kind
pub async fn remove_notifier_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, kind)): Path<(String, String)>,
    Json(payload): Json<RemoveNotifierRequest>,
) -> Json<Value> {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    dispatch(state, move |state, conn| {
        state
            .bindings
            .remove_notifier(conn, &session, &community_id, kind, &payload.source)
            .map_err(|e| e.to_string())?;
        Ok((
            Value::Null,
            format!("{} subscription removed", kind.as_str()),
        ))
    })
    .await
}
