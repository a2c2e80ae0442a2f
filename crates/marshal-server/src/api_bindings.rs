use crate::api::dispatch;
use crate::middleware::SessionContext;
use crate::AppState;
use axum::extract::{Extension, Path};
use axum::Json;
use marshal_bindings::TicketUpdate;
use marshal_types::EndpointPurpose;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    pub channel_id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub intake_channel_id: Option<String>,
    pub intake_category_id: Option<String>,
    pub log_channel_id: Option<String>,
}

async fn get_binding(
    state: Arc<AppState>,
    session: String,
    community_id: String,
    purpose: EndpointPurpose,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let bound = state
            .bindings
            .binding(conn, &session, &community_id, purpose)
            .map_err(|e| e.to_string())?;
        Ok((json!(bound), String::new()))
    })
    .await
}

async fn set_binding(
    state: Arc<AppState>,
    session: String,
    community_id: String,
    purpose: EndpointPurpose,
    channel_id: String,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .bindings
            .set_binding(conn, &session, &community_id, purpose, &channel_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, format!("{} channel updated", purpose.as_str())))
    })
    .await
}

async fn remove_binding(
    state: Arc<AppState>,
    session: String,
    community_id: String,
    purpose: EndpointPurpose,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .bindings
            .remove_binding(conn, &session, &community_id, purpose)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, format!("{} channel removed", purpose.as_str())))
    })
    .await
}

/// GET /api/communities/:communityId/log
pub async fn get_log_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    get_binding(state, session, community_id, EndpointPurpose::Log).await
}

/// PUT /api/communities/:communityId/log
pub async fn set_log_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
    Json(payload): Json<ChannelRequest>,
) -> Json<Value> {
    set_binding(
        state,
        session,
        community_id,
        EndpointPurpose::Log,
        payload.channel_id,
    )
    .await
}

/// DELETE /api/communities/:communityId/log
pub async fn remove_log_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    remove_binding(state, session, community_id, EndpointPurpose::Log).await
}

/// GET /api/communities/:communityId/welcome
pub async fn get_welcome_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    get_binding(state, session, community_id, EndpointPurpose::Welcome).await
}

/// PUT /api/communities/:communityId/welcome
pub async fn set_welcome_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
    Json(payload): Json<ChannelRequest>,
) -> Json<Value> {
    set_binding(
        state,
        session,
        community_id,
        EndpointPurpose::Welcome,
        payload.channel_id,
    )
    .await
}

/// DELETE /api/communities/:communityId/welcome
pub async fn remove_welcome_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    remove_binding(state, session, community_id, EndpointPurpose::Welcome).await
}

/// GET /api/communities/:communityId/suggestions
pub async fn get_suggestions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let bound = state
            .bindings
            .suggestion_channel(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((json!(bound), String::new()))
    })
    .await
}

/// PUT /api/communities/:communityId/suggestions
pub async fn set_suggestions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
    Json(payload): Json<ChannelRequest>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .bindings
            .set_suggestion_channel(conn, &session, &community_id, &payload.channel_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "suggestion channel updated".to_string()))
    })
    .await
}

/// DELETE /api/communities/:communityId/suggestions
pub async fn remove_suggestions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .bindings
            .remove_suggestion_channel(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "suggestion channel removed".to_string()))
    })
    .await
}

/// GET /api/communities/:communityId/tickets
pub async fn get_tickets_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let settings = state
            .bindings
            .ticket_settings(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((json!(settings), String::new()))
    })
    .await
}

/// PUT /api/communities/:communityId/tickets
pub async fn update_tickets_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
    Json(payload): Json<TicketRequest>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let update = TicketUpdate {
            intake_channel_id: payload.intake_channel_id,
            intake_category_id: payload.intake_category_id,
            log_channel_id: payload.log_channel_id,
        };
        state
            .bindings
            .update_ticket_settings(conn, &session, &community_id, &update)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "ticket settings updated".to_string()))
    })
    .await
}

/// DELETE /api/communities/:communityId/tickets
pub async fn remove_tickets_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .bindings
            .remove_ticket_settings(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "ticket settings removed".to_string()))
    })
    .await
}
