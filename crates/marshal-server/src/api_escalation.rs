use crate::api::dispatch;
use crate::middleware::SessionContext;
use crate::AppState;
use axum::extract::{Extension, Path};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Warning adjustment body. The amount travels as a string; malformed
/// values fall back to 1 inside the service.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WarningDeltaRequest {
    pub amount: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPunishmentRequest {
    pub warnings: String,
    pub action: String,
    pub timeout: String,
    pub role_id: String,
}

/// GET /api/communities/:communityId/warnings
pub async fn list_warnings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let records = state
            .escalation
            .warnings(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((json!(records), String::new()))
    })
    .await
}

/// POST /api/communities/:communityId/warnings/:userId/add
pub async fn add_warning_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, user_id)): Path<(String, String)>,
    Json(payload): Json<WarningDeltaRequest>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let record = state
            .escalation
            .add_warning(
                conn,
                &session,
                &community_id,
                &user_id,
                payload.amount.as_deref(),
            )
            .map_err(|e| e.to_string())?;
        Ok((json!(record), "warnings added".to_string()))
    })
    .await
}

/// POST /api/communities/:communityId/warnings/:userId/subtract
pub async fn subtract_warning_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, user_id)): Path<(String, String)>,
    Json(payload): Json<WarningDeltaRequest>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let record = state
            .escalation
            .subtract_warning(
                conn,
                &session,
                &community_id,
                &user_id,
                payload.amount.as_deref(),
            )
            .map_err(|e| e.to_string())?;
        Ok((json!(record), "warnings subtracted".to_string()))
    })
    .await
}

/// POST /api/communities/:communityId/warnings/:userId/clear
pub async fn clear_warnings_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, user_id)): Path<(String, String)>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let record = state
            .escalation
            .clear_warnings(conn, &session, &community_id, &user_id)
            .map_err(|e| e.to_string())?;
        Ok((json!(record), "warnings cleared".to_string()))
    })
    .await
}

/// GET /api/communities/:communityId/punishments
pub async fn list_punishments_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let rules = state
            .escalation
            .punishments(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((json!(rules), String::new()))
    })
    .await
}

/// POST /api/communities/:communityId/punishments
pub async fn add_punishment_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
    Json(payload): Json<AddPunishmentRequest>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        let rule = state
            .escalation
            .add_punishment(
                conn,
                &session,
                &community_id,
                &payload.warnings,
                &payload.action,
                &payload.timeout,
                &payload.role_id,
            )
            .map_err(|e| e.to_string())?;
        Ok((json!(rule), "punishment rule added".to_string()))
    })
    .await
}

/// DELETE /api/communities/:communityId/punishments/:punishmentId
pub async fn remove_punishment_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path((community_id, punishment_id)): Path<(String, i64)>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .escalation
            .remove_punishment(conn, &session, &community_id, punishment_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "punishment rule removed".to_string()))
    })
    .await
}

/// DELETE /api/communities/:communityId/punishments
pub async fn clear_punishments_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(SessionContext(session)): Extension<SessionContext>,
    Path(community_id): Path<String>,
) -> Json<Value> {
    dispatch(state, move |state, conn| {
        state
            .escalation
            .clear_punishments(conn, &session, &community_id)
            .map_err(|e| e.to_string())?;
        Ok((Value::Null, "punishment rules cleared".to_string()))
    })
    .await
}
