//! Marshal server library logic.

pub mod api;
pub mod api_bindings;
pub mod api_escalation;
pub mod api_notifiers;
pub mod config;
pub mod middleware;

use axum::{
    routing::{delete, get, post},
    Extension, Json, Router,
};
use marshal_bindings::BindingService;
use marshal_db::DbPool;
use marshal_escalation::EscalationService;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Channel binding and notifier operations.
    pub bindings: BindingService,
    /// Warning and punishment-ladder operations.
    pub escalation: EscalationService,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/communities/{communityId}/log",
            get(api_bindings::get_log_handler)
                .put(api_bindings::set_log_handler)
                .delete(api_bindings::remove_log_handler),
        )
        .route(
            "/api/communities/{communityId}/welcome",
            get(api_bindings::get_welcome_handler)
                .put(api_bindings::set_welcome_handler)
                .delete(api_bindings::remove_welcome_handler),
        )
        .route(
            "/api/communities/{communityId}/suggestions",
            get(api_bindings::get_suggestions_handler)
                .put(api_bindings::set_suggestions_handler)
                .delete(api_bindings::remove_suggestions_handler),
        )
        .route(
            "/api/communities/{communityId}/tickets",
            get(api_bindings::get_tickets_handler)
                .put(api_bindings::update_tickets_handler)
                .delete(api_bindings::remove_tickets_handler),
        )
        .route(
            "/api/communities/{communityId}/notifiers/{kind}",
            get(api_notifiers::list_notifiers_handler)
                .post(api_notifiers::add_notifier_handler)
                .delete(api_notifiers::remove_notifier_handler),
        )
        .route(
            "/api/communities/{communityId}/warnings",
            get(api_escalation::list_warnings_handler),
        )
        .route(
            "/api/communities/{communityId}/warnings/{userId}/add",
            post(api_escalation::add_warning_handler),
        )
        .route(
            "/api/communities/{communityId}/warnings/{userId}/subtract",
            post(api_escalation::subtract_warning_handler),
        )
        .route(
            "/api/communities/{communityId}/warnings/{userId}/clear",
            post(api_escalation::clear_warnings_handler),
        )
        .route(
            "/api/communities/{communityId}/punishments",
            get(api_escalation::list_punishments_handler)
                .post(api_escalation::add_punishment_handler)
                .delete(api_escalation::clear_punishments_handler),
        )
        .route(
            "/api/communities/{communityId}/punishments/{punishmentId}",
            delete(api_escalation::remove_punishment_handler),
        )
        .layer(axum::middleware::from_fn(middleware::session_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
