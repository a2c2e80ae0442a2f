//! Notification Binding Service.
//!
//! Orchestrates the Community Access Gate, the Delivery Endpoint Manager,
//! and the local configuration rows into the operator-facing binding
//! operations: singleton channel bindings (log, welcome, ticket-log,
//! suggestion-intake) and per-subscription social-feed notifiers.
//!
//! Every operation passes through the gate first; gate and endpoint failures
//! propagate unchanged to the boundary rather than being reinterpreted here.

mod store;

pub use store::{NotifierRow, TicketRow};

use marshal_endpoints::{EndpointError, EndpointManager};
use marshal_platform::{AccessGate, GateError, PlatformClient};
use marshal_types::{EndpointPurpose, FeedKind};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Display-name prefix for every endpoint the bot creates.
const ENDPOINT_NAME_PREFIX: &str = "Marshal";

/// Errors raised by binding operations.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The destination channel does not resolve in the community.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    /// The requested channel category does not resolve in the community.
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    /// A requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A required field is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A subscription with the same (kind, source) key already exists.
    #[error("a {kind} subscription for {feed_source} already exists, remove it first")]
    DuplicateSubscription {
        kind: &'static str,
        feed_source: String,
    },
}

/// A bound destination channel as reported to the operator.
///
/// The name is filled from the Community View when the channel is present in
/// it; a channel deleted on the platform still reports its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundChannel {
    pub channel_id: String,
    pub channel_name: Option<String>,
}

/// The operator-facing ticket configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSettingsView {
    pub intake_channel: BoundChannel,
    pub intake_category_id: Option<String>,
    pub ticket_count: i64,
    pub log_channel: Option<BoundChannel>,
}

/// Fields of a ticket create-or-update request. Absent fields keep their
/// stored value.
#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub intake_channel_id: Option<String>,
    pub intake_category_id: Option<String>,
    pub log_channel_id: Option<String>,
}

/// One social-feed subscription as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierView {
    pub source: String,
    pub message_template: String,
    pub channel: Option<BoundChannel>,
}

/// The binding orchestration service. Holds the gate and platform
/// capabilities by injection; the database connection is passed per call.
#[derive(Clone)]
pub struct BindingService {
    gate: AccessGate,
    platform: Arc<dyn PlatformClient>,
}

impl BindingService {
    pub fn new(gate: AccessGate, platform: Arc<dyn PlatformClient>) -> Self {
        Self { gate, platform }
    }

    fn manager(&self) -> EndpointManager<'_> {
        EndpointManager::new(self.platform.as_ref())
    }

    /// Returns the singleton binding for `purpose`, or `None` when unbound.
    ///
    /// Unbound (including orphaned) is an answer, not an error.
    pub fn binding(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        purpose: EndpointPurpose,
    ) -> Result<Option<BoundChannel>, BindingError> {
        let view = self.gate.resolve(session_id, community_id, true, false)?;

        let endpoint = self.manager().get_binding(conn, community_id, purpose)?;
        Ok(endpoint
            .and_then(|e| e.channel_id)
            .map(|channel_id| named_channel(&view, channel_id)))
    }

    /// Binds `purpose` to `channel_id`, replacing any prior endpoint.
    pub fn set_binding(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        purpose: EndpointPurpose,
        channel_id: &str,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        self.manager()
            .bind(conn, community_id, purpose, channel_id, ENDPOINT_NAME_PREFIX)?;
        Ok(())
    }

    /// Revokes the purpose's endpoint and clears its row.
    ///
    /// Removing an unbound purpose succeeds. A row deletion failure after
    /// successful revocation is logged and tolerated; the next bind
    /// overwrites the row.
    pub fn remove_binding(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        purpose: EndpointPurpose,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let manager = self.manager();
        if manager.revoke(conn, community_id, purpose)?.is_some() {
            if let Err(e) = manager.clear(conn, community_id, purpose) {
                tracing::warn!(
                    community = community_id,
                    purpose = purpose.as_str(),
                    "binding row deletion failed after revocation: {e}"
                );
            }
        }
        Ok(())
    }

    /// Returns the community's ticket configuration, or `None` when tickets
    /// are not set up.
    pub fn ticket_settings(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<Option<TicketSettingsView>, BindingError> {
        let view = self.gate.resolve(session_id, community_id, true, false)?;

        let Some(row) = store::ticket_find(conn, community_id)? else {
            return Ok(None);
        };

        let log_channel = self
            .manager()
            .get_binding(conn, community_id, EndpointPurpose::TicketLog)?
            .and_then(|e| e.channel_id)
            .map(|channel_id| named_channel(&view, channel_id));

        Ok(Some(TicketSettingsView {
            intake_channel: named_channel(&view, row.intake_channel_id),
            intake_category_id: row.intake_category_id,
            ticket_count: row.ticket_count,
            log_channel,
        }))
    }

    /// Creates or updates the ticket configuration.
    ///
    /// The first create requires an intake channel; supplying a log channel
    /// (re)binds the ticket-log endpoint. Every supplied identifier (intake
    /// channel, category, log channel) must resolve in the community;
    /// a failed lookup rejects the update before anything is written.
    pub fn update_ticket_settings(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        update: &TicketUpdate,
    ) -> Result<(), BindingError> {
        let view = self.gate.resolve(session_id, community_id, true, false)?;

        if store::ticket_find(conn, community_id)?.is_none() && update.intake_channel_id.is_none() {
            return Err(BindingError::InvalidInput(
                "an intake channel is required to enable tickets".to_string(),
            ));
        }

        if let Some(intake) = update.intake_channel_id.as_deref() {
            if view.channel_by_id(intake).is_none() {
                return Err(BindingError::ChannelNotFound(intake.to_string()));
            }
        }
        if let Some(category) = update.intake_category_id.as_deref() {
            if view.category_by_id(category).is_none() {
                return Err(BindingError::CategoryNotFound(category.to_string()));
            }
        }
        // The log channel is validated up front too; binding happens after
        // the upsert, and a failed bind must not leave a half-applied row.
        if let Some(log_channel) = update.log_channel_id.as_deref() {
            if view.channel_by_id(log_channel).is_none() {
                return Err(BindingError::ChannelNotFound(log_channel.to_string()));
            }
        }

        store::ticket_upsert(
            conn,
            community_id,
            update.intake_channel_id.as_deref(),
            update.intake_category_id.as_deref(),
        )?;

        if let Some(log_channel) = update.log_channel_id.as_deref() {
            self.manager().bind(
                conn,
                community_id,
                EndpointPurpose::TicketLog,
                log_channel,
                ENDPOINT_NAME_PREFIX,
            )?;
        }
        Ok(())
    }

    /// Disables tickets: revokes the ticket-log endpoint and deletes the row.
    pub fn remove_ticket_settings(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        self.manager()
            .revoke(conn, community_id, EndpointPurpose::TicketLog)?;
        store::ticket_delete(conn, community_id)?;
        Ok(())
    }

    /// Returns the suggestion-intake channel, or `None` when unbound.
    pub fn suggestion_channel(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<Option<BoundChannel>, BindingError> {
        let view = self.gate.resolve(session_id, community_id, true, false)?;

        Ok(store::suggestion_find(conn, community_id)?
            .map(|channel_id| named_channel(&view, channel_id)))
    }

    /// Binds suggestion intake to `channel_id`.
    ///
    /// Suggestion intake is a plain channel row; no delivery endpoint is
    /// involved.
    pub fn set_suggestion_channel(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        channel_id: &str,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        self.platform
            .channel(community_id, channel_id)
            .map_err(EndpointError::from)?
            .ok_or_else(|| BindingError::ChannelNotFound(channel_id.to_string()))?;

        store::suggestion_upsert(conn, community_id, channel_id)?;
        Ok(())
    }

    pub fn remove_suggestion_channel(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        store::suggestion_delete(conn, community_id)?;
        Ok(())
    }

    /// Lists the community's subscriptions of one feed kind.
    ///
    /// Rows without a resolved channel are matched against the live endpoint
    /// list (id AND token) and cache-filled; rows whose endpoint no longer
    /// exists report no channel rather than failing the listing.
    pub fn notifiers(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        kind: FeedKind,
    ) -> Result<Vec<NotifierView>, BindingError> {
        let view = self.gate.resolve(session_id, community_id, true, false)?;

        let rows = store::notifier_list(conn, community_id, kind)?;

        // One remote listing serves every unresolved row.
        let live = if rows.iter().any(|r| r.channel_id.is_none()) {
            self.platform
                .list_endpoints(community_id)
                .map_err(EndpointError::from)?
        } else {
            Vec::new()
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let channel_id = match row.channel_id {
                Some(id) => Some(id),
                None => {
                    let matched = live
                        .iter()
                        .find(|e| e.endpoint_id == row.endpoint_id && e.token == row.token);
                    if let Some(handle) = matched {
                        store::notifier_fill_channel(conn, row.id, &handle.channel_id)?;
                        Some(handle.channel_id.clone())
                    } else {
                        None
                    }
                }
            };
            out.push(NotifierView {
                source: row.source,
                message_template: row.message_template,
                channel: channel_id.map(|id| named_channel(&view, id)),
            });
        }
        Ok(out)
    }

    /// Subscribes the community to a feed source, creating its endpoint.
    ///
    /// The (community, kind, source) key must be free; duplicates are
    /// rejected before any remote endpoint is created.
    pub fn add_notifier(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        kind: FeedKind,
        source: &str,
        channel_id: &str,
        message_template: Option<&str>,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        if store::notifier_find(conn, community_id, kind, source)?.is_some() {
            return Err(BindingError::DuplicateSubscription {
                kind: kind.as_str(),
                feed_source: source.to_string(),
            });
        }

        let handle = self.manager().create_feed_endpoint(
            community_id,
            channel_id,
            &feed_endpoint_name(kind, source),
        )?;

        let template = message_template.unwrap_or_else(|| default_template(kind));
        store::notifier_insert(
            conn,
            community_id,
            kind,
            source,
            template,
            channel_id,
            &handle.endpoint_id,
            &handle.token,
        )?;
        Ok(())
    }

    /// Unsubscribes a feed source, revoking its endpoint best-effort.
    pub fn remove_notifier(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        kind: FeedKind,
        source: &str,
    ) -> Result<(), BindingError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let Some(row) = store::notifier_find(conn, community_id, kind, source)? else {
            return Err(BindingError::NotFound(format!(
                "{} subscription for {source}",
                kind.as_str()
            )));
        };

        self.manager()
            .revoke_remote(community_id, &row.endpoint_id, &row.token);
        store::notifier_delete(conn, row.id)?;
        Ok(())
    }
}

fn named_channel(view: &marshal_platform::CommunityView, channel_id: String) -> BoundChannel {
    let channel_name = view.channel_by_id(&channel_id).map(|c| c.name.clone());
    BoundChannel {
        channel_id,
        channel_name,
    }
}

/// Deterministic endpoint display name for a feed subscription.
fn feed_endpoint_name(kind: FeedKind, source: &str) -> String {
    format!("{ENDPOINT_NAME_PREFIX}-{}-{source}", kind.as_str())
}

/// Announcement template used when the operator supplies none.
///
/// `%source%` is substituted by the announcement pipeline at post time.
fn default_template(kind: FeedKind) -> &'static str {
    match kind {
        FeedKind::Subreddit => "New post in r/%source%",
        FeedKind::Stream => "%source% is now live!",
        FeedKind::Channel => "%source% uploaded a new video!",
        FeedKind::Handle => "%source% just posted!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal_db::run_migrations;
    use marshal_platform::memory::{MemoryPlatform, MemorySessions};

    const ADMIN: &str = "sess-admin";
    const PLAIN: &str = "sess-plain";

    fn setup() -> (Connection, Arc<MemoryPlatform>, BindingService) {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        run_migrations(&conn).expect("failed to run migrations");

        let platform = Arc::new(MemoryPlatform::new());
        platform.add_community("G1", "Test Community");
        platform.add_channel("G1", "C42", "announcements", None);
        platform.add_channel("G1", "C43", "general", None);
        platform.add_category("G1", "CAT1", "Support");
        platform.add_member("G1", "U1", true);
        platform.add_member("G1", "U2", false);

        let sessions = Arc::new(MemorySessions::new());
        sessions.insert(ADMIN, "U1", "admin");
        sessions.insert(PLAIN, "U2", "plain");

        let gate = AccessGate::new(sessions, platform.clone());
        let service = BindingService::new(gate, platform.clone());
        (conn, platform, service)
    }

    #[test]
    fn log_channel_set_then_get_round_trip() {
        let (conn, _, service) = setup();

        assert!(service
            .binding(&conn, ADMIN, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_none());

        service
            .set_binding(&conn, ADMIN, "G1", EndpointPurpose::Log, "C42")
            .expect("set failed");

        let bound = service
            .binding(&conn, ADMIN, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .expect("should be bound");
        assert_eq!(bound.channel_id, "C42");
        assert_eq!(bound.channel_name.as_deref(), Some("announcements"));
    }

    #[test]
    fn remove_log_channel_reports_unbound_afterwards() {
        let (conn, platform, service) = setup();

        service
            .set_binding(&conn, ADMIN, "G1", EndpointPurpose::Log, "C42")
            .expect("set failed");
        service
            .remove_binding(&conn, ADMIN, "G1", EndpointPurpose::Log)
            .expect("remove failed");

        assert!(service
            .binding(&conn, ADMIN, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_none());
        assert!(platform.live_endpoints("G1").is_empty());

        // Removing again is still not an error.
        service
            .remove_binding(&conn, ADMIN, "G1", EndpointPurpose::Log)
            .expect("second remove failed");
    }

    #[test]
    fn operations_require_manage_permission() {
        let (conn, _, service) = setup();

        let err = service
            .set_binding(&conn, PLAIN, "G1", EndpointPurpose::Log, "C42")
            .unwrap_err();
        assert!(
            matches!(err, BindingError::Gate(GateError::Unauthorized(_))),
            "got {err:?}"
        );

        let err = service
            .binding(&conn, "sess-bogus", "G1", EndpointPurpose::Log)
            .unwrap_err();
        assert!(
            matches!(err, BindingError::Gate(GateError::Unauthorized(_))),
            "got {err:?}"
        );
    }

    #[test]
    fn suggestion_channel_is_a_plain_row_without_endpoint() {
        let (conn, platform, service) = setup();

        service
            .set_suggestion_channel(&conn, ADMIN, "G1", "C43")
            .expect("set failed");
        assert!(platform.live_endpoints("G1").is_empty());

        let bound = service
            .suggestion_channel(&conn, ADMIN, "G1")
            .expect("get failed")
            .expect("should be bound");
        assert_eq!(bound.channel_id, "C43");

        service
            .remove_suggestion_channel(&conn, ADMIN, "G1")
            .expect("remove failed");
        assert!(service
            .suggestion_channel(&conn, ADMIN, "G1")
            .expect("get failed")
            .is_none());
    }

    #[test]
    fn suggestion_channel_rejects_unknown_channel() {
        let (conn, _, service) = setup();

        let err = service
            .set_suggestion_channel(&conn, ADMIN, "G1", "C99")
            .unwrap_err();
        assert!(matches!(err, BindingError::ChannelNotFound(_)), "got {err:?}");
    }

    #[test]
    fn ticket_create_requires_intake_channel() {
        let (conn, _, service) = setup();

        let err = service
            .update_ticket_settings(&conn, ADMIN, "G1", &TicketUpdate::default())
            .unwrap_err();
        assert!(matches!(err, BindingError::InvalidInput(_)), "got {err:?}");
        assert!(service
            .ticket_settings(&conn, ADMIN, "G1")
            .expect("get failed")
            .is_none());
    }

    #[test]
    fn ticket_log_channel_binds_an_endpoint() {
        let (conn, platform, service) = setup();

        service
            .update_ticket_settings(
                &conn,
                ADMIN,
                "G1",
                &TicketUpdate {
                    intake_channel_id: Some("C43".to_string()),
                    intake_category_id: Some("CAT1".to_string()),
                    log_channel_id: Some("C42".to_string()),
                },
            )
            .expect("update failed");

        let settings = service
            .ticket_settings(&conn, ADMIN, "G1")
            .expect("get failed")
            .expect("should be configured");
        assert_eq!(settings.intake_channel.channel_id, "C43");
        assert_eq!(settings.intake_category_id.as_deref(), Some("CAT1"));
        assert_eq!(settings.ticket_count, 0);
        assert_eq!(
            settings.log_channel.as_ref().map(|c| c.channel_id.as_str()),
            Some("C42")
        );
        assert_eq!(platform.live_endpoints("G1").len(), 1);

        // A later update without a log channel leaves the binding alone.
        service
            .update_ticket_settings(
                &conn,
                ADMIN,
                "G1",
                &TicketUpdate {
                    intake_channel_id: Some("C42".to_string()),
                    ..TicketUpdate::default()
                },
            )
            .expect("second update failed");
        assert_eq!(platform.live_endpoints("G1").len(), 1);

        service
            .remove_ticket_settings(&conn, ADMIN, "G1")
            .expect("remove failed");
        assert!(service
            .ticket_settings(&conn, ADMIN, "G1")
            .expect("get failed")
            .is_none());
        assert!(platform.live_endpoints("G1").is_empty());
    }

    #[test]
    fn ticket_update_rejects_unknown_category() {
        let (conn, _, service) = setup();

        let err = service
            .update_ticket_settings(
                &conn,
                ADMIN,
                "G1",
                &TicketUpdate {
                    intake_channel_id: Some("C43".to_string()),
                    intake_category_id: Some("CAT9".to_string()),
                    ..TicketUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BindingError::CategoryNotFound(_)), "got {err:?}");
        assert!(service
            .ticket_settings(&conn, ADMIN, "G1")
            .expect("get failed")
            .is_none());
    }

    #[test]
    fn ticket_update_with_unknown_log_channel_writes_nothing() {
        let (conn, platform, service) = setup();

        let err = service
            .update_ticket_settings(
                &conn,
                ADMIN,
                "G1",
                &TicketUpdate {
                    intake_channel_id: Some("C43".to_string()),
                    log_channel_id: Some("C99".to_string()),
                    ..TicketUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BindingError::ChannelNotFound(_)), "got {err:?}");

        // The rejected update must not leave a ticket row behind.
        assert!(service
            .ticket_settings(&conn, ADMIN, "G1")
            .expect("get failed")
            .is_none());
        assert!(platform.live_endpoints("G1").is_empty());
    }

    #[test]
    fn duplicate_notifier_rejected_without_second_endpoint() {
        let (conn, platform, service) = setup();

        service
            .add_notifier(&conn, ADMIN, "G1", FeedKind::Subreddit, "rust", "C42", None)
            .expect("first add failed");

        let err = service
            .add_notifier(&conn, ADMIN, "G1", FeedKind::Subreddit, "rust", "C43", None)
            .unwrap_err();
        assert!(
            matches!(err, BindingError::DuplicateSubscription { .. }),
            "got {err:?}"
        );
        assert_eq!(
            err.to_string(),
            "a subreddit subscription for rust already exists, remove it first"
        );
        assert_eq!(platform.live_endpoints("G1").len(), 1);

        // Same source under a different kind is a distinct subscription.
        service
            .add_notifier(&conn, ADMIN, "G1", FeedKind::Stream, "rust", "C43", None)
            .expect("cross-kind add failed");
        assert_eq!(platform.live_endpoints("G1").len(), 2);
    }

    #[test]
    fn remove_notifier_revokes_its_endpoint() {
        let (conn, platform, service) = setup();

        service
            .add_notifier(
                &conn,
                ADMIN,
                "G1",
                FeedKind::Stream,
                "streamer",
                "C42",
                Some("%source% went live"),
            )
            .expect("add failed");
        assert_eq!(platform.live_endpoints("G1").len(), 1);

        service
            .remove_notifier(&conn, ADMIN, "G1", FeedKind::Stream, "streamer")
            .expect("remove failed");
        assert!(platform.live_endpoints("G1").is_empty());
        assert!(service
            .notifiers(&conn, ADMIN, "G1", FeedKind::Stream)
            .expect("list failed")
            .is_empty());

        let err = service
            .remove_notifier(&conn, ADMIN, "G1", FeedKind::Stream, "streamer")
            .unwrap_err();
        assert!(matches!(err, BindingError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn notifier_listing_reconciles_unresolved_channels() {
        let (conn, platform, service) = setup();

        service
            .add_notifier(&conn, ADMIN, "G1", FeedKind::Handle, "someone", "C42", None)
            .expect("add failed");

        // Simulate a legacy row persisted before channel resolution.
        conn.execute(
            "UPDATE notifier_subscriptions SET channel_id = NULL WHERE source = 'someone'",
            [],
        )
        .expect("null out channel");

        let listed = service
            .notifiers(&conn, ADMIN, "G1", FeedKind::Handle)
            .expect("list failed");
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].channel.as_ref().map(|c| c.channel_id.as_str()),
            Some("C42")
        );
        assert_eq!(listed[0].message_template, default_template(FeedKind::Handle));

        // The reconciled channel is persisted.
        let cached: Option<String> = conn
            .query_row(
                "SELECT channel_id FROM notifier_subscriptions WHERE source = 'someone'",
                [],
                |row| row.get(0),
            )
            .expect("query failed");
        assert_eq!(cached.as_deref(), Some("C42"));
    }
}
