//! Delivery Endpoint Manager.
//!
//! A delivery endpoint is a revocable, tokened handle that lets the bot post
//! into one destination channel without per-message authentication. This
//! crate owns the mapping between binding purposes and live endpoints:
//! cached rows in the local store, lazy reconciliation against the remote
//! endpoint list, create-or-replace binding, and best-effort revocation.
//!
//! Three sources of truth meet here (the local row, the live remote
//! endpoint list, and the operator's request) without a transaction
//! spanning them. The resolution rules:
//!
//! - The local row decides whether a purpose *is bound*. Remote deletion
//!   out-of-band makes the binding orphaned, detected lazily on read, never
//!   proactively.
//! - A live endpoint only counts as ours when both its identifier and its
//!   secret token match the cached row. Identifiers alone are not trusted.
//! - Revocation failures are swallowed (and logged): the next bind
//!   overwrites the row, so a dangling remote endpoint is a leak, not a
//!   correctness problem.

mod store;

pub use store::BindingRow;

use marshal_platform::{PlatformClient, PlatformError};
use marshal_types::EndpointPurpose;
use rusqlite::Connection;
use thiserror::Error;

/// Errors raised by endpoint management.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Local store access failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The destination channel does not resolve in the community.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    /// The ticket-log purpose requires a configured ticket row first.
    #[error("ticket settings not configured for community {0}")]
    NotConfigured(String),
    /// A remote platform call failed on a creation path.
    #[error("remote platform call failed: {0}")]
    Remote(String),
}

impl From<PlatformError> for EndpointError {
    fn from(e: PlatformError) -> Self {
        // The manager calls the platform with bot credentials; an
        // authorization failure here is a deployment fault, not an operator
        // one.
        EndpointError::Remote(e.to_string())
    }
}

/// A purpose's cached delivery endpoint, as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEndpoint {
    /// Community the binding belongs to.
    pub community_id: String,
    /// The binding slot.
    pub purpose: EndpointPurpose,
    /// Destination channel, `None` until reconciled.
    pub channel_id: Option<String>,
    /// Remote endpoint identifier.
    pub endpoint_id: String,
    /// Posting secret.
    pub token: String,
}

impl DeliveryEndpoint {
    fn from_row(community_id: &str, purpose: EndpointPurpose, row: BindingRow) -> Self {
        Self {
            community_id: community_id.to_string(),
            purpose,
            channel_id: row.channel_id,
            endpoint_id: row.endpoint_id,
            token: row.token,
        }
    }
}

/// Manages delivery endpoints for one injected platform capability.
pub struct EndpointManager<'a> {
    platform: &'a dyn PlatformClient,
}

impl<'a> EndpointManager<'a> {
    /// Creates a manager over the given platform client.
    pub fn new(platform: &'a dyn PlatformClient) -> Self {
        Self { platform }
    }

    /// Returns the purpose's current binding, reconciling lazily.
    ///
    /// Resolution order: no cached row means unbound. A cached row with a
    /// resolved channel is returned as-is. A cached row without one is
    /// matched against the live endpoint list on identifier AND token; a
    /// match back-fills the channel id into the store (idempotent), no match
    /// means the binding is orphaned and reads as unbound rather than
    /// failing the caller.
    pub fn get_binding(
        &self,
        conn: &Connection,
        community_id: &str,
        purpose: EndpointPurpose,
    ) -> Result<Option<DeliveryEndpoint>, EndpointError> {
        let Some(row) = store::find(conn, community_id, purpose)? else {
            return Ok(None);
        };

        if row.channel_id.is_some() {
            return Ok(Some(DeliveryEndpoint::from_row(community_id, purpose, row)));
        }

        let live = self.platform.list_endpoints(community_id)?;
        let matched = live
            .into_iter()
            .find(|e| e.endpoint_id == row.endpoint_id && e.token == row.token);

        match matched {
            Some(handle) => {
                store::fill_channel(conn, community_id, purpose, &handle.channel_id)?;
                Ok(Some(DeliveryEndpoint {
                    community_id: community_id.to_string(),
                    purpose,
                    channel_id: Some(handle.channel_id),
                    endpoint_id: row.endpoint_id,
                    token: row.token,
                }))
            }
            None => {
                tracing::debug!(
                    community = community_id,
                    purpose = purpose.as_str(),
                    endpoint = %row.endpoint_id,
                    "cached endpoint has no live match, treating binding as orphaned"
                );
                Ok(None)
            }
        }
    }

    /// Binds `purpose` to `channel_id`, replacing any prior endpoint.
    ///
    /// The prior endpoint (if any) is revoked best-effort first; a failed
    /// revocation never blocks rebinding. The new endpoint's display name is
    /// derived deterministically from `name_prefix`.
    ///
    /// Two concurrent binds for the same (community, purpose) can
    /// interleave: each revokes only the endpoint it observed at the start,
    /// so the last writer's row wins and the loser's endpoint may leak
    /// remotely. Accepted: these are operator configuration requests, not a
    /// hot path, and the next rebind cleans up whatever the row points at.
    ///
    /// # Errors
    ///
    /// `ChannelNotFound` if `channel_id` does not resolve in the community;
    /// `Remote` if endpoint creation fails; `NotConfigured` if the purpose
    /// is `TicketLog` and no ticket row exists yet.
    pub fn bind(
        &self,
        conn: &Connection,
        community_id: &str,
        purpose: EndpointPurpose,
        channel_id: &str,
        name_prefix: &str,
    ) -> Result<DeliveryEndpoint, EndpointError> {
        self.platform
            .channel(community_id, channel_id)?
            .ok_or_else(|| EndpointError::ChannelNotFound(channel_id.to_string()))?;

        // Check before creating the endpoint, or a refused bind would still
        // leave a live remote endpoint behind.
        if purpose == EndpointPurpose::TicketLog && !store::ticket_configured(conn, community_id)? {
            return Err(EndpointError::NotConfigured(community_id.to_string()));
        }

        if let Some(prior) = store::find(conn, community_id, purpose)? {
            self.revoke_remote(community_id, &prior.endpoint_id, &prior.token);
        }

        let name = endpoint_name(name_prefix, purpose);
        let handle = self
            .platform
            .create_endpoint(community_id, channel_id, &name)?;

        store::upsert(
            conn,
            community_id,
            purpose,
            Some(channel_id),
            &handle.endpoint_id,
            &handle.token,
        )?;

        Ok(DeliveryEndpoint {
            community_id: community_id.to_string(),
            purpose,
            channel_id: Some(channel_id.to_string()),
            endpoint_id: handle.endpoint_id,
            token: handle.token,
        })
    }

    /// Revokes the purpose's remote endpoint, best-effort, and returns the
    /// cached row that was targeted.
    ///
    /// The local row is NOT deleted here; callers decide whether to clear
    /// it or merely report it. Returns `None` (not an error) when no binding
    /// existed.
    pub fn revoke(
        &self,
        conn: &Connection,
        community_id: &str,
        purpose: EndpointPurpose,
    ) -> Result<Option<DeliveryEndpoint>, EndpointError> {
        let Some(row) = store::find(conn, community_id, purpose)? else {
            return Ok(None);
        };

        self.revoke_remote(community_id, &row.endpoint_id, &row.token);
        Ok(Some(DeliveryEndpoint::from_row(community_id, purpose, row)))
    }

    /// Deletes the purpose's local row. Paired with [`Self::revoke`] by
    /// callers that want revoke-and-clear semantics.
    pub fn clear(
        &self,
        conn: &Connection,
        community_id: &str,
        purpose: EndpointPurpose,
    ) -> Result<(), EndpointError> {
        store::clear(conn, community_id, purpose)?;
        Ok(())
    }

    /// Creates an endpoint for a social-feed subscription.
    ///
    /// Feed subscriptions are not singletons; the caller owns uniqueness and
    /// row persistence. Channel validation matches [`Self::bind`].
    pub fn create_feed_endpoint(
        &self,
        community_id: &str,
        channel_id: &str,
        name: &str,
    ) -> Result<marshal_platform::EndpointHandle, EndpointError> {
        self.platform
            .channel(community_id, channel_id)?
            .ok_or_else(|| EndpointError::ChannelNotFound(channel_id.to_string()))?;

        Ok(self.platform.create_endpoint(community_id, channel_id, name)?)
    }

    /// Best-effort remote deletion of an endpoint by identifier and token.
    ///
    /// Errors are swallowed and logged: the local row, not remote
    /// existence, is the authority for "is this bound".
    pub fn revoke_remote(&self, community_id: &str, endpoint_id: &str, token: &str) {
        if let Err(e) = self.platform.delete_endpoint(community_id, endpoint_id, token) {
            tracing::debug!(
                community = community_id,
                endpoint = endpoint_id,
                "best-effort endpoint revocation failed: {e}"
            );
        }
    }
}

/// Deterministic endpoint display name for a singleton purpose.
fn endpoint_name(prefix: &str, purpose: EndpointPurpose) -> String {
    let suffix = match purpose {
        EndpointPurpose::Log => "Log",
        EndpointPurpose::Welcome => "Welcome",
        EndpointPurpose::TicketLog => "TicketLog",
    };
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal_db::run_migrations;
    use marshal_platform::memory::MemoryPlatform;
    use rusqlite::Connection;

    fn setup() -> (Connection, MemoryPlatform) {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        run_migrations(&conn).expect("failed to run migrations");

        let platform = MemoryPlatform::new();
        platform.add_community("G1", "Test");
        platform.add_channel("G1", "C42", "announcements", None);
        platform.add_channel("G1", "C43", "general", None);
        (conn, platform)
    }

    #[test]
    fn bind_then_get_returns_bound_channel() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        let bound = manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C42", "Marshal")
            .expect("bind failed");
        assert_eq!(bound.channel_id.as_deref(), Some("C42"));

        let got = manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .expect("should be bound");
        assert_eq!(got.channel_id.as_deref(), Some("C42"));
        assert_eq!(got.endpoint_id, bound.endpoint_id);
    }

    #[test]
    fn rebind_leaves_exactly_one_live_endpoint() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C42", "Marshal")
            .expect("first bind failed");
        manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C43", "Marshal")
            .expect("second bind failed");

        let live = platform.live_endpoints("G1");
        assert_eq!(live.len(), 1, "old endpoint should have been revoked");
        assert_eq!(live[0].channel_id, "C43");

        let got = manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .expect("should be bound");
        assert_eq!(got.channel_id.as_deref(), Some("C43"));
    }

    #[test]
    fn bind_unknown_channel_writes_nothing() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        let err = manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C99", "Marshal")
            .unwrap_err();
        assert!(matches!(err, EndpointError::ChannelNotFound(_)), "got {err:?}");

        assert!(manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_none());
        assert!(platform.live_endpoints("G1").is_empty());
    }

    #[test]
    fn rebind_survives_already_deleted_endpoint() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        let first = manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C42", "Marshal")
            .expect("first bind failed");

        // Someone deletes the endpoint out-of-band; the cached row is stale.
        platform.delete_endpoint_out_of_band("G1", &first.endpoint_id);

        let second = manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C43", "Marshal")
            .expect("rebind should succeed despite failed revocation");
        assert_ne!(second.endpoint_id, first.endpoint_id);
        assert_eq!(platform.live_endpoints("G1").len(), 1);
    }

    #[test]
    fn failed_endpoint_creation_writes_nothing() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        platform.set_endpoint_ops_fail(true);
        let err = manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C42", "Marshal")
            .unwrap_err();
        assert!(matches!(err, EndpointError::Remote(_)), "got {err:?}");

        platform.set_endpoint_ops_fail(false);
        assert!(manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_none());
        assert!(platform.live_endpoints("G1").is_empty());
    }

    #[test]
    fn revoke_without_binding_is_not_an_error() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        let revoked = manager
            .revoke(&conn, "G1", EndpointPurpose::Welcome)
            .expect("revoke failed");
        assert!(revoked.is_none());
    }

    #[test]
    fn revoke_deletes_remote_but_keeps_row() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        manager
            .bind(&conn, "G1", EndpointPurpose::Log, "C42", "Marshal")
            .expect("bind failed");

        let revoked = manager
            .revoke(&conn, "G1", EndpointPurpose::Log)
            .expect("revoke failed")
            .expect("should report the revoked row");
        assert_eq!(revoked.channel_id.as_deref(), Some("C42"));
        assert!(platform.live_endpoints("G1").is_empty());

        // Local row is authoritative: still bound until cleared.
        assert!(manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_some());

        manager
            .clear(&conn, "G1", EndpointPurpose::Log)
            .expect("clear failed");
        assert!(manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .is_none());
    }

    #[test]
    fn unresolved_channel_is_reconciled_and_cached() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        // A row persisted before channel resolution was recorded.
        let handle = platform
            .create_endpoint("G1", "C42", "Marshal-Log")
            .expect("create failed");
        store::upsert(&conn, "G1", EndpointPurpose::Log, None, &handle.endpoint_id, &handle.token)
            .expect("insert failed");

        let got = manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("get failed")
            .expect("should reconcile to bound");
        assert_eq!(got.channel_id.as_deref(), Some("C42"));

        // The cache fill must be persisted.
        let row = store::find(&conn, "G1", EndpointPurpose::Log)
            .expect("find failed")
            .expect("row exists");
        assert_eq!(row.channel_id.as_deref(), Some("C42"));
    }

    #[test]
    fn orphaned_binding_reads_as_unbound() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        // Cached identity that matches no live endpoint (token mismatch).
        let handle = platform
            .create_endpoint("G1", "C42", "Marshal-Log")
            .expect("create failed");
        store::upsert(&conn, "G1", EndpointPurpose::Log, None, &handle.endpoint_id, "wrong-token")
            .expect("insert failed");

        let got = manager
            .get_binding(&conn, "G1", EndpointPurpose::Log)
            .expect("orphan must not fail the caller");
        assert!(got.is_none());
    }

    #[test]
    fn ticket_log_requires_configured_ticket_row() {
        let (conn, platform) = setup();
        let manager = EndpointManager::new(&platform);

        let err = manager
            .bind(&conn, "G1", EndpointPurpose::TicketLog, "C42", "Marshal")
            .unwrap_err();
        assert!(matches!(err, EndpointError::NotConfigured(_)), "got {err:?}");

        conn.execute(
            "INSERT INTO ticket_settings (community_id, intake_channel_id) VALUES ('G1', 'C43')",
            [],
        )
        .expect("seed ticket row");

        let bound = manager
            .bind(&conn, "G1", EndpointPurpose::TicketLog, "C42", "Marshal")
            .expect("bind should succeed once configured");
        assert_eq!(bound.channel_id.as_deref(), Some("C42"));

        let got = manager
            .get_binding(&conn, "G1", EndpointPurpose::TicketLog)
            .expect("get failed")
            .expect("should be bound");
        assert_eq!(got.endpoint_id, bound.endpoint_id);
    }
}
