//! Cached endpoint rows.
//!
//! Singleton purposes live in two places: `log` and `welcome` in the
//! dedicated `endpoint_bindings` table, `ticket-log` on the richer
//! `ticket_settings` row. This module hides the dispatch so the manager
//! sees one uniform row shape.

use crate::EndpointError;
use marshal_types::EndpointPurpose;
use rusqlite::{params, Connection, OptionalExtension};

/// One cached endpoint row, purpose-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRow {
    /// Destination channel, `None` until reconciled.
    pub channel_id: Option<String>,
    /// Remote endpoint identifier.
    pub endpoint_id: String,
    /// Posting secret.
    pub token: String,
}

/// Reads the cached row for a purpose, if any.
pub fn find(
    conn: &Connection,
    community_id: &str,
    purpose: EndpointPurpose,
) -> Result<Option<BindingRow>, rusqlite::Error> {
    let map = |row: &rusqlite::Row<'_>| {
        Ok(BindingRow {
            channel_id: row.get(0)?,
            endpoint_id: row.get(1)?,
            token: row.get(2)?,
        })
    };

    match purpose {
        EndpointPurpose::TicketLog => conn
            .query_row(
                "SELECT log_channel_id, endpoint_id, token
                 FROM ticket_settings
                 WHERE community_id = ?1 AND endpoint_id IS NOT NULL",
                [community_id],
                map,
            )
            .optional(),
        _ => conn
            .query_row(
                "SELECT channel_id, endpoint_id, token
                 FROM endpoint_bindings
                 WHERE community_id = ?1 AND purpose = ?2",
                params![community_id, purpose.as_str()],
                map,
            )
            .optional(),
    }
}

/// Writes (create-or-replace) the cached row for a purpose.
pub fn upsert(
    conn: &Connection,
    community_id: &str,
    purpose: EndpointPurpose,
    channel_id: Option<&str>,
    endpoint_id: &str,
    token: &str,
) -> Result<(), EndpointError> {
    match purpose {
        EndpointPurpose::TicketLog => {
            let count = conn.execute(
                "UPDATE ticket_settings
                 SET log_channel_id = ?2, endpoint_id = ?3, token = ?4
                 WHERE community_id = ?1",
                params![community_id, channel_id, endpoint_id, token],
            )?;
            if count == 0 {
                return Err(EndpointError::NotConfigured(community_id.to_string()));
            }
        }
        _ => {
            conn.execute(
                "INSERT INTO endpoint_bindings (community_id, purpose, channel_id, endpoint_id, token)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (community_id, purpose) DO UPDATE SET
                     channel_id = excluded.channel_id,
                     endpoint_id = excluded.endpoint_id,
                     token = excluded.token",
                params![community_id, purpose.as_str(), channel_id, endpoint_id, token],
            )?;
        }
    }
    Ok(())
}

/// Persists a lazily reconciled destination channel back onto the row.
pub fn fill_channel(
    conn: &Connection,
    community_id: &str,
    purpose: EndpointPurpose,
    channel_id: &str,
) -> Result<(), rusqlite::Error> {
    match purpose {
        EndpointPurpose::TicketLog => {
            conn.execute(
                "UPDATE ticket_settings SET log_channel_id = ?2 WHERE community_id = ?1",
                params![community_id, channel_id],
            )?;
        }
        _ => {
            conn.execute(
                "UPDATE endpoint_bindings SET channel_id = ?3
                 WHERE community_id = ?1 AND purpose = ?2",
                params![community_id, purpose.as_str(), channel_id],
            )?;
        }
    }
    Ok(())
}

/// Deletes the cached row (or nulls the ticket endpoint columns).
pub fn clear(
    conn: &Connection,
    community_id: &str,
    purpose: EndpointPurpose,
) -> Result<(), rusqlite::Error> {
    match purpose {
        EndpointPurpose::TicketLog => {
            conn.execute(
                "UPDATE ticket_settings
                 SET log_channel_id = NULL, endpoint_id = NULL, token = NULL
                 WHERE community_id = ?1",
                [community_id],
            )?;
        }
        _ => {
            conn.execute(
                "DELETE FROM endpoint_bindings WHERE community_id = ?1 AND purpose = ?2",
                params![community_id, purpose.as_str()],
            )?;
        }
    }
    Ok(())
}

/// Whether a ticket row exists for the community at all.
pub fn ticket_configured(conn: &Connection, community_id: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ticket_settings WHERE community_id = ?1)",
        [community_id],
        |row| row.get(0),
    )
}
