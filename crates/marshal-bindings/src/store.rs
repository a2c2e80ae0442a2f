//! Row access for ticket, suggestion, and notifier configuration.

use marshal_types::FeedKind;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// The persisted ticket configuration for one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRow {
    pub intake_channel_id: String,
    pub intake_category_id: Option<String>,
    pub ticket_count: i64,
}

pub fn ticket_find(
    conn: &Connection,
    community_id: &str,
) -> Result<Option<TicketRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT intake_channel_id, intake_category_id, ticket_count
         FROM ticket_settings WHERE community_id = ?1",
        [community_id],
        |row| {
            Ok(TicketRow {
                intake_channel_id: row.get(0)?,
                intake_category_id: row.get(1)?,
                ticket_count: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Creates or updates the ticket row. Absent fields keep their stored value;
/// the caller guarantees an intake channel is present on first create.
pub fn ticket_upsert(
    conn: &Connection,
    community_id: &str,
    intake_channel_id: Option<&str>,
    intake_category_id: Option<&str>,
) -> Result<(), rusqlite::Error> {
    let updated = conn.execute(
        "UPDATE ticket_settings SET
            intake_channel_id = COALESCE(?2, intake_channel_id),
            intake_category_id = COALESCE(?3, intake_category_id)
         WHERE community_id = ?1",
        params![community_id, intake_channel_id, intake_category_id],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO ticket_settings (community_id, intake_channel_id, intake_category_id)
             VALUES (?1, ?2, ?3)",
            params![community_id, intake_channel_id, intake_category_id],
        )?;
    }
    Ok(())
}

pub fn ticket_delete(conn: &Connection, community_id: &str) -> Result<bool, rusqlite::Error> {
    let deleted = conn.execute(
        "DELETE FROM ticket_settings WHERE community_id = ?1",
        [community_id],
    )?;
    Ok(deleted > 0)
}

pub fn suggestion_find(
    conn: &Connection,
    community_id: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT channel_id FROM suggestion_settings WHERE community_id = ?1",
        [community_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn suggestion_upsert(
    conn: &Connection,
    community_id: &str,
    channel_id: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO suggestion_settings (community_id, channel_id)
         VALUES (?1, ?2)
         ON CONFLICT (community_id) DO UPDATE SET channel_id = excluded.channel_id",
        params![community_id, channel_id],
    )?;
    Ok(())
}

pub fn suggestion_delete(conn: &Connection, community_id: &str) -> Result<bool, rusqlite::Error> {
    let deleted = conn.execute(
        "DELETE FROM suggestion_settings WHERE community_id = ?1",
        [community_id],
    )?;
    Ok(deleted > 0)
}

/// One social-feed subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierRow {
    pub id: i64,
    pub source: String,
    pub message_template: String,
    /// Destination channel, `None` until reconciled.
    pub channel_id: Option<String>,
    pub endpoint_id: String,
    pub token: String,
}

fn map_notifier(row: &Row<'_>) -> Result<NotifierRow, rusqlite::Error> {
    Ok(NotifierRow {
        id: row.get(0)?,
        source: row.get(1)?,
        message_template: row.get(2)?,
        channel_id: row.get(3)?,
        endpoint_id: row.get(4)?,
        token: row.get(5)?,
    })
}

pub fn notifier_list(
    conn: &Connection,
    community_id: &str,
    kind: FeedKind,
) -> Result<Vec<NotifierRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, source, message_template, channel_id, endpoint_id, token
         FROM notifier_subscriptions
         WHERE community_id = ?1 AND kind = ?2
         ORDER BY source ASC",
    )?;
    let rows = stmt.query_map(params![community_id, kind.as_str()], map_notifier)?;

    let mut subscriptions = Vec::new();
    for row in rows {
        subscriptions.push(row?);
    }
    Ok(subscriptions)
}

pub fn notifier_find(
    conn: &Connection,
    community_id: &str,
    kind: FeedKind,
    source: &str,
) -> Result<Option<NotifierRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, source, message_template, channel_id, endpoint_id, token
         FROM notifier_subscriptions
         WHERE community_id = ?1 AND kind = ?2 AND source = ?3",
        params![community_id, kind.as_str(), source],
        map_notifier,
    )
    .optional()
}

#[allow(clippy::too_many_arguments)]
pub fn notifier_insert(
    conn: &Connection,
    community_id: &str,
    kind: FeedKind,
    source: &str,
    message_template: &str,
    channel_id: &str,
    endpoint_id: &str,
    token: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO notifier_subscriptions
            (community_id, kind, source, message_template, channel_id, endpoint_id, token)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            community_id,
            kind.as_str(),
            source,
            message_template,
            channel_id,
            endpoint_id,
            token,
        ],
    )?;
    Ok(())
}

/// Persists a lazily reconciled destination channel back onto a subscription.
pub fn notifier_fill_channel(
    conn: &Connection,
    id: i64,
    channel_id: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE notifier_subscriptions SET channel_id = ?2 WHERE id = ?1",
        params![id, channel_id],
    )?;
    Ok(())
}

pub fn notifier_delete(conn: &Connection, id: i64) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM notifier_subscriptions WHERE id = ?1", [id])?;
    Ok(())
}
