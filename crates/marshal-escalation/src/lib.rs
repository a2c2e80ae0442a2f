//! Escalation Service.
//!
//! Warning counters per (community, subject) pair and the punishment ladder
//! that maps accumulated warnings to actions. Counters are created lazily,
//! adjusted by addition and subtraction, and floored at zero; adjustments
//! saturate at the integer bounds. Ladder rules are validated field by
//! field before any write.

use marshal_platform::{AccessGate, GateError};
use marshal_types::PunishmentAction;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by escalation operations.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A rule field is malformed or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The referenced record does not exist in this community.
    #[error("not found: {0}")]
    NotFound(String),
}

/// One subject's accumulated warnings in a community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningRecord {
    pub user_id: String,
    pub count: i64,
}

/// One rule of the punishment ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PunishmentRule {
    pub id: i64,
    pub warning_threshold: i64,
    pub action: PunishmentAction,
    pub timeout_secs: i64,
    pub role_id: String,
}

/// Warning and punishment-ladder operations, gate-checked per call.
#[derive(Clone)]
pub struct EscalationService {
    gate: AccessGate,
}

impl EscalationService {
    pub fn new(gate: AccessGate) -> Self {
        Self { gate }
    }

    /// Lists every warning record in the community.
    pub fn warnings(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<Vec<WarningRecord>, EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, count FROM warnings
             WHERE community_id = ?1 ORDER BY count DESC, user_id ASC",
        )?;
        let rows = stmt.query_map([community_id], |row| {
            Ok(WarningRecord {
                user_id: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Adds warnings to a subject, creating the record lazily.
    ///
    /// `delta` arrives as a string; anything that does not parse as an
    /// integer falls back to 1 rather than failing the call.
    pub fn add_warning(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        user_id: &str,
        delta: Option<&str>,
    ) -> Result<WarningRecord, EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;
        self.adjust(conn, community_id, user_id, parse_delta(delta))
    }

    /// Subtracts warnings from a subject. The stored count never drops
    /// below zero.
    pub fn subtract_warning(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        user_id: &str,
        delta: Option<&str>,
    ) -> Result<WarningRecord, EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;
        self.adjust(conn, community_id, user_id, parse_delta(delta).saturating_neg())
    }

    /// Resets a subject's count to exactly zero regardless of its value.
    pub fn clear_warnings(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        user_id: &str,
    ) -> Result<WarningRecord, EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        set_count(conn, community_id, user_id, 0)?;
        Ok(WarningRecord {
            user_id: user_id.to_string(),
            count: 0,
        })
    }

    fn adjust(
        &self,
        conn: &Connection,
        community_id: &str,
        user_id: &str,
        delta: i64,
    ) -> Result<WarningRecord, EscalationError> {
        let current = current_count(conn, community_id, user_id)?.unwrap_or(0);
        // Deltas are operator input; saturate rather than overflow at the
        // extremes, then clamp at the zero floor.
        let count = current.saturating_add(delta).max(0);

        set_count(conn, community_id, user_id, count)?;
        Ok(WarningRecord {
            user_id: user_id.to_string(),
            count,
        })
    }

    /// Lists the community's punishment ladder, lowest threshold first.
    pub fn punishments(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<Vec<PunishmentRule>, EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let mut stmt = conn.prepare(
            "SELECT id, warning_threshold, action, timeout_secs, role_id
             FROM punishments WHERE community_id = ?1
             ORDER BY warning_threshold ASC, id ASC",
        )?;
        let rows = stmt.query_map([community_id], map_rule)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    /// Adds a ladder rule.
    ///
    /// Fields are validated in a fixed order (threshold, action, timeout,
    /// role) and the first failure is reported; nothing is written until
    /// every field passes. The role must exist in the community at creation
    /// time.
    pub fn add_punishment(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        warnings: &str,
        action: &str,
        timeout: &str,
        role_id: &str,
    ) -> Result<PunishmentRule, EscalationError> {
        let view = self.gate.resolve(session_id, community_id, false, true)?;

        let warning_threshold: i64 = warnings.trim().parse().ok().filter(|n| *n >= 0).ok_or_else(
            || {
                EscalationError::InvalidInput(format!(
                    "warning threshold must be a non-negative integer, got {warnings:?}"
                ))
            },
        )?;

        let action = action
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(PunishmentAction::from_i64)
            .ok_or_else(|| {
                EscalationError::InvalidInput(format!(
                    "action must be an integer in 0..=5, got {action:?}"
                ))
            })?;

        let timeout_secs: i64 = timeout.trim().parse().ok().filter(|n| *n >= 0).ok_or_else(
            || {
                EscalationError::InvalidInput(format!(
                    "timeout must be a duration in seconds, got {timeout:?}"
                ))
            },
        )?;

        if view.role_by_id(role_id).is_none() {
            return Err(EscalationError::NotFound(format!("role {role_id}")));
        }

        conn.execute(
            "INSERT INTO punishments (community_id, warning_threshold, action, timeout_secs, role_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                community_id,
                warning_threshold,
                i64::from(action.as_u8()),
                timeout_secs,
                role_id,
            ],
        )?;

        Ok(PunishmentRule {
            id: conn.last_insert_rowid(),
            warning_threshold,
            action,
            timeout_secs,
            role_id: role_id.to_string(),
        })
    }

    /// Removes one ladder rule.
    ///
    /// The rule must belong to the requesting community; a rule id that
    /// exists under another community is reported as `NotFound`, the same as
    /// a nonexistent id.
    pub fn remove_punishment(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
        punishment_id: i64,
    ) -> Result<(), EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT community_id FROM punishments WHERE id = ?1",
                [punishment_id],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            Some(owner) if owner == community_id => {
                conn.execute("DELETE FROM punishments WHERE id = ?1", [punishment_id])?;
                Ok(())
            }
            _ => Err(EscalationError::NotFound(format!(
                "punishment rule {punishment_id}"
            ))),
        }
    }

    /// Deletes every ladder rule in the community, best-effort.
    ///
    /// Individual deletion failures are logged and do not stop the sweep.
    pub fn clear_punishments(
        &self,
        conn: &Connection,
        session_id: &str,
        community_id: &str,
    ) -> Result<(), EscalationError> {
        self.gate.resolve(session_id, community_id, false, false)?;

        let mut stmt = conn.prepare("SELECT id FROM punishments WHERE community_id = ?1")?;
        let ids = stmt.query_map([community_id], |row| row.get::<_, i64>(0))?;

        for id in ids {
            let id = id?;
            if let Err(e) = conn.execute("DELETE FROM punishments WHERE id = ?1", [id]) {
                tracing::warn!(
                    community = community_id,
                    rule = id,
                    "punishment rule deletion failed during sweep: {e}"
                );
            }
        }
        Ok(())
    }
}

fn parse_delta(delta: Option<&str>) -> i64 {
    delta
        .and_then(|d| d.trim().parse::<i64>().ok())
        .unwrap_or(1)
}

fn current_count(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT count FROM warnings WHERE community_id = ?1 AND user_id = ?2",
        params![community_id, user_id],
        |row| row.get(0),
    )
    .optional()
}

fn set_count(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
    count: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO warnings (community_id, user_id, count)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (community_id, user_id) DO UPDATE SET
             count = excluded.count,
             updated_at = datetime('now')",
        params![community_id, user_id, count],
    )?;
    Ok(())
}

fn map_rule(row: &Row<'_>) -> Result<PunishmentRule, rusqlite::Error> {
    let code: i64 = row.get(2)?;
    let action = PunishmentAction::from_i64(code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("invalid punishment action code {code}").into(),
        )
    })?;

    Ok(PunishmentRule {
        id: row.get(0)?,
        warning_threshold: row.get(1)?,
        action,
        timeout_secs: row.get(3)?,
        role_id: row.get(4)?,
    })
}
