//! Shared types and constants for the Marshal configuration backend.
//!
//! This crate provides the foundational types used across all Marshal crates:
//! endpoint binding purposes, social-feed kinds, the punishment action
//! enumeration, and the read-only channel/role/category projections returned
//! to API clients.
//!
//! No crate in the workspace depends on anything *except* `marshal-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};

/// Logical binding slot for a delivery endpoint.
///
/// Singleton purposes allow at most one active endpoint per community;
/// creating a new one must first revoke the prior one. Social-feed
/// subscriptions are keyed separately (see [`FeedKind`]) and are not
/// singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointPurpose {
    /// Moderation/audit log announcements.
    Log,
    /// Member welcome announcements.
    Welcome,
    /// Support-ticket transcript log.
    TicketLog,
}

impl EndpointPurpose {
    /// Returns the stable string key used in storage and display names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Welcome => "welcome",
            Self::TicketLog => "ticket-log",
        }
    }

    /// Attempts to convert a storage key back to a purpose.
    pub fn from_str_key(key: &str) -> Option<Self> {
        match key {
            "log" => Some(Self::Log),
            "welcome" => Some(Self::Welcome),
            "ticket-log" => Some(Self::TicketLog),
            _ => None,
        }
    }
}

/// The kind of external feed a notification subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// A subreddit feed.
    Subreddit,
    /// A live-stream channel.
    Stream,
    /// A video channel.
    Channel,
    /// A social-media handle.
    Handle,
}

impl FeedKind {
    /// Returns the stable string key used in storage and routes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subreddit => "subreddit",
            Self::Stream => "stream",
            Self::Channel => "channel",
            Self::Handle => "handle",
        }
    }

    /// Attempts to convert a storage/route key back to a feed kind.
    pub fn from_str_key(key: &str) -> Option<Self> {
        match key {
            "subreddit" => Some(Self::Subreddit),
            "stream" => Some(Self::Stream),
            "channel" => Some(Self::Channel),
            "handle" => Some(Self::Handle),
            _ => None,
        }
    }
}

/// Action taken when a member reaches a punishment rule's warning threshold.
///
/// Stored and serialized as its numeric code, matching the `0..=5` string
/// codes the rule-creation wire format accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PunishmentAction {
    /// No platform action; the warning itself is the punishment.
    Warn = 0,
    /// Time the member out for the rule's timeout duration.
    Timeout = 1,
    /// Grant the rule's target role.
    AddRole = 2,
    /// Remove the rule's target role.
    RemoveRole = 3,
    /// Kick the member from the community.
    Kick = 4,
    /// Ban the member from the community.
    Ban = 5,
}

impl PunishmentAction {
    /// Returns the numeric code for this action.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric code to an action.
    ///
    /// Returns `None` if the code is outside the defined enumeration.
    pub fn from_i64(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Warn),
            1 => Some(Self::Timeout),
            2 => Some(Self::AddRole),
            3 => Some(Self::RemoveRole),
            4 => Some(Self::Kick),
            5 => Some(Self::Ban),
            _ => None,
        }
    }
}

impl Serialize for PunishmentAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for PunishmentAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_i64(code).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid punishment action code {code}"))
        })
    }
}

/// Read-only projection of a community channel as observed at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Platform-assigned channel identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Identifier of the category the channel sits under, if any.
    pub category_id: Option<String>,
}

/// Read-only projection of a community role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    /// Platform-assigned role identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Read-only projection of a channel category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Platform-assigned category identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_key_round_trip() {
        for purpose in [
            EndpointPurpose::Log,
            EndpointPurpose::Welcome,
            EndpointPurpose::TicketLog,
        ] {
            assert_eq!(
                EndpointPurpose::from_str_key(purpose.as_str()),
                Some(purpose)
            );
        }
        assert_eq!(EndpointPurpose::from_str_key("suggestion"), None);
    }

    #[test]
    fn feed_kind_key_round_trip() {
        for kind in [
            FeedKind::Subreddit,
            FeedKind::Stream,
            FeedKind::Channel,
            FeedKind::Handle,
        ] {
            assert_eq!(FeedKind::from_str_key(kind.as_str()), Some(kind));
        }
        assert_eq!(FeedKind::from_str_key("rss"), None);
    }

    #[test]
    fn punishment_action_codes() {
        for code in 0..=5 {
            let action = PunishmentAction::from_i64(code).expect("valid code");
            assert_eq!(i64::from(action.as_u8()), code);
        }
        assert_eq!(PunishmentAction::from_i64(-1), None);
        assert_eq!(PunishmentAction::from_i64(6), None);
    }

    #[test]
    fn punishment_action_serializes_as_its_code() {
        let json = serde_json::to_string(&PunishmentAction::Timeout).expect("serialize");
        assert_eq!(json, "1");

        let parsed: PunishmentAction = serde_json::from_str("4").expect("deserialize");
        assert_eq!(parsed, PunishmentAction::Kick);
        assert!(serde_json::from_str::<PunishmentAction>("9").is_err());
    }
}
