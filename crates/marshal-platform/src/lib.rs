//! Capability surface toward the remote chat platform.
//!
//! Marshal never speaks the chat-platform protocol itself. Everything it
//! needs from the platform (session resolution, community/channel/role
//! lookup, delivery-endpoint management) is expressed as the two traits
//! in this crate and consumed as injected capabilities. The [`rest`] module
//! provides a thin HTTP adapter against the bot gateway service; the
//! [`memory`] module provides an in-memory double for tests and local
//! development.
//!
//! All calls are synchronous round-trips from the caller's perspective.
//! Request handlers wrap them (together with database work) in
//! `tokio::task::spawn_blocking`.

use marshal_types::{CategoryInfo, ChannelInfo, RoleInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gate;
pub mod memory;
pub mod rest;

pub use gate::{AccessGate, GateError};

/// Errors surfaced by the platform capabilities.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The session identifier is invalid or expired.
    #[error("session is invalid or expired")]
    Unauthorized,
    /// A remote platform call was rejected or failed.
    #[error("remote platform call failed: {0}")]
    Remote(String),
}

/// The authenticated operator behind a session identifier.
///
/// Materialized per request by the session resolver; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable external user identifier.
    pub user_id: String,
    /// Display name, for log context only.
    pub username: String,
}

/// The principal's live permission snapshot within one community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAccess {
    /// Whether the member may manage the community's bot configuration.
    pub can_manage: bool,
}

/// Minimal identity of a community as known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySummary {
    /// Platform-assigned community identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A live delivery endpoint as reported by the platform.
///
/// The token is the endpoint's posting secret; an endpoint is only trusted
/// as "ours" when both the identifier and the token match the cached row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointHandle {
    /// Platform-assigned endpoint identifier.
    pub endpoint_id: String,
    /// Posting secret.
    pub token: String,
    /// Identifier of the channel the endpoint delivers into.
    pub channel_id: String,
}

/// Resolves opaque session identifiers to authenticated principals.
pub trait SessionResolver: Send + Sync {
    /// Returns the principal behind `session_id`.
    ///
    /// # Errors
    ///
    /// `PlatformError::Unauthorized` if the identifier is invalid or expired.
    fn resolve(&self, session_id: &str) -> Result<Principal, PlatformError>;
}

/// The minimal remote-platform capability Marshal consumes.
///
/// Lookup methods return `Ok(None)` for unknown identifiers; callers must
/// treat that as not-found rather than dereferencing.
pub trait PlatformClient: Send + Sync {
    /// Looks up a community by id.
    fn community(&self, community_id: &str) -> Result<Option<CommunitySummary>, PlatformError>;

    /// Returns the principal's access within a community, or `None` if they
    /// are not a member.
    fn member_access(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberAccess>, PlatformError>;

    /// Lists the community's channels.
    fn channels(&self, community_id: &str) -> Result<Vec<ChannelInfo>, PlatformError>;

    /// Lists the community's channel categories.
    fn categories(&self, community_id: &str) -> Result<Vec<CategoryInfo>, PlatformError>;

    /// Lists the community's roles.
    fn roles(&self, community_id: &str) -> Result<Vec<RoleInfo>, PlatformError>;

    /// Looks up a single channel by id.
    fn channel(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelInfo>, PlatformError>;

    /// Creates a delivery endpoint bound to `channel_id`, named `name`.
    fn create_endpoint(
        &self,
        community_id: &str,
        channel_id: &str,
        name: &str,
    ) -> Result<EndpointHandle, PlatformError>;

    /// Lists the community's live delivery endpoints.
    fn list_endpoints(&self, community_id: &str) -> Result<Vec<EndpointHandle>, PlatformError>;

    /// Deletes the endpoint matching both identifier and token.
    fn delete_endpoint(
        &self,
        community_id: &str,
        endpoint_id: &str,
        token: &str,
    ) -> Result<(), PlatformError>;
}

/// Read-only projection of a remote community's channels, roles, and
/// categories as observed at request time.
///
/// Constructed fresh per call by the [`AccessGate`]; never cached across
/// requests. Lists are `None` when the caller did not request eager loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityView {
    /// Platform-assigned community identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Channels, if eagerly loaded.
    pub channels: Option<Vec<ChannelInfo>>,
    /// Channel categories, loaded together with channels.
    pub categories: Option<Vec<CategoryInfo>>,
    /// Roles, if eagerly loaded.
    pub roles: Option<Vec<RoleInfo>>,
}

impl CommunityView {
    /// Finds a channel in the eagerly loaded list.
    ///
    /// Returns `None` when the channel is absent or the list was not loaded.
    pub fn channel_by_id(&self, channel_id: &str) -> Option<&ChannelInfo> {
        self.channels
            .as_deref()?
            .iter()
            .find(|c| c.id == channel_id)
    }

    /// Finds a role in the eagerly loaded list.
    pub fn role_by_id(&self, role_id: &str) -> Option<&RoleInfo> {
        self.roles.as_deref()?.iter().find(|r| r.id == role_id)
    }

    /// Finds a category in the eagerly loaded list.
    pub fn category_by_id(&self, category_id: &str) -> Option<&CategoryInfo> {
        self.categories
            .as_deref()?
            .iter()
            .find(|c| c.id == category_id)
    }
}
