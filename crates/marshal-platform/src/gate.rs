//! Community Access Gate.
//!
//! Every operator-facing operation passes through the gate before touching
//! the configuration store: it resolves the session to a principal, checks
//! the principal's live membership and manage permission in the target
//! community, and constructs a fresh [`CommunityView`] for the remainder of
//! the request. The gate fails closed: any uncertainty about access is an
//! authorization failure.

use crate::{CommunityView, PlatformClient, PlatformError, SessionResolver};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by gate resolution.
#[derive(Debug, Error)]
pub enum GateError {
    /// The session is invalid, or the principal lacks community access.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The community identifier does not resolve on the platform.
    #[error("community not found: {0}")]
    NotFound(String),
    /// A remote platform call failed.
    #[error("remote platform call failed: {0}")]
    Remote(String),
}

impl From<PlatformError> for GateError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Unauthorized => {
                GateError::Unauthorized("session is invalid or expired".to_string())
            }
            PlatformError::Remote(msg) => GateError::Remote(msg),
        }
    }
}

/// Authorizes an operator against a community and builds the per-request
/// view. Holds the session and platform capabilities by injection; no
/// ambient globals.
#[derive(Clone)]
pub struct AccessGate {
    sessions: Arc<dyn SessionResolver>,
    platform: Arc<dyn PlatformClient>,
}

impl AccessGate {
    /// Creates a gate over the given capabilities.
    pub fn new(sessions: Arc<dyn SessionResolver>, platform: Arc<dyn PlatformClient>) -> Self {
        Self { sessions, platform }
    }

    /// Authorizes `session_id` against `community_id` and returns a fresh
    /// view.
    ///
    /// `require_channels` and `require_roles` are independent eager-load
    /// flags; omitting them skips the corresponding remote list calls and
    /// leaves those lists absent from the view. Categories are loaded
    /// together with channels.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if the session does not resolve or the principal is not
    /// a member with manage permission; `NotFound` if the community does not
    /// exist on the platform.
    pub fn resolve(
        &self,
        session_id: &str,
        community_id: &str,
        require_channels: bool,
        require_roles: bool,
    ) -> Result<CommunityView, GateError> {
        let principal = self.sessions.resolve(session_id)?;

        let summary = self
            .platform
            .community(community_id)?
            .ok_or_else(|| GateError::NotFound(community_id.to_string()))?;

        let access = self
            .platform
            .member_access(community_id, &principal.user_id)?
            .ok_or_else(|| {
                GateError::Unauthorized(format!(
                    "{} is not a member of community {}",
                    principal.username, community_id
                ))
            })?;

        if !access.can_manage {
            return Err(GateError::Unauthorized(format!(
                "{} lacks manage permission in community {}",
                principal.username, community_id
            )));
        }

        self.build_view(summary.id, summary.name, require_channels, require_roles)
    }

    /// Resolves a community without a session, for read-only
    /// non-personalized operations. Only checks that the community exists;
    /// membership is not consulted.
    pub fn resolve_public(&self, community_id: &str) -> Result<CommunityView, GateError> {
        let summary = self
            .platform
            .community(community_id)?
            .ok_or_else(|| GateError::NotFound(community_id.to_string()))?;

        self.build_view(summary.id, summary.name, false, false)
    }

    fn build_view(
        &self,
        id: String,
        name: String,
        require_channels: bool,
        require_roles: bool,
    ) -> Result<CommunityView, GateError> {
        let (channels, categories) = if require_channels {
            (
                Some(self.platform.channels(&id)?),
                Some(self.platform.categories(&id)?),
            )
        } else {
            (None, None)
        };

        let roles = if require_roles {
            Some(self.platform.roles(&id)?)
        } else {
            None
        };

        Ok(CommunityView {
            id,
            name,
            channels,
            categories,
            roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPlatform, MemorySessions};

    fn setup() -> (AccessGate, Arc<MemoryPlatform>) {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_community("G1", "Test Community");
        platform.add_channel("G1", "C1", "general", None);
        platform.add_role("G1", "R1", "Moderator");
        platform.add_member("G1", "U1", true);
        platform.add_member("G1", "U2", false);

        let sessions = Arc::new(MemorySessions::new());
        sessions.insert("sess-admin", "U1", "admin");
        sessions.insert("sess-plain", "U2", "plain");

        let gate = AccessGate::new(sessions, platform.clone());
        (gate, platform)
    }

    #[test]
    fn resolve_loads_requested_lists_only() {
        let (gate, _) = setup();

        let view = gate.resolve("sess-admin", "G1", true, false).expect("resolve");
        assert!(view.channels.is_some());
        assert!(view.categories.is_some());
        assert!(view.roles.is_none());
        assert_eq!(view.channel_by_id("C1").map(|c| c.name.as_str()), Some("general"));

        let view = gate.resolve("sess-admin", "G1", false, true).expect("resolve");
        assert!(view.channels.is_none());
        assert!(view.role_by_id("R1").is_some());
    }

    #[test]
    fn resolve_rejects_invalid_session() {
        let (gate, _) = setup();
        let err = gate.resolve("sess-bogus", "G1", false, false).unwrap_err();
        assert!(matches!(err, GateError::Unauthorized(_)), "got {err:?}");
    }

    #[test]
    fn resolve_rejects_non_member() {
        let (gate, platform) = setup();
        platform.add_community("G2", "Other");
        let err = gate.resolve("sess-admin", "G2", false, false).unwrap_err();
        assert!(matches!(err, GateError::Unauthorized(_)), "got {err:?}");
    }

    #[test]
    fn resolve_rejects_member_without_manage_permission() {
        let (gate, _) = setup();
        let err = gate.resolve("sess-plain", "G1", false, false).unwrap_err();
        assert!(matches!(err, GateError::Unauthorized(_)), "got {err:?}");
    }

    #[test]
    fn resolve_unknown_community_is_not_found() {
        let (gate, _) = setup();
        let err = gate.resolve("sess-admin", "G9", false, false).unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)), "got {err:?}");
    }

    #[test]
    fn resolve_public_checks_existence_only() {
        let (gate, _) = setup();
        let view = gate.resolve_public("G1").expect("public resolve");
        assert_eq!(view.id, "G1");
        assert!(view.channels.is_none());

        let err = gate.resolve_public("G9").unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)), "got {err:?}");
    }
}
