//! In-memory platform double.
//!
//! Implements [`SessionResolver`] and [`PlatformClient`] over plain maps.
//! Used by the test suites of every crate that consumes the platform
//! capabilities, and usable for local development without a gateway.

use crate::{
    CommunitySummary, EndpointHandle, MemberAccess, PlatformClient, PlatformError, Principal,
    SessionResolver,
};
use marshal_types::{CategoryInfo, ChannelInfo, RoleInfo};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct CommunityState {
    name: String,
    channels: Vec<ChannelInfo>,
    categories: Vec<CategoryInfo>,
    roles: Vec<RoleInfo>,
    members: HashMap<String, MemberAccess>,
    endpoints: Vec<EndpointHandle>,
}

#[derive(Default)]
struct State {
    communities: HashMap<String, CommunityState>,
    next_endpoint: u64,
    endpoint_ops_fail: bool,
}

/// In-memory [`PlatformClient`] implementation.
#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a community.
    pub fn add_community(&self, community_id: &str, name: &str) {
        let mut state = self.lock();
        state.communities.insert(
            community_id.to_string(),
            CommunityState {
                name: name.to_string(),
                ..CommunityState::default()
            },
        );
    }

    /// Adds a channel to a community. The community must already exist.
    pub fn add_channel(
        &self,
        community_id: &str,
        channel_id: &str,
        name: &str,
        category_id: Option<&str>,
    ) {
        let mut state = self.lock();
        if let Some(community) = state.communities.get_mut(community_id) {
            community.channels.push(ChannelInfo {
                id: channel_id.to_string(),
                name: name.to_string(),
                category_id: category_id.map(str::to_string),
            });
        }
    }

    /// Adds a category to a community.
    pub fn add_category(&self, community_id: &str, category_id: &str, name: &str) {
        let mut state = self.lock();
        if let Some(community) = state.communities.get_mut(community_id) {
            community.categories.push(CategoryInfo {
                id: category_id.to_string(),
                name: name.to_string(),
            });
        }
    }

    /// Adds a role to a community.
    pub fn add_role(&self, community_id: &str, role_id: &str, name: &str) {
        let mut state = self.lock();
        if let Some(community) = state.communities.get_mut(community_id) {
            community.roles.push(RoleInfo {
                id: role_id.to_string(),
                name: name.to_string(),
            });
        }
    }

    /// Registers a member with or without manage permission.
    pub fn add_member(&self, community_id: &str, user_id: &str, can_manage: bool) {
        let mut state = self.lock();
        if let Some(community) = state.communities.get_mut(community_id) {
            community
                .members
                .insert(user_id.to_string(), MemberAccess { can_manage });
        }
    }

    /// Makes every endpoint create/list/delete call fail until reset.
    ///
    /// Used to exercise the best-effort revocation paths.
    pub fn set_endpoint_ops_fail(&self, fail: bool) {
        self.lock().endpoint_ops_fail = fail;
    }

    /// Deletes an endpoint out-of-band, simulating removal by another client.
    pub fn delete_endpoint_out_of_band(&self, community_id: &str, endpoint_id: &str) {
        let mut state = self.lock();
        if let Some(community) = state.communities.get_mut(community_id) {
            community.endpoints.retain(|e| e.endpoint_id != endpoint_id);
        }
    }

    /// Returns the community's live endpoints (inspection helper for tests).
    pub fn live_endpoints(&self, community_id: &str) -> Vec<EndpointHandle> {
        let state = self.lock();
        state
            .communities
            .get(community_id)
            .map(|c| c.endpoints.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding this lock only happens in failing tests;
        // recovering keeps the remaining assertions meaningful.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_endpoint_ops(&self, state: &State) -> Result<(), PlatformError> {
        if state.endpoint_ops_fail {
            return Err(PlatformError::Remote(
                "endpoint operations disabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl PlatformClient for MemoryPlatform {
    fn community(&self, community_id: &str) -> Result<Option<CommunitySummary>, PlatformError> {
        let state = self.lock();
        Ok(state.communities.get(community_id).map(|c| CommunitySummary {
            id: community_id.to_string(),
            name: c.name.clone(),
        }))
    }

    fn member_access(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberAccess>, PlatformError> {
        let state = self.lock();
        Ok(state
            .communities
            .get(community_id)
            .and_then(|c| c.members.get(user_id))
            .copied())
    }

    fn channels(&self, community_id: &str) -> Result<Vec<ChannelInfo>, PlatformError> {
        let state = self.lock();
        Ok(state
            .communities
            .get(community_id)
            .map(|c| c.channels.clone())
            .unwrap_or_default())
    }

    fn categories(&self, community_id: &str) -> Result<Vec<CategoryInfo>, PlatformError> {
        let state = self.lock();
        Ok(state
            .communities
            .get(community_id)
            .map(|c| c.categories.clone())
            .unwrap_or_default())
    }

    fn roles(&self, community_id: &str) -> Result<Vec<RoleInfo>, PlatformError> {
        let state = self.lock();
        Ok(state
            .communities
            .get(community_id)
            .map(|c| c.roles.clone())
            .unwrap_or_default())
    }

    fn channel(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelInfo>, PlatformError> {
        let state = self.lock();
        Ok(state
            .communities
            .get(community_id)
            .and_then(|c| c.channels.iter().find(|ch| ch.id == channel_id))
            .cloned())
    }

    fn create_endpoint(
        &self,
        community_id: &str,
        channel_id: &str,
        name: &str,
    ) -> Result<EndpointHandle, PlatformError> {
        let mut state = self.lock();
        self.check_endpoint_ops(&state)?;

        let n = state.next_endpoint;
        state.next_endpoint += 1;

        let community = state
            .communities
            .get_mut(community_id)
            .ok_or_else(|| PlatformError::Remote(format!("unknown community {community_id}")))?;

        if !community.channels.iter().any(|c| c.id == channel_id) {
            return Err(PlatformError::Remote(format!(
                "channel {channel_id} is not postable"
            )));
        }

        let handle = EndpointHandle {
            endpoint_id: format!("ep-{n}"),
            token: format!("tok-{n}-{name}"),
            channel_id: channel_id.to_string(),
        };
        community.endpoints.push(handle.clone());
        Ok(handle)
    }

    fn list_endpoints(&self, community_id: &str) -> Result<Vec<EndpointHandle>, PlatformError> {
        let state = self.lock();
        self.check_endpoint_ops(&state)?;
        Ok(state
            .communities
            .get(community_id)
            .map(|c| c.endpoints.clone())
            .unwrap_or_default())
    }

    fn delete_endpoint(
        &self,
        community_id: &str,
        endpoint_id: &str,
        token: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        self.check_endpoint_ops(&state)?;

        let community = state
            .communities
            .get_mut(community_id)
            .ok_or_else(|| PlatformError::Remote(format!("unknown community {community_id}")))?;

        let before = community.endpoints.len();
        community
            .endpoints
            .retain(|e| !(e.endpoint_id == endpoint_id && e.token == token));

        if community.endpoints.len() == before {
            return Err(PlatformError::Remote(format!(
                "no endpoint {endpoint_id} with matching token"
            )));
        }
        Ok(())
    }
}

/// In-memory [`SessionResolver`] implementation.
#[derive(Default)]
pub struct MemorySessions {
    sessions: Mutex<HashMap<String, Principal>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session for a user.
    pub fn insert(&self, session_id: &str, user_id: &str, username: &str) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(
            session_id.to_string(),
            Principal {
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
        );
    }
}

impl SessionResolver for MemorySessions {
    fn resolve(&self, session_id: &str) -> Result<Principal, PlatformError> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .get(session_id)
            .cloned()
            .ok_or(PlatformError::Unauthorized)
    }
}
