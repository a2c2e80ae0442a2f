//! Blocking REST adapter for the bot gateway service.
//!
//! The gateway exposes the bot's live view of the chat platform (sessions,
//! communities, channels, roles, delivery endpoints) over HTTP. This adapter
//! maps that surface onto the [`SessionResolver`] and [`PlatformClient`]
//! traits. It is deliberately thin: no retries, no caching, no protocol
//! logic: a 404 becomes `None`, a 401 becomes `Unauthorized`, anything
//! else unexpected becomes `Remote`.

use crate::{
    CommunitySummary, EndpointHandle, MemberAccess, PlatformClient, PlatformError, Principal,
    SessionResolver,
};
use marshal_types::{CategoryInfo, ChannelInfo, RoleInfo};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;

/// REST-backed implementation of both platform capabilities.
pub struct RestPlatform {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl RestPlatform {
    /// Creates an adapter against `base_url`, authenticating with the bot
    /// token on every call.
    pub fn new(base_url: &str, auth_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<Response, PlatformError> {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.auth_token)
            .send()
            .map_err(|e| PlatformError::Remote(e.to_string()))
    }

    /// Decodes a response, mapping 404 to `None` and 401 to `Unauthorized`.
    fn decode_optional<T: DeserializeOwned>(
        response: Response,
    ) -> Result<Option<T>, PlatformError> {
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => Err(PlatformError::Unauthorized),
            status if status.is_success() => response
                .json()
                .map(Some)
                .map_err(|e| PlatformError::Remote(e.to_string())),
            status => Err(PlatformError::Remote(format!(
                "gateway returned {status}"
            ))),
        }
    }

    fn decode_required<T: DeserializeOwned>(response: Response) -> Result<T, PlatformError> {
        let status = response.status();
        Self::decode_optional(response)?
            .ok_or_else(|| PlatformError::Remote(format!("gateway returned {status}")))
    }
}

impl SessionResolver for RestPlatform {
    fn resolve(&self, session_id: &str) -> Result<Principal, PlatformError> {
        let response = self.get(&format!("/sessions/{session_id}"))?;
        // An unknown session is an authorization failure, not a lookup miss.
        Self::decode_optional(response)?.ok_or(PlatformError::Unauthorized)
    }
}

impl PlatformClient for RestPlatform {
    fn community(&self, community_id: &str) -> Result<Option<CommunitySummary>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}"))?;
        Self::decode_optional(response)
    }

    fn member_access(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberAccess>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}/members/{user_id}"))?;
        Self::decode_optional(response)
    }

    fn channels(&self, community_id: &str) -> Result<Vec<ChannelInfo>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}/channels"))?;
        Self::decode_required(response)
    }

    fn categories(&self, community_id: &str) -> Result<Vec<CategoryInfo>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}/categories"))?;
        Self::decode_required(response)
    }

    fn roles(&self, community_id: &str) -> Result<Vec<RoleInfo>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}/roles"))?;
        Self::decode_required(response)
    }

    fn channel(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelInfo>, PlatformError> {
        let response = self.get(&format!(
            "/communities/{community_id}/channels/{channel_id}"
        ))?;
        Self::decode_optional(response)
    }

    fn create_endpoint(
        &self,
        community_id: &str,
        channel_id: &str,
        name: &str,
    ) -> Result<EndpointHandle, PlatformError> {
        let response = self
            .client
            .post(self.url(&format!(
                "/communities/{community_id}/channels/{channel_id}/endpoints"
            )))
            .bearer_auth(&self.auth_token)
            .json(&json!({ "name": name }))
            .send()
            .map_err(|e| PlatformError::Remote(e.to_string()))?;
        Self::decode_required(response)
    }

    fn list_endpoints(&self, community_id: &str) -> Result<Vec<EndpointHandle>, PlatformError> {
        let response = self.get(&format!("/communities/{community_id}/endpoints"))?;
        Self::decode_required(response)
    }

    fn delete_endpoint(
        &self,
        community_id: &str,
        endpoint_id: &str,
        token: &str,
    ) -> Result<(), PlatformError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/communities/{community_id}/endpoints/{endpoint_id}"
            )))
            .bearer_auth(&self.auth_token)
            .json(&json!({ "token": token }))
            .send()
            .map_err(|e| PlatformError::Remote(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PlatformError::Remote(format!(
                "gateway returned {}",
                response.status()
            )))
        }
    }
}
