//! ============================================================================
//! HTTP Matching Client - Matching API over reqwest
//! ============================================================================
//! Bearer credential comes from the session passed into each call. Transport
//! timeouts are enforced by the client and surface as `ApiError::Network`.
//! ============================================================================

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::MatchingApi;
use crate::config::SparkoConfig;
use crate::error::ApiError;
use crate::types::{
    Completion, Decision, DiscoverResponse, MatchSummary, Outcome, Profile, ProfileId, Role,
    RoleSwitchAck, SessionContext, SparkReset,
};

/// Matching API client backed by reqwest
pub struct HttpMatchingClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMatchingClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SparkoConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder, session: &SessionContext) -> RequestBuilder {
        match session.bearer() {
            Some(bearer) => request.header("Authorization", bearer),
            None => request,
        }
    }

    /// Send a request and decode the JSON body, classifying failures
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("{} failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("API request failed")
                    .to_string()
            });
            warn!("{} returned {}: {}", context, status, message);
            return Err(classify_status(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", context, e)))
    }
}

#[async_trait]
impl MatchingApi for HttpMatchingClient {
    async fn discover(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<DiscoverResponse, ApiError> {
        debug!("Discovering candidates for role {}", role);

        let request = self
            .client
            .get(self.url("/matching/discover"))
            .query(&[("role", role.as_str())]);
        let wire: WireDiscover = self
            .send_json(self.authorize(request, session), "discover")
            .await?;

        let response = wire.into_response();
        info!(
            "Discovered {} candidates for {} (incomplete: {})",
            response.profiles.len(),
            role,
            response.incomplete
        );
        Ok(response)
    }

    async fn decide(
        &self,
        session: &SessionContext,
        decision: &Decision,
    ) -> Result<Outcome, ApiError> {
        debug!(
            "Submitting {} on {} (token {})",
            decision.kind, decision.profile_id, decision.request_token
        );

        let body = serde_json::json!({
            "user_id": decision.profile_id,
            "action": decision.kind.as_str(),
            "request_token": decision.request_token,
        });
        let request = self
            .client
            .post(self.url("/matching/swipe"))
            .header("Idempotency-Key", decision.request_token.to_string())
            .json(&body);
        let wire: WireSwipe = self.send_json(self.authorize(request, session), "swipe").await?;

        Ok(Outcome {
            currency_balance: wire.super_spark_count,
            match_formed: wire.matched,
            match_id: wire.match_id.map(|id| id.to_string()),
        })
    }

    async fn switch_role(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<RoleSwitchAck, ApiError> {
        info!("Switching role to {}", role);

        let request = self
            .client
            .post(self.url("/profile/switch-role"))
            .json(&serde_json::json!({ "role": role.as_str() }));
        let wire: WireRoleSwitch = self
            .send_json(self.authorize(request, session), "switch-role")
            .await?;

        Ok(RoleSwitchAck {
            role: wire.current_role.unwrap_or(role),
            completion: wire.profile.map(WireCompletion::into_completion),
        })
    }

    async fn check_completion(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<Completion, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/profile/check-completion/{}", role.as_str())));
        let wire: WireCompletion = self
            .send_json(self.authorize(request, session), "check-completion")
            .await?;
        Ok(wire.into_completion())
    }

    async fn reset_super_sparks(&self, session: &SessionContext) -> Result<SparkReset, ApiError> {
        let request = self.client.post(self.url("/matching/super-spark/reset"));
        let wire: WireSparkReset = self
            .send_json(self.authorize(request, session), "super-spark reset")
            .await?;

        Ok(SparkReset {
            balance: wire.super_spark_count,
            message: wire.message,
            next_reset: wire.next_reset,
        })
    }

    async fn list_matches(&self, session: &SessionContext) -> Result<Vec<MatchSummary>, ApiError> {
        let request = self.client.get(self.url("/matching/matches"));
        let wire: WireMatches = self
            .send_json(self.authorize(request, session), "matches")
            .await?;

        Ok(wire
            .matches
            .into_iter()
            .map(|m| MatchSummary {
                match_id: m.match_id.to_string(),
                profile_id: m.user.id,
                name: m.user.name.unwrap_or_default(),
                role: m.user.role,
                photo_url: m.user.photo_url,
                created_at: m.created_at,
                chat_unlocked: m.chat_unlocked,
            })
            .collect())
    }
}

/// Map a non-success HTTP status onto the transport error taxonomy
pub fn classify_status(status: u16, message: String) -> ApiError {
    match status {
        // 422 is what the JWT middleware sends for malformed tokens
        401 | 403 | 422 => ApiError::Unauthorized,
        408 | 500..=599 => ApiError::Network(message),
        _ => ApiError::Rejected { status, message },
    }
}

/// Pull `error` / `message` / `detail` out of a JSON error body
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message", "detail", "msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireDiscover {
    #[serde(default)]
    profiles: Vec<WireProfile>,
    #[serde(default)]
    profile_incomplete: bool,
    #[serde(default)]
    message: Option<String>,
}

impl WireDiscover {
    fn into_response(self) -> DiscoverResponse {
        DiscoverResponse {
            profiles: self
                .profiles
                .into_iter()
                .filter_map(WireProfile::into_profile)
                .collect(),
            incomplete: self.profile_incomplete,
            message: self.message.filter(|m| !m.is_empty()),
        }
    }
}

/// Discovery rows carry both the profile row id and the owning user id; the
/// user id is what decisions are recorded against.
#[derive(Debug, Deserialize)]
struct WireProfile {
    #[serde(default)]
    id: Option<ProfileId>,
    #[serde(default)]
    user_id: Option<ProfileId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    skills: Option<Vec<String>>,
    #[serde(default)]
    looking_for: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default, alias = "isSuperSpark")]
    is_super_spark: bool,
}

impl WireProfile {
    fn into_profile(self) -> Option<Profile> {
        let Some(id) = self.user_id.or(self.id) else {
            warn!("Dropping candidate without an identifier");
            return None;
        };

        Some(Profile {
            id,
            name: self.name.unwrap_or_default(),
            age: self.age,
            title: self.title,
            company: self.company,
            location: self.location,
            tagline: self.tagline,
            bio: self.bio,
            skills: self.skills.unwrap_or_default(),
            looking_for: self.looking_for,
            photo_url: self.photo_url,
            super_spark_highlight: self.is_super_spark,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireSwipe {
    #[serde(rename = "match", default)]
    matched: bool,
    #[serde(default)]
    match_id: Option<ProfileId>,
    #[serde(default)]
    super_spark_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireCompletion {
    #[serde(default)]
    is_complete: bool,
    #[serde(default)]
    completion_percentage: f64,
    #[serde(default)]
    message: Option<String>,
}

impl WireCompletion {
    fn into_completion(self) -> Completion {
        Completion::from_percentage(self.is_complete, self.completion_percentage, self.message)
    }
}

#[derive(Debug, Deserialize)]
struct WireRoleSwitch {
    #[serde(default)]
    current_role: Option<Role>,
    #[serde(default)]
    profile: Option<WireCompletion>,
}

#[derive(Debug, Deserialize)]
struct WireSparkReset {
    super_spark_count: u32,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    next_reset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMatches {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    match_id: ProfileId,
    user: WireMatchUser,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    chat_unlocked: bool,
}

#[derive(Debug, Deserialize)]
struct WireMatchUser {
    id: ProfileId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    role: Option<Role>,
}
