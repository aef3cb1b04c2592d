//! ============================================================================
//! Matching API - Remote collaborators consumed by the swipe engine
//! ============================================================================
//! The engine only talks to the backend through `MatchingApi`, so the queue
//! manager can be driven by the HTTP client in production and by scripted
//! mocks in tests.
//!
//! ## Endpoints
//! - `GET  /matching/discover`            candidate batch for a role
//! - `POST /matching/swipe`               record a decision
//! - `POST /profile/switch-role`          change the active role
//! - `GET  /profile/check-completion/:r`  completion gate for a role
//! - `POST /matching/super-spark/reset`   weekly super-spark reset
//! - `GET  /matching/matches`             formed matches
//! ============================================================================

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{classify_status, HttpMatchingClient};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{
    Completion, Decision, DiscoverResponse, MatchSummary, Outcome, Role, RoleSwitchAck,
    SessionContext, SparkReset,
};

/// Remote matching service
#[async_trait]
pub trait MatchingApi: Send + Sync {
    /// Fetch a batch of candidates for `role`
    async fn discover(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<DiscoverResponse, ApiError>;

    /// Submit one decision; exactly one record per successful call
    async fn decide(
        &self,
        session: &SessionContext,
        decision: &Decision,
    ) -> Result<Outcome, ApiError>;

    /// Make `role` the active role server-side
    async fn switch_role(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<RoleSwitchAck, ApiError>;

    /// Completion verdict for the profile backing `role`
    async fn check_completion(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<Completion, ApiError>;

    /// Ask the backend to reset the weekly super-spark allowance
    async fn reset_super_sparks(&self, session: &SessionContext) -> Result<SparkReset, ApiError>;

    /// Matches formed in the active role
    async fn list_matches(&self, session: &SessionContext) -> Result<Vec<MatchSummary>, ApiError>;
}
