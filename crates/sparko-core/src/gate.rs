//! ============================================================================
//! Role Gate - Cached profile-completion checks per role
//! ============================================================================
//! Discovery is only allowed once the active role's profile is complete.
//! Verdicts are cached per role to avoid a completion round trip before every
//! refill; a profile edit or a manual refresh drops the cached entry.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::MatchingApi;
use crate::error::ApiError;
use crate::types::{Completion, Role, SessionContext};

/// Default cache duration in seconds (5 minutes)
pub const DEFAULT_COMPLETION_CACHE_SECS: i64 = 300;

/// Cached completion verdict
#[derive(Debug, Clone)]
struct CachedCompletion {
    completion: Completion,
    cached_at: i64,
}

/// Session/role gate in front of discovery
pub struct RoleGate {
    api: Arc<dyn MatchingApi>,
    cache: Arc<RwLock<HashMap<Role, CachedCompletion>>>,
    cache_duration_secs: i64,
}

impl RoleGate {
    pub fn new(api: Arc<dyn MatchingApi>) -> Self {
        Self::with_cache_duration(api, DEFAULT_COMPLETION_CACHE_SECS)
    }

    pub fn with_cache_duration(api: Arc<dyn MatchingApi>, cache_duration_secs: i64) -> Self {
        Self {
            api,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_duration_secs,
        }
    }

    /// Completion verdict for `role`, using the cache when fresh
    pub async fn evaluate(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<Completion, ApiError> {
        let now = chrono::Utc::now().timestamp();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&role) {
                if now - cached.cached_at < self.cache_duration_secs {
                    debug!(
                        "Completion cache hit for {}: {}% (age: {}s)",
                        role,
                        cached.completion.percentage(),
                        now - cached.cached_at
                    );
                    return Ok(cached.completion.clone());
                }
            }
        }

        debug!("Completion cache miss for {}, asking server", role);
        let completion = self.api.check_completion(session, role).await?;
        self.record(role, completion.clone()).await;

        info!(
            "Profile for {} is {}% complete ({})",
            role,
            completion.percentage(),
            if completion.complete { "open" } else { "blocked" }
        );

        Ok(completion)
    }

    /// Store a verdict learned elsewhere (role-switch ack, discovery)
    pub async fn record(&self, role: Role, completion: Completion) {
        let mut cache = self.cache.write().await;
        cache.insert(
            role,
            CachedCompletion {
                completion,
                cached_at: chrono::Utc::now().timestamp(),
            },
        );
    }

    /// Discovery reported the profile incomplete. Keeps a previously known
    /// partial ratio, otherwise assumes nothing is filled in.
    pub async fn mark_incomplete(&self, role: Role, message: Option<String>) -> Completion {
        let previous_ratio = {
            let cache = self.cache.read().await;
            cache
                .get(&role)
                .filter(|c| !c.completion.complete)
                .map(|c| c.completion.ratio)
        };

        let completion = Completion::incomplete(previous_ratio.unwrap_or(0.0), message);
        self.record(role, completion.clone()).await;
        completion
    }

    /// Drop the cached verdict for a role (e.g., after a profile edit)
    pub async fn invalidate(&self, role: Role) {
        let mut cache = self.cache.write().await;
        if cache.remove(&role).is_some() {
            info!("Invalidated completion cache for {}", role);
        }
    }

    /// Clear the entire cache
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        let count = cache.len();
        cache.clear();
        info!("Cleared {} cached completion entries", count);
    }

    /// Last known verdict without touching the network
    pub async fn cached(&self, role: Role) -> Option<Completion> {
        self.cache
            .read()
            .await
            .get(&role)
            .map(|c| c.completion.clone())
    }
}
