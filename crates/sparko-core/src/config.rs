//! ============================================================================
//! Client Configuration
//! ============================================================================
//! Tunables for the swipe engine and the matching API client. Defaults match
//! the production card stack; every field can be overridden from SPARKO_*
//! environment variables.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Default matching API base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Horizontal drag (logical units) needed to commit a swipe
pub const DEFAULT_SWIPE_THRESHOLD: f64 = 100.0;

/// Queue length at or below which a refill is requested
pub const DEFAULT_REFILL_THRESHOLD: usize = 3;

/// Number of cards stacked on screen
pub const DEFAULT_VISIBLE_WINDOW: usize = 3;

/// Super-sparks granted per weekly reset
pub const DEFAULT_SUPER_SPARKS: u32 = 3;

/// Configuration for the swipe client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkoConfig {
    /// Base URL of the matching API, without trailing slash
    pub api_base_url: String,
    /// Transport timeout per request; expiry surfaces as a network error
    pub request_timeout_secs: u64,
    pub swipe_threshold: f64,
    pub refill_threshold: usize,
    pub visible_window: usize,
    /// Balance assumed until the backend reports one
    pub initial_super_sparks: u32,
    /// How long a completion verdict stays cached per role
    pub completion_cache_secs: i64,
    /// Buffered queue events before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for SparkoConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 15,
            swipe_threshold: DEFAULT_SWIPE_THRESHOLD,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
            visible_window: DEFAULT_VISIBLE_WINDOW,
            initial_super_sparks: DEFAULT_SUPER_SPARKS,
            completion_cache_secs: 300,
            event_capacity: 256,
        }
    }
}

impl SparkoConfig {
    /// Defaults overlaid with SPARKO_* environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup (env, .env map, tests)
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SPARKO_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
        override_parsed(&lookup, "SPARKO_TIMEOUT_SECS", &mut self.request_timeout_secs);
        override_parsed(&lookup, "SPARKO_SWIPE_THRESHOLD", &mut self.swipe_threshold);
        override_parsed(&lookup, "SPARKO_REFILL_THRESHOLD", &mut self.refill_threshold);
        override_parsed(&lookup, "SPARKO_VISIBLE_WINDOW", &mut self.visible_window);
        override_parsed(&lookup, "SPARKO_SUPER_SPARKS", &mut self.initial_super_sparks);
        override_parsed(
            &lookup,
            "SPARKO_COMPLETION_CACHE_SECS",
            &mut self.completion_cache_secs,
        );
        self
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}
