//! ============================================================================
//! Queue Types - Card lifecycle, queue phases and decision reports
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, DecisionError};
use crate::types::{Completion, Outcome, Profile, ProfileId, Role};

/// Lifecycle of one card: Idle -> Pending -> Committed | Reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    /// In the queue and interactable when on top
    Idle,
    /// Removed optimistically, awaiting the dispatcher
    Pending,
    Committed,
    /// Failed; the card stays removed
    Reverted,
}

/// Queue-level state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum QueuePhase {
    Loading,
    Ready,
    /// Discovery returned nothing new; left only via refresh or role change
    Exhausted,
    /// Gate closed for the active role
    ProfileIncomplete { ratio: f64, message: Option<String> },
    /// Discovery failed with an empty queue; waiting for a manual retry
    Failed { message: String },
}

impl QueuePhase {
    pub fn accepts_decisions(&self) -> bool {
        !matches!(self, QueuePhase::ProfileIncomplete { .. })
    }

    pub fn allows_auto_refill(&self) -> bool {
        matches!(self, QueuePhase::Ready)
    }
}

/// Why a decision request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Queue is empty
    NoCard,
    /// Target is not the card on top (already swiped or not loaded)
    NotOnTop,
    /// Decisions are disabled until the profile gate opens
    Blocked,
}

/// Result of a decision request. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum DecisionReport {
    /// Drag ended below the threshold
    Cancelled,
    Ignored(IgnoreReason),
    /// Refused locally before any network call; queue unchanged
    Rejected(DecisionError),
    Committed(Outcome),
    /// Server or transport failure; card stays removed
    Reverted(DecisionError),
    /// Resolved after a role change and was discarded
    Stale,
}

impl DecisionReport {
    /// Whether the card left the queue
    pub fn removed_card(&self) -> bool {
        matches!(
            self,
            DecisionReport::Committed(_) | DecisionReport::Reverted(_) | DecisionReport::Stale
        )
    }
}

/// Result of a discovery attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// New candidates appended after dedup
    Appended(usize),
    Exhausted,
    Incomplete(Completion),
    Failed(ApiError),
    /// The role changed while the request was in flight
    Stale,
    /// Another discovery is in flight or the phase forbids refills
    Skipped,
}

/// Point-in-time view for renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub role: Role,
    pub generation: u64,
    pub phase: QueuePhase,
    pub balance: u32,
    /// Top of the queue, head first
    pub visible: Vec<Profile>,
    pub queue_len: usize,
    pub pending: Vec<ProfileId>,
    /// Last message from discovery, if any
    pub message: Option<String>,
}
