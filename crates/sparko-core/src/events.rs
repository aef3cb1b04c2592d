//! Queue events broadcast to presentation and other collaborators.
//!
//! Delivery is at-most-once and in-memory only: a subscriber that falls more
//! than `capacity` events behind gets `RecvError::Lagged` and should re-read
//! the queue snapshot instead of replaying.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{ApiError, DecisionError};
use crate::types::{Outcome, ProfileId, Role};

/// How a submitted decision ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Committed(Outcome),
    Reverted(DecisionError),
}

/// Something the presentation layer may want to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    DecisionSettled {
        profile_id: ProfileId,
        settlement: Settlement,
    },
    Match {
        profile_id: ProfileId,
        match_id: Option<String>,
    },
    QueueExhausted {
        role: Role,
    },
    ProfileIncomplete {
        role: Role,
        ratio: f64,
        message: Option<String>,
    },
    Refilled {
        role: Role,
        added: usize,
    },
    /// Discovery failed; presentation should offer a retry
    DiscoveryFailed {
        role: Role,
        error: ApiError,
    },
    RoleChanged {
        role: Role,
    },
    BalanceChanged {
        balance: u32,
    },
    /// The credential was rejected; the session collaborator must re-authenticate
    SessionExpired,
}

/// Broadcast channel for queue events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit to all subscribers; returns how many received it
    pub fn emit(&self, event: QueueEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
