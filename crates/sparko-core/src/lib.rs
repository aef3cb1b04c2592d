//! ============================================================================
//! SPARKO-CORE: Swipe-to-match client engine
//! ============================================================================
//! Backend-agnostic engine behind the Sparko swipe deck:
//! - Gesture interpretation (drag threshold, buttons, card tilt)
//! - Decision dispatch with duplicate and super-spark guards
//! - Optimistic candidate queue with refill, dedup and role generations
//! - Role gate on profile completion
//! - HTTP client for the matching service
//! ============================================================================

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gate;
pub mod gesture;
pub mod queue;
pub mod types;

// Re-export main types for convenience
pub use api::{HttpMatchingClient, MatchingApi};
pub use config::SparkoConfig;
pub use dispatcher::DecisionDispatcher;
pub use error::{ApiError, DecisionError};
pub use events::{EventBus, QueueEvent, Settlement};
pub use gate::RoleGate;
pub use gesture::{CardTilt, Gesture, GestureInterpreter, GestureMode};
pub use queue::{
    CardState, DecisionReport, DiscoveryStatus, IgnoreReason, QueueManager, QueuePhase,
    QueueSnapshot,
};
pub use types::*;
