//! ============================================================================
//! Error Types - Transport and decision failures
//! ============================================================================
//! Failures travel as values: the queue manager turns every dispatcher error
//! into a report or an event, never into a panic or an early return.
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::types::ProfileId;

/// Failure talking to the matching service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: session credential rejected")]
    Unauthorized,

    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Message suitable for a retry affordance
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) | ApiError::InvalidResponse(_) => {
                "Unable to reach the server. Try again.".to_string()
            }
            ApiError::Unauthorized => "Your session expired. Please sign in again.".to_string(),
            ApiError::Rejected { message, .. } => message.clone(),
        }
    }
}

/// Failure of a single swipe decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum DecisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rejected by server: {0}")]
    ServerRejected(String),

    #[error("No super sparks remaining")]
    InsufficientBalance,

    #[error("Decision already in flight for profile {0}")]
    DuplicateSubmission(ProfileId),
}

impl DecisionError {
    /// Client-side guard failures. InsufficientBalance may also come back
    /// from the server when the local balance was stale.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DecisionError::InsufficientBalance | DecisionError::DuplicateSubmission(_)
        )
    }

    /// Failures the user should not be bothered with
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            DecisionError::ServerRejected(_) | DecisionError::DuplicateSubmission(_)
        )
    }
}

impl From<ApiError> for DecisionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(msg) | ApiError::InvalidResponse(msg) => DecisionError::Network(msg),
            ApiError::Unauthorized => DecisionError::Unauthorized,
            ApiError::Rejected { message, .. } => DecisionError::ServerRejected(message),
        }
    }
}

/// Unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role '{0}'. Valid values: entrepreneur, investor, partner")]
pub struct ParseRoleError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_maps_to_decision_taxonomy() {
        assert_eq!(
            DecisionError::from(ApiError::Network("timeout".into())),
            DecisionError::Network("timeout".into())
        );
        assert_eq!(
            DecisionError::from(ApiError::InvalidResponse("bad json".into())),
            DecisionError::Network("bad json".into())
        );
        assert_eq!(
            DecisionError::from(ApiError::Unauthorized),
            DecisionError::Unauthorized
        );
        assert_eq!(
            DecisionError::from(ApiError::Rejected {
                status: 400,
                message: "Already swiped on this profile".into()
            }),
            DecisionError::ServerRejected("Already swiped on this profile".into())
        );
    }

    #[test]
    fn test_local_and_silent_classification() {
        assert!(DecisionError::InsufficientBalance.is_local());
        assert!(DecisionError::DuplicateSubmission("1".into()).is_local());
        assert!(!DecisionError::Network("x".into()).is_local());

        assert!(DecisionError::ServerRejected("dup".into()).is_silent());
        assert!(!DecisionError::InsufficientBalance.is_silent());
    }
}
