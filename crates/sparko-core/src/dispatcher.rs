//! ============================================================================
//! Decision Dispatcher - One in-flight submission per profile
//! ============================================================================
//! Submits swipe decisions to the matching service. Local guards run before
//! any network traffic:
//! - a second submission for a profile already in flight -> DuplicateSubmission
//! - a super-spark with no unreserved balance            -> InsufficientBalance
//!
//! Super-sparks in flight are reserved against the balance until the caller
//! drops the `Submission`, so two rapid super-sparks cannot overdraw a balance
//! of one. Callers that apply the outcome to shared state should drop it only
//! after the new balance is visible there.
//! ============================================================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::MatchingApi;
use crate::error::{ApiError, DecisionError};
use crate::types::{Decision, Outcome, ProfileId, SessionContext};

#[derive(Debug, Default)]
struct InFlight {
    profiles: HashSet<ProfileId>,
    super_sparks: u32,
}

type Registry = Arc<Mutex<InFlight>>;

fn lock(registry: &Registry) -> MutexGuard<'_, InFlight> {
    // the registry holds plain sets; a panic elsewhere cannot leave it torn
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the in-flight slot when the submission is dropped
struct InFlightGuard {
    registry: Registry,
    profile_id: ProfileId,
    super_spark: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.registry);
        in_flight.profiles.remove(&self.profile_id);
        if self.super_spark {
            in_flight.super_sparks = in_flight.super_sparks.saturating_sub(1);
        }
    }
}

/// A decision that passed the local guards and holds its in-flight slot
pub struct Submission {
    decision: Decision,
    session: SessionContext,
    _guard: InFlightGuard,
}

impl Submission {
    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}

/// Sends decisions to the matching service
pub struct DecisionDispatcher {
    api: Arc<dyn MatchingApi>,
    in_flight: Registry,
}

impl DecisionDispatcher {
    pub fn new(api: Arc<dyn MatchingApi>) -> Self {
        Self {
            api,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    /// Run the local guards and reserve an in-flight slot.
    /// `balance` is the last reconciled super-spark balance.
    pub fn prepare(
        &self,
        session: &SessionContext,
        decision: Decision,
        balance: u32,
    ) -> Result<Submission, DecisionError> {
        let mut in_flight = lock(&self.in_flight);

        if in_flight.profiles.contains(&decision.profile_id) {
            debug!(
                "Ignoring duplicate {} on {}: already in flight",
                decision.kind, decision.profile_id
            );
            return Err(DecisionError::DuplicateSubmission(decision.profile_id));
        }

        let super_spark = decision.kind.consumes_super_spark();
        if super_spark && balance.saturating_sub(in_flight.super_sparks) == 0 {
            warn!(
                "Super spark on {} rejected locally: balance {}, {} reserved",
                decision.profile_id, balance, in_flight.super_sparks
            );
            return Err(DecisionError::InsufficientBalance);
        }

        in_flight.profiles.insert(decision.profile_id.clone());
        if super_spark {
            in_flight.super_sparks += 1;
        }

        Ok(Submission {
            _guard: InFlightGuard {
                registry: Arc::clone(&self.in_flight),
                profile_id: decision.profile_id.clone(),
                super_spark,
            },
            decision,
            session: session.clone(),
        })
    }

    /// Send a prepared submission. The slot stays reserved until the
    /// submission is dropped.
    pub async fn dispatch(&self, submission: &Submission) -> Result<Outcome, DecisionError> {
        let decision = &submission.decision;

        match self.api.decide(&submission.session, decision).await {
            Ok(outcome) => {
                info!(
                    "Decision {} on {} recorded (match: {})",
                    decision.kind, decision.profile_id, outcome.match_formed
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    "Decision {} on {} failed: {}",
                    decision.kind, decision.profile_id, e
                );
                Err(classify_failure(decision, e))
            }
        }
    }

    /// Guard and send in one step
    pub async fn submit(
        &self,
        session: &SessionContext,
        decision: Decision,
        balance: u32,
    ) -> Result<Outcome, DecisionError> {
        let submission = self.prepare(session, decision, balance)?;
        self.dispatch(&submission).await
    }

    /// Number of decisions currently awaiting the server
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).profiles.len()
    }

    pub fn is_in_flight(&self, profile_id: &ProfileId) -> bool {
        lock(&self.in_flight).profiles.contains(profile_id)
    }

    /// Super-sparks reserved by in-flight submissions
    pub fn reserved_super_sparks(&self) -> u32 {
        lock(&self.in_flight).super_sparks
    }
}

/// Server-side balance check failed: the client's balance was stale
fn is_out_of_super_sparks(decision: &Decision, err: &ApiError) -> bool {
    match err {
        ApiError::Rejected { status: 400, message } => {
            decision.kind.consumes_super_spark()
                && message.to_lowercase().contains("no super sparks")
        }
        _ => false,
    }
}

fn classify_failure(decision: &Decision, err: ApiError) -> DecisionError {
    if is_out_of_super_sparks(decision, &err) {
        DecisionError::InsufficientBalance
    } else {
        DecisionError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockMatchingApi;
    use crate::types::{DecisionKind, Role};

    fn session() -> SessionContext {
        SessionContext::new(Role::Entrepreneur, Some("token".into()))
    }

    fn decision(kind: DecisionKind, id: &str) -> Decision {
        Decision::new(kind, ProfileId::from(id))
    }

    #[tokio::test]
    async fn test_submit_success() {
        let api = Arc::new(MockMatchingApi::new().with_decide(
            "7",
            Ok(Outcome {
                currency_balance: Some(3),
                match_formed: true,
                match_id: Some("m-1".into()),
            }),
        ));
        let dispatcher = DecisionDispatcher::new(api.clone());

        let outcome = dispatcher
            .submit(&session(), decision(DecisionKind::Like, "7"), 3)
            .await
            .unwrap();

        assert!(outcome.match_formed);
        assert_eq!(api.decide_calls().len(), 1);
        assert_eq!(api.credentials_seen(), vec![Some("token".to_string())]);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_super_spark_with_zero_balance_never_hits_network() {
        let api = Arc::new(MockMatchingApi::new());
        let dispatcher = DecisionDispatcher::new(api.clone());

        let result = dispatcher
            .submit(&session(), decision(DecisionKind::SuperSpark, "1"), 0)
            .await;

        assert_eq!(result, Err(DecisionError::InsufficientBalance));
        assert!(api.decide_calls().is_empty());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_zero_balance_does_not_block_likes() {
        let api = Arc::new(MockMatchingApi::new());
        let dispatcher = DecisionDispatcher::new(api.clone());

        let result = dispatcher
            .submit(&session(), decision(DecisionKind::Like, "1"), 0)
            .await;

        assert!(result.is_ok());
        assert_eq!(api.decide_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_while_pending_fails_fast() {
        let api = Arc::new(MockMatchingApi::new());
        let dispatcher = DecisionDispatcher::new(api.clone());

        let first = dispatcher
            .prepare(&session(), decision(DecisionKind::Like, "1"), 3)
            .unwrap();
        let second = dispatcher.prepare(&session(), decision(DecisionKind::Like, "1"), 3);

        assert!(matches!(
            second,
            Err(DecisionError::DuplicateSubmission(ref id)) if id.as_str() == "1"
        ));
        assert!(dispatcher.is_in_flight(&ProfileId::from("1")));

        dispatcher.dispatch(&first).await.unwrap();
        assert_eq!(api.decide_calls().len(), 1);
        assert!(dispatcher.is_in_flight(&ProfileId::from("1")));

        drop(first);
        assert!(!dispatcher.is_in_flight(&ProfileId::from("1")));

        // once settled the profile may be submitted again
        assert!(dispatcher
            .prepare(&session(), decision(DecisionKind::Skip, "1"), 3)
            .is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_super_sparks_are_reserved() {
        let api = Arc::new(MockMatchingApi::new());
        let dispatcher = DecisionDispatcher::new(api.clone());

        let first = dispatcher
            .prepare(&session(), decision(DecisionKind::SuperSpark, "1"), 1)
            .unwrap();
        assert_eq!(dispatcher.reserved_super_sparks(), 1);

        let second = dispatcher.prepare(&session(), decision(DecisionKind::SuperSpark, "2"), 1);
        assert_eq!(second.err(), Some(DecisionError::InsufficientBalance));

        drop(first);
        assert_eq!(dispatcher.reserved_super_sparks(), 0);
        assert!(dispatcher
            .prepare(&session(), decision(DecisionKind::SuperSpark, "2"), 1)
            .is_ok());
    }

    #[tokio::test]
    async fn test_transport_failures_are_typed() {
        let api = Arc::new(
            MockMatchingApi::new()
                .with_decide("1", Err(ApiError::Network("connection reset".into())))
                .with_decide("2", Err(ApiError::Unauthorized))
                .with_decide(
                    "3",
                    Err(ApiError::Rejected {
                        status: 400,
                        message: "Already swiped on this profile".into(),
                    }),
                ),
        );
        let dispatcher = DecisionDispatcher::new(api);

        assert_eq!(
            dispatcher
                .submit(&session(), decision(DecisionKind::Like, "1"), 3)
                .await,
            Err(DecisionError::Network("connection reset".into()))
        );
        assert_eq!(
            dispatcher
                .submit(&session(), decision(DecisionKind::Like, "2"), 3)
                .await,
            Err(DecisionError::Unauthorized)
        );
        assert_eq!(
            dispatcher
                .submit(&session(), decision(DecisionKind::Skip, "3"), 3)
                .await,
            Err(DecisionError::ServerRejected(
                "Already swiped on this profile".into()
            ))
        );
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reservation_held_until_submission_dropped() {
        let api = Arc::new(MockMatchingApi::new());
        let dispatcher = DecisionDispatcher::new(api.clone());

        let first = dispatcher
            .prepare(&session(), decision(DecisionKind::SuperSpark, "1"), 1)
            .unwrap();
        dispatcher.dispatch(&first).await.unwrap();

        // resolved but not yet applied by the caller
        assert_eq!(dispatcher.reserved_super_sparks(), 1);
        assert_eq!(
            dispatcher
                .prepare(&session(), decision(DecisionKind::SuperSpark, "2"), 1)
                .err(),
            Some(DecisionError::InsufficientBalance)
        );

        drop(first);
        assert_eq!(dispatcher.reserved_super_sparks(), 0);
    }

    #[tokio::test]
    async fn test_server_out_of_super_sparks_is_insufficient_balance() {
        let rejection = || {
            Err(ApiError::Rejected {
                status: 400,
                message: "No super sparks remaining".into(),
            })
        };
        let api = Arc::new(
            MockMatchingApi::new()
                .with_decide("1", rejection())
                .with_decide("2", rejection()),
        );
        let dispatcher = DecisionDispatcher::new(api);

        assert_eq!(
            dispatcher
                .submit(&session(), decision(DecisionKind::SuperSpark, "1"), 3)
                .await,
            Err(DecisionError::InsufficientBalance)
        );
        // same text on a like is just a business-rule rejection
        assert_eq!(
            dispatcher
                .submit(&session(), decision(DecisionKind::Like, "2"), 3)
                .await,
            Err(DecisionError::ServerRejected(
                "No super sparks remaining".into()
            ))
        );
    }
}
