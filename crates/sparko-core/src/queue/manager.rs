//! ============================================================================
//! Queue Manager - Optimistic swipe queue for the active role
//! ============================================================================
//! Owns the candidate queue and everything that mutates it:
//! - decisions remove the head immediately, then settle against the server
//! - one discovery request at a time, auto-triggered when the queue runs low
//! - role changes bump a generation counter; older responses are dropped
//! - the role gate blocks discovery while the profile is incomplete
//!
//! All state lives behind one lock and no network call is made while it is
//! held, so responses may resolve in any order.
//! ============================================================================

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use super::state::{DiscoveryTicket, DiscoveryTrigger, QueueState, Settle};
use super::types::{CardState, DecisionReport, DiscoveryStatus, IgnoreReason, QueuePhase, QueueSnapshot};
use crate::api::MatchingApi;
use crate::config::SparkoConfig;
use crate::dispatcher::{DecisionDispatcher, Submission};
use crate::error::{ApiError, DecisionError};
use crate::events::{EventBus, QueueEvent, Settlement};
use crate::gate::RoleGate;
use crate::gesture::{Gesture, GestureInterpreter, GestureMode};
use crate::types::{
    Completion, Decision, DecisionKind, MatchSummary, Outcome, Profile, ProfileId, Role,
    SessionContext, SparkReset,
};

struct Shared {
    api: Arc<dyn MatchingApi>,
    dispatcher: DecisionDispatcher,
    gate: RoleGate,
    interpreter: GestureInterpreter,
    config: SparkoConfig,
    state: Mutex<QueueState>,
    events: EventBus,
}

/// Handle to the swipe queue; clones share the same queue
#[derive(Clone)]
pub struct QueueManager {
    shared: Arc<Shared>,
}

impl QueueManager {
    pub fn new(api: Arc<dyn MatchingApi>, session: SessionContext, config: SparkoConfig) -> Self {
        info!(
            "Queue manager for role {} (refill at {}, {} super sparks)",
            session.role, config.refill_threshold, config.initial_super_sparks
        );

        let state = QueueState::new(session, config.initial_super_sparks);
        Self {
            shared: Arc::new(Shared {
                dispatcher: DecisionDispatcher::new(Arc::clone(&api)),
                gate: RoleGate::with_cache_duration(Arc::clone(&api), config.completion_cache_secs),
                interpreter: GestureInterpreter::new(config.swipe_threshold),
                events: EventBus::with_capacity(config.event_capacity),
                state: Mutex::new(state),
                config,
                api,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SparkoConfig {
        &self.shared.config
    }

    pub fn interpreter(&self) -> &GestureInterpreter {
        &self.shared.interpreter
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Initial load for the active role
    pub async fn start(&self) -> DiscoveryStatus {
        self.discover(DiscoveryTrigger::Manual).await
    }

    /// Manual refresh or retry. Re-checks the gate and leaves Exhausted/Failed.
    pub async fn refresh(&self) -> DiscoveryStatus {
        let role = self.role().await;
        self.shared.gate.invalidate(role).await;
        self.discover(DiscoveryTrigger::Manual).await
    }

    /// Start a background refill if none is in flight and the queue is Ready.
    /// Returns whether a request was started.
    pub async fn trigger_refill(&self) -> bool {
        let ticket = {
            let mut state = self.shared.state.lock().await;
            state.begin_discovery(DiscoveryTrigger::Auto)
        };
        match ticket {
            Some(ticket) => {
                self.spawn_discovery(ticket);
                true
            }
            None => false,
        }
    }

    fn spawn_discovery(&self, ticket: DiscoveryTicket) {
        debug!(
            "Spawning refill for {} (generation {})",
            ticket.session.role, ticket.generation
        );
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_discovery(ticket).await;
        });
    }

    async fn discover(&self, trigger: DiscoveryTrigger) -> DiscoveryStatus {
        let ticket = {
            let mut state = self.shared.state.lock().await;
            state.begin_discovery(trigger)
        };
        match ticket {
            Some(ticket) => self.run_discovery(ticket).await,
            None => {
                debug!("Discovery already in flight, skipping");
                DiscoveryStatus::Skipped
            }
        }
    }

    async fn run_discovery(&self, ticket: DiscoveryTicket) -> DiscoveryStatus {
        let role = ticket.session.role;

        let completion = match self.shared.gate.evaluate(&ticket.session, role).await {
            Ok(completion) => completion,
            Err(e) => return self.discovery_failed(ticket.generation, role, e).await,
        };
        if !completion.complete {
            return self.gate_closed(ticket.generation, role, completion).await;
        }

        let response = match self.shared.api.discover(&ticket.session, role).await {
            Ok(response) => response,
            Err(e) => return self.discovery_failed(ticket.generation, role, e).await,
        };

        if response.incomplete {
            let completion = self
                .shared
                .gate
                .mark_incomplete(role, response.message.clone())
                .await;
            return self.gate_closed(ticket.generation, role, completion).await;
        }

        let received = response.profiles.len();
        let mut state = self.shared.state.lock().await;
        if !state.finish_discovery(ticket.generation) {
            info!("Dropping stale discovery batch for {}", role);
            return DiscoveryStatus::Stale;
        }

        state.message = response.message;
        let added = state.append_candidates(response.profiles);
        if added == 0 {
            info!(
                "No new candidates for {} ({} received), queue exhausted",
                role, received
            );
            state.phase = QueuePhase::Exhausted;
            self.shared.events.emit(QueueEvent::QueueExhausted { role });
            return DiscoveryStatus::Exhausted;
        }

        info!(
            "Appended {} of {} candidates for {} (queue: {})",
            added,
            received,
            role,
            state.queue.len()
        );
        state.phase = QueuePhase::Ready;
        self.shared.events.emit(QueueEvent::Refilled { role, added });
        DiscoveryStatus::Appended(added)
    }

    async fn gate_closed(&self, generation: u64, role: Role, completion: Completion) -> DiscoveryStatus {
        let mut state = self.shared.state.lock().await;
        if !state.finish_discovery(generation) {
            return DiscoveryStatus::Stale;
        }

        warn!(
            "Profile for {} is incomplete ({}%), discovery blocked",
            role,
            completion.percentage()
        );
        state.queue.clear();
        state.phase = QueuePhase::ProfileIncomplete {
            ratio: completion.ratio,
            message: completion.message.clone(),
        };
        self.shared.events.emit(QueueEvent::ProfileIncomplete {
            role,
            ratio: completion.ratio,
            message: completion.message.clone(),
        });
        DiscoveryStatus::Incomplete(completion)
    }

    async fn discovery_failed(&self, generation: u64, role: Role, error: ApiError) -> DiscoveryStatus {
        let mut state = self.shared.state.lock().await;
        if !state.finish_discovery(generation) {
            return DiscoveryStatus::Stale;
        }

        warn!("Discovery for {} failed: {}", role, error);
        if state.queue.is_empty() {
            state.phase = QueuePhase::Failed {
                message: error.user_message(),
            };
        }
        self.shared.events.emit(QueueEvent::DiscoveryFailed {
            role,
            error: error.clone(),
        });
        if error == ApiError::Unauthorized {
            self.shared.events.emit(QueueEvent::SessionExpired);
        }
        DiscoveryStatus::Failed(error)
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    /// Interpret a gesture on `target` and submit the resulting decision
    pub async fn handle_gesture(
        &self,
        target: Option<&ProfileId>,
        displacement: f64,
        mode: GestureMode,
    ) -> DecisionReport {
        match self.shared.interpreter.interpret(displacement, mode) {
            Gesture::Cancel => {
                debug!("Gesture cancelled at displacement {}", displacement);
                DecisionReport::Cancelled
            }
            Gesture::Decision(kind) => self.request_decision(target, kind).await,
        }
    }

    /// Decide on the card on top. `target` is the card the input was aimed
    /// at; `None` means whatever is on top.
    ///
    /// Once the card is removed the submission runs on its own task, so a
    /// caller that stops waiting does not leave the card pending.
    pub async fn request_decision(
        &self,
        target: Option<&ProfileId>,
        kind: DecisionKind,
    ) -> DecisionReport {
        let (submission, generation) = {
            let mut state = self.shared.state.lock().await;

            if !state.phase.accepts_decisions() {
                debug!("Decision {} ignored: profile incomplete", kind);
                return DecisionReport::Ignored(IgnoreReason::Blocked);
            }

            if let Some(target) = target {
                if state.pending.contains_key(target) {
                    return DecisionReport::Rejected(DecisionError::DuplicateSubmission(
                        target.clone(),
                    ));
                }
            }

            let profile_id = match (state.head(), target) {
                (None, _) => return DecisionReport::Ignored(IgnoreReason::NoCard),
                (Some(head), Some(target)) if &head.id != target => {
                    debug!("Decision on {} ignored: {} is on top", target, head.id);
                    return DecisionReport::Ignored(IgnoreReason::NotOnTop);
                }
                (Some(head), _) => head.id.clone(),
            };

            let decision = Decision::new(kind, profile_id);
            let submission = match self
                .shared
                .dispatcher
                .prepare(&state.session, decision, state.balance)
            {
                Ok(submission) => submission,
                Err(e) => return DecisionReport::Rejected(e),
            };

            state.take_head(kind);
            (submission, state.generation)
        };

        let profile_id = submission.decision().profile_id.clone();
        debug!("Removed {} optimistically ({})", profile_id, kind);

        let manager = self.clone();
        let settlement = tokio::spawn(async move {
            let result = manager.shared.dispatcher.dispatch(&submission).await;
            manager.reconcile(submission, generation, result).await
        });

        match settlement.await {
            Ok(report) => report,
            Err(e) => {
                error!("Decision task for {} failed: {}", profile_id, e);
                DecisionReport::Reverted(DecisionError::Network(format!(
                    "decision task failed: {}",
                    e
                )))
            }
        }
    }

    /// Apply a resolved decision. The submission keeps its super-spark
    /// reservation until the new balance is in the state.
    async fn reconcile(
        &self,
        submission: Submission,
        generation: u64,
        result: Result<Outcome, DecisionError>,
    ) -> DecisionReport {
        let profile_id = submission.decision().profile_id.clone();
        let refill = {
            let mut state = self.shared.state.lock().await;
            let name = state
                .pending
                .get(&profile_id)
                .map(|card| card.profile.name.clone());

            match state.settle(&profile_id, generation, &result) {
                Settle::Stale => {
                    info!("Ignoring stale decision on {}", profile_id);
                    drop(submission);
                    return DecisionReport::Stale;
                }
                Settle::Committed { balance_changed } => {
                    if let Ok(outcome) = &result {
                        self.emit_committed(&profile_id, outcome, name.as_deref());
                    }
                    if let Some(balance) = balance_changed {
                        info!("Super spark balance now {}", balance);
                        self.shared.events.emit(QueueEvent::BalanceChanged { balance });
                    }
                }
                Settle::Reverted { balance_changed } => {
                    if let Err(e) = &result {
                        self.emit_reverted(&profile_id, e);
                    }
                    if let Some(balance) = balance_changed {
                        warn!("Server reports no super sparks left");
                        self.shared.events.emit(QueueEvent::BalanceChanged { balance });
                    }
                }
            }
            drop(submission);

            if state.needs_refill(self.shared.config.refill_threshold) {
                state.begin_discovery(DiscoveryTrigger::Auto)
            } else {
                None
            }
        };

        if let Some(ticket) = refill {
            self.spawn_discovery(ticket);
        }

        match result {
            Ok(outcome) => DecisionReport::Committed(outcome),
            Err(e) => DecisionReport::Reverted(e),
        }
    }

    fn emit_committed(&self, profile_id: &ProfileId, outcome: &Outcome, name: Option<&str>) {
        self.shared.events.emit(QueueEvent::DecisionSettled {
            profile_id: profile_id.clone(),
            settlement: Settlement::Committed(outcome.clone()),
        });
        if outcome.match_formed {
            info!(
                "Match with {} ({})",
                name.unwrap_or(profile_id.as_str()),
                outcome.match_id.as_deref().unwrap_or("no id")
            );
            self.shared.events.emit(QueueEvent::Match {
                profile_id: profile_id.clone(),
                match_id: outcome.match_id.clone(),
            });
        }
    }

    fn emit_reverted(&self, profile_id: &ProfileId, error: &DecisionError) {
        if error.is_silent() {
            debug!("Decision on {} reverted: {}", profile_id, error);
        } else {
            warn!("Decision on {} reverted: {}", profile_id, error);
        }
        self.shared.events.emit(QueueEvent::DecisionSettled {
            profile_id: profile_id.clone(),
            settlement: Settlement::Reverted(error.clone()),
        });
        if *error == DecisionError::Unauthorized {
            self.shared.events.emit(QueueEvent::SessionExpired);
        }
    }

    // ========================================================================
    // Session and role
    // ========================================================================

    /// Switch the active role. The server is told first; on failure nothing
    /// changes locally. On success the queue is cleared and reloaded.
    pub async fn switch_role(&self, role: Role) -> Result<DiscoveryStatus, ApiError> {
        let session = self.session().await;
        if session.role == role {
            debug!("Already acting as {}, nothing to switch", role);
            return Ok(DiscoveryStatus::Skipped);
        }

        let ack = match self.shared.api.switch_role(&session, role).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!("Role switch to {} failed: {}", role, e);
                if e == ApiError::Unauthorized {
                    self.shared.events.emit(QueueEvent::SessionExpired);
                }
                return Err(e);
            }
        };
        if let Some(completion) = ack.completion {
            self.shared.gate.record(role, completion).await;
        }

        {
            let mut state = self.shared.state.lock().await;
            state.reset_for_role(role);
            info!(
                "Switched role {} -> {} (generation {})",
                session.role, role, state.generation
            );
        }
        self.shared.events.emit(QueueEvent::RoleChanged { role });

        Ok(self.discover(DiscoveryTrigger::Manual).await)
    }

    /// The user edited their profile; re-evaluate the gate and reload if it was closed
    pub async fn profile_updated(&self) -> DiscoveryStatus {
        let (role, blocked) = {
            let state = self.shared.state.lock().await;
            (
                state.role(),
                matches!(state.phase, QueuePhase::ProfileIncomplete { .. }),
            )
        };

        self.shared.gate.invalidate(role).await;
        if blocked {
            self.discover(DiscoveryTrigger::Manual).await
        } else {
            DiscoveryStatus::Skipped
        }
    }

    /// Replace the credential, e.g. after re-authentication. Completion
    /// verdicts cached under the old credential are dropped.
    pub async fn set_credential(&self, credential: Option<String>) {
        {
            let mut state = self.shared.state.lock().await;
            state.session.credential = credential;
        }
        self.shared.gate.clear_cache().await;
    }

    // ========================================================================
    // Super sparks
    // ========================================================================

    /// Take an externally reported balance as authoritative
    pub async fn apply_balance_reset(&self, balance: u32) {
        {
            let mut state = self.shared.state.lock().await;
            state.apply_balance_reset(balance);
        }
        info!("Super spark balance reset to {}", balance);
        self.shared.events.emit(QueueEvent::BalanceChanged { balance });
    }

    /// Ask the server to reset the super-spark balance and adopt the result
    pub async fn reset_super_sparks(&self) -> Result<SparkReset, ApiError> {
        let session = self.session().await;
        let reset = self.shared.api.reset_super_sparks(&session).await?;
        self.apply_balance_reset(reset.balance).await;
        Ok(reset)
    }

    pub async fn list_matches(&self) -> Result<Vec<MatchSummary>, ApiError> {
        let session = self.session().await;
        self.shared.api.list_matches(&session).await
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.shared
            .state
            .lock()
            .await
            .snapshot(self.shared.config.visible_window)
    }

    /// Cards to render, head first
    pub async fn visible(&self) -> Vec<Profile> {
        let state = self.shared.state.lock().await;
        state
            .queue
            .iter()
            .take(self.shared.config.visible_window)
            .cloned()
            .collect()
    }

    pub async fn card_state(&self, profile_id: &ProfileId) -> Option<CardState> {
        self.shared.state.lock().await.card_state(profile_id)
    }

    pub async fn balance(&self) -> u32 {
        self.shared.state.lock().await.balance
    }

    pub async fn phase(&self) -> QueuePhase {
        self.shared.state.lock().await.phase.clone()
    }

    pub async fn role(&self) -> Role {
        self.shared.state.lock().await.role()
    }

    pub async fn session(&self) -> SessionContext {
        self.shared.state.lock().await.session.clone()
    }
}
