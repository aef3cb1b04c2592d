//! Single-writer queue state. Every mutation happens under the manager's lock,
//! so nothing in here awaits or touches the network.

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{CardState, QueuePhase, QueueSnapshot};
use crate::error::DecisionError;
use crate::types::{DecisionKind, Outcome, Profile, ProfileId, Role, SessionContext};

/// Who may start a discovery request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiscoveryTrigger {
    /// Queue ran low after a decision
    Auto,
    /// Start, refresh, retry, role change, profile update
    Manual,
}

/// Reservation for one discovery request, tagged with the role generation
#[derive(Debug, Clone)]
pub(crate) struct DiscoveryTicket {
    pub generation: u64,
    pub session: SessionContext,
}

/// A card removed optimistically and awaiting its decision
#[derive(Debug, Clone)]
pub(crate) struct PendingCard {
    pub profile: Profile,
    pub kind: DecisionKind,
    pub balance_epoch: u64,
}

/// What a resolved decision did to the state
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settle {
    /// Generation moved on or the card is no longer pending
    Stale,
    Committed { balance_changed: Option<u32> },
    Reverted { balance_changed: Option<u32> },
}

#[derive(Debug)]
pub(crate) struct QueueState {
    pub session: SessionContext,
    /// Bumped on every role change; older responses are discarded
    pub generation: u64,
    pub phase: QueuePhase,
    pub queue: VecDeque<Profile>,
    pub pending: HashMap<ProfileId, PendingCard>,
    pub settled: HashMap<ProfileId, CardState>,
    pub balance: u32,
    /// Bumped on every balance reset; outcomes from older epochs leave the balance alone
    pub balance_epoch: u64,
    pub discovery_in_flight: bool,
    pub message: Option<String>,
}

impl QueueState {
    pub fn new(session: SessionContext, balance: u32) -> Self {
        Self {
            session,
            generation: 0,
            phase: QueuePhase::Loading,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            settled: HashMap::new(),
            balance,
            balance_epoch: 0,
            discovery_in_flight: false,
            message: None,
        }
    }

    pub fn role(&self) -> Role {
        self.session.role
    }

    pub fn head(&self) -> Option<&Profile> {
        self.queue.front()
    }

    pub fn card_state(&self, profile_id: &ProfileId) -> Option<CardState> {
        if self.pending.contains_key(profile_id) {
            return Some(CardState::Pending);
        }
        if self.queue.iter().any(|p| &p.id == profile_id) {
            return Some(CardState::Idle);
        }
        self.settled.get(profile_id).copied()
    }

    /// Reserve the single discovery slot. Auto refills also need the Ready phase.
    pub fn begin_discovery(&mut self, trigger: DiscoveryTrigger) -> Option<DiscoveryTicket> {
        if self.discovery_in_flight {
            return None;
        }
        if trigger == DiscoveryTrigger::Auto && !self.phase.allows_auto_refill() {
            return None;
        }

        self.discovery_in_flight = true;
        if self.queue.is_empty() {
            self.phase = QueuePhase::Loading;
        }
        Some(DiscoveryTicket {
            generation: self.generation,
            session: self.session.clone(),
        })
    }

    /// Close the discovery slot for `generation`. False when the response is stale.
    pub fn finish_discovery(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.discovery_in_flight = false;
        true
    }

    pub fn needs_refill(&self, refill_threshold: usize) -> bool {
        self.queue.len() <= refill_threshold && self.phase.allows_auto_refill()
    }

    /// Append candidates not already queued, pending or decided.
    /// Returns how many were added.
    pub fn append_candidates(&mut self, candidates: Vec<Profile>) -> usize {
        let mut seen: HashSet<ProfileId> = self
            .queue
            .iter()
            .map(|p| p.id.clone())
            .chain(self.pending.keys().cloned())
            .chain(self.settled.keys().cloned())
            .collect();

        let before = self.queue.len();
        for candidate in candidates {
            if seen.insert(candidate.id.clone()) {
                self.queue.push_back(candidate);
            }
        }
        self.queue.len() - before
    }

    /// Move the head into the pending side-list
    pub fn take_head(&mut self, kind: DecisionKind) -> Option<ProfileId> {
        let profile = self.queue.pop_front()?;
        let id = profile.id.clone();
        self.pending.insert(
            id.clone(),
            PendingCard {
                profile,
                kind,
                balance_epoch: self.balance_epoch,
            },
        );
        Some(id)
    }

    /// Apply a resolved decision. The balance only moves for super-sparks from
    /// the current epoch and only ever down to the reported value, so the final
    /// balance does not depend on resolution order.
    pub fn settle(
        &mut self,
        profile_id: &ProfileId,
        generation: u64,
        result: &Result<Outcome, DecisionError>,
    ) -> Settle {
        if generation != self.generation {
            return Settle::Stale;
        }
        let Some(card) = self.pending.remove(profile_id) else {
            return Settle::Stale;
        };

        match result {
            Ok(outcome) => {
                self.settled.insert(profile_id.clone(), CardState::Committed);

                let reported = outcome
                    .currency_balance
                    .filter(|_| card.kind.consumes_super_spark())
                    .filter(|_| card.balance_epoch == self.balance_epoch);
                let balance_changed = match reported {
                    Some(reported) if reported < self.balance => {
                        self.balance = reported;
                        Some(reported)
                    }
                    _ => None,
                };
                Settle::Committed { balance_changed }
            }
            Err(error) => {
                self.settled.insert(profile_id.clone(), CardState::Reverted);

                // the server found no super sparks left; trust it over our count
                let exhausted = *error == DecisionError::InsufficientBalance
                    && card.kind.consumes_super_spark()
                    && card.balance_epoch == self.balance_epoch
                    && self.balance > 0;
                let balance_changed = exhausted.then(|| {
                    self.balance = 0;
                    0
                });
                Settle::Reverted { balance_changed }
            }
        }
    }

    pub fn apply_balance_reset(&mut self, balance: u32) {
        self.balance = balance;
        self.balance_epoch += 1;
    }

    /// Clear everything tied to the previous role
    pub fn reset_for_role(&mut self, role: Role) {
        self.session.role = role;
        self.generation += 1;
        self.phase = QueuePhase::Loading;
        self.queue.clear();
        self.pending.clear();
        self.settled.clear();
        self.discovery_in_flight = false;
        self.message = None;
    }

    pub fn snapshot(&self, visible_window: usize) -> QueueSnapshot {
        let mut pending: Vec<ProfileId> = self.pending.keys().cloned().collect();
        pending.sort();

        QueueSnapshot {
            role: self.role(),
            generation: self.generation,
            phase: self.phase.clone(),
            balance: self.balance,
            visible: self.queue.iter().take(visible_window).cloned().collect(),
            queue_len: self.queue.len(),
            pending,
            message: self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::profiles;

    fn state() -> QueueState {
        let mut state = QueueState::new(SessionContext::new(Role::Entrepreneur, None), 3);
        state.phase = QueuePhase::Ready;
        state
    }

    fn ids(state: &QueueState) -> Vec<&str> {
        state.queue.iter().map(|p| p.id.as_str()).collect()
    }

    fn spark(balance: Option<u32>) -> Result<Outcome, DecisionError> {
        Ok(Outcome {
            currency_balance: balance,
            ..Default::default()
        })
    }

    #[test]
    fn test_append_skips_known_ids() {
        let mut state = state();
        assert_eq!(state.append_candidates(profiles(&["1", "2", "3"])), 3);

        state.take_head(DecisionKind::Like);
        let id = state.take_head(DecisionKind::Skip).unwrap();
        state.settle(&id, 0, &Ok(Outcome::default()));

        // 1 pending, 2 committed, 3 queued, 3 repeated inside the batch
        let added = state.append_candidates(profiles(&["1", "2", "3", "4", "4", "5"]));
        assert_eq!(added, 2);
        assert_eq!(ids(&state), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_take_head_moves_to_pending() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2"]));

        let id = state.take_head(DecisionKind::Like).unwrap();
        assert_eq!(id.as_str(), "1");
        assert_eq!(state.card_state(&id), Some(CardState::Pending));
        assert_eq!(ids(&state), vec!["2"]);

        state.queue.clear();
        assert_eq!(state.take_head(DecisionKind::Like), None);
    }

    #[test]
    fn test_settle_order_does_not_change_balance() {
        let run = |order: [&str; 2]| {
            let mut state = state();
            state.append_candidates(profiles(&["a", "b"]));
            state.take_head(DecisionKind::SuperSpark);
            state.take_head(DecisionKind::SuperSpark);
            for id in order {
                let reported = if id == "a" { 2 } else { 1 };
                state.settle(&ProfileId::from(id), 0, &spark(Some(reported)));
            }
            (state.balance, state.card_state(&ProfileId::from("a")))
        };

        assert_eq!(run(["a", "b"]), run(["b", "a"]));
        assert_eq!(run(["a", "b"]).0, 1);
    }

    #[test]
    fn test_only_super_sparks_move_balance() {
        let mut state = state();
        state.append_candidates(profiles(&["1"]));
        let id = state.take_head(DecisionKind::Like).unwrap();

        let settled = state.settle(&id, 0, &spark(Some(0)));
        assert_eq!(
            settled,
            Settle::Committed {
                balance_changed: None
            }
        );
        assert_eq!(state.balance, 3);
    }

    #[test]
    fn test_reset_epoch_ignores_older_outcomes() {
        let mut state = state();
        state.append_candidates(profiles(&["1"]));
        let id = state.take_head(DecisionKind::SuperSpark).unwrap();

        state.apply_balance_reset(5);
        state.settle(&id, 0, &spark(Some(2)));

        assert_eq!(state.balance, 5);
        assert_eq!(state.card_state(&id), Some(CardState::Committed));
    }

    #[test]
    fn test_failed_decision_is_not_reinserted() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2"]));
        let id = state.take_head(DecisionKind::Like).unwrap();

        let settled = state.settle(&id, 0, &Err(DecisionError::Network("timeout".into())));
        assert_eq!(
            settled,
            Settle::Reverted {
                balance_changed: None
            }
        );
        assert_eq!(state.balance, 3);
        assert_eq!(state.card_state(&id), Some(CardState::Reverted));
        assert_eq!(ids(&state), vec!["2"]);
    }

    #[test]
    fn test_server_balance_rejection_empties_balance() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2"]));
        let id = state.take_head(DecisionKind::SuperSpark).unwrap();

        let settled = state.settle(&id, 0, &Err(DecisionError::InsufficientBalance));
        assert_eq!(
            settled,
            Settle::Reverted {
                balance_changed: Some(0)
            }
        );
        assert_eq!(state.balance, 0);
        assert_eq!(state.card_state(&id), Some(CardState::Reverted));
    }

    #[test]
    fn test_role_reset_makes_old_work_stale() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2"]));
        let ticket = state.begin_discovery(DiscoveryTrigger::Manual).unwrap();
        let id = state.take_head(DecisionKind::Like).unwrap();

        state.reset_for_role(Role::Investor);

        assert_eq!(state.settle(&id, ticket.generation, &spark(None)), Settle::Stale);
        assert!(!state.finish_discovery(ticket.generation));
        assert!(state.queue.is_empty());
        assert_eq!(state.card_state(&id), None);
        assert_eq!(state.role(), Role::Investor);
    }

    #[test]
    fn test_single_discovery_slot() {
        let mut state = state();
        state.append_candidates(profiles(&["1"]));

        let ticket = state.begin_discovery(DiscoveryTrigger::Auto).unwrap();
        assert!(state.begin_discovery(DiscoveryTrigger::Auto).is_none());
        assert!(state.begin_discovery(DiscoveryTrigger::Manual).is_none());

        assert!(state.finish_discovery(ticket.generation));
        state.phase = QueuePhase::Exhausted;
        assert!(state.begin_discovery(DiscoveryTrigger::Auto).is_none());
        assert!(state.begin_discovery(DiscoveryTrigger::Manual).is_some());
    }

    #[test]
    fn test_needs_refill_at_threshold() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2", "3", "4"]));
        assert!(!state.needs_refill(3));
        state.take_head(DecisionKind::Skip);
        assert!(state.needs_refill(3));

        state.phase = QueuePhase::Exhausted;
        assert!(!state.needs_refill(3));
    }

    #[test]
    fn test_snapshot_window() {
        let mut state = state();
        state.append_candidates(profiles(&["1", "2", "3", "4", "5"]));
        state.take_head(DecisionKind::Like);

        let snapshot = state.snapshot(3);
        let visible: Vec<&str> = snapshot.visible.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(visible, vec!["2", "3", "4"]);
        assert_eq!(snapshot.queue_len, 4);
        assert_eq!(snapshot.pending, vec![ProfileId::from("1")]);
    }
}
