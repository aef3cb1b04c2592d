// MockMatchingApi - scripted matching service for tests
//
// Responses are scripted per role / per profile and taken at call time.
// Calls can be held open until released to force a particular resolution
// order.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::MatchingApi;
use crate::error::ApiError;
use crate::types::{
    Completion, Decision, DiscoverResponse, MatchSummary, Outcome, Profile, ProfileId, Role,
    RoleSwitchAck, SessionContext, SparkReset,
};

#[derive(Default)]
struct MockState {
    discover_responses: HashMap<Role, VecDeque<Result<DiscoverResponse, ApiError>>>,
    decide_responses: HashMap<ProfileId, Result<Outcome, ApiError>>,
    completions: HashMap<Role, Completion>,
    switch_error: Option<ApiError>,
    reset_balance: u32,
    matches: Vec<MatchSummary>,

    discover_holds: HashMap<Role, Arc<Notify>>,
    decide_holds: HashMap<ProfileId, Arc<Notify>>,

    discover_calls: Vec<Role>,
    decide_calls: Vec<Decision>,
    switch_calls: Vec<Role>,
    completion_calls: Vec<Role>,
    credentials_seen: Vec<Option<String>>,
}

pub(crate) struct MockMatchingApi {
    state: Mutex<MockState>,
}

impl MockMatchingApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                reset_balance: 3,
                ..Default::default()
            }),
        }
    }

    /// Queue a discovery batch for `role`
    pub fn with_discover(self, role: Role, profiles: Vec<Profile>) -> Self {
        self.push_discover(role, Ok(DiscoverResponse::with_profiles(profiles)));
        self
    }

    pub fn with_discover_response(
        self,
        role: Role,
        response: Result<DiscoverResponse, ApiError>,
    ) -> Self {
        self.push_discover(role, response);
        self
    }

    pub fn with_decide(self, id: &str, response: Result<Outcome, ApiError>) -> Self {
        self.state
            .lock()
            .unwrap()
            .decide_responses
            .insert(ProfileId::from(id), response);
        self
    }

    pub fn with_completion(self, role: Role, completion: Completion) -> Self {
        self.state.lock().unwrap().completions.insert(role, completion);
        self
    }

    pub fn with_switch_error(self, error: ApiError) -> Self {
        self.state.lock().unwrap().switch_error = Some(error);
        self
    }

    pub fn with_reset_balance(self, balance: u32) -> Self {
        self.state.lock().unwrap().reset_balance = balance;
        self
    }

    pub fn with_matches(self, matches: Vec<MatchSummary>) -> Self {
        self.state.lock().unwrap().matches = matches;
        self
    }

    /// Change the completion verdict, e.g. after the user edits their profile
    pub fn set_completion(&self, role: Role, completion: Completion) {
        self.state.lock().unwrap().completions.insert(role, completion);
    }

    pub fn push_discover(&self, role: Role, response: Result<DiscoverResponse, ApiError>) {
        self.state
            .lock()
            .unwrap()
            .discover_responses
            .entry(role)
            .or_default()
            .push_back(response);
    }

    /// Keep discovery calls for `role` open until `release_discovery`
    pub fn hold_discovery(&self, role: Role) {
        self.state
            .lock()
            .unwrap()
            .discover_holds
            .insert(role, Arc::new(Notify::new()));
    }

    pub fn release_discovery(&self, role: Role) {
        if let Some(hold) = self.state.lock().unwrap().discover_holds.remove(&role) {
            hold.notify_one();
        }
    }

    /// Keep decision calls for `id` open until `release_decision`
    pub fn hold_decision(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .decide_holds
            .insert(ProfileId::from(id), Arc::new(Notify::new()));
    }

    pub fn release_decision(&self, id: &str) {
        if let Some(hold) = self
            .state
            .lock()
            .unwrap()
            .decide_holds
            .remove(&ProfileId::from(id))
        {
            hold.notify_one();
        }
    }

    pub fn discover_calls(&self) -> Vec<Role> {
        self.state.lock().unwrap().discover_calls.clone()
    }

    pub fn decide_calls(&self) -> Vec<Decision> {
        self.state.lock().unwrap().decide_calls.clone()
    }

    pub fn switch_calls(&self) -> Vec<Role> {
        self.state.lock().unwrap().switch_calls.clone()
    }

    pub fn completion_calls(&self) -> Vec<Role> {
        self.state.lock().unwrap().completion_calls.clone()
    }

    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().credentials_seen.clone()
    }
}

#[async_trait]
impl MatchingApi for MockMatchingApi {
    async fn discover(
        &self,
        session: &SessionContext,
        role: Role,
    ) -> Result<DiscoverResponse, ApiError> {
        let (response, hold) = {
            let mut state = self.state.lock().unwrap();
            state.discover_calls.push(role);
            state.credentials_seen.push(session.credential.clone());
            let response = state
                .discover_responses
                .get_mut(&role)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Ok(DiscoverResponse::default()));
            (response, state.discover_holds.get(&role).cloned())
        };

        if let Some(hold) = hold {
            hold.notified().await;
        }
        response
    }

    async fn decide(
        &self,
        session: &SessionContext,
        decision: &Decision,
    ) -> Result<Outcome, ApiError> {
        let (response, hold) = {
            let mut state = self.state.lock().unwrap();
            state.decide_calls.push(decision.clone());
            state.credentials_seen.push(session.credential.clone());
            let response = state
                .decide_responses
                .get(&decision.profile_id)
                .cloned()
                .unwrap_or_else(|| Ok(Outcome::default()));
            (response, state.decide_holds.get(&decision.profile_id).cloned())
        };

        if let Some(hold) = hold {
            hold.notified().await;
        }
        response
    }

    async fn switch_role(
        &self,
        _session: &SessionContext,
        role: Role,
    ) -> Result<RoleSwitchAck, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.switch_calls.push(role);
        if let Some(error) = state.switch_error.clone() {
            return Err(error);
        }
        Ok(RoleSwitchAck {
            role,
            completion: state.completions.get(&role).cloned(),
        })
    }

    async fn check_completion(
        &self,
        _session: &SessionContext,
        role: Role,
    ) -> Result<Completion, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.completion_calls.push(role);
        Ok(state
            .completions
            .get(&role)
            .cloned()
            .unwrap_or_else(Completion::complete))
    }

    async fn reset_super_sparks(&self, _session: &SessionContext) -> Result<SparkReset, ApiError> {
        let state = self.state.lock().unwrap();
        Ok(SparkReset {
            balance: state.reset_balance,
            message: Some("Super sparks reset successfully".to_string()),
            next_reset: None,
        })
    }

    async fn list_matches(&self, _session: &SessionContext) -> Result<Vec<MatchSummary>, ApiError> {
        Ok(self.state.lock().unwrap().matches.clone())
    }
}

/// Build profiles with ids "1".."n" style from a list of ids
pub(crate) fn profiles(ids: &[&str]) -> Vec<Profile> {
    ids.iter()
        .map(|id| Profile::new(*id, format!("Candidate {}", id)))
        .collect()
}

/// Let spawned tasks run until `condition` holds
pub(crate) async fn settle_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after yielding");
}
