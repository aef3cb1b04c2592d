//! ============================================================================
//! Core Types for the Sparko Swipe Client
//! ============================================================================
//! Candidate profiles, roles, decisions and the outcomes the matching service
//! reports back. These types are serialized to JSON for the presentation layer
//! and for the wire format of the matching API.
//! ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParseRoleError;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a candidate profile (the candidate's user id).
/// The backend sends numeric ids; other deployments use strings, so both are
/// accepted and normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ProfileId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ProfileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => ProfileId(n.to_string()),
            RawId::Text(s) => ProfileId(s),
        })
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// A candidate record as shown on a card. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// Order carries no meaning
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub looking_for: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Candidate arrived via a super-spark and should be highlighted
    #[serde(default, alias = "isSuperSpark")]
    pub super_spark_highlight: bool,
}

impl Profile {
    /// Minimal profile with only an id and display name
    pub fn new(id: impl Into<ProfileId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age: None,
            title: None,
            company: None,
            location: None,
            tagline: None,
            bio: None,
            skills: Vec::new(),
            looking_for: None,
            photo_url: None,
            super_spark_highlight: false,
        }
    }

    /// Headline used by compact renderers: "Title at Company"
    pub fn headline(&self) -> Option<String> {
        match (&self.title, &self.company) {
            (Some(title), Some(company)) => Some(format!("{} at {}", title, company)),
            (Some(title), None) => Some(title.clone()),
            (None, Some(company)) => Some(company.clone()),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Persona the user is currently acting as. Each role has its own candidate
/// pool and its own completion requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Entrepreneur,
    Investor,
    Partner,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Entrepreneur, Role::Investor, Role::Partner];

    /// Wire name used by the matching API
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Entrepreneur => "entrepreneur",
            Role::Investor => "investor",
            Role::Partner => "partner",
        }
    }

    /// Get human-readable role name
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Entrepreneur => "Entrepreneur",
            Role::Investor => "Investor",
            Role::Partner => "Partner",
        }
    }

    /// Short pitch shown next to the role in selectors
    pub fn description(&self) -> &'static str {
        match self {
            Role::Entrepreneur => "Find investors",
            Role::Investor => "Find startups",
            Role::Partner => "Find co-founders",
        }
    }

    /// Role whose profiles are discovered while acting as this role
    pub fn target(&self) -> Role {
        match self {
            Role::Entrepreneur => Role::Investor,
            Role::Investor => Role::Entrepreneur,
            Role::Partner => Role::Partner,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrepreneur" | "founder" => Ok(Role::Entrepreneur),
            "investor" => Ok(Role::Investor),
            "partner" => Ok(Role::Partner),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// What the user decided about the card on top of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Skip,
    Like,
    SuperSpark,
}

impl DecisionKind {
    /// Wire name used by the decision endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Skip => "skip",
            DecisionKind::Like => "like",
            DecisionKind::SuperSpark => "super_spark",
        }
    }

    /// Whether this decision spends a super-spark
    pub fn consumes_super_spark(&self) -> bool {
        matches!(self, DecisionKind::SuperSpark)
    }

    /// Whether the decision can form a match
    pub fn is_positive(&self) -> bool {
        matches!(self, DecisionKind::Like | DecisionKind::SuperSpark)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision about one profile. Created per gesture, consumed by the
/// dispatcher, discarded after reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub profile_id: ProfileId,
    /// Client-generated token so the server can deduplicate retries
    pub request_token: Uuid,
    /// Unix timestamp when the decision was issued
    pub issued_at: i64,
}

impl Decision {
    pub fn new(kind: DecisionKind, profile_id: ProfileId) -> Self {
        Self {
            kind,
            profile_id,
            request_token: Uuid::new_v4(),
            issued_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Successful result of a decision submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Remaining super-sparks as reported by the server
    pub currency_balance: Option<u32>,
    pub match_formed: bool,
    pub match_id: Option<String>,
}

// ============================================================================
// Collaborator payloads
// ============================================================================

/// Result of one discovery fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub profiles: Vec<Profile>,
    /// The active role's profile is not complete enough to discover
    pub incomplete: bool,
    pub message: Option<String>,
}

impl DiscoverResponse {
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            profiles,
            incomplete: false,
            message: None,
        }
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self {
            profiles: Vec::new(),
            incomplete: true,
            message: Some(message.into()),
        }
    }
}

/// Profile completion verdict for a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub complete: bool,
    /// Completion ratio in [0, 1]
    pub ratio: f64,
    pub message: Option<String>,
}

impl Completion {
    pub fn complete() -> Self {
        Self {
            complete: true,
            ratio: 1.0,
            message: None,
        }
    }

    pub fn incomplete(ratio: f64, message: Option<String>) -> Self {
        Self {
            complete: false,
            ratio: clamp_ratio(ratio),
            message,
        }
    }

    /// Build from the backend's 0-100 percentage
    pub fn from_percentage(is_complete: bool, percentage: f64, message: Option<String>) -> Self {
        Self {
            complete: is_complete,
            ratio: clamp_ratio(percentage / 100.0),
            message,
        }
    }

    /// Whole-number percentage for display
    pub fn percentage(&self) -> u8 {
        (self.ratio * 100.0).round() as u8
    }
}

fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

/// Acknowledgement of a role switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSwitchAck {
    pub role: Role,
    /// Completion of the new role's profile, when the server includes it
    pub completion: Option<Completion>,
}

/// Super-spark balance after a reset request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparkReset {
    pub balance: u32,
    pub message: Option<String>,
    /// ISO-8601 timestamp of the next allowed reset
    pub next_reset: Option<String>,
}

/// A formed match as listed by the matching service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub profile_id: ProfileId,
    pub name: String,
    pub role: Option<Role>,
    pub photo_url: Option<String>,
    pub created_at: Option<String>,
    pub chat_unlocked: bool,
}

// ============================================================================
// Session
// ============================================================================

/// Session supplied by the auth collaborator and threaded into every
/// outbound call. The core never stores credentials anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Log context only; the server identifies the caller by credential
    pub user_id: Option<String>,
    pub role: Role,
    #[serde(skip_serializing)]
    pub credential: Option<String>,
}

impl SessionContext {
    pub fn new(role: Role, credential: Option<String>) -> Self {
        Self {
            user_id: None,
            role,
            credential,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Value for the Authorization header, if a credential is present
    pub fn bearer(&self) -> Option<String> {
        self.credential
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {}", token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_accepts_numbers_and_strings() {
        let numeric: ProfileId = serde_json::from_str("42").unwrap();
        let text: ProfileId = serde_json::from_str("\"abc-7\"").unwrap();
        assert_eq!(numeric.as_str(), "42");
        assert_eq!(text.as_str(), "abc-7");
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "\"42\"");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("investor".parse::<Role>().unwrap(), Role::Investor);
        assert_eq!(" Partner ".parse::<Role>().unwrap(), Role::Partner);
        assert_eq!("founder".parse::<Role>().unwrap(), Role::Entrepreneur);
        assert!("seeker".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_targets() {
        assert_eq!(Role::Entrepreneur.target(), Role::Investor);
        assert_eq!(Role::Investor.target(), Role::Entrepreneur);
        assert_eq!(Role::Partner.target(), Role::Partner);
    }

    #[test]
    fn test_decision_kind_wire_names() {
        assert_eq!(DecisionKind::SuperSpark.as_str(), "super_spark");
        assert_eq!(
            serde_json::to_string(&DecisionKind::SuperSpark).unwrap(),
            "\"super_spark\""
        );
        assert!(DecisionKind::SuperSpark.consumes_super_spark());
        assert!(!DecisionKind::Like.consumes_super_spark());
        assert!(!DecisionKind::Skip.is_positive());
    }

    #[test]
    fn test_decisions_get_unique_tokens() {
        let a = Decision::new(DecisionKind::Like, ProfileId::from("1"));
        let b = Decision::new(DecisionKind::Like, ProfileId::from("1"));
        assert_ne!(a.request_token, b.request_token);
    }

    #[test]
    fn test_completion_from_percentage() {
        let c = Completion::from_percentage(false, 60.0, None);
        assert!(!c.complete);
        assert!((c.ratio - 0.6).abs() < f64::EPSILON);
        assert_eq!(c.percentage(), 60);

        let over = Completion::from_percentage(true, 140.0, None);
        assert_eq!(over.ratio, 1.0);
    }

    #[test]
    fn test_profile_deserializes_sparse_payload() {
        let profile: Profile = serde_json::from_str(
            r#"{"id": 9, "name": "Ada", "skills": ["AI", "UX"], "isSuperSpark": true}"#,
        )
        .unwrap();
        assert_eq!(profile.id, ProfileId::from("9"));
        assert_eq!(profile.skills.len(), 2);
        assert!(profile.super_spark_highlight);
        assert!(profile.title.is_none());
    }

    #[test]
    fn test_profile_headline() {
        let mut profile = Profile::new("1", "Ada");
        assert_eq!(profile.headline(), None);
        profile.title = Some("CTO".into());
        profile.company = Some("Analytical".into());
        assert_eq!(profile.headline().as_deref(), Some("CTO at Analytical"));
    }

    #[test]
    fn test_session_bearer() {
        let session = SessionContext::new(Role::Investor, Some("tok".into()));
        assert_eq!(session.bearer().as_deref(), Some("Bearer tok"));
        let anonymous = SessionContext::new(Role::Investor, Some(String::new()));
        assert_eq!(anonymous.bearer(), None);
    }
}
