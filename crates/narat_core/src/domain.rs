//! crates/narat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a question in the catalog.
pub type QuestionId = i32;

/// A user below this many answer logs gets the cold-start strategy.
pub const STRATEGY_LOG_THRESHOLD: i64 = 30;

/// Number of most recent answer logs fed to the scorer.
pub const FEATURE_WINDOW: i64 = 30;

/// A registered learner. Created on first verified login.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub study_level: i32,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// A login session. Possession of the token authorizes actions as `user_id`.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A quiz question from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub question_id: QuestionId,
    pub question: String,
    pub correct_ans: String,
    pub wrong_ans: String,
    pub explanation: String,
}

/// One answered question. Immutable once written.
#[derive(Debug, Clone)]
pub struct AnswerLogEntry {
    pub log_id: i64,
    pub user_id: Uuid,
    pub question_id: QuestionId,
    pub correct: bool,
    pub created_at: DateTime<Utc>,
}

impl AnswerLogEntry {
    /// Inverted correctness signal consumed by the scorer: 0 correct, 1 incorrect.
    pub fn rating(&self) -> u8 {
        if self.correct {
            0
        } else {
            1
        }
    }
}

/// Which scorer algorithm a recommendation is computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecommendationStrategy {
    /// Cold start: ratings only.
    Initial,
    /// Warm user: time-stamped event history.
    Subsequent,
}

impl RecommendationStrategy {
    /// Picks the strategy from the number of answer logs a user has.
    pub fn for_log_count(count: i64) -> Self {
        if count < STRATEGY_LOG_THRESHOLD {
            Self::Initial
        } else {
            Self::Subsequent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Subsequent => "subsequent",
        }
    }
}

impl fmt::Display for RecommendationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "subsequent" => Ok(Self::Subsequent),
            other => Err(format!("unknown recommendation strategy '{}'", other)),
        }
    }
}

/// Lifecycle of a recommendation.
///
/// `Requested` -> `Resolving` -> `Resolved`. A failed scorer call moves
/// `Resolving` back to `Requested`; `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationState {
    Requested,
    Resolving,
    Resolved,
}

impl RecommendationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for RecommendationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "resolving" => Ok(Self::Resolving),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown recommendation state '{}'", other)),
        }
    }
}

/// A request for a personalized list of questions.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub rec_id: Uuid,
    pub user_id: Uuid,
    pub strategy: RecommendationStrategy,
    pub state: RecommendationState,
    /// Set while `Resolving`; identifies the resolver holding the claim.
    pub claim_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One ranked entry of a resolved recommendation.
#[derive(Debug, Clone)]
pub struct RecommendationQuestion {
    pub rec_id: Uuid,
    pub question_id: QuestionId,
    /// Zero-based rank as returned by the scorer.
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

/// A recommended question joined with its catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendedQuestion {
    pub question_id: QuestionId,
    pub question: String,
    pub answer: String,
    pub wrong_answer: String,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

/// Claims returned by the identity provider after verifying a login token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_switches_at_threshold() {
        for count in 0..STRATEGY_LOG_THRESHOLD {
            assert_eq!(
                RecommendationStrategy::for_log_count(count),
                RecommendationStrategy::Initial
            );
        }
        for count in [STRATEGY_LOG_THRESHOLD, STRATEGY_LOG_THRESHOLD + 1, 10_000] {
            assert_eq!(
                RecommendationStrategy::for_log_count(count),
                RecommendationStrategy::Subsequent
            );
        }
    }

    #[test]
    fn state_names_parse_back() {
        for state in [
            RecommendationState::Requested,
            RecommendationState::Resolving,
            RecommendationState::Resolved,
        ] {
            assert_eq!(state.as_str().parse::<RecommendationState>(), Ok(state));
        }
        assert!("completed".parse::<RecommendationState>().is_err());
    }

    #[test]
    fn rating_inverts_correctness() {
        let mut entry = AnswerLogEntry {
            log_id: 1,
            user_id: Uuid::new_v4(),
            question_id: 4,
            correct: true,
            created_at: Utc::now(),
        };
        assert_eq!(entry.rating(), 0);
        entry.correct = false;
        assert_eq!(entry.rating(), 1);
    }
}
