//! crates/narat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AnswerLogEntry, Question, QuestionId, Recommendation, RecommendationQuestion,
    RecommendationStrategy, Session, User, VerifiedIdentity,
};
use crate::scorer::ScorerRequest;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user on first login, otherwise bumps `last_login`.
    async fn record_login(&self, email: &str, display_name: &str) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<User>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session>;

    /// Fails with `Unauthorized` when the token is unknown.
    async fn resolve_session(&self, token: &str) -> PortResult<Session>;

    /// Fails with `Unauthorized` when the token is unknown.
    async fn delete_session(&self, token: &str) -> PortResult<()>;
}

#[async_trait]
pub trait AnswerLogStore: Send + Sync {
    async fn append_log(
        &self,
        user_id: Uuid,
        question_id: QuestionId,
        correct: bool,
    ) -> PortResult<AnswerLogEntry>;

    async fn count_logs(&self, user_id: Uuid) -> PortResult<i64>;

    /// The newest `limit` entries of a user, newest first.
    async fn recent_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<AnswerLogEntry>>;

    /// Every entry of a user, newest first.
    async fn user_history(&self, user_id: Uuid) -> PortResult<Vec<AnswerLogEntry>>;

    /// Every entry for one question across all users, newest first.
    async fn question_history(&self, question_id: QuestionId) -> PortResult<Vec<AnswerLogEntry>>;
}

#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    async fn get_question(&self, question_id: QuestionId) -> PortResult<Question>;

    /// Returns the questions that exist among `ids`; missing ids are omitted.
    async fn get_questions(&self, ids: &[QuestionId]) -> PortResult<Vec<Question>>;

    async fn list_questions(&self, offset: i64, limit: i64) -> PortResult<Vec<Question>>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn create_recommendation(
        &self,
        user_id: Uuid,
        strategy: RecommendationStrategy,
    ) -> PortResult<Recommendation>;

    async fn get_recommendation(&self, rec_id: Uuid) -> PortResult<Recommendation>;

    /// Atomically moves a `Requested` recommendation (or a `Resolving` one whose
    /// claim is older than `stale_before`) to `Resolving` under `claim_token`.
    /// Returns `false` when another resolver holds a live claim or it is resolved.
    async fn claim_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<bool>;

    /// Returns a `Resolving` recommendation held by `claim_token` to `Requested`.
    async fn release_claim(&self, rec_id: Uuid, claim_token: Uuid) -> PortResult<()>;

    /// In one transaction, stores `question_ids` ranked by position and moves the
    /// recommendation to `Resolved`. Fails with `Conflict` if `claim_token` no
    /// longer holds the claim.
    async fn complete_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        question_ids: &[QuestionId],
    ) -> PortResult<()>;

    /// Ranked entries of a recommendation, ordered by `order` ascending.
    async fn recommendation_questions(&self, rec_id: Uuid)
        -> PortResult<Vec<RecommendationQuestion>>;
}

//=========================================================================================
// External Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait RecommendationScorer: Send + Sync {
    /// Asks the external scorer for a ranked list of question ids.
    /// Any transport, status or decoding failure is `PortError::Upstream`.
    async fn recommend(&self, request: &ScorerRequest) -> PortResult<Vec<QuestionId>>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies a login token issued by the identity provider.
    /// Invalid tokens fail with `PortError::Unauthorized`.
    async fn verify_token(&self, token: &str) -> PortResult<VerifiedIdentity>;
}
