//! crates/narat_core/src/scorer.rs
//!
//! Wire shapes exchanged with the external recommendation scorer and the
//! translation from answer logs into them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AnswerLogEntry, QuestionId, RecommendationStrategy};
use crate::ports::{PortError, PortResult};

/// Feature record for the cold-start algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialItem {
    pub item_id: QuestionId,
    pub rating: u8,
}

/// Feature record for the warm-user algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsequentItem {
    pub user_id: Uuid,
    pub item_id: QuestionId,
    pub rating: u8,
    /// Unix seconds of the answer.
    pub timestamp: i64,
}

/// Body posted to the scorer. Both variants serialize as `{"items": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScorerRequest {
    Initial { items: Vec<InitialItem> },
    Subsequent { items: Vec<SubsequentItem> },
}

impl ScorerRequest {
    /// Builds the request shape for `strategy` from a user's log window.
    /// Log order is preserved.
    pub fn from_logs(
        strategy: RecommendationStrategy,
        user_id: Uuid,
        logs: &[AnswerLogEntry],
    ) -> Self {
        match strategy {
            RecommendationStrategy::Initial => Self::Initial {
                items: logs
                    .iter()
                    .map(|log| InitialItem {
                        item_id: log.question_id,
                        rating: log.rating(),
                    })
                    .collect(),
            },
            RecommendationStrategy::Subsequent => Self::Subsequent {
                items: logs
                    .iter()
                    .map(|log| SubsequentItem {
                        user_id,
                        item_id: log.question_id,
                        rating: log.rating(),
                        timestamp: log.created_at.timestamp(),
                    })
                    .collect(),
            },
        }
    }

    pub fn strategy(&self) -> RecommendationStrategy {
        match self {
            Self::Initial { .. } => RecommendationStrategy::Initial,
            Self::Subsequent { .. } => RecommendationStrategy::Subsequent,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Initial { items } => items.len(),
            Self::Subsequent { items } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body returned by the scorer.
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerResponse {
    pub status: String,
    #[serde(default)]
    pub recommended_items: Vec<QuestionId>,
}

impl ScorerResponse {
    pub const SUCCESS: &'static str = "success";

    /// The ranked ids, or `Upstream` if the scorer did not report success.
    pub fn into_items(self) -> PortResult<Vec<QuestionId>> {
        if self.status == Self::SUCCESS {
            Ok(self.recommended_items)
        } else {
            Err(PortError::Upstream(format!(
                "scorer reported status '{}'",
                self.status
            )))
        }
    }
}
