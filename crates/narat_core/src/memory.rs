//! crates/narat_core/src/memory.rs
//!
//! An in-process implementation of every storage port. State lives behind a
//! single async mutex, so each port call is atomic with respect to the others.
//! Used by tests and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AnswerLogEntry, Question, QuestionId, Recommendation, RecommendationQuestion,
    RecommendationState, RecommendationStrategy, Session, User,
};
use crate::ports::{
    AnswerLogStore, PortError, PortResult, QuestionCatalog, RecommendationStore, SessionStore,
    UserStore,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
    questions: HashMap<QuestionId, Question>,
    logs: Vec<AnswerLogEntry>,
    recommendations: HashMap<Uuid, Recommendation>,
    recommendation_questions: HashMap<Uuid, Vec<RecommendationQuestion>>,
}

/// Storage adapter backed by in-memory tables.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the question catalog.
    pub async fn insert_question(&self, question: Question) {
        let mut tables = self.tables.lock().await;
        tables.questions.insert(question.question_id, question);
    }

    /// Writes a log entry with an explicit timestamp.
    pub async fn insert_log_at(
        &self,
        user_id: Uuid,
        question_id: QuestionId,
        correct: bool,
        created_at: DateTime<Utc>,
    ) -> AnswerLogEntry {
        let mut tables = self.tables.lock().await;
        let entry = AnswerLogEntry {
            log_id: tables.logs.len() as i64 + 1,
            user_id,
            question_id,
            correct,
            created_at,
        };
        tables.logs.push(entry.clone());
        entry
    }

    pub async fn recommendation_count(&self) -> usize {
        self.tables.lock().await.recommendations.len()
    }
}

/// Newest first; ties keep the later insert first.
fn newest_first(mut logs: Vec<AnswerLogEntry>) -> Vec<AnswerLogEntry> {
    logs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.log_id.cmp(&a.log_id))
    });
    logs
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn record_login(&self, email: &str, display_name: &str) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        if let Some(user) = tables.users.values_mut().find(|u| u.email == email) {
            user.last_login = now;
            return Ok(user.clone());
        }
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            study_level: 1,
            created_at: now,
            last_login: now,
        };
        tables.users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let tables = self.tables.lock().await;
        tables
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session> {
        let mut tables = self.tables.lock().await;
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            created_at: Utc::now(),
        };
        tables.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn resolve_session(&self, token: &str) -> PortResult<Session> {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .get(token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_session(&self, token: &str) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .sessions
            .remove(token)
            .map(|_| ())
            .ok_or(PortError::Unauthorized)
    }
}

#[async_trait]
impl AnswerLogStore for InMemoryStore {
    async fn append_log(
        &self,
        user_id: Uuid,
        question_id: QuestionId,
        correct: bool,
    ) -> PortResult<AnswerLogEntry> {
        Ok(self
            .insert_log_at(user_id, question_id, correct, Utc::now())
            .await)
    }

    async fn count_logs(&self, user_id: Uuid) -> PortResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.logs.iter().filter(|l| l.user_id == user_id).count() as i64)
    }

    async fn recent_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<AnswerLogEntry>> {
        let mut logs = self.user_history(user_id).await?;
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn user_history(&self, user_id: Uuid) -> PortResult<Vec<AnswerLogEntry>> {
        let tables = self.tables.lock().await;
        let logs = tables
            .logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(logs))
    }

    async fn question_history(&self, question_id: QuestionId) -> PortResult<Vec<AnswerLogEntry>> {
        let tables = self.tables.lock().await;
        let logs = tables
            .logs
            .iter()
            .filter(|l| l.question_id == question_id)
            .cloned()
            .collect();
        Ok(newest_first(logs))
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryStore {
    async fn get_question(&self, question_id: QuestionId) -> PortResult<Question> {
        let tables = self.tables.lock().await;
        tables
            .questions
            .get(&question_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question_id)))
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> PortResult<Vec<Question>> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.questions.get(id).cloned())
            .collect())
    }

    async fn list_questions(&self, offset: i64, limit: i64) -> PortResult<Vec<Question>> {
        let tables = self.tables.lock().await;
        let mut questions: Vec<Question> = tables.questions.values().cloned().collect();
        questions.sort_by_key(|q| q.question_id);
        Ok(questions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl RecommendationStore for InMemoryStore {
    async fn create_recommendation(
        &self,
        user_id: Uuid,
        strategy: RecommendationStrategy,
    ) -> PortResult<Recommendation> {
        let mut tables = self.tables.lock().await;
        let rec = Recommendation {
            rec_id: Uuid::new_v4(),
            user_id,
            strategy,
            state: RecommendationState::Requested,
            claim_token: None,
            claimed_at: None,
            created_at: Utc::now(),
        };
        tables.recommendations.insert(rec.rec_id, rec.clone());
        Ok(rec)
    }

    async fn get_recommendation(&self, rec_id: Uuid) -> PortResult<Recommendation> {
        let tables = self.tables.lock().await;
        tables
            .recommendations
            .get(&rec_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Recommendation {} not found", rec_id)))
    }

    async fn claim_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        let rec = tables
            .recommendations
            .get_mut(&rec_id)
            .ok_or_else(|| PortError::NotFound(format!("Recommendation {} not found", rec_id)))?;

        let claimable = match rec.state {
            RecommendationState::Requested => true,
            RecommendationState::Resolving => rec.claimed_at.map_or(true, |t| t < stale_before),
            RecommendationState::Resolved => false,
        };
        if claimable {
            rec.state = RecommendationState::Resolving;
            rec.claim_token = Some(claim_token);
            rec.claimed_at = Some(Utc::now());
        }
        Ok(claimable)
    }

    async fn release_claim(&self, rec_id: Uuid, claim_token: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(rec) = tables.recommendations.get_mut(&rec_id) {
            if rec.state == RecommendationState::Resolving && rec.claim_token == Some(claim_token) {
                rec.state = RecommendationState::Requested;
                rec.claim_token = None;
                rec.claimed_at = None;
            }
        }
        Ok(())
    }

    async fn complete_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        question_ids: &[QuestionId],
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        let rec = tables
            .recommendations
            .get_mut(&rec_id)
            .ok_or_else(|| PortError::NotFound(format!("Recommendation {} not found", rec_id)))?;

        if rec.state != RecommendationState::Resolving || rec.claim_token != Some(claim_token) {
            return Err(PortError::Conflict(format!(
                "Recommendation {} is not claimed by this resolver",
                rec_id
            )));
        }
        rec.state = RecommendationState::Resolved;
        rec.claim_token = None;

        let now = Utc::now();
        let rows = question_ids
            .iter()
            .enumerate()
            .map(|(order, &question_id)| RecommendationQuestion {
                rec_id,
                question_id,
                order: order as i32,
                created_at: now,
            })
            .collect();
        tables.recommendation_questions.insert(rec_id, rows);
        Ok(())
    }

    async fn recommendation_questions(
        &self,
        rec_id: Uuid,
    ) -> PortResult<Vec<RecommendationQuestion>> {
        let tables = self.tables.lock().await;
        let mut rows = tables
            .recommendation_questions
            .get(&rec_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|r| r.order);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let store = InMemoryStore::new();
        let rec = store
            .create_recommendation(Uuid::new_v4(), RecommendationStrategy::Initial)
            .await
            .unwrap();
        let stale_before = Utc::now() - Duration::seconds(60);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.claim_recommendation(rec.rec_id, first, stale_before).await.unwrap());
        assert!(!store.claim_recommendation(rec.rec_id, second, stale_before).await.unwrap());

        // Only the holder can release.
        store.release_claim(rec.rec_id, second).await.unwrap();
        assert!(!store.claim_recommendation(rec.rec_id, second, stale_before).await.unwrap());

        store.release_claim(rec.rec_id, first).await.unwrap();
        assert!(store.claim_recommendation(rec.rec_id, second, stale_before).await.unwrap());
    }

    #[tokio::test]
    async fn stale_claim_can_be_taken_over() {
        let store = InMemoryStore::new();
        let rec = store
            .create_recommendation(Uuid::new_v4(), RecommendationStrategy::Initial)
            .await
            .unwrap();
        let abandoned = Uuid::new_v4();
        assert!(store
            .claim_recommendation(rec.rec_id, abandoned, Utc::now())
            .await
            .unwrap());

        // A cutoff in the future makes the existing claim stale.
        let takeover = Uuid::new_v4();
        let future = Utc::now() + Duration::seconds(1);
        assert!(store.claim_recommendation(rec.rec_id, takeover, future).await.unwrap());

        let err = store
            .complete_recommendation(rec.rec_id, abandoned, &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        store.complete_recommendation(rec.rec_id, takeover, &[1]).await.unwrap();
    }

    #[tokio::test]
    async fn recent_logs_are_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_log_at(user_id, i, i % 2 == 0, base + Duration::seconds(i as i64))
                .await;
        }
        let recent = store.recent_logs(user_id, 3).await.unwrap();
        let ids: Vec<QuestionId> = recent.iter().map(|l| l.question_id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
        assert_eq!(store.count_logs(user_id).await.unwrap(), 5);
    }
}
