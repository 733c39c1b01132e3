//! crates/narat_core/src/recommendation.rs
//!
//! The recommendation lifecycle. `begin` picks a strategy and records a
//! `Requested` recommendation; `resolve` calls the external scorer at most
//! once per recommendation and serves the stored ordering afterwards.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    QuestionId, Recommendation, RecommendationState, RecommendationStrategy, RecommendedQuestion,
    FEATURE_WINDOW,
};
use crate::ports::{
    AnswerLogStore, PortError, QuestionCatalog, RecommendationScorer, RecommendationStore,
    SessionStore,
};
use crate::scorer::ScorerRequest;

/// Default age after which a `Resolving` claim is treated as abandoned.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 60;

/// Outcomes of the recommendation lifecycle that callers must distinguish.
#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    /// Another resolver holds the claim. Safe to retry later.
    #[error("Recommendation {0} is being resolved")]
    InProgress(Uuid),
    /// Scorer transport failure, timeout or non-success answer. Safe to retry.
    #[error("Scorer failed: {0}")]
    Upstream(String),
    /// A stored question id has no catalog entry.
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<PortError> for RecommendationError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => Self::NotFound(what),
            PortError::Unauthorized => Self::Unauthorized,
            PortError::Upstream(why) => Self::Upstream(why),
            PortError::Conflict(why) | PortError::Unexpected(why) => Self::Storage(why),
        }
    }
}

/// Drives recommendations from `Requested` to `Resolved`.
#[derive(Clone)]
pub struct RecommendationService {
    sessions: Arc<dyn SessionStore>,
    logs: Arc<dyn AnswerLogStore>,
    questions: Arc<dyn QuestionCatalog>,
    recommendations: Arc<dyn RecommendationStore>,
    scorer: Arc<dyn RecommendationScorer>,
    claim_lease: Duration,
}

impl RecommendationService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        logs: Arc<dyn AnswerLogStore>,
        questions: Arc<dyn QuestionCatalog>,
        recommendations: Arc<dyn RecommendationStore>,
        scorer: Arc<dyn RecommendationScorer>,
    ) -> Self {
        Self {
            sessions,
            logs,
            questions,
            recommendations,
            scorer,
            claim_lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
        }
    }

    /// Overrides how long a `Resolving` claim is honoured before takeover.
    pub fn with_claim_lease(mut self, claim_lease: Duration) -> Self {
        self.claim_lease = claim_lease;
        self
    }

    /// Starts a recommendation for the session's user and returns its id.
    pub async fn begin(&self, session_token: &str) -> Result<Uuid, RecommendationError> {
        let session = self.sessions.resolve_session(session_token).await?;
        let log_count = self.logs.count_logs(session.user_id).await?;
        let strategy = RecommendationStrategy::for_log_count(log_count);

        let rec = self
            .recommendations
            .create_recommendation(session.user_id, strategy)
            .await?;
        info!(
            rec_id = %rec.rec_id,
            user_id = %session.user_id,
            log_count,
            strategy = %strategy,
            "Recommendation requested"
        );
        Ok(rec.rec_id)
    }

    /// Returns the ranked questions of a recommendation, calling the scorer
    /// only if it has never been resolved.
    pub async fn resolve(
        &self,
        rec_id: Uuid,
    ) -> Result<Vec<RecommendedQuestion>, RecommendationError> {
        let rec = self.recommendations.get_recommendation(rec_id).await?;
        if rec.state == RecommendationState::Resolved {
            debug!(rec_id = %rec_id, "Serving stored recommendation");
            return self.read_back(rec_id).await;
        }

        let claim_token = Uuid::new_v4();
        let stale_before = Utc::now() - self.claim_lease;
        let claimed = self
            .recommendations
            .claim_recommendation(rec_id, claim_token, stale_before)
            .await?;
        if !claimed {
            let current = self.recommendations.get_recommendation(rec_id).await?;
            if current.state == RecommendationState::Resolved {
                return self.read_back(rec_id).await;
            }
            warn!(rec_id = %rec_id, "Resolution already in flight");
            return Err(RecommendationError::InProgress(rec_id));
        }

        if let Err(err) = self.score_and_store(&rec, claim_token).await {
            if let Err(release_err) = self.recommendations.release_claim(rec_id, claim_token).await {
                error!(rec_id = %rec_id, "Failed to release claim: {}", release_err);
            }
            warn!(rec_id = %rec_id, "Resolution failed, left retryable: {}", err);
            return Err(err);
        }

        self.read_back(rec_id).await
    }

    async fn score_and_store(
        &self,
        rec: &Recommendation,
        claim_token: Uuid,
    ) -> Result<(), RecommendationError> {
        let window = self.logs.recent_logs(rec.user_id, FEATURE_WINDOW).await?;
        let request = ScorerRequest::from_logs(rec.strategy, rec.user_id, &window);
        debug!(
            rec_id = %rec.rec_id,
            strategy = %rec.strategy,
            items = request.len(),
            "Calling scorer"
        );

        let ranked = self.scorer.recommend(&request).await.map_err(|e| match e {
            PortError::Upstream(why) => RecommendationError::Upstream(why),
            other => RecommendationError::Upstream(other.to_string()),
        })?;

        self.recommendations
            .complete_recommendation(rec.rec_id, claim_token, &ranked)
            .await?;
        info!(
            rec_id = %rec.rec_id,
            count = ranked.len(),
            "Recommendation resolved"
        );
        Ok(())
    }

    /// Joins the stored ranking to the catalog, preserving `order`.
    async fn read_back(&self, rec_id: Uuid) -> Result<Vec<RecommendedQuestion>, RecommendationError> {
        let rows = self.recommendations.recommendation_questions(rec_id).await?;
        let ids: Vec<QuestionId> = rows.iter().map(|r| r.question_id).collect();
        let catalog: HashMap<QuestionId, _> = self
            .questions
            .get_questions(&ids)
            .await?
            .into_iter()
            .map(|q| (q.question_id, q))
            .collect();

        rows.into_iter()
            .map(|row| {
                let question = catalog.get(&row.question_id).ok_or_else(|| {
                    error!(rec_id = %rec_id, question_id = row.question_id, "Recommended question missing from catalog");
                    RecommendationError::DataIntegrity(format!(
                        "question {} of recommendation {} is not in the catalog",
                        row.question_id, rec_id
                    ))
                })?;
                Ok(RecommendedQuestion {
                    question_id: question.question_id,
                    question: question.question.clone(),
                    answer: question.correct_ans.clone(),
                    wrong_answer: question.wrong_ans.clone(),
                    explanation: question.explanation.clone(),
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Question;
    use crate::memory::InMemoryStore;
    use crate::ports::{PortResult, UserStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Scorer double that replays scripted answers and records every request.
    struct ScriptedScorer {
        answers: Mutex<Vec<PortResult<Vec<QuestionId>>>>,
        requests: Mutex<Vec<ScorerRequest>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedScorer {
        fn new(answers: Vec<PortResult<Vec<QuestionId>>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(answers: Vec<PortResult<Vec<QuestionId>>>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(answers)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecommendationScorer for ScriptedScorer {
        async fn recommend(&self, request: &ScorerRequest) -> PortResult<Vec<QuestionId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                return Err(PortError::Upstream("no scripted answer".to_string()));
            }
            answers.remove(0)
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        scorer: Arc<ScriptedScorer>,
        service: RecommendationService,
        token: String,
        user_id: Uuid,
    }

    async fn fixture(scorer: ScriptedScorer, log_count: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        for id in 1..=10 {
            store
                .insert_question(Question {
                    question_id: id,
                    question: format!("question {}", id),
                    correct_ans: format!("right {}", id),
                    wrong_ans: format!("wrong {}", id),
                    explanation: format!("because {}", id),
                })
                .await;
        }
        let user = store.record_login("learner@example.com", "Learner").await.unwrap();
        let session = store.create_session(user.user_id).await.unwrap();
        let base = Utc::now() - Duration::hours(1);
        for i in 0..log_count {
            store
                .insert_log_at(
                    user.user_id,
                    (i % 10) as QuestionId + 1,
                    i % 3 != 0,
                    base + Duration::seconds(i as i64),
                )
                .await;
        }

        let scorer = Arc::new(scorer);
        let service = RecommendationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            scorer.clone(),
        );
        Fixture {
            store,
            scorer,
            service,
            token: session.token,
            user_id: user.user_id,
        }
    }

    fn ids(result: &[RecommendedQuestion]) -> Vec<QuestionId> {
        result.iter().map(|q| q.question_id).collect()
    }

    #[tokio::test]
    async fn begin_picks_strategy_from_log_volume() {
        for (log_count, expected) in [
            (0, RecommendationStrategy::Initial),
            (29, RecommendationStrategy::Initial),
            (30, RecommendationStrategy::Subsequent),
            (45, RecommendationStrategy::Subsequent),
        ] {
            let fx = fixture(ScriptedScorer::new(vec![]), log_count).await;
            let rec_id = fx.service.begin(&fx.token).await.unwrap();
            let rec = fx.store.get_recommendation(rec_id).await.unwrap();
            assert_eq!(rec.strategy, expected, "log_count = {}", log_count);
            assert_eq!(rec.state, RecommendationState::Requested);
            assert_eq!(rec.user_id, fx.user_id);
        }
    }

    #[tokio::test]
    async fn begin_with_unknown_token_creates_nothing() {
        let fx = fixture(ScriptedScorer::new(vec![]), 3).await;
        let err = fx.service.begin("not-a-session").await.unwrap_err();
        assert!(matches!(err, RecommendationError::Unauthorized));
        assert_eq!(fx.store.recommendation_count().await, 0);
    }

    #[tokio::test]
    async fn resolve_unknown_recommendation_is_not_found() {
        let fx = fixture(ScriptedScorer::new(vec![]), 0).await;
        let err = fx.service.resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RecommendationError::NotFound(_)));
        assert_eq!(fx.scorer.calls(), 0);
    }

    #[tokio::test]
    async fn resolve_twice_calls_scorer_once() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![1, 2])]), 5).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();

        let first = fx.service.resolve(rec_id).await.unwrap();
        let second = fx.service.resolve(rec_id).await.unwrap();

        assert_eq!(ids(&first), vec![1, 2]);
        assert_eq!(first, second);
        assert_eq!(fx.scorer.calls(), 1);
        assert_eq!(first[0].question, "question 1");
        assert_eq!(first[0].answer, "right 1");
        assert_eq!(first[0].wrong_answer, "wrong 1");
        assert_eq!(first[0].explanation, "because 1");

        let requests = fx.scorer.requests.lock().unwrap();
        assert_eq!(requests[0].strategy(), RecommendationStrategy::Initial);
        assert_eq!(requests[0].len(), 5);
    }

    #[tokio::test]
    async fn scorer_order_is_persisted_and_returned() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![7, 3, 9])]), 0).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();

        let result = fx.service.resolve(rec_id).await.unwrap();
        assert_eq!(ids(&result), vec![7, 3, 9]);

        let rows = fx.store.recommendation_questions(rec_id).await.unwrap();
        let persisted: Vec<(i32, QuestionId)> =
            rows.iter().map(|r| (r.order, r.question_id)).collect();
        assert_eq!(persisted, vec![(0, 7), (1, 3), (2, 9)]);
    }

    #[tokio::test]
    async fn failed_scorer_call_leaves_recommendation_retryable() {
        let fx = fixture(
            ScriptedScorer::new(vec![
                Err(PortError::Upstream("scorer reported status 'error'".to_string())),
                Ok(vec![4]),
            ]),
            2,
        )
        .await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();

        let err = fx.service.resolve(rec_id).await.unwrap_err();
        assert!(matches!(err, RecommendationError::Upstream(_)));
        let rec = fx.store.get_recommendation(rec_id).await.unwrap();
        assert_eq!(rec.state, RecommendationState::Requested);
        assert!(fx.store.recommendation_questions(rec_id).await.unwrap().is_empty());

        let result = fx.service.resolve(rec_id).await.unwrap();
        assert_eq!(ids(&result), vec![4]);
        assert_eq!(fx.scorer.calls(), 2);
    }

    #[tokio::test]
    async fn warm_user_gets_windowed_subsequent_request() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![5])]), 42).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();
        fx.service.resolve(rec_id).await.unwrap();

        let requests = fx.scorer.requests.lock().unwrap();
        match &requests[0] {
            ScorerRequest::Subsequent { items } => {
                assert_eq!(items.len(), FEATURE_WINDOW as usize);
                assert!(items.iter().all(|i| i.user_id == fx.user_id));
                assert!(items.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
            }
            other => panic!("expected subsequent request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn strategy_is_not_recomputed_at_resolve() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![1])]), 29).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();
        fx.store.append_log(fx.user_id, 1, true).await.unwrap();
        fx.store.append_log(fx.user_id, 2, false).await.unwrap();

        fx.service.resolve(rec_id).await.unwrap();
        let requests = fx.scorer.requests.lock().unwrap();
        assert_eq!(requests[0].strategy(), RecommendationStrategy::Initial);
        assert_eq!(requests[0].len(), FEATURE_WINDOW as usize);
    }

    #[tokio::test]
    async fn unknown_question_from_scorer_is_integrity_error() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![1, 999])]), 0).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();

        let err = fx.service.resolve(rec_id).await.unwrap_err();
        assert!(matches!(err, RecommendationError::DataIntegrity(_)));

        // The ranking was stored; later calls fail the same way without rescoring.
        let err = fx.service.resolve(rec_id).await.unwrap_err();
        assert!(matches!(err, RecommendationError::DataIntegrity(_)));
        assert_eq!(fx.scorer.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_resolves_call_scorer_once() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(ScriptedScorer::gated(vec![Ok(vec![2, 1])], gate.clone()), 0).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();

        let first = {
            let service = fx.service.clone();
            tokio::spawn(async move { service.resolve(rec_id).await })
        };
        while fx.scorer.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let err = fx.service.resolve(rec_id).await.unwrap_err();
        assert!(matches!(err, RecommendationError::InProgress(id) if id == rec_id));

        gate.notify_one();
        let result = first.await.unwrap().unwrap();
        assert_eq!(ids(&result), vec![2, 1]);

        let again = fx.service.resolve(rec_id).await.unwrap();
        assert_eq!(again, result);
        assert_eq!(fx.scorer.calls(), 1);
    }

    #[tokio::test]
    async fn abandoned_claim_is_taken_over_after_lease() {
        let fx = fixture(ScriptedScorer::new(vec![Ok(vec![3])]), 0).await;
        let rec_id = fx.service.begin(&fx.token).await.unwrap();
        fx.store
            .claim_recommendation(rec_id, Uuid::new_v4(), Utc::now())
            .await
            .unwrap();

        let err = fx.service.resolve(rec_id).await.unwrap_err();
        assert!(matches!(err, RecommendationError::InProgress(_)));

        let impatient = fx.service.clone().with_claim_lease(Duration::seconds(-1));
        let result = impatient.resolve(rec_id).await.unwrap();
        assert_eq!(ids(&result), vec![3]);
    }
}
