//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the storage ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use narat_core::domain::{
    AnswerLogEntry, Question, QuestionId, Recommendation, RecommendationQuestion,
    RecommendationStrategy, Session, User,
};
use narat_core::ports::{
    AnswerLogStore, PortError, PortResult, QuestionCatalog, RecommendationStore, SessionStore,
    UserStore,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or replaces a catalog entry. Used for seeding.
    pub async fn upsert_question(&self, question: &Question) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO questions (question_id, question, correct_ans, wrong_ans, explanation)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (question_id) DO UPDATE
             SET question = EXCLUDED.question, correct_ans = EXCLUDED.correct_ans,
                 wrong_ans = EXCLUDED.wrong_ans, explanation = EXCLUDED.explanation",
        )
        .bind(question.question_id)
        .bind(&question.question)
        .bind(&question.correct_ans)
        .bind(&question.wrong_ans)
        .bind(&question.explanation)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    display_name: String,
    study_level: i32,
    created_at: DateTime<Utc>,
    last_login: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
            display_name: self.display_name,
            study_level: self.study_level,
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    token: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            token: self.token,
            user_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    question_id: i32,
    question: String,
    correct_ans: String,
    wrong_ans: String,
    explanation: String,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            question_id: self.question_id,
            question: self.question,
            correct_ans: self.correct_ans,
            wrong_ans: self.wrong_ans,
            explanation: self.explanation,
        }
    }
}

#[derive(FromRow)]
struct LogRecord {
    log_id: i64,
    user_id: Uuid,
    question_id: i32,
    correct: bool,
    created_at: DateTime<Utc>,
}
impl LogRecord {
    fn to_domain(self) -> AnswerLogEntry {
        AnswerLogEntry {
            log_id: self.log_id,
            user_id: self.user_id,
            question_id: self.question_id,
            correct: self.correct,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct RecommendationRecord {
    rec_id: Uuid,
    user_id: Uuid,
    rec_type: String,
    state: String,
    claim_token: Option<Uuid>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl RecommendationRecord {
    fn to_domain(self) -> PortResult<Recommendation> {
        Ok(Recommendation {
            rec_id: self.rec_id,
            user_id: self.user_id,
            strategy: self.rec_type.parse().map_err(PortError::Unexpected)?,
            state: self.state.parse().map_err(PortError::Unexpected)?,
            claim_token: self.claim_token,
            claimed_at: self.claimed_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct RecommendationQuestionRecord {
    rec_id: Uuid,
    question_id: i32,
    order: i32,
    created_at: DateTime<Utc>,
}
impl RecommendationQuestionRecord {
    fn to_domain(self) -> RecommendationQuestion {
        RecommendationQuestion {
            rec_id: self.rec_id,
            question_id: self.question_id,
            order: self.order,
            created_at: self.created_at,
        }
    }
}

const USER_COLUMNS: &str = "user_id, email, display_name, study_level, created_at, last_login";
const LOG_COLUMNS: &str = "log_id, user_id, question_id, correct, created_at";
const QUESTION_COLUMNS: &str = "question_id, question, correct_ans, wrong_ans, explanation";
const RECOMMENDATION_COLUMNS: &str =
    "rec_id, user_id, rec_type, state, claim_token, claimed_at, created_at";

//=========================================================================================
// Port Trait Implementations
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn record_login(&self, email: &str, display_name: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (user_id, email, display_name) VALUES ($1, $2, $3)
             ON CONFLICT (email) DO UPDATE SET last_login = now()
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE user_id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl SessionStore for DbAdapter {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO sessions (token, user_id) VALUES ($1, $2) RETURNING token, user_id, created_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn resolve_session(&self, token: &str) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT token, user_id, created_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(SessionRecord::to_domain).ok_or(PortError::Unauthorized)
    }

    async fn delete_session(&self, token: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl AnswerLogStore for DbAdapter {
    async fn append_log(
        &self,
        user_id: Uuid,
        question_id: QuestionId,
        correct: bool,
    ) -> PortResult<AnswerLogEntry> {
        let record = sqlx::query_as::<_, LogRecord>(&format!(
            "INSERT INTO user_logs (user_id, question_id, correct) VALUES ($1, $2, $3) RETURNING {}",
            LOG_COLUMNS
        ))
        .bind(user_id)
        .bind(question_id)
        .bind(correct)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn count_logs(&self, user_id: Uuid) -> PortResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_logs WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count)
    }

    async fn recent_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<AnswerLogEntry>> {
        let records = sqlx::query_as::<_, LogRecord>(&format!(
            "SELECT {} FROM user_logs WHERE user_id = $1
             ORDER BY created_at DESC, log_id DESC LIMIT $2",
            LOG_COLUMNS
        ))
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn user_history(&self, user_id: Uuid) -> PortResult<Vec<AnswerLogEntry>> {
        let records = sqlx::query_as::<_, LogRecord>(&format!(
            "SELECT {} FROM user_logs WHERE user_id = $1 ORDER BY created_at DESC, log_id DESC",
            LOG_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn question_history(&self, question_id: QuestionId) -> PortResult<Vec<AnswerLogEntry>> {
        let records = sqlx::query_as::<_, LogRecord>(&format!(
            "SELECT {} FROM user_logs WHERE question_id = $1 ORDER BY created_at DESC, log_id DESC",
            LOG_COLUMNS
        ))
        .bind(question_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[async_trait]
impl QuestionCatalog for DbAdapter {
    async fn get_question(&self, question_id: QuestionId) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE question_id = $1",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Question {} not found", question_id)))?;
        Ok(record.to_domain())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE question_id = ANY($1)",
            QUESTION_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_questions(&self, offset: i64, limit: i64) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions ORDER BY question_id OFFSET $1 LIMIT $2",
            QUESTION_COLUMNS
        ))
        .bind(offset.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[async_trait]
impl RecommendationStore for DbAdapter {
    async fn create_recommendation(
        &self,
        user_id: Uuid,
        strategy: RecommendationStrategy,
    ) -> PortResult<Recommendation> {
        let record = sqlx::query_as::<_, RecommendationRecord>(&format!(
            "INSERT INTO recommendations (rec_id, user_id, rec_type) VALUES ($1, $2, $3) RETURNING {}",
            RECOMMENDATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(strategy.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_recommendation(&self, rec_id: Uuid) -> PortResult<Recommendation> {
        let record = sqlx::query_as::<_, RecommendationRecord>(&format!(
            "SELECT {} FROM recommendations WHERE rec_id = $1",
            RECOMMENDATION_COLUMNS
        ))
        .bind(rec_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Recommendation {} not found", rec_id)))?;
        record.to_domain()
    }

    async fn claim_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        stale_before: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Single conditional write: the row-level lock makes concurrent claims serialize.
        let result = sqlx::query(
            "UPDATE recommendations
             SET state = 'resolving', claim_token = $2, claimed_at = $3
             WHERE rec_id = $1
               AND (state = 'requested' OR (state = 'resolving' AND claimed_at < $4))",
        )
        .bind(rec_id)
        .bind(claim_token)
        .bind(Utc::now())
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, rec_id: Uuid, claim_token: Uuid) -> PortResult<()> {
        sqlx::query(
            "UPDATE recommendations
             SET state = 'requested', claim_token = NULL, claimed_at = NULL
             WHERE rec_id = $1 AND state = 'resolving' AND claim_token = $2",
        )
        .bind(rec_id)
        .bind(claim_token)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn complete_recommendation(
        &self,
        rec_id: Uuid,
        claim_token: Uuid,
        question_ids: &[QuestionId],
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let flipped = sqlx::query(
            "UPDATE recommendations SET state = 'resolved', claim_token = NULL
             WHERE rec_id = $1 AND state = 'resolving' AND claim_token = $2",
        )
        .bind(rec_id)
        .bind(claim_token)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if flipped.rows_affected() != 1 {
            tx.rollback().await.map_err(unexpected)?;
            return Err(PortError::Conflict(format!(
                "Recommendation {} is not claimed by this resolver",
                rec_id
            )));
        }

        let orders: Vec<i32> = (0..question_ids.len() as i32).collect();
        sqlx::query(
            r#"INSERT INTO recommendation_questions (rec_id, "order", question_id)
               SELECT $1, ranked.ord, ranked.question_id
               FROM UNNEST($2::int4[], $3::int4[]) AS ranked(ord, question_id)"#,
        )
        .bind(rec_id)
        .bind(orders)
        .bind(question_ids.to_vec())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn recommendation_questions(
        &self,
        rec_id: Uuid,
    ) -> PortResult<Vec<RecommendationQuestion>> {
        let records = sqlx::query_as::<_, RecommendationQuestionRecord>(
            r#"SELECT rec_id, question_id, "order", created_at
               FROM recommendation_questions WHERE rec_id = $1 ORDER BY "order" ASC"#,
        )
        .bind(rec_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
