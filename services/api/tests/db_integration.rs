//! Integration tests for the Postgres adapter.
//!
//! These need a reachable database in `DATABASE_URL` and are ignored by
//! default: `cargo test -p api -- --ignored`.

use api_lib::adapters::DbAdapter;
use chrono::{Duration, Utc};
use narat_core::domain::{Question, RecommendationState, RecommendationStrategy};
use narat_core::ports::{
    AnswerLogStore, PortError, QuestionCatalog, RecommendationStore, SessionStore, UserStore,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn adapter() -> DbAdapter {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");
    let adapter = DbAdapter::new(pool);
    adapter.run_migrations().await.expect("Failed to run migrations");
    adapter
}

fn unique_email() -> String {
    format!("{}@integration.test", Uuid::new_v4())
}

async fn seed_question(db: &DbAdapter, question_id: i32) {
    db.upsert_question(&Question {
        question_id,
        question: format!("integration question {}", question_id),
        correct_ans: "right".to_string(),
        wrong_ans: "wrong".to_string(),
        explanation: "because".to_string(),
    })
    .await
    .expect("Failed to seed question");
}

#[tokio::test]
#[ignore = "requires Postgres in DATABASE_URL"]
async fn test_login_session_round_trip() {
    let db = adapter().await;
    let email = unique_email();

    let first = db.record_login(&email, "First").await.unwrap();
    let again = db.record_login(&email, "First").await.unwrap();
    assert_eq!(first.user_id, again.user_id);

    let session = db.create_session(first.user_id).await.unwrap();
    assert_eq!(db.resolve_session(&session.token).await.unwrap().user_id, first.user_id);

    db.delete_session(&session.token).await.unwrap();
    assert!(matches!(
        db.resolve_session(&session.token).await,
        Err(PortError::Unauthorized)
    ));
    assert!(matches!(
        db.delete_session(&session.token).await,
        Err(PortError::Unauthorized)
    ));
}

#[tokio::test]
#[ignore = "requires Postgres in DATABASE_URL"]
async fn test_logs_are_counted_and_windowed() {
    let db = adapter().await;
    seed_question(&db, 900_001).await;
    let user = db.record_login(&unique_email(), "Logger").await.unwrap();

    for correct in [true, false, true] {
        db.append_log(user.user_id, 900_001, correct).await.unwrap();
    }
    assert_eq!(db.count_logs(user.user_id).await.unwrap(), 3);

    let recent = db.recent_logs(user.user_id, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].log_id > recent[1].log_id);
    assert!(recent[0].correct);
    assert!(!recent[1].correct);
}

#[tokio::test]
#[ignore = "requires Postgres in DATABASE_URL"]
async fn test_claim_is_exclusive_and_completion_is_atomic() {
    let db = adapter().await;
    let user = db.record_login(&unique_email(), "Claimer").await.unwrap();
    let rec = db
        .create_recommendation(user.user_id, RecommendationStrategy::Initial)
        .await
        .unwrap();
    assert_eq!(rec.state, RecommendationState::Requested);

    let stale_before = Utc::now() - Duration::seconds(60);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    assert!(db.claim_recommendation(rec.rec_id, a, stale_before).await.unwrap());
    assert!(!db.claim_recommendation(rec.rec_id, b, stale_before).await.unwrap());

    // The loser cannot complete; nothing is written.
    assert!(matches!(
        db.complete_recommendation(rec.rec_id, b, &[1, 2]).await,
        Err(PortError::Conflict(_))
    ));
    assert!(db.recommendation_questions(rec.rec_id).await.unwrap().is_empty());

    db.complete_recommendation(rec.rec_id, a, &[30, 10, 20]).await.unwrap();
    let stored = db.get_recommendation(rec.rec_id).await.unwrap();
    assert_eq!(stored.state, RecommendationState::Resolved);

    let rows = db.recommendation_questions(rec.rec_id).await.unwrap();
    let ids: Vec<i32> = rows.iter().map(|r| r.question_id).collect();
    let orders: Vec<i32> = rows.iter().map(|r| r.order).collect();
    assert_eq!(ids, vec![30, 10, 20]);
    assert_eq!(orders, vec![0, 1, 2]);

    // Resolved is terminal.
    assert!(!db
        .claim_recommendation(rec.rec_id, Uuid::new_v4(), Utc::now() + Duration::seconds(60))
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "requires Postgres in DATABASE_URL"]
async fn test_released_and_stale_claims_can_be_retaken() {
    let db = adapter().await;
    let user = db.record_login(&unique_email(), "Retry").await.unwrap();
    let rec = db
        .create_recommendation(user.user_id, RecommendationStrategy::Subsequent)
        .await
        .unwrap();
    let lease = Utc::now() - Duration::seconds(60);

    let first = Uuid::new_v4();
    assert!(db.claim_recommendation(rec.rec_id, first, lease).await.unwrap());
    db.release_claim(rec.rec_id, first).await.unwrap();
    assert_eq!(
        db.get_recommendation(rec.rec_id).await.unwrap().state,
        RecommendationState::Requested
    );

    let second = Uuid::new_v4();
    assert!(db.claim_recommendation(rec.rec_id, second, lease).await.unwrap());
    // A cutoff in the future treats the live claim as stale.
    let third = Uuid::new_v4();
    assert!(db
        .claim_recommendation(rec.rec_id, third, Utc::now() + Duration::seconds(1))
        .await
        .unwrap());
    assert!(matches!(
        db.complete_recommendation(rec.rec_id, second, &[1]).await,
        Err(PortError::Conflict(_))
    ));
    db.complete_recommendation(rec.rec_id, third, &[1]).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Postgres in DATABASE_URL"]
async fn test_get_questions_omits_missing_ids() {
    let db = adapter().await;
    seed_question(&db, 900_101).await;
    seed_question(&db, 900_102).await;

    let found = db.get_questions(&[900_102, 999_999_999, 900_101]).await.unwrap();
    let mut ids: Vec<i32> = found.iter().map(|q| q.question_id).collect();
    ids.sort();
    assert_eq!(ids, vec![900_101, 900_102]);

    assert!(matches!(
        db.get_question(999_999_999).await,
        Err(PortError::NotFound(_))
    ));
}
