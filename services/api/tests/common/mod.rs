//! Shared fixtures for the API integration tests.

#![allow(dead_code)]

use api_lib::adapters::{GoogleIdentityAdapter, HttpScorerAdapter};
use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use narat_core::domain::Question;
use narat_core::InMemoryStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const CLIENT_ID: &str = "narat-test-client";
pub const TEST_SESSION_TOKEN: &str = "let-me-in";

pub fn test_config(scorer_url: &str, tokeninfo_url: &str) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://unused".to_string()),
        ("SCORER_BASE_URL", scorer_url.to_string()),
        ("SCORER_TIMEOUT_SECS", "2".to_string()),
        ("GOOGLE_CLIENT_ID", CLIENT_ID.to_string()),
        ("GOOGLE_TOKENINFO_URL", tokeninfo_url.to_string()),
        ("GOOGLE_TIMEOUT_SECS", "2".to_string()),
        ("TEST_SESSION_TOKEN", TEST_SESSION_TOKEN.to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config is valid")
}

pub fn question(id: i32) -> Question {
    Question {
        question_id: id,
        question: format!("Which spelling is right? #{}", id),
        correct_ans: format!("right-{}", id),
        wrong_ans: format!("wrong-{}", id),
        explanation: format!("explanation-{}", id),
    }
}

/// A router over an in-memory store seeded with questions 1..=10, talking to
/// the given scorer and identity provider base URLs.
pub async fn test_app(scorer_url: &str, tokeninfo_url: &str) -> (Router, Arc<InMemoryStore>) {
    let config = Arc::new(test_config(scorer_url, tokeninfo_url));
    let store = Arc::new(InMemoryStore::new());
    for id in 1..=10 {
        store.insert_question(question(id)).await;
    }
    let scorer = Arc::new(
        HttpScorerAdapter::new(config.scorer_base_url.clone(), config.scorer_timeout)
            .expect("scorer client builds"),
    );
    let identity = Arc::new(
        GoogleIdentityAdapter::new(
            config.google_tokeninfo_url.clone(),
            config.google_client_id.clone(),
            config.google_timeout,
        )
        .expect("identity client builds"),
    );
    let state = Arc::new(AppState::new(config, store.clone(), scorer, identity));
    (build_router(state), store)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
