pub mod auth;
pub mod questions;
pub mod recommendations;
pub mod rest;
pub mod state;
pub mod study;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::web::state::AppState;

pub use rest::ApiDoc;

/// Builds the API router. The Swagger UI is merged on top by the binary.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!("Ignoring invalid CORS origin '{}'", state.config.cors_origin),
    }

    let auth_routes = Router::new()
        .route("/google", post(auth::google_login_handler))
        .route("/verify", post(auth::verify_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/test_session_create", post(auth::test_session_handler));

    let question_routes = Router::new()
        .route("/", get(questions::list_questions_handler))
        .route("/{question_id}", get(questions::get_question_handler));

    let study_routes = Router::new()
        .route("/submit", post(study::submit_answer_handler))
        .route("/history", post(study::history_handler));

    let stats_routes = Router::new()
        .route("/user", post(study::user_stats_handler))
        .route("/questions/{question_id}", get(study::question_stats_handler));

    let recommendation_routes = Router::new()
        .route("/", post(recommendations::begin_handler))
        .route(
            "/success",
            post(recommendations::resolve_handler).get(recommendations::resolve_query_handler),
        );

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/questions", question_routes)
        .nest("/study", study_routes)
        .nest("/stats", stats_routes)
        .nest("/recommendations", recommendation_routes);

    Router::new()
        .route("/", get(rest::root_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
