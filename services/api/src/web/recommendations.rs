//! services/api/src/web/recommendations.rs
//!
//! HTTP surface of the recommendation lifecycle: `begin` creates a
//! recommendation, `success` resolves it (once) and returns the ranking.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use narat_core::domain::{QuestionId, RecommendedQuestion};
use narat_core::recommendation::RecommendationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::auth::SessionTokenRequest;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct BeginResponse {
    pub rec_id: Uuid,
}

#[derive(Deserialize, ToSchema, IntoParams)]
pub struct ResolveRequest {
    pub rec_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct RecommendedQuestionDto {
    pub question_id: QuestionId,
    pub question: String,
    /// The correct answer.
    pub answer: String,
    pub wrong_answer: String,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

impl From<RecommendedQuestion> for RecommendedQuestionDto {
    fn from(q: RecommendedQuestion) -> Self {
        Self {
            question_id: q.question_id,
            question: q.question,
            answer: q.answer,
            wrong_answer: q.wrong_answer,
            explanation: q.explanation,
            created_at: q.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResolveResponse {
    pub success: bool,
    pub recommendation: Vec<RecommendedQuestionDto>,
}

/// Maps lifecycle outcomes onto HTTP statuses.
pub fn recommendation_error_response(err: RecommendationError) -> (StatusCode, String) {
    match err {
        RecommendationError::Unauthorized => {
            (StatusCode::FORBIDDEN, "Invalid session token".to_string())
        }
        RecommendationError::NotFound(_) => {
            (StatusCode::NOT_FOUND, "Recommendation not found".to_string())
        }
        RecommendationError::InProgress(_) => (
            StatusCode::CONFLICT,
            "Recommendation is being prepared, retry shortly".to_string(),
        ),
        RecommendationError::Upstream(why) => {
            warn!("Recommendation scorer failed: {}", why);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Recommendation service unavailable".to_string(),
            )
        }
        other => {
            error!("Recommendation failed: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load recommendation".to_string(),
            )
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/recommendations - Start a recommendation for the session's user
#[utoipa::path(
    post,
    path = "/api/recommendations",
    request_body = SessionTokenRequest,
    responses(
        (status = 200, description = "Recommendation requested", body = BeginResponse),
        (status = 403, description = "Invalid session token")
    )
)]
pub async fn begin_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rec_id = state
        .recommendations
        .begin(&req.session_token)
        .await
        .map_err(recommendation_error_response)?;
    Ok(Json(BeginResponse { rec_id }))
}

/// POST /api/recommendations/success - Resolve a recommendation and return its ranking
#[utoipa::path(
    post,
    path = "/api/recommendations/success",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Ranked questions", body = ResolveResponse),
        (status = 404, description = "Unknown recommendation"),
        (status = 409, description = "Resolution already in flight"),
        (status = 500, description = "Scorer failure or data integrity error")
    )
)]
pub async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    resolve(state, &req.rec_id).await
}

/// GET /api/recommendations/success?rec_id= - Query-string form of the resolve endpoint
#[utoipa::path(
    get,
    path = "/api/recommendations/success",
    params(ResolveRequest),
    responses(
        (status = 200, description = "Ranked questions", body = ResolveResponse),
        (status = 404, description = "Unknown recommendation"),
        (status = 409, description = "Resolution already in flight"),
        (status = 500, description = "Scorer failure or data integrity error")
    )
)]
pub async fn resolve_query_handler(
    State(state): State<Arc<AppState>>,
    Query(req): Query<ResolveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    resolve(state, &req.rec_id).await
}

async fn resolve(
    state: Arc<AppState>,
    rec_id: &str,
) -> Result<Json<ResolveResponse>, (StatusCode, String)> {
    let rec_id = Uuid::parse_str(rec_id)
        .map_err(|_| (StatusCode::NOT_FOUND, "Recommendation not found".to_string()))?;

    // Detached: dropping this handler (client gone) leaves the task running.
    let service = state.recommendations.clone();
    let resolution = state
        .resolutions
        .spawn(async move { service.resolve(rec_id).await });

    let ranked = resolution
        .await
        .map_err(|e| {
            error!(rec_id = %rec_id, "Resolution task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load recommendation".to_string(),
            )
        })?
        .map_err(recommendation_error_response)?;

    Ok(Json(ResolveResponse {
        success: true,
        recommendation: ranked.into_iter().map(RecommendedQuestionDto::from).collect(),
    }))
}
