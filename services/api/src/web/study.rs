//! services/api/src/web/study.rs
//!
//! Answer submission, study history and answer statistics. All of these read
//! or append the answer log.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use narat_core::domain::{AnswerLogEntry, QuestionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::web::auth::{require_session, SessionTokenRequest};
use crate::web::questions::question_lookup_error;
use crate::web::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 5;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub session_token: String,
    pub question_id: QuestionId,
    pub correct: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub success: bool,
    pub explanation: String,
}

#[derive(Deserialize, ToSchema)]
pub struct HistoryRequest {
    pub session_token: String,
    pub limit: Option<i64>,
}

/// One answer event of the requesting user.
#[derive(Serialize, ToSchema)]
pub struct StudyEventDto {
    pub question_id: QuestionId,
    pub correct: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AnswerLogEntry> for StudyEventDto {
    fn from(entry: AnswerLogEntry) -> Self {
        Self {
            question_id: entry.question_id,
            correct: entry.correct,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub history: Vec<StudyEventDto>,
}

#[derive(Serialize, ToSchema)]
pub struct UserStatsResponse {
    pub study_states: Vec<StudyEventDto>,
}

/// One answer to a question, by any user.
#[derive(Serialize, ToSchema)]
pub struct QuestionStatDto {
    pub correct: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionStatsResponse {
    pub question_stats: Vec<QuestionStatDto>,
}

fn log_read_error(e: narat_core::ports::PortError) -> (StatusCode, String) {
    error!("Failed to read answer log: {:?}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read answer log".to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/study/submit - Record an answer
#[utoipa::path(
    post,
    path = "/api/study/submit",
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 403, description = "Invalid session token"),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn submit_answer_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&state, &req.session_token).await?;
    let question = state
        .questions
        .get_question(req.question_id)
        .await
        .map_err(question_lookup_error)?;

    state
        .logs
        .append_log(session.user_id, question.question_id, req.correct)
        .await
        .map_err(|e| {
            error!("Failed to append answer log: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record answer".to_string())
        })?;
    debug!(user_id = %session.user_id, question_id = question.question_id, correct = req.correct, "Answer recorded");

    Ok(Json(SubmitAnswerResponse {
        success: true,
        explanation: question.explanation,
    }))
}

/// POST /api/study/history - The user's most recent answers, newest first
#[utoipa::path(
    post,
    path = "/api/study/history",
    request_body = HistoryRequest,
    responses(
        (status = 200, description = "Recent answers", body = HistoryResponse),
        (status = 400, description = "Invalid limit"),
        (status = 403, description = "Invalid session token")
    )
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HistoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = req.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit < 1 {
        return Err((StatusCode::BAD_REQUEST, "limit must be positive".to_string()));
    }
    let session = require_session(&state, &req.session_token).await?;

    let logs = state
        .logs
        .recent_logs(session.user_id, limit)
        .await
        .map_err(log_read_error)?;

    Ok(Json(HistoryResponse {
        history: logs.into_iter().map(StudyEventDto::from).collect(),
    }))
}

/// POST /api/stats/user - The user's full answer history, newest first
#[utoipa::path(
    post,
    path = "/api/stats/user",
    request_body = SessionTokenRequest,
    responses(
        (status = 200, description = "All answers of the user", body = UserStatsResponse),
        (status = 403, description = "Invalid session token")
    )
)]
pub async fn user_stats_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&state, &req.session_token).await?;
    let logs = state
        .logs
        .user_history(session.user_id)
        .await
        .map_err(log_read_error)?;

    Ok(Json(UserStatsResponse {
        study_states: logs.into_iter().map(StudyEventDto::from).collect(),
    }))
}

/// GET /api/stats/questions/{question_id} - Every recorded answer to a question
#[utoipa::path(
    get,
    path = "/api/stats/questions/{question_id}",
    params(("question_id" = i32, Path, description = "Catalog id of the question")),
    responses(
        (status = 200, description = "Answers to the question", body = QuestionStatsResponse),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn question_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<QuestionId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .questions
        .get_question(question_id)
        .await
        .map_err(question_lookup_error)?;

    let logs = state
        .logs
        .question_history(question_id)
        .await
        .map_err(log_read_error)?;

    Ok(Json(QuestionStatsResponse {
        question_stats: logs
            .into_iter()
            .map(|entry| QuestionStatDto {
                correct: entry.correct,
                created_at: entry.created_at,
            })
            .collect(),
    }))
}
