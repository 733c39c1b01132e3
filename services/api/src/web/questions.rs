//! services/api/src/web/questions.rs
//!
//! Read-only access to the question catalog.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use narat_core::domain::{Question, QuestionId};
use narat_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::web::state::AppState;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize, IntoParams)]
pub struct PageParams {
    /// 1-based page number.
    pub page: i64,
    pub limit: i64,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionDto {
    pub question_id: QuestionId,
    pub question: String,
    pub correct_ans: String,
    pub wrong_ans: String,
    pub explanation: String,
}

impl From<Question> for QuestionDto {
    fn from(q: Question) -> Self {
        Self {
            question_id: q.question_id,
            question: q.question,
            correct_ans: q.correct_ans,
            wrong_ans: q.wrong_ans,
            explanation: q.explanation,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuestionListResponse {
    pub questions: Vec<QuestionDto>,
    /// Number of questions in this page.
    pub total: usize,
}

/// Row offset of a 1-based page, or `None` when the page is out of range.
fn page_offset(params: &PageParams) -> Option<i64> {
    if params.page < 1 || params.limit < 1 || params.limit > MAX_PAGE_SIZE {
        return None;
    }
    (params.page - 1).checked_mul(params.limit)
}

/// GET /api/questions - Page through the catalog
#[utoipa::path(
    get,
    path = "/api/questions",
    params(PageParams),
    responses(
        (status = 200, description = "A page of questions", body = QuestionListResponse),
        (status = 400, description = "Invalid page or limit")
    )
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let offset = page_offset(&params).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("page must be >= 1 and limit within 1..={}", MAX_PAGE_SIZE),
        )
    })?;
    let questions = state
        .questions
        .list_questions(offset, params.limit)
        .await
        .map_err(|e| {
            error!("Failed to list questions: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list questions".to_string())
        })?;

    let questions: Vec<QuestionDto> = questions.into_iter().map(QuestionDto::from).collect();
    Ok(Json(QuestionListResponse {
        total: questions.len(),
        questions,
    }))
}

/// GET /api/questions/{question_id} - Fetch one question
#[utoipa::path(
    get,
    path = "/api/questions/{question_id}",
    params(("question_id" = i32, Path, description = "Catalog id of the question")),
    responses(
        (status = 200, description = "The question", body = QuestionDto),
        (status = 404, description = "Unknown question")
    )
)]
pub async fn get_question_handler(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<QuestionId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = state
        .questions
        .get_question(question_id)
        .await
        .map_err(question_lookup_error)?;
    Ok(Json(QuestionDto::from(question)))
}

/// Maps a catalog lookup failure onto a response.
pub fn question_lookup_error(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        other => {
            error!("Failed to load question: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load question".to_string())
        }
    }
}
