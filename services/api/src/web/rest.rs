//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the service's
//! liveness endpoint.

use axum::response::{IntoResponse, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{auth, questions, recommendations, study};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        auth::google_login_handler,
        auth::verify_handler,
        auth::logout_handler,
        auth::test_session_handler,
        questions::list_questions_handler,
        questions::get_question_handler,
        study::submit_answer_handler,
        study::history_handler,
        study::user_stats_handler,
        study::question_stats_handler,
        recommendations::begin_handler,
        recommendations::resolve_handler,
        recommendations::resolve_query_handler,
    ),
    components(
        schemas(
            RootResponse,
            auth::GoogleLoginRequest,
            auth::SessionTokenRequest,
            auth::AuthResponse,
            auth::VerifyResponse,
            auth::LogoutResponse,
            questions::QuestionDto,
            questions::QuestionListResponse,
            study::SubmitAnswerRequest,
            study::SubmitAnswerResponse,
            study::HistoryRequest,
            study::StudyEventDto,
            study::HistoryResponse,
            study::UserStatsResponse,
            study::QuestionStatDto,
            study::QuestionStatsResponse,
            recommendations::BeginResponse,
            recommendations::ResolveRequest,
            recommendations::RecommendedQuestionDto,
            recommendations::ResolveResponse,
        )
    ),
    tags(
        (name = "Narat API", description = "Study backend: login, questions, answer logs and personalized recommendations.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Liveness
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    success: String,
}

/// GET / - Liveness probe
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service is up", body = RootResponse))
)]
pub async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        success: "true".to_string(),
    })
}
