//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: login through the identity provider, session
//! verification and logout.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use narat_core::domain::Session;
use narat_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::web::state::AppState;

/// Email of the account `test_session_create` logs in as.
pub const TEST_USER_EMAIL: &str = "test@test.com";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GoogleLoginRequest {
    /// ID token issued by Google Sign-In.
    pub access_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SessionTokenRequest {
    pub session_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub session_token: String,
    pub display_name: String,
    pub study_level: i32,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub is_valid: bool,
    pub display_name: String,
    pub study_level: i32,
}

#[derive(Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}

//=========================================================================================
// Session Guard
//=========================================================================================

/// Resolves a session token for an authenticated action. Unknown tokens are 403.
pub async fn require_session(
    state: &AppState,
    token: &str,
) -> Result<Session, (StatusCode, String)> {
    state.sessions.resolve_session(token).await.map_err(|e| match e {
        PortError::Unauthorized => (StatusCode::FORBIDDEN, "Invalid session token".to_string()),
        other => {
            error!("Failed to resolve session: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to resolve session".to_string(),
            )
        }
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/google - Login with a Google ID token
#[utoipa::path(
    post,
    path = "/api/auth/google",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid token or token payload"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn google_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Verify the token with the identity provider
    let identity = state
        .identity
        .verify_token(&req.access_token)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized => (StatusCode::BAD_REQUEST, "Invalid token".to_string()),
            PortError::NotFound(_) => {
                (StatusCode::BAD_REQUEST, "Invalid token payload".to_string())
            }
            other => {
                error!("Failed to verify ID token: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to verify token".to_string(),
                )
            }
        })?;

    // 2. Create the user on first login, otherwise bump last_login
    let user = state
        .users
        .record_login(&identity.email, &identity.name)
        .await
        .map_err(|e| {
            error!("Failed to record login: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record login".to_string())
        })?;

    // 3. Issue a session
    let session = state.sessions.create_session(user.user_id).await.map_err(|e| {
        error!("Failed to create session: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
    })?;
    info!(user_id = %user.user_id, "User logged in");

    Ok(Json(AuthResponse {
        session_token: session.token,
        display_name: user.display_name,
        study_level: user.study_level,
    }))
}

/// POST /api/auth/verify - Check that a session token is still valid
#[utoipa::path(
    post,
    path = "/api/auth/verify",
    request_body = SessionTokenRequest,
    responses(
        (status = 200, description = "Session is valid", body = VerifyResponse),
        (status = 400, description = "Invalid session token")
    )
)]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .resolve_session(&req.session_token)
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid session token".to_string()))?;

    let user = state.users.get_user(session.user_id).await.map_err(|e| {
        error!("Session {} has no owner: {:?}", session.token, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load user".to_string())
    })?;

    Ok(Json(VerifyResponse {
        is_valid: true,
        display_name: user.display_name,
        study_level: user.study_level,
    }))
}

/// POST /api/auth/logout - Invalidate a session token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = SessionTokenRequest,
    responses(
        (status = 200, description = "Logout successful", body = LogoutResponse),
        (status = 400, description = "Invalid session token")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .sessions
        .delete_session(&req.session_token)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized => {
                (StatusCode::BAD_REQUEST, "Invalid session token".to_string())
            }
            other => {
                error!("Failed to delete session: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
            }
        })?;

    Ok(Json(LogoutResponse { success: true }))
}

/// POST /api/auth/test_session_create - Issue a session for the test account
///
/// Only available when `TEST_SESSION_TOKEN` is configured and matches.
#[utoipa::path(
    post,
    path = "/api/auth/test_session_create",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Session created", body = AuthResponse),
        (status = 400, description = "Invalid environment or test user missing")
    )
)]
pub async fn test_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if state.config.test_session_token.as_deref() != Some(req.access_token.as_str()) {
        warn!("Rejected test session request");
        return Err((StatusCode::BAD_REQUEST, "Invalid environment".to_string()));
    }

    let user = state
        .users
        .get_user_by_email(TEST_USER_EMAIL)
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "User not found".to_string()))?;

    let session = state.sessions.create_session(user.user_id).await.map_err(|e| {
        error!("Failed to create test session: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
    })?;

    Ok(Json(AuthResponse {
        session_token: session.token,
        display_name: user.display_name,
        study_level: user.study_level,
    }))
}
