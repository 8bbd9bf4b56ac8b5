//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::ServiceState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use eduquest_core::domain::{Profile, QuizResult, Role, Session};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_quiz_results_handler,
        list_students_handler,
    ),
    components(
        schemas(HealthResponse, QuizResultResponse, StudentResponse)
    ),
    tags(
        (name = "EduQuest API", description = "REST endpoints alongside the /ws session channel.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// One completed quiz, as stored.
#[derive(Serialize, ToSchema)]
pub struct QuizResultResponse {
    id: Uuid,
    student_profile_id: Uuid,
    quiz_ref: String,
    score: i32,
    total_points: i32,
    coins_earned: u32,
    badge: String,
    completed_at: DateTime<Utc>,
}

impl From<QuizResult> for QuizResultResponse {
    fn from(result: QuizResult) -> Self {
        Self {
            id: result.id,
            student_profile_id: result.student_profile_id,
            quiz_ref: result.quiz_ref,
            score: result.score,
            total_points: result.total_points,
            coins_earned: result.coins_earned,
            badge: result.badge,
            completed_at: result.completed_at,
        }
    }
}

/// A student on the roster.
#[derive(Serialize, ToSchema)]
pub struct StudentResponse {
    id: Uuid,
    name: String,
    email: String,
    class_level: Option<String>,
    school: Option<String>,
    unique_id: Option<String>,
    coins: i64,
    badges: i64,
}

impl From<Profile> for StudentResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            email: profile.email,
            class_level: profile.class_level,
            school: profile.school,
            unique_id: profile.unique_id,
            coins: profile.coins,
            badges: profile.badges,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The service is up", body = HealthResponse)
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// List a student's quiz history, newest first.
///
/// Students may only read their own history; teachers may read any student's.
#[utoipa::path(
    get,
    path = "/profiles/{profile_id}/quiz-results",
    responses(
        (status = 200, description = "Quiz results, newest first", body = [QuizResultResponse]),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "The caller may not read this history"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("profile_id" = Uuid, Path, description = "The student's profile id."),
        ("Authorization" = String, Header, description = "Bearer access token.")
    )
)]
pub async fn list_quiz_results_handler(
    State(state): State<Arc<ServiceState>>,
    Extension(session): Extension<Session>,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Vec<QuizResultResponse>>, (StatusCode, String)> {
    let caller = caller_profile(&state, &session).await?;

    if caller.role != Role::Teacher && caller.id != profile_id {
        return Err((
            StatusCode::FORBIDDEN,
            "Students may only read their own quiz history".to_string(),
        ));
    }

    let results = state
        .store
        .list_quiz_results(profile_id)
        .await
        .map_err(|e| {
            error!("Failed to list quiz results: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list quiz results".to_string(),
            )
        })?;

    Ok(Json(results.into_iter().map(QuizResultResponse::from).collect()))
}

/// List every registered student, ordered by name. Teachers only.
#[utoipa::path(
    get,
    path = "/students",
    responses(
        (status = 200, description = "The student roster", body = [StudentResponse]),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "The caller is not a teacher"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("Authorization" = String, Header, description = "Bearer access token.")
    )
)]
pub async fn list_students_handler(
    State(state): State<Arc<ServiceState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<StudentResponse>>, (StatusCode, String)> {
    let caller = caller_profile(&state, &session).await?;
    if caller.role != Role::Teacher {
        return Err((
            StatusCode::FORBIDDEN,
            "Only teachers may list students".to_string(),
        ));
    }

    let students = state
        .store
        .list_profiles(Role::Student)
        .await
        .map_err(|e| {
            error!("Failed to list students: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list students".to_string(),
            )
        })?;

    Ok(Json(students.into_iter().map(StudentResponse::from).collect()))
}

/// Loads the profile behind the bearer token, of either role.
async fn caller_profile(
    state: &ServiceState,
    session: &Session,
) -> Result<Profile, (StatusCode, String)> {
    state
        .store
        .find_profile(session.user_id, None)
        .await
        .map_err(|e| {
            error!("Failed to load caller profile: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load profile".to_string(),
            )
        })?
        .ok_or((StatusCode::FORBIDDEN, "No profile for this account".to_string()))
}
