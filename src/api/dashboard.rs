//! Landing pages
//!
//! The views themselves live outside this service; these endpoints hand the
//! view layer a JSON summary of the signed-in session.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{extract_session_token, ApiError, AppState, CurrentSession};
use crate::models::{LoginAttempt, Role, Session, User};
use crate::services::AuthError;

/// Rows shown on the login attempts page
const ATTEMPTS_PAGE_SIZE: i64 = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            username: session.username.clone(),
            full_name: session.full_name.clone(),
            role: session.role,
            login_time: session.login_time,
            last_activity: session.last_activity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub dashboard: String,
    pub session: SessionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub notice: Option<String>,
}

/// Dashboard open to every role
pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(admin_dashboard))
        .route("/admin/login-attempts", get(login_attempts))
}

pub fn teacher_router() -> Router<AppState> {
    Router::new().route("/teacher/dashboard", get(teacher_dashboard))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/api/me", get(me))
}

/// GET / - landing page for signed-in users, login otherwise
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = extract_session_token(&headers, &state.session_config.cookie_name);
    match state.guard.require_session(token.as_deref()).await {
        Ok(session) => Redirect::to(session.role.landing_route()).into_response(),
        // Logs at error level
        Err(e @ AuthError::Internal(_)) => ApiError::from(e).into_response(),
        Err(_) => Redirect::to("/login").into_response(),
    }
}

fn summary(name: &str, session: &Session, query: DashboardQuery) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        dashboard: name.to_string(),
        session: SessionSummary::from(session),
        notice: query.notice,
    })
}

async fn dashboard(
    CurrentSession(session): CurrentSession,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse> {
    summary("general", &session, query)
}

async fn admin_dashboard(
    CurrentSession(session): CurrentSession,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse> {
    summary("admin", &session, query)
}

async fn teacher_dashboard(
    CurrentSession(session): CurrentSession,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse> {
    summary("teacher", &session, query)
}

/// GET /admin/login-attempts - latest failed logins
async fn login_attempts(
    State(state): State<AppState>,
) -> Result<Json<Vec<LoginAttempt>>, ApiError> {
    let attempts = state.auth_service.recent_attempts(ATTEMPTS_PAGE_SIZE).await?;
    Ok(Json(attempts))
}

/// GET /api/me
async fn me(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<User>, ApiError> {
    let user = state.auth_service.current_user(&session).await?;
    Ok(Json(user))
}
