//! Authentication endpoints
//!
//! - GET /login - login form
//! - POST /login - credential check, session cookie, redirect by role
//! - GET|POST /logout - end the session
//! - POST /profile/password - change password (requires session)

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::middleware::{
    extract_session_token, redirect_clearing_cookie, session_cookie, AppState, CurrentSession,
};
use crate::models::ClientInfo;
use crate::services::{AuthError, LoginCredentials};

/// Public routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout).post(logout))
}

/// Routes that need a session
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/profile/password", post(change_password))
}

/// Status flags shown above the login form
#[derive(Debug, Default, Deserialize)]
pub struct LoginPageQuery {
    pub error: Option<String>,
    pub expired: Option<String>,
    pub logged_out: Option<String>,
}

impl LoginPageQuery {
    /// Fixed message for the flags; query text is never echoed
    fn message(&self) -> Option<&'static str> {
        if let Some(code) = self.error.as_deref() {
            return Some(match code {
                "credentials" => "Invalid username or password.",
                "validation" => {
                    "Username must be 3-50 characters and password at least 6 characters."
                }
                _ => "Login failed, please try again.",
            });
        }
        if self.expired.is_some() {
            return Some("Your session has expired. Please log in again.");
        }
        if self.logged_out.is_some() {
            return Some("You have been logged out.");
        }
        None
    }
}

const LOGIN_FORM: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Rollcall - Login</title></head>
<body>
<main>
<h1>Rollcall</h1>
{{message}}
<form method="post" action="/login">
<label>Username <input type="text" name="username" minlength="3" maxlength="50" required autofocus></label>
<label>Password <input type="password" name="password" minlength="6" required></label>
<button type="submit">Log in</button>
</form>
</main>
</body>
</html>
"#;

/// GET /login
async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginPageQuery>,
) -> Response {
    let token = extract_session_token(&headers, &state.session_config.cookie_name);
    if token.is_some() {
        match state.guard.require_session(token.as_deref()).await {
            Ok(session) => return Redirect::to(session.role.landing_route()).into_response(),
            Err(AuthError::Internal(e)) => {
                tracing::error!("Session lookup failed on login page: {:#}", e);
            }
            Err(_) => {}
        }
    }

    let message = query
        .message()
        .map(|text| format!(r#"<p class="notice">{}</p>"#, text))
        .unwrap_or_default();
    Html(LOGIN_FORM.replace("{{message}}", &message)).into_response()
}

/// Login form body. Missing fields read as empty and fail validation.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let credentials = match LoginCredentials::new(form.username, form.password).validate() {
        Ok(credentials) => credentials,
        Err(_) => return Redirect::to("/login?error=validation").into_response(),
    };

    let login = match state.auth_service.authenticate(&credentials, &client).await {
        Ok(login) => login,
        Err(AuthError::InvalidCredentials) => {
            return Redirect::to("/login?error=credentials").into_response()
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            return Redirect::to("/login?error=server").into_response();
        }
    };

    // Whatever token the client held before is dropped so it cannot be reused
    let previous = extract_session_token(&headers, &state.session_config.cookie_name);
    if previous.as_deref() != Some(login.session.id.as_str()) {
        if let Err(e) = state.auth_service.logout(previous.as_deref()).await {
            tracing::warn!("Failed to discard previous session: {}", e);
        }
    }

    (
        [(
            header::SET_COOKIE,
            session_cookie(&state.session_config, &login.session.id),
        )],
        Redirect::to(login.user.role.landing_route()),
    )
        .into_response()
}

/// GET|POST /logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = extract_session_token(&headers, &state.session_config.cookie_name);
    if let Err(e) = state.auth_service.logout(token.as_deref()).await {
        tracing::error!("Logout failed: {}", e);
    }
    redirect_clearing_cookie(&state.session_config, "/login?logged_out=1")
}

/// Form body for a password change
#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// POST /profile/password
async fn change_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    let landing = session.role.landing_route();
    let back = |notice: &str| Redirect::to(&format!("{}?notice={}", landing, notice)).into_response();

    if form.new_password != form.confirm_password {
        return back("password_mismatch");
    }

    match state
        .auth_service
        .change_password(&session, &form.current_password, &form.new_password)
        .await
    {
        Ok(fresh) => (
            [(header::SET_COOKIE, session_cookie(&state.session_config, &fresh.id))],
            Redirect::to(&format!("{}?notice=password_changed", landing)),
        )
            .into_response(),
        Err(AuthError::InvalidCredentials) => back("password_invalid"),
        Err(AuthError::Validation(_)) => back("password_too_short"),
        Err(AuthError::NotAuthenticated) => {
            redirect_clearing_cookie(&state.session_config, "/login")
        }
        Err(e) => {
            tracing::error!(user_id = session.user_id, "Password change failed: {}", e);
            back("password_error")
        }
    }
}
