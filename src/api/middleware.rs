//! HTTP middleware and shared request plumbing
//!
//! Contains:
//! - `AppState` shared by all handlers
//! - `ApiError`, the JSON error body
//! - Session cookie parsing and building
//! - Guards: `require_session` (browser, redirects), `require_api_session`
//!   (JSON 401) and `require_role`
//! - Extractors: `CurrentSession`, `ClientInfo`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::{SessionConfig, SessionStoreDriver};
use crate::db::repositories::{
    MemorySessionRepository, SessionRepository, SqlxLoginAttemptRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{ClientInfo, Role, Session};
use crate::services::{AccessGuard, AuthError, AuthService};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub guard: Arc<AccessGuard>,
    pub session_config: Arc<SessionConfig>,
}

impl AppState {
    /// Wire the stores and services. Users and login attempts always live in
    /// the database; sessions follow `session.store`.
    pub fn new(pool: DynDatabasePool, session_config: SessionConfig) -> Self {
        let session_repo: Arc<dyn SessionRepository> = match session_config.store {
            SessionStoreDriver::Database => SqlxSessionRepository::boxed(pool.clone()),
            SessionStoreDriver::Memory => MemorySessionRepository::boxed(),
        };

        let auth_service = AuthService::new(
            SqlxUserRepository::boxed(pool.clone()),
            session_repo.clone(),
            SqlxLoginAttemptRepository::boxed(pool),
        );
        let guard = AccessGuard::new(session_repo, session_config.timeout());

        Self {
            auth_service: Arc::new(auth_service),
            guard: Arc::new(guard),
            session_config: Arc::new(session_config),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::NotAuthenticated => {
                Self::unauthorized(err.to_string())
            }
            AuthError::SessionExpired => Self::new("SESSION_EXPIRED", err.to_string()),
            AuthError::Forbidden => Self::forbidden(err.to_string()),
            AuthError::Validation(msg) => Self::validation_error(msg),
            AuthError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" | "SESSION_EXPIRED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Session cookie
// ============================================================================

/// Session token from the cookie header, or a Bearer token
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    let prefix = format!("{}=", cookie_name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(config: &SessionConfig, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name, token, config.timeout_seconds
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Redirect to `location` and drop the session cookie
pub fn redirect_clearing_cookie(config: &SessionConfig, location: &str) -> Response {
    (
        [(header::SET_COOKIE, clear_session_cookie(config))],
        Redirect::to(location),
    )
        .into_response()
}

/// Re-issue the session cookie so its `Max-Age` follows activity.
///
/// Responses that already set a cookie (login, password change) keep theirs.
pub fn refresh_session_cookie(config: &SessionConfig, token: &str, response: &mut Response) {
    if response.headers().contains_key(header::SET_COOKIE) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&session_cookie(config, token)) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Session validated by the guard middleware
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Browser guard: anonymous or expired requests are sent to the login page.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers(), &state.session_config.cookie_name);

    match state.guard.require_session(token.as_deref()).await {
        Ok(session) => {
            let token = session.id.clone();
            request.extensions_mut().insert(CurrentSession(session));
            let mut response = next.run(request).await;
            refresh_session_cookie(&state.session_config, &token, &mut response);
            response
        }
        Err(AuthError::SessionExpired) => {
            redirect_clearing_cookie(&state.session_config, "/login?expired=1")
        }
        Err(AuthError::NotAuthenticated) => {
            if token.is_some() {
                redirect_clearing_cookie(&state.session_config, "/login")
            } else {
                Redirect::to("/login").into_response()
            }
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// API guard: same checks, answered with a JSON 401.
pub async fn require_api_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers(), &state.session_config.cookie_name);
    let session = state.guard.require_session(token.as_deref()).await?;
    let token = session.id.clone();

    request.extensions_mut().insert(CurrentSession(session));
    let mut response = next.run(request).await;
    refresh_session_cookie(&state.session_config, &token, &mut response);
    Ok(response)
}

/// Role guard. Must run inside `require_session`.
pub async fn require_role(
    State(allowed): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Response {
    let Some(CurrentSession(session)) = request.extensions().get::<CurrentSession>() else {
        return Redirect::to("/login").into_response();
    };

    if !AccessGuard::has_role(session, allowed) {
        tracing::warn!(
            user_id = session.user_id,
            role = %session.role,
            path = %request.uri().path(),
            "Access denied for role"
        );
        return Redirect::to("/dashboard?notice=forbidden").into_response();
    }

    next.run(request).await
}

// ============================================================================
// Client info
// ============================================================================

/// Best-effort source address: proxy headers first, then the socket peer
pub fn extract_ip_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(ip.to_string());
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientInfo {
            ip_address: extract_ip_address(&parts.headers, peer),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> SessionConfig {
        SessionConfig::default()
    }

    #[test]
    fn test_extract_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; rollcall_session=abc-123; lang=id"),
        );
        assert_eq!(
            extract_session_token(&headers, "rollcall_session").as_deref(),
            Some("abc-123")
        );
        assert_eq!(extract_session_token(&headers, "other"), None);
    }

    #[test]
    fn test_extract_token_ignores_empty_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("rollcall_session="));
        assert_eq!(extract_session_token(&headers, "rollcall_session"), None);
    }

    #[test]
    fn test_extract_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(
            extract_session_token(&headers, "rollcall_session").as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie(&config(), "tok");
        assert_eq!(
            cookie,
            "rollcall_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=7200"
        );

        let secure = SessionConfig {
            cookie_secure: true,
            ..config()
        };
        assert!(session_cookie(&secure, "tok").ends_with("; Secure"));
        assert!(clear_session_cookie(&secure).contains("Max-Age=0"));
    }

    #[test]
    fn test_refresh_keeps_existing_cookie() {
        let mut response = Redirect::to("/dashboard").into_response();
        refresh_session_cookie(&config(), "tok", &mut response);
        assert_eq!(
            response.headers().get(header::SET_COOKIE).unwrap(),
            "rollcall_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=7200"
        );

        let mut response = redirect_clearing_cookie(&config(), "/login");
        refresh_session_cookie(&config(), "tok", &mut response);
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_extract_ip_address_order() {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(extract_ip_address(&headers, Some(peer)).as_deref(), Some("127.0.0.1"));
        assert_eq!(extract_ip_address(&headers, None), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_ip_address(&headers, Some(peer)).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_ip_address(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_api_error_from_auth_error() {
        let err = ApiError::from(AuthError::Forbidden);
        assert_eq!(err.error.code, "FORBIDDEN");

        let err = ApiError::from(AuthError::Validation("too short".to_string()));
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.message, "too short");

        let err = ApiError::from(AuthError::Internal(anyhow::anyhow!("db down")));
        assert_eq!(err.error.message, "Internal server error");
    }
}
