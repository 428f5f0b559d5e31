//! HTTP-level tests for login, logout, role guards and session expiry.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use rollcall::api::{build_router, AppState};
use rollcall::config::{SessionConfig, SessionStoreDriver};
use rollcall::db::repositories::{
    SessionRepository, SqlxSessionRepository, SqlxUserRepository, UserRepository,
};
use rollcall::db::{create_test_pool, migrations, DynDatabasePool};
use rollcall::models::{Role, UserRecord};
use rollcall::services::hash_password;

const COOKIE: &str = "rollcall_session";

struct TestApp {
    router: Router,
    pool: DynDatabasePool,
}

async fn setup_with(session_config: SessionConfig) -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let state = AppState::new(pool.clone(), session_config);
    state
        .auth_service
        .bootstrap_admin("admin", "secret1", "Administrator")
        .await
        .expect("Failed to create admin");

    let users = SqlxUserRepository::new(pool.clone());
    for (username, role) in [("guru1", Role::Teacher), ("staff1", Role::Staff)] {
        users
            .create(&UserRecord::new(
                username.to_string(),
                hash_password("secret1").unwrap(),
                format!("{} name", username),
                role,
            ))
            .await
            .expect("Failed to create user");
    }

    TestApp {
        router: build_router(state),
        pool,
    }
}

async fn setup() -> TestApp {
    setup_with(SessionConfig::default()).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    async fn login(&self, username: &str, password: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(format!("username={}&password={}", username, password)))
            .unwrap();
        self.send(request).await
    }

    async fn login_token(&self, username: &str) -> String {
        let response = self.login(username, "secret1").await;
        session_token(&response).expect("login should set a session cookie")
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("{}={}", COOKIE, token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn session_token(response: &Response) -> Option<String> {
    let cookie = set_cookie(response)?;
    let value = cookie
        .split(';')
        .next()?
        .strip_prefix(&format!("{}=", COOKIE))?
        .to_string();
    (!value.is_empty()).then_some(value)
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn admin_login_redirects_to_admin_dashboard() {
    let app = setup().await;

    let response = app.login("admin", "secret1").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/dashboard");

    let cookie = set_cookie(&response).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=7200"));

    let token = session_token(&response).unwrap();
    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["dashboard"], "admin");
    assert_eq!(body["session"]["username"], "admin");
    assert_eq!(body["session"]["role"], "admin");
}

#[tokio::test]
async fn login_redirects_by_role() {
    let app = setup().await;

    let response = app.login("guru1", "secret1").await;
    assert_eq!(location(&response), "/teacher/dashboard");

    let response = app.login("staff1", "secret1").await;
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn teacher_is_sent_away_from_admin_pages() {
    let app = setup().await;
    let token = app.login_token("guru1").await;

    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard?notice=forbidden");

    let response = app.get("/teacher/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/dashboard?notice=forbidden", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["notice"], "forbidden");
}

#[tokio::test]
async fn admin_may_open_teacher_pages_but_staff_may_not() {
    let app = setup().await;

    let admin = app.login_token("admin").await;
    let response = app.get("/teacher/dashboard", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let staff = app.login_token("staff1").await;
    let response = app.get("/teacher/dashboard", Some(&staff)).await;
    assert_eq!(location(&response), "/dashboard?notice=forbidden");
}

#[tokio::test]
async fn bad_credentials_look_the_same() {
    let app = setup().await;

    let wrong_password = app.login("admin", "wrongpw").await;
    let unknown_user = app.login("nobody", "secret1").await;

    for response in [&wrong_password, &unknown_user] {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(response), "/login?error=credentials");
        assert!(set_cookie(response).is_none());
    }
}

#[tokio::test]
async fn invalid_form_input_is_rejected_before_lookup() {
    let app = setup().await;

    let response = app.login("ab", "secret1").await;
    assert_eq!(location(&response), "/login?error=validation");

    let response = app.login("admin", "12345").await;
    assert_eq!(location(&response), "/login?error=validation");
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login() {
    let app = setup().await;

    let response = app.get("/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = app.get("/admin/dashboard", Some("forged-token")).await;
    assert_eq!(location(&response), "/login");

    let response = app.get("/", None).await;
    assert_eq!(location(&response), "/login");

    let response = app.get("/api/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = setup().await;
    let token = app.login_token("admin").await;

    let logout = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, format!("{}={}", COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(logout).await;
    assert_eq!(location(&response), "/login?logged_out=1");
    assert!(set_cookie(&response).unwrap().contains("Max-Age=0"));

    let response = app.get("/dashboard", Some(&token)).await;
    assert_eq!(location(&response), "/login");

    // Repeating the logout is harmless
    let response = app.get("/logout", Some(&token)).await;
    assert_eq!(location(&response), "/login?logged_out=1");
    let response = app.get("/logout", None).await;
    assert_eq!(location(&response), "/login?logged_out=1");
}

#[tokio::test]
async fn idle_session_expires() {
    let app = setup().await;
    let token = app.login_token("admin").await;

    let sessions = SqlxSessionRepository::new(app.pool.clone());
    let mut session = sessions.get(&token).await.unwrap().unwrap();
    session.last_activity = Utc::now() - Duration::seconds(7201);
    sessions.put(&session).await.unwrap();

    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?expired=1");
    assert!(sessions.get(&token).await.unwrap().is_none());

    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn protected_access_refreshes_activity() {
    let app = setup().await;
    let token = app.login_token("guru1").await;

    let sessions = SqlxSessionRepository::new(app.pool.clone());
    let mut session = sessions.get(&token).await.unwrap().unwrap();
    session.last_activity = Utc::now() - Duration::seconds(3600);
    sessions.put(&session).await.unwrap();

    let before = Utc::now();
    let response = app.get("/teacher/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let refreshed = sessions.get(&token).await.unwrap().unwrap();
    assert!(refreshed.last_activity >= before);
}

#[tokio::test]
async fn me_returns_user_without_hash() {
    let app = setup().await;
    let token = app.login_token("guru1").await;

    let response = app.get("/api/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["username"], "guru1");
    assert_eq!(body["role"], "teacher");
    assert!(body.get("password_hash").is_none());
    assert!(!body["last_login_at"].is_null());
}

#[tokio::test]
async fn login_page_and_root_follow_session_state() {
    let app = setup().await;

    let response = app.get("/login?expired=1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&bytes);
    assert!(html.contains("<form method=\"post\" action=\"/login\">"));
    assert!(html.contains("expired"));

    let token = app.login_token("guru1").await;
    let response = app.get("/login", Some(&token)).await;
    assert_eq!(location(&response), "/teacher/dashboard");
    let response = app.get("/", Some(&token)).await;
    assert_eq!(location(&response), "/teacher/dashboard");
}

#[tokio::test]
async fn relogin_replaces_previous_token() {
    let app = setup().await;
    let first = app.login_token("admin").await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("{}={}", COOKIE, first))
        .body(Body::from("username=admin&password=secret1"))
        .unwrap();
    let response = app.send(request).await;
    let second = session_token(&response).unwrap();

    assert_ne!(first, second);
    let response = app.get("/admin/dashboard", Some(&first)).await;
    assert_eq!(location(&response), "/login");
    let response = app.get("/admin/dashboard", Some(&second)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn password_change_rotates_the_cookie() {
    let app = setup().await;
    let token = app.login_token("staff1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/profile/password")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("{}={}", COOKIE, token))
        .body(Body::from(
            "current_password=secret1&new_password=secret2&confirm_password=secret2",
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(location(&response), "/dashboard?notice=password_changed");
    let fresh = session_token(&response).unwrap();
    assert_ne!(fresh, token);

    let response = app.get("/dashboard", Some(&token)).await;
    assert_eq!(location(&response), "/login");
    let response = app.get("/dashboard", Some(&fresh)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.login("staff1", "secret2").await;
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn password_change_requires_matching_confirmation() {
    let app = setup().await;
    let token = app.login_token("staff1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/profile/password")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("{}={}", COOKIE, token))
        .body(Body::from(
            "current_password=secret1&new_password=secret2&confirm_password=secret3",
        ))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(location(&response), "/dashboard?notice=password_mismatch");
    assert_eq!(session_token(&response).as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn memory_session_store_serves_the_same_flow() {
    let app = setup_with(SessionConfig {
        store: SessionStoreDriver::Memory,
        ..SessionConfig::default()
    })
    .await;

    let token = app.login_token("admin").await;
    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Nothing was written to the sessions table
    let sessions = SqlxSessionRepository::new(app.pool.clone());
    assert!(sessions.get(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn active_requests_extend_the_cookie() {
    let app = setup().await;
    let token = app.login_token("admin").await;

    let response = app.get("/admin/dashboard", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response).expect("guarded response should refresh the cookie");
    assert!(cookie.contains("Max-Age=7200"));
    assert!(cookie.contains("HttpOnly"));
    assert_eq!(session_token(&response).as_deref(), Some(token.as_str()));

    let response = app.get("/api/me", Some(&token)).await;
    assert_eq!(session_token(&response).as_deref(), Some(token.as_str()));

    // Rejections never re-issue a cookie for the presented token
    let response = app.get("/admin/dashboard", Some("forged-token")).await;
    assert!(session_token(&response).is_none());
}

#[tokio::test]
async fn missing_form_fields_are_a_validation_error() {
    let app = setup().await;

    for body in ["username=admin", "password=secret1", ""] {
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "body {:?}", body);
        assert_eq!(location(&response), "/login?error=validation");
    }
}

#[tokio::test]
async fn admin_sees_failed_login_attempts() {
    let app = setup().await;
    app.login("admin", "wrongpw").await;
    app.login("nobody", "secret1").await;

    let admin = app.login_token("admin").await;
    let response = app.get("/admin/login-attempts", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let attempts = body.as_array().expect("attempts should be a list");
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a["ip_address"] == "203.0.113.9"));
    let usernames: Vec<_> = attempts.iter().map(|a| a["username"].as_str()).collect();
    assert!(usernames.contains(&Some("admin")));
    assert!(usernames.contains(&Some("nobody")));

    let teacher = app.login_token("guru1").await;
    let response = app.get("/admin/login-attempts", Some(&teacher)).await;
    assert_eq!(location(&response), "/dashboard?notice=forbidden");
}

#[tokio::test]
async fn store_outage_is_not_reported_as_logout() {
    let app = setup().await;
    let token = app.login_token("admin").await;

    app.pool.close().await;

    let response = app.get("/", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn logout_during_refresh_keeps_the_session_dead() {
    let app = setup().await;
    let token = app.login_token("admin").await;

    let sessions = SqlxSessionRepository::new(app.pool.clone());
    let stale_read = sessions.get(&token).await.unwrap().unwrap();

    let logout = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, format!("{}={}", COOKIE, token))
        .body(Body::empty())
        .unwrap();
    app.send(logout).await;

    // A refresh computed from the earlier read must not bring the row back
    assert!(!sessions.touch(&stale_read.id, Utc::now()).await.unwrap());
    assert!(sessions.get(&token).await.unwrap().is_none());

    let response = app.get("/dashboard", Some(&token)).await;
    assert_eq!(location(&response), "/login");
}
