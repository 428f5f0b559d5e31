//! API layer - HTTP handlers and routing
//!
//! - Login, logout and password change (`auth`)
//! - Role landing pages and `/api/me` (`dashboard`)
//! - Session and role guards (`middleware`)

pub mod auth;
pub mod dashboard;
pub mod middleware;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::models::Role;

pub use middleware::{ApiError, AppState, CurrentSession};

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const TEACHING_STAFF: &[Role] = &[Role::Admin, Role::Teacher];

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let admin_routes = dashboard::admin_router()
        .route_layer(axum_middleware::from_fn_with_state(
            ADMIN_ONLY,
            middleware::require_role,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let teacher_routes = dashboard::teacher_router()
        .route_layer(axum_middleware::from_fn_with_state(
            TEACHING_STAFF,
            middleware::require_role,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    // Any signed-in role
    let protected_routes = dashboard::router()
        .merge(auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let api_routes = dashboard::api_router().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::require_api_session,
    ));

    Router::new()
        .route("/", get(dashboard::index))
        .merge(auth::router())
        .merge(admin_routes)
        .merge(teacher_routes)
        .merge(protected_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
