//! HTTP API for the league service
//!
//! Provides REST APIs for:
//! - XP intake and league reads (`/league`)
//! - Operator season close (admin key)
//! - Security middleware (admin auth, headers, size limits, logging)

pub mod league;
pub mod middleware;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use league::{create_league_router, LeagueApiState};
pub use middleware::{
    admin_auth_middleware, body_size_middleware, logging_middleware, security_headers_middleware,
    SecurityConfig, SecurityState,
};

/// Full application router with middleware layers applied
pub fn create_app(state: LeagueApiState, security: SecurityState) -> Router {
    Router::new()
        .nest("/league", create_league_router(state, security.clone()))
        .route("/health", get(|| async { "OK" }))
        .layer(axum_middleware::from_fn_with_state(
            security.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security,
            logging_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
