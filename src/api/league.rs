//! League API Endpoints
//!
//! XP intake for the marketplace services, read endpoints for the
//! leaderboard UI, and an operator endpoint to force a season close.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::middleware::{admin_auth_middleware, SecurityState};
use crate::error::LeagueError;
use crate::league::{
    LeaderboardEntry, LeagueEngine, LeagueTier, LeagueTierInfo, RecordOutcome, RolloverOutcome,
    Season, UserLeagueStats, VerificationStatus, XpEvent,
};

/// API state for league endpoints
#[derive(Clone)]
pub struct LeagueApiState {
    pub engine: Arc<LeagueEngine>,
}

type ApiError = (StatusCode, String);

fn api_error(e: LeagueError) -> ApiError {
    let status = match &e {
        LeagueError::Validation(_) => StatusCode::BAD_REQUEST,
        LeagueError::Storage(s) if s.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        LeagueError::Storage(_) | LeagueError::Consistency(_) => {
            error!("League request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// Request / response types

#[derive(Debug, Deserialize)]
pub struct RecordXpRequest {
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub meta: serde_json::Value,
    /// Compliance facts; omitted when the caller already gated the user
    pub verification: Option<VerificationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CloseSeasonQuery {
    /// Force-close this season; without it only a due season is closed
    pub season_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub season_id: Uuid,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct XpEventsResponse {
    pub user_id: String,
    pub total: usize,
    pub events: Vec<XpEvent>,
}

// Endpoints

/// POST /league/xp-events - Record an XP-earning action
///
/// Always 202: accrual never fails the caller's business action, the body
/// says what happened.
pub async fn record_xp_event(
    State(state): State<LeagueApiState>,
    Json(payload): Json<RecordXpRequest>,
) -> (StatusCode, Json<RecordOutcome>) {
    let outcome = state
        .engine
        .record_xp_event(
            &payload.user_id,
            &payload.event_type,
            payload.meta,
            payload.verification.as_ref(),
        )
        .await;
    (StatusCode::ACCEPTED, Json(outcome))
}

/// GET /league/leaderboard - Current season leaderboard
pub async fn get_leaderboard(
    State(state): State<LeagueApiState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let season = state.engine.current_season().await.map_err(api_error)?;
    let entries = state
        .engine
        .get_season_leaderboard(season.id, query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(LeaderboardResponse {
        season_id: season.id,
        entries,
    }))
}

/// GET /league/seasons/{season_id}/leaderboard - Leaderboard of any season
pub async fn get_season_leaderboard(
    State(state): State<LeagueApiState>,
    Path(season_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let entries = state
        .engine
        .get_season_leaderboard(season_id, query.limit)
        .await
        .map_err(|e| match e {
            LeagueError::Validation(msg) => (StatusCode::NOT_FOUND, msg),
            other => api_error(other),
        })?;
    Ok(Json(LeaderboardResponse { season_id, entries }))
}

/// GET /league/users/{user_id}/stats
pub async fn get_user_stats(
    State(state): State<LeagueApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserLeagueStats>, ApiError> {
    state
        .engine
        .get_user_league_stats(&user_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /league/users/{user_id}/events - Newest first
pub async fn get_user_events(
    State(state): State<LeagueApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<XpEventsResponse>, ApiError> {
    let events = state
        .engine
        .get_user_xp_events(&user_id, query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(XpEventsResponse {
        user_id,
        total: events.len(),
        events,
    }))
}

/// GET /league/season
pub async fn get_current_season(
    State(state): State<LeagueApiState>,
) -> Result<Json<Season>, ApiError> {
    state.engine.current_season().await.map(Json).map_err(api_error)
}

/// GET /league/tiers
pub async fn get_tiers() -> Json<Vec<LeagueTierInfo>> {
    Json(LeagueTier::ALL.iter().copied().map(LeagueTierInfo::from).collect())
}

/// POST /league/seasons/close - Operator close (admin key required)
pub async fn close_season(
    State(state): State<LeagueApiState>,
    Query(query): Query<CloseSeasonQuery>,
) -> Result<Json<RolloverOutcome>, ApiError> {
    let outcome = match query.season_id {
        Some(season_id) => state.engine.close_season(season_id).await,
        None => state.engine.close_season_and_roll().await,
    };
    outcome.map(Json).map_err(api_error)
}

/// Create the league API router
pub fn create_league_router(state: LeagueApiState, security: SecurityState) -> Router {
    let admin = Router::new()
        .route("/seasons/close", post(close_season))
        .route_layer(middleware::from_fn_with_state(security, admin_auth_middleware))
        .with_state(state.clone());

    Router::new()
        .route("/xp-events", post(record_xp_event))
        .route("/leaderboard", get(get_leaderboard))
        .route("/seasons/{season_id}/leaderboard", get(get_season_leaderboard))
        .route("/users/{user_id}/stats", get(get_user_stats))
        .route("/users/{user_id}/events", get(get_user_events))
        .route("/season", get(get_current_season))
        .route("/tiers", get(get_tiers))
        .with_state(state)
        .merge(admin)
}
