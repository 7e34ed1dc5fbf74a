//! Membership, XP event and leaderboard row types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rules::XpEventType;
use super::tier::LeagueTier;

/// A user's standing in one season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub season_id: Uuid,
    pub league_tier: LeagueTier,
    pub points: i64,
    /// Positional rank from the last refresh; `None` until ranks are computed
    pub rank: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: String, season_id: Uuid, league_tier: LeagueTier) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            season_id,
            league_tier,
            points: 0,
            rank: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpEvent {
    pub id: Uuid,
    pub user_id: String,
    pub season_id: Uuid,
    pub event_type: XpEventType,
    pub points: i64,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl XpEvent {
    /// Points are copied from the rule table now, not looked up later
    pub fn new(
        user_id: String,
        season_id: Uuid,
        event_type: XpEventType,
        meta: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            season_id,
            event_type,
            points: event_type.points(),
            meta,
            created_at: Utc::now(),
        }
    }
}

/// Row of the leaderboard view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub points: i64,
    pub rank: u32,
    pub league: LeagueTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLeagueStats {
    pub user_id: String,
    pub season_id: Uuid,
    pub league: LeagueTier,
    pub points: i64,
    /// `None` when the user has no membership in the current season
    pub rank: Option<u32>,
}

/// A tier change decided at season close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierChange {
    pub user_id: String,
    pub from: LeagueTier,
    pub to: LeagueTier,
}
