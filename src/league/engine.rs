//! League Engine - wires the components over one store
//!
//! This is what the HTTP layer and the scheduler hold on to.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::LeagueStore;
use crate::error::LeagueResult;
use crate::retry::RetryPolicy;

use super::leaderboard::LeaderboardQuery;
use super::ledger::{RecordOutcome, XpLedger};
use super::manager::{RolloverOutcome, SeasonManager, SeasonSettings};
use super::membership::{LeaderboardEntry, UserLeagueStats, XpEvent};
use super::season::Season;
use super::verification::VerificationStatus;

pub struct LeagueEngine {
    seasons: Arc<SeasonManager>,
    ledger: XpLedger,
    leaderboard: LeaderboardQuery,
}

impl LeagueEngine {
    pub fn new(store: Arc<dyn LeagueStore>, settings: SeasonSettings, retry: RetryPolicy) -> Self {
        let seasons = Arc::new(SeasonManager::new(store.clone(), settings, retry.clone()));
        Self {
            ledger: XpLedger::new(store.clone(), seasons.clone(), retry.clone()),
            leaderboard: LeaderboardQuery::new(store, seasons.clone(), retry),
            seasons,
        }
    }

    pub fn seasons(&self) -> &Arc<SeasonManager> {
        &self.seasons
    }

    pub async fn bootstrap(&self, now: DateTime<Utc>) -> LeagueResult<Season> {
        self.seasons.bootstrap(now).await
    }

    pub async fn current_season(&self) -> LeagueResult<Season> {
        self.seasons.current_season().await
    }

    pub async fn record_xp_event(
        &self,
        user_id: &str,
        event_type: &str,
        meta: serde_json::Value,
        verification: Option<&VerificationStatus>,
    ) -> RecordOutcome {
        self.ledger.record(user_id, event_type, meta, verification).await
    }

    pub async fn record_xp_event_in(
        &self,
        season: &Season,
        user_id: &str,
        event_type: &str,
        meta: serde_json::Value,
        verification: Option<&VerificationStatus>,
    ) -> RecordOutcome {
        self.ledger
            .record_event(season, user_id, event_type, meta, verification)
            .await
    }

    pub async fn get_current_leaderboard(&self, limit: Option<u32>) -> LeagueResult<Vec<LeaderboardEntry>> {
        self.leaderboard.get_current_leaderboard(limit).await
    }

    pub async fn get_season_leaderboard(
        &self,
        season_id: Uuid,
        limit: Option<u32>,
    ) -> LeagueResult<Vec<LeaderboardEntry>> {
        self.leaderboard.get_season_leaderboard(season_id, limit).await
    }

    pub async fn get_user_league_stats(&self, user_id: &str) -> LeagueResult<UserLeagueStats> {
        self.leaderboard.get_user_league_stats(user_id).await
    }

    pub async fn get_user_xp_events(&self, user_id: &str, limit: Option<u32>) -> LeagueResult<Vec<XpEvent>> {
        self.leaderboard.get_user_xp_events(user_id, limit).await
    }

    pub async fn close_season_and_roll(&self) -> LeagueResult<RolloverOutcome> {
        self.seasons.close_season_and_roll().await
    }

    pub async fn close_season(&self, season_id: Uuid) -> LeagueResult<RolloverOutcome> {
        self.seasons.close_season(season_id, Utc::now()).await
    }
}
