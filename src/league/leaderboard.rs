//! Leaderboard and per-user read paths
//!
//! Ranks returned here are live: they come from the ordered view over
//! current points, not from the ranks stored at the last season close.

use std::sync::Arc;
use uuid::Uuid;

use crate::database::LeagueStore;
use crate::error::{LeagueError, LeagueResult};
use crate::retry::RetryPolicy;

use super::manager::SeasonManager;
use super::membership::{LeaderboardEntry, UserLeagueStats, XpEvent};
use super::tier::LeagueTier;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

/// Missing limits get the default; everything else lands in `1..=MAX_LIMIT`
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub struct LeaderboardQuery {
    store: Arc<dyn LeagueStore>,
    seasons: Arc<SeasonManager>,
    retry: RetryPolicy,
}

impl LeaderboardQuery {
    pub fn new(store: Arc<dyn LeagueStore>, seasons: Arc<SeasonManager>, retry: RetryPolicy) -> Self {
        Self { store, seasons, retry }
    }

    pub async fn get_current_leaderboard(&self, limit: Option<u32>) -> LeagueResult<Vec<LeaderboardEntry>> {
        let season = self.seasons.current_season().await?;
        self.get_season_leaderboard(season.id, limit).await
    }

    pub async fn get_season_leaderboard(
        &self,
        season_id: Uuid,
        limit: Option<u32>,
    ) -> LeagueResult<Vec<LeaderboardEntry>> {
        if self.seasons.get_season(season_id).await?.is_none() {
            return Err(LeagueError::Validation(format!("unknown season {}", season_id)));
        }
        let limit = clamp_limit(limit);
        Ok(self
            .retry
            .run("leaderboard", || self.store.leaderboard(season_id, limit))
            .await?)
    }

    /// A user without a membership this season reads as bronze, zero points, unranked
    pub async fn get_user_league_stats(&self, user_id: &str) -> LeagueResult<UserLeagueStats> {
        let season = self.seasons.current_season().await?;
        let entry = self
            .retry
            .run("leaderboard_entry", || self.store.leaderboard_entry(user_id, season.id))
            .await?;

        Ok(match entry {
            Some(entry) => UserLeagueStats {
                user_id: user_id.to_string(),
                season_id: season.id,
                league: entry.league,
                points: entry.points,
                rank: Some(entry.rank),
            },
            None => UserLeagueStats {
                user_id: user_id.to_string(),
                season_id: season.id,
                league: LeagueTier::default(),
                points: 0,
                rank: None,
            },
        })
    }

    /// Newest first
    pub async fn get_user_xp_events(&self, user_id: &str, limit: Option<u32>) -> LeagueResult<Vec<XpEvent>> {
        let season = self.seasons.current_season().await?;
        let limit = clamp_limit(limit);
        Ok(self
            .retry
            .run("list_xp_events", || self.store.list_xp_events(user_id, season.id, limit))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use crate::league::manager::SeasonSettings;
    use crate::league::XpEventType;
    use chrono::Utc;

    async fn setup() -> (Arc<InMemoryStore>, Arc<SeasonManager>, LeaderboardQuery) {
        let store = Arc::new(InMemoryStore::new());
        let seasons = Arc::new(SeasonManager::new(
            store.clone(),
            SeasonSettings::default(),
            RetryPolicy::none(),
        ));
        seasons.bootstrap(Utc::now()).await.unwrap();
        let query = LeaderboardQuery::new(store.clone(), seasons.clone(), RetryPolicy::none());
        (store, seasons, query)
    }

    async fn award(store: &InMemoryStore, season_id: Uuid, user: &str, kind: XpEventType) {
        let event = XpEvent::new(user.to_string(), season_id, kind, serde_json::Value::Null);
        store.append_xp_event(&event).await.unwrap();
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), 500);
    }

    #[tokio::test]
    async fn test_ties_broken_by_user_id() {
        let (store, seasons, query) = setup().await;
        let season = seasons.current_season().await.unwrap();
        award(&store, season.id, "zeta", XpEventType::QuoteAccepted).await;
        award(&store, season.id, "alpha", XpEventType::QuoteAccepted).await;
        award(&store, season.id, "mid", XpEventType::DealCompletedOnTime).await;

        let board = query.get_current_leaderboard(None).await.unwrap();
        let order: Vec<(&str, u32)> = board.iter().map(|e| (e.user_id.as_str(), e.rank)).collect();
        assert_eq!(order, vec![("mid", 1), ("alpha", 2), ("zeta", 3)]);

        let top = query.get_current_leaderboard(Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_for_member_and_stranger() {
        let (store, seasons, query) = setup().await;
        let season = seasons.current_season().await.unwrap();
        award(&store, season.id, "shipper_7", XpEventType::RfqPosted).await;
        award(&store, season.id, "shipper_7", XpEventType::DisputeFreeDeal).await;

        let stats = query.get_user_league_stats("shipper_7").await.unwrap();
        assert_eq!(stats.points, 25);
        assert_eq!(stats.rank, Some(1));
        assert_eq!(stats.league, LeagueTier::Bronze);

        let stranger = query.get_user_league_stats("nobody").await.unwrap();
        assert_eq!(stranger.points, 0);
        assert_eq!(stranger.rank, None);
    }

    #[tokio::test]
    async fn test_events_newest_first() {
        let (store, seasons, query) = setup().await;
        let season = seasons.current_season().await.unwrap();
        award(&store, season.id, "carrier_2", XpEventType::RfqPosted).await;
        award(&store, season.id, "carrier_2", XpEventType::FallthroughRecovered).await;

        let events = query.get_user_xp_events("carrier_2", None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, XpEventType::FallthroughRecovered);
    }

    #[tokio::test]
    async fn test_unknown_season_leaderboard_is_validation_error() {
        let (_, _, query) = setup().await;
        let err = query.get_season_leaderboard(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, LeagueError::Validation(_)));
    }
}
