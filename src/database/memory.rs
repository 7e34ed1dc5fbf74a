//! In-process store
//!
//! Used when PostgreSQL is disabled and by the test suites. All state sits
//! behind one lock, so each trait method is atomic exactly like a single
//! database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{LeagueStore, StoreResult};
use crate::error::StoreError;
use crate::league::{
    leaderboard_order, LeaderboardEntry, LeagueTier, Membership, RolloverStage, Season,
    SeasonStatus, TierChange, XpEvent,
};

#[derive(Debug, Default)]
struct MemoryState {
    seasons: HashMap<Uuid, Season>,
    memberships: HashMap<(String, Uuid), Membership>,
    events: Vec<XpEvent>,
}

impl MemoryState {
    /// Tier from the user's membership in the latest other season
    fn carried_tier(&self, user_id: &str, season_id: Uuid) -> LeagueTier {
        self.memberships
            .values()
            .filter(|m| m.user_id == user_id && m.season_id != season_id)
            .filter_map(|m| self.seasons.get(&m.season_id).map(|s| (s.starts_at, m.league_tier)))
            .max_by_key(|(starts_at, _)| *starts_at)
            .map(|(_, tier)| tier)
            .unwrap_or_default()
    }

    fn ensure_membership(&mut self, user_id: &str, season_id: Uuid) -> &mut Membership {
        let key = (user_id.to_string(), season_id);
        let tier = if self.memberships.contains_key(&key) {
            LeagueTier::default()
        } else {
            self.carried_tier(user_id, season_id)
        };
        self.memberships
            .entry(key)
            .or_insert_with(|| Membership::new(user_id.to_string(), season_id, tier))
    }

    fn ranked(&self, season_id: Uuid) -> Vec<LeaderboardEntry> {
        let mut members: Vec<&Membership> = self
            .memberships
            .values()
            .filter(|m| m.season_id == season_id)
            .collect();
        members.sort_by(|a, b| leaderboard_order(a, b));
        members
            .into_iter()
            .enumerate()
            .map(|(i, m)| LeaderboardEntry {
                user_id: m.user_id.clone(),
                points: m.points,
                rank: i as u32 + 1,
                league: m.league_tier,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    injected_failures: AtomicU32,
    lost_replies: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with `StoreError::Unavailable`
    pub fn inject_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` xp appends commit but still report `Unavailable`
    pub fn inject_lost_replies(&self, count: u32) {
        self.lost_replies.store(count, Ordering::SeqCst);
    }

    fn take_lost_reply(&self) -> bool {
        self.lost_replies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_available(&self) -> StoreResult<()> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl LeagueStore for InMemoryStore {
    async fn insert_season(&self, season: &Season) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if season.status.is_current() && state.seasons.values().any(|s| s.status.is_current()) {
            return Err(StoreError::Conflict("a current season already exists".to_string()));
        }
        state.seasons.insert(season.id, season.clone());
        Ok(())
    }

    async fn current_seasons(&self) -> StoreResult<Vec<Season>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .seasons
            .values()
            .filter(|s| s.status.is_current())
            .cloned()
            .collect())
    }

    async fn get_season(&self, season_id: Uuid) -> StoreResult<Option<Season>> {
        self.check_available()?;
        Ok(self.state.read().await.seasons.get(&season_id).cloned())
    }

    async fn pending_rollovers(&self) -> StoreResult<Vec<Season>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .seasons
            .values()
            .filter(|s| s.rollover_pending())
            .cloned()
            .collect())
    }

    async fn claim_rollover(
        &self,
        season_id: Uuid,
        previous_claim: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let Some(season) = state.seasons.get_mut(&season_id) else {
            return Ok(false);
        };
        match season.status {
            SeasonStatus::Active => {
                season.status = SeasonStatus::Closing;
                season.rollover_stage = Some(RolloverStage::Started);
                season.rollover_started_at = Some(now);
                Ok(true)
            }
            SeasonStatus::Closing if season.rollover_started_at == previous_claim => {
                season.rollover_started_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn advance_rollover(
        &self,
        season_id: Uuid,
        from: RolloverStage,
        to: RolloverStage,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.seasons.get_mut(&season_id) {
            Some(season) if season.rollover_stage == Some(from) => {
                season.rollover_stage = Some(to);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_next_season(&self, season_id: Uuid, next: &Season) -> StoreResult<Season> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let season = state
            .seasons
            .get(&season_id)
            .cloned()
            .ok_or_else(|| StoreError::Conflict(format!("season {} not found", season_id)))?;

        if let Some(existing) = season.next_season_id {
            return state
                .seasons
                .get(&existing)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("missing successor {}", existing)));
        }
        if season.status != SeasonStatus::Closing
            || season.rollover_stage != Some(RolloverStage::Promoted)
        {
            return Err(StoreError::Conflict(format!(
                "season {} is {} at stage {:?}, cannot open successor",
                season_id, season.status, season.rollover_stage
            )));
        }
        if state
            .seasons
            .values()
            .any(|s| s.id != season_id && s.status.is_current())
        {
            return Err(StoreError::Conflict("another current season exists".to_string()));
        }

        if let Some(s) = state.seasons.get_mut(&season_id) {
            s.status = SeasonStatus::Ended;
            s.rollover_stage = Some(RolloverStage::Opened);
            s.next_season_id = Some(next.id);
        }
        state.seasons.insert(next.id, next.clone());
        Ok(next.clone())
    }

    async fn ensure_membership(&self, user_id: &str, season_id: Uuid) -> StoreResult<Membership> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.ensure_membership(user_id, season_id).clone())
    }

    async fn get_membership(
        &self,
        user_id: &str,
        season_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .memberships
            .get(&(user_id.to_string(), season_id))
            .cloned())
    }

    async fn increment_points(
        &self,
        user_id: &str,
        season_id: Uuid,
        delta: i64,
    ) -> StoreResult<Membership> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let membership = state
            .memberships
            .get_mut(&(user_id.to_string(), season_id))
            .ok_or_else(|| {
                StoreError::Conflict(format!("no membership for {} in {}", user_id, season_id))
            })?;
        membership.points += delta;
        membership.updated_at = Utc::now();
        Ok(membership.clone())
    }

    async fn list_memberships(&self, season_id: Uuid) -> StoreResult<Vec<Membership>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .memberships
            .values()
            .filter(|m| m.season_id == season_id)
            .cloned()
            .collect())
    }

    async fn store_ranks(&self, season_id: Uuid, ranks: &[(String, u32)]) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        for (user_id, rank) in ranks {
            if let Some(m) = state.memberships.get_mut(&(user_id.clone(), season_id)) {
                m.rank = Some(*rank);
            }
        }
        Ok(())
    }

    async fn apply_tier_changes(
        &self,
        season_id: Uuid,
        changes: &[TierChange],
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.seasons.get(&season_id) {
            Some(s)
                if s.status == SeasonStatus::Closing
                    && s.rollover_stage == Some(RolloverStage::Ranked) => {}
            _ => return Ok(false),
        }

        let now = Utc::now();
        for change in changes {
            if let Some(m) = state
                .memberships
                .get_mut(&(change.user_id.clone(), season_id))
            {
                m.league_tier = change.to;
                m.updated_at = now;
            }
        }
        if let Some(s) = state.seasons.get_mut(&season_id) {
            s.rollover_stage = Some(RolloverStage::Promoted);
        }
        Ok(true)
    }

    async fn seed_memberships(&self, from: Uuid, to: Uuid) -> StoreResult<u64> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let carried: Vec<(String, LeagueTier)> = state
            .memberships
            .values()
            .filter(|m| m.season_id == from)
            .map(|m| (m.user_id.clone(), m.league_tier))
            .collect();

        let mut inserted = 0;
        for (user_id, tier) in carried {
            let key = (user_id.clone(), to);
            if !state.memberships.contains_key(&key) {
                state.memberships.insert(key, Membership::new(user_id, to, tier));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn append_xp_event(&self, event: &XpEvent) -> StoreResult<Membership> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.seasons.get(&event.season_id) {
            Some(s) if s.status.is_current() => {}
            _ => return Err(StoreError::SeasonNotOpen(event.season_id)),
        }
        if state.events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::Conflict(format!("xp event {} already recorded", event.id)));
        }

        let membership = state.ensure_membership(&event.user_id, event.season_id);
        membership.points += event.points;
        membership.updated_at = event.created_at;
        let membership = membership.clone();
        state.events.push(event.clone());
        if self.take_lost_reply() {
            return Err(StoreError::Unavailable("reply lost after commit".to_string()));
        }
        Ok(membership)
    }

    async fn list_xp_events(
        &self,
        user_id: &str,
        season_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<XpEvent>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id && e.season_id == season_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn sum_xp_points(&self, user_id: &str, season_id: Uuid) -> StoreResult<i64> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.season_id == season_id)
            .map(|e| e.points)
            .sum())
    }

    async fn leaderboard(&self, season_id: Uuid, limit: u32) -> StoreResult<Vec<LeaderboardEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut entries = state.ranked(season_id);
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn leaderboard_entry(
        &self,
        user_id: &str,
        season_id: Uuid,
    ) -> StoreResult<Option<LeaderboardEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .ranked(season_id)
            .into_iter()
            .find(|e| e.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::XpEventType;
    use chrono::Duration;

    async fn store_with_season() -> (InMemoryStore, Season) {
        let store = InMemoryStore::new();
        let season = Season::new(Utc::now(), Duration::days(7));
        store.insert_season(&season).await.unwrap();
        (store, season)
    }

    #[tokio::test]
    async fn test_second_current_season_rejected() {
        let (store, _) = store_with_season().await;
        let other = Season::new(Utc::now(), Duration::days(7));
        let err = store.insert_season(&other).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_append_creates_membership_and_adds_points() {
        let (store, season) = store_with_season().await;
        let event = XpEvent::new(
            "op_1".to_string(),
            season.id,
            XpEventType::QuoteAccepted,
            serde_json::Value::Null,
        );
        let m = store.append_xp_event(&event).await.unwrap();
        assert_eq!(m.points, 25);
        assert_eq!(store.sum_xp_points("op_1", season.id).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_increment_points_is_additive() {
        let (store, season) = store_with_season().await;
        store.ensure_membership("op_2", season.id).await.unwrap();
        store.increment_points("op_2", season.id, 15).await.unwrap();
        let m = store.increment_points("op_2", season.id, 10).await.unwrap();
        assert_eq!(m.points, 25);

        let err = store.increment_points("ghost", season.id, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_same_event_is_recorded_once() {
        let (store, season) = store_with_season().await;
        let event = XpEvent::new(
            "op_3".to_string(),
            season.id,
            XpEventType::RfqPosted,
            serde_json::Value::Null,
        );
        store.append_xp_event(&event).await.unwrap();
        let err = store.append_xp_event(&event).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.sum_xp_points("op_3", season.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_append_to_unknown_season_is_not_open() {
        let store = InMemoryStore::new();
        let event = XpEvent::new(
            "op_1".to_string(),
            Uuid::new_v4(),
            XpEventType::RfqPosted,
            serde_json::Value::Null,
        );
        let err = store.append_xp_event(&event).await.unwrap_err();
        assert!(matches!(err, StoreError::SeasonNotOpen(_)));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let (store, season) = store_with_season().await;
        store.inject_failures(2);
        assert!(store.get_season(season.id).await.is_err());
        assert!(store.get_season(season.id).await.is_err());
        assert!(store.get_season(season.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (store, season) = store_with_season().await;
        let now = Utc::now();
        assert!(store.claim_rollover(season.id, None, now).await.unwrap());
        // A second claimer holding a stale view loses
        assert!(!store.claim_rollover(season.id, None, now).await.unwrap());
        // Takeover with the observed claim succeeds
        assert!(store.claim_rollover(season.id, Some(now), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_tier_changes_require_ranked_stage() {
        let (store, season) = store_with_season().await;
        store.ensure_membership("crew_1", season.id).await.unwrap();
        let changes = vec![TierChange {
            user_id: "crew_1".to_string(),
            from: LeagueTier::Bronze,
            to: LeagueTier::Silver,
        }];
        assert!(!store.apply_tier_changes(season.id, &changes).await.unwrap());

        store.claim_rollover(season.id, None, Utc::now()).await.unwrap();
        store
            .advance_rollover(season.id, RolloverStage::Started, RolloverStage::Ranked)
            .await
            .unwrap();
        assert!(store.apply_tier_changes(season.id, &changes).await.unwrap());
        // Stage moved on, so a replay is refused
        assert!(!store.apply_tier_changes(season.id, &changes).await.unwrap());

        let m = store.get_membership("crew_1", season.id).await.unwrap().unwrap();
        assert_eq!(m.league_tier, LeagueTier::Silver);
    }

    #[tokio::test]
    async fn test_lazy_membership_carries_latest_tier() {
        let store = InMemoryStore::new();
        let mut old = Season::new(Utc::now() - Duration::days(14), Duration::days(7));
        old.status = SeasonStatus::Ended;
        store.insert_season(&old).await.unwrap();
        let current = Season::new(Utc::now() - Duration::days(7), Duration::days(7));
        store.insert_season(&current).await.unwrap();

        store.ensure_membership("pilot_9", old.id).await.unwrap();
        {
            let mut state = store.state.write().await;
            if let Some(m) = state.memberships.get_mut(&("pilot_9".to_string(), old.id)) {
                m.league_tier = LeagueTier::Platinum;
            }
        }

        let m = store.ensure_membership("pilot_9", current.id).await.unwrap();
        assert_eq!(m.league_tier, LeagueTier::Platinum);
        let fresh = store.ensure_membership("pilot_10", current.id).await.unwrap();
        assert_eq!(fresh.league_tier, LeagueTier::Bronze);
    }
}
