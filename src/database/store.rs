//! Storage seam for the league engine
//!
//! Every method is a single atomic unit on the backend. Methods that move a
//! season through its rollover are compare-and-set: they report `false`
//! instead of overwriting when the season is not in the expected state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::league::{
    LeaderboardEntry, Membership, RolloverStage, Season, TierChange, XpEvent,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LeagueStore: Send + Sync {
    // Seasons

    /// Insert a season. Fails with `Conflict` if a current season already exists.
    async fn insert_season(&self, season: &Season) -> StoreResult<()>;

    /// All seasons whose status is active or closing
    async fn current_seasons(&self) -> StoreResult<Vec<Season>>;

    async fn get_season(&self, season_id: Uuid) -> StoreResult<Option<Season>>;

    /// Ended seasons whose rollover never reached `completed`
    async fn pending_rollovers(&self) -> StoreResult<Vec<Season>>;

    /// Flip `active -> closing` (or take over a closing season whose claim
    /// still equals `previous_claim`) and stamp the claim time.
    async fn claim_rollover(
        &self,
        season_id: Uuid,
        previous_claim: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn advance_rollover(
        &self,
        season_id: Uuid,
        from: RolloverStage,
        to: RolloverStage,
    ) -> StoreResult<bool>;

    /// End a promoted, closing season and insert its successor in one step.
    /// Re-running against an already opened season returns the existing
    /// successor instead of creating another.
    async fn open_next_season(&self, season_id: Uuid, next: &Season) -> StoreResult<Season>;

    // Memberships

    /// Get-or-create. New rows carry the user's most recent tier, else bronze.
    async fn ensure_membership(&self, user_id: &str, season_id: Uuid) -> StoreResult<Membership>;

    async fn get_membership(&self, user_id: &str, season_id: Uuid)
        -> StoreResult<Option<Membership>>;

    /// Atomic `points = points + delta` on an existing membership
    async fn increment_points(
        &self,
        user_id: &str,
        season_id: Uuid,
        delta: i64,
    ) -> StoreResult<Membership>;

    async fn list_memberships(&self, season_id: Uuid) -> StoreResult<Vec<Membership>>;

    async fn store_ranks(&self, season_id: Uuid, ranks: &[(String, u32)]) -> StoreResult<()>;

    /// Apply tier changes together with the `ranked -> promoted` stage move.
    /// Returns `false` and changes nothing if the season is not at `ranked`.
    async fn apply_tier_changes(
        &self,
        season_id: Uuid,
        changes: &[TierChange],
    ) -> StoreResult<bool>;

    /// Copy every membership of `from` into `to` with the same tier and zero
    /// points, skipping users already present. Returns rows inserted.
    async fn seed_memberships(&self, from: Uuid, to: Uuid) -> StoreResult<u64>;

    // XP ledger

    /// Append the event and add its points to the membership (created if
    /// missing) atomically. `SeasonNotOpen` if the season has ended.
    async fn append_xp_event(&self, event: &XpEvent) -> StoreResult<Membership>;

    /// Newest first
    async fn list_xp_events(
        &self,
        user_id: &str,
        season_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<XpEvent>>;

    async fn sum_xp_points(&self, user_id: &str, season_id: Uuid) -> StoreResult<i64>;

    // Leaderboard view

    /// Ordered by points desc, user id asc, with live positional rank
    async fn leaderboard(&self, season_id: Uuid, limit: u32) -> StoreResult<Vec<LeaderboardEntry>>;

    async fn leaderboard_entry(
        &self,
        user_id: &str,
        season_id: Uuid,
    ) -> StoreResult<Option<LeaderboardEntry>>;
}
