//! League Repository - PostgreSQL implementation of `LeagueStore`
//!
//! Point increments are single `points = points + $n` statements inside the
//! same transaction as the event insert. Season transitions are conditional
//! `UPDATE ... WHERE status = ...` statements so concurrent closers cannot
//! both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};
use tracing::debug;
use uuid::Uuid;

use super::store::{LeagueStore, StoreResult};
use crate::error::StoreError;
use crate::league::{
    LeaderboardEntry, LeagueTier, Membership, RolloverStage, Season, SeasonStatus, TierChange,
    XpEvent, XpEventType,
};

const SEASON_COLUMNS: &str =
    "id, starts_at, ends_at, status, rollover_stage, rollover_started_at, next_season_id";

const MEMBERSHIP_COLUMNS: &str =
    "user_id, season_id, league_tier, points, rank, created_at, updated_at";

const ENSURE_MEMBERSHIP_SQL: &str = r#"
    INSERT INTO league.memberships (user_id, season_id, league_tier, points)
    VALUES (
        $1,
        $2,
        COALESCE(
            (SELECT m.league_tier
             FROM league.memberships m
             JOIN league.seasons s ON s.id = m.season_id
             WHERE m.user_id = $1 AND m.season_id <> $2
             ORDER BY s.starts_at DESC
             LIMIT 1),
            'bronze'
        ),
        0
    )
    ON CONFLICT (user_id, season_id) DO NOTHING
"#;

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn season_from_row(row: &PgRow) -> StoreResult<Season> {
    let status: String = row.try_get("status")?;
    let stage: Option<String> = row.try_get("rollover_stage")?;
    Ok(Season {
        id: row.try_get("id")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        status: status.parse::<SeasonStatus>().map_err(corrupt)?,
        rollover_stage: stage
            .map(|s| s.parse::<RolloverStage>())
            .transpose()
            .map_err(corrupt)?,
        rollover_started_at: row.try_get("rollover_started_at")?,
        next_season_id: row.try_get("next_season_id")?,
    })
}

fn membership_from_row(row: &PgRow) -> StoreResult<Membership> {
    let tier: String = row.try_get("league_tier")?;
    let rank: Option<i32> = row.try_get("rank")?;
    Ok(Membership {
        user_id: row.try_get("user_id")?,
        season_id: row.try_get("season_id")?,
        league_tier: tier.parse::<LeagueTier>().map_err(corrupt)?,
        points: row.try_get("points")?,
        rank: rank.map(|r| r as u32),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> StoreResult<XpEvent> {
    let event_type: String = row.try_get("event_type")?;
    Ok(XpEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        season_id: row.try_get("season_id")?,
        event_type: event_type.parse::<XpEventType>().map_err(corrupt)?,
        points: row.try_get("points")?,
        meta: row.try_get("meta")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<LeaderboardEntry> {
    let tier: String = row.try_get("league_tier")?;
    let position: i64 = row.try_get("position")?;
    Ok(LeaderboardEntry {
        user_id: row.try_get("user_id")?,
        points: row.try_get("points")?,
        rank: position as u32,
        league: tier.parse::<LeagueTier>().map_err(corrupt)?,
    })
}

async fn fetch_season(conn: &mut PgConnection, season_id: Uuid) -> StoreResult<Option<Season>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM league.seasons WHERE id = $1",
        SEASON_COLUMNS
    ))
    .bind(season_id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(season_from_row).transpose()
}

pub struct PgLeagueStore {
    pool: PgPool,
}

impl PgLeagueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeagueStore for PgLeagueStore {
    async fn insert_season(&self, season: &Season) -> StoreResult<()> {
        sqlx::query(r#"
            INSERT INTO league.seasons
            (id, starts_at, ends_at, status, rollover_stage, rollover_started_at, next_season_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(season.id)
        .bind(season.starts_at)
        .bind(season.ends_at)
        .bind(season.status.as_str())
        .bind(season.rollover_stage.map(RolloverStage::as_str))
        .bind(season.rollover_started_at)
        .bind(season.next_season_id)
        .execute(&self.pool)
        .await?;

        debug!(season_id = %season.id, "Season inserted");
        Ok(())
    }

    async fn current_seasons(&self) -> StoreResult<Vec<Season>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM league.seasons WHERE status IN ('active', 'closing')",
            SEASON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(season_from_row).collect()
    }

    async fn get_season(&self, season_id: Uuid) -> StoreResult<Option<Season>> {
        let mut conn = self.pool.acquire().await?;
        fetch_season(&mut *conn, season_id).await
    }

    async fn pending_rollovers(&self) -> StoreResult<Vec<Season>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM league.seasons
               WHERE status = 'ended' AND rollover_stage IS DISTINCT FROM 'completed'
               ORDER BY starts_at"#,
            SEASON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(season_from_row).collect()
    }

    async fn claim_rollover(
        &self,
        season_id: Uuid,
        previous_claim: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(r#"
            UPDATE league.seasons
            SET status = 'closing',
                rollover_stage = CASE WHEN status = 'active' THEN 'started' ELSE rollover_stage END,
                rollover_started_at = $3
            WHERE id = $1
              AND (status = 'active'
                   OR (status = 'closing' AND rollover_started_at IS NOT DISTINCT FROM $2))
        "#)
        .bind(season_id)
        .bind(previous_claim)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn advance_rollover(
        &self,
        season_id: Uuid,
        from: RolloverStage,
        to: RolloverStage,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE league.seasons SET rollover_stage = $3 WHERE id = $1 AND rollover_stage = $2",
        )
        .bind(season_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn open_next_season(&self, season_id: Uuid, next: &Season) -> StoreResult<Season> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM league.seasons WHERE id = $1 FOR UPDATE",
            SEASON_COLUMNS
        ))
        .bind(season_id)
        .fetch_optional(&mut *tx)
        .await?;
        let season = row
            .as_ref()
            .map(season_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::Conflict(format!("season {} not found", season_id)))?;

        if let Some(existing) = season.next_season_id {
            let successor = fetch_season(&mut *tx, existing)
                .await?
                .ok_or_else(|| StoreError::Corrupt(format!("missing successor {}", existing)))?;
            tx.commit().await?;
            return Ok(successor);
        }
        if season.status != SeasonStatus::Closing
            || season.rollover_stage != Some(RolloverStage::Promoted)
        {
            return Err(StoreError::Conflict(format!(
                "season {} is {} at stage {:?}, cannot open successor",
                season_id, season.status, season.rollover_stage
            )));
        }

        // End first so the single-current index admits the successor
        sqlx::query(
            "UPDATE league.seasons SET status = 'ended', rollover_stage = 'opened' WHERE id = $1",
        )
        .bind(season_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"
            INSERT INTO league.seasons (id, starts_at, ends_at, status)
            VALUES ($1, $2, $3, 'active')
        "#)
        .bind(next.id)
        .bind(next.starts_at)
        .bind(next.ends_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE league.seasons SET next_season_id = $2 WHERE id = $1")
            .bind(season_id)
            .bind(next.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(next.clone())
    }

    async fn ensure_membership(&self, user_id: &str, season_id: Uuid) -> StoreResult<Membership> {
        sqlx::query(ENSURE_MEMBERSHIP_SQL)
            .bind(user_id)
            .bind(season_id)
            .execute(&self.pool)
            .await?;

        self.get_membership(user_id, season_id)
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("membership for {} vanished", user_id)))
    }

    async fn get_membership(
        &self,
        user_id: &str,
        season_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM league.memberships WHERE user_id = $1 AND season_id = $2",
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id)
        .bind(season_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn increment_points(
        &self,
        user_id: &str,
        season_id: Uuid,
        delta: i64,
    ) -> StoreResult<Membership> {
        let row = sqlx::query(&format!(
            r#"UPDATE league.memberships
               SET points = points + $3, updated_at = NOW()
               WHERE user_id = $1 AND season_id = $2
               RETURNING {}"#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(user_id)
        .bind(season_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(membership_from_row)
            .transpose()?
            .ok_or_else(|| {
                StoreError::Conflict(format!("no membership for {} in {}", user_id, season_id))
            })
    }

    async fn list_memberships(&self, season_id: Uuid) -> StoreResult<Vec<Membership>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM league.memberships WHERE season_id = $1",
            MEMBERSHIP_COLUMNS
        ))
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn store_ranks(&self, season_id: Uuid, ranks: &[(String, u32)]) -> StoreResult<()> {
        let users: Vec<String> = ranks.iter().map(|(u, _)| u.clone()).collect();
        let positions: Vec<i32> = ranks.iter().map(|(_, r)| *r as i32).collect();

        sqlx::query(r#"
            UPDATE league.memberships m
            SET rank = r.rank
            FROM UNNEST($2::varchar[], $3::int4[]) AS r(user_id, rank)
            WHERE m.season_id = $1 AND m.user_id = r.user_id
        "#)
        .bind(season_id)
        .bind(&users)
        .bind(&positions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_tier_changes(
        &self,
        season_id: Uuid,
        changes: &[TierChange],
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(r#"
            UPDATE league.seasons SET rollover_stage = 'promoted'
            WHERE id = $1 AND status = 'closing' AND rollover_stage = 'ranked'
        "#)
        .bind(season_id)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let users: Vec<String> = changes.iter().map(|c| c.user_id.clone()).collect();
        let tiers: Vec<String> = changes.iter().map(|c| c.to.as_str().to_string()).collect();
        sqlx::query(r#"
            UPDATE league.memberships m
            SET league_tier = c.tier, updated_at = NOW()
            FROM UNNEST($2::varchar[], $3::varchar[]) AS c(user_id, tier)
            WHERE m.season_id = $1 AND m.user_id = c.user_id
        "#)
        .bind(season_id)
        .bind(&users)
        .bind(&tiers)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn seed_memberships(&self, from: Uuid, to: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(r#"
            INSERT INTO league.memberships (user_id, season_id, league_tier, points)
            SELECT user_id, $2, league_tier, 0
            FROM league.memberships
            WHERE season_id = $1
            ON CONFLICT (user_id, season_id) DO NOTHING
        "#)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn append_xp_event(&self, event: &XpEvent) -> StoreResult<Membership> {
        let mut tx = self.pool.begin().await?;

        // Shared lock: concurrent appends proceed, ending the season waits
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM league.seasons WHERE id = $1 FOR SHARE")
                .bind(event.season_id)
                .fetch_optional(&mut *tx)
                .await?;
        let open = match status.as_deref() {
            Some(s) => s.parse::<SeasonStatus>().map_err(corrupt)?.is_current(),
            None => false,
        };
        if !open {
            tx.rollback().await?;
            return Err(StoreError::SeasonNotOpen(event.season_id));
        }

        sqlx::query(ENSURE_MEMBERSHIP_SQL)
            .bind(&event.user_id)
            .bind(event.season_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(r#"
            INSERT INTO league.xp_events (id, user_id, season_id, event_type, points, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(event.id)
        .bind(&event.user_id)
        .bind(event.season_id)
        .bind(event.event_type.as_str())
        .bind(event.points)
        .bind(&event.meta)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            r#"UPDATE league.memberships
               SET points = points + $3, updated_at = NOW()
               WHERE user_id = $1 AND season_id = $2
               RETURNING {}"#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(&event.user_id)
        .bind(event.season_id)
        .bind(event.points)
        .fetch_one(&mut *tx)
        .await?;
        let membership = membership_from_row(&row)?;

        tx.commit().await?;
        Ok(membership)
    }

    async fn list_xp_events(
        &self,
        user_id: &str,
        season_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<XpEvent>> {
        let rows = sqlx::query(r#"
            SELECT id, user_id, season_id, event_type, points, meta, created_at
            FROM league.xp_events
            WHERE user_id = $1 AND season_id = $2
            ORDER BY created_at DESC
            LIMIT $3
        "#)
        .bind(user_id)
        .bind(season_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn sum_xp_points(&self, user_id: &str, season_id: Uuid) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points), 0)::BIGINT FROM league.xp_events WHERE user_id = $1 AND season_id = $2",
        )
        .bind(user_id)
        .bind(season_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn leaderboard(&self, season_id: Uuid, limit: u32) -> StoreResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(r#"
            SELECT user_id, points, league_tier, position
            FROM league.leaderboard
            WHERE season_id = $1
            ORDER BY position
            LIMIT $2
        "#)
        .bind(season_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn leaderboard_entry(
        &self,
        user_id: &str,
        season_id: Uuid,
    ) -> StoreResult<Option<LeaderboardEntry>> {
        let row = sqlx::query(r#"
            SELECT user_id, points, league_tier, position
            FROM league.leaderboard
            WHERE season_id = $1 AND user_id = $2
        "#)
        .bind(season_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }
}
