//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::postgres::PgLeagueStore;
use crate::league::LeagueTier;

pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing league schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS league")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create league schema: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS league.league_tiers (
                tier VARCHAR(16) PRIMARY KEY,
                name VARCHAR(32) NOT NULL,
                sort_order SMALLINT NOT NULL UNIQUE,
                point_threshold BIGINT NOT NULL
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create league_tiers table: {}", e))?;

        for tier in LeagueTier::ALL {
            sqlx::query(r#"
                INSERT INTO league.league_tiers (tier, name, sort_order, point_threshold)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tier) DO NOTHING
            "#)
            .bind(tier.as_str())
            .bind(tier.display_name())
            .bind(tier.sort_order() as i16)
            .bind(tier.point_threshold())
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to seed league tier {}: {}", tier, e))?;
        }

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS league.seasons (
                id UUID PRIMARY KEY,
                starts_at TIMESTAMP WITH TIME ZONE NOT NULL,
                ends_at TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(16) NOT NULL CHECK (status IN ('active', 'closing', 'ended')),
                rollover_stage VARCHAR(16),
                rollover_started_at TIMESTAMP WITH TIME ZONE,
                next_season_id UUID REFERENCES league.seasons(id),
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CHECK (ends_at > starts_at)
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create seasons table: {}", e))?;

        // At most one current season, enforced by the database itself
        sqlx::query(r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_seasons_single_current
            ON league.seasons ((true))
            WHERE status IN ('active', 'closing')
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create single current season index: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS league.memberships (
                user_id VARCHAR(255) NOT NULL,
                season_id UUID NOT NULL REFERENCES league.seasons(id),
                league_tier VARCHAR(16) NOT NULL REFERENCES league.league_tiers(tier),
                points BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0),
                rank INTEGER,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, season_id)
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create memberships table: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS league.xp_events (
                id UUID PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                season_id UUID NOT NULL,
                event_type VARCHAR(64) NOT NULL,
                points BIGINT NOT NULL,
                meta JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                FOREIGN KEY (user_id, season_id) REFERENCES league.memberships(user_id, season_id)
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create xp_events table: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_xp_events_user_season ON league.xp_events(user_id, season_id, created_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create xp_events index: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memberships_season_points ON league.memberships(season_id, points DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create memberships index: {}", e))?;

        // Byte-order collation keeps the tie-break identical to the engine's
        sqlx::query(r#"
            CREATE OR REPLACE VIEW league.leaderboard AS
            SELECT
                m.season_id,
                m.user_id,
                m.points,
                m.league_tier,
                t.name AS league_name,
                t.sort_order AS league_sort_order,
                ROW_NUMBER() OVER (
                    PARTITION BY m.season_id
                    ORDER BY m.points DESC, m.user_id COLLATE "C" ASC
                ) AS position
            FROM league.memberships m
            JOIN league.league_tiers t ON t.tier = m.league_tier
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create leaderboard view: {}", e))?;

        info!("League schema initialized");
        Ok(())
    }

    pub fn league_store(&self) -> PgLeagueStore {
        PgLeagueStore::new(self.pool.clone())
    }
}
