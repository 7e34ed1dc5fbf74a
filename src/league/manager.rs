//! Season Manager - season lifecycle and rollover orchestration
//!
//! Rollover is a resumable saga. Each step is recorded on the season row
//! (`rollover_stage`) and every step is safe to re-run:
//!
//! ```text
//! active ──claim──► closing/started ──ranks──► ranked ──promotions──► promoted
//!                                                                        │
//!          completed ◄──seed next season── ended/opened ◄──open next─────┘
//! ```
//!
//! The `closing` status doubles as a lease: a second closer that finds a live
//! lease skips; one that finds an expired lease takes the rollover over.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::LeagueStore;
use crate::error::{LeagueError, LeagueResult};
use crate::retry::RetryPolicy;

use super::promotion::{PromotionEngine, PromotionOutcome, PromotionRules};
use super::ranking::RankComputer;
use super::season::{RolloverStage, Season, SeasonStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonSettings {
    pub length_days: i64,
    /// How long a closing season stays claimed before another closer may take over
    pub rollover_lease_secs: i64,
    pub promotion: PromotionRules,
}

impl Default for SeasonSettings {
    fn default() -> Self {
        Self {
            length_days: 7,
            rollover_lease_secs: 900,
            promotion: PromotionRules::default(),
        }
    }
}

impl SeasonSettings {
    pub fn length(&self) -> Duration {
        Duration::days(self.length_days)
    }

    pub fn lease(&self) -> Duration {
        Duration::seconds(self.rollover_lease_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloverReport {
    pub closed_season_id: Uuid,
    pub next_season: Season,
    /// `None` when promotions were applied by an earlier, interrupted run
    pub promotions: Option<PromotionOutcome>,
    pub seeded_memberships: u64,
    /// The rollover continued work left behind by an earlier run
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RolloverOutcome {
    Rolled(RolloverReport),
    NotDue {
        season_id: Uuid,
        ends_at: DateTime<Utc>,
    },
    InProgress {
        season_id: Uuid,
        started_at: Option<DateTime<Utc>>,
    },
    AlreadyClosed {
        season_id: Uuid,
        next_season_id: Option<Uuid>,
    },
}

pub struct SeasonManager {
    store: Arc<dyn LeagueStore>,
    settings: SeasonSettings,
    retry: RetryPolicy,
    ranks: RankComputer,
    promotions: PromotionEngine,
}

impl SeasonManager {
    pub fn new(store: Arc<dyn LeagueStore>, settings: SeasonSettings, retry: RetryPolicy) -> Self {
        Self {
            ranks: RankComputer::new(store.clone()),
            promotions: PromotionEngine::new(store.clone(), settings.promotion),
            store,
            settings,
            retry,
        }
    }

    /// Create the first season if the store has none
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> LeagueResult<Season> {
        let mut current = self
            .retry
            .run("current_seasons", || self.store.current_seasons())
            .await?;
        match current.len() {
            0 => {
                let season = Season::new(now, self.settings.length());
                self.retry
                    .run("insert_season", || self.store.insert_season(&season))
                    .await?;
                info!(season_id = %season.id, ends_at = %season.ends_at, "Opened first season");
                Ok(season)
            }
            1 => Ok(current.remove(0)),
            n => Err(LeagueError::Consistency(format!("{} current seasons found", n))),
        }
    }

    /// The single active (or closing) season
    pub async fn current_season(&self) -> LeagueResult<Season> {
        let mut current = self
            .retry
            .run("current_seasons", || self.store.current_seasons())
            .await?;
        match current.len() {
            1 => Ok(current.remove(0)),
            0 => Err(LeagueError::Consistency("no current season".to_string())),
            n => Err(LeagueError::Consistency(format!(
                "{} current seasons found: {:?}",
                n,
                current.iter().map(|s| s.id).collect::<Vec<_>>()
            ))),
        }
    }

    pub async fn get_season(&self, season_id: Uuid) -> LeagueResult<Option<Season>> {
        Ok(self
            .retry
            .run("get_season", || self.store.get_season(season_id))
            .await?)
    }

    /// Close the current season if its window has elapsed and open the next.
    pub async fn close_season_and_roll(&self) -> LeagueResult<RolloverOutcome> {
        self.close_due_season(Utc::now()).await
    }

    pub async fn close_due_season(&self, now: DateTime<Utc>) -> LeagueResult<RolloverOutcome> {
        if let Some(report) = self.resume_pending_seeding().await? {
            return Ok(RolloverOutcome::Rolled(report));
        }

        let season = self.current_season().await?;
        if season.status == SeasonStatus::Active && !season.is_due(now) {
            return Ok(RolloverOutcome::NotDue {
                season_id: season.id,
                ends_at: season.ends_at,
            });
        }
        self.run_rollover(season, now).await
    }

    /// Close a specific season regardless of its end time. Closing a season
    /// that has already ended changes nothing.
    pub async fn close_season(
        &self,
        season_id: Uuid,
        now: DateTime<Utc>,
    ) -> LeagueResult<RolloverOutcome> {
        let season = self
            .get_season(season_id)
            .await?
            .ok_or_else(|| LeagueError::Validation(format!("unknown season {}", season_id)))?;

        if season.status == SeasonStatus::Ended {
            if season.rollover_pending() {
                let report = self.finish_seeding(&season, None, true).await?;
                return Ok(RolloverOutcome::Rolled(report));
            }
            return Ok(RolloverOutcome::AlreadyClosed {
                season_id,
                next_season_id: season.next_season_id,
            });
        }
        self.run_rollover(season, now).await
    }

    async fn resume_pending_seeding(&self) -> LeagueResult<Option<RolloverReport>> {
        let pending = self
            .retry
            .run("pending_rollovers", || self.store.pending_rollovers())
            .await?;
        match pending.first() {
            Some(season) => {
                warn!(season_id = %season.id, "Resuming interrupted season seeding");
                Ok(Some(self.finish_seeding(season, None, true).await?))
            }
            None => Ok(None),
        }
    }

    async fn run_rollover(&self, season: Season, now: DateTime<Utc>) -> LeagueResult<RolloverOutcome> {
        let resumed = season.status == SeasonStatus::Closing;
        let previous_claim = match season.status {
            SeasonStatus::Active => None,
            SeasonStatus::Closing if !season.lease_expired(now, self.settings.lease()) => {
                info!(season_id = %season.id, "Rollover already in progress, skipping");
                return Ok(RolloverOutcome::InProgress {
                    season_id: season.id,
                    started_at: season.rollover_started_at,
                });
            }
            SeasonStatus::Closing => {
                warn!(
                    season_id = %season.id,
                    stage = ?season.rollover_stage,
                    started_at = ?season.rollover_started_at,
                    "Rollover lease expired, taking over"
                );
                season.rollover_started_at
            }
            SeasonStatus::Ended => {
                return Ok(RolloverOutcome::AlreadyClosed {
                    season_id: season.id,
                    next_season_id: season.next_season_id,
                });
            }
        };

        let claimed = self
            .retry
            .run("claim_rollover", || {
                self.store.claim_rollover(season.id, previous_claim, now)
            })
            .await?;
        if !claimed {
            info!(season_id = %season.id, "Another closer claimed the rollover, skipping");
            let latest = self.get_season(season.id).await?;
            return Ok(RolloverOutcome::InProgress {
                season_id: season.id,
                started_at: latest.and_then(|s| s.rollover_started_at),
            });
        }

        info!(season_id = %season.id, resumed, "Season rollover started");
        let report = self.continue_rollover(season.id, resumed, now).await.map_err(|e| {
            if matches!(e, LeagueError::Consistency(_)) {
                error!(season_id = %season.id, "Rollover halted, operator attention required: {}", e);
            }
            e
        })?;
        Ok(RolloverOutcome::Rolled(report))
    }

    async fn continue_rollover(
        &self,
        season_id: Uuid,
        resumed: bool,
        now: DateTime<Utc>,
    ) -> LeagueResult<RolloverReport> {
        let season = self
            .get_season(season_id)
            .await?
            .ok_or_else(|| LeagueError::Consistency(format!("season {} disappeared", season_id)))?;
        let stage = season.rollover_stage.ok_or_else(|| {
            LeagueError::Consistency(format!("claimed season {} has no rollover stage", season_id))
        })?;

        let mut promotions = None;
        if stage <= RolloverStage::Ranked {
            self.retry
                .run("refresh_ranks", || self.ranks.refresh_ranks(season_id))
                .await?;
            if stage == RolloverStage::Started {
                self.expect_stage_move(season_id, RolloverStage::Started, RolloverStage::Ranked)
                    .await?;
            }
            let outcome = self
                .retry
                .run("close_promotions", || self.promotions.close_promotions(season_id))
                .await?;
            promotions = Some(outcome);
        }

        let season = if stage <= RolloverStage::Promoted {
            // A forced early close starts the next season right away
            let next = if season.is_due(now) {
                season.successor(self.settings.length())
            } else {
                Season::new(now, self.settings.length())
            };
            let opened = self
                .retry
                .run("open_next_season", || self.store.open_next_season(season_id, &next))
                .await?;
            info!(
                closed_season_id = %season_id,
                next_season_id = %opened.id,
                ends_at = %opened.ends_at,
                "Season ended, next season opened"
            );
            self.get_season(season_id).await?.ok_or_else(|| {
                LeagueError::Consistency(format!("season {} disappeared", season_id))
            })?
        } else {
            season
        };

        self.finish_seeding(&season, promotions, resumed).await
    }

    /// Seed the successor's memberships and mark the rollover complete
    async fn finish_seeding(
        &self,
        season: &Season,
        promotions: Option<PromotionOutcome>,
        resumed: bool,
    ) -> LeagueResult<RolloverReport> {
        let next_id = season.next_season_id.ok_or_else(|| {
            LeagueError::Consistency(format!("ended season {} has no successor", season.id))
        })?;
        let next_season = self.get_season(next_id).await?.ok_or_else(|| {
            LeagueError::Consistency(format!("successor season {} missing", next_id))
        })?;

        let seeded = self
            .retry
            .run("seed_memberships", || self.store.seed_memberships(season.id, next_id))
            .await?;
        // Someone else may have completed it; either way it is complete
        self.retry
            .run("advance_rollover", || {
                self.store
                    .advance_rollover(season.id, RolloverStage::Opened, RolloverStage::Completed)
            })
            .await?;

        info!(
            closed_season_id = %season.id,
            next_season_id = %next_id,
            seeded,
            "Season rollover completed"
        );
        Ok(RolloverReport {
            closed_season_id: season.id,
            next_season,
            promotions,
            seeded_memberships: seeded,
            resumed,
        })
    }

    async fn expect_stage_move(
        &self,
        season_id: Uuid,
        from: RolloverStage,
        to: RolloverStage,
    ) -> LeagueResult<()> {
        let moved = self
            .retry
            .run("advance_rollover", || self.store.advance_rollover(season_id, from, to))
            .await?;
        if moved {
            Ok(())
        } else {
            Err(LeagueError::Consistency(format!(
                "season {} left stage {} while rolling over",
                season_id,
                from.as_str()
            )))
        }
    }
}
