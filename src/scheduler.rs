//! Season close scheduler
//!
//! Checks on a fixed interval whether the current season is due and runs the
//! rollover. Several instances may run side by side; the rollover claim makes
//! sure only one of them does the work.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{LeagueError, LeagueResult};
use crate::league::{LeagueEngine, RolloverOutcome};
use crate::retry::RetryPolicy;

pub struct SeasonScheduler {
    engine: Arc<LeagueEngine>,
    interval: Duration,
    retry: RetryPolicy,
    shutdown: Arc<RwLock<bool>>,
}

impl SeasonScheduler {
    pub fn new(engine: Arc<LeagueEngine>, interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            engine,
            interval,
            retry,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) {
        info!(interval_secs = self.interval.as_secs(), "Starting season scheduler");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if *self.shutdown.read().await {
                info!("Shutdown signal received, stopping season scheduler");
                break;
            }
            // Errors are logged inside; the next tick tries again
            let _ = self.tick().await;
        }
    }

    pub async fn stop(&self) {
        let mut shutdown = self.shutdown.write().await;
        *shutdown = true;
        info!("Season scheduler stop requested");
    }

    /// One due-check, retried with backoff on transient failures
    pub async fn tick(&self) -> LeagueResult<RolloverOutcome> {
        let result = self
            .retry
            .run("close_season_and_roll", || self.engine.close_season_and_roll())
            .await;

        match &result {
            Ok(RolloverOutcome::Rolled(report)) => info!(
                closed_season_id = %report.closed_season_id,
                next_season_id = %report.next_season.id,
                seeded = report.seeded_memberships,
                resumed = report.resumed,
                "Scheduled season rollover finished"
            ),
            Ok(RolloverOutcome::NotDue { season_id, ends_at }) => {
                debug!(season_id = %season_id, ends_at = %ends_at, "Season not due yet")
            }
            Ok(RolloverOutcome::InProgress { season_id, .. }) => {
                debug!(season_id = %season_id, "Rollover owned by another closer")
            }
            Ok(RolloverOutcome::AlreadyClosed { season_id, .. }) => {
                debug!(season_id = %season_id, "Season already closed")
            }
            Err(LeagueError::Consistency(msg)) => {
                error!("Season rollover halted, needs operator attention: {}", msg)
            }
            Err(e) => warn!("Season rollover failed, will retry next tick: {}", e),
        }
        result
    }
}
