//! Season Types
//!
//! A season moves `active -> closing -> ended` exactly once. `closing` is the
//! persisted rollover marker; `rollover_stage` records how far the rollover
//! got so an interrupted close can resume without repeating work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonStatus {
    Active,
    Closing,
    Ended,
}

impl SeasonStatus {
    /// Active and closing seasons are both "current"
    pub fn is_current(self) -> bool {
        !matches!(self, SeasonStatus::Ended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeasonStatus::Active => "active",
            SeasonStatus::Closing => "closing",
            SeasonStatus::Ended => "ended",
        }
    }
}

impl FromStr for SeasonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SeasonStatus::Active),
            "closing" => Ok(SeasonStatus::Closing),
            "ended" => Ok(SeasonStatus::Ended),
            other => Err(format!("unknown season status: {}", other)),
        }
    }
}

impl fmt::Display for SeasonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Saga checkpoints, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverStage {
    Started,
    Ranked,
    Promoted,
    /// Season ended and its successor created; seeding still pending
    Opened,
    Completed,
}

impl RolloverStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloverStage::Started => "started",
            RolloverStage::Ranked => "ranked",
            RolloverStage::Promoted => "promoted",
            RolloverStage::Opened => "opened",
            RolloverStage::Completed => "completed",
        }
    }
}

impl FromStr for RolloverStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RolloverStage::Started),
            "ranked" => Ok(RolloverStage::Ranked),
            "promoted" => Ok(RolloverStage::Promoted),
            "opened" => Ok(RolloverStage::Opened),
            "completed" => Ok(RolloverStage::Completed),
            other => Err(format!("unknown rollover stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: SeasonStatus,
    pub rollover_stage: Option<RolloverStage>,
    pub rollover_started_at: Option<DateTime<Utc>>,
    pub next_season_id: Option<Uuid>,
}

impl Season {
    pub fn new(starts_at: DateTime<Utc>, length: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            starts_at,
            ends_at: starts_at + length,
            status: SeasonStatus::Active,
            rollover_stage: None,
            rollover_started_at: None,
            next_season_id: None,
        }
    }

    /// The season that follows this one: starts when this one ends
    pub fn successor(&self, length: Duration) -> Self {
        Self::new(self.ends_at, length)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// Whether a closing season's rollover lease has lapsed
    pub fn lease_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        match self.rollover_started_at {
            Some(started) => now - started >= lease,
            None => true,
        }
    }

    /// Ended, but next-season seeding has not been confirmed
    pub fn rollover_pending(&self) -> bool {
        self.status == SeasonStatus::Ended
            && self.rollover_stage != Some(RolloverStage::Completed)
    }
}
