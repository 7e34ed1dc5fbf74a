//! XP Ledger
//!
//! Records point-earning events. Accrual must never break the business action
//! that triggered it, so `record_event` does not return an error: every
//! result, including storage failure, is described by `RecordOutcome`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::database::LeagueStore;
use crate::error::StoreError;
use crate::retry::RetryPolicy;

use super::manager::SeasonManager;
use super::membership::{Membership, XpEvent};
use super::rules::XpEventType;
use super::season::Season;
use super::verification::{check_eligibility, VerificationStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded { event: XpEvent, membership: Membership },
    /// Event type not in the rule table
    UnknownEventType { event_type: String },
    /// Malformed request, e.g. empty user id
    Invalid { reason: String },
    Ineligible { reason: String },
    /// Storage kept failing after retries
    Failed { error: String },
}

impl RecordOutcome {
    pub fn recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

pub struct XpLedger {
    store: Arc<dyn LeagueStore>,
    seasons: Arc<SeasonManager>,
    retry: RetryPolicy,
}

impl XpLedger {
    pub fn new(store: Arc<dyn LeagueStore>, seasons: Arc<SeasonManager>, retry: RetryPolicy) -> Self {
        Self { store, seasons, retry }
    }

    /// Record against the current season, resolved through the season manager
    pub async fn record(
        &self,
        user_id: &str,
        event_type: &str,
        meta: serde_json::Value,
        verification: Option<&VerificationStatus>,
    ) -> RecordOutcome {
        match self.seasons.current_season().await {
            Ok(season) => {
                self.record_event(&season, user_id, event_type, meta, verification)
                    .await
            }
            Err(e) => {
                error!(user_id = %user_id, event_type = %event_type, "No season to record xp against: {}", e);
                RecordOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Record against an explicit season handle. If the handle turns out to
    /// be stale (the season ended meanwhile) the current season is looked up
    /// once and the event is re-targeted.
    pub async fn record_event(
        &self,
        season: &Season,
        user_id: &str,
        event_type: &str,
        meta: serde_json::Value,
        verification: Option<&VerificationStatus>,
    ) -> RecordOutcome {
        let Ok(kind) = event_type.parse::<XpEventType>() else {
            warn!(user_id = %user_id, event_type = %event_type, "Ignoring unknown xp event type");
            return RecordOutcome::UnknownEventType {
                event_type: event_type.to_string(),
            };
        };

        if user_id.trim().is_empty() {
            warn!(event_type = %event_type, "Ignoring xp event without user id");
            return RecordOutcome::Invalid {
                reason: "user_id is empty".to_string(),
            };
        }

        if let Some(status) = verification {
            let eligibility = check_eligibility(status, kind);
            if !eligibility.eligible {
                let reason = eligibility.reason.unwrap_or_default();
                warn!(
                    user_id = %user_id,
                    event_type = %kind,
                    reason = %reason,
                    "Xp not awarded: verification gate rejected user"
                );
                return RecordOutcome::Ineligible { reason };
            }
        }

        let mut event = XpEvent::new(user_id.to_string(), season.id, kind, meta);
        let result = match self.append(&event).await {
            Err(StoreError::SeasonNotOpen(stale)) => {
                debug!(season_id = %stale, "Season handle is stale, re-targeting xp event");
                match self.seasons.current_season().await {
                    Ok(current) if current.id != stale => {
                        event.season_id = current.id;
                        self.append(&event).await
                    }
                    Ok(_) => Err(StoreError::SeasonNotOpen(stale)),
                    Err(e) => Err(StoreError::Unavailable(e.to_string())),
                }
            }
            other => other,
        };

        match result {
            Ok(membership) => {
                debug!(
                    user_id = %user_id,
                    season_id = %event.season_id,
                    event_type = %kind,
                    points = event.points,
                    total = membership.points,
                    "Xp recorded"
                );
                RecordOutcome::Recorded { event, membership }
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    season_id = %event.season_id,
                    event_type = %kind,
                    "Xp award lost after retries: {}",
                    e
                );
                RecordOutcome::Failed { error: e.to_string() }
            }
        }
    }

    async fn append(&self, event: &XpEvent) -> Result<Membership, StoreError> {
        let mut attempts = 0u32;
        let result = self
            .retry
            .run("append_xp_event", || {
                attempts += 1;
                self.store.append_xp_event(event)
            })
            .await;

        match result {
            // A replayed id means an earlier attempt committed before its reply was lost
            Err(StoreError::Conflict(_)) if attempts > 1 => {
                debug!(event_id = %event.id, "Xp event already committed by an earlier attempt");
                self.store
                    .get_membership(&event.user_id, event.season_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Conflict(format!(
                            "xp event {} committed without a membership",
                            event.id
                        ))
                    })
            }
            other => other,
        }
    }
}
