//! Promotion Engine
//!
//! At season close the top `promote_top_pct` of the ranked members move one
//! tier up and the bottom `demote_bottom_pct` move one tier down. Cutoffs are
//! `floor(total * pct)`. Moves past diamond or below bronze are no-ops.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::LeagueStore;
use crate::error::{LeagueError, LeagueResult};

use super::membership::{Membership, TierChange};

pub const PROMOTE_TOP_PCT: f64 = 0.20;
pub const DEMOTE_BOTTOM_PCT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionRules {
    pub promote_top_pct: f64,
    pub demote_bottom_pct: f64,
}

impl Default for PromotionRules {
    fn default() -> Self {
        Self {
            promote_top_pct: PROMOTE_TOP_PCT,
            demote_bottom_pct: DEMOTE_BOTTOM_PCT,
        }
    }
}

impl PromotionRules {
    pub fn promote_cutoff(&self, total: usize) -> usize {
        (total as f64 * self.promote_top_pct).floor() as usize
    }

    pub fn demote_cutoff(&self, total: usize) -> usize {
        (total as f64 * self.demote_bottom_pct).floor() as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub promoted: Vec<String>,
    pub demoted: Vec<String>,
    /// Selected for a move but already at the top or bottom tier
    pub unchanged_at_cap: Vec<String>,
    #[serde(skip)]
    pub changes: Vec<TierChange>,
}

/// Decide tier moves for memberships that are already in rank order
pub fn plan_promotions(ranked: &[Membership], rules: &PromotionRules) -> PromotionOutcome {
    let total = ranked.len();
    let promote_cutoff = rules.promote_cutoff(total).min(total);
    // A member inside both windows (tiny seasons) is only promoted
    let demote_cutoff = rules.demote_cutoff(total).min(total - promote_cutoff);

    let mut outcome = PromotionOutcome::default();

    for m in &ranked[..promote_cutoff] {
        match m.league_tier.promoted() {
            Some(to) => {
                outcome.promoted.push(m.user_id.clone());
                outcome.changes.push(TierChange {
                    user_id: m.user_id.clone(),
                    from: m.league_tier,
                    to,
                });
            }
            None => outcome.unchanged_at_cap.push(m.user_id.clone()),
        }
    }

    for m in &ranked[total - demote_cutoff..] {
        match m.league_tier.demoted() {
            Some(to) => {
                outcome.demoted.push(m.user_id.clone());
                outcome.changes.push(TierChange {
                    user_id: m.user_id.clone(),
                    from: m.league_tier,
                    to,
                });
            }
            None => outcome.unchanged_at_cap.push(m.user_id.clone()),
        }
    }

    outcome
}

pub struct PromotionEngine {
    store: Arc<dyn LeagueStore>,
    rules: PromotionRules,
}

impl PromotionEngine {
    pub fn new(store: Arc<dyn LeagueStore>, rules: PromotionRules) -> Self {
        Self { store, rules }
    }

    /// Apply promotions for a season whose ranks were just refreshed.
    ///
    /// Windows are taken over the stored ranks. Points earned after the
    /// refresh do not move anyone, and members who joined after it have no
    /// rank and sit outside both windows.
    ///
    /// The tier updates commit together with the season's move from the
    /// `ranked` to the `promoted` stage; if the season is not at `ranked`
    /// nothing is written and a consistency error is returned.
    pub async fn close_promotions(&self, season_id: Uuid) -> LeagueResult<PromotionOutcome> {
        let mut ranked: Vec<Membership> = self
            .store
            .list_memberships(season_id)
            .await?
            .into_iter()
            .filter(|m| m.rank.is_some())
            .collect();
        ranked.sort_by_key(|m| m.rank);

        let outcome = plan_promotions(&ranked, &self.rules);
        let applied = self
            .store
            .apply_tier_changes(season_id, &outcome.changes)
            .await?;
        if !applied {
            return Err(LeagueError::Consistency(format!(
                "season {} is not awaiting promotions",
                season_id
            )));
        }

        info!(
            season_id = %season_id,
            members = ranked.len(),
            promoted = outcome.promoted.len(),
            demoted = outcome.demoted.len(),
            capped = outcome.unchanged_at_cap.len(),
            "Season promotions applied"
        );
        Ok(outcome)
    }
}
