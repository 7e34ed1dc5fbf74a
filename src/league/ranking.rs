//! Rank Computer
//!
//! Ranks are positional: members are ordered by points descending and then
//! by user id ascending, and rank is the 1-based position in that order.
//! Equal points never share a rank; the user id breaks the tie.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::database::LeagueStore;
use crate::error::LeagueResult;

use super::membership::Membership;

/// Total order used by ranking, promotion and the leaderboard view
pub fn leaderboard_order(a: &Membership, b: &Membership) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| a.user_id.as_bytes().cmp(b.user_id.as_bytes()))
}

/// Sort in place and assign positional ranks
pub fn compute_ranks(memberships: &mut [Membership]) {
    memberships.sort_by(leaderboard_order);
    for (i, m) in memberships.iter_mut().enumerate() {
        m.rank = Some(i as u32 + 1);
    }
}

pub struct RankComputer {
    store: Arc<dyn LeagueStore>,
}

impl RankComputer {
    pub fn new(store: Arc<dyn LeagueStore>) -> Self {
        Self { store }
    }

    /// Recompute and persist ranks; returns memberships in rank order
    pub async fn refresh_ranks(&self, season_id: Uuid) -> LeagueResult<Vec<Membership>> {
        let mut memberships = self.store.list_memberships(season_id).await?;
        compute_ranks(&mut memberships);

        let ranks: Vec<(String, u32)> = memberships
            .iter()
            .filter_map(|m| m.rank.map(|r| (m.user_id.clone(), r)))
            .collect();
        self.store.store_ranks(season_id, &ranks).await?;

        debug!(season_id = %season_id, members = ranks.len(), "Ranks refreshed");
        Ok(memberships)
    }
}
