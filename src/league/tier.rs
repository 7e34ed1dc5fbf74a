//! League Tiers
//!
//! Six fixed, ordered tiers. Neighbor lookup is a constant-time index into
//! `LeagueTier::ALL`, so promotion never needs a round trip to storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeagueTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
}

impl LeagueTier {
    /// All tiers in ascending sort order
    pub const ALL: [LeagueTier; 6] = [
        LeagueTier::Bronze,
        LeagueTier::Silver,
        LeagueTier::Gold,
        LeagueTier::Platinum,
        LeagueTier::Emerald,
        LeagueTier::Diamond,
    ];

    pub const BOTTOM: LeagueTier = LeagueTier::Bronze;
    pub const TOP: LeagueTier = LeagueTier::Diamond;

    /// 1-based sort position (bronze = 1)
    pub fn sort_order(self) -> u8 {
        self as u8 + 1
    }

    /// Informational point threshold shown next to the tier
    pub fn point_threshold(self) -> i64 {
        match self {
            LeagueTier::Bronze => 0,
            LeagueTier::Silver => 100,
            LeagueTier::Gold => 250,
            LeagueTier::Platinum => 500,
            LeagueTier::Emerald => 1000,
            LeagueTier::Diamond => 2000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeagueTier::Bronze => "bronze",
            LeagueTier::Silver => "silver",
            LeagueTier::Gold => "gold",
            LeagueTier::Platinum => "platinum",
            LeagueTier::Emerald => "emerald",
            LeagueTier::Diamond => "diamond",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LeagueTier::Bronze => "Bronze",
            LeagueTier::Silver => "Silver",
            LeagueTier::Gold => "Gold",
            LeagueTier::Platinum => "Platinum",
            LeagueTier::Emerald => "Emerald",
            LeagueTier::Diamond => "Diamond",
        }
    }

    /// Next tier up, or `None` at diamond
    pub fn promoted(self) -> Option<LeagueTier> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// Next tier down, or `None` at bronze
    pub fn demoted(self) -> Option<LeagueTier> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl Default for LeagueTier {
    fn default() -> Self {
        LeagueTier::BOTTOM
    }
}

impl fmt::Display for LeagueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeagueTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown league tier: {}", s))
    }
}

/// Reference row for the `league_tiers` table and the tiers endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueTierInfo {
    pub tier: LeagueTier,
    pub name: String,
    pub sort_order: u8,
    pub point_threshold: i64,
}

impl From<LeagueTier> for LeagueTierInfo {
    fn from(tier: LeagueTier) -> Self {
        Self {
            tier,
            name: tier.display_name().to_string(),
            sort_order: tier.sort_order(),
            point_threshold: tier.point_threshold(),
        }
    }
}
