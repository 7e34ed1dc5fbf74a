//! Seasonal XP Leagues
//!
//! Marketplace participants earn XP for useful actions. XP accrues into a
//! per-season membership; at season close members are ranked and the top and
//! bottom slices move one tier up or down.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ VerificationGate │────►│   XpLedger   │────►│   LeagueStore    │
//! │ (eligibility)    │     │ (accrual)    │     │ (memory / pg)    │
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//!                                 │                      ▲
//!                                 ▼                      │
//!                         ┌───────────────┐     ┌──────────────────┐
//!                         │ SeasonManager │────►│ RankComputer     │
//!                         │ (rollover)    │     │ PromotionEngine  │
//!                         └───────────────┘     └──────────────────┘
//! ```
//!
//! ## Tiers
//!
//! bronze → silver → gold → platinum → emerald → diamond. Point thresholds are
//! informational only; tiers change solely at season close.

mod engine;
mod leaderboard;
mod ledger;
mod manager;
mod membership;
mod promotion;
mod ranking;
mod rules;
mod season;
mod tier;
mod verification;

pub use engine::LeagueEngine;
pub use leaderboard::{clamp_limit, LeaderboardQuery, DEFAULT_LIMIT, MAX_LIMIT};
pub use ledger::{RecordOutcome, XpLedger};
pub use manager::{RolloverOutcome, RolloverReport, SeasonManager, SeasonSettings};
pub use membership::{LeaderboardEntry, Membership, TierChange, UserLeagueStats, XpEvent};
pub use promotion::{
    plan_promotions, PromotionEngine, PromotionOutcome, PromotionRules, DEMOTE_BOTTOM_PCT,
    PROMOTE_TOP_PCT,
};
pub use ranking::{compute_ranks, leaderboard_order, RankComputer};
pub use rules::{points_for, XpEventType};
pub use season::{RolloverStage, Season, SeasonStatus};
pub use tier::{LeagueTier, LeagueTierInfo};
pub use verification::{
    can_earn_points, check_eligibility, ComplianceStatus, CredentialsStatus, Eligibility,
    KycStatus, VerificationStatus,
};
