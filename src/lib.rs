//! Charter League
//!
//! Seasonal XP, league tiers and leaderboards for the charter marketplace.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Error types
//! ├── retry.rs       - Backoff for transient storage failures
//! ├── scheduler.rs   - Periodic season close
//! ├── league/        - League engine
//! │   ├── verification.rs - Eligibility gate
//! │   ├── rules.rs        - XP rule table
//! │   ├── tier.rs         - Tier reference data
//! │   ├── season.rs       - Season lifecycle types
//! │   ├── membership.rs   - Membership, event and leaderboard rows
//! │   ├── ledger.rs       - XP accrual
//! │   ├── ranking.rs      - Positional ranks
//! │   ├── promotion.rs    - Promotion and demotion
//! │   ├── manager.rs      - Season rollover
//! │   ├── leaderboard.rs  - Read paths
//! │   └── engine.rs       - Component wiring
//! ├── api/           - HTTP API endpoints
//! │   ├── league.rs     - League API
//! │   └── middleware.rs - Admin auth, headers, limits
//! └── database/      - Persistence
//!     ├── store.rs    - LeagueStore trait
//!     ├── postgres.rs - PostgreSQL backend
//!     ├── pool.rs     - Pool and schema
//!     └── memory.rs   - In-process backend
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod league;
pub mod retry;
pub mod scheduler;

// Re-export main types for convenience
pub use config::LeagueConfig;
pub use database::{DatabasePool, InMemoryStore, LeagueStore, PgLeagueStore};
pub use error::{LeagueError, LeagueResult, StoreError};
pub use league::{
    LeaderboardEntry, LeagueEngine, LeagueTier, Membership, RecordOutcome, RolloverOutcome,
    Season, SeasonSettings, SeasonStatus, UserLeagueStats, VerificationStatus, XpEvent,
    XpEventType,
};
pub use retry::RetryPolicy;
pub use scheduler::SeasonScheduler;

// Re-export API types
pub use api::{create_app, LeagueApiState, SecurityConfig, SecurityState};
