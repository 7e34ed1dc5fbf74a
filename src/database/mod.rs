//! Persistence for seasons, memberships and the XP ledger
//!
//! `LeagueStore` is the seam; `PgLeagueStore` is the production backend and
//! `InMemoryStore` the fallback when PostgreSQL is disabled.

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use memory::InMemoryStore;
pub use pool::DatabasePool;
pub use postgres::PgLeagueStore;
pub use store::{LeagueStore, StoreResult};
