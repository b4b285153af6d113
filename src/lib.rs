//! Crashline - multiplayer crash game server
//!
//! A shared crash round runs on a fixed timeline: a betting countdown, a
//! climbing multiplier, a crash at a pre-committed point, then the next
//! round. Participants bet during the countdown and cash out while the
//! multiplier climbs; every wager is settled exactly once. Single-shot games
//! (coin flip, dice, limbo, mines, roulette) share the same wallet and
//! history.

pub mod api;
pub mod config;
pub mod errors;
pub mod games;
pub mod metrics;
pub mod store;

pub use config::{CasinoConfig, ConfigLoader};
pub use errors::{CasinoError, CasinoResult, CrashError, DeclineReason, GameError};
pub use games::crash::CrashEngine;
pub use metrics::CasinoMetrics;
pub use store::{BalanceStore, HistoryStore, MemoryStore};
