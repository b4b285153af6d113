//! Error types for the crashline service
//!
//! Three families: declines (a normal answer to a bad request), store
//! failures (infrastructure), and engine faults (broken invariants that halt
//! the round engine).

use crate::games::types::{Amount, RoundId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root error type for service start-up and wiring
#[derive(Debug, thiserror::Error)]
pub enum CasinoError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Round engine fault: {0}")]
    Engine(#[from] EngineFault),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for service operations
pub type CasinoResult<T> = Result<T, CasinoError>;

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl ConfigurationError {
    pub fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Balance and history backend errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Balance overflow for account {0}")]
    Overflow(String),

    #[error("Write rejected: {0}")]
    WriteFailed(String),
}

/// Why a bet, cash-out or play was refused. Declines never mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    InvalidAmount,
    BettingClosed,
    AlreadyPlaced,
    InsufficientBalance,
    RoundNotStarted,
    RoundCrashed,
    NoActiveWager,
    AlreadyCashedOut,
    InvalidChoice,
}

impl DeclineReason {
    /// Stable machine-readable code, also used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::InvalidAmount => "invalid_amount",
            DeclineReason::BettingClosed => "betting_closed",
            DeclineReason::AlreadyPlaced => "already_placed",
            DeclineReason::InsufficientBalance => "insufficient_balance",
            DeclineReason::RoundNotStarted => "round_not_started",
            DeclineReason::RoundCrashed => "round_crashed",
            DeclineReason::NoActiveWager => "no_active_wager",
            DeclineReason::AlreadyCashedOut => "already_cashed_out",
            DeclineReason::InvalidChoice => "invalid_choice",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DeclineReason::InvalidAmount => "Bet amount is outside the allowed range",
            DeclineReason::BettingClosed => "Betting is closed for this round",
            DeclineReason::AlreadyPlaced => "A bet is already placed for this round",
            DeclineReason::InsufficientBalance => "Insufficient balance",
            DeclineReason::RoundNotStarted => "The round has not started yet",
            DeclineReason::RoundCrashed => "The round has already crashed",
            DeclineReason::NoActiveWager => "No active bet in this round",
            DeclineReason::AlreadyCashedOut => "Already cashed out",
            DeclineReason::InvalidChoice => "Invalid game parameters",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broken engine invariants. The driver halts the engine on any of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFault {
    #[error("entropy source failed: {0}")]
    Entropy(String),

    #[error("crash point {0} hundredths outside 101..=348")]
    CrashPointOutOfRange(u64),
}

/// Win/loss settlement failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// The credit did not go through; no balance changed.
    #[error("credit failed: {0}")]
    Credit(StoreError),

    /// The credit went through but the win record was not written.
    #[error("win credited (balance {balance}) but history append failed: {source}")]
    History { balance: Amount, source: StoreError },

    #[error("loss record append failed: {0}")]
    LossRecord(StoreError),
}

impl SettlementError {
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::Credit(_) => "credit",
            SettlementError::History { .. } => "win_record",
            SettlementError::LossRecord(_) => "loss_record",
        }
    }
}

/// Crash round operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrashError {
    #[error("declined: {0}")]
    Declined(DeclineReason),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("settlement failure: {0}")]
    Settlement(#[from] SettlementError),

    #[error("round engine halted: {0}")]
    Halted(String),

    #[error("round {0} not found")]
    RoundNotFound(RoundId),
}

impl From<DeclineReason> for CrashError {
    fn from(reason: DeclineReason) -> Self {
        CrashError::Declined(reason)
    }
}

/// Single-shot game errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("declined: {0}")]
    Declined(DeclineReason),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("settlement failure: {0}")]
    Settlement(#[from] SettlementError),
}

impl From<DeclineReason> for GameError {
    fn from(reason: DeclineReason) -> Self {
        GameError::Declined(reason)
    }
}
