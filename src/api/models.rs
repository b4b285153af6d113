//! API Request and Response Models

use crate::errors::DeclineReason;
use crate::games::outcome::CrashPoint;
use crate::games::processor::PlayReceipt;
use crate::games::publisher::RoundOutcome;
use crate::games::single_shot::RouletteBet;
use crate::games::types::{Amount, CoinChoice, GameType, HistoryRecord, Multiplier, ParticipantId, RoundId};
use serde::{Deserialize, Serialize};

/// Why a request was turned down, as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decline {
    pub reason: DeclineReason,
    pub message: String,
}

impl From<DeclineReason> for Decline {
    fn from(reason: DeclineReason) -> Self {
        Self {
            reason,
            message: reason.message().to_string(),
        }
    }
}

// Crash round

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    /// Decimal units, rounded to the cent
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetResponse {
    pub accepted: bool,
    pub round_id: RoundId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(flatten)]
    pub decline: Option<Decline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutResponse {
    pub accepted: bool,
    pub round_id: RoundId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Multiplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
    #[serde(flatten)]
    pub decline: Option<Decline>,
}

#[derive(Debug, Deserialize)]
pub struct OutcomesQuery {
    #[serde(default = "default_outcomes_limit")]
    pub limit: usize,
    /// Only rounds older than this one
    #[serde(default)]
    pub before: Option<u64>,
}

fn default_outcomes_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomesResponse {
    pub outcomes: Vec<RoundOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_before: Option<RoundId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub round_id: u64,
    pub seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub round_id: RoundId,
    pub crash_point: CrashPoint,
    pub seed_hash: String,
    /// Whether the result agrees with the recorded outcome, when still on record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_record: Option<bool>,
}

// Single-shot games

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinFlipRequest {
    pub amount: f64,
    pub choice: CoinChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceRequest {
    pub amount: f64,
    pub target: u8,
    /// Win on a roll above the target; below otherwise
    #[serde(default)]
    pub over: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimboRequest {
    pub amount: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinesRequest {
    pub amount: f64,
    pub mines: u8,
    /// Grid cells 0..25
    pub picks: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouletteRequest {
    pub amount: f64,
    pub bet: RouletteBet,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayResponse {
    pub accepted: bool,
    #[serde(flatten)]
    pub receipt: Option<PlayReceipt>,
    #[serde(flatten)]
    pub decline: Option<Decline>,
}

// Wallet and history

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub participant_id: ParticipantId,
    pub balance: Amount,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub game: Option<GameType>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Only the caller's own records
    #[serde(default)]
    pub mine: bool,
}

fn default_history_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub records: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub game: GameType,
    pub plays: u64,
    pub wins: u64,
    pub win_rate: f64,
    /// Mean multiplier over winning plays
    pub avg_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_won_today: Amount,
    pub active_players: usize,
    pub games: Vec<GameStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_crash_point: Option<CrashPoint>,
}
