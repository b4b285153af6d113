//! Request Handlers
//!
//! Wallet, history and statistics reads. Crash round and single-shot game
//! handlers live in `crash.rs` and `games.rs`.

use super::{
    errors::ApiError,
    middleware::{MaybeParticipant, Participant, RequestId},
    models::*,
    websocket::WebSocketManager,
};
use crate::{
    errors::StoreError,
    games::{
        crash::CrashEngine,
        outcome::CrashPoint,
        processor::InstantGameProcessor,
        types::{Amount, GameOutcome, GameType, HistoryRecord},
    },
    metrics::CasinoMetrics,
    store::{BalanceStore, HistoryFilter, HistoryStore},
};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;

/// Records scanned when computing statistics
const STATS_WINDOW: usize = 10_000;

const MAX_HISTORY_LIMIT: usize = 100;

/// Shared application state
pub struct AppState {
    pub engine: Arc<CrashEngine>,
    pub games: Arc<InstantGameProcessor>,
    pub balances: Arc<dyn BalanceStore>,
    pub history: Arc<dyn HistoryStore>,
    pub websocket_manager: Arc<WebSocketManager>,
    pub metrics: Arc<CasinoMetrics>,
    pub metrics_enabled: bool,
    pub version: String,
}

fn store_failure(request_id: &RequestId, what: &str, err: StoreError) -> ApiError {
    error!(request_id = %request_id.0, error = %err, "{} failed", what);
    ApiError::internal_error(request_id.0.clone(), "Internal server error".to_string())
}

/// Caller's balance
/// GET /api/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .balances
        .balance(&participant)
        .await
        .map_err(|e| store_failure(&request_id, "balance read", e))?;

    Ok(Json(BalanceResponse {
        participant_id: participant,
        balance,
    }))
}

/// Recent results, newest first
/// GET /api/history?game={game}&limit={n}&mine={bool}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    MaybeParticipant(participant): MaybeParticipant,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let participant = if params.mine {
        match participant {
            Some(p) => Some(p),
            None => {
                return Err(ApiError::unauthorized(
                    request_id.0.clone(),
                    "mine=true requires a participant".to_string(),
                ))
            }
        }
    } else {
        None
    };

    let filter = HistoryFilter {
        game: params.game,
        participant,
        since: None,
    };
    let records = state
        .history
        .recent(&filter, params.limit.clamp(1, MAX_HISTORY_LIMIT))
        .await
        .map_err(|e| store_failure(&request_id, "history read", e))?;

    Ok(Json(HistoryResponse { records }))
}

/// Aggregate statistics over the last 24 hours
/// GET /api/stats
pub async fn stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let filter = HistoryFilter {
        since: Some(Utc::now() - Duration::hours(24)),
        ..Default::default()
    };
    let records = state
        .history
        .recent(&filter, STATS_WINDOW)
        .await
        .map_err(|e| store_failure(&request_id, "stats read", e))?;

    let last_crash_point = state
        .engine
        .recent_outcomes(1, None)
        .first()
        .map(|outcome| outcome.crash_point);

    Ok(Json(summarize(&records, last_crash_point)))
}

fn summarize(records: &[HistoryRecord], last_crash_point: Option<CrashPoint>) -> StatsResponse {
    let today = Utc::now().date_naive();
    let total_won_today = records
        .iter()
        .filter(|r| r.outcome == GameOutcome::Win && r.timestamp.date_naive() == today)
        .fold(Amount::ZERO, |total, r| total.saturating_add(r.payout));

    let active_players = records
        .iter()
        .map(|r| &r.participant_id)
        .collect::<HashSet<_>>()
        .len();

    let games = GameType::ALL
        .iter()
        .map(|&game| {
            let (plays, wins, multiplier_sum) = records
                .iter()
                .filter(|r| r.game == game)
                .fold((0u64, 0u64, 0f64), |(plays, wins, sum), r| {
                    if r.outcome == GameOutcome::Win {
                        (plays + 1, wins + 1, sum + r.multiplier.as_f64())
                    } else {
                        (plays + 1, wins, sum)
                    }
                });
            GameStats {
                game,
                plays,
                wins,
                win_rate: if plays == 0 { 0.0 } else { wins as f64 / plays as f64 },
                avg_multiplier: if wins == 0 { 0.0 } else { multiplier_sum / wins as f64 },
            }
        })
        .collect();

    StatsResponse {
        total_won_today,
        active_players,
        games,
        last_crash_point,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{Multiplier, ParticipantId};

    fn record(id: u64, who: &str, game: GameType, won: bool, multiplier: u64) -> HistoryRecord {
        HistoryRecord {
            id,
            participant_id: ParticipantId::from(who),
            game,
            round_id: None,
            bet: Amount::from_cents(100),
            multiplier: Multiplier::from_hundredths(multiplier),
            payout: if won { Amount::from_cents(multiplier) } else { Amount::ZERO },
            outcome: if won { GameOutcome::Win } else { GameOutcome::Loss },
            detail: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_summarize() {
        let records = vec![
            record(1, "alice", GameType::Crash, true, 150),
            record(2, "bob", GameType::Crash, false, 200),
            record(3, "alice", GameType::Dice, true, 250),
            record(4, "alice", GameType::Crash, true, 250),
        ];
        let stats = summarize(&records, None);
        assert_eq!(stats.total_won_today, Amount::from_cents(650));
        assert_eq!(stats.active_players, 2);

        let crash = stats.games.iter().find(|g| g.game == GameType::Crash).unwrap();
        assert_eq!(crash.plays, 3);
        assert_eq!(crash.wins, 2);
        assert!((crash.avg_multiplier - 2.0).abs() < 1e-9);

        let roulette = stats.games.iter().find(|g| g.game == GameType::Roulette).unwrap();
        assert_eq!(roulette.plays, 0);
        assert_eq!(roulette.win_rate, 0.0);
    }
}
