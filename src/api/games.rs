//! Single-shot game endpoints
//!
//! Each request is debited, resolved and settled before the response goes
//! out. Declines come back as `accepted: false` with a reason code.

use super::{
    errors::ApiError,
    handlers::AppState,
    middleware::{Participant, RequestId},
    models::*,
};
use crate::errors::{DeclineReason, GameError};
use crate::games::single_shot::InstantBet;
use crate::games::types::{Amount, Multiplier, ParticipantId};
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::info;

fn declined(reason: DeclineReason) -> PlayResponse {
    PlayResponse {
        accepted: false,
        receipt: None,
        decline: Some(reason.into()),
    }
}

async fn play(
    state: &AppState,
    request_id: RequestId,
    participant: ParticipantId,
    amount: f64,
    bet: Option<InstantBet>,
) -> Result<Json<PlayResponse>, ApiError> {
    let stake = match Amount::from_units(amount).filter(|a| !a.is_zero()) {
        Some(stake) => stake,
        None => return Ok(Json(declined(DeclineReason::InvalidAmount))),
    };
    let Some(bet) = bet else {
        return Ok(Json(declined(DeclineReason::InvalidChoice)));
    };

    match state.games.play(&participant, stake, bet).await {
        Ok(receipt) => {
            info!(
                request_id = %request_id.0,
                participant = %participant,
                game = %receipt.game,
                result = %receipt.outcome,
                payout = %receipt.payout,
                "game played"
            );
            Ok(Json(PlayResponse {
                accepted: true,
                receipt: Some(receipt),
                decline: None,
            }))
        }
        Err(GameError::Declined(reason)) => Ok(Json(declined(reason))),
        Err(e) => Err(ApiError::from_game(request_id.0, e)),
    }
}

/// POST /api/games/coinflip
pub async fn coinflip_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CoinFlipRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let bet = InstantBet::CoinFlip { choice: request.choice };
    play(&state, request_id, participant, request.amount, Some(bet)).await
}

/// POST /api/games/dice
pub async fn dice_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiceRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let bet = InstantBet::Dice {
        target: request.target,
        over: request.over,
    };
    play(&state, request_id, participant, request.amount, Some(bet)).await
}

/// POST /api/games/limbo
pub async fn limbo_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<LimboRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    // Range is checked by the processor; only unrepresentable targets stop here
    let bet = Multiplier::from_f64(request.target).map(|target| InstantBet::Limbo { target });
    play(&state, request_id, participant, request.amount, bet).await
}

/// POST /api/games/mines
pub async fn mines_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<MinesRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let bet = InstantBet::Mines {
        mines: request.mines,
        picks: request.picks,
    };
    play(&state, request_id, participant, request.amount, Some(bet)).await
}

/// POST /api/games/roulette
pub async fn roulette_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RouletteRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let bet = InstantBet::Roulette { bet: request.bet };
    play(&state, request_id, participant, request.amount, Some(bet)).await
}
