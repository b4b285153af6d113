//! Crash round endpoints

use super::{
    errors::ApiError,
    handlers::AppState,
    middleware::{MaybeParticipant, Participant, RequestId},
    models::*,
};
use crate::errors::{CrashError, DeclineReason};
use crate::games::fairness;
use crate::games::publisher::RoundStatus;
use crate::games::types::{Amount, RoundId};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::{debug, info};

const MAX_OUTCOMES_LIMIT: usize = 100;

/// Round a decline is reported against
fn current_round(state: &AppState) -> RoundId {
    state.engine.snapshot(None).round.round_id
}

fn declined_bet(round_id: RoundId, reason: DeclineReason) -> BetResponse {
    BetResponse {
        accepted: false,
        round_id,
        amount: None,
        balance: None,
        decline: Some(reason.into()),
    }
}

fn declined_cash_out(round_id: RoundId, reason: DeclineReason) -> CashOutResponse {
    CashOutResponse {
        accepted: false,
        round_id,
        multiplier: None,
        payout: None,
        balance: None,
        decline: Some(reason.into()),
    }
}

/// Place a bet on the current round
/// POST /api/crash/bet
pub async fn bet_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
    Json(request): Json<BetRequest>,
) -> Result<Json<BetResponse>, ApiError> {
    let amount = match Amount::from_units(request.amount).filter(|a| !a.is_zero()) {
        Some(amount) => amount,
        None => return Ok(Json(declined_bet(current_round(&state), DeclineReason::InvalidAmount))),
    };

    match state.engine.place_bet(&participant, amount).await {
        Ok(receipt) => {
            info!(
                request_id = %request_id.0,
                participant = %participant,
                round_id = %receipt.round_id,
                amount = %receipt.amount,
                "crash bet accepted"
            );
            Ok(Json(BetResponse {
                accepted: true,
                round_id: receipt.round_id,
                amount: Some(receipt.amount),
                balance: Some(receipt.balance),
                decline: None,
            }))
        }
        Err(CrashError::Declined(reason)) => Ok(Json(declined_bet(current_round(&state), reason))),
        Err(e) => Err(ApiError::from_crash(request_id.0, e)),
    }
}

/// Cash out the caller's bet at the current multiplier
/// POST /api/crash/cashout
pub async fn cashout_handler(
    Extension(request_id): Extension<RequestId>,
    Participant(participant): Participant,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CashOutResponse>, ApiError> {
    match state.engine.cash_out(&participant).await {
        Ok(receipt) => {
            info!(
                request_id = %request_id.0,
                participant = %participant,
                round_id = %receipt.round_id,
                multiplier = %receipt.multiplier,
                payout = %receipt.payout,
                "crash cash-out accepted"
            );
            Ok(Json(CashOutResponse {
                accepted: true,
                round_id: receipt.round_id,
                multiplier: Some(receipt.multiplier),
                payout: Some(receipt.payout),
                balance: Some(receipt.balance),
                decline: None,
            }))
        }
        Err(CrashError::Declined(reason)) => Ok(Json(declined_cash_out(current_round(&state), reason))),
        Err(e) => Err(ApiError::from_crash(request_id.0, e)),
    }
}

/// Current round, plus the caller's wager when identified
/// GET /api/crash/status
pub async fn status_handler(
    MaybeParticipant(participant): MaybeParticipant,
    State(state): State<Arc<AppState>>,
) -> Json<RoundStatus> {
    Json(state.engine.snapshot(participant.as_ref()))
}

/// A specific round, current or recently finished
/// GET /api/crash/status/:round_id
pub async fn round_status_handler(
    Extension(request_id): Extension<RequestId>,
    MaybeParticipant(participant): MaybeParticipant,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<u64>,
) -> Result<Json<RoundStatus>, ApiError> {
    state
        .engine
        .status(Some(RoundId(round_id)), participant.as_ref())
        .map(Json)
        .map_err(|e| ApiError::from_crash(request_id.0, e))
}

/// Finished rounds, newest first
/// GET /api/crash/outcomes?limit={n}&before={round_id}
pub async fn outcomes_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OutcomesQuery>,
) -> Json<OutcomesResponse> {
    let limit = params.limit.clamp(1, MAX_OUTCOMES_LIMIT);
    let outcomes = state.engine.recent_outcomes(limit, params.before.map(RoundId));
    let next_before = if outcomes.len() == limit {
        outcomes.last().map(|o| o.round_id)
    } else {
        None
    };

    Json(OutcomesResponse { outcomes, next_before })
}

/// Recompute a round from its revealed seed
/// POST /api/crash/verify
pub async fn verify_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let round_id = RoundId(request.round_id);
    let verification = fairness::verify(round_id, request.seed.trim())
        .map_err(|e| ApiError::bad_request(request_id.0.clone(), e.to_string()))?;

    let matches_record = state.engine.publisher().outcome(round_id).and_then(|recorded| {
        recorded.seed_hash.as_ref().map(|hash| {
            *hash == verification.seed_hash && recorded.crash_point == verification.crash_point
        })
    });
    debug!(request_id = %request_id.0, round_id = %round_id, matches_record = ?matches_record, "round verified");

    Ok(Json(VerifyResponse {
        round_id,
        crash_point: verification.crash_point,
        seed_hash: verification.seed_hash,
        matches_record,
    }))
}
