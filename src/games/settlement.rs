//! Settlement dispatcher
//!
//! Turns a decided wager into balance and history writes. A win credits
//! `stake * multiplier` and then appends a "win" record; a loss only appends
//! a "loss" record because the stake was taken when the bet was placed.
//! Exactly-once delivery is the caller's job: the round engine only issues a
//! ticket after moving the wager into a state that cannot be settled again.

use crate::errors::SettlementError;
use crate::games::types::{
    Amount, GameOutcome, GameType, HistoryRecord, Multiplier, NewHistoryRecord, ParticipantId,
    RoundId,
};
use crate::store::{BalanceStore, HistoryStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// A decided wager waiting to be settled
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementTicket {
    pub participant_id: ParticipantId,
    pub game: GameType,
    pub round_id: Option<RoundId>,
    pub stake: Amount,
    /// Cash-out multiplier for a win, crash point (or zero) for a loss
    pub multiplier: Multiplier,
    pub detail: Option<serde_json::Value>,
}

impl SettlementTicket {
    pub fn crash(participant_id: ParticipantId, round_id: RoundId, stake: Amount, multiplier: Multiplier) -> Self {
        Self {
            participant_id,
            game: GameType::Crash,
            round_id: Some(round_id),
            stake,
            multiplier,
            detail: None,
        }
    }

    /// Single-shot play; `detail` carries the draw for the history record.
    pub fn instant(
        participant_id: ParticipantId,
        game: GameType,
        stake: Amount,
        multiplier: Multiplier,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            participant_id,
            game,
            round_id: None,
            stake,
            multiplier,
            detail: Some(detail),
        }
    }

    pub fn payout(&self) -> Amount {
        self.stake.times(self.multiplier)
    }

    fn into_record(self, outcome: GameOutcome, payout: Amount) -> NewHistoryRecord {
        NewHistoryRecord {
            participant_id: self.participant_id,
            game: self.game,
            round_id: self.round_id,
            bet: self.stake,
            multiplier: self.multiplier,
            payout,
            outcome,
            detail: self.detail,
        }
    }
}

/// Completed win
#[derive(Debug, Clone, PartialEq)]
pub struct SettledWin {
    pub payout: Amount,
    pub balance: Amount,
    pub record: HistoryRecord,
}

#[derive(Clone)]
pub struct SettlementDispatcher {
    balances: Arc<dyn BalanceStore>,
    history: Arc<dyn HistoryStore>,
}

impl SettlementDispatcher {
    pub fn new(balances: Arc<dyn BalanceStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { balances, history }
    }

    pub fn balances(&self) -> &Arc<dyn BalanceStore> {
        &self.balances
    }

    pub async fn settle_win(&self, ticket: SettlementTicket) -> Result<SettledWin, SettlementError> {
        let payout = ticket.payout();
        let balance = self
            .balances
            .credit(&ticket.participant_id, payout)
            .await
            .map_err(SettlementError::Credit)?;

        let participant = ticket.participant_id.clone();
        match self.history.append(ticket.into_record(GameOutcome::Win, payout)).await {
            Ok(record) => {
                debug!(participant = %participant, payout = %payout, "win settled");
                Ok(SettledWin { payout, balance, record })
            }
            Err(source) => {
                warn!(participant = %participant, payout = %payout, error = %source, "win credited without history record");
                Err(SettlementError::History { balance, source })
            }
        }
    }

    pub async fn settle_loss(&self, ticket: SettlementTicket) -> Result<HistoryRecord, SettlementError> {
        self.history
            .append(ticket.into_record(GameOutcome::Loss, Amount::ZERO))
            .await
            .map_err(SettlementError::LossRecord)
    }
}
