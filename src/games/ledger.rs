//! Per-round bet ledger.
//!
//! One wager per participant per round. The engine swaps in a fresh ledger
//! for every round; nothing here outlives its round.

use crate::errors::DeclineReason;
use crate::games::types::{Amount, Multiplier, ParticipantId, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wager lifecycle. `Pending` and `CashingOut` mark a store call in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerState {
    Pending,
    Active,
    CashingOut { multiplier: Multiplier },
    CashedOut { multiplier: Multiplier, payout: Amount },
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wager {
    pub participant_id: ParticipantId,
    pub amount: Amount,
    pub state: WagerState,
}

impl Wager {
    pub fn cashed_out(&self) -> bool {
        matches!(self.state, WagerState::CashedOut { .. })
    }

    pub fn cash_out_multiplier(&self) -> Option<Multiplier> {
        match self.state {
            WagerState::CashedOut { multiplier, .. } => Some(multiplier),
            _ => None,
        }
    }
}

/// Participant-facing wager status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Active,
    CashingOut,
    CashedOut,
    Lost,
}

/// Read-only copy of a wager, as published to status readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerView {
    pub round_id: RoundId,
    pub amount: Amount,
    pub status: WagerStatus,
    pub cashed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_out_multiplier: Option<Multiplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Amount>,
}

impl WagerView {
    /// Settled one way or the other
    pub fn finished(&self) -> bool {
        matches!(self.status, WagerStatus::CashedOut | WagerStatus::Lost)
    }
}

#[derive(Debug, Clone)]
pub struct BetLedger {
    round_id: RoundId,
    wagers: HashMap<ParticipantId, Wager>,
}

impl BetLedger {
    pub fn new(round_id: RoundId) -> Self {
        Self {
            round_id,
            wagers: HashMap::new(),
        }
    }

    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    pub fn len(&self) -> usize {
        self.wagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wagers.is_empty()
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<&Wager> {
        self.wagers.get(participant)
    }

    /// Wagers with a debit or credit still outstanding
    pub fn in_flight(&self) -> usize {
        self.wagers
            .values()
            .filter(|w| matches!(w.state, WagerState::Pending | WagerState::CashingOut { .. }))
            .count()
    }

    /// Hold a slot while the debit runs.
    pub fn reserve(&mut self, participant: &ParticipantId, amount: Amount) -> Result<(), DeclineReason> {
        if self.wagers.contains_key(participant) {
            return Err(DeclineReason::AlreadyPlaced);
        }
        self.wagers.insert(
            participant.clone(),
            Wager {
                participant_id: participant.clone(),
                amount,
                state: WagerState::Pending,
            },
        );
        Ok(())
    }

    /// Drop a reservation whose debit did not go through.
    pub fn release(&mut self, participant: &ParticipantId) -> Option<Wager> {
        match self.wagers.get(participant) {
            Some(wager) if wager.state == WagerState::Pending => self.wagers.remove(participant),
            _ => None,
        }
    }

    /// Pending -> Active once the debit has succeeded.
    pub fn activate(&mut self, participant: &ParticipantId) -> bool {
        self.transition(participant, |state| match state {
            WagerState::Pending => Some(WagerState::Active),
            _ => None,
        })
    }

    /// Stake of an `Active` wager, or why it cannot be cashed out.
    pub fn cashable(&self, participant: &ParticipantId) -> Result<Amount, DeclineReason> {
        let wager = self.wagers.get(participant).ok_or(DeclineReason::NoActiveWager)?;
        match wager.state {
            WagerState::Active => Ok(wager.amount),
            WagerState::Pending => Err(DeclineReason::NoActiveWager),
            WagerState::CashingOut { .. } | WagerState::CashedOut { .. } => {
                Err(DeclineReason::AlreadyCashedOut)
            }
            WagerState::Lost => Err(DeclineReason::RoundCrashed),
        }
    }

    /// Active -> CashingOut, taking the wager out of the crash sweep.
    pub fn begin_cash_out(&mut self, participant: &ParticipantId, multiplier: Multiplier) -> Result<Amount, DeclineReason> {
        let stake = self.cashable(participant)?;
        self.transition(participant, |_| Some(WagerState::CashingOut { multiplier }));
        Ok(stake)
    }

    /// CashingOut -> CashedOut after the credit went through.
    pub fn complete_cash_out(&mut self, participant: &ParticipantId, payout: Amount) -> bool {
        self.transition(participant, |state| match state {
            WagerState::CashingOut { multiplier } => Some(WagerState::CashedOut { multiplier, payout }),
            _ => None,
        })
    }

    /// CashingOut -> Active after a credit that changed nothing.
    pub fn abort_cash_out(&mut self, participant: &ParticipantId) -> bool {
        self.transition(participant, |state| match state {
            WagerState::CashingOut { .. } => Some(WagerState::Active),
            _ => None,
        })
    }

    /// Finalize a single wager as lost, returning its stake.
    pub fn mark_lost(&mut self, participant: &ParticipantId) -> Option<Amount> {
        let amount = self.wagers.get(participant)?.amount;
        let changed = self.transition(participant, |state| match state {
            WagerState::Active | WagerState::CashingOut { .. } => Some(WagerState::Lost),
            _ => None,
        });
        changed.then_some(amount)
    }

    /// Mark every `Active` wager lost. Pending and cashing-out wagers are
    /// left for their in-flight call to finish.
    pub fn sweep_losses(&mut self) -> Vec<(ParticipantId, Amount)> {
        let mut lost = Vec::new();
        for wager in self.wagers.values_mut() {
            if wager.state == WagerState::Active {
                wager.state = WagerState::Lost;
                lost.push((wager.participant_id.clone(), wager.amount));
            }
        }
        lost
    }

    /// Public view; pending reservations are not visible yet.
    pub fn view(&self, participant: &ParticipantId) -> Option<WagerView> {
        let wager = self.wagers.get(participant)?;
        let (status, cash_out_multiplier, payout) = match wager.state {
            WagerState::Pending => return None,
            WagerState::Active => (WagerStatus::Active, None, None),
            WagerState::CashingOut { .. } => (WagerStatus::CashingOut, None, None),
            WagerState::CashedOut { multiplier, payout } => {
                (WagerStatus::CashedOut, Some(multiplier), Some(payout))
            }
            WagerState::Lost => (WagerStatus::Lost, None, Some(Amount::ZERO)),
        };
        Some(WagerView {
            round_id: self.round_id,
            amount: wager.amount,
            status,
            cashed_out: wager.cashed_out(),
            cash_out_multiplier,
            payout,
        })
    }

    fn transition(&mut self, participant: &ParticipantId, step: impl FnOnce(WagerState) -> Option<WagerState>) -> bool {
        match self.wagers.get_mut(participant) {
            Some(wager) => match step(wager.state) {
                Some(next) => {
                    wager.state = next;
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_active(participant: &ParticipantId) -> BetLedger {
        let mut ledger = BetLedger::new(RoundId(1));
        ledger.reserve(participant, Amount::from_cents(1000)).unwrap();
        assert!(ledger.activate(participant));
        ledger
    }

    #[test]
    fn test_one_wager_per_participant() {
        let alice = ParticipantId::from("alice");
        let mut ledger = ledger_with_active(&alice);
        assert_eq!(
            ledger.reserve(&alice, Amount::from_cents(5)),
            Err(DeclineReason::AlreadyPlaced)
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_release_only_drops_pending() {
        let alice = ParticipantId::from("alice");
        let mut ledger = ledger_with_active(&alice);
        assert!(ledger.release(&alice).is_none());

        let bob = ParticipantId::from("bob");
        ledger.reserve(&bob, Amount::from_cents(5)).unwrap();
        assert_eq!(ledger.in_flight(), 1);
        assert!(ledger.view(&bob).is_none());
        assert!(ledger.release(&bob).is_some());
        assert!(ledger.get(&bob).is_none());
    }

    #[test]
    fn test_cash_out_lifecycle() {
        let alice = ParticipantId::from("alice");
        let mut ledger = ledger_with_active(&alice);
        let multiplier = Multiplier::from_hundredths(150);

        assert_eq!(ledger.begin_cash_out(&alice, multiplier), Ok(Amount::from_cents(1000)));
        assert_eq!(
            ledger.begin_cash_out(&alice, multiplier),
            Err(DeclineReason::AlreadyCashedOut)
        );
        // cashing out wagers survive the crash sweep
        assert!(ledger.sweep_losses().is_empty());

        assert!(ledger.complete_cash_out(&alice, Amount::from_cents(1500)));
        let view = ledger.view(&alice).unwrap();
        assert!(view.cashed_out);
        assert!(view.finished());
        assert_eq!(view.cash_out_multiplier, Some(multiplier));
        assert_eq!(view.payout, Some(Amount::from_cents(1500)));
        assert_eq!(ledger.get(&alice).unwrap().cash_out_multiplier(), Some(multiplier));
    }

    #[test]
    fn test_abort_returns_wager_to_active() {
        let alice = ParticipantId::from("alice");
        let mut ledger = ledger_with_active(&alice);
        ledger.begin_cash_out(&alice, Multiplier::from_hundredths(120)).unwrap();
        assert!(ledger.abort_cash_out(&alice));
        assert_eq!(ledger.cashable(&alice), Ok(Amount::from_cents(1000)));
    }

    #[test]
    fn test_sweep_marks_active_lost_once() {
        let alice = ParticipantId::from("alice");
        let bob = ParticipantId::from("bob");
        let mut ledger = ledger_with_active(&alice);
        ledger.reserve(&bob, Amount::from_cents(200)).unwrap();

        let lost = ledger.sweep_losses();
        assert_eq!(lost, vec![(alice.clone(), Amount::from_cents(1000))]);
        assert!(ledger.sweep_losses().is_empty());
        assert_eq!(ledger.cashable(&alice), Err(DeclineReason::RoundCrashed));
        assert_eq!(ledger.mark_lost(&alice), None);

        // the pending reservation is untouched
        assert_eq!(ledger.get(&bob).unwrap().state, WagerState::Pending);
        assert_eq!(ledger.cashable(&bob), Err(DeclineReason::NoActiveWager));
    }

    #[test]
    fn test_view_hides_pending() {
        let alice = ParticipantId::from("alice");
        let bob = ParticipantId::from("bob");
        let mut ledger = ledger_with_active(&alice);
        ledger.reserve(&bob, Amount::from_cents(1)).unwrap();
        assert_eq!(ledger.view(&bob), None);
        let view = ledger.view(&alice).unwrap();
        assert_eq!(view.status, WagerStatus::Active);
        assert!(!view.cashed_out);
    }
}
