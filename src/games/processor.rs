use crate::errors::{DeclineReason, GameError, SettlementError};
use crate::games::rng::RandomSource;
use crate::games::settlement::{SettlementDispatcher, SettlementTicket};
use crate::games::single_shot::InstantBet;
use crate::games::types::{Amount, BetLimits, GameOutcome, GameType, Multiplier, ParticipantId};
use crate::metrics::CasinoMetrics;
use crate::store::DebitOutcome;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

/// Settled single-shot play
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayReceipt {
    pub game: GameType,
    #[serde(rename = "result")]
    pub outcome: GameOutcome,
    pub bet: Amount,
    /// Win multiplier; zero for a loss
    pub multiplier: Multiplier,
    pub payout: Amount,
    pub balance: Amount,
    pub detail: serde_json::Value,
}

/// Processes single-shot plays: debit, draw, settle
pub struct InstantGameProcessor {
    rng: Mutex<Box<dyn RandomSource>>,
    settlement: SettlementDispatcher,
    limits: BetLimits,
    metrics: Arc<CasinoMetrics>,
}

impl InstantGameProcessor {
    pub fn new(
        rng: Box<dyn RandomSource>,
        settlement: SettlementDispatcher,
        limits: BetLimits,
        metrics: Arc<CasinoMetrics>,
    ) -> Self {
        Self {
            rng: Mutex::new(rng),
            settlement,
            limits,
            metrics,
        }
    }

    /// Play one round of a single-shot game
    pub async fn play(&self, participant: &ParticipantId, stake: Amount, bet: InstantBet) -> Result<PlayReceipt, GameError> {
        let game = bet.game();
        let result = self.try_play(participant, stake, bet).await;
        if let Err(GameError::Declined(reason)) = &result {
            self.metrics.record_decline(&game.to_string(), reason.as_str());
            debug!(participant = %participant, game = %game, reason = %reason, "play declined");
        }
        result
    }

    async fn try_play(&self, participant: &ParticipantId, stake: Amount, bet: InstantBet) -> Result<PlayReceipt, GameError> {
        self.limits.check(stake)?;
        bet.validate()?;
        let game = bet.game();

        let debited = match self.settlement.balances().debit(participant, stake).await? {
            DebitOutcome::Debited { balance } => balance,
            DebitOutcome::InsufficientFunds { .. } => {
                return Err(DeclineReason::InsufficientBalance.into());
            }
        };
        self.metrics.record_bet(game, stake.cents());

        let resolution = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            bet.resolve(rng.as_mut())
        };

        if resolution.won {
            let ticket = SettlementTicket::instant(
                participant.clone(),
                game,
                stake,
                resolution.multiplier,
                resolution.detail.clone(),
            );
            let settled = self.settlement.settle_win(ticket).await.map_err(|e| {
                self.settlement_failed(participant, game, &e);
                e
            })?;
            self.metrics.record_payout(game, settled.payout.cents());
            info!(participant = %participant, game = %game, payout = %settled.payout, "play won");
            Ok(PlayReceipt {
                game,
                outcome: GameOutcome::Win,
                bet: stake,
                multiplier: resolution.multiplier,
                payout: settled.payout,
                balance: settled.balance,
                detail: resolution.detail,
            })
        } else {
            let ticket = SettlementTicket::instant(
                participant.clone(),
                game,
                stake,
                Multiplier::ZERO,
                resolution.detail.clone(),
            );
            self.settlement.settle_loss(ticket).await.map_err(|e| {
                self.settlement_failed(participant, game, &e);
                e
            })?;
            debug!(participant = %participant, game = %game, stake = %stake, "play lost");
            Ok(PlayReceipt {
                game,
                outcome: GameOutcome::Loss,
                bet: stake,
                multiplier: Multiplier::ZERO,
                payout: Amount::ZERO,
                balance: debited,
                detail: resolution.detail,
            })
        }
    }

    fn settlement_failed(&self, participant: &ParticipantId, game: GameType, error: &SettlementError) {
        self.metrics.record_settlement_failure(error.kind());
        error!(participant = %participant, game = %game, error = %error, "play settlement failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::single_shot::RouletteBet;
    use crate::games::types::CoinChoice;
    use crate::store::{BalanceStore, HistoryFilter, HistoryStore, MemoryStore};
    use rand::{rngs::StdRng, SeedableRng};

    fn processor(seed: u64) -> (Arc<MemoryStore>, InstantGameProcessor) {
        let store = Arc::new(MemoryStore::new(Amount::from_cents(10_000), 1_000));
        let processor = InstantGameProcessor::new(
            Box::new(StdRng::seed_from_u64(seed)),
            SettlementDispatcher::new(store.clone(), store.clone()),
            BetLimits::default(),
            Arc::new(CasinoMetrics::new().unwrap()),
        );
        (store, processor)
    }

    #[tokio::test]
    async fn test_play_settles_balance_and_history() {
        let (store, processor) = processor(9);
        let alice = ParticipantId::from("alice");
        let mut expected = Amount::from_cents(10_000);

        for _ in 0..20 {
            let receipt = processor
                .play(&alice, Amount::from_cents(100), InstantBet::CoinFlip { choice: CoinChoice::Heads })
                .await
                .unwrap();
            expected = expected
                .checked_sub(Amount::from_cents(100))
                .unwrap()
                .saturating_add(receipt.payout);
            match receipt.outcome {
                GameOutcome::Win => assert_eq!(receipt.payout, Amount::from_cents(186)),
                GameOutcome::Loss => assert_eq!(receipt.payout, Amount::ZERO),
            }
            assert_eq!(receipt.balance, expected);
        }

        assert_eq!(store.balance(&alice).await.unwrap(), expected);
        let history = store
            .recent(&HistoryFilter { game: Some(GameType::CoinFlip), ..Default::default() }, 100)
            .await
            .unwrap();
        assert_eq!(history.len(), 20);
    }

    #[tokio::test]
    async fn test_invalid_choice_touches_nothing() {
        let (store, processor) = processor(1);
        let bob = ParticipantId::from("bob");
        let err = processor
            .play(&bob, Amount::from_cents(100), InstantBet::Roulette { bet: RouletteBet::Column { column: 0 } })
            .await
            .unwrap_err();
        assert_eq!(err, GameError::Declined(DeclineReason::InvalidChoice));
        assert_eq!(store.balance(&bob).await.unwrap(), Amount::from_cents(10_000));
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let (store, processor) = processor(1);
        let carol = ParticipantId::from("carol");
        store.set_balance(&carol, Amount::from_cents(50));
        let err = processor
            .play(&carol, Amount::from_cents(100), InstantBet::Dice { target: 50, over: true })
            .await
            .unwrap_err();
        assert_eq!(err, GameError::Declined(DeclineReason::InsufficientBalance));
        assert_eq!(store.balance(&carol).await.unwrap(), Amount::from_cents(50));
    }
}
