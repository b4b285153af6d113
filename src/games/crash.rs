//! Crash round engine
//!
//! One shared round at a time: Countdown (bets open) -> Running (multiplier
//! climbs, cash-outs open) -> Crashed (every remaining wager lost) -> next
//! round. All round and ledger mutations happen inside one mutex; balance and
//! history calls run outside it on values captured inside it. Wagers carry an
//! in-flight state (`Pending`, `CashingOut`) while a store call is running,
//! which keeps them out of the crash sweep. The next round opens on time; a
//! finished ledger with calls still in flight is kept as a closed round until
//! the last of them settles against it.

use crate::errors::{CrashError, DeclineReason, EngineFault, SettlementError};
use crate::games::clock::Clock;
use crate::games::fairness::RoundSeed;
use crate::games::ledger::BetLedger;
use crate::games::outcome::{CrashPoint, OutcomeSource, RoundDraw};
use crate::games::publisher::{
    Phase, RoundEvent, RoundOutcome, RoundSnapshot, RoundStatus, StatusPublisher,
};
use crate::games::settlement::{SettlementDispatcher, SettlementTicket};
use crate::games::types::{Amount, BetLimits, GameType, Multiplier, ParticipantId, RoundId};
use crate::metrics::CasinoMetrics;
use crate::store::DebitOutcome;
use futures::future::join_all;
use serde::Serialize;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Betting window before the multiplier starts
pub const COUNTDOWN_MS: u64 = 5_000;

/// Pause between the crash and the next round
pub const RESTART_DELAY_MS: u64 = 3_000;

/// The multiplier grows by 0.01x every 120 ms
pub const MS_PER_HUNDREDTH: u64 = 120;

/// Multiplier in hundredths after `elapsed_ms` of running, rounded half up:
/// `1.00 + elapsed/120 * 0.01`.
pub fn multiplier_at(elapsed_ms: u64) -> u64 {
    100 + elapsed_ms.saturating_add(MS_PER_HUNDREDTH / 2) / MS_PER_HUNDREDTH
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub limits: BetLimits,
    pub recent_outcomes: usize,
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            limits: BetLimits::default(),
            recent_outcomes: 100,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundPhase {
    Countdown { deadline: u64 },
    Running { started_at: u64 },
    Crashed { started_at: u64, crashed_at: u64, restart_at: u64 },
}

struct Round {
    id: RoundId,
    countdown_deadline: u64,
    crash_point: CrashPoint,
    seed: Option<RoundSeed>,
    seed_hash: Option<String>,
    phase: RoundPhase,
    /// hundredths
    current: u64,
}

impl Round {
    fn open(id: RoundId, now: u64, draw: RoundDraw) -> Self {
        let countdown_deadline = now + COUNTDOWN_MS;
        Self {
            id,
            countdown_deadline,
            crash_point: draw.crash_point,
            seed_hash: draw.seed.map(|seed| seed.commitment()),
            seed: draw.seed,
            phase: RoundPhase::Countdown { deadline: countdown_deadline },
            current: 100,
        }
    }

    fn phase(&self) -> Phase {
        match self.phase {
            RoundPhase::Countdown { .. } => Phase::Countdown,
            RoundPhase::Running { .. } => Phase::Running,
            RoundPhase::Crashed { .. } => Phase::Crashed,
        }
    }

    fn snapshot(&self) -> RoundSnapshot {
        let (started_at, crashed_at, next_round_at) = match self.phase {
            RoundPhase::Countdown { .. } => (None, None, None),
            RoundPhase::Running { started_at } => (Some(started_at), None, None),
            RoundPhase::Crashed { started_at, crashed_at, restart_at } => {
                (Some(started_at), Some(crashed_at), Some(restart_at))
            }
        };
        let crashed = crashed_at.is_some();
        RoundSnapshot {
            round_id: self.id,
            phase: self.phase(),
            current_multiplier: Multiplier::from_hundredths(self.current),
            crash_point: crashed.then_some(self.crash_point),
            seed_hash: self.seed_hash.clone(),
            seed: self.seed.filter(|_| crashed).map(|seed| seed.to_hex()),
            countdown_deadline: self.countdown_deadline,
            started_at,
            crashed_at,
            next_round_at,
        }
    }
}

/// Finished round whose ledger still has a debit or credit outstanding
struct ClosedRound {
    ledger: BetLedger,
    crash_point: CrashPoint,
}

struct EngineState {
    round: Round,
    ledger: BetLedger,
    closed: Vec<ClosedRound>,
    outcomes: Box<dyn OutcomeSource>,
    halted: Option<EngineFault>,
}

impl EngineState {
    fn is_live(&self, round_id: RoundId) -> bool {
        self.ledger.round_id() == round_id
    }

    /// Ledger of `round_id`, with its crash point once that round has crashed.
    fn ledger_mut(&mut self, round_id: RoundId) -> Option<(&mut BetLedger, Option<CrashPoint>)> {
        if self.ledger.round_id() == round_id {
            let crashed = matches!(self.round.phase, RoundPhase::Crashed { .. })
                .then_some(self.round.crash_point);
            return Some((&mut self.ledger, crashed));
        }
        self.closed
            .iter_mut()
            .find(|closed| closed.ledger.round_id() == round_id)
            .map(|closed| (&mut closed.ledger, Some(closed.crash_point)))
    }

    fn prune_closed(&mut self) {
        self.closed.retain(|closed| closed.ledger.in_flight() > 0);
    }
}

/// Accepted bet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetReceipt {
    pub round_id: RoundId,
    pub amount: Amount,
    pub balance: Amount,
}

/// Successful cash-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashOutReceipt {
    pub round_id: RoundId,
    pub multiplier: Multiplier,
    pub payout: Amount,
    pub balance: Amount,
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub round_id: RoundId,
    pub phase: Phase,
    /// Wagers lost in a crash during this tick
    pub losses: Vec<SettlementTicket>,
}

pub struct CrashEngine {
    state: Mutex<EngineState>,
    clock: Arc<dyn Clock>,
    settlement: SettlementDispatcher,
    publisher: Arc<StatusPublisher>,
    metrics: Arc<CasinoMetrics>,
    limits: BetLimits,
}

impl CrashEngine {
    /// Open the first round immediately.
    pub fn new(
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
        mut outcomes: Box<dyn OutcomeSource>,
        settlement: SettlementDispatcher,
        metrics: Arc<CasinoMetrics>,
    ) -> Result<Self, EngineFault> {
        let now = clock.now_ms();
        let draw = outcomes.draw(RoundId::FIRST)?;
        let round = Round::open(RoundId::FIRST, now, draw);
        let publisher = Arc::new(StatusPublisher::new(
            round.snapshot(),
            settings.recent_outcomes,
            settings.event_buffer,
        ));
        info!(round_id = %round.id, seed_hash = ?round.seed_hash, "crash round opened");

        Ok(Self {
            state: Mutex::new(EngineState {
                ledger: BetLedger::new(round.id),
                closed: Vec::new(),
                round,
                outcomes,
                halted: None,
            }),
            clock,
            settlement,
            publisher,
            metrics,
            limits: settings.limits,
        })
    }

    pub fn publisher(&self) -> &Arc<StatusPublisher> {
        &self.publisher
    }

    pub fn limits(&self) -> BetLimits {
        self.limits
    }

    pub fn halted(&self) -> Option<EngineFault> {
        self.lock().halted.clone()
    }

    /// Read-only status; never takes the engine lock.
    pub fn snapshot(&self, participant: Option<&ParticipantId>) -> RoundStatus {
        self.publisher.status(participant)
    }

    /// Current round, or a finished one from the outcome feed.
    pub fn status(&self, round_id: Option<RoundId>, participant: Option<&ParticipantId>) -> Result<RoundStatus, CrashError> {
        let current = self.publisher.status(participant);
        match round_id {
            None => Ok(current),
            Some(id) if id == current.round.round_id => Ok(current),
            Some(id) => self
                .publisher
                .outcome(id)
                .map(|outcome| RoundStatus {
                    round: RoundSnapshot::from_outcome(&outcome),
                    wager: None,
                })
                .ok_or(CrashError::RoundNotFound(id)),
        }
    }

    pub fn recent_outcomes(&self, limit: usize, before: Option<RoundId>) -> Vec<RoundOutcome> {
        self.publisher.recent_outcomes(limit, before)
    }

    /// Tick with the engine clock. Losses from a crash are settled on a
    /// spawned task so a slow history store never holds the ticker.
    pub fn advance(&self) -> Result<TickReport, EngineFault> {
        let report = self.tick(self.clock.now_ms())?;
        if !report.losses.is_empty() {
            tokio::spawn(settle_losses(
                self.settlement.clone(),
                self.metrics.clone(),
                report.losses.clone(),
            ));
        }
        Ok(report)
    }

    /// Evaluate phase transitions at `now`. Loss tickets are returned, not
    /// settled.
    pub(crate) fn tick(&self, now: u64) -> Result<TickReport, EngineFault> {
        let mut state = self.lock();
        if let Some(fault) = &state.halted {
            return Err(fault.clone());
        }

        let mut losses = Vec::new();
        match state.round.phase {
            RoundPhase::Countdown { deadline } if now >= deadline => {
                state.round.phase = RoundPhase::Running { started_at: now };
                state.round.current = 100;
                info!(round_id = %state.round.id, "crash round started");
                self.publisher.emit(RoundEvent::RoundStarted {
                    round_id: state.round.id,
                    started_at: now,
                });
                self.publisher.publish_round(state.round.snapshot());
            }
            RoundPhase::Running { started_at } => {
                let reached = multiplier_at(now.saturating_sub(started_at));
                if reached >= state.round.crash_point.hundredths() {
                    losses = self.crash_round(&mut state, now);
                } else if reached > state.round.current {
                    state.round.current = reached;
                    let multiplier = Multiplier::from_hundredths(reached);
                    self.metrics.current_multiplier.set(multiplier.as_f64());
                    self.publisher.emit(RoundEvent::Multiplier {
                        round_id: state.round.id,
                        multiplier,
                        elapsed_ms: now.saturating_sub(started_at),
                    });
                    self.publisher.publish_round(state.round.snapshot());
                }
            }
            RoundPhase::Crashed { restart_at, .. } if now >= restart_at => {
                self.open_next_round(&mut state, now)?;
            }
            _ => {}
        }

        Ok(TickReport {
            round_id: state.round.id,
            phase: state.round.phase(),
            losses,
        })
    }

    /// Place a bet for the current round. Only accepted during the countdown.
    pub async fn place_bet(&self, participant: &ParticipantId, amount: Amount) -> Result<BetReceipt, CrashError> {
        let result = self.try_place_bet(participant, amount).await;
        if let Err(CrashError::Declined(reason)) = &result {
            self.metrics.record_decline("place_bet", reason.as_str());
            debug!(participant = %participant, amount = %amount, reason = %reason, "bet declined");
        }
        result
    }

    /// Cash out at the current multiplier.
    pub async fn cash_out(&self, participant: &ParticipantId) -> Result<CashOutReceipt, CrashError> {
        let result = self.try_cash_out(participant).await;
        if let Err(CrashError::Declined(reason)) = &result {
            self.metrics.record_decline("cash_out", reason.as_str());
            debug!(participant = %participant, reason = %reason, "cash-out declined");
        }
        result
    }

    async fn try_place_bet(&self, participant: &ParticipantId, amount: Amount) -> Result<BetReceipt, CrashError> {
        self.limits.check(amount)?;
        let round_id = self.reserve_bet(participant, amount)?;

        match self.settlement.balances().debit(participant, amount).await {
            Ok(DebitOutcome::Debited { balance }) => {
                self.metrics.record_bet(GameType::Crash, amount.cents());
                match self.confirm_bet(participant, round_id, amount) {
                    Some(ticket) => {
                        warn!(participant = %participant, round_id = %round_id, "bet confirmed after the crash; settled as a loss");
                        settle_losses(self.settlement.clone(), self.metrics.clone(), vec![ticket]).await;
                    }
                    None => {
                        info!(participant = %participant, round_id = %round_id, amount = %amount, "bet placed");
                    }
                }
                Ok(BetReceipt { round_id, amount, balance })
            }
            Ok(DebitOutcome::InsufficientFunds { available }) => {
                self.release_bet(participant, round_id);
                debug!(participant = %participant, available = %available, "insufficient balance");
                Err(DeclineReason::InsufficientBalance.into())
            }
            Err(e) => {
                self.release_bet(participant, round_id);
                error!(participant = %participant, error = %e, "bet debit failed");
                Err(CrashError::Store(e))
            }
        }
    }

    async fn try_cash_out(&self, participant: &ParticipantId) -> Result<CashOutReceipt, CrashError> {
        let (round_id, stake, multiplier) = self.begin_cash_out(participant)?;
        let ticket = SettlementTicket::crash(participant.clone(), round_id, stake, multiplier);

        match self.settlement.settle_win(ticket).await {
            Ok(settled) => {
                self.finish_cash_out(participant, round_id, multiplier, settled.payout);
                self.metrics.cash_outs_total.inc();
                self.metrics.record_payout(GameType::Crash, settled.payout.cents());
                info!(
                    participant = %participant,
                    round_id = %round_id,
                    multiplier = %multiplier,
                    payout = %settled.payout,
                    "cashed out"
                );
                Ok(CashOutReceipt {
                    round_id,
                    multiplier,
                    payout: settled.payout,
                    balance: settled.balance,
                })
            }
            Err(err @ SettlementError::History { .. }) => {
                // the credit landed, so the wager is paid
                let payout = stake.times(multiplier);
                self.finish_cash_out(participant, round_id, multiplier, payout);
                self.metrics.cash_outs_total.inc();
                self.metrics.record_payout(GameType::Crash, payout.cents());
                self.metrics.record_settlement_failure(err.kind());
                error!(participant = %participant, round_id = %round_id, error = %err, "cash-out paid without history record");
                Err(err.into())
            }
            Err(err) => {
                self.metrics.record_settlement_failure(err.kind());
                error!(participant = %participant, round_id = %round_id, error = %err, "cash-out credit failed");
                if let Some(ticket) = self.revert_cash_out(participant, round_id) {
                    settle_losses(self.settlement.clone(), self.metrics.clone(), vec![ticket]).await;
                }
                Err(err.into())
            }
        }
    }

    fn reserve_bet(&self, participant: &ParticipantId, amount: Amount) -> Result<RoundId, CrashError> {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        Self::ensure_live(&state)?;
        match state.round.phase {
            RoundPhase::Countdown { deadline } if now < deadline => {}
            _ => return Err(DeclineReason::BettingClosed.into()),
        }
        state.ledger.reserve(participant, amount)?;
        Ok(state.round.id)
    }

    fn release_bet(&self, participant: &ParticipantId, round_id: RoundId) {
        let mut state = self.lock();
        if let Some((ledger, _)) = state.ledger_mut(round_id) {
            ledger.release(participant);
        }
        state.prune_closed();
    }

    /// Pending -> Active after the debit. A round that crashed meanwhile
    /// turns the wager straight into a loss, returned as its ticket.
    fn confirm_bet(&self, participant: &ParticipantId, round_id: RoundId, amount: Amount) -> Option<SettlementTicket> {
        let mut state = self.lock();
        let live = state.is_live(round_id);
        let Some((ledger, crashed)) = state.ledger_mut(round_id) else {
            error!(participant = %participant, round_id = %round_id, "debited wager has no ledger");
            return None;
        };
        if !ledger.activate(participant) {
            error!(participant = %participant, round_id = %round_id, "debited wager was not pending");
            return None;
        }
        let late_loss = crashed.and_then(|crash_point| {
            ledger.mark_lost(participant).map(|stake| {
                SettlementTicket::crash(participant.clone(), round_id, stake, crash_point.multiplier())
            })
        });

        self.publisher.emit(RoundEvent::BetPlaced {
            round_id,
            participant_id: participant.clone(),
            amount,
        });
        if live {
            self.publish_wager(&state, participant);
        }
        state.prune_closed();
        late_loss
    }

    fn begin_cash_out(&self, participant: &ParticipantId) -> Result<(RoundId, Amount, Multiplier), CrashError> {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        Self::ensure_live(&state)?;

        let started_at = match state.round.phase {
            RoundPhase::Countdown { .. } => return Err(DeclineReason::RoundNotStarted.into()),
            RoundPhase::Running { started_at } => Some(started_at),
            RoundPhase::Crashed { .. } => None,
        };
        state.ledger.cashable(participant)?;
        let started_at = started_at.ok_or(DeclineReason::RoundCrashed)?;

        // the driver may not have ticked yet; judge against `now`
        let reached = multiplier_at(now.saturating_sub(started_at)).max(state.round.current);
        if reached >= state.round.crash_point.hundredths() {
            return Err(DeclineReason::RoundCrashed.into());
        }

        let multiplier = Multiplier::from_hundredths(reached);
        let stake = state.ledger.begin_cash_out(participant, multiplier)?;
        self.publish_wager(&state, participant);
        Ok((state.round.id, stake, multiplier))
    }

    fn finish_cash_out(&self, participant: &ParticipantId, round_id: RoundId, multiplier: Multiplier, payout: Amount) {
        let mut state = self.lock();
        let live = state.is_live(round_id);
        let completed = state
            .ledger_mut(round_id)
            .is_some_and(|(ledger, _)| ledger.complete_cash_out(participant, payout));
        if completed {
            self.publisher.emit(RoundEvent::CashedOut {
                round_id,
                participant_id: participant.clone(),
                multiplier,
                payout,
            });
            if live {
                self.publish_wager(&state, participant);
            }
        }
        state.prune_closed();
    }

    /// After a failed credit: back to Active while the round still runs,
    /// otherwise finalize as a loss.
    fn revert_cash_out(&self, participant: &ParticipantId, round_id: RoundId) -> Option<SettlementTicket> {
        let mut state = self.lock();
        let live = state.is_live(round_id);
        let ticket = match state.ledger_mut(round_id)? {
            (ledger, None) => {
                ledger.abort_cash_out(participant);
                None
            }
            (ledger, Some(crash_point)) => ledger.mark_lost(participant).map(|stake| {
                SettlementTicket::crash(participant.clone(), round_id, stake, crash_point.multiplier())
            }),
        };
        if live {
            self.publish_wager(&state, participant);
        }
        state.prune_closed();
        ticket
    }

    fn crash_round(&self, state: &mut EngineState, now: u64) -> Vec<SettlementTicket> {
        let started_at = match state.round.phase {
            RoundPhase::Running { started_at } => started_at,
            _ => return Vec::new(),
        };
        let round_id = state.round.id;
        let crash_point = state.round.crash_point;
        let restart_at = now + RESTART_DELAY_MS;

        state.round.current = crash_point.hundredths();
        state.round.phase = RoundPhase::Crashed {
            started_at,
            crashed_at: now,
            restart_at,
        };

        let losses: Vec<SettlementTicket> = state
            .ledger
            .sweep_losses()
            .into_iter()
            .map(|(participant, stake)| {
                SettlementTicket::crash(participant, round_id, stake, crash_point.multiplier())
            })
            .collect();
        for ticket in &losses {
            self.publish_wager(state, &ticket.participant_id);
        }

        let seed = state.round.seed.map(|seed| seed.to_hex());
        self.publisher.record_outcome(RoundOutcome {
            round_id,
            crash_point,
            timestamp: now,
            started_at,
            countdown_deadline: state.round.countdown_deadline,
            seed_hash: state.round.seed_hash.clone(),
            seed: seed.clone(),
        });
        self.publisher.emit(RoundEvent::Crashed {
            round_id,
            crash_point,
            seed,
            next_round_at: restart_at,
        });
        self.publisher.publish_round(state.round.snapshot());
        self.metrics.rounds_total.inc();
        self.metrics.current_multiplier.set(crash_point.multiplier().as_f64());

        info!(
            round_id = %round_id,
            crash_point = %crash_point.multiplier(),
            wagers = state.ledger.len(),
            losses = losses.len(),
            "crash round crashed"
        );
        losses
    }

    fn open_next_round(&self, state: &mut EngineState, now: u64) -> Result<(), EngineFault> {
        let next_id = state.round.id.next();
        let draw = match state.outcomes.draw(next_id) {
            Ok(draw) => draw,
            Err(fault) => {
                error!(round_id = %next_id, error = %fault, "failed to draw crash point; halting engine");
                state.halted = Some(fault.clone());
                return Err(fault);
            }
        };

        let finished = mem::replace(&mut state.ledger, BetLedger::new(next_id));
        let crash_point = state.round.crash_point;
        state.round = Round::open(next_id, now, draw);
        state.prune_closed();
        let in_flight = finished.in_flight();
        if in_flight > 0 {
            warn!(round_id = %finished.round_id(), in_flight, "round closed with store calls in flight");
            state.closed.push(ClosedRound {
                ledger: finished,
                crash_point,
            });
        }
        self.publisher.clear_wagers();
        self.publisher.publish_round(state.round.snapshot());
        self.publisher.emit(RoundEvent::RoundCreated {
            round_id: next_id,
            seed_hash: state.round.seed_hash.clone(),
            countdown_deadline: state.round.countdown_deadline,
        });
        self.metrics.current_multiplier.set(1.0);
        info!(round_id = %next_id, seed_hash = ?state.round.seed_hash, "crash round opened");
        Ok(())
    }

    fn publish_wager(&self, state: &EngineState, participant: &ParticipantId) {
        if let Some(view) = state.ledger.view(participant) {
            self.publisher.publish_wager(participant, view);
        }
    }

    fn ensure_live(state: &EngineState) -> Result<(), CrashError> {
        match &state.halted {
            Some(fault) => Err(CrashError::Halted(fault.to_string())),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn settle_losses(settlement: SettlementDispatcher, metrics: Arc<CasinoMetrics>, tickets: Vec<SettlementTicket>) {
    let settlements = tickets.into_iter().map(|ticket| {
        let settlement = &settlement;
        async move {
            let participant = ticket.participant_id.clone();
            let round_id = ticket.round_id;
            (participant, round_id, settlement.settle_loss(ticket).await)
        }
    });

    for (participant, round_id, result) in join_all(settlements).await {
        if let Err(e) = result {
            metrics.record_settlement_failure(e.kind());
            error!(participant = %participant, round_id = ?round_id, error = %e, "loss settlement failed");
        }
    }
}
