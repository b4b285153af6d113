//! Status publisher
//!
//! Readers never touch the engine lock. The engine pushes a fresh
//! [`RoundSnapshot`] into a watch channel on every change, keeps per-participant
//! wager views in a concurrent map, and fans lifecycle events out over a
//! broadcast channel for push clients.

use crate::games::ledger::WagerView;
use crate::games::outcome::CrashPoint;
use crate::games::types::{Amount, Multiplier, ParticipantId, RoundId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

/// Round phase as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Countdown,
    Running,
    Crashed,
}

/// Point-in-time copy of the current round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub phase: Phase,
    pub current_multiplier: Multiplier,
    /// Only present once crashed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_point: Option<CrashPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_hash: Option<String>,
    /// Only present once crashed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    pub countdown_deadline: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crashed_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_round_at: Option<u64>,
}

impl RoundSnapshot {
    /// Crashed view of a finished round rebuilt from the outcome feed
    pub fn from_outcome(outcome: &RoundOutcome) -> Self {
        Self {
            round_id: outcome.round_id,
            phase: Phase::Crashed,
            current_multiplier: outcome.crash_point.multiplier(),
            crash_point: Some(outcome.crash_point),
            seed_hash: outcome.seed_hash.clone(),
            seed: outcome.seed.clone(),
            countdown_deadline: outcome.countdown_deadline,
            started_at: Some(outcome.started_at),
            crashed_at: Some(outcome.timestamp),
            next_round_at: None,
        }
    }
}

/// Snapshot plus the caller's own wager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStatus {
    #[serde(flatten)]
    pub round: RoundSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wager: Option<WagerView>,
}

/// Finished round in the recent-outcomes feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_id: RoundId,
    pub crash_point: CrashPoint,
    /// Crash time, epoch ms
    pub timestamp: u64,
    pub started_at: u64,
    pub countdown_deadline: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

/// Push events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundCreated {
        round_id: RoundId,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed_hash: Option<String>,
        countdown_deadline: u64,
    },
    RoundStarted {
        round_id: RoundId,
        started_at: u64,
    },
    Multiplier {
        round_id: RoundId,
        multiplier: Multiplier,
        elapsed_ms: u64,
    },
    Crashed {
        round_id: RoundId,
        crash_point: CrashPoint,
        #[serde(skip_serializing_if = "Option::is_none")]
        seed: Option<String>,
        next_round_at: u64,
    },
    BetPlaced {
        round_id: RoundId,
        participant_id: ParticipantId,
        amount: Amount,
    },
    CashedOut {
        round_id: RoundId,
        participant_id: ParticipantId,
        multiplier: Multiplier,
        payout: Amount,
    },
    Heartbeat {
        timestamp: u64,
    },
}

impl RoundEvent {
    pub fn round_id(&self) -> Option<RoundId> {
        match self {
            RoundEvent::RoundCreated { round_id, .. }
            | RoundEvent::RoundStarted { round_id, .. }
            | RoundEvent::Multiplier { round_id, .. }
            | RoundEvent::Crashed { round_id, .. }
            | RoundEvent::BetPlaced { round_id, .. }
            | RoundEvent::CashedOut { round_id, .. } => Some(*round_id),
            RoundEvent::Heartbeat { .. } => None,
        }
    }
}

pub struct StatusPublisher {
    snapshot: watch::Sender<Arc<RoundSnapshot>>,
    wagers: DashMap<ParticipantId, WagerView>,
    outcomes: RwLock<VecDeque<RoundOutcome>>,
    outcome_capacity: usize,
    events: broadcast::Sender<RoundEvent>,
}

impl StatusPublisher {
    pub fn new(initial: RoundSnapshot, outcome_capacity: usize, event_buffer: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(initial));
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            snapshot,
            wagers: DashMap::new(),
            outcomes: RwLock::new(VecDeque::with_capacity(outcome_capacity)),
            outcome_capacity: outcome_capacity.max(1),
            events,
        }
    }

    /// Latest round snapshot
    pub fn current(&self) -> Arc<RoundSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<RoundSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<RoundEvent> {
        self.events.clone()
    }

    /// Status for a participant; a wager view from another round is ignored.
    pub fn status(&self, participant: Option<&ParticipantId>) -> RoundStatus {
        let round = self.current();
        let wager = participant.and_then(|p| self.wager(p, round.round_id));
        RoundStatus {
            round: (*round).clone(),
            wager,
        }
    }

    pub fn wager(&self, participant: &ParticipantId, round_id: RoundId) -> Option<WagerView> {
        self.wagers
            .get(participant)
            .filter(|view| view.round_id == round_id)
            .map(|view| view.clone())
    }

    /// Finished round, newest first search
    pub fn outcome(&self, round_id: RoundId) -> Option<RoundOutcome> {
        let outcomes = self.outcomes.read().unwrap_or_else(PoisonError::into_inner);
        outcomes.iter().rev().find(|o| o.round_id == round_id).cloned()
    }

    /// Most recent first, optionally strictly older than `before`
    pub fn recent_outcomes(&self, limit: usize, before: Option<RoundId>) -> Vec<RoundOutcome> {
        let outcomes = self.outcomes.read().unwrap_or_else(PoisonError::into_inner);
        outcomes
            .iter()
            .rev()
            .filter(|o| before.map_or(true, |cursor| o.round_id < cursor))
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn publish_round(&self, snapshot: RoundSnapshot) {
        self.snapshot.send_replace(Arc::new(snapshot));
    }

    pub(crate) fn publish_wager(&self, participant: &ParticipantId, view: WagerView) {
        self.wagers.insert(participant.clone(), view);
    }

    pub(crate) fn clear_wagers(&self) {
        self.wagers.clear();
    }

    pub(crate) fn record_outcome(&self, outcome: RoundOutcome) {
        let mut outcomes = self.outcomes.write().unwrap_or_else(PoisonError::into_inner);
        if outcomes.len() == self.outcome_capacity {
            outcomes.pop_front();
        }
        outcomes.push_back(outcome);
    }

    /// Fire-and-forget; no subscribers is fine.
    pub(crate) fn emit(&self, event: RoundEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::ledger::WagerStatus;

    fn snapshot(round: u64) -> RoundSnapshot {
        RoundSnapshot {
            round_id: RoundId(round),
            phase: Phase::Countdown,
            current_multiplier: Multiplier::ONE,
            crash_point: None,
            seed_hash: Some("ab".into()),
            seed: None,
            countdown_deadline: 5_000,
            started_at: None,
            crashed_at: None,
            next_round_at: None,
        }
    }

    fn outcome(round: u64) -> RoundOutcome {
        RoundOutcome {
            round_id: RoundId(round),
            crash_point: CrashPoint::new(150).unwrap(),
            timestamp: round * 1_000,
            started_at: 0,
            countdown_deadline: 0,
            seed_hash: None,
            seed: None,
        }
    }

    #[test]
    fn test_status_ignores_stale_wager_views() {
        let publisher = StatusPublisher::new(snapshot(1), 10, 16);
        let alice = ParticipantId::from("alice");
        publisher.publish_wager(
            &alice,
            WagerView {
                round_id: RoundId(1),
                amount: Amount::from_cents(100),
                status: WagerStatus::Active,
                cashed_out: false,
                cash_out_multiplier: None,
                payout: None,
            },
        );
        assert!(publisher.status(Some(&alice)).wager.is_some());

        publisher.publish_round(snapshot(2));
        assert!(publisher.status(Some(&alice)).wager.is_none());
        assert_eq!(publisher.status(None).round.round_id, RoundId(2));
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let publisher = StatusPublisher::new(snapshot(4), 10, 16);
        assert_eq!(publisher.status(None), publisher.status(None));
    }

    #[test]
    fn test_outcome_feed_is_bounded_and_paged() {
        let publisher = StatusPublisher::new(snapshot(1), 3, 16);
        for round in 1..=5 {
            publisher.record_outcome(outcome(round));
        }
        let ids = |v: Vec<RoundOutcome>| v.iter().map(|o| o.round_id.0).collect::<Vec<_>>();
        assert_eq!(ids(publisher.recent_outcomes(10, None)), vec![5, 4, 3]);
        assert_eq!(ids(publisher.recent_outcomes(10, Some(RoundId(5)))), vec![4, 3]);
        assert_eq!(ids(publisher.recent_outcomes(1, None)), vec![5]);
        assert!(publisher.outcome(RoundId(1)).is_none());
        assert!(publisher.outcome(RoundId(4)).is_some());
    }

    #[test]
    fn test_event_wire_format() {
        let event = RoundEvent::Multiplier {
            round_id: RoundId(9),
            multiplier: Multiplier::from_hundredths(125),
            elapsed_ms: 3_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "multiplier");
        assert_eq!(json["multiplier"], 1.25);
        assert_eq!(event.round_id(), Some(RoundId(9)));
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = StatusPublisher::new(snapshot(1), 3, 16);
        let mut rx = publisher.subscribe();
        publisher.emit(RoundEvent::Heartbeat { timestamp: 1 });
        assert_eq!(rx.recv().await.unwrap(), RoundEvent::Heartbeat { timestamp: 1 });
    }
}
