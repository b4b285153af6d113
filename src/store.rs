//! Balance and history backends
//!
//! The round engine and game processor only see the two traits below. The
//! in-memory implementation backs the server and the tests.

use crate::errors::StoreError;
use crate::games::types::{
    Amount, GameType, HistoryRecord, NewHistoryRecord, ParticipantId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Result of a debit attempt. Insufficient funds is an answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { balance: Amount },
    InsufficientFunds { available: Amount },
}

/// Account balances
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current balance for an account
    async fn balance(&self, account: &ParticipantId) -> Result<Amount, StoreError>;

    /// Atomically take `amount` if the balance covers it
    async fn debit(&self, account: &ParticipantId, amount: Amount) -> Result<DebitOutcome, StoreError>;

    /// Add `amount`, returning the new balance
    async fn credit(&self, account: &ParticipantId, amount: Amount) -> Result<Amount, StoreError>;
}

/// Filter for history reads
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub game: Option<GameType>,
    pub participant: Option<ParticipantId>,
    pub since: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, record: &HistoryRecord) -> bool {
        self.game.map_or(true, |game| record.game == game)
            && self
                .participant
                .as_ref()
                .map_or(true, |participant| &record.participant_id == participant)
            && self.since.map_or(true, |since| record.timestamp >= since)
    }
}

/// Append-only game history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord, StoreError>;

    /// Most recent first
    async fn recent(&self, filter: &HistoryFilter, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;
}

/// In-process store. Accounts open on first touch with the configured
/// starting balance.
pub struct MemoryStore {
    balances: DashMap<ParticipantId, Amount>,
    initial_balance: Amount,
    history: RwLock<VecDeque<HistoryRecord>>,
    history_capacity: usize,
    next_record_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(initial_balance: Amount, history_capacity: usize) -> Self {
        Self {
            balances: DashMap::new(),
            initial_balance,
            history: RwLock::new(VecDeque::new()),
            history_capacity: history_capacity.max(1),
            next_record_id: AtomicU64::new(1),
        }
    }

    /// Overwrite a balance (seeding and tests)
    pub fn set_balance(&self, account: &ParticipantId, balance: Amount) {
        self.balances.insert(account.clone(), balance);
    }

    pub fn account_count(&self) -> usize {
        self.balances.len()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn balance(&self, account: &ParticipantId) -> Result<Amount, StoreError> {
        Ok(self
            .balances
            .get(account)
            .map(|entry| *entry)
            .unwrap_or(self.initial_balance))
    }

    async fn debit(&self, account: &ParticipantId, amount: Amount) -> Result<DebitOutcome, StoreError> {
        let mut entry = self
            .balances
            .entry(account.clone())
            .or_insert(self.initial_balance);
        match entry.checked_sub(amount) {
            Some(balance) => {
                *entry = balance;
                Ok(DebitOutcome::Debited { balance })
            }
            None => Ok(DebitOutcome::InsufficientFunds { available: *entry }),
        }
    }

    async fn credit(&self, account: &ParticipantId, amount: Amount) -> Result<Amount, StoreError> {
        let mut entry = self
            .balances
            .entry(account.clone())
            .or_insert(self.initial_balance);
        let balance = entry
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(account.to_string()))?;
        *entry = balance;
        Ok(balance)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord, StoreError> {
        let stored = HistoryRecord {
            id: self.next_record_id.fetch_add(1, Ordering::SeqCst),
            participant_id: record.participant_id,
            game: record.game,
            round_id: record.round_id,
            bet: record.bet,
            multiplier: record.multiplier,
            payout: record.payout,
            outcome: record.outcome,
            detail: record.detail,
            timestamp: Utc::now(),
        };

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, filter: &HistoryFilter, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        Ok(history
            .iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{GameOutcome, Multiplier};

    fn record(participant: &str, game: GameType, outcome: GameOutcome) -> NewHistoryRecord {
        NewHistoryRecord {
            participant_id: ParticipantId::from(participant),
            game,
            round_id: None,
            bet: Amount::from_cents(100),
            multiplier: Multiplier::ONE,
            payout: Amount::ZERO,
            outcome,
            detail: None,
        }
    }

    #[tokio::test]
    async fn test_accounts_open_with_initial_balance() {
        let store = MemoryStore::new(Amount::from_cents(50_000), 100);
        let alice = ParticipantId::from("alice");
        assert_eq!(store.balance(&alice).await.unwrap(), Amount::from_cents(50_000));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() {
        let store = MemoryStore::new(Amount::ZERO, 100);
        let bob = ParticipantId::from("bob");
        store.set_balance(&bob, Amount::from_cents(300));

        let outcome = store.debit(&bob, Amount::from_cents(500)).await.unwrap();
        assert_eq!(
            outcome,
            DebitOutcome::InsufficientFunds { available: Amount::from_cents(300) }
        );
        assert_eq!(store.balance(&bob).await.unwrap(), Amount::from_cents(300));

        let outcome = store.debit(&bob, Amount::from_cents(300)).await.unwrap();
        assert_eq!(outcome, DebitOutcome::Debited { balance: Amount::ZERO });
    }

    #[tokio::test]
    async fn test_credit_overflow_is_an_error() {
        let store = MemoryStore::new(Amount::ZERO, 100);
        let carol = ParticipantId::from("carol");
        store.set_balance(&carol, Amount::from_cents(u64::MAX));
        assert!(matches!(
            store.credit(&carol, Amount::from_cents(1)).await,
            Err(StoreError::Overflow(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_filters_and_orders() {
        let store = MemoryStore::new(Amount::ZERO, 3);
        store.append(record("a", GameType::Dice, GameOutcome::Win)).await.unwrap();
        store.append(record("b", GameType::Crash, GameOutcome::Loss)).await.unwrap();
        store.append(record("a", GameType::Crash, GameOutcome::Win)).await.unwrap();
        store.append(record("c", GameType::Crash, GameOutcome::Loss)).await.unwrap();

        // capacity 3 evicted the first record
        let all = store.recent(&HistoryFilter::default(), 10).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 3, 2]);

        let filter = HistoryFilter {
            game: Some(GameType::Crash),
            participant: Some(ParticipantId::from("a")),
            since: None,
        };
        let mine = store.recent(&filter, 10).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].outcome, GameOutcome::Win);

        let limited = store.recent(&HistoryFilter::default(), 1).await.unwrap();
        assert_eq!(limited[0].id, 4);
    }
}
