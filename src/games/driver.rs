//! Background task that advances the crash engine on a fixed period.

use crate::games::crash::CrashEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub struct RoundDriver {
    engine: Arc<CrashEngine>,
    period: Duration,
}

impl RoundDriver {
    pub fn new(engine: Arc<CrashEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until the engine faults. Late ticks are skipped; the multiplier
    /// comes from elapsed time so nothing is lost.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "round driver started");

        loop {
            ticker.tick().await;
            if let Err(fault) = self.engine.advance() {
                error!(error = %fault, "crash engine halted; round driver stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::clock::ManualClock;
    use crate::games::crash::{EngineSettings, COUNTDOWN_MS};
    use crate::games::outcome::ScriptedOutcomes;
    use crate::games::publisher::Phase;
    use crate::games::settlement::SettlementDispatcher;
    use crate::games::types::Amount;
    use crate::metrics::CasinoMetrics;
    use crate::store::MemoryStore;

    fn engine(clock: Arc<ManualClock>, points: Vec<u64>) -> Arc<CrashEngine> {
        let store = Arc::new(MemoryStore::new(Amount::ZERO, 10));
        Arc::new(
            CrashEngine::new(
                EngineSettings::default(),
                clock,
                Box::new(ScriptedOutcomes::new(points)),
                SettlementDispatcher::new(store.clone(), store),
                Arc::new(CasinoMetrics::new().unwrap()),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_driver_starts_round_from_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock.clone(), vec![300]);
        let handle = RoundDriver::new(engine.clone(), Duration::from_millis(1)).spawn();

        clock.set(COUNTDOWN_MS);
        let mut watch = engine.publisher().watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while watch.borrow_and_update().phase != Phase::Running {
                watch.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        handle.abort();
    }

    #[tokio::test]
    async fn test_driver_stops_on_fault() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = engine(clock, vec![101, 0]);
        engine.tick(COUNTDOWN_MS).unwrap();
        engine.tick(COUNTDOWN_MS + 500).unwrap();
        assert!(engine.tick(COUNTDOWN_MS + 10_000).is_err());

        let handle = RoundDriver::new(engine, Duration::from_millis(1)).spawn();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
