//! Prometheus metrics for the casino service

use crate::games::types::GameType;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct CasinoMetrics {
    registry: Registry,
    pub bets_total: IntCounterVec,
    pub wagered_cents_total: IntCounterVec,
    pub declines_total: IntCounterVec,
    pub cash_outs_total: IntCounter,
    pub paid_out_cents_total: IntCounterVec,
    pub rounds_total: IntCounter,
    pub settlement_failures_total: IntCounterVec,
    pub current_multiplier: Gauge,
    pub websocket_clients: IntGauge,
}

impl CasinoMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("crashline".to_string()), None)?;

        let bets_total = IntCounterVec::new(
            Opts::new("bets_total", "Accepted bets and plays"),
            &["game"],
        )?;
        let wagered_cents_total = IntCounterVec::new(
            Opts::new("wagered_cents_total", "Total stake accepted, in cents"),
            &["game"],
        )?;
        let declines_total = IntCounterVec::new(
            Opts::new("declines_total", "Declined requests by operation and reason"),
            &["operation", "reason"],
        )?;
        let cash_outs_total = IntCounter::new("cash_outs_total", "Successful crash cash-outs")?;
        let paid_out_cents_total = IntCounterVec::new(
            Opts::new("paid_out_cents_total", "Total winnings credited, in cents"),
            &["game"],
        )?;
        let rounds_total = IntCounter::new("rounds_total", "Crash rounds that reached the crash point")?;
        let settlement_failures_total = IntCounterVec::new(
            Opts::new("settlement_failures_total", "Failed settlement writes by kind"),
            &["kind"],
        )?;
        let current_multiplier = Gauge::new("current_multiplier", "Multiplier of the live crash round")?;
        let websocket_clients = IntGauge::new("websocket_clients", "Connected push clients")?;

        registry.register(Box::new(bets_total.clone()))?;
        registry.register(Box::new(wagered_cents_total.clone()))?;
        registry.register(Box::new(declines_total.clone()))?;
        registry.register(Box::new(cash_outs_total.clone()))?;
        registry.register(Box::new(paid_out_cents_total.clone()))?;
        registry.register(Box::new(rounds_total.clone()))?;
        registry.register(Box::new(settlement_failures_total.clone()))?;
        registry.register(Box::new(current_multiplier.clone()))?;
        registry.register(Box::new(websocket_clients.clone()))?;

        Ok(Self {
            registry,
            bets_total,
            wagered_cents_total,
            declines_total,
            cash_outs_total,
            paid_out_cents_total,
            rounds_total,
            settlement_failures_total,
            current_multiplier,
            websocket_clients,
        })
    }

    pub fn record_bet(&self, game: GameType, stake_cents: u64) {
        let label = game.to_string();
        self.bets_total.with_label_values(&[&label]).inc();
        self.wagered_cents_total.with_label_values(&[&label]).inc_by(stake_cents);
    }

    pub fn record_payout(&self, game: GameType, payout_cents: u64) {
        self.paid_out_cents_total
            .with_label_values(&[&game.to_string()])
            .inc_by(payout_cents);
    }

    pub fn record_decline(&self, operation: &str, reason: &str) {
        self.declines_total.with_label_values(&[operation, reason]).inc();
    }

    pub fn record_settlement_failure(&self, kind: &str) {
        self.settlement_failures_total.with_label_values(&[kind]).inc();
    }

    /// Prometheus text exposition
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_values() {
        let metrics = CasinoMetrics::new().unwrap();
        metrics.record_bet(GameType::Crash, 1_000);
        metrics.record_decline("place_bet", "betting_closed");
        metrics.current_multiplier.set(1.5);

        let text = metrics.render().unwrap();
        assert!(text.contains("crashline_bets_total{game=\"crash\"} 1"));
        assert!(text.contains("crashline_wagered_cents_total{game=\"crash\"} 1000"));
        assert!(text.contains("reason=\"betting_closed\""));
        assert!(text.contains("crashline_current_multiplier 1.5"));
    }

    #[test]
    fn test_independent_registries() {
        let first = CasinoMetrics::new().unwrap();
        let second = CasinoMetrics::new().unwrap();
        first.cash_outs_total.inc();
        assert_eq!(first.cash_outs_total.get(), 1);
        assert_eq!(second.cash_outs_total.get(), 0);
    }
}
