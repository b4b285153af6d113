//! WebSocket push feed for crash round events
//!
//! Every client gets a snapshot of the current round on connect, then the
//! round events it subscribed to. Heartbeats always go out.

use super::handlers::AppState;
use crate::games::publisher::{RoundEvent, RoundSnapshot, StatusPublisher};
use crate::metrics::CasinoMetrics;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

/// Frames that are not round events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame<'a> {
    /// Sent once on connect
    Snapshot { round: &'a RoundSnapshot },
    /// The client fell behind and missed events
    Lagged { skipped: u64 },
}

/// WebSocket subscription filters
#[derive(Debug, Clone, Deserialize)]
pub struct WsSubscription {
    /// Round created / started / crashed
    #[serde(default = "default_true")]
    pub rounds: bool,

    /// Multiplier ticks while running
    #[serde(default = "default_true")]
    pub multiplier: bool,

    /// Other players' bets and cash-outs
    #[serde(default)]
    pub bets: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WsSubscription {
    fn default() -> Self {
        Self {
            rounds: true,
            multiplier: true,
            bets: false,
        }
    }
}

impl WsSubscription {
    fn wants(&self, event: &RoundEvent) -> bool {
        match event {
            RoundEvent::RoundCreated { .. }
            | RoundEvent::RoundStarted { .. }
            | RoundEvent::Crashed { .. } => self.rounds,
            RoundEvent::Multiplier { .. } => self.multiplier,
            RoundEvent::BetPlaced { .. } | RoundEvent::CashedOut { .. } => self.bets,
            RoundEvent::Heartbeat { .. } => true,
        }
    }
}

/// WebSocket connection manager
#[derive(Clone)]
pub struct WebSocketManager {
    publisher: Arc<StatusPublisher>,
    client_count: Arc<AtomicU64>,
    metrics: Arc<CasinoMetrics>,
}

impl WebSocketManager {
    pub fn new(publisher: Arc<StatusPublisher>, metrics: Arc<CasinoMetrics>) -> Self {
        Self {
            publisher,
            client_count: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    /// Heartbeat task keeping idle connections alive
    pub fn start_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let tx = self.publisher.event_sender();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                // No receivers is fine
                let _ = tx.send(RoundEvent::Heartbeat {
                    timestamp: Utc::now().timestamp_millis().max(0) as u64,
                });
            }
        })
    }

    pub fn handle_upgrade(&self, ws: WebSocketUpgrade, subscription: WsSubscription) -> Response {
        let manager = self.clone();
        ws.on_upgrade(move |socket| async move { manager.handle_connection(socket, subscription).await })
    }

    async fn handle_connection(&self, socket: WebSocket, subscription: WsSubscription) {
        let client_id = generate_client_id();
        let total = self.client_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.websocket_clients.inc();
        info!(client_id = %client_id, total, "websocket client connected");

        // Subscribe before the snapshot so nothing falls in between
        let mut rx = self.publisher.subscribe();
        let (mut sender, mut receiver) = socket.split();

        let snapshot = self.publisher.current();
        let welcome = serde_json::to_string(&ControlFrame::Snapshot { round: snapshot.as_ref() });
        let sent = match welcome {
            Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "failed to encode snapshot");
                false
            }
        };

        if sent {
            let recv_client = client_id.clone();
            let mut receive_task = tokio::spawn(async move {
                while let Some(msg) = receiver.next().await {
                    match msg {
                        Ok(Message::Close(_)) => break,
                        Ok(Message::Text(text)) => {
                            debug!(client_id = %recv_client, len = text.len(), "ignoring client message")
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(client_id = %recv_client, error = %e, "websocket receive error");
                            break;
                        }
                    }
                }
            });

            let send_client = client_id.clone();
            let mut send_task = tokio::spawn(async move {
                loop {
                    let text = match rx.recv().await {
                        Ok(event) if subscription.wants(&event) => serde_json::to_string(&event),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(client_id = %send_client, skipped, "websocket client lagging");
                            serde_json::to_string(&ControlFrame::Lagged { skipped })
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    let Ok(text) = text else { continue };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            tokio::select! {
                _ = &mut receive_task => send_task.abort(),
                _ = &mut send_task => receive_task.abort(),
            }
        }

        let remaining = self.client_count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.websocket_clients.dec();
        info!(client_id = %client_id, remaining, "websocket client disconnected");
    }

    pub fn client_count(&self) -> u64 {
        self.client_count.load(Ordering::SeqCst)
    }
}

fn generate_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// WebSocket endpoint handler
/// GET /ws?rounds=true&multiplier=true&bets=false
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(subscription): Query<WsSubscription>,
    State(state): State<Arc<AppState>>,
) -> Response {
    state.websocket_manager.handle_upgrade(ws, subscription)
}
