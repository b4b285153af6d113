//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{
    crash::*,
    games::*,
    handlers::*,
    monitoring::{health_handler, metrics_handler},
    websocket::websocket_handler,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))

        // Push feed
        .route("/ws", get(websocket_handler))

        // Wallet and history
        .route("/api/balance", get(balance_handler))
        .route("/api/history", get(history_handler))
        .route("/api/stats", get(stats_handler))

        // Crash rounds
        .route("/api/crash/bet", post(bet_handler))
        .route("/api/crash/cashout", post(cashout_handler))
        .route("/api/crash/status", get(status_handler))
        .route("/api/crash/status/:round_id", get(round_status_handler))
        .route("/api/crash/outcomes", get(outcomes_handler))
        .route("/api/crash/verify", post(verify_handler))

        // Single-shot games
        .route("/api/games/coinflip", post(coinflip_handler))
        .route("/api/games/dice", post(dice_handler))
        .route("/api/games/limbo", post(limbo_handler))
        .route("/api/games/mines", post(mines_handler))
        .route("/api/games/roulette", post(roulette_handler))

        .with_state(state)
}
