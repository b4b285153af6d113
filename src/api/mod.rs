//! HTTP and WebSocket surface
//!
//! Crash round betting and cash-out, single-shot games, wallet reads, the
//! push feed, health and metrics.

pub mod crash;
pub mod errors;
pub mod games;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::{build_state, create_app, init_tracing, ApiServer, Components};
