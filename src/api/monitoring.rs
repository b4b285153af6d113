//! Monitoring endpoints: Prometheus export and health checks

use super::handlers::AppState;
use crate::games::publisher::Phase;
use crate::games::types::RoundId;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

impl HealthCheck {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
        }
    }

    fn failing(message: impl Into<String>) -> Self {
        Self {
            status: "failing".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" or "degraded"
    pub status: String,
    pub version: String,
    pub timestamp: i64,
    pub round_id: RoundId,
    pub phase: Phase,
    pub checks: BTreeMap<String, HealthCheck>,
}

/// Health check
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let snapshot = state.engine.publisher().current();
    let mut checks = BTreeMap::new();

    let engine = match state.engine.halted() {
        None => HealthCheck::ok(format!("round {} {:?}", snapshot.round_id, snapshot.phase)),
        Some(fault) => HealthCheck::failing(fault.to_string()),
    };
    checks.insert("round_engine".to_string(), engine);
    checks.insert(
        "websockets".to_string(),
        HealthCheck::ok(format!("{} active connections", state.websocket_manager.client_count())),
    );

    let healthy = checks.values().all(|c| c.status == "ok");
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthStatus {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            version: state.version.clone(),
            timestamp: Utc::now().timestamp_millis(),
            round_id: snapshot.round_id,
            phase: snapshot.phase,
            checks,
        }),
    )
}

/// Prometheus metrics endpoint
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
