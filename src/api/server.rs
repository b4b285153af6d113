//! API Server
//!
//! Wires the stores, the round engine and the game processor together, then
//! serves HTTP and WebSocket traffic until a shutdown signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
    websocket::WebSocketManager,
};
use crate::{
    config::CasinoConfig,
    errors::{CasinoError, CasinoResult},
    games::{
        clock::{Clock, SystemClock},
        crash::CrashEngine,
        driver::RoundDriver,
        outcome::{FairOutcomeSource, OutcomeSource},
        processor::InstantGameProcessor,
        rng::RandomSource,
        settlement::SettlementDispatcher,
    },
    metrics::CasinoMetrics,
    store::MemoryStore,
};
use rand::{rngs::OsRng, rngs::StdRng, SeedableRng};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
/// A second call is a no-op.
pub fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

/// Pluggable pieces behind the engine and the game processor
pub struct Components {
    pub clock: Arc<dyn Clock>,
    pub outcomes: Box<dyn OutcomeSource>,
    pub games_rng: Box<dyn RandomSource>,
    pub store: Arc<MemoryStore>,
}

impl Components {
    /// Wall clock, OS-seeded fair outcomes and an in-memory wallet
    pub fn production(config: &CasinoConfig) -> CasinoResult<Self> {
        Ok(Self {
            clock: Arc::new(SystemClock::new()),
            outcomes: Box::new(FairOutcomeSource::new(OsRng)),
            games_rng: Box::new(StdRng::from_entropy()),
            store: Arc::new(MemoryStore::new(
                config.wallet.initial_balance()?,
                config.wallet.history_capacity,
            )),
        })
    }
}

/// Build the shared state. Opens the first crash round.
pub fn build_state(config: &CasinoConfig, components: Components) -> CasinoResult<Arc<AppState>> {
    let metrics = Arc::new(CasinoMetrics::new()?);
    let settlement = SettlementDispatcher::new(components.store.clone(), components.store.clone());

    let engine = Arc::new(CrashEngine::new(
        config.crash.engine_settings()?,
        components.clock,
        components.outcomes,
        settlement.clone(),
        metrics.clone(),
    )?);
    let games = Arc::new(InstantGameProcessor::new(
        components.games_rng,
        settlement,
        config.crash.bet_limits()?,
        metrics.clone(),
    ));
    let websocket_manager = Arc::new(WebSocketManager::new(engine.publisher().clone(), metrics.clone()));

    Ok(Arc::new(AppState {
        engine,
        games,
        balances: components.store.clone(),
        history: components.store,
        websocket_manager,
        metrics,
        metrics_enabled: config.monitoring.metrics_enabled,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Router with the full middleware stack
pub fn create_app(state: Arc<AppState>, config: &CasinoConfig) -> axum::Router {
    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))

        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.server.allowed_origins.clone()))

        .layer(TimeoutLayer::new(config.request_timeout()))

        // Tracing layer (last for complete request tracing)
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: CasinoConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: CasinoConfig) -> CasinoResult<Self> {
        let components = Components::production(&config)?;
        Self::with_components(config, components)
    }

    pub fn with_components(config: CasinoConfig, components: Components) -> CasinoResult<Self> {
        let state = build_state(&config, components)?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Serve until Ctrl+C or SIGTERM. Background tasks stop with the server.
    pub async fn run(self) -> CasinoResult<()> {
        let addr = self.socket_addr()?;
        let driver = RoundDriver::new(self.state.engine.clone(), self.config.crash.tick_interval()).spawn();
        let heartbeat = self
            .state
            .websocket_manager
            .start_heartbeat(self.config.monitoring.heartbeat_interval());

        let app = create_app(self.state.clone(), &self.config);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.log_server_info(addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        driver.abort();
        heartbeat.abort();
        served?;

        info!("crashline server stopped");
        Ok(())
    }

    fn socket_addr(&self) -> CasinoResult<SocketAddr> {
        let ip = self
            .config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| CasinoError::Server(format!("invalid host {}: {}", self.config.server.host, e)))?;
        Ok(SocketAddr::from((ip, self.config.server.port)))
    }

    fn log_server_info(&self, addr: SocketAddr) {
        let limits = self.state.engine.limits();
        info!(
            listen = %addr,
            version = %self.state.version,
            tick_interval_ms = self.config.crash.tick_interval_ms,
            min_bet = %limits.min,
            max_bet = %limits.max,
            metrics_enabled = self.config.monitoring.metrics_enabled,
            "crashline server running"
        );
        info!(origins = ?self.config.server.allowed_origins, timeout_secs = self.config.server.request_timeout_secs, "http settings");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
