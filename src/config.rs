//! Configuration management with validation and defaults
//!
//! TOML file, then `CRASHLINE_*` environment overrides, then validation.

use crate::errors::{CasinoResult, ConfigurationError};
use crate::games::crash::EngineSettings;
use crate::games::types::{Amount, BetLimits};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoConfig {
    pub server: ServerConfig,
    pub crash: CrashConfig,
    pub wallet: WalletConfig,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
}

/// HTTP / WebSocket listener
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty allows any origin
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec![],
            request_timeout_secs: 30,
        }
    }
}

/// Crash round engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Driver period; the multiplier itself is computed from elapsed time
    pub tick_interval_ms: u64,
    pub min_bet: f64,
    pub max_bet: f64,
    pub recent_outcomes_capacity: usize,
    /// Push events buffered per subscriber before it lags
    pub event_buffer: usize,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            min_bet: 0.01,
            max_bet: 10_000.0,
            recent_outcomes_capacity: 100,
            event_buffer: 1024,
        }
    }
}

impl CrashConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Stake bounds shared by the crash round and the single-shot games
    pub fn bet_limits(&self) -> Result<BetLimits, ConfigurationError> {
        let min = Amount::from_units(self.min_bet)
            .filter(|amount| !amount.is_zero())
            .ok_or_else(|| ConfigurationError::invalid("crash.min_bet", self.min_bet, "must be at least 0.01"))?;
        let max = Amount::from_units(self.max_bet)
            .ok_or_else(|| ConfigurationError::invalid("crash.max_bet", self.max_bet, "must be a finite amount"))?;
        if max < min {
            return Err(ConfigurationError::invalid("crash.max_bet", self.max_bet, "must not be below min_bet"));
        }
        Ok(BetLimits { min, max })
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigurationError> {
        Ok(EngineSettings {
            limits: self.bet_limits()?,
            recent_outcomes: self.recent_outcomes_capacity,
            event_buffer: self.event_buffer,
        })
    }
}

/// In-memory wallet backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Balance of an account on first use
    pub initial_balance: f64,
    pub history_capacity: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            initial_balance: 500.0,
            history_capacity: 10_000,
        }
    }
}

impl WalletConfig {
    pub fn initial_balance(&self) -> Result<Amount, ConfigurationError> {
        Amount::from_units(self.initial_balance).ok_or_else(|| {
            ConfigurationError::invalid("wallet.initial_balance", self.initial_balance, "must be a non-negative amount")
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "crashline=info,tower_http=info".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_enabled: bool,
    /// WebSocket heartbeat period
    pub heartbeat_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            heartbeat_secs: 30,
        }
    }
}

impl MonitoringConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl CasinoConfig {
    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("server.host".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigurationError::invalid("server.port", 0, "port cannot be zero"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigurationError::invalid("server.request_timeout_secs", 0, "must be positive"));
        }

        let tick = self.crash.tick_interval_ms;
        if !(1..=1000).contains(&tick) {
            return Err(ConfigurationError::invalid("crash.tick_interval_ms", tick, "must be within 1..=1000"));
        }
        if tick > 20 {
            warn!(tick_interval_ms = tick, "tick interval above 20ms; crash detection will lag the curve");
        }
        self.crash.bet_limits()?;
        if self.crash.recent_outcomes_capacity == 0 {
            return Err(ConfigurationError::invalid("crash.recent_outcomes_capacity", 0, "must be positive"));
        }
        if self.crash.event_buffer == 0 {
            return Err(ConfigurationError::invalid("crash.event_buffer", 0, "must be positive"));
        }

        self.wallet.initial_balance()?;
        if self.wallet.history_capacity == 0 {
            return Err(ConfigurationError::invalid("wallet.history_capacity", 0, "must be positive"));
        }

        if self.monitoring.heartbeat_secs == 0 {
            return Err(ConfigurationError::invalid("monitoring.heartbeat_secs", 0, "must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
    lookup: EnvLookup,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            lookup: Box::new(|key| env::var(key).ok()),
        }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Replace the process environment, e.g. with a fixed map in tests
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> CasinoResult<CasinoConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => CasinoConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> CasinoResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut CasinoConfig) -> Result<(), ConfigurationError> {
        if let Some(host) = (self.lookup)("CRASHLINE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = self.parsed("CRASHLINE_PORT", "Invalid port number")? {
            config.server.port = port;
        }
        if let Some(origins) = (self.lookup)("CRASHLINE_ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(tick) = self.parsed("CRASHLINE_TICK_INTERVAL_MS", "Invalid tick interval")? {
            config.crash.tick_interval_ms = tick;
        }
        if let Some(min_bet) = self.parsed("CRASHLINE_MIN_BET", "Invalid amount")? {
            config.crash.min_bet = min_bet;
        }
        if let Some(max_bet) = self.parsed("CRASHLINE_MAX_BET", "Invalid amount")? {
            config.crash.max_bet = max_bet;
        }
        if let Some(balance) = self.parsed("CRASHLINE_INITIAL_BALANCE", "Invalid amount")? {
            config.wallet.initial_balance = balance;
        }
        if let Some(filter) = (self.lookup)("CRASHLINE_LOG") {
            config.logging.filter = filter;
        }
        if let Some(enabled) = self.parsed("CRASHLINE_METRICS_ENABLED", "Invalid boolean value")? {
            config.monitoring.metrics_enabled = enabled;
        }
        Ok(())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigurationError> {
        match (self.lookup)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigurationError::invalid(key, raw, reason)),
            None => Ok(None),
        }
    }

    /// Save configuration to file
    pub fn save(&self, config: &CasinoConfig, path: &str) -> CasinoResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> CasinoResult<()> {
    ConfigLoader::new().save(&CasinoConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CasinoError;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CasinoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.crash.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.wallet.initial_balance().unwrap(), Amount::from_cents(50_000));
        let limits = config.crash.bet_limits().unwrap();
        assert_eq!(limits.min, Amount::from_cents(1));
        assert_eq!(limits.max, Amount::from_cents(1_000_000));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = CasinoConfig::default();
        config.crash.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.crash.tick_interval_ms = 1_001;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.crash.min_bet = 20_000.0;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.wallet.initial_balance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CRASHLINE_PORT", "9090"),
            ("CRASHLINE_TICK_INTERVAL_MS", "10"),
            ("CRASHLINE_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("CRASHLINE_INITIAL_BALANCE", "25.5"),
        ]
        .into_iter()
        .collect();
        let config = ConfigLoader::new()
            .with_env(move |key| vars.get(key).map(|v| v.to_string()))
            .load()
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.crash.tick_interval_ms, 10);
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert_eq!(config.wallet.initial_balance().unwrap(), Amount::from_cents(2_550));
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let err = ConfigLoader::new()
            .with_env(|key| (key == "CRASHLINE_PORT").then(|| "eighty".to_string()))
            .load()
            .unwrap_err();
        match err {
            CasinoError::Configuration(ConfigurationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "CRASHLINE_PORT")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_and_load_config() -> CasinoResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = CasinoConfig::default();
        original.crash.max_bet = 250.0;
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_env(no_env).with_path(path).load()?;
        assert_eq!(loaded, original);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[server]\nport = 7000\n").unwrap();

        let loaded = ConfigLoader::new()
            .with_env(no_env)
            .with_path(temp_file.path())
            .load()
            .unwrap();
        assert_eq!(loaded.server.port, 7000);
        assert_eq!(loaded.crash, CrashConfig::default());
    }
}
