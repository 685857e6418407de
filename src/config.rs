//! TOML-backed runtime configuration.
//!
//! Loaded once at startup, validated, then threaded through constructors as
//! an immutable value. Nothing reads configuration from the environment after
//! boot.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Deserialize;
use thiserror::Error;

/// Failures while reading or validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration, one section per subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Read and validate a config file. Any error here aborts startup; this
    /// is the only error class allowed to do so.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.admission.ensure_default_profiles();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.max_clients == 0 {
            return Err(ConfigError::Invalid(
                "admission.max_clients must be positive".into(),
            ));
        }
        for (name, profile) in &self.admission.profiles {
            profile.validate(name)?;
        }
        if self.telemetry.max_records == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.max_records must be positive".into(),
            ));
        }
        if self.telemetry.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.window_secs must be positive".into(),
            ));
        }
        if self.telemetry.active_clients_cap == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.active_clients_cap must be positive".into(),
            ));
        }
        if self.telemetry.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.prune_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Books API listener.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Ops server port (metrics/assessment/reset). 0 disables it.
    pub metrics_port: Option<u16>,
    /// Gates the reset endpoint: "production" refuses it.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_port: None,
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file; ":memory:" is accepted.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-profile bound on tracked client keys.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_profiles")]
    pub profiles: HashMap<String, ProfileConfig>,
}

impl AdmissionConfig {
    /// Make sure the built-in profiles exist even when the config file only
    /// declares custom ones.
    pub fn ensure_default_profiles(&mut self) {
        for (name, profile) in default_profiles() {
            self.profiles.entry(name).or_insert(profile);
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_clients: default_max_clients(),
            profiles: default_profiles(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Burst size; also the steady-state token ceiling.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Sustained rate in tokens per second.
    #[serde(default = "default_refill")]
    pub refill_per_sec: f64,
    /// Namespace prepended to client keys so profiles never share buckets.
    #[serde(default)]
    pub key_prefix: String,
}

impl ProfileConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "profile '{name}': capacity must be a positive number"
            )));
        }
        if !(self.refill_per_sec.is_finite() && self.refill_per_sec > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "profile '{name}': refill_per_sec must be a positive number"
            )));
        }
        Ok(())
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill(),
            key_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Rolling request-record buffer cap; compaction halves it when crossed.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Default stats window for the ops endpoints.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Active-client set cap; cleared wholesale when crossed.
    #[serde(default = "default_active_clients_cap")]
    pub active_clients_cap: usize,
    /// Cadence of the background maintenance task.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            window_secs: default_window_secs(),
            active_clients_cap: default_active_clients_cap(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_environment() -> String {
    "development".into()
}

fn default_db_path() -> String {
    "shelfd.db".into()
}

fn default_true() -> bool {
    true
}

fn default_max_clients() -> usize {
    10_000
}

fn default_capacity() -> f64 {
    100.0
}

fn default_refill() -> f64 {
    10.0
}

fn default_profiles() -> HashMap<String, ProfileConfig> {
    HashMap::from([
        (
            "standard".to_string(),
            ProfileConfig {
                capacity: 100.0,
                refill_per_sec: 10.0,
                key_prefix: "std".into(),
            },
        ),
        (
            "write".to_string(),
            ProfileConfig {
                capacity: 20.0,
                refill_per_sec: 2.0,
                key_prefix: "wr".into(),
            },
        ),
    ])
}

fn default_max_records() -> usize {
    10_000
}

fn default_window_secs() -> u64 {
    60
}

fn default_active_clients_cap() -> usize {
    10_000
}

fn default_prune_interval() -> u64 {
    300
}
