//! Configuration management for nickclaim
//!
//! Layers, later ones winning: built-in defaults, the optional YAML file,
//! `NICKCLAIM__*` environment variables, command line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment};
use tracing::Level;

use nickclaim_common::RetryConfig;
use nickclaim_core::{DEFAULT_NAMES, OrchestratorConfig, SelectBackoff, WorkerConfig};
use nickclaim_store::config::{DEFAULT_CONTACT_POINT, DEFAULT_KEYSPACE, DEFAULT_REPLICATION_FACTOR};
use nickclaim_store::{StoreBackend, StoreConfig};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_CONTENDERS: usize = 10;

const STORE_BACKEND: &str = "nickclaim.store.backend";
const STORE_CONTACT_POINT: &str = "nickclaim.store.contact_point";
const STORE_KEYSPACE: &str = "nickclaim.store.keyspace";
const STORE_REPLICATION_FACTOR: &str = "nickclaim.store.replication_factor";
const STORE_REPLICA_LATENCY_MS: &str = "nickclaim.store.replica_latency_ms";
const NAMES: &str = "nickclaim.names";
const CONTENDERS: &str = "nickclaim.contenders";
const HOST_ID: &str = "nickclaim.host_id";
const WORKER_HOLD_MS: &str = "nickclaim.worker.hold_ms";
const WORKER_RELEASE_PAUSE_MS: &str = "nickclaim.worker.release_pause_ms";
const WORKER_MAX_ITERATIONS: &str = "nickclaim.worker.max_iterations";
const WORKER_SHOW_STATE_AFTER_CLAIM: &str = "nickclaim.worker.show_state_after_claim";
const WORKER_SELECT_BACKOFF_MS: &str = "nickclaim.worker.select_backoff_ms";
const WORKER_SELECT_BACKOFF_JITTER_MS: &str = "nickclaim.worker.select_backoff_jitter_ms";
const WORKER_SEED: &str = "nickclaim.worker.seed";
const RETRY: &str = "nickclaim.retry";
const RUN_DURATION_SECS: &str = "nickclaim.run.duration_secs";
const LOG_LEVEL: &str = "nickclaim.log.level";
const LOG_DIR: &str = "nickclaim.log.dir";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "nickclaim", version, about = "Contenders racing for shared names")]
pub struct Cli {
    /// Configuration file (optional)
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    /// Store backend: memory or cql
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,
    #[arg(long = "contact-point", env = "NICKCLAIM_CONTACT_POINT")]
    pub contact_point: Option<String>,
    #[arg(short = 'k', long = "keyspace")]
    pub keyspace: Option<String>,
    /// Number of concurrent contenders
    #[arg(short = 'n', long = "contenders")]
    pub contenders: Option<u64>,
    /// Iterations per contender before it stops
    #[arg(short = 'i', long = "iterations")]
    pub iterations: Option<u64>,
    /// Stop every contender after this many seconds
    #[arg(short = 'd', long = "duration-secs")]
    pub duration_secs: Option<u64>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the process arguments
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(&Cli::parse())
    }

    pub fn load(args: &Cli) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix("nickclaim")
                    .prefix_separator("__")
                    .separator("__")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = &args.backend {
            config_builder = config_builder.set_override(STORE_BACKEND, v.as_str())?;
        }
        if let Some(v) = &args.contact_point {
            config_builder = config_builder.set_override(STORE_CONTACT_POINT, v.as_str())?;
        }
        if let Some(v) = &args.keyspace {
            config_builder = config_builder.set_override(STORE_KEYSPACE, v.as_str())?;
        }
        if let Some(v) = args.contenders {
            config_builder = config_builder.set_override(CONTENDERS, v)?;
        }
        if let Some(v) = args.iterations {
            config_builder = config_builder.set_override(WORKER_MAX_ITERATIONS, v)?;
        }
        if let Some(v) = args.duration_secs {
            config_builder = config_builder.set_override(RUN_DURATION_SECS, v)?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .map(|v| v.max(0) as u64)
            .unwrap_or(default)
    }

    /// Unset or zero means "none"
    fn get_positive_u64(&self, key: &str) -> Option<u64> {
        self.config
            .get_int(key)
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
    }

    // ========================================================================
    // Store Configuration
    // ========================================================================

    pub fn store_backend(&self) -> Result<StoreBackend, ConfigError> {
        match self.config.get_string(STORE_BACKEND) {
            Ok(v) => v.parse().map_err(ConfigError::Message),
            Err(_) => Ok(StoreBackend::default()),
        }
    }

    pub fn contact_point(&self) -> String {
        self.config
            .get_string(STORE_CONTACT_POINT)
            .unwrap_or(DEFAULT_CONTACT_POINT.to_string())
    }

    pub fn keyspace(&self) -> String {
        self.config
            .get_string(STORE_KEYSPACE)
            .unwrap_or(DEFAULT_KEYSPACE.to_string())
    }

    pub fn replication_factor(&self) -> usize {
        self.get_u64(STORE_REPLICATION_FACTOR, DEFAULT_REPLICATION_FACTOR as u64) as usize
    }

    pub fn replica_latency_ms(&self) -> u64 {
        self.get_u64(STORE_REPLICA_LATENCY_MS, 0)
    }

    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        Ok(StoreConfig {
            backend: self.store_backend()?,
            contact_point: self.contact_point(),
            keyspace: self.keyspace(),
            replication_factor: self.replication_factor(),
            replica_latency_ms: self.replica_latency_ms(),
        })
    }

    // ========================================================================
    // Contender Configuration
    // ========================================================================

    /// Candidate names, as a YAML list or a comma separated string
    pub fn names(&self) -> Vec<String> {
        if let Ok(values) = self.config.get_array(NAMES) {
            return values
                .into_iter()
                .filter_map(|v| v.into_string().ok())
                .collect();
        }

        match self.config.get_string(NAMES) {
            Ok(v) => v.split(',').map(|n| n.trim().to_string()).collect(),
            Err(_) => DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn contenders(&self) -> usize {
        self.get_u64(CONTENDERS, DEFAULT_CONTENDERS as u64) as usize
    }

    pub fn host_id(&self) -> Option<String> {
        self.config
            .get_string(HOST_ID)
            .ok()
            .filter(|h| !h.trim().is_empty())
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.get_u64(WORKER_HOLD_MS, 10))
    }

    pub fn release_pause(&self) -> Duration {
        Duration::from_millis(self.get_u64(WORKER_RELEASE_PAUSE_MS, 1000))
    }

    pub fn max_iterations(&self) -> Option<u64> {
        self.get_positive_u64(WORKER_MAX_ITERATIONS)
    }

    pub fn show_state_after_claim(&self) -> bool {
        self.config
            .get_bool(WORKER_SHOW_STATE_AFTER_CLAIM)
            .unwrap_or(true)
    }

    pub fn select_backoff(&self) -> Option<SelectBackoff> {
        let base = self.get_u64(WORKER_SELECT_BACKOFF_MS, 0);
        let jitter = self.get_u64(WORKER_SELECT_BACKOFF_JITTER_MS, 0);
        (base > 0 || jitter > 0).then(|| {
            SelectBackoff::new(Duration::from_millis(base), Duration::from_millis(jitter))
        })
    }

    pub fn seed(&self) -> Option<u64> {
        self.config.get_int(WORKER_SEED).ok().map(|v| v as u64)
    }

    pub fn retry_config(&self) -> Result<RetryConfig, ConfigError> {
        match self.config.get::<RetryConfig>(RETRY) {
            Ok(retry) => Ok(retry),
            Err(ConfigError::NotFound(_)) => Ok(RetryConfig::default()),
            Err(e) => Err(e),
        }
    }

    pub fn worker_config(&self) -> Result<WorkerConfig, ConfigError> {
        Ok(WorkerConfig {
            hold: self.hold(),
            release_pause: self.release_pause(),
            max_iterations: self.max_iterations(),
            show_state_after_claim: self.show_state_after_claim(),
            select_backoff: self.select_backoff(),
            retry: self.retry_config()?,
            seed: self.seed(),
        })
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        Ok(OrchestratorConfig {
            contenders: self.contenders(),
            host_id: self.host_id(),
            worker: self.worker_config()?,
        })
    }

    /// How long to run before stopping every contender (None = until Ctrl+C)
    pub fn run_duration(&self) -> Option<Duration> {
        self.get_positive_u64(RUN_DURATION_SECS)
            .map(Duration::from_secs)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn log_level(&self) -> Level {
        self.config
            .get_string(LOG_LEVEL)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.config.get_string(LOG_DIR).ok().map(PathBuf::from)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(self.log_dir(), self.log_level())
    }
}
