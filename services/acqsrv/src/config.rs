//! acqsrv configuration
//!
//! Layered with figment: built-in defaults, then `config/acqsrv.yaml` (or the
//! `--config` path), then `ACQSRV_*` environment variables with `__` as the
//! nesting separator, e.g. `ACQSRV_CONNECTION__MAX_DELAY_MS=60000`.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AcqError, Result};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/acqsrv.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACQSRV_";

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcqsrvConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub connection: ConnectionConfig,
    pub scheduler: SchedulerConfig,
    pub reporter: ReporterConfig,
    pub logging: LoggingConfig,
    /// Upper bound for each shutdown phase
    pub shutdown_timeout_secs: u64,
}

impl Default for AcqsrvConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            database: DatabaseConfig::default(),
            connection: ConnectionConfig::default(),
            scheduler: SchedulerConfig::default(),
            reporter: ReporterConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "acqsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL of the configuration store
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/acqsrv.db".to_string(),
        }
    }
}

/// What happens once a device has failed `max_retries` connection attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Retry forever with capped backoff
    #[default]
    Unbounded,
    /// Stop retrying after `max_retries` consecutive failures until the next
    /// reconciliation pass or read request
    Bounded { max_retries: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Reconciliation period of the connection manager
    pub check_interval_secs: u64,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retry: RetryPolicy,
    /// Request timeout for devices without one of their own
    pub default_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            retry: RetryPolicy::Unbounded,
            default_timeout_secs: 3,
        }
    }
}

impl ConnectionConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Behaviour when a poll tick fires while the previous read of the same
/// point is still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the tick
    #[default]
    Skip,
    /// Start the read anyway; it queues behind the device lock
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Reconciliation period of the poll scheduler
    pub reconcile_interval_ms: u64,
    /// Lower bound of any point's poll period
    pub min_interval_secs: u64,
    pub overlap: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 2_000,
            min_interval_secs: 1,
            overlap: OverlapPolicy::Skip,
        }
    }
}

impl SchedulerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Snapshots buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: Option<String>,
    pub json: bool,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
            file: true,
        }
    }
}

impl AcqsrvConfig {
    /// Load defaults, the YAML file and `ACQSRV_*` overrides
    ///
    /// A missing file is not an error; the defaults and environment apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        Self::figment(path)
            .extract()
            .map_err(|e| AcqError::config(format!("Failed to load configuration: {e}")))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AcqsrvConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs.max(1))
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        let connection = &self.connection;
        if connection.check_interval_secs == 0 {
            return Err(AcqError::config("connection.check_interval_secs must be > 0"));
        }
        if connection.initial_delay_ms == 0 {
            return Err(AcqError::config("connection.initial_delay_ms must be > 0"));
        }
        if connection.max_delay_ms < connection.initial_delay_ms {
            return Err(AcqError::config(
                "connection.max_delay_ms must not be below initial_delay_ms",
            ));
        }
        if let RetryPolicy::Bounded { max_retries: 0 } = connection.retry {
            return Err(AcqError::config("connection.retry.max_retries must be > 0"));
        }
        if connection.default_timeout_secs == 0 {
            return Err(AcqError::config("connection.default_timeout_secs must be > 0"));
        }
        if self.scheduler.reconcile_interval_ms == 0 {
            return Err(AcqError::config("scheduler.reconcile_interval_ms must be > 0"));
        }
        if self.reporter.channel_capacity == 0 {
            return Err(AcqError::config("reporter.channel_capacity must be > 0"));
        }
        if self.database.url.trim().is_empty() {
            return Err(AcqError::config("database.url must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AcqsrvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.initial_delay_ms, 1_000);
        assert_eq!(config.connection.max_delay_ms, 30_000);
        assert_eq!(config.scheduler.overlap, OverlapPolicy::Skip);
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = AcqsrvConfig::default();
        config.connection.max_delay_ms = 10;
        assert!(matches!(config.validate(), Err(AcqError::Config(_))));
    }

    #[test]
    fn test_bounded_retry_needs_limit() {
        let mut config = AcqsrvConfig::default();
        config.connection.retry = RetryPolicy::Bounded { max_retries: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_yaml() {
        let policy: RetryPolicy =
            serde_yaml::from_str("policy: bounded\nmax_retries: 5\n").unwrap();
        assert_eq!(policy, RetryPolicy::Bounded { max_retries: 5 });

        let policy: RetryPolicy = serde_yaml::from_str("policy: unbounded\n").unwrap();
        assert_eq!(policy, RetryPolicy::Unbounded);
    }
}
