//! Service bootstrap and initialization
//!
//! Command-line arguments, logging setup and the `--validate` mode.

use std::path::PathBuf;

use clap::Parser;
use common::service_bootstrap::{self, LoggingOptions, ServiceInfo};
use tracing::{debug, info};

use crate::config::AcqsrvConfig;
use crate::error::{AcqError, Result};
use crate::store::{ConfigStore, SqliteStore};

/// Command-line arguments for acqsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "acqsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Industrial Data Acquisition Gateway",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, env = "ACQSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,

    /// Configuration database URL; overrides database.url
    #[arg(long)]
    pub database: Option<String>,
}

impl Args {
    /// Load the configuration and apply command-line overrides
    pub fn load_config(&self) -> Result<AcqsrvConfig> {
        let mut config = AcqsrvConfig::load(self.config.as_deref())?;
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(url) = &self.database {
            config.database.url = url.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Initialize logging from the configuration
///
/// Log root directory priority:
/// 1. ACQSRV_LOG_DIR environment variable
/// 2. logging.dir from the configuration
/// 3. Default "logs"
pub fn initialize_logging(
    args: &Args,
    config: &AcqsrvConfig,
    service_info: &ServiceInfo,
) -> Result<()> {
    let options = LoggingOptions {
        level: Some(config.logging.level.clone()),
        dir: config.logging.dir.clone(),
        json: config.logging.json,
        file: config.logging.file,
        no_color: args.no_color,
    };
    service_bootstrap::init_logging(service_info, &options)
        .map_err(|e| AcqError::config(format!("Failed to init logging: {e}")))
}

/// Open the configuration store and report what would be managed
pub async fn validate_configuration(config: &AcqsrvConfig) -> Result<()> {
    debug!("Validating configuration store {}", config.database.url);

    let store = SqliteStore::connect(&config.database.url).await?;
    store.ping().await?;

    let devices = store.active_devices().await?;
    info!("Found {} active device(s)", devices.len());
    for device in &devices {
        info!(
            "  Device {}: {} ({}, {})",
            device.code,
            device.name,
            device.kind(),
            device.meta.endpoint()
        );
    }

    let points = store.active_points().await?;
    info!("Found {} active data point(s)", points.len());
    for point in &points {
        if !devices.iter().any(|d| d.code == point.device_code) {
            info!(
                "  Point {} references device {} which is missing or inactive",
                point.code, point.device_code
            );
        }
    }

    info!("Configuration validation completed successfully");
    Ok(())
}
