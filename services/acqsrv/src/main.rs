//! Acquisition Service (`acqsrv`)
//!
//! Industrial data acquisition gateway for Modbus and HTTP field devices.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use acqsrv::bootstrap::{self, Args};
use acqsrv::{Gateway, ModbusConnector, SqliteStore};
use common::service_bootstrap::{print_startup_banner, ServiceInfo};
use common::shutdown::cancel_on_signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ============ Phase 1: configuration and logging ============
    let args = Args::parse();
    let config = args.load_config()?;

    let service_info = ServiceInfo::new(
        config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
        "Industrial Data Acquisition Gateway - Modbus TCP/RTU and HTTP",
    );
    bootstrap::initialize_logging(&args, &config, &service_info)?;
    if !args.no_color {
        print_startup_banner(&service_info);
    }

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::validate_configuration(&config).await?;
        info!("Validation completed successfully");
        return Ok(());
    }

    // ============ Phase 2: configuration store ============
    info!("Loading configuration from {}", config.database.url);
    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);

    // ============ Phase 3: connections and polling ============
    let gateway = Gateway::new(&config, store, Arc::new(ModbusConnector::new()));
    gateway.start().await;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());
    shutdown.cancelled().await;

    gateway.shutdown().await;
    Ok(())
}
