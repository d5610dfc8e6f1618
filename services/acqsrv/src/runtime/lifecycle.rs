//! Runtime lifecycle management
//!
//! Wires the connection manager, poll scheduler and status reporter together
//! and drives their startup and shutdown order.

use std::sync::Arc;
use std::time::Duration;

use common::shutdown::bounded;
use tracing::info;

use crate::config::AcqsrvConfig;
use crate::connection::{ConnectionManager, ReconnectPolicy};
use crate::protocols::{HttpReader, SessionConnector};
use crate::scheduler::PollScheduler;
use crate::status::StatusReporter;
use crate::store::ConfigStore;

/// The running acquisition gateway
///
/// # Service Architecture
///
/// ```text
/// ┌─────────────────────┐    ┌─────────────────────┐
/// │   Config Store      │───►│ Connection Manager  │
/// │ (devices / points)  │    │ (one session/device)│
/// └─────────────────────┘    └─────────────────────┘
///           │                           │ device lock
///           ▼                           ▼
/// ┌─────────────────────┐    ┌─────────────────────┐
/// │   Poll Scheduler    │───►│ decode → transform  │
/// │ (one loop / point)  │    │  → PointStatus      │
/// └─────────────────────┘    └─────────────────────┘
///                                       │
///                                       ▼
///                           ┌─────────────────────┐
///                           │   Status Reporter   │
///                           │   (broadcast)       │
///                           └─────────────────────┘
/// ```
///
/// # Ordering
///
/// Startup brings up the connection manager before the scheduler so the first
/// ticks find managed devices. Shutdown runs in reverse: loops stop first
/// (in-flight reads finish), then sessions close. Each phase is bounded by
/// `shutdown_timeout_secs`.
#[derive(Debug, Clone)]
pub struct Gateway {
    connections: ConnectionManager,
    scheduler: PollScheduler,
    reporter: StatusReporter,
    shutdown_timeout: Duration,
}

impl Gateway {
    pub fn new(
        config: &AcqsrvConfig,
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self::with_http(config, store, connector, HttpReader::new())
    }

    pub fn with_http(
        config: &AcqsrvConfig,
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn SessionConnector>,
        http: HttpReader,
    ) -> Self {
        let connections = ConnectionManager::new(
            Arc::clone(&store),
            Arc::clone(&connector),
            ReconnectPolicy::from_config(&config.connection),
            config.connection.default_timeout(),
            config.connection.check_interval(),
        );
        let reporter = StatusReporter::new(Arc::clone(&store), config.reporter.channel_capacity);
        let scheduler = PollScheduler::with_http(
            store,
            connections.clone(),
            connector,
            reporter.clone(),
            config.scheduler.clone(),
            http,
        );

        Self {
            connections,
            scheduler,
            reporter,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Start the connection manager, then the poll scheduler
    pub async fn start(&self) {
        info!("Starting acquisition gateway...");
        self.connections.start().await;
        self.scheduler.start().await;

        let devices = self.connections.status().len();
        let points = self.scheduler.active_loops().len();
        info!("Gateway running: {} managed devices, {} polled points", devices, points);
    }

    /// Stop polling, then close every device session
    pub async fn shutdown(&self) {
        info!("Starting graceful shutdown...");

        let scheduler = self.scheduler.clone();
        bounded("Poll scheduler shutdown", self.shutdown_timeout, async move {
            scheduler.shutdown().await;
        })
        .await;

        let connections = self.connections.clone();
        bounded("Connection manager shutdown", self.shutdown_timeout, async move {
            connections.shutdown().await;
        })
        .await;

        info!("Shutdown complete");
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }
}
