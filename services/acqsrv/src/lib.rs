//! Acquisition Service Library (acqsrv)
//!
//! Keeps connections to field devices, polls every configured data point on
//! its own schedule, decodes and transforms the raw values and publishes the
//! latest reading with connection health.
//!
//! # Architecture
//!
//! - **`connection`**: one managed session per Modbus device, reconnect with backoff
//! - **`scheduler`**: one poll loop per active data point, reconciled against the store
//! - **`status`**: broadcast of every point joined with its status row
//! - **`protocols`**: Modbus TCP/RTU sessions and HTTP reads
//! - **`store`**: configuration store trait with SQLite and in-memory backends
//! - **`runtime`**: the [`Gateway`] tying the above together
//!
//! Decoding and value transforms live in the `acq-calc` crate, the records in
//! `acq-model`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use acqsrv::{AcqsrvConfig, Gateway, ModbusConnector, SqliteStore};
//!
//! # async fn run() -> acqsrv::Result<()> {
//! let config = AcqsrvConfig::load(None)?;
//! let store = Arc::new(SqliteStore::connect(&config.database.url).await?);
//! let gateway = Gateway::new(&config, store, Arc::new(ModbusConnector::new()));
//!
//! gateway.start().await;
//! let mut snapshots = gateway.reporter().subscribe();
//! while let Ok(snapshot) = snapshots.recv().await {
//!     println!("{} points", snapshot.len());
//! }
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocols;
pub mod runtime;
pub mod scheduler;
pub mod status;
pub mod store;

pub use config::{AcqsrvConfig, OverlapPolicy, RetryPolicy};
pub use connection::{ConnectionEvent, ConnectionHealth, ConnectionManager, ReconnectPolicy};
pub use error::{AcqError, Result};
pub use protocols::{DeviceSession, HttpReader, ModbusConnector, SessionConnector};
pub use runtime::Gateway;
pub use scheduler::PollScheduler;
pub use status::StatusReporter;
pub use store::{ConfigStore, MemoryStore, SqliteStore};
