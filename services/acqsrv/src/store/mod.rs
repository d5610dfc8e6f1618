//! Configuration store abstraction
//!
//! The gateway reads devices and data points from the store and writes back
//! the few fields it owns: a device's last successful connect time, a data
//! point's cached value and the per-point status rows.
//!
//! Implementations:
//! - `SqliteStore`: production backend on the shared SQLite database
//! - `MemoryStore`: in-memory backend for tests

pub mod memory;
pub mod sqlite;

use acq_model::{DataPoint, Device, DeviceCode, PointCode, PointId, PointStatus, Reading};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Access to devices, data points and point statuses
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    // ========== Devices ==========

    /// All devices with `is_active` set
    async fn active_devices(&self) -> Result<Vec<Device>>;

    /// Device by code, active or not
    async fn device(&self, code: DeviceCode) -> Result<Option<Device>>;

    /// Persist the time of the last successful connection
    async fn record_device_connect(&self, code: DeviceCode, at: DateTime<Utc>) -> Result<()>;

    // ========== Data points ==========

    /// All data points with `is_active` set
    async fn active_points(&self) -> Result<Vec<DataPoint>>;

    /// Every data point, for the status broadcast
    async fn all_points(&self) -> Result<Vec<DataPoint>>;

    /// Data point by row id, active or not
    async fn point(&self, id: PointId) -> Result<Option<DataPoint>>;

    /// Store the last value read by a point without a status row (HTTP)
    async fn cache_point_value(&self, id: PointId, value: &Reading) -> Result<()>;

    // ========== Point statuses ==========

    /// Status row of a point, created empty if missing
    async fn status_get_or_create(&self, point: PointCode) -> Result<PointStatus>;

    async fn status(&self, point: PointCode) -> Result<Option<PointStatus>>;

    async fn save_status(&self, status: &PointStatus) -> Result<()>;
}
