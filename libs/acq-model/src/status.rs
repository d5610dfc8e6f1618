//! Per-point runtime status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DataPoint, PointCode, Reading};

/// Note left on a status row when its poll loop is stopped
pub const STOPPED_NOTE: &str = "reading stopped";

/// Latest poll outcome of a data point
///
/// One row per point, created on the first poll attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointStatus {
    pub point_code: PointCode,
    pub is_connected: bool,
    /// Consecutive failed polls
    pub failure_count: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_connection_at: Option<DateTime<Utc>>,
    /// Decoded value of the last successful poll
    pub reading: Option<Reading>,
    /// Processed (converted / scaled) value of the last successful poll
    pub derived: Option<f64>,
    /// Current accumulator value, when the point accumulates
    pub accumulated: Option<f64>,
    pub note: Option<String>,
}

impl PointStatus {
    pub fn new(point_code: PointCode) -> Self {
        Self {
            point_code,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, reading: Reading, derived: Option<f64>, at: DateTime<Utc>) {
        self.reading = Some(reading);
        self.derived = derived;
        self.is_connected = true;
        self.failure_count = 0;
        self.last_sync_at = Some(at);
        self.last_connection_at = Some(at);
        self.note = None;
    }

    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.is_connected = false;
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_connection_at = Some(at);
        self.note = Some(error.into());
    }

    pub fn mark_stopped(&mut self) {
        self.is_connected = false;
        self.failure_count = 0;
        self.last_connection_at = None;
        self.reading = None;
        self.derived = None;
        self.note = Some(STOPPED_NOTE.to_string());
    }
}

/// One entry of the status broadcast: a point with its status row, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSnapshot {
    #[serde(flatten)]
    pub point: DataPoint,
    pub status: Option<PointStatus>,
}
