//! Data model for the acquisition gateway
//!
//! Records owned by the configuration store (devices, data points, point
//! statuses) and the value type produced by the decode pipeline. The
//! protocol-specific `meta` blocks are tagged unions keyed by `kind`, matching
//! the JSON documents persisted by the configuration store.

pub mod device;
pub mod point;
pub mod reading;
pub mod status;

pub use device::{Device, DeviceMeta, Parity, ProtocolKind, SerialParams};
pub use point::{
    AccumulateRule, ActionParam, AggregationWindow, ConditionRule, ConvertMeta, ConvertMethod,
    DataPoint, HttpRead, ModbusRead, PointMeta, ValueFormat,
};
pub use reading::Reading;
pub use status::{PointSnapshot, PointStatus, STOPPED_NOTE};

/// Device (server) identity code
pub type DeviceCode = i64;

/// Data point (source) identity code
pub type PointCode = i64;

/// Data point row id, used as the scheduler key
pub type PointId = i64;
