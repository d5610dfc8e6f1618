//! Device connection management

pub mod backoff;
pub mod manager;

pub use backoff::ReconnectPolicy;
pub use manager::{ConnectionEvent, ConnectionHealth, ConnectionManager, DeviceLease};
