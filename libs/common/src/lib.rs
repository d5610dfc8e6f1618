//! Shared service plumbing for the acquisition gateway
//!
//! - logging setup (console + rolling file)
//! - shutdown signal handling
//! - service banner and bootstrap helpers

pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use service_bootstrap::{LoggingOptions, ServiceInfo};

// Re-export common dependencies
pub use anyhow;
pub use tokio;
pub use tokio_util;
