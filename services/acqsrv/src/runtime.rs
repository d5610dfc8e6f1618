//! Runtime orchestration layer
//!
//! Startup and shutdown ordering of the gateway components.

pub mod lifecycle;

pub use lifecycle::Gateway;
