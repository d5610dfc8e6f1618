//! Device protocols
//!
//! - `session`: the transport seam used by the connection manager and scheduler
//! - `modbus`: Modbus TCP / RTU on tokio-modbus
//! - `http`: JSON GET reads on reqwest

pub mod http;
pub mod modbus;
pub mod session;

pub use http::HttpReader;
pub use modbus::{ModbusConnector, ModbusSession};
pub use session::{DeviceSession, SessionConnector};
