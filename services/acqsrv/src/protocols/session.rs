//! Device session abstraction
//!
//! A session is one open transport to one device. The connection manager keeps
//! long-lived sessions; the poll scheduler may also open short-lived ones. Both
//! go through a `SessionConnector`, which tests replace with a scripted double.

use std::time::Duration;

use acq_calc::{RawData, ReadFunction};
use acq_model::Device;
use async_trait::async_trait;

use crate::error::Result;

/// An open transport to a device
#[async_trait]
pub trait DeviceSession: Send {
    /// Whether the transport is still usable
    fn is_open(&self) -> bool;

    /// Issue one read request
    ///
    /// `quantity` is already expanded for the function (coils, registers).
    async fn read(
        &mut self,
        unit_id: u8,
        function: ReadFunction,
        address: u16,
        quantity: u16,
    ) -> Result<RawData>;

    /// Close the transport; closing twice is a no-op
    async fn close(&mut self);
}

/// Opens sessions to devices
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    /// Handshake with `device`, giving up after `timeout`
    async fn connect(&self, device: &Device, timeout: Duration) -> Result<Box<dyn DeviceSession>>;
}
