//! Modbus TCP / RTU sessions on tokio-modbus
//!
//! TCP devices connect through `tcp::connect`, serial devices open the port
//! with tokio-serial and attach an RTU framer to it. Every request runs under
//! the device timeout; a transport error or timeout closes the session so the
//! connection manager reconnects it.

use std::time::Duration;

use acq_calc::{RawData, ReadFunction};
use acq_model::{Device, DeviceMeta, Parity, SerialParams};
use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, SerialPortBuilderExt, StopBits};
use tracing::debug;

use super::session::{DeviceSession, SessionConnector};
use crate::error::{AcqError, Result};

/// Connector for `modbus-tcp` and `modbus-serial` devices
#[derive(Debug, Default, Clone, Copy)]
pub struct ModbusConnector;

impl ModbusConnector {
    pub fn new() -> Self {
        Self
    }

    async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Context> {
        let mut addrs = tokio::time::timeout(timeout, tokio::net::lookup_host((host, port)))
            .await
            .map_err(|_| AcqError::connection(format!("resolving {host} timed out")))??;
        let addr = addrs
            .next()
            .ok_or_else(|| AcqError::connection(format!("{host} did not resolve")))?;

        tokio::time::timeout(timeout, tcp::connect(addr))
            .await
            .map_err(|_| AcqError::connection(format!("connect to {addr} timed out")))?
            .map_err(|e| AcqError::connection(format!("connect to {addr}: {e}")))
    }

    fn connect_serial(params: &SerialParams, timeout: Duration) -> Result<Context> {
        let (data_bits, stop_bits, parity) = serial_framing(params)?;
        let port = tokio_serial::new(&params.device, params.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(timeout)
            .open_native_async()
            .map_err(|e| AcqError::connection(format!("open {}: {}", params.device, e)))?;

        Ok(rtu::attach(port))
    }
}

/// Map stored framing onto tokio-serial settings, rejecting what a UART cannot do
fn serial_framing(params: &SerialParams) -> Result<(DataBits, StopBits, tokio_serial::Parity)> {
    let data_bits = match params.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => {
            return Err(AcqError::config_inconsistency(format!(
                "{}: data bits must be 5-8, got {}",
                params.device, other
            )))
        },
    };
    let stop_bits = match params.stop_bits {
        1 => StopBits::One,
        2 => StopBits::Two,
        other => {
            return Err(AcqError::config_inconsistency(format!(
                "{}: stop bits must be 1 or 2, got {}",
                params.device, other
            )))
        },
    };
    let parity = match params.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    };
    Ok((data_bits, stop_bits, parity))
}

#[async_trait]
impl SessionConnector for ModbusConnector {
    async fn connect(&self, device: &Device, timeout: Duration) -> Result<Box<dyn DeviceSession>> {
        let ctx = match &device.meta {
            DeviceMeta::ModbusTcp { host, port } => Self::connect_tcp(host, *port, timeout).await?,
            DeviceMeta::ModbusSerial(params) => Self::connect_serial(params, timeout)?,
            _ => {
                return Err(AcqError::connection(format!(
                    "{} devices are not reachable over Modbus",
                    device.kind()
                )))
            },
        };

        debug!(device = device.code, "Modbus session open: {}", device.meta.endpoint());
        Ok(Box::new(ModbusSession {
            ctx: Some(ctx),
            timeout,
            endpoint: device.meta.endpoint(),
        }))
    }
}

/// One open Modbus client context
pub struct ModbusSession {
    ctx: Option<Context>,
    timeout: Duration,
    endpoint: String,
}

impl std::fmt::Debug for ModbusSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusSession")
            .field("endpoint", &self.endpoint)
            .field("open", &self.ctx.is_some())
            .finish()
    }
}

#[async_trait]
impl DeviceSession for ModbusSession {
    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read(
        &mut self,
        unit_id: u8,
        function: ReadFunction,
        address: u16,
        quantity: u16,
    ) -> Result<RawData> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| AcqError::connection(format!("session to {} is closed", self.endpoint)))?;
        ctx.set_slave(Slave(unit_id));

        let request = async {
            match function {
                ReadFunction::ReadCoils => ctx
                    .read_coils(address, quantity)
                    .await
                    .map(|r| r.map(RawData::Bits)),
                ReadFunction::ReadDiscreteInputs => ctx
                    .read_discrete_inputs(address, quantity)
                    .await
                    .map(|r| r.map(RawData::Bits)),
                ReadFunction::ReadHoldingRegisters | ReadFunction::ReadRegistersEnron => ctx
                    .read_holding_registers(address, quantity)
                    .await
                    .map(|r| r.map(RawData::Words)),
                ReadFunction::ReadInputRegisters => ctx
                    .read_input_registers(address, quantity)
                    .await
                    .map(|r| r.map(RawData::Words)),
            }
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(Ok(raw))) => Ok(raw),
            Ok(Ok(Err(exception))) => Err(AcqError::read(format!(
                "{} at {}: Modbus exception {:?}",
                function, address, exception
            ))),
            Ok(Err(e)) => {
                self.ctx = None;
                Err(AcqError::connection(format!("{}: {}", self.endpoint, e)))
            },
            Err(_) => {
                self.ctx = None;
                Err(AcqError::read(format!(
                    "{} at {} timed out after {:?}",
                    function, address, self.timeout
                )))
            },
        }
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!("Closing {} failed: {}", self.endpoint, e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn params(data_bits: u8, stop_bits: u8) -> SerialParams {
        SerialParams {
            device: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
            data_bits,
            stop_bits,
            parity: Parity::Even,
        }
    }

    #[test]
    fn test_serial_framing() {
        let (data, stop, parity) = serial_framing(&params(7, 2)).unwrap();
        assert_eq!(data, DataBits::Seven);
        assert_eq!(stop, StopBits::Two);
        assert_eq!(parity, tokio_serial::Parity::Even);
    }

    #[test]
    fn test_out_of_range_framing_is_rejected() {
        for (data_bits, stop_bits) in [(9, 1), (4, 1), (8, 3), (8, 0)] {
            let result = ModbusConnector::connect_serial(&params(data_bits, stop_bits), Duration::from_secs(1));
            assert!(
                matches!(result, Err(AcqError::ConfigInconsistency(_))),
                "{data_bits} data bits, {stop_bits} stop bits"
            );
        }
    }
}
