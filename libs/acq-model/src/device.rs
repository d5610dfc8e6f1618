//! Device (server) records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::DeviceCode;

/// Protocol family of a device or data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    ModbusTcp,
    ModbusSerial,
    Http,
    /// Any kind the gateway does not poll (mqtt, kafka, rfid, ...)
    Unsupported,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModbusTcp => "modbus-tcp",
            Self::ModbusSerial => "modbus-serial",
            Self::Http => "http",
            Self::Unsupported => "unsupported",
        }
    }

    /// Kinds whose devices get a managed, long-lived connection
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::ModbusTcp | Self::ModbusSerial)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serial line parity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Serial line parameters of a Modbus RTU device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialParams {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Connection parameters, discriminated by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DeviceMeta {
    #[serde(rename = "modbus-tcp")]
    ModbusTcp { host: String, port: u16 },
    #[serde(rename = "modbus-serial")]
    ModbusSerial(SerialParams),
    #[serde(rename = "http")]
    Http { url: String },
    #[serde(other)]
    Unsupported,
}

impl DeviceMeta {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::ModbusTcp { .. } => ProtocolKind::ModbusTcp,
            Self::ModbusSerial(_) => ProtocolKind::ModbusSerial,
            Self::Http { .. } => ProtocolKind::Http,
            Self::Unsupported => ProtocolKind::Unsupported,
        }
    }

    /// Human readable endpoint for log lines
    pub fn endpoint(&self) -> String {
        match self {
            Self::ModbusTcp { host, port } => format!("{host}:{port}"),
            Self::ModbusSerial(serial) => format!("{}@{}", serial.device, serial.baud_rate),
            Self::Http { url } => url.clone(),
            Self::Unsupported => "-".to_string(),
        }
    }
}

/// A field device exposing one or more data points
///
/// Read-only to the gateway except for `last_connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub code: DeviceCode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    /// Request timeout in seconds; unset or zero falls back to the service default
    #[serde(default)]
    pub timeout: Option<u64>,
    pub meta: DeviceMeta,
    #[serde(default)]
    pub last_connect: Option<DateTime<Utc>>,
}

impl Device {
    pub fn kind(&self) -> ProtocolKind {
        self.meta.kind()
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => default,
        }
    }

    /// Display label: the name when set, otherwise the code
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.code.to_string()
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tcp_meta_from_json() {
        let device: Device = serde_json::from_value(json!({
            "code": 10,
            "name": "plc-1",
            "isActive": true,
            "timeout": 5,
            "meta": { "kind": "modbus-tcp", "host": "10.0.0.2", "port": 502 }
        }))
        .unwrap();

        assert_eq!(device.kind(), ProtocolKind::ModbusTcp);
        assert_eq!(device.meta.endpoint(), "10.0.0.2:502");
        assert_eq!(device.timeout_or(Duration::from_secs(3)), Duration::from_secs(5));
    }

    #[test]
    fn test_serial_meta_defaults() {
        let meta: DeviceMeta = serde_json::from_value(json!({
            "kind": "modbus-serial",
            "device": "/dev/ttyUSB0"
        }))
        .unwrap();

        match meta {
            DeviceMeta::ModbusSerial(serial) => {
                assert_eq!(serial.baud_rate, 9600);
                assert_eq!(serial.data_bits, 8);
                assert_eq!(serial.stop_bits, 1);
                assert_eq!(serial.parity, Parity::None);
            },
            other => panic!("unexpected meta {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let meta: DeviceMeta = serde_json::from_value(json!({
            "kind": "mqtt",
            "host": "broker",
            "port": 1883
        }))
        .unwrap();

        assert_eq!(meta, DeviceMeta::Unsupported);
        assert!(!meta.kind().is_managed());
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let device = Device {
            code: 1,
            name: String::new(),
            is_active: true,
            timeout: Some(0),
            meta: DeviceMeta::Http {
                url: "http://x".into(),
            },
            last_connect: None,
        };
        assert_eq!(device.timeout_or(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(device.label(), "1");
    }
}
