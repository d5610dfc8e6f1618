//! Data point (source) records

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DeviceCode, PointCode, PointId, ProtocolKind, Reading};

/// Numeric layout of the registers returned by a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    String,
    Bits,
    /// Unrecognised format name: values pass through untyped
    #[serde(other)]
    Other,
}

/// Unit conversion applied to a decoded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertMeta {
    #[serde(default)]
    pub is_active: bool,
    #[serde(flatten)]
    pub method: ConvertMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConvertMethod {
    /// Physical unit conversion between two named units
    #[serde(rename_all = "camelCase")]
    Automatic {
        unit_input: String,
        unit_output: String,
    },
    /// Linear remap of an input range onto an output range
    #[serde(rename_all = "camelCase")]
    Manually {
        input_min: Option<f64>,
        input_max: Option<f64>,
        output_min: f64,
        output_max: f64,
    },
}

/// Aggregation window of an accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationWindow {
    #[default]
    Total,
    Hour,
    Day,
    Month,
}

/// Where the accumulation action takes its parameter from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ActionParam {
    /// The current reading
    #[default]
    Reading,
    /// Increase of the reading since the previous tick
    Difference,
    /// A constant
    Fixed { value: f64 },
}

/// Threshold gate in front of an accumulation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub operator: String,
    pub value: f64,
}

/// Stateful accumulation attached to a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulateRule {
    #[serde(default)]
    pub window: AggregationWindow,
    /// Action name (`increment`, `overwrite`, ...); unknown names produce no value
    pub action: String,
    #[serde(default)]
    pub param: ActionParam,
    #[serde(default)]
    pub condition: Option<ConditionRule>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_function() -> String {
    "readHoldingRegisters".to_string()
}

fn default_length() -> u16 {
    1
}

/// Modbus read parameters shared by the TCP and serial kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusRead {
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default = "default_function")]
    pub modbus_function: String,
    pub data_address: u16,
    #[serde(default = "default_length")]
    pub length_address: u16,
    #[serde(default)]
    pub format: Option<ValueFormat>,
    #[serde(default)]
    pub swap_words: bool,
    #[serde(default)]
    pub swap_bytes: bool,
    /// Derive a processed reading after decoding
    #[serde(default)]
    pub is_reading: bool,
    #[serde(default)]
    pub convert: Option<ConvertMeta>,
    #[serde(default)]
    pub accumulate: Option<AccumulateRule>,
}

/// HTTP GET read parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRead {
    pub url: String,
    #[serde(default)]
    pub is_reading: bool,
    #[serde(default)]
    pub accumulate: Option<AccumulateRule>,
}

/// Protocol-specific read parameters, discriminated by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PointMeta {
    #[serde(rename = "modbus-tcp")]
    ModbusTcp(ModbusRead),
    #[serde(rename = "modbus-serial")]
    ModbusSerial(ModbusRead),
    #[serde(rename = "http")]
    Http(HttpRead),
    #[serde(other)]
    Unsupported,
}

impl PointMeta {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::ModbusTcp(_) => ProtocolKind::ModbusTcp,
            Self::ModbusSerial(_) => ProtocolKind::ModbusSerial,
            Self::Http(_) => ProtocolKind::Http,
            Self::Unsupported => ProtocolKind::Unsupported,
        }
    }

    pub fn accumulate(&self) -> Option<&AccumulateRule> {
        match self {
            Self::ModbusTcp(read) | Self::ModbusSerial(read) => read.accumulate.as_ref(),
            Self::Http(read) => read.accumulate.as_ref(),
            Self::Unsupported => None,
        }
    }
}

/// A single addressable value polled from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub id: PointId,
    pub code: PointCode,
    #[serde(alias = "serverCode")]
    pub device_code: DeviceCode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    /// Poll interval in seconds
    #[serde(default = "default_interval")]
    pub scheduler_interval: u64,
    pub meta: PointMeta,
    #[serde(default)]
    pub cached_last_value: Option<Reading>,
}

fn default_interval() -> u64 {
    1
}

impl DataPoint {
    pub fn kind(&self) -> ProtocolKind {
        self.meta.kind()
    }

    /// Effective poll period, never shorter than `floor_secs` (and never zero)
    pub fn poll_period(&self, floor_secs: u64) -> Duration {
        Duration::from_secs(self.scheduler_interval.max(floor_secs).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modbus_point_defaults() {
        let point: DataPoint = serde_json::from_value(json!({
            "id": 1,
            "code": 100,
            "serverCode": 10,
            "isActive": true,
            "schedulerInterval": 0,
            "meta": { "kind": "modbus-tcp", "dataAddress": 40 }
        }))
        .unwrap();

        assert_eq!(point.device_code, 10);
        assert_eq!(point.poll_period(1), Duration::from_secs(1));
        match point.meta {
            PointMeta::ModbusTcp(read) => {
                assert_eq!(read.unit_id, 1);
                assert_eq!(read.modbus_function, "readHoldingRegisters");
                assert_eq!(read.length_address, 1);
                assert_eq!(read.format, None);
                assert!(!read.swap_words);
            },
            other => panic!("unexpected meta {other:?}"),
        }
    }

    #[test]
    fn test_convert_meta_variants() {
        let automatic: ConvertMeta = serde_json::from_value(json!({
            "isActive": true,
            "type": "automatic",
            "unitInput": "C",
            "unitOutput": "F"
        }))
        .unwrap();
        assert!(matches!(automatic.method, ConvertMethod::Automatic { .. }));

        let manual: ConvertMeta = serde_json::from_value(json!({
            "isActive": true,
            "type": "manually",
            "inputMin": 4.0,
            "outputMin": 0.0,
            "outputMax": 100.0
        }))
        .unwrap();
        assert_eq!(
            manual.method,
            ConvertMethod::Manually {
                input_min: Some(4.0),
                input_max: None,
                output_min: 0.0,
                output_max: 100.0,
            }
        );
    }

    #[test]
    fn test_unknown_format_and_kind() {
        let format: ValueFormat = serde_json::from_value(json!("bcd")).unwrap();
        assert_eq!(format, ValueFormat::Other);

        let meta: PointMeta = serde_json::from_value(json!({ "kind": "rfid" })).unwrap();
        assert_eq!(meta.kind(), ProtocolKind::Unsupported);
    }

    #[test]
    fn test_accumulate_rule() {
        let rule: AccumulateRule = serde_json::from_value(json!({
            "window": "day",
            "action": "increment",
            "param": { "source": "fixed", "value": 1.0 },
            "condition": { "operator": ">", "value": 10.0 }
        }))
        .unwrap();

        assert_eq!(rule.window, AggregationWindow::Day);
        assert_eq!(rule.param, ActionParam::Fixed { value: 1.0 });
        assert_eq!(rule.condition.unwrap().operator, ">");
    }
}
