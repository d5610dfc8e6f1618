//! acq-calc - Register decoding and value transforms for the acquisition gateway
//!
//! Turns raw Modbus read results into typed readings and derives processed
//! values from them.
//!
//! # Example
//!
//! ```rust
//! use acq_calc::{decode, RawData};
//! use acq_model::{Reading, ValueFormat};
//!
//! let raw = RawData::Words(vec![0x4100, 0x0000]);
//! let value = decode(&raw, Some(ValueFormat::Float32), false, false).unwrap();
//! assert_eq!(value, Reading::Float(8.0));
//! ```
//!
//! # Formats
//!
//! | Format | Registers per value | Notes |
//! |--------|---------------------|-------|
//! | `int16` / `uint16` | 1 | `int16` sign-extended |
//! | `int32` / `uint32` / `float32` | 2 | word/byte swap applied per pair, floats rounded to 2 dp |
//! | `float64` | 4 | rounded to 2 dp |
//! | `string` | any | big-endian bytes, trailing NULs stripped |
//! | `bits` | 1 → 16 values | least-significant bit first |
//!
//! # Transforms
//!
//! | Function | Description |
//! |----------|-------------|
//! | `convert_by_unit(v, from, to)` | Physical unit conversion, `None` for unknown pairs |
//! | `convert_by_linearization(v, range)` | Two-point remap or single-bound extrapolation |
//! | `evaluate_condition(l, op, r)` | Threshold check on 2-dp rounded values |
//! | `apply_action(name, current, param)` | Accumulation step (`increment`, `divide`, `reset`, ...) |
//! | `accumulated_difference(new, prev, abs)` | Counter increase between two readings |

pub mod accumulator;
pub mod actions;
pub mod codec;
pub mod condition;
pub mod error;
pub mod pipeline;
pub mod scaling;
pub mod units;

pub use accumulator::{window_key, Accumulator};
pub use actions::{accumulated_difference, apply_action, Action};
pub use codec::{apply_swap, decode, RawData, ReadFunction};
pub use condition::{evaluate_condition, ConditionOutcome, Operator};
pub use error::{CalcError, Result};
pub use pipeline::derive;
pub use scaling::{convert_by_linearization, LinearRange};
pub use units::{convert_by_unit, convert_unit};
