//! Register payload decoding
//!
//! Turns the raw result of a Modbus read (coil bits or 16-bit registers) into
//! a typed [`Reading`]. Multi-register formats combine words big-endian after
//! the optional word swap (within each pair) and byte swap (within each word).

use std::fmt;
use std::str::FromStr;

use acq_model::{Reading, ValueFormat};

use crate::error::{CalcError, Result};

/// Raw result of a protocol read
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    /// Coil / discrete input reads
    Bits(Vec<bool>),
    /// Register reads
    Words(Vec<u16>),
}

impl RawData {
    pub fn len(&self) -> usize {
        match self {
            RawData::Bits(bits) => bits.len(),
            RawData::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register view, booleans normalized to 0/1
    fn to_words(&self) -> Vec<u16> {
        match self {
            RawData::Bits(bits) => bits.iter().map(|b| u16::from(*b)).collect(),
            RawData::Words(words) => words.clone(),
        }
    }
}

/// Supported Modbus read functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadFunction {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    /// Holding registers on devices using 32-bit (Enron) registers
    ReadRegistersEnron,
}

impl ReadFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadCoils => "readCoils",
            Self::ReadDiscreteInputs => "readDiscreteInputs",
            Self::ReadHoldingRegisters => "readHoldingRegisters",
            Self::ReadInputRegisters => "readInputRegisters",
            Self::ReadRegistersEnron => "readRegistersEnron",
        }
    }

    /// Whether the function returns bits rather than registers
    pub fn returns_bits(&self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }

    /// Number of protocol units to request for `length` configured values
    pub fn request_quantity(&self, length: u16) -> u16 {
        match self {
            Self::ReadRegistersEnron => length.saturating_mul(2),
            _ => length,
        }
    }
}

impl FromStr for ReadFunction {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "readCoils" => Ok(Self::ReadCoils),
            "readDiscreteInputs" => Ok(Self::ReadDiscreteInputs),
            "readHoldingRegisters" => Ok(Self::ReadHoldingRegisters),
            "readInputRegisters" => Ok(Self::ReadInputRegisters),
            "readRegistersEnron" => Ok(Self::ReadRegistersEnron),
            other => Err(CalcError::unsupported_operation(other)),
        }
    }
}

impl fmt::Display for ReadFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply word and byte swapping to consecutive register pairs
///
/// A trailing unpaired word only gets its bytes swapped. Applying the same
/// flags twice restores the input.
pub fn apply_swap(words: &[u16], swap_words: bool, swap_bytes: bool) -> Vec<u16> {
    let mut out = Vec::with_capacity(words.len());
    for pair in words.chunks(2) {
        match *pair {
            [hi, lo] => {
                let (hi, lo) = if swap_words { (lo, hi) } else { (hi, lo) };
                if swap_bytes {
                    out.push(hi.swap_bytes());
                    out.push(lo.swap_bytes());
                } else {
                    out.push(hi);
                    out.push(lo);
                }
            },
            [single] => out.push(if swap_bytes { single.swap_bytes() } else { single }),
            _ => {},
        }
    }
    out
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn require_groups(words: &[u16], group: usize, format: &str) -> Result<()> {
    if words.len() % group != 0 {
        return Err(CalcError::decode(format!(
            "{format} needs multiples of {group} registers, got {}",
            words.len()
        )));
    }
    Ok(())
}

fn combine(words: &[u16]) -> u64 {
    words
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | u64::from(*word))
}

/// Decode a raw read result
///
/// Without a format the raw sequence is returned as is. Scalar formats unwrap
/// single values; `string` and `bits` always produce one text / one sequence.
pub fn decode(
    raw: &RawData,
    format: Option<ValueFormat>,
    swap_words: bool,
    swap_bytes: bool,
) -> Result<Reading> {
    if raw.is_empty() {
        return Err(CalcError::NoData);
    }

    let Some(format) = format else {
        let values = match raw {
            RawData::Bits(bits) => bits.iter().map(|b| Reading::Bool(*b)).collect(),
            RawData::Words(words) => words
                .iter()
                .map(|w| Reading::Integer(i64::from(*w)))
                .collect(),
        };
        return Ok(Reading::Sequence(values));
    };

    let words = raw.to_words();

    let reading = match format {
        ValueFormat::Int16 => Reading::collapse(
            words
                .iter()
                .map(|w| Reading::Integer(i64::from(*w as i16)))
                .collect(),
        ),
        ValueFormat::Uint16 | ValueFormat::Other => Reading::collapse(
            words
                .iter()
                .map(|w| Reading::Integer(i64::from(*w)))
                .collect(),
        ),
        ValueFormat::Int32 | ValueFormat::Uint32 | ValueFormat::Float32 => {
            require_groups(&words, 2, "32-bit format")?;
            let swapped = apply_swap(&words, swap_words, swap_bytes);
            Reading::collapse(
                swapped
                    .chunks_exact(2)
                    .map(|pair| {
                        let bits = combine(pair) as u32;
                        match format {
                            ValueFormat::Int32 => Reading::Integer(i64::from(bits as i32)),
                            ValueFormat::Uint32 => Reading::Integer(i64::from(bits)),
                            _ => Reading::Float(round2(f64::from(f32::from_bits(bits)))),
                        }
                    })
                    .collect(),
            )
        },
        ValueFormat::Float64 => {
            require_groups(&words, 4, "float64")?;
            let swapped = apply_swap(&words, swap_words, swap_bytes);
            Reading::collapse(
                swapped
                    .chunks_exact(4)
                    .map(|group| Reading::Float(round2(f64::from_bits(combine(group)))))
                    .collect(),
            )
        },
        ValueFormat::String => {
            let swapped = apply_swap(&words, swap_words, swap_bytes);
            let bytes: Vec<u8> = swapped.iter().flat_map(|w| w.to_be_bytes()).collect();
            let text = String::from_utf8_lossy(&bytes);
            Reading::Text(text.trim_end_matches('\0').to_string())
        },
        ValueFormat::Bits => Reading::Sequence(
            words
                .iter()
                .flat_map(|word| (0..16).map(move |i| Reading::Integer(i64::from((word >> i) & 1))))
                .collect(),
        ),
    };

    Ok(reading)
}
