//! Error types for acq-calc

use thiserror::Error;

/// Decode and transform errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("No data received")]
    NoData,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unsupported unit conversion: {from} -> {to}")]
    UnsupportedUnit { from: String, to: String },
}

impl CalcError {
    pub fn unsupported_operation(name: impl Into<String>) -> Self {
        Self::UnsupportedOperation(name.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    pub fn unsupported_operator(op: impl Into<String>) -> Self {
        Self::UnsupportedOperator(op.into())
    }

    pub fn unsupported_unit(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::UnsupportedUnit {
            from: from.into(),
            to: to.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
