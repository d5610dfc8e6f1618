//! Error handling for the acquisition service
//!
//! Every failure a poll or a connection attempt can produce maps onto one of
//! these variants. Library errors (sqlx, reqwest, figment, acq-calc) convert
//! through `From` so call sites can use `?`.

use acq_calc::CalcError;
use thiserror::Error;

/// Acquisition service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcqError {
    /// Transport could not be opened or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request failed, timed out or returned a protocol exception
    #[error("Read error: {0}")]
    Read(String),

    /// Response could not be decoded in the configured format
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unit conversion or scaling failed; the raw reading is still valid
    #[error("Transform error: {0}")]
    Transform(String),

    /// A point references a device that is missing, inactive or of another kind
    #[error("Configuration inconsistency: {0}")]
    ConfigInconsistency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration store failures
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the acquisition service
pub type Result<T> = std::result::Result<T, AcqError>;

impl AcqError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn config_inconsistency(msg: impl Into<String>) -> Self {
        Self::ConfigInconsistency(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Transport level failures that invalidate a managed connection
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Read(_))
    }
}

impl From<CalcError> for AcqError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::UnsupportedOperation(_) | CalcError::NoData => Self::Read(err.to_string()),
            CalcError::Decode(msg) => Self::Decode(msg),
            other => Self::Transform(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AcqError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<sqlx::Error> for AcqError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for AcqError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

impl From<figment::Error> for AcqError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AcqError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AcqError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Read(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for AcqError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Read(format!("request timed out: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_error_mapping() {
        assert!(matches!(AcqError::from(CalcError::NoData), AcqError::Read(_)));
        assert!(matches!(
            AcqError::from(CalcError::unsupported_operation("writeCoils")),
            AcqError::Read(_)
        ));
        assert_eq!(
            AcqError::from(CalcError::decode("odd length")),
            AcqError::Decode("odd length".into())
        );
        assert!(matches!(
            AcqError::from(CalcError::invalid_range("no bounds")),
            AcqError::Transform(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(AcqError::connection("refused").is_retryable());
        assert!(AcqError::read("timeout").is_retryable());
        assert!(!AcqError::decode("bad").is_retryable());
        assert!(!AcqError::config_inconsistency("missing device").is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AcqError::connection("refused").to_string(),
            "Connection error: refused"
        );
    }
}
