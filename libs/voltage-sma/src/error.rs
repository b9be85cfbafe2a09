//! SMA register access error types
//!
//! Two layers: [`TransportError`] is what the word-level transport reports,
//! [`SmaError`] adds the register-level failures (access policy, type/format
//! metadata, width checks) on top and wraps transport errors unchanged.

use crate::catalog::AccessMode;
use crate::value::{ScalarFormat, ScalarType};
use thiserror::Error;

/// Result type for voltage-sma operations
pub type Result<T> = std::result::Result<T, SmaError>;

/// Errors surfaced by a word transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted without an open connection
    #[error("Not connected")]
    NotConnected,

    /// IO errors on an established connection
    #[error("IO error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or unexpected response framing
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device answered with a Modbus exception
    #[error(
        "Modbus exception: function code {function:#04x}, exception code {code:#04x} ({})",
        crate::transport::exception_description(*.code)
    )]
    Exception { function: u8, code: u8 },

    /// Request rejected before it was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl TransportError {
    pub fn connection(msg: impl Into<String>) -> Self {
        TransportError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        TransportError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        TransportError::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        TransportError::Protocol(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        TransportError::InvalidRequest(msg.into())
    }

    /// Check if this error leaves the connection unusable
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_)
                | TransportError::NotConnected
                | TransportError::Io(_)
                | TransportError::Timeout(_)
        )
    }
}

/// Register access errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmaError {
    /// Read of a write-only register, or write of a read-only register
    #[error("Access mode violation: cannot {operation} register {identifier} ({access})")]
    AccessModeViolation {
        identifier: String,
        access: AccessMode,
        operation: &'static str,
    },

    /// Register metadata names a type that cannot be handled for this register
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Register metadata names a format that does not fit the register's type
    #[error("Invalid format type: {format} for {scalar_type}")]
    InvalidFormatType {
        scalar_type: ScalarType,
        format: ScalarFormat,
    },

    /// Word or byte count inconsistent with the register's declared width
    #[error("Register width mismatch: expected {expected} {what}, got {actual}")]
    RegisterWidthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Failure reported by the transport
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// No catalog entry with this identifier
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SmaError {
    pub fn invalid_data_type(msg: impl Into<String>) -> Self {
        SmaError::InvalidDataType(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        SmaError::Config(msg.into())
    }

    pub(crate) fn width(what: &'static str, expected: usize, actual: usize) -> Self {
        SmaError::RegisterWidthMismatch {
            what,
            expected,
            actual,
        }
    }

    /// True for failures that originate in the transport rather than in register metadata
    pub fn is_transport(&self) -> bool {
        matches!(self, SmaError::Transport(_))
    }
}
