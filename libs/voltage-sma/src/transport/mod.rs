//! Word transport
//!
//! The register layer only needs two Modbus exchanges: read N holding
//! registers and write N holding registers. [`WordTransport`] is that seam;
//! [`ModbusTcpTransport`] implements it over Modbus/TCP and
//! [`crate::simulator::SimulatedDevice`] implements it in memory.
//!
//! # Architecture
//!
//! ```text
//! RegisterAccess ──► TransportAdapter ──► WordTransport
//!                                          ├── ModbusTcpTransport (MBAP over TcpStream)
//!                                          └── SimulatedDevice   (shared register bank)
//! ```

pub mod frame;
pub mod tcp;

pub use tcp::ModbusTcpTransport;

use crate::error::TransportError;
use async_trait::async_trait;

/// Modbus protocol constants
pub mod constants {
    /// MBAP header length without the unit identifier
    pub const MBAP_HEADER_LEN: usize = 6;

    /// Maximum PDU size (function code + data)
    pub const MAX_PDU_SIZE: usize = 253;

    /// Maximum value of the MBAP length field (unit identifier + PDU)
    pub const MAX_MBAP_LENGTH: usize = MAX_PDU_SIZE + 1;

    /// Maximum registers per FC03 request
    pub const MAX_READ_REGISTERS: u16 = 125;

    /// Maximum registers per FC16 request
    pub const MAX_WRITE_REGISTERS: u16 = 123;

    pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

    /// Set on the function code of an exception response
    pub const EXCEPTION_FLAG: u8 = 0x80;

    pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
    pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub const EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;
}

/// Word-level access to a Modbus device
///
/// Implementations own their connection. `read_words`/`write_words` may assume
/// `connect` succeeded; reconnecting after a lost connection is up to the
/// implementation (the next `connect` call).
#[async_trait]
pub trait WordTransport: Send {
    /// Open the connection; a no-op when already connected
    async fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Read `count` holding registers starting at `address`
    async fn read_words(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Write `words` to consecutive holding registers starting at `address`
    async fn write_words(
        &mut self,
        unit_id: u8,
        address: u16,
        words: &[u16],
    ) -> Result<(), TransportError>;
}

/// Human readable name of a Modbus exception code
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
