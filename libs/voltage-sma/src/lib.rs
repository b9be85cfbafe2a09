//! VoltageEMS SMA Register Access
//!
//! Typed access to SMA inverter and battery registers over Modbus/TCP.
//!
//! # Architecture
//!
//! This library provides:
//! - **Value model**: `RegisterValue`, `ValueCodec` for bit patterns, fixed-point
//!   scaling and per-type "no data" sentinels
//! - **Catalog**: immutable `RegisterDefinition` constants with access modes
//! - **Transport**: `WordTransport` trait with a Modbus/TCP client and an
//!   in-memory simulator
//! - **Session**: `RegisterAccess`, register reads/writes on the current unit ID,
//!   device map discovery and battery control operations
//!
//! ```text
//! RegisterAccess<T> ──► TransportAdapter<T> ──► T: WordTransport
//! ```

pub mod adapter;
pub mod api;
pub mod catalog;
pub mod config;
pub mod device_map;
pub mod error;
pub mod session;
pub mod simulator;
pub mod transport;
pub mod value;

// Re-export core types
pub use adapter::{Exchange, ExchangeOptions, TransportAdapter};
pub use api::{BmsOperatingMode, ExternalPowerControl};
pub use catalog::{AccessMode, RegisterCategory, RegisterDefinition, UnitId, CATALOG};
pub use config::SmaConfig;
pub use device_map::{DeviceMapEntry, UnitScope};
pub use error::{Result, SmaError, TransportError};
pub use session::{RegisterAccess, WriteOnlyReadPolicy};
pub use simulator::SimulatedDevice;
pub use transport::{ModbusTcpTransport, WordTransport};
pub use value::{RegisterValue, ScalarFormat, ScalarType, ValueCodec};
