//! Register access session
//!
//! [`RegisterAccess`] reads and writes catalog registers on the current unit
//! ID. It enforces the register's access mode, converts between
//! [`RegisterValue`] and wire words, and never retries.
//!
//! Each operation comes in two forms:
//! - `try_read_register` / `try_write_register` return `Result`
//! - `read_register` / `write_register` log the failure and return
//!   [`RegisterValue::Invalid`] / `false`

use crate::adapter::{Exchange, ExchangeOptions, TransportAdapter};
use crate::catalog::{RegisterDefinition, UnitId, DEFAULT_UNIT_ID};
use crate::config::SmaConfig;
use crate::error::{Result, SmaError};
use crate::transport::WordTransport;
use crate::value::{RegisterValue, ScalarType, ValueCodec};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Failures are returned to the caller of the `try_` forms; they log on their own
const SESSION_EXCHANGE: ExchangeOptions = ExchangeOptions {
    raise: true,
    report: false,
};

/// Outcome of reading a write-only register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteOnlyReadPolicy {
    /// Fail with an access mode violation
    #[default]
    #[serde(rename = "reject")]
    Reject,
    /// Report "no data" without touching the transport
    #[serde(rename = "nan")]
    ReadAsNaN,
}

/// Register-level session over one transport
#[derive(Debug)]
pub struct RegisterAccess<T> {
    adapter: TransportAdapter<T>,
    unit_id: UnitId,
    write_only_reads: WriteOnlyReadPolicy,
}

impl<T: WordTransport> RegisterAccess<T> {
    pub fn new(transport: T) -> Self {
        Self {
            adapter: TransportAdapter::new(transport),
            unit_id: DEFAULT_UNIT_ID,
            write_only_reads: WriteOnlyReadPolicy::default(),
        }
    }

    /// Session with unit ID and write-only policy taken from `config`
    pub fn with_config(transport: T, config: &SmaConfig) -> Self {
        Self::new(transport)
            .with_unit_id(config.unit_id)
            .with_write_only_policy(config.write_only_reads)
    }

    pub fn with_unit_id(mut self, unit_id: UnitId) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_write_only_policy(mut self, policy: WriteOnlyReadPolicy) -> Self {
        self.write_only_reads = policy;
        self
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn set_unit_id(&mut self, unit_id: UnitId) {
        self.unit_id = unit_id;
    }

    pub fn write_only_policy(&self) -> WriteOnlyReadPolicy {
        self.write_only_reads
    }

    pub fn adapter(&self) -> &TransportAdapter<T> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut TransportAdapter<T> {
        &mut self.adapter
    }

    pub fn into_transport(self) -> T {
        self.adapter.into_inner()
    }

    /// Connect eagerly; every operation also connects on demand
    pub async fn connect(&mut self) -> Result<()> {
        self.adapter.ensure_connected().await
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn try_read_register(&mut self, def: &RegisterDefinition) -> Result<RegisterValue> {
        def.validate()?;

        if !def.access.can_read() {
            return match self.write_only_reads {
                WriteOnlyReadPolicy::Reject => Err(access_violation(def, "read")),
                WriteOnlyReadPolicy::ReadAsNaN => {
                    debug!("{} is write-only, reading as NaN", def.identifier);
                    Ok(RegisterValue::NaN {
                        scalar_type: def.scalar_type,
                        format: def.format,
                    })
                },
            };
        }

        let unit_id = self.unit_id;
        let value = match def.scalar_type {
            ScalarType::FixedString => {
                let bytes = self
                    .adapter
                    .read_string(unit_id, def.address, def.byte_len(), SESSION_EXCHANGE)
                    .await
                    .and_then(Exchange::into_result)?;
                ValueCodec::decode_text(bytes)
            },
            scalar_type => {
                let bits = self
                    .adapter
                    .read_uint(unit_id, def.address, def.byte_len(), SESSION_EXCHANGE)
                    .await
                    .and_then(Exchange::into_result)?;
                ValueCodec::decode(bits, scalar_type, def.format)
            },
        };
        debug!("{} (unit {}) = {}", def.identifier, unit_id, value);
        Ok(value)
    }

    /// Read a register; any failure yields [`RegisterValue::Invalid`]
    pub async fn read_register(&mut self, def: &RegisterDefinition) -> RegisterValue {
        match self.try_read_register(def).await {
            Ok(value) => value,
            Err(e) => {
                warn!("read {} ({}) failed: {}", def.identifier, def.address, e);
                RegisterValue::Invalid
            },
        }
    }

    // ========================================================================
    // Write
    // ========================================================================

    /// Write a value.
    ///
    /// A numeric value whose `(type, format)` differs from the register's is
    /// re-encoded from its engineering value; "no data" writes the sentinel.
    pub async fn try_write_register(
        &mut self,
        def: &RegisterDefinition,
        value: &RegisterValue,
    ) -> Result<()> {
        def.validate()?;

        if !def.access.can_write() {
            return Err(access_violation(def, "write"));
        }

        let unit_id = self.unit_id;
        match def.scalar_type {
            ScalarType::FixedString => {
                let RegisterValue::Text(bytes) = value else {
                    return Err(SmaError::invalid_data_type(format!(
                        "register {} holds text, got {value:?}",
                        def.identifier
                    )));
                };
                self.adapter
                    .write_string(unit_id, def.address, def.byte_len(), bytes, SESSION_EXCHANGE)
                    .await
                    .and_then(Exchange::into_result)?;
            },
            scalar_type => {
                let bits = match value {
                    RegisterValue::Scalar {
                        scalar_type: value_type,
                        format,
                        ..
                    }
                    | RegisterValue::NaN {
                        scalar_type: value_type,
                        format,
                    } if *value_type == scalar_type && *format == def.format => value.to_bits(),
                    RegisterValue::Scalar { .. } | RegisterValue::NaN { .. } => {
                        value.retyped(scalar_type, def.format).to_bits()
                    },
                    RegisterValue::Text(_) | RegisterValue::Invalid => None,
                }
                .ok_or_else(|| {
                    SmaError::invalid_data_type(format!(
                        "cannot write {value:?} to {} register {}",
                        scalar_type, def.identifier
                    ))
                })?;

                self.adapter
                    .write_uint(unit_id, def.address, def.byte_len(), bits, SESSION_EXCHANGE)
                    .await
                    .and_then(Exchange::into_result)?;
            },
        }
        debug!("{} (unit {}) <- {}", def.identifier, unit_id, value);
        Ok(())
    }

    /// Write a value; returns `false` and logs on any failure
    pub async fn write_register(&mut self, def: &RegisterDefinition, value: &RegisterValue) -> bool {
        match self.try_write_register(def, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("write {} ({}) <- {} failed: {}", def.identifier, def.address, value, e);
                false
            },
        }
    }

    /// Encode `value` with the register's own type and format, then write it
    pub async fn try_write_f64(&mut self, def: &RegisterDefinition, value: f64) -> Result<()> {
        let value = RegisterValue::from_f64(value, def.scalar_type, def.format);
        self.try_write_register(def, &value).await
    }

    pub async fn write_f64(&mut self, def: &RegisterDefinition, value: f64) -> bool {
        let value = RegisterValue::from_f64(value, def.scalar_type, def.format);
        self.write_register(def, &value).await
    }
}

fn access_violation(def: &RegisterDefinition, operation: &'static str) -> SmaError {
    SmaError::AccessModeViolation {
        identifier: def.identifier.to_string(),
        access: def.access,
        operation,
    }
}
