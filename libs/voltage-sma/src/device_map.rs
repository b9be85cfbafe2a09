//! Device map discovery
//!
//! Unit ID 1 exposes a table of the devices behind one Modbus/TCP endpoint.
//! Entries are 4 registers each, starting at 42109:
//!
//! ```text
//! word 0     word 1..2        word 3
//! [SUSy ID]  [serial number]  [unit ID]
//! ```
//!
//! The table ends at the first all-ones entry, at the first failed read, or
//! after the entry at 43085.

use crate::adapter::ExchangeOptions;
use crate::catalog::{UnitId, DEVICE_MAP_UNIT_ID};
use crate::session::RegisterAccess;
use crate::transport::WordTransport;
use serde::Serialize;
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info};

pub const DEVICE_MAP_START: u16 = 42109;
/// Address of the last possible entry
pub const DEVICE_MAP_END: u16 = 43085;
pub const DEVICE_MAP_STRIDE: u16 = 4;
const ENTRY_BYTES: usize = 8;
const END_OF_MAP: u64 = u64::MAX;

/// One row of the device map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceMapEntry {
    /// SMA device family
    pub susy_id: u16,
    pub serial_number: u32,
    /// Unit ID assigned to the device; may lie outside the Modbus range
    pub unit_id: u16,
}

impl DeviceMapEntry {
    pub fn from_bits(bits: u64) -> Self {
        Self {
            susy_id: (bits >> 48) as u16,
            serial_number: (bits >> 16) as u32,
            unit_id: (bits & 0xFFFF) as u16,
        }
    }

    /// The assigned unit ID, if it is addressable and not the broadcast ID
    pub fn modbus_unit_id(&self) -> Option<UnitId> {
        UnitId::try_from(self.unit_id).ok().filter(|unit| *unit >= 1)
    }
}

impl fmt::Display for DeviceMapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SUSy {} SN {} -> unit {}",
            self.susy_id, self.serial_number, self.unit_id
        )
    }
}

/// Temporarily switches a session to another unit ID; the previous ID is
/// restored when the scope is dropped
pub struct UnitScope<'a, T: WordTransport> {
    session: &'a mut RegisterAccess<T>,
    previous: UnitId,
}

impl<'a, T: WordTransport> UnitScope<'a, T> {
    pub fn new(session: &'a mut RegisterAccess<T>, unit_id: UnitId) -> Self {
        let previous = session.unit_id();
        session.set_unit_id(unit_id);
        Self { session, previous }
    }
}

impl<T: WordTransport> Deref for UnitScope<'_, T> {
    type Target = RegisterAccess<T>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: WordTransport> DerefMut for UnitScope<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: WordTransport> Drop for UnitScope<'_, T> {
    fn drop(&mut self) {
        self.session.set_unit_id(self.previous);
    }
}

impl<T: WordTransport> RegisterAccess<T> {
    pub fn unit_scope(&mut self, unit_id: UnitId) -> UnitScope<'_, T> {
        UnitScope::new(self, unit_id)
    }

    /// Read the device map; never fails, a failed read just ends the table.
    ///
    /// The session's unit ID is switched to the device map for the duration of
    /// the scan. Concurrent callers need separate sessions or external locking.
    pub async fn device_map(&mut self) -> Vec<DeviceMapEntry> {
        let mut scope = self.unit_scope(DEVICE_MAP_UNIT_ID);
        let unit_id = scope.unit_id();
        let mut entries = Vec::new();

        let mut address = DEVICE_MAP_START;
        while address <= DEVICE_MAP_END {
            let exchange = match scope
                .adapter_mut()
                .read_uint(unit_id, address, ENTRY_BYTES, ExchangeOptions::default())
                .await
            {
                Ok(exchange) => exchange,
                Err(_) => break,
            };
            if !exchange.is_ok() || exchange.value == END_OF_MAP {
                break;
            }

            let entry = DeviceMapEntry::from_bits(exchange.value);
            debug!("Device map @{}: {}", address, entry);
            entries.push(entry);
            address += DEVICE_MAP_STRIDE;
        }

        info!("Device map: {} entries", entries.len());
        entries
    }

    /// Adopt the first discovered unit ID in `1..=255`; `None` leaves the session unchanged
    pub async fn set_default_unit_id(&mut self) -> Option<UnitId> {
        let unit_id = self
            .device_map()
            .await
            .iter()
            .find_map(DeviceMapEntry::modbus_unit_id)?;
        info!("Default unit ID: {}", unit_id);
        self.set_unit_id(unit_id);
        Some(unit_id)
    }
}
