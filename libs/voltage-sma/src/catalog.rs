//! SMA register catalog
//!
//! Immutable register definitions for the Sunny Boy Storage / Sunny Island
//! family. Addresses are Modbus holding-register numbers as published by SMA
//! (the device expects them verbatim, no 40001 offset).
//!
//! # Unit IDs
//!
//! One TCP connection multiplexes several logical devices:
//!
//! | Unit | Meaning                                  |
//! |------|------------------------------------------|
//! | 0    | broadcast                                |
//! | 1    | device map (see [`crate::device_map`])   |
//! | 2    | plant summary                            |
//! | 3    | first device, default                    |

use crate::error::{Result, SmaError};
use crate::value::{ScalarFormat, ScalarType};
use serde::Serialize;
use std::fmt;

// ============================================================================
// Unit IDs
// ============================================================================

/// Modbus unit identifier
pub type UnitId = u8;

pub const BROADCAST_UNIT_ID: UnitId = 0;
pub const DEVICE_MAP_UNIT_ID: UnitId = 1;
pub const PLANT_UNIT_ID: UnitId = 2;
pub const DEFAULT_UNIT_ID: UnitId = 3;
pub const MAX_UNIT_ID: UnitId = 255;

// ============================================================================
// Register metadata
// ============================================================================

/// Access mode of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessMode {
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "WO")]
    WriteOnly,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub fn can_write(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "RO",
            Self::WriteOnly => "WO",
            Self::ReadWrite => "RW",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// SMA register category flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterCategory {
    Normal,
    /// Writable only after the grid guard code was accepted
    ProtectedAccess,
    /// Volatile control value, may be written cyclically
    ControlObject,
    /// Stored in flash; repeated cyclic writes wear the device
    DestructiveOnRepeatedWrite,
}

/// Static description of one register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterDefinition {
    /// Dotted SMA name, unique within the catalog
    pub identifier: &'static str,
    pub description: &'static str,
    pub address: u16,
    /// Number of 16-bit words
    pub word_count: u16,
    pub scalar_type: ScalarType,
    pub format: ScalarFormat,
    pub access: AccessMode,
    pub categories: &'static [RegisterCategory],
}

impl RegisterDefinition {
    /// Storage length in bytes
    pub fn byte_len(&self) -> usize {
        usize::from(self.word_count) * 2
    }

    pub fn has_category(&self, category: RegisterCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Check that type, format and width can be handled together.
    ///
    /// Run before any transport call so that a bad definition never reaches the wire.
    pub fn validate(&self) -> Result<()> {
        if self.word_count == 0 {
            return Err(SmaError::invalid_data_type(format!(
                "register {} has no words",
                self.identifier
            )));
        }

        match self.scalar_type.byte_width() {
            None => {
                if !matches!(self.format, ScalarFormat::Utf8 | ScalarFormat::Raw) {
                    return Err(SmaError::InvalidFormatType {
                        scalar_type: self.scalar_type,
                        format: self.format,
                    });
                }
            },
            Some(width) => {
                if width != self.byte_len() {
                    return Err(SmaError::invalid_data_type(format!(
                        "{} needs {} bytes but register {} spans {}",
                        self.scalar_type,
                        width,
                        self.identifier,
                        self.byte_len()
                    )));
                }
                let enum_scaled = self.scalar_type == ScalarType::Enum
                    && self.format.decimals().is_some_and(|places| places > 0);
                if self.format == ScalarFormat::Utf8 || enum_scaled {
                    return Err(SmaError::InvalidFormatType {
                        scalar_type: self.scalar_type,
                        format: self.format,
                    });
                }
            },
        }
        Ok(())
    }
}

impl fmt::Display for RegisterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @{} ({}x16bit {}/{} {})",
            self.identifier,
            self.address,
            self.word_count,
            self.scalar_type,
            self.format,
            self.access
        )
    }
}

// ============================================================================
// Register definitions
// ============================================================================

const CONTROL: &[RegisterCategory] = &[RegisterCategory::ControlObject];
const PARAMETER: &[RegisterCategory] = &[RegisterCategory::DestructiveOnRepeatedWrite];
const PROTECTED: &[RegisterCategory] = &[RegisterCategory::ProtectedAccess];
const NORMAL: &[RegisterCategory] = &[RegisterCategory::Normal];

#[allow(clippy::too_many_arguments)]
const fn register(
    identifier: &'static str,
    address: u16,
    word_count: u16,
    scalar_type: ScalarType,
    format: ScalarFormat,
    access: AccessMode,
    categories: &'static [RegisterCategory],
    description: &'static str,
) -> RegisterDefinition {
    RegisterDefinition {
        identifier,
        description,
        address,
        word_count,
        scalar_type,
        format,
        access,
        categories,
    }
}

// ---- control ----

/// Power set-point used while external power control is active; positive discharges, negative charges
pub const EXTERNAL_POWER_IN_WATTS: RegisterDefinition = register(
    "Inv.Ext.W",
    40149,
    2,
    ScalarType::S32,
    ScalarFormat::Integer,
    AccessMode::ReadWrite,
    CONTROL,
    "Active power set-point, external control (W)",
);

/// 802 activates external power control, 803 returns to self-consumption
pub const EXTERNAL_POWER_CONTROL: RegisterDefinition = register(
    "Inv.Ext.Ctrl",
    40151,
    2,
    ScalarType::Enum,
    ScalarFormat::Raw,
    AccessMode::ReadWrite,
    CONTROL,
    "External power control (802 active, 803 inactive)",
);

pub const BMS_OPERATING_MODE: RegisterDefinition = register(
    "CmpBMS.OpMod",
    40236,
    2,
    ScalarType::Enum,
    ScalarFormat::Raw,
    AccessMode::ReadWrite,
    CONTROL,
    "BMS operating mode (303 off, 308 on, 1438 auto, 2289 charge, 2290 discharge, 2424 default)",
);

pub const BATTERY_CHARGE_MAX_IN_WATTS: RegisterDefinition = register(
    "batChaMaxW",
    40795,
    2,
    ScalarType::U32,
    ScalarFormat::Integer,
    AccessMode::ReadWrite,
    PARAMETER,
    "Maximum battery charge power (W)",
);

/// Upper end of the charge/discharge power range; applies in every operating mode
pub const POWER_RANGE_MAX_IN_PERCENT: RegisterDefinition = register(
    "Inv.MaxW.Prc",
    44039,
    2,
    ScalarType::S32,
    ScalarFormat::Fixed2,
    AccessMode::WriteOnly,
    CONTROL,
    "Power range maximum (% of nominal power)",
);

/// Lower end of the charge/discharge power range
pub const POWER_RANGE_MIN_IN_PERCENT: RegisterDefinition = register(
    "Inv.MinW.Prc",
    44041,
    2,
    ScalarType::S32,
    ScalarFormat::Fixed2,
    AccessMode::WriteOnly,
    CONTROL,
    "Power range minimum (% of nominal power)",
);

pub const DEVICE_NAME: RegisterDefinition = register(
    "Nameplate.Location",
    40631,
    12,
    ScalarType::FixedString,
    ScalarFormat::Utf8,
    AccessMode::ReadWrite,
    PARAMETER,
    "Device name",
);

pub const GRID_GUARD_CODE: RegisterDefinition = register(
    "GridGuard.Cd",
    43090,
    2,
    ScalarType::U32,
    ScalarFormat::Raw,
    AccessMode::ReadWrite,
    PROTECTED,
    "Grid guard code",
);

// ---- nameplate ----

pub const NAMEPLATE_DEVICE_CLASS: RegisterDefinition = register(
    "Nameplate.MainModel",
    30051,
    2,
    ScalarType::Enum,
    ScalarFormat::Raw,
    AccessMode::ReadOnly,
    NORMAL,
    "Device class",
);

pub const NAMEPLATE_DEVICE_TYPE: RegisterDefinition = register(
    "Nameplate.Model",
    30053,
    2,
    ScalarType::Enum,
    ScalarFormat::Raw,
    AccessMode::ReadOnly,
    NORMAL,
    "Device type",
);

pub const SERIAL_NUMBER: RegisterDefinition = register(
    "Nameplate.SerNum",
    30057,
    2,
    ScalarType::U32,
    ScalarFormat::Raw,
    AccessMode::ReadOnly,
    NORMAL,
    "Serial number",
);

pub const FIRMWARE_VERSION: RegisterDefinition = register(
    "Nameplate.PkgRev",
    30059,
    2,
    ScalarType::U32,
    ScalarFormat::Firmware,
    AccessMode::ReadOnly,
    NORMAL,
    "Software package",
);

/// Rated power; basis for percent power ranges
pub const INVERTER_NOMINAL_POWER: RegisterDefinition = register(
    "invWLim",
    30233,
    2,
    ScalarType::U32,
    ScalarFormat::Integer,
    AccessMode::ReadOnly,
    NORMAL,
    "Nominal power (W)",
);

// ---- measurements ----

pub const SYSTEM_TIME: RegisterDefinition = register(
    "DtTm.Tm",
    30193,
    2,
    ScalarType::U32,
    ScalarFormat::DateTime,
    AccessMode::ReadOnly,
    NORMAL,
    "System time (Unix seconds)",
);

pub const DEVICE_HEALTH: RegisterDefinition = register(
    "Operation.Health",
    30201,
    2,
    ScalarType::Enum,
    ScalarFormat::Raw,
    AccessMode::ReadOnly,
    NORMAL,
    "Condition (35 fault, 303 off, 307 ok, 455 warning)",
);

pub const TOTAL_YIELD: RegisterDefinition = register(
    "Metering.TotWhOut",
    30513,
    4,
    ScalarType::U64,
    ScalarFormat::Integer,
    AccessMode::ReadOnly,
    NORMAL,
    "Total yield (Wh)",
);

pub const OPERATING_TIME: RegisterDefinition = register(
    "Metering.TotOpTms",
    30521,
    4,
    ScalarType::U64,
    ScalarFormat::Duration,
    AccessMode::ReadOnly,
    NORMAL,
    "Operating time (s)",
);

pub const ACTIVE_POWER: RegisterDefinition = register(
    "GridMs.TotW",
    30775,
    2,
    ScalarType::S32,
    ScalarFormat::Integer,
    AccessMode::ReadOnly,
    NORMAL,
    "Active power (W)",
);

pub const GRID_VOLTAGE_L1: RegisterDefinition = register(
    "GridMs.PhV.phsA",
    30783,
    2,
    ScalarType::U32,
    ScalarFormat::Fixed2,
    AccessMode::ReadOnly,
    NORMAL,
    "Grid voltage phase L1 (V)",
);

pub const GRID_FREQUENCY: RegisterDefinition = register(
    "GridMs.Hz",
    30803,
    2,
    ScalarType::U32,
    ScalarFormat::Fixed2,
    AccessMode::ReadOnly,
    NORMAL,
    "Grid frequency (Hz)",
);

pub const BATTERY_STATE_OF_CHARGE: RegisterDefinition = register(
    "Bat.ChaStt",
    30845,
    2,
    ScalarType::U32,
    ScalarFormat::Integer,
    AccessMode::ReadOnly,
    NORMAL,
    "Battery state of charge (%)",
);

pub const BATTERY_TEMPERATURE: RegisterDefinition = register(
    "Bat.TmpVal",
    30849,
    2,
    ScalarType::S32,
    ScalarFormat::Temperature,
    AccessMode::ReadOnly,
    NORMAL,
    "Battery temperature (0.1 degC raw)",
);

/// Every known register, ordered by address
pub const CATALOG: &[RegisterDefinition] = &[
    NAMEPLATE_DEVICE_CLASS,
    NAMEPLATE_DEVICE_TYPE,
    SERIAL_NUMBER,
    FIRMWARE_VERSION,
    SYSTEM_TIME,
    DEVICE_HEALTH,
    INVERTER_NOMINAL_POWER,
    TOTAL_YIELD,
    OPERATING_TIME,
    ACTIVE_POWER,
    GRID_VOLTAGE_L1,
    GRID_FREQUENCY,
    BATTERY_STATE_OF_CHARGE,
    BATTERY_TEMPERATURE,
    EXTERNAL_POWER_IN_WATTS,
    EXTERNAL_POWER_CONTROL,
    BMS_OPERATING_MODE,
    DEVICE_NAME,
    BATTERY_CHARGE_MAX_IN_WATTS,
    GRID_GUARD_CODE,
    POWER_RANGE_MAX_IN_PERCENT,
    POWER_RANGE_MIN_IN_PERCENT,
];

/// Find a register by its identifier (case-sensitive)
pub fn lookup(identifier: &str) -> Option<&'static RegisterDefinition> {
    CATALOG.iter().find(|def| def.identifier == identifier)
}

/// Find a register by its start address
pub fn by_address(address: u16) -> Option<&'static RegisterDefinition> {
    CATALOG.iter().find(|def| def.address == address)
}

/// Resolve either an identifier or a numeric address
pub fn resolve(name: &str) -> Result<&'static RegisterDefinition> {
    lookup(name)
        .or_else(|| name.parse::<u16>().ok().and_then(by_address))
        .ok_or_else(|| SmaError::UnknownRegister(name.to_string()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::collections::HashSet;

    // ===== Catalog Invariant Tests =====

    #[test]
    fn test_every_entry_validates() {
        for def in CATALOG {
            def.validate()
                .unwrap_or_else(|e| panic!("{} invalid: {e}", def.identifier));
        }
    }

    #[test]
    fn test_scalar_width_matches_word_count() {
        for def in CATALOG {
            if let Some(width) = def.scalar_type.byte_width() {
                assert_eq!(width, def.byte_len(), "{}", def.identifier);
            } else {
                assert!(def.word_count >= 1, "{}", def.identifier);
            }
        }
    }

    #[test]
    fn test_identifiers_and_addresses_unique() {
        let ids: HashSet<_> = CATALOG.iter().map(|d| d.identifier).collect();
        assert_eq!(ids.len(), CATALOG.len());

        let addresses: HashSet<_> = CATALOG.iter().map(|d| d.address).collect();
        assert_eq!(addresses.len(), CATALOG.len());
    }

    #[test]
    fn test_catalog_is_sorted_and_does_not_overlap() {
        for pair in CATALOG.windows(2) {
            let end = u32::from(pair[0].address) + u32::from(pair[0].word_count);
            assert!(
                end <= u32::from(pair[1].address),
                "{} overlaps {}",
                pair[0].identifier,
                pair[1].identifier
            );
        }
    }

    #[test]
    fn test_control_register_metadata() {
        assert_eq!(EXTERNAL_POWER_IN_WATTS.address, 40149);
        assert_eq!(EXTERNAL_POWER_IN_WATTS.scalar_type, ScalarType::S32);
        assert_eq!(EXTERNAL_POWER_CONTROL.address, 40151);
        assert_eq!(BMS_OPERATING_MODE.address, 40236);
        assert_eq!(BATTERY_CHARGE_MAX_IN_WATTS.address, 40795);
        assert_eq!(POWER_RANGE_MAX_IN_PERCENT.access, AccessMode::WriteOnly);
        assert_eq!(POWER_RANGE_MIN_IN_PERCENT.format, ScalarFormat::Fixed2);
        assert_eq!(INVERTER_NOMINAL_POWER.access, AccessMode::ReadOnly);
        assert!(EXTERNAL_POWER_CONTROL.has_category(RegisterCategory::ControlObject));
        assert!(GRID_GUARD_CODE.has_category(RegisterCategory::ProtectedAccess));
    }

    // ===== Lookup Tests =====

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("invWLim").unwrap().address, 30233);
        assert_eq!(by_address(40236).unwrap().identifier, "CmpBMS.OpMod");
        assert!(lookup("invwlim").is_none());
        assert!(by_address(1).is_none());
    }

    #[test]
    fn test_resolve_by_name_or_address() {
        assert_eq!(resolve("Inv.Ext.W").unwrap().address, 40149);
        assert_eq!(resolve("30775").unwrap().identifier, "GridMs.TotW");
        assert_eq!(
            resolve("nope").unwrap_err(),
            SmaError::UnknownRegister("nope".to_string())
        );
    }

    // ===== Validation Tests =====

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let wrong_width = RegisterDefinition {
            word_count: 4,
            ..EXTERNAL_POWER_IN_WATTS
        };
        assert!(matches!(
            wrong_width.validate(),
            Err(SmaError::InvalidDataType(_))
        ));

        let utf8_number = RegisterDefinition {
            format: ScalarFormat::Utf8,
            ..INVERTER_NOMINAL_POWER
        };
        assert!(matches!(
            utf8_number.validate(),
            Err(SmaError::InvalidFormatType { .. })
        ));

        let scaled_enum = RegisterDefinition {
            format: ScalarFormat::Fixed2,
            ..BMS_OPERATING_MODE
        };
        assert!(matches!(
            scaled_enum.validate(),
            Err(SmaError::InvalidFormatType { .. })
        ));

        let fixed_string = RegisterDefinition {
            format: ScalarFormat::Fixed1,
            ..DEVICE_NAME
        };
        assert!(matches!(
            fixed_string.validate(),
            Err(SmaError::InvalidFormatType { .. })
        ));

        let empty = RegisterDefinition {
            word_count: 0,
            ..DEVICE_NAME
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_definition_json_uses_short_names() {
        let json = serde_json::to_value(GRID_FREQUENCY).unwrap();
        assert_eq!(json["identifier"], "GridMs.Hz");
        assert_eq!(json["address"], 30803);
        assert_eq!(json["word_count"], 2);
        assert_eq!(json["scalar_type"], "U32");
        assert_eq!(json["format"], "FIX2");
        assert_eq!(json["access"], "RO");
        assert_eq!(json["categories"], serde_json::json!(["Normal"]));
    }

    #[test]
    fn test_access_mode_display() {
        assert_eq!(AccessMode::ReadOnly.to_string(), "RO");
        assert_eq!(AccessMode::WriteOnly.to_string(), "WO");
        assert_eq!(AccessMode::ReadWrite.to_string(), "RW");
        assert!(!AccessMode::WriteOnly.can_read());
        assert!(!AccessMode::ReadOnly.can_write());
    }
}
