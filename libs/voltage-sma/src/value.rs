//! Register value model
//!
//! Converts between raw register bit patterns / byte strings and engineering
//! values according to a `(ScalarType, ScalarFormat)` pair.
//!
//! Every numeric SMA type reserves one bit pattern as "no data" (the sentinel).
//! Inside this crate that pattern never travels as a number: decoding it yields
//! [`RegisterValue::NaN`], and only [`RegisterValue::to_bits`] / [`ValueCodec::encode`]
//! turn "no data" back into the sentinel at the transport boundary.

use crate::error::{Result, SmaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Sentinels
// ============================================================================

/// "No data" pattern for U32 registers
pub const U32_NAN: u64 = 0xFFFF_FFFF;
/// "No data" pattern for S32 registers (`i32::MIN`)
pub const S32_NAN: u64 = 0x8000_0000;
/// "No data" pattern for U64 registers
pub const U64_NAN: u64 = 0xFFFF_FFFF_FFFF_FFFF;
/// "No data" pattern for S64 registers (`i64::MIN`)
pub const S64_NAN: u64 = 0x8000_0000_0000_0000;
/// "No data" pattern for ENUM registers
pub const ENUM_NAN: u64 = 0x00FF_FFFD;

/// 2^63 and 2^64 as f64; `i64::MAX as f64` rounds up to 2^63 so the bounds are exclusive
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// Relative distance from `.5` still treated as a tie, in units of the scaled magnitude.
/// Absorbs the representation error of `2.345 * 100.0 = 234.49999999999997`.
const TIE_TOLERANCE: f64 = 4.0 * f64::EPSILON;

// ============================================================================
// Scalar type / format
// ============================================================================

/// SMA data type of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "U32")]
    U32,
    #[serde(rename = "S32")]
    S32,
    #[serde(rename = "U64")]
    U64,
    #[serde(rename = "S64")]
    S64,
    #[serde(rename = "ENUM")]
    Enum,
    /// Fixed-length byte string (SMA `STR32`)
    #[serde(rename = "STR32")]
    FixedString,
}

impl ScalarType {
    /// Byte width implied by the type; `None` for strings, whose width comes from the register
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            Self::U32 | Self::S32 | Self::Enum => Some(4),
            Self::U64 | Self::S64 => Some(8),
            Self::FixedString => None,
        }
    }

    /// The "no data" bit pattern; strings have none
    pub const fn sentinel(self) -> Option<u64> {
        match self {
            Self::U32 => Some(U32_NAN),
            Self::S32 => Some(S32_NAN),
            Self::U64 => Some(U64_NAN),
            Self::S64 => Some(S64_NAN),
            Self::Enum => Some(ENUM_NAN),
            Self::FixedString => None,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::S32 | Self::S64)
    }

    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::FixedString)
    }

    const fn mask(self) -> u64 {
        match self {
            Self::U32 | Self::S32 | Self::Enum => 0xFFFF_FFFF,
            Self::U64 | Self::S64 | Self::FixedString => u64::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U32 => "U32",
            Self::S32 => "S32",
            Self::U64 => "U64",
            Self::S64 => "S64",
            Self::Enum => "ENUM",
            Self::FixedString => "STR32",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScalarType {
    type Err = SmaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "U32" => Ok(Self::U32),
            "S32" => Ok(Self::S32),
            "U64" => Ok(Self::U64),
            "S64" => Ok(Self::S64),
            "ENUM" => Ok(Self::Enum),
            "STR32" | "STRING" => Ok(Self::FixedString),
            _ => Err(SmaError::invalid_data_type(format!(
                "unknown data type '{s}'"
            ))),
        }
    }
}

/// SMA data format of a register
///
/// `Integer` and `Fixed1`..`Fixed4` are fixed-point formats: the transmitted
/// integer equals the engineering value times `10^N`. The remaining formats only
/// affect presentation and never rescale the numeric domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarFormat {
    #[serde(rename = "FIX0")]
    Integer,
    #[serde(rename = "FIX1")]
    Fixed1,
    #[serde(rename = "FIX2")]
    Fixed2,
    #[serde(rename = "FIX3")]
    Fixed3,
    #[serde(rename = "FIX4")]
    Fixed4,
    #[serde(rename = "DUR")]
    Duration,
    #[serde(rename = "DT")]
    DateTime,
    #[serde(rename = "TEMP")]
    Temperature,
    #[serde(rename = "RAW")]
    Raw,
    #[serde(rename = "UTF8")]
    Utf8,
    #[serde(rename = "FW")]
    Firmware,
}

impl ScalarFormat {
    /// Decimal places of a fixed-point format
    pub const fn decimals(self) -> Option<usize> {
        match self {
            Self::Integer => Some(0),
            Self::Fixed1 => Some(1),
            Self::Fixed2 => Some(2),
            Self::Fixed3 => Some(3),
            Self::Fixed4 => Some(4),
            _ => None,
        }
    }

    /// Factor between the engineering and the raw integer domain
    pub fn scale(self) -> f64 {
        match self.decimals() {
            Some(places) => 10f64.powi(places as i32),
            None => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "FIX0",
            Self::Fixed1 => "FIX1",
            Self::Fixed2 => "FIX2",
            Self::Fixed3 => "FIX3",
            Self::Fixed4 => "FIX4",
            Self::Duration => "DUR",
            Self::DateTime => "DT",
            Self::Temperature => "TEMP",
            Self::Raw => "RAW",
            Self::Utf8 => "UTF8",
            Self::Firmware => "FW",
        }
    }
}

impl fmt::Display for ScalarFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScalarFormat {
    type Err = SmaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "FIX0" | "INTEGER" => Ok(Self::Integer),
            "FIX1" => Ok(Self::Fixed1),
            "FIX2" => Ok(Self::Fixed2),
            "FIX3" => Ok(Self::Fixed3),
            "FIX4" => Ok(Self::Fixed4),
            "DUR" | "DURATION" => Ok(Self::Duration),
            "DT" | "DATETIME" => Ok(Self::DateTime),
            "TEMP" | "TEMPERATURE" => Ok(Self::Temperature),
            "RAW" => Ok(Self::Raw),
            "UTF8" => Ok(Self::Utf8),
            "FW" | "FIRMWARE" => Ok(Self::Firmware),
            _ => Err(SmaError::invalid_data_type(format!(
                "unknown data format '{s}'"
            ))),
        }
    }
}

// ============================================================================
// RegisterValue
// ============================================================================

/// Result of a register read, or input to a register write
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    /// Real data; `bits` is never the sentinel of `scalar_type`
    Scalar {
        bits: u64,
        scalar_type: ScalarType,
        format: ScalarFormat,
    },
    /// The device reported "no data" for this register
    NaN {
        scalar_type: ScalarType,
        format: ScalarFormat,
    },
    /// FixedString payload, trailing NULs included
    Text(Vec<u8>),
    /// The operation that should have produced this value failed
    Invalid,
}

impl RegisterValue {
    /// Interpret a raw bit pattern
    pub fn from_bits(bits: u64, scalar_type: ScalarType, format: ScalarFormat) -> Self {
        ValueCodec::decode(bits, scalar_type, format)
    }

    /// Build a value from an engineering number; NaN and out-of-range numbers become `NaN`
    pub fn from_f64(value: f64, scalar_type: ScalarType, format: ScalarFormat) -> Self {
        if !scalar_type.is_numeric() {
            return Self::Invalid;
        }
        ValueCodec::decode(
            ValueCodec::encode(value, scalar_type, format),
            scalar_type,
            format,
        )
    }

    /// Build a FixedString value
    pub fn text(bytes: impl Into<Vec<u8>>) -> Self {
        ValueCodec::decode_text(bytes)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Scalar { .. } | Self::Text(_))
    }

    /// Structurally fine reading that carried the sentinel
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NaN { .. })
    }

    /// The producing operation failed
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Self::Scalar { scalar_type, .. } | Self::NaN { scalar_type, .. } => Some(*scalar_type),
            Self::Text(_) => Some(ScalarType::FixedString),
            Self::Invalid => None,
        }
    }

    pub fn format(&self) -> Option<ScalarFormat> {
        match self {
            Self::Scalar { format, .. } | Self::NaN { format, .. } => Some(*format),
            Self::Text(_) | Self::Invalid => None,
        }
    }

    /// Bit pattern to put on the wire; "no data" becomes the type's sentinel
    pub fn to_bits(&self) -> Option<u64> {
        match self {
            Self::Scalar { bits, .. } => Some(*bits),
            Self::NaN { scalar_type, .. } => scalar_type.sentinel(),
            Self::Text(_) | Self::Invalid => None,
        }
    }

    /// Engineering value; `f64::NAN` for anything that is not valid numeric data
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Scalar {
                bits,
                scalar_type,
                format,
            } => ValueCodec::engineering(*bits, *scalar_type, *format),
            _ => f64::NAN,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Re-encode through the engineering domain into another `(type, format)`
    pub fn retyped(&self, scalar_type: ScalarType, format: ScalarFormat) -> Self {
        match self {
            Self::Scalar { .. } | Self::NaN { .. } => {
                Self::from_f64(self.as_f64(), scalar_type, format)
            },
            Self::Text(_) | Self::Invalid => Self::Invalid,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ValueCodec::to_display_string(self))
    }
}

// ============================================================================
// ValueCodec
// ============================================================================

/// Bidirectional mapping between bit patterns / byte strings and engineering values
pub struct ValueCodec;

impl ValueCodec {
    /// Decode a raw bit pattern.
    ///
    /// Only the low bits covered by the type's width are considered. The
    /// sentinel decodes to [`RegisterValue::NaN`] whatever the format. A
    /// FixedString has no numeric image and decodes to [`RegisterValue::Invalid`].
    pub fn decode(bits: u64, scalar_type: ScalarType, format: ScalarFormat) -> RegisterValue {
        let Some(sentinel) = scalar_type.sentinel() else {
            return RegisterValue::Invalid;
        };
        let bits = bits & scalar_type.mask();
        if bits == sentinel {
            RegisterValue::NaN {
                scalar_type,
                format,
            }
        } else {
            RegisterValue::Scalar {
                bits,
                scalar_type,
                format,
            }
        }
    }

    /// Encode an engineering value into the type's bit pattern.
    ///
    /// The value is scaled by `10^N` for fixed-point formats and rounded to the
    /// nearest integer, ties away from zero. NaN, negative values for unsigned
    /// types, magnitudes outside the type's range, and integers that coincide
    /// with the sentinel all encode to the sentinel. FixedString has no numeric
    /// image and encodes to 0.
    pub fn encode(value: f64, scalar_type: ScalarType, format: ScalarFormat) -> u64 {
        let Some(sentinel) = scalar_type.sentinel() else {
            return 0;
        };
        if value.is_nan() || (!scalar_type.is_signed() && value < 0.0) {
            return sentinel;
        }

        let rounded = round_half_away_from_zero(value * format.scale());
        let image = match scalar_type {
            ScalarType::U32 | ScalarType::Enum => {
                (0.0..=u32::MAX as f64).contains(&rounded).then(|| rounded as u64)
            },
            ScalarType::S32 => (i32::MIN as f64..=i32::MAX as f64)
                .contains(&rounded)
                .then(|| u64::from(rounded as i32 as u32)),
            ScalarType::U64 => (0.0..U64_LIMIT).contains(&rounded).then(|| rounded as u64),
            ScalarType::S64 => (-I64_LIMIT..I64_LIMIT)
                .contains(&rounded)
                .then(|| rounded as i64 as u64),
            ScalarType::FixedString => None,
        };

        match image {
            Some(bits) if bits != sentinel => bits,
            _ => sentinel,
        }
    }

    /// Engineering value of a non-sentinel bit pattern
    pub fn engineering(bits: u64, scalar_type: ScalarType, format: ScalarFormat) -> f64 {
        let raw = match scalar_type {
            ScalarType::U32 | ScalarType::Enum => f64::from(bits as u32),
            ScalarType::S32 => f64::from(bits as u32 as i32),
            ScalarType::U64 => bits as f64,
            ScalarType::S64 => bits as i64 as f64,
            ScalarType::FixedString => return f64::NAN,
        };
        match format.decimals() {
            Some(places) if places > 0 => raw / format.scale(),
            _ => raw,
        }
    }

    /// Wrap a FixedString payload; bytes are kept as read, trailing NULs included
    pub fn decode_text(bytes: impl Into<Vec<u8>>) -> RegisterValue {
        RegisterValue::Text(bytes.into())
    }

    /// Right-pad `text` with NUL bytes to `target_len`; longer input is rejected, never truncated
    pub fn encode_text(text: impl AsRef<[u8]>, target_len: usize) -> Result<Vec<u8>> {
        let text = text.as_ref();
        if text.len() > target_len {
            return Err(SmaError::width("bytes", target_len, text.len()));
        }
        let mut bytes = Vec::with_capacity(target_len);
        bytes.extend_from_slice(text);
        bytes.resize(target_len, 0);
        Ok(bytes)
    }

    /// Human readable rendering: `NaN` for missing data, fixed decimals for FIXn formats
    pub fn to_display_string(value: &RegisterValue) -> String {
        match value {
            RegisterValue::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            RegisterValue::NaN { .. } | RegisterValue::Invalid => "NaN".to_string(),
            RegisterValue::Scalar { format, .. } => {
                let number = value.as_f64();
                match format.decimals() {
                    Some(places) => format!("{number:.places$}"),
                    None => format!("{number}"),
                }
            },
        }
    }
}

fn round_half_away_from_zero(scaled: f64) -> f64 {
    let magnitude = scaled.abs();
    if (magnitude.fract() - 0.5).abs() <= magnitude * TIE_TOLERANCE {
        (magnitude.trunc() + 1.0).copysign(scaled)
    } else {
        scaled.round()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const NUMERIC_TYPES: [ScalarType; 5] = [
        ScalarType::U32,
        ScalarType::S32,
        ScalarType::U64,
        ScalarType::S64,
        ScalarType::Enum,
    ];

    const ALL_FORMATS: [ScalarFormat; 11] = [
        ScalarFormat::Integer,
        ScalarFormat::Fixed1,
        ScalarFormat::Fixed2,
        ScalarFormat::Fixed3,
        ScalarFormat::Fixed4,
        ScalarFormat::Duration,
        ScalarFormat::DateTime,
        ScalarFormat::Temperature,
        ScalarFormat::Raw,
        ScalarFormat::Utf8,
        ScalarFormat::Firmware,
    ];

    // ========================================================================
    // Sentinel handling
    // ========================================================================

    #[test]
    fn test_sentinel_decodes_to_nan_for_every_format() {
        for ty in NUMERIC_TYPES {
            let sentinel = ty.sentinel().unwrap();
            for fmt in ALL_FORMATS {
                let value = ValueCodec::decode(sentinel, ty, fmt);
                assert!(!value.is_valid(), "{ty}/{fmt}");
                assert!(value.is_no_data(), "{ty}/{fmt}");
                assert!(value.as_f64().is_nan());
                assert_eq!(value.to_bits(), Some(sentinel));
            }
        }
    }

    #[test]
    fn test_nan_encodes_to_sentinel_for_every_format() {
        for ty in NUMERIC_TYPES {
            for fmt in ALL_FORMATS {
                assert_eq!(
                    ValueCodec::encode(f64::NAN, ty, fmt),
                    ty.sentinel().unwrap(),
                    "{ty}/{fmt}"
                );
            }
        }
    }

    #[test]
    fn test_sentinel_values() {
        assert_eq!(ScalarType::U32.sentinel(), Some(0xFFFF_FFFF));
        assert_eq!(ScalarType::S32.sentinel(), Some(0x8000_0000));
        assert_eq!(ScalarType::U64.sentinel(), Some(u64::MAX));
        assert_eq!(ScalarType::S64.sentinel(), Some(i64::MIN as u64));
        assert_eq!(ScalarType::Enum.sentinel(), Some(0x00FF_FFFD));
        assert_eq!(ScalarType::FixedString.sentinel(), None);
    }

    #[test]
    fn test_u64_and_s64_validity_uses_their_own_sentinel() {
        // S32's sentinel is ordinary data for the 64-bit types
        let u64_value = ValueCodec::decode(S32_NAN, ScalarType::U64, ScalarFormat::Integer);
        assert!(u64_value.is_valid());
        assert_eq!(u64_value.as_f64(), 2_147_483_648.0);

        let s64_value = ValueCodec::decode(S32_NAN, ScalarType::S64, ScalarFormat::Integer);
        assert!(s64_value.is_valid());
    }

    #[test]
    fn test_decode_masks_to_type_width() {
        let value = ValueCodec::decode(0x1_0000_0005, ScalarType::U32, ScalarFormat::Integer);
        assert_eq!(value.to_bits(), Some(5));

        let nan = ValueCodec::decode(0xAB_FFFF_FFFF, ScalarType::U32, ScalarFormat::Integer);
        assert!(nan.is_no_data());
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    #[test]
    fn test_rounding_ties_away_from_zero() {
        assert_eq!(
            ValueCodec::encode(2.345, ScalarType::S32, ScalarFormat::Fixed2),
            235
        );
        assert_eq!(
            ValueCodec::encode(-2.345, ScalarType::S32, ScalarFormat::Fixed2),
            u64::from((-235i32) as u32)
        );
        assert_eq!(
            ValueCodec::encode(0.5, ScalarType::U32, ScalarFormat::Integer),
            1
        );
        assert_eq!(
            ValueCodec::encode(-0.5, ScalarType::S32, ScalarFormat::Integer),
            u64::from((-1i32) as u32)
        );
        // not a tie: must not be pulled up by the tie tolerance
        assert_eq!(
            ValueCodec::encode(2.344_9, ScalarType::S32, ScalarFormat::Fixed2),
            234
        );
    }

    #[test]
    fn test_near_tie_is_not_a_tie() {
        assert_eq!(
            ValueCodec::encode(0.499_999_6, ScalarType::U32, ScalarFormat::Integer),
            0
        );
        assert_eq!(
            ValueCodec::encode(-0.499_999_6, ScalarType::S32, ScalarFormat::Integer),
            0
        );
        assert_eq!(
            ValueCodec::encode(1.500_000_4, ScalarType::U32, ScalarFormat::Integer),
            2
        );
        assert_eq!(
            ValueCodec::encode(12.344_999_9, ScalarType::U32, ScalarFormat::Fixed2),
            1234
        );
    }

    #[test]
    fn test_positive_fraction_has_no_floor_bias() {
        assert_eq!(
            ValueCodec::encode(12.7, ScalarType::U32, ScalarFormat::Integer),
            13
        );
        assert_eq!(
            ValueCodec::encode(0.29, ScalarType::U32, ScalarFormat::Fixed2),
            29
        );
    }

    #[test]
    fn test_negative_value_for_unsigned_is_sentinel() {
        assert_eq!(
            ValueCodec::encode(-1.0, ScalarType::U32, ScalarFormat::Integer),
            U32_NAN
        );
        assert_eq!(
            ValueCodec::encode(-0.3, ScalarType::U64, ScalarFormat::Integer),
            U64_NAN
        );
        assert_eq!(
            ValueCodec::encode(-5.0, ScalarType::Enum, ScalarFormat::Raw),
            ENUM_NAN
        );
    }

    #[test]
    fn test_out_of_range_is_sentinel() {
        assert_eq!(
            ValueCodec::encode(4_294_967_296.0, ScalarType::U32, ScalarFormat::Integer),
            U32_NAN
        );
        assert_eq!(
            ValueCodec::encode(2_147_483_648.0, ScalarType::S32, ScalarFormat::Integer),
            S32_NAN
        );
        // 30_000_000 * 100 overflows i32
        assert_eq!(
            ValueCodec::encode(30_000_000.0, ScalarType::S32, ScalarFormat::Fixed2),
            S32_NAN
        );
        assert_eq!(
            ValueCodec::encode(f64::INFINITY, ScalarType::S64, ScalarFormat::Integer),
            S64_NAN
        );
        assert_eq!(
            ValueCodec::encode(1e20, ScalarType::U64, ScalarFormat::Integer),
            U64_NAN
        );
    }

    #[test]
    fn test_negative_s32_fixed2() {
        let bits = ValueCodec::encode(-150.0, ScalarType::S32, ScalarFormat::Fixed2);
        assert_eq!(bits, u64::from((-15000i32) as u32));
        assert_eq!(bits, 0xFFFF_C568);
    }

    #[test]
    fn test_presentation_formats_do_not_rescale() {
        for fmt in [
            ScalarFormat::Duration,
            ScalarFormat::DateTime,
            ScalarFormat::Temperature,
            ScalarFormat::Raw,
            ScalarFormat::Firmware,
        ] {
            assert_eq!(ValueCodec::encode(1438.0, ScalarType::U32, fmt), 1438);
            assert_eq!(ValueCodec::decode(1438, ScalarType::U32, fmt).as_f64(), 1438.0);
        }
    }

    #[test]
    fn test_round_trip_within_format_resolution() {
        let cases = [
            (ScalarType::U32, ScalarFormat::Integer, 2500.0),
            (ScalarType::U32, ScalarFormat::Fixed2, 49.98),
            (ScalarType::S32, ScalarFormat::Fixed1, -23.4),
            (ScalarType::S32, ScalarFormat::Fixed3, 1.234),
            (ScalarType::U64, ScalarFormat::Fixed4, 123_456.789_1),
            (ScalarType::S64, ScalarFormat::Fixed2, -9_876_543.21),
            (ScalarType::Enum, ScalarFormat::Raw, 2289.0),
        ];
        for (ty, fmt, v) in cases {
            let decoded = ValueCodec::decode(ValueCodec::encode(v, ty, fmt), ty, fmt);
            let tolerance = 1.0 / fmt.scale();
            assert!(
                (decoded.as_f64() - v).abs() <= tolerance,
                "{ty}/{fmt}: {v} -> {}",
                decoded.as_f64()
            );
        }
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    #[test]
    fn test_decode_signedness() {
        let s32 = ValueCodec::decode(0xFFFF_FFFE, ScalarType::S32, ScalarFormat::Integer);
        assert_eq!(s32.as_f64(), -2.0);

        let u32v = ValueCodec::decode(0xFFFF_FFFE, ScalarType::U32, ScalarFormat::Integer);
        assert_eq!(u32v.as_f64(), 4_294_967_294.0);

        let s64 = ValueCodec::decode(u64::MAX - 9, ScalarType::S64, ScalarFormat::Fixed1);
        assert_eq!(s64.as_f64(), -1.0);
    }

    #[test]
    fn test_decode_u32_words() {
        let bits = (0x0000u64 << 16) | 0x09C4;
        let value = ValueCodec::decode(bits, ScalarType::U32, ScalarFormat::Integer);
        assert!(value.is_valid());
        assert_eq!(value.as_f64(), 2500.0);
    }

    #[test]
    fn test_fixed_string_has_no_numeric_image() {
        assert_eq!(
            ValueCodec::decode(0, ScalarType::FixedString, ScalarFormat::Utf8),
            RegisterValue::Invalid
        );
        assert_eq!(
            ValueCodec::encode(1.0, ScalarType::FixedString, ScalarFormat::Utf8),
            0
        );
        assert_eq!(
            RegisterValue::from_f64(1.0, ScalarType::FixedString, ScalarFormat::Utf8),
            RegisterValue::Invalid
        );
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_encode_text_pads_with_nul() {
        let bytes = ValueCodec::encode_text("abc", 6).unwrap();
        assert_eq!(bytes, b"abc\0\0\0");

        let value = ValueCodec::decode_text(bytes);
        assert_eq!(value.as_bytes(), Some(&b"abc\0\0\0"[..]));
        assert!(value.is_valid());
    }

    #[test]
    fn test_encode_text_never_truncates() {
        let err = ValueCodec::encode_text("too long", 4).unwrap_err();
        assert_eq!(
            err,
            SmaError::RegisterWidthMismatch {
                what: "bytes",
                expected: 4,
                actual: 8
            }
        );
    }

    // ========================================================================
    // Display
    // ========================================================================

    #[test]
    fn test_display_fixed_decimals() {
        let v = RegisterValue::from_f64(49.98, ScalarType::U32, ScalarFormat::Fixed2);
        assert_eq!(v.to_string(), "49.98");

        let v = RegisterValue::from_f64(2500.0, ScalarType::U32, ScalarFormat::Integer);
        assert_eq!(v.to_string(), "2500");

        let v = RegisterValue::from_f64(-1.5, ScalarType::S32, ScalarFormat::Fixed4);
        assert_eq!(v.to_string(), "-1.5000");
    }

    #[test]
    fn test_display_nan_and_generic() {
        let nan = ValueCodec::decode(ENUM_NAN, ScalarType::Enum, ScalarFormat::Raw);
        assert_eq!(nan.to_string(), "NaN");
        assert_eq!(RegisterValue::Invalid.to_string(), "NaN");

        let raw = ValueCodec::decode(803, ScalarType::Enum, ScalarFormat::Raw);
        assert_eq!(raw.to_string(), "803");
    }

    #[test]
    fn test_display_text_keeps_content() {
        let v = RegisterValue::text(b"SN:1\0\0".to_vec());
        assert_eq!(v.to_string(), "SN:1\0\0");
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    #[test]
    fn test_retyped_goes_through_engineering_value() {
        let watts = RegisterValue::from_f64(-150.0, ScalarType::S32, ScalarFormat::Integer);
        let percent = watts.retyped(ScalarType::S32, ScalarFormat::Fixed2);
        assert_eq!(percent.to_bits(), Some(u64::from((-15000i32) as u32)));

        let nan = ValueCodec::decode(U32_NAN, ScalarType::U32, ScalarFormat::Integer);
        assert!(nan
            .retyped(ScalarType::S32, ScalarFormat::Fixed2)
            .is_no_data());

        assert!(RegisterValue::text("x")
            .retyped(ScalarType::U32, ScalarFormat::Raw)
            .is_invalid());
    }

    #[test]
    fn test_names_parse_back() {
        for ty in NUMERIC_TYPES {
            assert_eq!(ty.as_str().parse::<ScalarType>().unwrap(), ty);
        }
        for fmt in ALL_FORMATS {
            assert_eq!(fmt.as_str().parse::<ScalarFormat>().unwrap(), fmt);
        }
        assert!("F32".parse::<ScalarType>().is_err());
        assert!("FIX9".parse::<ScalarFormat>().is_err());
    }
}
