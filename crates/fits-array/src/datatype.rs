//! Declared element types for data entities.
//!
//! Buffers are held in memory as `f64` (or `bool`/`u32` for the mask types);
//! the [`DataType`] records the semantic element type, drives the BITPIX
//! mapping on the save path, and constrains which types a bitmask may be
//! built from or exported as.

use std::fmt;

use crate::error::{Error, Result};

/// Semantic element type of an entity's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Byte width of one element.
    pub fn bytes(self) -> usize {
        match self {
            DataType::Bool | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Bit width of one element.
    pub fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64 | DataType::Bool)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// The BITPIX value used when writing this type to a FITS data segment.
    ///
    /// Only types with a direct FITS representation are accepted; the rest
    /// fail with a `Config` error.
    pub fn bitpix(self) -> Result<i64> {
        match self {
            DataType::UInt8 => Ok(8),
            DataType::Int16 => Ok(16),
            DataType::Int32 => Ok(32),
            DataType::Float32 => Ok(-32),
            DataType::Float64 => Ok(-64),
            other => Err(Error::Config(format!(
                "datatype {other} cannot be written to a FITS data segment"
            ))),
        }
    }

    /// The declared type corresponding to a BITPIX value read from a file.
    pub fn from_bitpix(bitpix: i64) -> Option<DataType> {
        match bitpix {
            8 => Some(DataType::UInt8),
            16 => Some(DataType::Int16),
            32 => Some(DataType::Int32),
            -32 => Some(DataType::Float32),
            -64 => Some(DataType::Float64),
            _ => None,
        }
    }

    /// Coerce a value to this type's representable range, the way an
    /// explicit array cast would.
    ///
    /// Integer targets truncate toward zero and saturate at the type bounds;
    /// non-finite values collapse to 0. `Bool` maps any nonzero value
    /// (including NaN) to 1.
    pub fn coerce(self, v: f64) -> f64 {
        match self {
            DataType::Bool => {
                if v != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            DataType::UInt8 => clamp_int(v, 0.0, u8::MAX as f64),
            DataType::Int16 => clamp_int(v, i16::MIN as f64, i16::MAX as f64),
            DataType::UInt16 => clamp_int(v, 0.0, u16::MAX as f64),
            DataType::Int32 => clamp_int(v, i32::MIN as f64, i32::MAX as f64),
            DataType::UInt32 => clamp_int(v, 0.0, u32::MAX as f64),
            DataType::Int64 => clamp_int(v, i64::MIN as f64, i64::MAX as f64),
            DataType::Float32 => v as f32 as f64,
            DataType::Float64 => v,
        }
    }

    /// Whether a bitmask may be constructed with this declared type
    /// (boolean or an integer of at most 32 bits).
    pub fn mask_import_ok(self) -> bool {
        match self {
            DataType::Bool => true,
            t => t.is_integer() && t.bits() <= 32,
        }
    }

    /// Whether mask data may be exported to a file as this type.
    pub fn mask_export_ok(self) -> bool {
        matches!(self, DataType::UInt8 | DataType::Int16 | DataType::Int32)
    }
}

fn clamp_int(v: f64, lo: f64, hi: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    v.trunc().clamp(lo, hi)
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        };
        f.write_str(name)
    }
}
