//! Sampled value types and post-read bit transforms

use super::error::{EngineResult, ReadError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width numeric kinds a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Size in bytes of one value of this type.
    pub const fn size(&self) -> usize {
        match self {
            ValueType::U8 | ValueType::I8 => 1,
            ValueType::U16 | ValueType::I16 => 2,
            ValueType::U32 | ValueType::I32 | ValueType::F32 => 4,
            ValueType::U64 | ValueType::I64 | ValueType::F64 => 8,
        }
    }

    pub const fn is_integer(&self) -> bool {
        !matches!(self, ValueType::F32 | ValueType::F64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A read value widened to a 64-bit-safe representation.
///
/// Narrow integers widen into `U64`/`I64` by sign class, floats into `F64`;
/// downstream consumers never deal with the original width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SampleValue {
    U64(u64),
    I64(i64),
    F64(f64),
}

impl SampleValue {
    /// Decodes `bytes` (little-endian, exactly `value_type.size()` long)
    /// into a widened value.
    pub fn decode(bytes: &[u8], value_type: ValueType) -> EngineResult<Self> {
        if bytes.len() != value_type.size() {
            return Err(ReadError::UnsupportedType(format!(
                "{} expects {} bytes, got {}",
                value_type,
                value_type.size(),
                bytes.len()
            )));
        }

        let value = match value_type {
            ValueType::U8 => SampleValue::U64(bytes[0] as u64),
            ValueType::U16 => SampleValue::U64(u16::from_le_bytes([bytes[0], bytes[1]]) as u64),
            ValueType::U32 => {
                SampleValue::U64(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
            }
            ValueType::U64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                SampleValue::U64(u64::from_le_bytes(buf))
            }
            ValueType::I8 => SampleValue::I64(bytes[0] as i8 as i64),
            ValueType::I16 => SampleValue::I64(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            ValueType::I32 => {
                SampleValue::I64(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
            }
            ValueType::I64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                SampleValue::I64(i64::from_le_bytes(buf))
            }
            ValueType::F32 => {
                SampleValue::F64(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
            }
            ValueType::F64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                SampleValue::F64(f64::from_le_bytes(buf))
            }
        };
        Ok(value)
    }

    /// The value's bit pattern as unsigned 64-bit, for mask arithmetic.
    /// Returns `None` for floats, which have no meaningful mask domain here.
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            SampleValue::U64(v) => Some(*v),
            SampleValue::I64(v) => Some(*v as u64),
            SampleValue::F64(_) => None,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::U64(v) => write!(f, "{v}"),
            SampleValue::I64(v) => write!(f, "{v}"),
            SampleValue::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Bitwise operation applied to a raw read value with the request's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
    /// Complements the value; the mask is ignored.
    Not,
}

impl BitwiseOp {
    pub const fn apply(&self, value: u64, mask: u64) -> u64 {
        match self {
            BitwiseOp::And => value & mask,
            BitwiseOp::Or => value | mask,
            BitwiseOp::Xor => value ^ mask,
            BitwiseOp::Not => !value,
        }
    }
}

/// Extracts the field selected by `mask` out of `value`: masks, then shifts
/// right by the index of the mask's lowest set bit. A zero mask yields zero.
pub const fn extract_bitfield(value: u64, mask: u64) -> u64 {
    if mask == 0 {
        return 0;
    }
    (value & mask) >> mask.trailing_zeros()
}
