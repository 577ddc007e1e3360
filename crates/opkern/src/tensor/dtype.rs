//! Enumerates the scalar element types a tensor payload may carry.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between tensors, kernel type constraints,
/// and graph argument declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point.
    F64,
    /// 16-bit floating point with full mantissa (fp16). Storage only.
    F16,
    /// 16-bit bfloat16 precision as used by many accelerators. Storage only.
    BF16,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer, the canonical index type.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// Boolean stored as one byte per element.
    Bool,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F64 | DType::I64 | DType::U64 => 8,
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F16 | DType::BF16 | DType::I16 | DType::U16 => 2,
            DType::I8 | DType::U8 | DType::Bool => 1,
        }
    }

    /// Reports whether the dtype is a floating-point family member.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64 | DType::F16 | DType::BF16)
    }

    /// Reports whether the dtype is a signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::I8
                | DType::I16
                | DType::I32
                | DType::I64
                | DType::U8
                | DType::U16
                | DType::U32
                | DType::U64
        )
    }

    /// Produces a stable tag used when serializing kernel definitions.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F64 => 1,
            DType::F16 => 2,
            DType::BF16 => 3,
            DType::I8 => 4,
            DType::I16 => 5,
            DType::I32 => 6,
            DType::I64 => 7,
            DType::U8 => 8,
            DType::U16 => 9,
            DType::U32 => 10,
            DType::U64 => 11,
            DType::Bool => 12,
        }
    }

    /// Reconstructs a `DType` from its serialized tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::F64),
            2 => Some(DType::F16),
            3 => Some(DType::BF16),
            4 => Some(DType::I8),
            5 => Some(DType::I16),
            6 => Some(DType::I32),
            7 => Some(DType::I64),
            8 => Some(DType::U8),
            9 => Some(DType::U16),
            10 => Some(DType::U32),
            11 => Some(DType::U64),
            12 => Some(DType::Bool),
            _ => None,
        }
    }
}
