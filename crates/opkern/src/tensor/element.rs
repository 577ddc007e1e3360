//! Maps plain Rust scalar types onto their tensor element dtype.

use super::dtype::DType;

/// Trait implemented by scalar types that can live inside a tensor payload.
///
/// Implementations pin down the matching [`DType`] so typed accessors can
/// verify the payload before reinterpreting bytes. Only plain-old-data types
/// with a stable layout implement this.
pub trait TensorElement: Copy + Default + Send + Sync + 'static {
    /// The dtype tag stored alongside payloads of this element type.
    const DTYPE: DType;
}

macro_rules! impl_tensor_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl TensorElement for $ty {
                const DTYPE: DType = $dtype;
            }
        )*
    };
}

impl_tensor_element! {
    f32 => DType::F32,
    f64 => DType::F64,
    i8 => DType::I8,
    i16 => DType::I16,
    i32 => DType::I32,
    i64 => DType::I64,
    u8 => DType::U8,
    u16 => DType::U16,
    u32 => DType::U32,
    u64 => DType::U64,
}

impl TensorElement for bool {
    const DTYPE: DType = DType::Bool;
}
