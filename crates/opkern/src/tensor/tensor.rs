//! Dense tensor payload carried inside type-erased values.

use std::mem::{align_of, size_of, ManuallyDrop};

use crate::error::{ExecError, ExecResult};
use crate::framework::allocator::{Allocator, AllocatorInfo, MemType, CPU_PROVIDER};

use super::dtype::DType;
use super::element::TensorElement;
use super::shape::TensorShape;

/// Location reported for tensors materialized directly from host literals.
const HOST_LITERAL: AllocatorInfo = AllocatorInfo::new("literal", CPU_PROVIDER, MemType::Default);

/// Dense n-dimensional payload: a dtype, a shape, and a flat byte buffer.
///
/// The dtype is fixed for the life of the tensor. Typed access reinterprets
/// the byte buffer and panics when the requested element type disagrees with
/// the stored dtype.
#[derive(Debug, Clone)]
pub struct Tensor {
    dtype: DType,
    shape: TensorShape,
    data: Vec<u8>,
    location: AllocatorInfo,
}

impl Tensor {
    /// Allocates a zero-initialized tensor through the given allocator.
    ///
    /// The shape must be fully concrete; symbolic dimensions cannot be
    /// materialized.
    pub fn new(dtype: DType, shape: TensorShape, allocator: &dyn Allocator) -> ExecResult<Self> {
        let byte_len = concrete_byte_len(dtype, &shape)?;
        let data = allocator.allocate(byte_len)?;
        debug_assert!(data.len() >= byte_len);
        Ok(Tensor {
            dtype,
            shape,
            data,
            location: *allocator.info(),
        })
    }

    /// Builds a tensor over an owned host vector without copying.
    pub fn from_vec<T: TensorElement>(
        shape: impl Into<TensorShape>,
        values: Vec<T>,
    ) -> ExecResult<Self> {
        let shape = shape.into();
        let byte_len = concrete_byte_len(T::DTYPE, &shape)?;
        if values.len() * size_of::<T>() != byte_len {
            return Err(ExecError::invalid_argument(
                "tensor",
                format!(
                    "shape {} wants {} elements but {} were provided",
                    shape,
                    byte_len / T::DTYPE.size_in_bytes(),
                    values.len()
                ),
            ));
        }
        Ok(Tensor {
            dtype: T::DTYPE,
            shape,
            data: vec_into_bytes(values),
            location: HOST_LITERAL,
        })
    }

    /// Wraps an existing byte buffer, e.g. one reserved by an execution plan.
    ///
    /// The buffer must hold at least the bytes the shape implies; excess
    /// capacity is trimmed from the logical length and kept as slack.
    pub fn from_bytes(
        dtype: DType,
        shape: TensorShape,
        mut data: Vec<u8>,
        location: AllocatorInfo,
    ) -> ExecResult<Self> {
        let byte_len = concrete_byte_len(dtype, &shape)?;
        if data.len() < byte_len {
            return Err(ExecError::allocation(format!(
                "buffer of {} bytes is too small for shape {} of {:?} ({} bytes)",
                data.len(),
                shape,
                dtype,
                byte_len
            )));
        }
        data.truncate(byte_len);
        Ok(Tensor {
            dtype,
            shape,
            data,
            location,
        })
    }

    /// Provides access to the tensor shape.
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Returns the scalar dtype of the tensor payload.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Reports which allocator produced the payload and where it lives.
    pub fn location(&self) -> &AllocatorInfo {
        &self.location
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.shape.size() as usize
    }

    /// Reports whether the tensor contains zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the payload length in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Borrows the raw byte payload.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutably borrows the raw byte payload.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrows the typed data slice, panicking if the dtype differs.
    pub fn data<T: TensorElement>(&self) -> &[T] {
        if self.dtype != T::DTYPE {
            panic!(
                "tensor data is not stored as {:?} (payload dtype is {:?})",
                T::DTYPE,
                self.dtype
            );
        }
        bytes_as_slice(&self.data)
    }

    /// Mutably borrows the typed data slice, panicking if the dtype differs.
    pub fn data_mut<T: TensorElement>(&mut self) -> &mut [T] {
        if self.dtype != T::DTYPE {
            panic!(
                "tensor data is not stored as mutable {:?} (payload dtype is {:?})",
                T::DTYPE,
                self.dtype
            );
        }
        bytes_as_slice_mut(&mut self.data)
    }

    /// Consumes the tensor and returns its byte buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Rewrites the shape in place without touching the payload.
    ///
    /// The new shape must imply exactly the element count the tensor already
    /// holds.
    pub fn reshape(&mut self, new_shape: impl Into<TensorShape>) -> ExecResult<()> {
        let new_shape = new_shape.into();
        if !new_shape.is_concrete() || new_shape.size() != self.shape.size() {
            return Err(ExecError::invalid_argument(
                "tensor",
                format!(
                    "cannot reshape {} into {}: element counts differ",
                    self.shape, new_shape
                ),
            ));
        }
        self.shape = new_shape;
        Ok(())
    }
}

/// The empty `F32` tensor: shape `{0}` with no payload bytes.
impl Default for Tensor {
    fn default() -> Self {
        Tensor {
            dtype: DType::F32,
            shape: TensorShape::from([0]),
            data: Vec::new(),
            location: HOST_LITERAL,
        }
    }
}

fn concrete_byte_len(dtype: DType, shape: &TensorShape) -> ExecResult<usize> {
    if !shape.is_concrete() {
        return Err(ExecError::invalid_argument(
            "tensor",
            format!("shape {shape} has symbolic dimensions and cannot be materialized"),
        ));
    }
    Ok(shape.size() as usize * dtype.size_in_bytes())
}

/// Returns a zeroed byte buffer whose backing allocation is 8-aligned.
///
/// Allocators hand these out so typed views over any supported element
/// width stay within the buffer's alignment.
pub fn aligned_byte_buffer(byte_len: usize) -> Vec<u8> {
    let words = (byte_len + 7) / 8;
    let mut bytes = vec_into_bytes(vec![0u64; words]);
    bytes.truncate(byte_len);
    bytes
}

/// Converts an owned vector into a raw byte buffer without copying.
pub(crate) fn vec_into_bytes<T>(data: Vec<T>) -> Vec<u8> {
    let mut data = ManuallyDrop::new(data);
    let ptr = data.as_mut_ptr() as *mut u8;
    let len = data.len() * size_of::<T>();
    let cap = data.capacity() * size_of::<T>();
    unsafe { Vec::from_raw_parts(ptr, len, cap) }
}

/// Views a byte slice as a typed slice, asserting that the layout matches.
fn bytes_as_slice<T>(bytes: &[u8]) -> &[T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    assert_eq!(
        bytes.as_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size_of::<T>()) }
}

/// Views a mutable byte slice as a typed mutable slice, asserting the layout.
fn bytes_as_slice_mut<T>(bytes: &mut [u8]) -> &mut [T] {
    assert_eq!(
        bytes.len() % size_of::<T>(),
        0,
        "byte length {} is not a multiple of element size {}",
        bytes.len(),
        size_of::<T>()
    );
    assert_eq!(
        bytes.as_ptr() as usize % align_of::<T>(),
        0,
        "byte buffer is not aligned for the element type"
    );
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size_of::<T>())
    }
}
