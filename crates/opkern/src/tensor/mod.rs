//! Core tensor abstractions shared by the framework and execution providers.
//!
//! The tensor module defines shapes with symbolic-dimension support, scalar
//! dtypes, the element trait mapping Rust scalars onto dtypes, and the dense
//! byte-buffer tensor kernels read and write through typed views.

pub mod dtype;
pub mod element;
pub mod shape;
#[allow(clippy::module_inception)]
pub mod tensor;

pub use dtype::DType;
pub use element::TensorElement;
pub use shape::TensorShape;
pub use tensor::{aligned_byte_buffer, Tensor};
