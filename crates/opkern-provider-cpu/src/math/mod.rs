//! Arithmetic and selection kernels.

pub mod clip;
pub mod sum;
pub mod topk;
