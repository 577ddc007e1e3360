//! Image preprocessing kernels.

pub mod image_scaler;
