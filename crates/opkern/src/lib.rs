extern crate self as opkern;

pub use linkme;

pub mod error;
pub mod framework;
pub mod graph;
pub mod tensor;
mod env;

pub use error::{ExecError, ExecResult};
pub use framework::{
    DoneCallback, ExecutionFrame, Fence, OpKernel, OpKernelContext, OpKernelInfo, QueueFence,
    QueueId, Value,
};
pub use tensor::{DType, Tensor, TensorElement, TensorShape};
