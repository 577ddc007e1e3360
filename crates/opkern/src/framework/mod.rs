//! Kernel execution framework: type-erased values, the kernel contract,
//! versioned registration, fences, and per-run frames.

pub mod allocator;
pub mod context;
pub mod data_types;
pub mod fence;
pub mod frame;
pub mod kernel_def;
pub mod op_kernel;
pub mod registry;
pub mod value;

pub use allocator::{Allocator, AllocatorInfo, AllocatorRegistry, MemType};
pub use context::OpKernelContext;
pub use data_types::ValueTypeId;
pub use fence::{Fence, QueueFence, QueueId};
pub use frame::ExecutionFrame;
pub use kernel_def::{ArgSelector, KernelDef, KernelDefBuilder};
pub use op_kernel::{DoneCallback, OpKernel, OpKernelInfo};
pub use registry::{KernelCreateInfo, KernelRegistry};
pub use value::Value;
