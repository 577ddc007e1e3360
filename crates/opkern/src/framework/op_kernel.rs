//! Kernel contract implemented by operator implementations.

use std::fmt;
use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::graph::{AttrAccess, Node};

use super::allocator::{Allocator, AllocatorRegistry, MemType};
use super::context::OpKernelContext;
use super::kernel_def::KernelDef;

/// Completion callback handed to asynchronous kernels.
///
/// The kernel must invoke it exactly once, after its outputs are safe for
/// consumers to read. A kernel that attaches fences to every output may call
/// it as soon as the work is enqueued; consumers then synchronize through
/// the fences.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// Immutable bundle handed to a kernel constructor.
///
/// Carries the node being bound, the matched registration, and the allocator
/// registry of the session. Kernel instances keep it for the lifetime of the
/// binding and may be invoked concurrently against different frames.
#[derive(Debug, Clone)]
pub struct OpKernelInfo {
    node: Arc<Node>,
    kernel_def: Arc<KernelDef>,
    allocators: Arc<AllocatorRegistry>,
}

impl OpKernelInfo {
    pub fn new(
        node: Arc<Node>,
        kernel_def: Arc<KernelDef>,
        allocators: Arc<AllocatorRegistry>,
    ) -> Self {
        OpKernelInfo {
            node,
            kernel_def,
            allocators,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_arc(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn kernel_def(&self) -> &KernelDef {
        &self.kernel_def
    }

    pub fn kernel_def_arc(&self) -> &Arc<KernelDef> {
        &self.kernel_def
    }

    pub fn allocator_registry(&self) -> &Arc<AllocatorRegistry> {
        &self.allocators
    }

    /// Resolves an allocator of the kernel's provider for `mem_type`.
    pub fn allocator(&self, mem_type: MemType) -> ExecResult<Arc<dyn Allocator>> {
        self.allocators.get(self.kernel_def.provider(), mem_type)
    }

    /// Fetches a required attribute, converting it to `T`.
    pub fn attr<T: AttrAccess>(&self, name: &str) -> ExecResult<T> {
        match self.attr_opt::<T>(name)? {
            Some(value) => Ok(value),
            None => Err(ExecError::invalid_argument(
                self.node.op_type(),
                format!("missing required attribute {name}"),
            )),
        }
    }

    /// Fetches an optional attribute; `Ok(None)` when the node omits it.
    pub fn attr_opt<T: AttrAccess>(&self, name: &str) -> ExecResult<Option<T>> {
        match self.node.attr_raw(name) {
            None => Ok(None),
            Some(raw) => match T::from_attr(raw) {
                Some(value) => Ok(Some(value)),
                None => Err(ExecError::invalid_argument(
                    self.node.op_type(),
                    format!(
                        "attribute {name} holds {} but {} was requested",
                        raw.kind(),
                        T::KIND
                    ),
                )),
            },
        }
    }

    /// Fetches an optional attribute, falling back to `default`.
    pub fn attr_or<T: AttrAccess>(&self, name: &str, default: T) -> ExecResult<T> {
        Ok(self.attr_opt(name)?.unwrap_or(default))
    }
}

/// Trait implemented by every operator kernel.
///
/// One instance exists per (node, provider) binding. Instances are immutable
/// after construction and may serve concurrent `compute` calls on different
/// frames.
pub trait OpKernel: Send + Sync {
    /// The construction-time bundle the instance was built from.
    fn info(&self) -> &OpKernelInfo;

    /// Runs the operator synchronously; outputs are ready on return.
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> ExecResult<()>;

    /// Runs the operator asynchronously, invoking `done` once outputs are
    /// consumer-safe.
    ///
    /// Only genuinely asynchronous kernels override this. Scheduling an
    /// ordinary kernel through the asynchronous path is a scheduler bug, so
    /// the default panics rather than silently running synchronously.
    fn compute_async(&self, ctx: &mut OpKernelContext<'_>, done: DoneCallback) -> ExecResult<()> {
        let _ = (ctx, done);
        panic!(
            "{} kernel does not implement asynchronous compute",
            self.info().node().op_type()
        );
    }
}

impl fmt::Debug for dyn OpKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpKernel")
            .field("op", &self.info().node().op_type())
            .field("node", &self.info().node().name())
            .finish()
    }
}
