//! Per-invocation façade a kernel reads inputs from and writes outputs to.

use std::fmt;
use std::sync::Arc;

use tracing::{debug_span, trace, Span};

use crate::error::{ExecError, ExecResult};
use crate::tensor::{Tensor, TensorShape};

use super::allocator::{Allocator, MemType};
use super::data_types::ValueTypeId;
use super::fence::{Fence, QueueId};
use super::frame::ExecutionFrame;
use super::op_kernel::OpKernelInfo;
use super::value::Value;

/// Execution context for one kernel invocation on one frame.
///
/// Construction binds the kernel's node to the frame: every present input is
/// resolved to its slot, synchronized against its producer fence for the
/// invocation's queue, and snapshotted as a shared handle. Outputs
/// accumulate inside the context and reach the frame atomically when
/// [`OpKernelContext::finalize`] commits them, so a kernel never observes
/// its own half-written outputs through the frame.
///
/// Logical argument indices are part of the kernel/framework contract:
/// asking for the wrong payload type panics, as does an out-of-range index
/// everywhere except the generic output accessor, which folds it into its
/// `None` case. Omitted optional arguments simply read as `None`.
pub struct OpKernelContext<'a> {
    frame: &'a ExecutionFrame,
    info: &'a OpKernelInfo,
    queue: QueueId,
    inputs: Vec<Option<Value>>,
    pending_outputs: Vec<Option<Value>>,
    output_fences: Vec<Option<Arc<dyn Fence>>>,
    span: Span,
}

impl<'a> OpKernelContext<'a> {
    /// Binds `info`'s node to `frame` for an invocation on `queue`.
    ///
    /// Blocks on input fences produced by other queues. Fails when a present
    /// input has not been produced yet, which means the caller scheduled the
    /// node before its producers.
    pub fn new(
        frame: &'a ExecutionFrame,
        info: &'a OpKernelInfo,
        queue: QueueId,
    ) -> ExecResult<Self> {
        let node = info.node();
        let span = debug_span!("kernel", op = %node.op_type(), node = %node.name());

        let mut inputs = Vec::with_capacity(node.inputs().len());
        for arg in node.inputs() {
            if !arg.exists() {
                inputs.push(None);
                continue;
            }
            let slot = frame.slot_index(arg.name()).ok_or_else(|| {
                ExecError::execution(format!(
                    "input {} of node {} is not bound to the frame",
                    arg.name(),
                    node.name()
                ))
            })?;
            let value = frame.value(slot).ok_or_else(|| {
                ExecError::execution(format!(
                    "input {} of node {} has not been produced",
                    arg.name(),
                    node.name()
                ))
            })?;
            if let Some(fence) = value.fence() {
                let _guard = span.enter();
                trace!(input = arg.name(), queue = %queue, "waiting on producer fence");
                fence.before_read(queue);
            }
            inputs.push(Some(value));
        }

        let output_count = node.outputs().len();
        Ok(OpKernelContext {
            frame,
            info,
            queue,
            inputs,
            pending_outputs: vec![None; output_count],
            output_fences: (0..output_count).map(|_| None).collect(),
            span,
        })
    }

    /// Number of declared input positions, omitted optionals included.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of declared output positions, omitted optionals included.
    pub fn output_count(&self) -> usize {
        self.pending_outputs.len()
    }

    /// The queue this invocation runs on.
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// The per-invocation span; enter it while the kernel body runs.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Borrows input `index` as a `T`.
    ///
    /// `None` means the node omits that optional input. The borrow remains
    /// valid for the context's whole lifetime regardless of later output
    /// activity.
    pub fn input<T: 'static>(&self, index: usize) -> Option<&T> {
        if index >= self.inputs.len() {
            panic!(
                "input index {index} out of range for {} with {} inputs",
                self.info.node().op_type(),
                self.inputs.len()
            );
        }
        self.inputs[index].as_ref().map(|value| value.get::<T>())
    }

    /// Returns a shared handle to input `index`.
    ///
    /// The handle keeps the payload alive independently of the context, so
    /// asynchronous kernels can move it into enqueued work.
    pub fn input_value(&self, index: usize) -> Option<Value> {
        if index >= self.inputs.len() {
            panic!(
                "input index {index} out of range for {} with {} inputs",
                self.info.node().op_type(),
                self.inputs.len()
            );
        }
        self.inputs[index].clone()
    }

    /// The fence guarding input `index`, when its producer attached one.
    pub fn input_fence(&self, index: usize) -> Option<&Arc<dyn Fence>> {
        if index >= self.inputs.len() {
            panic!(
                "input index {index} out of range for {} with {} inputs",
                self.info.node().op_type(),
                self.inputs.len()
            );
        }
        self.inputs[index].as_ref().and_then(|value| value.fence())
    }

    /// The fence that will guard output `index` once committed.
    pub fn output_fence(&self, index: usize) -> Option<&Arc<dyn Fence>> {
        if index >= self.output_fences.len() {
            panic!(
                "output index {index} out of range for {} with {} outputs",
                self.info.node().op_type(),
                self.output_fences.len()
            );
        }
        self.output_fences[index].as_ref()
    }

    /// Attaches the fence that will guard output `index`.
    pub fn set_output_fence(&mut self, index: usize, fence: Arc<dyn Fence>) {
        if index >= self.output_fences.len() {
            panic!(
                "output index {index} out of range for {} with {} outputs",
                self.info.node().op_type(),
                self.output_fences.len()
            );
        }
        self.output_fences[index] = Some(fence);
    }

    /// Run length of the variadic argument group at declared position
    /// `arg_num`.
    pub fn num_variadic_inputs(&self, arg_num: usize) -> usize {
        let counts = self.info.node().input_arg_count();
        if arg_num >= counts.len() {
            panic!(
                "argument position {arg_num} out of range for {} with {} declared arguments",
                self.info.node().op_type(),
                counts.len()
            );
        }
        counts[arg_num]
    }

    /// Mutably borrows non-tensor output `index`, default-constructing it on
    /// first access.
    ///
    /// `None` means the index is out of range or the node omits that
    /// optional output. Tensor outputs cannot take this path because their
    /// shape must be stated explicitly; use
    /// [`OpKernelContext::output_tensor`].
    pub fn output<T: Default + Send + Sync + 'static>(&mut self, index: usize) -> Option<&mut T> {
        let node = self.info.node();
        if index >= self.pending_outputs.len() {
            return None;
        }
        if ValueTypeId::of::<T>().is::<Tensor>() {
            panic!("tensor outputs require an explicit shape; fetch them with output_tensor");
        }
        if !node.outputs()[index].exists() {
            return None;
        }
        let slotted = &mut self.pending_outputs[index];
        if slotted.is_none() {
            *slotted = Some(Value::new(T::default()));
        }
        slotted.as_mut().map(|value| value.expect_mut::<T>())
    }

    /// Mutably borrows tensor output `index`, allocating it with `shape`.
    ///
    /// `Ok(None)` only ever means the node omits that optional output;
    /// allocation failures surface as errors. A repeated call with the same
    /// shape hands back the same tensor; a different shape discards the
    /// previous allocation, and the shape of the last call governs what
    /// [`OpKernelContext::finalize`] commits.
    pub fn output_tensor(
        &mut self,
        index: usize,
        shape: &TensorShape,
    ) -> ExecResult<Option<&mut Tensor>> {
        let node = self.info.node();
        if index >= self.pending_outputs.len() {
            panic!(
                "output index {index} out of range for {} with {} outputs",
                node.op_type(),
                self.pending_outputs.len()
            );
        }
        let arg = &node.outputs()[index];
        if !arg.exists() {
            return Ok(None);
        }
        let slot = self.frame.slot_index(arg.name()).ok_or_else(|| {
            ExecError::execution(format!(
                "output {} of node {} is not bound to the frame",
                arg.name(),
                node.name()
            ))
        })?;

        if let Some(existing) = self.pending_outputs[index].take() {
            if existing.get::<Tensor>().shape() == shape {
                self.pending_outputs[index] = Some(existing);
            } else if let Some(tensor) = existing.into_payload::<Tensor>() {
                self.frame.reclaim_buffer(slot, tensor.into_bytes());
            }
        }

        if self.pending_outputs[index].is_none() {
            let dtype = arg.dtype().ok_or_else(|| {
                ExecError::invalid_argument(
                    node.op_type(),
                    format!("output {} carries no resolved dtype", arg.name()),
                )
            })?;
            let def = self.info.kernel_def();
            let tensor = self.frame.allocate_tensor(
                slot,
                dtype,
                shape,
                def.provider(),
                def.output_mem_type(index),
            )?;
            self.pending_outputs[index] = Some(Value::new(tensor));
        }

        Ok(self.pending_outputs[index]
            .as_mut()
            .map(|value| value.expect_mut::<Tensor>()))
    }

    /// Scratch-space allocator of the kernel's provider.
    pub fn temp_space_allocator(&self) -> ExecResult<Arc<dyn Allocator>> {
        self.info.allocator(MemType::Default)
    }

    /// Commits every pending output to the frame, consuming the context.
    ///
    /// Fences set through [`OpKernelContext::set_output_fence`] ride on the
    /// committed values. Output positions the kernel never touched stay
    /// unproduced.
    pub fn finalize(mut self) -> ExecResult<()> {
        let node = self.info.node();
        for index in 0..self.pending_outputs.len() {
            let Some(mut value) = self.pending_outputs[index].take() else {
                continue;
            };
            if let Some(fence) = self.output_fences[index].take() {
                value.set_fence(fence);
            }
            let arg = &node.outputs()[index];
            let slot = self.frame.slot_index(arg.name()).ok_or_else(|| {
                ExecError::execution(format!(
                    "output {} of node {} is not bound to the frame",
                    arg.name(),
                    node.name()
                ))
            })?;
            self.frame.set_value(slot, value);
        }
        Ok(())
    }
}

impl fmt::Debug for OpKernelContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpKernelContext")
            .field("op", &self.info.node().op_type())
            .field("node", &self.info.node().name())
            .field("queue", &self.queue)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.pending_outputs.len())
            .finish()
    }
}
