//! Asynchronous "stream" test provider.
//!
//! Models a device-like provider whose kernels return before their results
//! exist: `compute_async` enqueues the real work on a worker thread, fences
//! the output, and reports launch completion through the done callback.
//! Readers on other queues must go through the fence.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use opkern::error::{ExecError, ExecResult};
use opkern::framework::kernel_def::{ArgSelector, KernelDefBuilder};
use opkern::framework::registry::{KernelCreateInfo, KernelRegistry};
use opkern::framework::{
    DoneCallback, Fence, OpKernel, OpKernelContext, OpKernelInfo, QueueFence, QueueId,
};
use opkern::tensor::{DType, Tensor};

/// Provider name the stream kernels register under.
pub const STREAM_PROVIDER: &str = "stream";

type Job = Box<dyn FnOnce() + Send>;

/// One in-order worker thread standing in for a device stream.
pub struct StreamQueue {
    id: QueueId,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamQueue {
    pub fn new(index: u32) -> Arc<Self> {
        let id = QueueId::new(STREAM_PROVIDER, index);
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(format!("stream-{index}"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    trace!(queue = %id, "running enqueued job");
                    job();
                }
                debug!(queue = %id, "stream queue drained");
            })
            .expect("failed to spawn stream worker");
        Arc::new(StreamQueue {
            id,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    /// Appends a job; the worker runs jobs strictly in enqueue order.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let sender = self.sender.lock().unwrap();
        sender
            .as_ref()
            .expect("stream queue is shut down")
            .send(Box::new(job))
            .expect("stream worker is gone");
    }
}

impl Drop for StreamQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.lock().unwrap().take();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}

/// Output payload of a stream kernel: storage the worker fills in later.
///
/// Consumers must wait on the output's fence before reading the cell.
#[derive(Clone, Default)]
pub struct StreamTensor {
    data: Arc<Mutex<Vec<f32>>>,
}

impl StreamTensor {
    /// Reads the cell. Only meaningful after the guarding fence completed.
    pub fn read(&self) -> Vec<f32> {
        self.data.lock().unwrap().clone()
    }
}

/// Registers the stream kernels bound to `queue` into `registry`.
pub fn register_stream_kernels(
    registry: &mut KernelRegistry,
    queue: Arc<StreamQueue>,
) -> ExecResult<()> {
    registry.register(async_scale_create_info(queue)?)?;
    Ok(())
}

/// Registration for `AsyncScale` on the stream provider.
pub fn async_scale_create_info(queue: Arc<StreamQueue>) -> ExecResult<KernelCreateInfo> {
    let def = KernelDefBuilder::new("AsyncScale")
        .provider(STREAM_PROVIDER)
        .since_version(1)
        .type_constraint("T", [ArgSelector::Input(0)], [DType::F32])
        .build()?;
    Ok(KernelCreateInfo::new(
        def,
        Box::new(move |info| {
            let kernel: Box<dyn OpKernel> = Box::new(AsyncScale::new(info, Arc::clone(&queue))?);
            Ok(kernel)
        }),
    ))
}

/// Multiplies its input by `scale` on the stream worker.
///
/// `compute_async` registers a fenced [`StreamTensor`] output, enqueues the
/// multiply, and signals launch completion through the done callback before
/// the result exists.
pub struct AsyncScale {
    info: OpKernelInfo,
    scale: f32,
    queue: Arc<StreamQueue>,
}

impl AsyncScale {
    pub fn new(info: OpKernelInfo, queue: Arc<StreamQueue>) -> ExecResult<Self> {
        let scale = info.attr_or("scale", 1.0f32)?;
        Ok(AsyncScale { info, scale, queue })
    }
}

impl OpKernel for AsyncScale {
    fn info(&self) -> &OpKernelInfo {
        &self.info
    }

    fn compute(&self, _ctx: &mut OpKernelContext<'_>) -> ExecResult<()> {
        Err(ExecError::unsupported(
            "AsyncScale",
            "only the asynchronous compute path is implemented",
        ))
    }

    fn compute_async(&self, ctx: &mut OpKernelContext<'_>, done: DoneCallback) -> ExecResult<()> {
        let x_value = ctx
            .input_value(0)
            .ok_or_else(|| ExecError::invalid_argument("AsyncScale", "input X is required"))?;
        let fence = Arc::new(QueueFence::new(self.queue.id()));

        let cell = {
            let out = ctx.output::<StreamTensor>(0).ok_or_else(|| {
                ExecError::invalid_argument("AsyncScale", "output Y is required")
            })?;
            Arc::clone(&out.data)
        };
        ctx.set_output_fence(0, Arc::clone(&fence) as Arc<dyn Fence>);

        let scale = self.scale;
        self.queue.enqueue(move || {
            let x = x_value.get::<Tensor>();
            let scaled: Vec<f32> = x.data::<f32>().iter().map(|v| v * scale).collect();
            *cell.lock().unwrap() = scaled;
            fence.signal();
        });

        // Launch is complete: the output is registered and fenced, even
        // though its bytes are still pending.
        done();
        Ok(())
    }
}
