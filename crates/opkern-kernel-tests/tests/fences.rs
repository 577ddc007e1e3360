//! Cross-queue ordering through fenced values, end to end: an asynchronous
//! stream kernel produces behind a fence, and a CPU-side reader must not
//! observe the output until the worker signals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use opkern::error::ExecError;
use opkern::framework::allocator::AllocatorRegistry;
use opkern::framework::kernel_def::KernelDefBuilder;
use opkern::framework::registry::KernelRegistry;
use opkern::framework::{ExecutionFrame, OpKernelContext, OpKernelInfo, QueueId, Value};
use opkern::graph::Node;
use opkern::tensor::{DType, Tensor};
use opkern_kernel_tests::stream::{
    register_stream_kernels, StreamQueue, StreamTensor, STREAM_PROVIDER,
};
use opkern_provider_cpu::{cpu_allocator_registry, register_cpu_kernels, CPU_PROVIDER};

const CPU_QUEUE: QueueId = QueueId::new(CPU_PROVIDER, 0);

fn scale_node() -> Node {
    Node::builder("AsyncScale")
        .since_version(1)
        .attr("scale", 3.0f32)
        .input("x", DType::F32)
        .output("y", DType::F32)
        .build()
        .unwrap()
}

// A consumer-side pseudo-node: constructing its context performs the fence
// wait a real downstream kernel would.
fn probe_info(allocators: &Arc<AllocatorRegistry>) -> OpKernelInfo {
    let node = Node::builder("Probe").input("y", DType::F32).build().unwrap();
    let def = KernelDefBuilder::new("Probe")
        .provider(CPU_PROVIDER)
        .build()
        .unwrap();
    OpKernelInfo::new(Arc::new(node), Arc::new(def), Arc::clone(allocators))
}

#[test]
fn cpu_reader_waits_for_the_stream_result() -> Result<()> {
    let queue = StreamQueue::new(0);
    // Park the worker so the fence cannot signal until we say so.
    let (release, gate) = mpsc::channel::<()>();
    queue.enqueue(move || {
        let _ = gate.recv();
    });

    let mut registry = KernelRegistry::new();
    register_stream_kernels(&mut registry, Arc::clone(&queue))?;

    let node = Arc::new(scale_node());
    let allocators = Arc::new(cpu_allocator_registry()?);
    let probe = probe_info(&allocators);
    let frame = ExecutionFrame::new([node.as_ref(), probe.node()], Arc::clone(&allocators));
    frame.feed("x", Value::new(Tensor::from_vec([3], vec![1.0f32, 2.0, 3.0])?))?;

    let kernel = registry.create_kernel(&node, STREAM_PROVIDER, &allocators)?;
    let done_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done_calls);
    let mut ctx = OpKernelContext::new(&frame, kernel.info(), queue.id())?;
    kernel.compute_async(
        &mut ctx,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;
    ctx.finalize()?;

    // The launch completed even though the worker has not run: the output
    // is committed, fenced, and incomplete.
    assert_eq!(done_calls.load(Ordering::SeqCst), 1);
    let slot = frame.slot_index("y").unwrap();
    assert!(!frame.fence(slot).unwrap().is_complete());

    let (result_tx, result_rx) = mpsc::channel();
    thread::scope(|scope| {
        let frame = &frame;
        let probe = &probe;
        scope.spawn(move || {
            let ctx = OpKernelContext::new(frame, probe, CPU_QUEUE).unwrap();
            let data = ctx.input::<StreamTensor>(0).unwrap().read();
            result_tx.send(data).unwrap();
        });

        // While the worker is parked the reader must stay parked too.
        assert!(result_rx.recv_timeout(Duration::from_millis(50)).is_err());
        release.send(()).unwrap();

        let data = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(data, vec![3.0, 6.0, 9.0]);
    });

    assert!(frame.fence(slot).unwrap().is_complete());
    assert_eq!(done_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn producer_queue_reader_skips_the_fence_wait() -> Result<()> {
    let queue = StreamQueue::new(1);
    let (release, gate) = mpsc::channel::<()>();
    queue.enqueue(move || {
        let _ = gate.recv();
    });

    let mut registry = KernelRegistry::new();
    register_stream_kernels(&mut registry, Arc::clone(&queue))?;

    let node = Arc::new(scale_node());
    let allocators = Arc::new(cpu_allocator_registry()?);
    let probe = probe_info(&allocators);
    let frame = ExecutionFrame::new([node.as_ref(), probe.node()], Arc::clone(&allocators));
    frame.feed("x", Value::new(Tensor::from_vec([1], vec![2.0f32])?))?;

    let kernel = registry.create_kernel(&node, STREAM_PROVIDER, &allocators)?;
    let mut ctx = OpKernelContext::new(&frame, kernel.info(), queue.id())?;
    kernel.compute_async(&mut ctx, Box::new(|| {}))?;
    ctx.finalize()?;

    // A reader on the producing queue trusts queue order: construction
    // returns even though the fence is unsignaled and the worker is parked.
    let ctx = OpKernelContext::new(&frame, &probe, queue.id())?;
    assert!(ctx.input::<StreamTensor>(0).is_some());
    drop(ctx);

    release.send(()).unwrap();
    Ok(())
}

#[test]
fn async_kernel_rejects_the_sync_path() -> Result<()> {
    let queue = StreamQueue::new(2);
    let mut registry = KernelRegistry::new();
    register_stream_kernels(&mut registry, Arc::clone(&queue))?;

    let node = Arc::new(scale_node());
    let allocators = Arc::new(cpu_allocator_registry()?);
    let frame = ExecutionFrame::new([node.as_ref()], Arc::clone(&allocators));
    frame.feed("x", Value::new(Tensor::from_vec([1], vec![1.0f32])?))?;

    let kernel = registry.create_kernel(&node, STREAM_PROVIDER, &allocators)?;
    let mut ctx = OpKernelContext::new(&frame, kernel.info(), queue.id())?;
    let err = kernel.compute(&mut ctx).unwrap_err();
    assert!(matches!(err, ExecError::Unsupported { .. }));
    Ok(())
}

#[test]
#[should_panic(expected = "does not implement asynchronous compute")]
fn sync_kernel_rejects_the_async_path() {
    let mut registry = KernelRegistry::new();
    register_cpu_kernels(&mut registry).unwrap();

    let node = Arc::new(
        Node::builder("TopK")
            .attr("k", 1i64)
            .input("x", DType::F32)
            .output("values", DType::F32)
            .output("indices", DType::I64)
            .build()
            .unwrap(),
    );
    let allocators = Arc::new(cpu_allocator_registry().unwrap());
    let frame = ExecutionFrame::new([node.as_ref()], Arc::clone(&allocators));
    frame
        .feed("x", Value::new(Tensor::from_vec([2], vec![1.0f32, 2.0]).unwrap()))
        .unwrap();

    let kernel = registry
        .create_kernel(&node, CPU_PROVIDER, &allocators)
        .unwrap();
    let mut ctx = OpKernelContext::new(&frame, kernel.info(), CPU_QUEUE).unwrap();
    let _ = kernel.compute_async(&mut ctx, Box::new(|| {}));
}
