//! Cross-queue synchronization for values produced by asynchronous kernels.
//!
//! A fence rides on the value it guards. Kernels that enqueue work on a
//! device queue attach a fence to each output and signal it when the device
//! reaches the producing operation; downstream readers on other queues block
//! in `before_read` until then. Readers on the producer's own queue skip the
//! wait because in-order queues already serialize them behind the producer.

use std::fmt;
use std::sync::{Condvar, Mutex};

use crate::env;

/// Identifies one in-order device queue (stream) of an execution provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId {
    pub provider: &'static str,
    pub index: u32,
}

impl QueueId {
    pub const fn new(provider: &'static str, index: u32) -> Self {
        QueueId { provider, index }
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.index)
    }
}

/// Completion handle attached to a value by its producing kernel.
///
/// Signaling is sticky: once complete, a fence stays complete, waits return
/// immediately, and waiting never consumes the signal, so any number of
/// readers may synchronize against the same fence.
pub trait Fence: Send + Sync {
    /// The queue the producing operation was submitted on.
    fn producer_queue(&self) -> QueueId;

    /// Blocks until the producing operation has completed.
    ///
    /// Returns immediately when `reader` is the producer's own queue.
    fn before_read(&self, reader: QueueId);

    /// Non-blocking completion probe.
    fn is_complete(&self) -> bool;
}

/// Stock host-side fence backed by a condition variable.
///
/// Providers with driver-level completion objects implement [`Fence`] over
/// those instead; this implementation serves host queues and tests.
pub struct QueueFence {
    queue: QueueId,
    done: Mutex<bool>,
    cond: Condvar,
}

impl QueueFence {
    pub fn new(queue: QueueId) -> Self {
        QueueFence {
            queue,
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Marks the producing operation complete and wakes every waiter.
    ///
    /// Signaling an already-complete fence is a no-op.
    pub fn signal(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cond.notify_all();
    }
}

impl Fence for QueueFence {
    fn producer_queue(&self) -> QueueId {
        self.queue
    }

    fn before_read(&self, reader: QueueId) {
        if reader == self.queue {
            return;
        }
        let deadline = env::fence_wait_deadline();
        let mut done = self.done.lock().unwrap();
        while !*done {
            match deadline {
                Some(limit) => {
                    let (guard, result) = self.cond.wait_timeout(done, limit).unwrap();
                    done = guard;
                    if result.timed_out() && !*done {
                        panic!(
                            "fence produced on queue {} still incomplete after {:?}",
                            self.queue, limit
                        );
                    }
                }
                None => done = self.cond.wait(done).unwrap(),
            }
        }
    }

    fn is_complete(&self) -> bool {
        *self.done.lock().unwrap()
    }
}

impl fmt::Debug for QueueFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFence")
            .field("queue", &self.queue)
            .field("complete", &self.is_complete())
            .finish()
    }
}
