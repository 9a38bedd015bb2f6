//! Serial run-queues.
//!
//! A [`RunQueue`] is a named serial execution lane multiplexed onto a
//! [`Dispatch`] backend. Work items enqueued from any thread execute in
//! strict FIFO order, one batch at a time, with at most one batch of a
//! given queue in flight at any moment. Different queues run their batches
//! concurrently; a single queue never does.
//!
//! # Lifecycle
//!
//! A queue starts life **active**. [`RunQueue::stop`] pauses dispatch
//! (items keep accumulating), [`RunQueue::start`] resumes it. Dropping or
//! [`RunQueue::release`]-ing the owning handle begins teardown: the queue
//! stops accepting new work but every item already enqueued still runs,
//! and the queue's storage is reclaimed once the final batch completes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use weft_runtime::{RunQueue, ThreadPool, WorkItem};
//!
//! let pool = Arc::new(ThreadPool::new());
//! let queue = RunQueue::new(pool);
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let c = Arc::clone(&counter);
//! queue.enqueue(WorkItem::new(move || {
//!     c.fetch_add(1, Ordering::SeqCst);
//! })).unwrap();
//! # while counter.load(Ordering::SeqCst) == 0 { std::thread::yield_now(); }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatch;
use crate::error::QueueError;

/// Maximum number of items one batch drains before re-examining
/// scheduling conditions. Bounds the latency other queues sharing the
/// same dispatcher can observe.
pub const BATCH_LIMIT: usize = 256;

/// One unit of work enqueued onto a run-queue.
///
/// The queue never interprets the item; it only invokes it. The closure
/// owns whatever context and payload the work needs.
pub struct WorkItem(Box<dyn FnOnce() + Send + 'static>);

impl WorkItem {
    /// Create a work item from an executor closure.
    pub fn new(exec: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(exec))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkItem")
    }
}

/// Mutable queue state, all behind one mutex.
struct QueueState {
    /// Pending work, in arrival order.
    fifo: VecDeque<WorkItem>,
    /// Whether dispatch is enabled (`start`/`stop`).
    active: bool,
    /// Whether a batch of this queue is currently in flight.
    busy: bool,
    /// Whether the owning handle has been released.
    releasing: bool,
}

/// Shared queue storage. Kept alive by the owning [`RunQueue`] handle and
/// by any in-flight batch runner; [`WeakQueue`] references do not extend
/// its lifetime.
struct QueueCore {
    name: String,
    dispatcher: Arc<dyn Dispatch>,
    state: Mutex<QueueState>,
}

impl QueueCore {
    fn enqueue(self: &Arc<Self>, item: WorkItem) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.releasing {
            warn!(queue = %self.name, "enqueue on released queue rejected");
            return Err(QueueError::Released);
        }
        state.fifo.push_back(item);
        if state.active && !state.busy {
            state.busy = true;
            drop(state);
            self.schedule_batch();
        }
        Ok(())
    }

    /// Hand one batch runner to the dispatcher. The runner holds a strong
    /// reference so the core outlives any batch still draining it.
    fn schedule_batch(self: &Arc<Self>) {
        trace!(queue = %self.name, "scheduling batch");
        let core = Arc::clone(self);
        self.dispatcher
            .submit(&self.name, Box::new(move || core.run_batch()));
    }

    fn run_batch(self: Arc<Self>) {
        let items: Vec<WorkItem> = {
            let mut state = self.state.lock();
            if !state.active && !state.releasing {
                // Stopped before the batch began draining; leave the FIFO
                // untouched until start() or release().
                state.busy = false;
                return;
            }
            let n = state.fifo.len().min(BATCH_LIMIT);
            state.fifo.drain(..n).collect()
        };

        // Items dequeued above run to completion even if the queue is
        // stopped or released while they execute. A panicking item must
        // not take down the worker or leave the queue marked busy.
        for item in items {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| item.run()));
            if result.is_err() {
                warn!(queue = %self.name, "work item panicked");
            }
        }

        let mut state = self.state.lock();
        state.busy = false;
        if (state.active || state.releasing) && !state.fifo.is_empty() {
            state.busy = true;
            drop(state);
            self.schedule_batch();
        }
    }
}

/// Owning handle to a serial run-queue.
///
/// There is exactly one owning handle per queue. Dropping it (or calling
/// [`RunQueue::release`]) begins teardown: pending items drain to
/// completion and the queue's storage is reclaimed when the final batch
/// reports back. Tasks and other long-lived referents hold a
/// [`WeakQueue`] obtained from [`RunQueue::downgrade`].
pub struct RunQueue {
    core: Arc<QueueCore>,
}

impl RunQueue {
    /// Create a new queue on `dispatcher`, in the active state with an
    /// empty FIFO.
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::with_name(dispatcher, format!("weft-queue-{n}"))
    }

    /// Create a new queue with an explicit name, used in diagnostics.
    pub fn with_name(dispatcher: Arc<dyn Dispatch>, name: impl Into<String>) -> Self {
        let core = Arc::new(QueueCore {
            name: name.into(),
            dispatcher,
            state: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                active: true,
                busy: false,
                releasing: false,
            }),
        });
        debug!(queue = %core.name, "queue created");
        Self { core }
    }

    /// The queue's diagnostic name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Append a work item. O(1); callable from any thread, including from
    /// inside an executing work item. An item enqueued by a running item
    /// is only seen by a later batch, never the current one.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        self.core.enqueue(item)
    }

    /// Resume dispatch after [`RunQueue::stop`]. Pending items are
    /// scheduled if no batch is currently in flight.
    pub fn start(&self) {
        let mut state = self.core.state.lock();
        if state.releasing || state.active {
            return;
        }
        state.active = true;
        debug!(queue = %self.core.name, "queue started");
        if !state.busy && !state.fifo.is_empty() {
            state.busy = true;
            drop(state);
            self.core.schedule_batch();
        }
    }

    /// Pause dispatch. Items already dequeued by an in-flight batch still
    /// run; items still in the FIFO remain until [`RunQueue::start`] or
    /// release.
    pub fn stop(&self) {
        let mut state = self.core.state.lock();
        if state.releasing {
            return;
        }
        state.active = false;
        debug!(queue = %self.core.name, "queue stopped");
    }

    /// Whether the queue currently dispatches work.
    pub fn is_active(&self) -> bool {
        let state = self.core.state.lock();
        state.active && !state.releasing
    }

    /// Number of items waiting in the FIFO.
    pub fn pending(&self) -> usize {
        self.core.state.lock().fifo.len()
    }

    /// Obtain a non-owning reference to this queue.
    pub fn downgrade(&self) -> WeakQueue {
        WeakQueue {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Release the queue. Equivalent to dropping the handle: no new work
    /// is accepted, pending items drain to completion, and storage is
    /// reclaimed after the final batch.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RunQueue {
    fn drop(&mut self) {
        let mut state = self.core.state.lock();
        state.releasing = true;
        debug!(queue = %self.core.name, pending = state.fifo.len(), "queue released");
        if !state.busy && !state.fifo.is_empty() {
            state.busy = true;
            drop(state);
            self.core.schedule_batch();
        }
    }
}

impl fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunQueue")
            .field("name", &self.core.name)
            .finish()
    }
}

/// Non-owning reference to a run-queue.
///
/// Held by task descriptors and other long-lived referents so a queue can
/// be released independently of them. Enqueuing through a `WeakQueue`
/// fails with [`QueueError::Released`] once the queue is gone.
#[derive(Clone)]
pub struct WeakQueue {
    core: Weak<QueueCore>,
}

impl WeakQueue {
    /// Append a work item if the queue is still alive and accepting work.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        match self.core.upgrade() {
            Some(core) => core.enqueue(item),
            None => Err(QueueError::Released),
        }
    }

    /// Whether the queue is still reachable (alive and not released).
    pub fn is_alive(&self) -> bool {
        match self.core.upgrade() {
            Some(core) => !core.state.lock().releasing,
            None => false,
        }
    }
}

impl fmt::Debug for WeakQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakQueue")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ThreadPool;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pool() -> Arc<ThreadPool> {
        Arc::new(ThreadPool::with_workers(2))
    }

    fn spin_wait(msec: u64, cond: impl Fn() -> bool) -> bool {
        let start = std::time::Instant::now();
        while !cond() {
            if start.elapsed() >= Duration::from_millis(msec) {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    #[test]
    fn test_enqueue_executes() {
        let queue = RunQueue::new(pool());
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        queue
            .enqueue(WorkItem::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_stop_buffers_items() {
        let queue = RunQueue::new(pool());
        let counter = Arc::new(AtomicUsize::new(0));

        queue.stop();
        assert!(!queue.is_active());

        for _ in 0..2 {
            let c = Arc::clone(&counter);
            queue
                .enqueue(WorkItem::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        assert!(!spin_wait(50, || counter.load(Ordering::SeqCst) > 0));
        assert_eq!(queue.pending(), 2);

        queue.start();
        assert!(queue.is_active());
        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 2));
    }

    #[test]
    fn test_reentrant_enqueue() {
        let queue = Arc::new(RunQueue::new(pool()));
        let counter = Arc::new(AtomicUsize::new(0));

        let weak = queue.downgrade();
        let c = Arc::clone(&counter);
        queue
            .enqueue(WorkItem::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                let c2 = Arc::clone(&c);
                weak.enqueue(WorkItem::new(move || {
                    c2.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            }))
            .unwrap();

        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 2));
    }

    #[test]
    fn test_weak_enqueue_after_release_fails() {
        let queue = RunQueue::new(pool());
        let weak = queue.downgrade();
        queue.release();

        assert!(spin_wait(1000, || !weak.is_alive()));
        let result = weak.enqueue(WorkItem::new(|| {}));
        assert_eq!(result, Err(QueueError::Released));
    }

    #[test]
    fn test_release_drains_pending() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = RunQueue::new(pool());
        queue.stop();

        for _ in 0..10 {
            let c = Arc::clone(&counter);
            queue
                .enqueue(WorkItem::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        queue.release();
        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 10));
    }

    #[test]
    fn test_batch_limit_yields_between_batches() {
        // More items than one batch; all of them must still run.
        let queue = RunQueue::new(pool());
        let counter = Arc::new(AtomicUsize::new(0));

        let total = BATCH_LIMIT * 3 + 7;
        for _ in 0..total {
            let c = Arc::clone(&counter);
            queue
                .enqueue(WorkItem::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        assert!(spin_wait(5000, || counter.load(Ordering::SeqCst) == total));
    }

    #[test]
    fn test_start_on_active_queue_is_noop() {
        let queue = RunQueue::new(pool());
        queue.start();
        assert!(queue.is_active());
    }
}
