//! Dispatcher backend for run-queues.
//!
//! A [`Dispatch`] implementation is the execution substrate underneath the
//! run-queues: queues hand it batch runners, and it invokes each runner on
//! some worker thread at some later time. The dispatcher makes no ordering
//! or serialization promises of its own; those are provided by the queues
//! layered on top of it.
//!
//! The crate ships one implementation, [`ThreadPool`]: a fixed set of
//! worker threads fed by a global injector queue, with per-worker local
//! queues and work stealing between workers so an idle worker can pick up
//! batches submitted while another worker was busy.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_runtime::dispatch::{Dispatch, ThreadPool};
//!
//! let pool = Arc::new(ThreadPool::new());
//! pool.submit("example", Box::new(|| {
//!     // Runs on one of the pool's workers.
//! }));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle as StdJoinHandle};

use crossbeam_deque::{Injector, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// A unit of work handed to a dispatcher: one batch runner.
pub type Batch = Box<dyn FnOnce() + Send + 'static>;

/// Abstract execution backend consumed by run-queues.
///
/// `submit` must eventually invoke `batch` on some worker thread. The
/// `label` identifies the submitting queue and is used only for
/// diagnostics.
pub trait Dispatch: Send + Sync + 'static {
    /// Schedule `batch` to run on some worker thread at some later time.
    fn submit(&self, label: &str, batch: Batch);
}

/// Configuration for a [`ThreadPool`] dispatcher.
///
/// Mirrors the knobs a host application typically wants to pin down:
/// worker count, thread naming, and worker stack size.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads. Defaults to available parallelism.
    pub workers: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// Stack size for worker threads (bytes).
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            thread_name_prefix: "weft-worker".to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the name prefix for worker threads.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the stack size for worker threads.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// Shared state for the thread pool.
struct PoolInner {
    /// Global batch queue (for external submissions).
    global_queue: Injector<Batch>,
    /// Stealers for each worker's local queue.
    stealers: Vec<Stealer<Batch>>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Condition variable for workers waiting for batches.
    batch_available: Condvar,
    /// Mutex for the condition variable.
    batch_mutex: Mutex<()>,
    /// Number of workers.
    num_workers: usize,
}

impl PoolInner {
    /// Find a batch on the local queue, the global queue, or another worker.
    fn find_batch(&self, local: &Worker<Batch>, worker_id: usize) -> Option<Batch> {
        // Local queue first
        if let Some(batch) = local.pop() {
            return Some(batch);
        }

        // Then the global queue
        loop {
            match self.global_queue.steal() {
                crossbeam_deque::Steal::Success(batch) => return Some(batch),
                crossbeam_deque::Steal::Empty => break,
                crossbeam_deque::Steal::Retry => continue,
            }
        }

        // Finally steal from the other workers
        let start = worker_id;
        for i in 0..self.stealers.len() {
            let idx = (start + i + 1) % self.stealers.len();
            if idx == worker_id {
                continue;
            }
            loop {
                match self.stealers[idx].steal() {
                    crossbeam_deque::Steal::Success(batch) => return Some(batch),
                    crossbeam_deque::Steal::Empty => break,
                    crossbeam_deque::Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn notify_batch_available(&self) {
        self.batch_available.notify_one();
    }

    fn notify_all(&self) {
        self.batch_available.notify_all();
    }
}

/// A work-stealing thread pool implementing [`Dispatch`].
///
/// The pool maintains a fixed number of worker threads that execute
/// submitted batch runners. Batches can be submitted from any thread,
/// including from inside a running batch.
///
/// # Shutdown
///
/// When the pool is dropped, it signals all workers to shut down and waits
/// for them to finish. Workers keep draining queued batches until no batch
/// can be found, so work submitted before the drop still runs.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<StdJoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a new thread pool with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a thread pool with a specific number of workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self::with_config(PoolConfig::default().with_workers(num_workers))
    }

    /// Create a thread pool from a [`PoolConfig`].
    pub fn with_config(config: PoolConfig) -> Self {
        let num_workers = config.workers.unwrap_or_else(|| {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        });
        assert!(num_workers > 0, "thread pool must have at least 1 worker");

        let local_queues: Vec<Worker<Batch>> =
            (0..num_workers).map(|_| Worker::new_fifo()).collect();

        let stealers: Vec<Stealer<Batch>> =
            local_queues.iter().map(|w| w.stealer()).collect();

        let inner = Arc::new(PoolInner {
            global_queue: Injector::new(),
            stealers,
            shutdown: AtomicBool::new(false),
            batch_available: Condvar::new(),
            batch_mutex: Mutex::new(()),
            num_workers,
        });

        let mut workers = Vec::with_capacity(num_workers);
        for (worker_id, local_queue) in local_queues.into_iter().enumerate() {
            let inner = Arc::clone(&inner);
            let mut builder = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, worker_id));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }
            let worker = builder
                .spawn(move || {
                    worker_loop(inner, local_queue, worker_id);
                })
                .expect("failed to spawn worker thread");
            workers.push(worker);
        }

        debug!(workers = num_workers, "dispatcher pool started");

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.inner.num_workers
    }

    /// Check if the pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

impl Dispatch for ThreadPool {
    fn submit(&self, _label: &str, batch: Batch) {
        self.inner.global_queue.push(batch);
        self.inner.notify_batch_available();
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify_all();

        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
        debug!("dispatcher pool stopped");
    }
}

/// Worker thread loop.
fn worker_loop(inner: Arc<PoolInner>, local: Worker<Batch>, worker_id: usize) {
    loop {
        if let Some(batch) = inner.find_batch(&local, worker_id) {
            batch();
            continue;
        }

        // No batch found, check for shutdown
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Wait for a batch or shutdown
        let mut guard = inner.batch_mutex.lock();
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        // Re-check under the lock; a submit may have raced the park
        if let Some(batch) = inner.find_batch(&local, worker_id) {
            drop(guard);
            batch();
            continue;
        }
        inner
            .batch_available
            .wait_for(&mut guard, std::time::Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn spin_wait(msec: u64, cond: impl Fn() -> bool) -> bool {
        let start = std::time::Instant::now();
        while !cond() {
            if start.elapsed() >= Duration::from_millis(msec) {
                return false;
            }
            thread::yield_now();
        }
        true
    }

    #[test]
    fn test_submit_runs_batch() {
        let pool = ThreadPool::with_workers(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        pool.submit("test", Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_submit_many_batches() {
        let pool = ThreadPool::with_workers(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..1000 {
            let c = Arc::clone(&counter);
            pool.submit("test", Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(spin_wait(5000, || counter.load(Ordering::SeqCst) == 1000));
    }

    #[test]
    fn test_submit_from_inside_batch() {
        let pool = Arc::new(ThreadPool::with_workers(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let p = Arc::clone(&pool);
        pool.submit("test", Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = Arc::clone(&c);
            p.submit("test", Box::new(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert!(spin_wait(1000, || counter.load(Ordering::SeqCst) == 2));
    }

    #[test]
    fn test_drop_drains_pending_batches() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::with_workers(2);
            for _ in 0..100 {
                let c = Arc::clone(&counter);
                pool.submit("test", Box::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }
        // The pool joined its workers; everything submitted has run.
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_num_workers() {
        let pool = ThreadPool::with_workers(8);
        assert_eq!(pool.num_workers(), 8);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .with_workers(3)
            .with_thread_name_prefix("custom")
            .with_stack_size(1024 * 1024);

        assert_eq!(config.workers, Some(3));
        assert_eq!(config.thread_name_prefix, "custom");
        assert_eq!(config.stack_size, Some(1024 * 1024));
    }
}
