//! Weft Runtime - serial run-queues over a pluggable dispatcher
//!
//! This crate provides the scheduling substrate of the Weft task engine:
//! - `Dispatch` - abstract backend that runs submitted batches on worker threads
//! - `ThreadPool` - a work-stealing `Dispatch` implementation
//! - `RunQueue` / `WeakQueue` - named serial execution lanes
//! - `WorkItem` - the opaque unit of work a queue executes
//!
//! # Design
//!
//! Worker threads are owned by the dispatcher, not by the queues. Each
//! queue multiplexes onto the dispatcher by submitting *batch runners*:
//! closures that drain up to [`queue::BATCH_LIMIT`] items from the queue's
//! FIFO and execute them in order. Because a queue never has more than one
//! batch in flight, its items execute serially and in FIFO order across
//! all enqueuing threads, while different queues run in parallel on
//! whatever workers the dispatcher has free.
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
//! let hits = Arc::new(AtomicUsize::new(0));
//! for _ in 0..4 {
//!     let hits = Arc::clone(&hits);
//!     queue.enqueue(WorkItem::new(move || {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     })).unwrap();
//! }
//! # while hits.load(Ordering::SeqCst) < 4 { std::thread::yield_now(); }
//! ```

pub mod dispatch;
pub mod error;
pub mod queue;

pub use dispatch::{Batch, Dispatch, PoolConfig, ThreadPool};
pub use error::QueueError;
pub use queue::{RunQueue, WeakQueue, WorkItem, BATCH_LIMIT};
