//! Weft Tasks - composable asynchronous task graphs
//!
//! This crate provides the task algebra of the Weft engine:
//! - `Task<I, R>` - typed, immutable, shareable task descriptors
//! - `sequence` / `Task::then` - sequential pipelines
//! - `loop_while` / `spin_while` - predicate-guarded loops
//! - `repeat` - bounded repetition
//! - `Task::intercept` + `Catch` - fault interception
//! - `Completion<R>` - observation of a root invocation's outcome
//! - `Fault` - type-erased exception values
//!
//! # Architecture
//!
//! ```text
//! Task<I, R>  (typed construction)
//!      │
//!      ▼
//! descriptor graph  (immutable, Arc-shared)
//!      │  run(input)
//!      ▼
//! continuation stack + evaluation frames  (one set per invocation)
//!      │  leaf work items
//!      ▼
//! weft-runtime run-queues  (serial execution lanes)
//! ```
//!
//! Evaluation is driven by an explicit continuation stack rather than the
//! host call stack, so pipelines hundreds of thousands of stages deep
//! execute in constant stack space. Leaves run on their declared
//! run-queue; everything between two leaves runs on whichever queue
//! worker delivered the previous leaf's result.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_runtime::{RunQueue, ThreadPool};
//! use weft_tasks::{Catch, Task};
//!
//! let pool = Arc::new(ThreadPool::new());
//! let queue = RunQueue::new(pool);
//!
//! #[derive(Debug, Clone)]
//! struct TooBig(i64);
//!
//! let checked = Task::try_leaf(&queue, |x: i64| {
//!     if x > 100 {
//!         Err(weft_tasks::Fault::new(TooBig(x)))
//!     } else {
//!         Ok(x * 2)
//!     }
//! });
//! let clamp = Task::leaf(&queue, |_e: TooBig| 200i64);
//!
//! let safe = checked.intercept(vec![Catch::on(clamp)]);
//! assert_eq!(safe.run(3).join().unwrap(), 6);
//! assert_eq!(safe.run(500).join().unwrap(), 200);
//! ```

mod context;
mod descriptor;
mod stack;

pub mod completion;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod task;

pub use completion::Completion;
pub use envelope::Envelope;
pub use error::BuildError;
pub use fault::{EnvelopeMismatch, Fault, RunnerGone, TaskPanic};
pub use task::{loop_while, repeat, sequence, spin_while, Catch, Task};
