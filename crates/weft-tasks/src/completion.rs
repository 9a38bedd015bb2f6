//! Completion observation.
//!
//! Running a task returns immediately; the caller observes the outcome
//! through a [`Completion`] handle attached to the root of the
//! composition. Exactly one of result or fault is ever delivered, exactly
//! once.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::context::Outcome;
use crate::envelope::Envelope;
use crate::fault::{EnvelopeMismatch, Fault};

/// Shared slot the root invocation reports into.
pub(crate) struct Slot {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl Slot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    /// Deliver the root outcome. The first delivery wins; the engine
    /// never produces a second one.
    pub(crate) fn complete(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock();
        debug_assert!(slot.is_none(), "root outcome delivered twice");
        if slot.is_none() {
            *slot = Some(outcome);
            self.ready.notify_all();
        }
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.clone() {
                return outcome;
            }
            self.ready.wait(&mut slot);
        }
    }

    fn wait_for(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = std::time::Instant::now() + timeout;
        let mut slot = self.outcome.lock();
        while slot.is_none() {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.clone()
    }

    fn try_get(&self) -> Option<Outcome> {
        self.outcome.lock().clone()
    }
}

/// Handle for awaiting the outcome of one root invocation.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use weft_runtime::{RunQueue, ThreadPool};
/// use weft_tasks::Task;
///
/// let pool = Arc::new(ThreadPool::new());
/// let queue = RunQueue::new(pool);
///
/// let double = Task::leaf(&queue, |x: i64| x * 2);
/// let completion = double.run(21);
/// assert_eq!(completion.join().unwrap(), 42);
/// ```
pub struct Completion<R> {
    slot: Arc<Slot>,
    _result: PhantomData<fn() -> R>,
}

impl<R> Completion<R>
where
    R: std::any::Any + Send + Sync + Clone,
{
    pub(crate) fn new() -> (Self, Arc<Slot>) {
        let slot = Slot::new();
        (
            Self {
                slot: Arc::clone(&slot),
                _result: PhantomData,
            },
            slot,
        )
    }

    /// Block until the root reports, then return its outcome.
    pub fn join(self) -> Result<R, Fault> {
        Self::extract(self.slot.wait())
    }

    /// Block for at most `timeout`. Returns `None` if the root has not
    /// reported in time.
    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<R, Fault>> {
        self.slot.wait_for(timeout).map(Self::extract)
    }

    /// Return the outcome without blocking, if the root has reported.
    pub fn try_join(&self) -> Option<Result<R, Fault>> {
        self.slot.try_get().map(Self::extract)
    }

    /// Whether the root has reported.
    pub fn is_complete(&self) -> bool {
        self.slot.try_get().is_some()
    }

    fn extract(outcome: Outcome) -> Result<R, Fault> {
        let envelope: Envelope = outcome?;
        envelope
            .get::<R>()
            .ok_or_else(|| Fault::new(EnvelopeMismatch::expecting::<R>()))
    }
}
