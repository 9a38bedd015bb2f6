//! Typed task construction.
//!
//! A [`Task<I, R>`] is a typed handle to an immutable task descriptor:
//! a description of asynchronous work taking an `I` and producing an `R`.
//! Tasks are cheap to clone and freely shareable; every [`Task::run`]
//! invocation evaluates the same descriptor graph with fresh state.
//!
//! Compositions are built from five forms:
//! - [`Task::leaf`] / [`Task::try_leaf`] - a user function bound to a run-queue
//! - [`Task::then`] / [`sequence`] - sequential pipelines
//! - [`loop_while`] / [`spin_while`] - predicate-guarded repetition
//! - [`repeat`] - bounded repetition driven by the input count
//! - [`Task::intercept`] - fault handling with typed catchers
//!
//! Type compatibility between stages is enforced by the signatures here,
//! so composing a `Task<A, B>` with anything that does not accept a `B`
//! simply does not compile.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_runtime::{RunQueue, ThreadPool};
//! use weft_tasks::Task;
//!
//! let pool = Arc::new(ThreadPool::new());
//! let queue = RunQueue::new(pool);
//!
//! let add1 = Task::leaf(&queue, |x: i64| x + 1);
//! let mul2 = Task::leaf(&queue, |x: i64| x * 2);
//!
//! let pipeline = add1.then(mul2);
//! assert_eq!(pipeline.run(5).join().unwrap(), 12);
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use weft_runtime::{RunQueue, WeakQueue};

use crate::completion::Completion;
use crate::context;
use crate::descriptor::{Catcher, CatcherKind, Desc, LeafFn, Node, Promotion};
use crate::envelope::Envelope;
use crate::error::BuildError;
use crate::fault::{EnvelopeMismatch, Fault};

/// A typed, immutable, shareable description of asynchronous work that
/// consumes an `I` and produces an `R`.
pub struct Task<I, R> {
    desc: Arc<Desc>,
    _types: PhantomData<fn(I) -> R>,
}

impl<I, R> Clone for Task<I, R> {
    fn clone(&self) -> Self {
        Self {
            desc: Arc::clone(&self.desc),
            _types: PhantomData,
        }
    }
}

impl<I, R> fmt::Debug for Task<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

impl<I, R> Task<I, R> {
    pub(crate) fn from_desc(desc: Arc<Desc>) -> Self {
        Self {
            desc,
            _types: PhantomData,
        }
    }

    pub(crate) fn into_desc(self) -> Arc<Desc> {
        self.desc
    }

    /// The queue this task's first work lands on. For composites this is
    /// the first subtask's queue; a scheduling hint only.
    pub fn target_queue(&self) -> WeakQueue {
        self.desc.target_queue()
    }
}

impl<I, R> Task<I, R>
where
    I: Any + Send + Sync + Clone,
    R: Any + Send + Sync,
{
    /// Create a leaf task: `func` will run on `queue` with the task's
    /// input, and its return value becomes the task's result.
    ///
    /// The task holds only a weak reference to `queue`; if the queue is
    /// released before the leaf gets to run, the invocation reports a
    /// [`RunnerGone`](crate::RunnerGone) fault. A panic in `func` is
    /// caught and reported as a [`TaskPanic`](crate::TaskPanic) fault.
    pub fn leaf<F>(queue: &RunQueue, func: F) -> Self
    where
        F: Fn(I) -> R + Send + Sync + 'static,
    {
        Self::try_leaf(queue, move |input| Ok(func(input)))
    }

    /// Create a fallible leaf task. An `Err` return propagates up the
    /// composition as a fault, interceptable like any other.
    pub fn try_leaf<F>(queue: &RunQueue, func: F) -> Self
    where
        F: Fn(I) -> Result<R, Fault> + Send + Sync + 'static,
    {
        let erased: LeafFn = Arc::new(move |envelope: Envelope| {
            let input = envelope
                .get::<I>()
                .ok_or_else(|| Fault::new(EnvelopeMismatch::expecting::<I>()))?;
            func(input).map(Envelope::new)
        });
        Self::from_desc(Desc::new(Node::Leaf {
            queue: queue.downgrade(),
            func: erased,
        }))
    }
}

impl<I, R> Task<I, R>
where
    I: Any + Send + Sync,
    R: Any + Send + Sync,
{
    /// Chain `next` after this task, feeding this task's result into it.
    ///
    /// Chaining onto an existing pipeline extends it in place, so
    /// `a.then(b).then(c)` is one three-stage sequence.
    pub fn then<R2>(self, next: Task<R, R2>) -> Task<I, R2>
    where
        R2: Any + Send + Sync,
    {
        let children: Vec<Arc<Desc>> = match &self.desc.node {
            Node::Sequential { children } => {
                let mut extended = children.to_vec();
                extended.push(next.desc);
                extended
            }
            _ => vec![self.desc, next.desc],
        };
        Task::from_desc(Desc::new(Node::Sequential {
            children: children.into(),
        }))
    }

    /// Guard this task with exception catchers, tried in declaration
    /// order when the task faults. A catcher's result stands in for the
    /// task's result; an unmatched fault propagates unchanged.
    pub fn intercept(self, catchers: Vec<Catch<R>>) -> Task<I, R> {
        let catchers: Vec<Catcher> = catchers.into_iter().map(|c| c.catcher).collect();
        Task::from_desc(Desc::new(Node::Intercept {
            primary: self.desc,
            catchers: catchers.into(),
        }))
    }

    /// Invoke the task with `input`. Returns immediately; the outcome is
    /// observed through the returned [`Completion`].
    pub fn run(&self, input: I) -> Completion<R>
    where
        R: Clone,
    {
        let (completion, slot) = Completion::new();
        context::launch(Arc::clone(&self.desc), Envelope::new(input), slot);
        completion
    }
}

/// Build a pipeline from an ordered list of same-typed stages.
///
/// Fails with [`BuildError::EmptySequence`] when `stages` is empty.
/// Heterogeneously typed pipelines are built with [`Task::then`].
pub fn sequence<T>(stages: Vec<Task<T, T>>) -> Result<Task<T, T>, BuildError>
where
    T: Any + Send + Sync,
{
    if stages.is_empty() {
        return Err(BuildError::EmptySequence);
    }
    let children: Vec<Arc<Desc>> = stages.into_iter().map(Task::into_desc).collect();
    Ok(Task::from_desc(Desc::new(Node::Sequential {
        children: children.into(),
    })))
}

/// Build a loop: run `predicate` with the current value; while it yields
/// true, run `body` and feed its result back as the current value. The
/// loop's result is the current value once the predicate yields false.
pub fn loop_while<T>(predicate: Task<T, bool>, body: Task<T, T>) -> Task<T, T>
where
    T: Any + Send + Sync,
{
    Task::from_desc(Desc::new(Node::Loop {
        predicate: predicate.into_desc(),
        body: Some(body.into_desc()),
    }))
}

/// Build a bodyless loop: re-run `predicate` with the unchanged input
/// until it yields false, then complete with that input.
///
/// The loop makes no progress of its own; it is the caller's
/// responsibility that the predicate eventually yields false through
/// state outside the loop.
pub fn spin_while<T>(predicate: Task<T, bool>) -> Task<T, T>
where
    T: Any + Send + Sync,
{
    Task::from_desc(Desc::new(Node::Loop {
        predicate: predicate.into_desc(),
        body: None,
    }))
}

/// Build a bounded repetition: the invocation input `n` is the iteration
/// count, and `child` runs once per iteration with the 0-based iteration
/// index as its input. The result is the last iteration's result; with
/// `n == 0` the child never runs and the result is `R::default()`.
pub fn repeat<R>(child: Task<usize, R>) -> Task<usize, R>
where
    R: Any + Send + Sync + Default,
{
    let promote: Promotion = if TypeId::of::<R>() == TypeId::of::<()>() {
        None
    } else {
        Some(Arc::new(|| Envelope::new(R::default())))
    };
    Task::from_desc(Desc::new(Node::Repeat {
        child: child.into_desc(),
        promote,
    }))
}

/// One exception catcher for [`Task::intercept`], producing the
/// intercepted task's result type `R`.
pub struct Catch<R> {
    catcher: Catcher,
    _result: PhantomData<fn() -> R>,
}

impl<R> Catch<R>
where
    R: Any + Send + Sync,
{
    /// Catch faults whose payload is exactly an `E`; the handler receives
    /// the payload as its input.
    pub fn on<E>(handler: Task<E, R>) -> Self
    where
        E: Any + Send + Sync + Clone,
    {
        Self {
            catcher: Catcher {
                kind: CatcherKind::Typed {
                    id: TypeId::of::<E>(),
                },
                handler: handler.into_desc(),
            },
            _result: PhantomData,
        }
    }

    /// Catch any fault; the handler receives the [`Fault`] itself.
    pub fn any(handler: Task<Fault, R>) -> Self {
        Self {
            catcher: Catcher {
                kind: CatcherKind::Universal,
                handler: handler.into_desc(),
            },
            _result: PhantomData,
        }
    }
}
