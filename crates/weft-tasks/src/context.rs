//! The evaluation engine.
//!
//! Invoking a task descriptor allocates a fresh continuation stack and
//! drives it with the loop in this module. Each composite descriptor gets
//! one [`Frame`] per invocation; the frame holds the variant-specific
//! state (next child for a sequence, iteration counter for a repeat, and
//! so on) and reacts to child outcomes with one of three [`Reaction`]s:
//! descend into a child, complete with a result, or fail with a fault.
//!
//! # Why a loop and not callbacks
//!
//! Child results and faults flow one level at a time, exactly as if each
//! child reported to its parent through a bound callback, but the drive
//! loop applies the reports iteratively, so a chain of a million task
//! completions unwinds in constant host-stack space. A leaf is the only
//! point where the loop lets go: it enqueues a work item carrying the
//! stack onto the leaf's target queue and returns to the worker. When the
//! user function finishes there, the drive loop resumes on that queue's
//! worker with the leaf's outcome.
//!
//! A leaf work item that is dropped without running (its queue was
//! released between scheduling decisions) resumes the drive loop with a
//! `RunnerGone` fault, so a composition never silently stalls.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};
use weft_runtime::WorkItem;

use crate::completion::Slot;
use crate::descriptor::{Catcher, Desc, LeafFn, Node, Promotion};
use crate::envelope::Envelope;
use crate::fault::{EnvelopeMismatch, Fault, RunnerGone};
use crate::stack::ContextStack;

/// The outcome a child reports to its parent: a result or a fault.
pub(crate) type Outcome = Result<Envelope, Fault>;

/// What a frame asks the drive loop to do after handling a report.
pub(crate) enum Reaction {
    /// Enter `child` with `input`; the current frame stays on the stack.
    Descend { child: Arc<Desc>, input: Envelope },
    /// Pop the current frame and report a result to its parent.
    Complete(Envelope),
    /// Pop the current frame and report a fault to its parent.
    Fail(Fault),
}

/// Evaluation state of a sequential composite.
pub(crate) struct SeqFrame {
    children: Arc<[Arc<Desc>]>,
    next: usize,
}

impl SeqFrame {
    fn on_result(&mut self, value: Envelope) -> Reaction {
        match self.children.get(self.next) {
            None => Reaction::Complete(value),
            Some(child) => {
                let child = Arc::clone(child);
                self.next += 1;
                Reaction::Descend {
                    child,
                    input: value,
                }
            }
        }
    }
}

/// Evaluation state of a loop composite.
pub(crate) struct LoopFrame {
    predicate: Arc<Desc>,
    body: Option<Arc<Desc>>,
    /// The value fed to the predicate and body, updated on each body
    /// completion; also the loop's result once the predicate yields false.
    input: Envelope,
    in_body: bool,
}

impl LoopFrame {
    fn spawn_predicate(&self) -> Reaction {
        Reaction::Descend {
            child: Arc::clone(&self.predicate),
            input: self.input.clone(),
        }
    }

    fn on_result(&mut self, value: Envelope) -> Reaction {
        if self.in_body {
            // Body finished: its result becomes the next iteration's input.
            self.in_body = false;
            self.input = value;
            return self.spawn_predicate();
        }
        match value.get::<bool>() {
            None => Reaction::Fail(Fault::new(EnvelopeMismatch::expecting::<bool>())),
            Some(false) => Reaction::Complete(self.input.clone()),
            Some(true) => match &self.body {
                Some(body) => {
                    self.in_body = true;
                    Reaction::Descend {
                        child: Arc::clone(body),
                        input: self.input.clone(),
                    }
                }
                None => self.spawn_predicate(),
            },
        }
    }
}

/// Evaluation state of a repeat composite.
pub(crate) struct RepeatFrame {
    child: Arc<Desc>,
    promote: Promotion,
    limit: usize,
    counter: usize,
}

impl RepeatFrame {
    fn spawn_child(&self) -> Reaction {
        Reaction::Descend {
            child: Arc::clone(&self.child),
            input: Envelope::new(self.counter),
        }
    }

    /// Substitute a default-constructed result when the child reported an
    /// empty envelope but the repeat declares a non-unit result type.
    fn promoted(&self, value: Envelope) -> Envelope {
        match (&self.promote, value.is_empty()) {
            (Some(promote), true) => promote(),
            _ => value,
        }
    }

    fn on_result(&mut self, value: Envelope) -> Reaction {
        self.counter += 1;
        if self.counter < self.limit {
            self.spawn_child()
        } else {
            Reaction::Complete(self.promoted(value))
        }
    }
}

/// Evaluation state of an intercept composite.
pub(crate) struct InterceptFrame {
    catchers: Arc<[Catcher]>,
    /// Set once a catcher is running; a fault from a catcher propagates
    /// instead of being offered to the remaining catchers.
    catching: bool,
}

impl InterceptFrame {
    fn on_fault(&mut self, fault: Fault) -> Reaction {
        if !self.catching {
            for catcher in self.catchers.iter() {
                if catcher.matches(&fault) {
                    debug!(fault = %fault, "fault intercepted");
                    self.catching = true;
                    return Reaction::Descend {
                        child: Arc::clone(&catcher.handler),
                        input: catcher.handler_input(&fault),
                    };
                }
            }
        }
        Reaction::Fail(fault)
    }
}

/// One live evaluation frame on a continuation stack.
pub(crate) enum Frame {
    Sequential(SeqFrame),
    Loop(LoopFrame),
    Repeat(RepeatFrame),
    Intercept(InterceptFrame),
}

impl Frame {
    /// Create the frame for a composite descriptor together with its
    /// first reaction. Leaves are scheduled by the drive loop directly
    /// and never get frames.
    pub(crate) fn enter(desc: &Arc<Desc>, input: Envelope) -> (Frame, Reaction) {
        match &desc.node {
            Node::Leaf { .. } => unreachable!("leaf descriptors are scheduled, not framed"),
            Node::Sequential { children } => {
                let mut frame = SeqFrame {
                    children: Arc::clone(children),
                    next: 0,
                };
                let reaction = frame.on_result(input);
                (Frame::Sequential(frame), reaction)
            }
            Node::Loop { predicate, body } => {
                let frame = LoopFrame {
                    predicate: Arc::clone(predicate),
                    body: body.as_ref().map(Arc::clone),
                    input,
                    in_body: false,
                };
                let reaction = frame.spawn_predicate();
                (Frame::Loop(frame), reaction)
            }
            Node::Repeat { child, promote } => {
                let frame = RepeatFrame {
                    child: Arc::clone(child),
                    promote: promote.as_ref().map(Arc::clone),
                    limit: 0,
                    counter: 0,
                };
                match input.get::<usize>() {
                    None => {
                        let fault = Fault::new(EnvelopeMismatch::expecting::<usize>());
                        (Frame::Repeat(frame), Reaction::Fail(fault))
                    }
                    Some(0) => {
                        let value = frame.promoted(Envelope::empty());
                        (Frame::Repeat(frame), Reaction::Complete(value))
                    }
                    Some(limit) => {
                        let frame = RepeatFrame { limit, ..frame };
                        let reaction = frame.spawn_child();
                        (Frame::Repeat(frame), reaction)
                    }
                }
            }
            Node::Intercept { primary, catchers } => {
                let frame = InterceptFrame {
                    catchers: Arc::clone(catchers),
                    catching: false,
                };
                let reaction = Reaction::Descend {
                    child: Arc::clone(primary),
                    input,
                };
                (Frame::Intercept(frame), reaction)
            }
        }
    }

    fn on_result(&mut self, value: Envelope) -> Reaction {
        match self {
            Frame::Sequential(frame) => frame.on_result(value),
            Frame::Loop(frame) => frame.on_result(value),
            Frame::Repeat(frame) => frame.on_result(value),
            Frame::Intercept(_) => Reaction::Complete(value),
        }
    }

    fn on_fault(&mut self, fault: Fault) -> Reaction {
        match self {
            Frame::Intercept(frame) => frame.on_fault(fault),
            _ => Reaction::Fail(fault),
        }
    }
}

/// The two states the drive loop alternates between: entering a
/// descriptor with an input, and delivering a child outcome upward.
pub(crate) enum Phase {
    Enter { desc: Arc<Desc>, input: Envelope },
    Outcome(Outcome),
}

/// A leaf's work-item payload.
///
/// `run` executes the user function and resumes the drive loop with its
/// outcome. If the item is dropped without running (the queue was
/// released out from under it), `Drop` resumes the loop with a
/// `RunnerGone` fault instead.
struct LeafJob {
    payload: Option<(LeafFn, Envelope, ContextStack, Arc<Slot>)>,
}

impl LeafJob {
    fn run(mut self) {
        if let Some((func, input, stack, slot)) = self.payload.take() {
            let outcome = match catch_unwind(AssertUnwindSafe(move || func(input))) {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let fault = Fault::from_panic(panic);
                    debug!(fault = %fault, "leaf panicked");
                    Err(fault)
                }
            };
            drive(stack, Phase::Outcome(outcome), slot);
        }
    }
}

impl Drop for LeafJob {
    fn drop(&mut self) {
        if let Some((_, _, stack, slot)) = self.payload.take() {
            warn!("leaf work item dropped unexecuted; reporting RunnerGone");
            drive(stack, Phase::Outcome(Err(Fault::new(RunnerGone))), slot);
        }
    }
}

/// Pop the current frame and turn its terminal reaction into the next
/// phase, or descend without popping.
fn apply(stack: &mut ContextStack, reaction: Reaction) -> Phase {
    match reaction {
        Reaction::Descend { child, input } => Phase::Enter { desc: child, input },
        Reaction::Complete(value) => {
            stack.pop();
            Phase::Outcome(Ok(value))
        }
        Reaction::Fail(fault) => {
            stack.pop();
            Phase::Outcome(Err(fault))
        }
    }
}

/// Drive one root invocation until it either completes (the outcome lands
/// in `slot`) or parks in a leaf work item on some run-queue.
pub(crate) fn drive(mut stack: ContextStack, mut phase: Phase, slot: Arc<Slot>) {
    loop {
        phase = match phase {
            Phase::Enter { desc, input } => match &desc.node {
                Node::Leaf { queue, func } => {
                    let job = LeafJob {
                        payload: Some((Arc::clone(func), input, stack, Arc::clone(&slot))),
                    };
                    // On failure the queue drops the item, whose Drop
                    // resumes the drive loop with RunnerGone.
                    let _ = queue.enqueue(WorkItem::new(move || job.run()));
                    return;
                }
                _ => {
                    let (frame, reaction) = Frame::enter(&desc, input);
                    stack.push(frame);
                    apply(&mut stack, reaction)
                }
            },
            Phase::Outcome(outcome) => match stack.top_mut() {
                None => {
                    slot.complete(outcome);
                    return;
                }
                Some(frame) => {
                    let reaction = match outcome {
                        Ok(value) => frame.on_result(value),
                        Err(fault) => frame.on_fault(fault),
                    };
                    apply(&mut stack, reaction)
                }
            },
        };
    }
}

/// Entry point of a root invocation: allocate a fresh continuation stack
/// and enter the root descriptor.
pub(crate) fn launch(desc: Arc<Desc>, input: Envelope, slot: Arc<Slot>) {
    drive(ContextStack::new(), Phase::Enter { desc, input }, slot);
}
