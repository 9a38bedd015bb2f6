//! The continuation stack.
//!
//! One continuation stack exists per in-flight root invocation. It owns
//! the live evaluation frames of that invocation, most recently entered
//! on top. The stack is the mechanism that lets arbitrarily deep
//! compositions unwind without consuming host stack frames: the drive
//! loop in [`crate::context`] mutates the stack instead of recursing.
//!
//! A stack is touched by exactly one run-queue worker at a time; it moves
//! by value into each leaf work item and back out when the leaf's result
//! is delivered, so no locking is needed.

use crate::context::Frame;

/// LIFO owner of the live frames of one root invocation.
pub(crate) struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Push a freshly entered frame.
    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Pop the topmost frame, transferring ownership to the caller.
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The topmost frame, if any.
    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Frame;
    use crate::descriptor::{Desc, Node};
    use crate::envelope::Envelope;
    use std::sync::Arc;
    use weft_runtime::{RunQueue, ThreadPool};

    fn composite_frame() -> Frame {
        let pool = Arc::new(ThreadPool::with_workers(1));
        let queue = RunQueue::new(pool);
        let leaf = Desc::new(Node::Leaf {
            queue: queue.downgrade(),
            func: Arc::new(|env| Ok(env)),
        });
        let seq = Desc::new(Node::Sequential {
            children: vec![leaf].into(),
        });
        let (frame, _reaction) = Frame::enter(&seq, Envelope::new(1i64));
        frame
    }

    #[test]
    fn test_push_pop_order() {
        let mut stack = ContextStack::new();
        assert!(stack.is_empty());

        stack.push(composite_frame());
        stack.push(composite_frame());
        assert!(!stack.is_empty());
        assert_eq!(stack.depth(), 2);

        assert!(stack.pop().is_some());
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_top_is_most_recent() {
        let mut stack = ContextStack::new();
        assert!(stack.top_mut().is_none());
        stack.push(composite_frame());
        assert!(stack.top_mut().is_some());
    }
}
