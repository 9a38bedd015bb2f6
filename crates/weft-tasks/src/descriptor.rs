//! Task descriptors.
//!
//! A descriptor is the immutable, shareable description of one node in a
//! task graph: what kind of node it is, which subtasks it composes, and,
//! for leaves, which run-queue the user function must execute on.
//! Descriptors carry no runtime state; every invocation of a descriptor
//! allocates fresh evaluation frames (see [`crate::context`]).
//!
//! Descriptors form a DAG and are shared through `Arc`. A leaf holds only
//! a weak reference to its target queue, so releasing a queue does not
//! keep it alive through the task graphs that mention it.

use std::any::TypeId;
use std::sync::Arc;

use weft_runtime::WeakQueue;

use crate::envelope::Envelope;
use crate::fault::Fault;

/// The user function of a leaf, operating on erased envelopes.
pub(crate) type LeafFn = Arc<dyn Fn(Envelope) -> Result<Envelope, Fault> + Send + Sync>;

/// Default-constructor for a repeat node's declared result type, used for
/// empty-value promotion. `None` when the result type is unit.
pub(crate) type Promotion = Option<Arc<dyn Fn() -> Envelope + Send + Sync>>;

/// One node of a task graph.
///
/// Child collections are shared slices so an evaluation frame can hold on
/// to them without cloning the descriptors themselves.
pub(crate) enum Node {
    /// A user function bound to a target run-queue.
    Leaf { queue: WeakQueue, func: LeafFn },
    /// An ordered chain of subtasks, each feeding the next.
    Sequential { children: Arc<[Arc<Desc>]> },
    /// A predicate-guarded loop with an optional body.
    Loop {
        predicate: Arc<Desc>,
        body: Option<Arc<Desc>>,
    },
    /// A subtask invoked `N` times, `N` being the input value.
    Repeat { child: Arc<Desc>, promote: Promotion },
    /// A primary subtask with an ordered list of exception catchers.
    Intercept {
        primary: Arc<Desc>,
        catchers: Arc<[Catcher]>,
    },
}

/// Immutable descriptor of one task graph node.
pub(crate) struct Desc {
    pub(crate) node: Node,
}

impl Desc {
    pub(crate) fn new(node: Node) -> Arc<Self> {
        Arc::new(Self { node })
    }

    /// The queue this node's first work lands on: the leaf's own queue,
    /// or the first child's for composites. A scheduling hint only.
    pub(crate) fn target_queue(&self) -> WeakQueue {
        match &self.node {
            Node::Leaf { queue, .. } => queue.clone(),
            Node::Sequential { children } => children[0].target_queue(),
            Node::Loop { predicate, .. } => predicate.target_queue(),
            Node::Repeat { child, .. } => child.target_queue(),
            Node::Intercept { primary, .. } => primary.target_queue(),
        }
    }

    /// Number of directly composed subtasks.
    pub(crate) fn subtask_count(&self) -> usize {
        match &self.node {
            Node::Leaf { .. } => 0,
            Node::Sequential { children } => children.len(),
            Node::Loop { body, .. } => 1 + usize::from(body.is_some()),
            Node::Repeat { .. } => 1,
            Node::Intercept { .. } => 1,
        }
    }

    /// The `index`-th directly composed subtask.
    pub(crate) fn subtask(&self, index: usize) -> Option<&Arc<Desc>> {
        match &self.node {
            Node::Leaf { .. } => None,
            Node::Sequential { children } => children.get(index),
            Node::Loop { predicate, body } => match index {
                0 => Some(predicate),
                1 => body.as_ref(),
                _ => None,
            },
            Node::Repeat { child, .. } => (index == 0).then_some(child),
            Node::Intercept { primary, .. } => (index == 0).then_some(primary),
        }
    }
}

/// How a catcher decides whether it handles a fault.
pub(crate) enum CatcherKind {
    /// Handles faults whose payload is exactly the declared type.
    Typed { id: TypeId },
    /// Handles any fault; its handler receives the [`Fault`] itself.
    Universal,
}

/// One exception handler of an intercept node.
pub(crate) struct Catcher {
    pub(crate) kind: CatcherKind,
    pub(crate) handler: Arc<Desc>,
}

impl Catcher {
    /// The exception-matching hook: should this catcher handle `fault`?
    pub(crate) fn matches(&self, fault: &Fault) -> bool {
        match &self.kind {
            CatcherKind::Typed { id } => fault.payload().as_ref().type_id() == *id,
            CatcherKind::Universal => true,
        }
    }

    /// The input envelope the handler receives for `fault`.
    pub(crate) fn handler_input(&self, fault: &Fault) -> Envelope {
        match &self.kind {
            CatcherKind::Typed { .. } => Envelope::from_raw(fault.payload(), fault.type_name()),
            CatcherKind::Universal => Envelope::new(fault.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_runtime::{RunQueue, ThreadPool};

    fn leaf_desc(queue: &RunQueue) -> Arc<Desc> {
        Desc::new(Node::Leaf {
            queue: queue.downgrade(),
            func: Arc::new(|env| Ok(env)),
        })
    }

    #[test]
    fn test_subtask_accessors() {
        let pool = Arc::new(ThreadPool::with_workers(1));
        let queue = RunQueue::new(pool);

        let a = leaf_desc(&queue);
        let b = leaf_desc(&queue);
        let seq = Desc::new(Node::Sequential {
            children: vec![Arc::clone(&a), Arc::clone(&b)].into(),
        });
        assert_eq!(seq.subtask_count(), 2);
        assert!(seq.subtask(0).is_some());
        assert!(seq.subtask(2).is_none());

        let spin = Desc::new(Node::Loop {
            predicate: Arc::clone(&a),
            body: None,
        });
        assert_eq!(spin.subtask_count(), 1);
        assert!(spin.subtask(1).is_none());

        let lp = Desc::new(Node::Loop {
            predicate: a,
            body: Some(b),
        });
        assert_eq!(lp.subtask_count(), 2);
        assert!(lp.subtask(1).is_some());
    }

    #[test]
    fn test_catcher_matching() {
        let pool = Arc::new(ThreadPool::with_workers(1));
        let queue = RunQueue::new(pool);

        let typed = Catcher {
            kind: CatcherKind::Typed {
                id: TypeId::of::<i64>(),
            },
            handler: leaf_desc(&queue),
        };
        let universal = Catcher {
            kind: CatcherKind::Universal,
            handler: leaf_desc(&queue),
        };

        let fault = Fault::new(7i64);
        assert!(typed.matches(&fault));
        assert!(universal.matches(&fault));
        assert!(!typed.matches(&Fault::new("nope".to_string())));

        assert_eq!(typed.handler_input(&fault).get::<i64>(), Some(7));
        let via_universal = universal.handler_input(&fault);
        assert_eq!(via_universal.get::<Fault>().unwrap().get::<i64>(), Some(7));
    }
}
