//! Type-erased value envelopes.
//!
//! Values crossing between tasks in a composition are heterogeneous: each
//! stage of a pipeline may produce a different type. The engine ferries
//! them as [`Envelope`]s: cheaply clonable, type-erased containers. Type
//! correctness is established when a composition is built (the typed
//! [`Task`](crate::Task) API only lets compatible stages compose), so the
//! engine itself never needs a per-hand-off type check.
//!
//! The unit value `()` maps to the *empty* envelope: a task declared to
//! produce nothing reports an envelope with no payload. The repeat engine
//! relies on this to decide when to substitute a default-constructed
//! result (see [`crate::repeat`]).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased, cheaply clonable value container.
///
/// Cloning an envelope shares the payload; extracting a value with
/// [`Envelope::get`] clones it out.
#[derive(Clone)]
pub struct Envelope {
    value: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Envelope {
    /// Wrap a value. The unit value produces the empty envelope.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        if std::any::TypeId::of::<T>() == std::any::TypeId::of::<()>() {
            return Self::empty();
        }
        Self {
            value: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The envelope with no payload.
    pub fn empty() -> Self {
        Self {
            value: None,
            type_name: "()",
        }
    }

    /// Wrap an already-erased payload.
    pub(crate) fn from_raw(value: Arc<dyn Any + Send + Sync>, type_name: &'static str) -> Self {
        Self {
            value: Some(value),
            type_name,
        }
    }

    /// Whether the envelope carries no payload.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Extract a value of type `T`, cloning it out of the envelope.
    ///
    /// Returns `None` on a type mismatch. Requesting `()` from the empty
    /// envelope succeeds, mirroring [`Envelope::new`].
    pub fn get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        match &self.value {
            Some(value) => value.downcast_ref::<T>().cloned(),
            None => {
                let unit: Box<dyn Any> = Box::new(());
                unit.downcast::<T>().ok().map(|v| *v)
            }
        }
    }

    /// The type name of the payload, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type", &self.type_name)
            .finish()
    }
}
