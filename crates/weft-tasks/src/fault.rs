//! Fault values - the exceptions of the task engine.
//!
//! Rust has no typed exceptions, so a "thrown" value travels the context
//! chain as a [`Fault`]: a type-erased payload plus the payload's type
//! name. A fallible leaf returns `Err(Fault)`; a panicking leaf is caught
//! and wrapped in a [`TaskPanic`] payload; a leaf whose target queue has
//! been released produces a [`RunnerGone`] payload.
//!
//! Interception matches faults against catcher payload types exactly (by
//! `TypeId`); a universal catcher receives the `Fault` itself. See
//! [`crate::Catch`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A type-erased exception value propagating up a task composition.
///
/// Cloning a fault shares the payload.
#[derive(Clone)]
pub struct Fault {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Fault {
    /// Wrap a payload value.
    pub fn new<E: Any + Send + Sync>(payload: E) -> Self {
        Self {
            payload: Arc::new(payload),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Wrap the payload of a caught panic.
    ///
    /// The panic value itself cannot be kept (it is not `Sync`), so the
    /// conventional string payloads are extracted into a [`TaskPanic`]
    /// message; anything else becomes an "unknown panic".
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let message = panic
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown panic".to_string());
        Self::new(TaskPanic { message })
    }

    /// Whether the payload is of type `E`.
    pub fn is<E: Any>(&self) -> bool {
        self.payload.as_ref().type_id() == TypeId::of::<E>()
    }

    /// Extract the payload if it is of type `E`, cloning it out.
    pub fn get<E: Any + Send + Sync + Clone>(&self) -> Option<E> {
        self.payload.downcast_ref::<E>().cloned()
    }

    /// Borrow the payload if it is of type `E`.
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// The type name of the payload.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn payload(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.payload)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("type", &self.type_name)
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(panic) = self.downcast_ref::<TaskPanic>() {
            return write!(f, "{panic}");
        }
        if let Some(gone) = self.downcast_ref::<RunnerGone>() {
            return write!(f, "{gone}");
        }
        if let Some(msg) = self.downcast_ref::<String>() {
            return write!(f, "task fault: {msg}");
        }
        write!(f, "task fault of type {}", self.type_name)
    }
}

impl std::error::Error for Fault {}

/// Payload of a fault produced by a panicking leaf function.
#[derive(Debug, Clone, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanic {
    /// The extracted panic message.
    pub message: String,
}

/// Payload of a fault produced by a leaf whose target run-queue has been
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("target run queue is gone")]
pub struct RunnerGone;

/// Payload of a fault produced when a value envelope did not hold the
/// type the engine expected. With the typed construction API this cannot
/// happen; it exists so the engine reports rather than aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value envelope did not hold a {expected}")]
pub struct EnvelopeMismatch {
    /// The type the engine expected to find.
    pub expected: &'static str,
}

impl EnvelopeMismatch {
    pub(crate) fn expecting<T>() -> Self {
        Self {
            expected: std::any::type_name::<T>(),
        }
    }
}
