//! Error types for the Weft runtime.

use thiserror::Error;

/// Errors that can occur during run-queue operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been released and no longer accepts work.
    #[error("run queue has been released")]
    Released,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueueError::Released;
        assert_eq!(err.to_string(), "run queue has been released");
    }
}
