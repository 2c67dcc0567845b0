//! Error taxonomy for the event admin.
//!
//! Errors are classified by *kind*, not by call site: every public operation
//! returns one of a small, closed set of kinds, mirroring the error taxonomy
//! the original dispatcher exposes to its callers (`invalid_argument`,
//! `out_of_memory`, `illegal_state`, an internal thread-spawn failure).

use thiserror::Error;

/// Coarse classification of an [`EventAdminError`], independent of the
/// specific operation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller violated an operation's preconditions.
    InvalidArgument,
    /// An allocation failed; any partial state was rolled back.
    OutOfMemory,
    /// The engine is not in the right state for this operation.
    IllegalState,
    /// A worker thread failed to start.
    InternalThreadFailure,
}

impl ErrorKind {
    /// Stable, upper-snake-case code for diagnostics.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::IllegalState => "ILLEGAL_STATE",
            Self::InternalThreadFailure => "INTERNAL_THREAD_FAILURE",
        }
    }

    /// Whether a caller may usefully retry the same operation.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::IllegalState)
    }
}

/// Error returned by the event admin's public operations.
#[derive(Debug, Error)]
pub enum EventAdminError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("out of memory: {reason}")]
    OutOfMemory { reason: String },

    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("failed to start worker thread {index}: {reason}")]
    InternalThreadFailure { index: usize, reason: String },
}

impl EventAdminError {
    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }

    #[must_use]
    pub fn out_of_memory(reason: impl Into<String>) -> Self {
        Self::OutOfMemory { reason: reason.into() }
    }

    #[must_use]
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState { reason: reason.into() }
    }

    #[must_use]
    pub fn internal_thread_failure(index: usize, reason: impl Into<String>) -> Self {
        Self::InternalThreadFailure { index, reason: reason.into() }
    }

    /// This error's [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::InternalThreadFailure { .. } => ErrorKind::InternalThreadFailure,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Convenience alias used throughout the crate.
pub type EventAdminResult<T> = Result<T, EventAdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_illegal_state_and_retryable() {
        let err = EventAdminError::illegal_state("queue full");
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "ILLEGAL_STATE");
    }

    #[test]
    fn invalid_argument_is_not_retryable() {
        let err = EventAdminError::invalid_argument("missing topic");
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
