//! Error taxonomy shared by both indexes.

use thiserror::Error;

/// Result type alias using [`IndexError`].
pub type Result<T> = std::result::Result<T, IndexError>;

/// Outcome codes returned by `HashIndex` and `OrderedIndex` operations.
///
/// Everything except [`IndexError::InvariantViolation`] is an ordinary,
/// recoverable result the caller is expected to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    // -------------------------------------------------------------------------
    // Lookup outcomes
    // -------------------------------------------------------------------------
    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    AlreadyExists,

    // -------------------------------------------------------------------------
    // Resize outcomes
    // -------------------------------------------------------------------------
    /// Resize was refused; retry later (e.g. after rehashing completes).
    #[error("resize rejected: {reason}")]
    ResizeRejected { reason: &'static str },

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Fatal
    // -------------------------------------------------------------------------
    /// The structure is corrupt. Do not retry; the instance can no longer be trusted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl IndexError {
    /// True for errors that indicate structural corruption rather than a normal miss.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::InvariantViolation(_))
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(violation = %msg, "index invariant violated");
        IndexError::InvariantViolation(msg)
    }
}
