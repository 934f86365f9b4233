//! Error types for the policy engine.

use thiserror::Error;

use veilgate_core::Timestamp;

/// Errors raised by policy administration and enforcement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The evaluator denied the operation. The message is fixed and never
    /// names the operation.
    #[error("No Permission!")]
    Denied {
        /// The operation that was denied.
        operation: String,
    },

    /// A rule was submitted for the null principal.
    #[error("invalid rule caller: the zero address cannot hold a rule")]
    ZeroCaller,

    /// A rule was submitted with an empty operation name.
    #[error("invalid rule: operation must not be empty")]
    EmptyOperation,

    /// Both window bounds are set but do not describe a non-empty interval.
    #[error("invalid validity window: not_before {not_before} must precede not_after {not_after}")]
    InvalidWindow {
        not_before: Timestamp,
        not_after: Timestamp,
    },
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
