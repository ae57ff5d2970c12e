//! Enforcer error types.

use thiserror::Error;

/// Errors that can occur while enforcing infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnforcerError {
    /// Resource not found. Expected steady-state signal, never logged as an error.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limiting or eventual-consistency lag on the remote service.
    #[error("transient service error during {operation}: {message}")]
    TransientService { operation: String, message: String },

    /// Non-retryable remote service failure.
    #[error("service error during {operation}: {message}")]
    Service { operation: String, message: String },

    /// HTTP transport failure (connection refused, timeout, ...).
    #[error("http error for {url}: {message}")]
    Http { url: String, message: String },

    /// A poll exhausted its attempts.
    #[error("{what}: timed out after {attempts} attempts (last observed: {last_observed})")]
    ConvergenceTimeout {
        what: String,
        attempts: u32,
        last_observed: String,
    },

    /// A poll condition can never become true.
    #[error("{what} can never converge: {reason}")]
    ConvergenceFailed { what: String, reason: String },

    /// The remote resource is in a shape the diff engine cannot reason about.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EnforcerError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientService {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn service(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Only transient service errors are eligible for a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientService { .. })
    }
}

/// Result type for enforcer operations.
pub type Result<T> = std::result::Result<T, EnforcerError>;
