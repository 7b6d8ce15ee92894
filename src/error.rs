// Error Taxonomy
// The closed set of failures a pipeline can surface to its caller.

use thiserror::Error;

/// Every failure a chain can produce.
///
/// Wrappers never invent new kinds: an inner failure travels outward as-is
/// unless the wrapper exists to re-classify it (validation, retry exhaustion).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A guard rejected the arguments before the wrapped operation ran.
    #[error("Invalid arguments for {operation}: {reason}")]
    Validation { operation: String, reason: String },

    /// The base operation failed.
    #[error("Operation {operation} failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Retries ran out. `last` is the failure of the final attempt.
    #[error("Operation {operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<PipelineError>,
    },

    /// A memoized computation (or singleton constructor) failed.
    /// The slot is left empty, so the next caller may try again.
    #[error("Computation for {key} failed: {source}")]
    ComputationFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Build an operation failure from any error value
    pub fn operation(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Operation {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Build a validation rejection
    pub fn validation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Validation failures are never worth retrying; everything else is,
    /// unless a retry policy marks it fatal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// The most specific failure, looking through retry exhaustion.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Number of attempts made, if this failure came out of a retry loop
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Name of the operation (or cache key) the failure belongs to
    pub fn operation_name(&self) -> &str {
        match self {
            Self::Validation { operation, .. }
            | Self::Operation { operation, .. }
            | Self::Exhausted { operation, .. } => operation,
            Self::ComputationFailure { key, .. } => key,
        }
    }

    /// Check whether the underlying cause is of type `E`.
    pub fn cause_is<E>(&self) -> bool
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self.root_cause() {
            Self::Operation { source, .. } | Self::ComputationFailure { source, .. } => {
                source.downcast_ref::<E>().is_some()
            }
            _ => false,
        }
    }
}

/// Result type returned by every operation in a chain
pub type OperationResult<R> = std::result::Result<R, PipelineError>;
