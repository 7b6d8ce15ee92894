// Validation Layer
// Runtime checks that run before an operation is allowed to execute,
// plus reusable argument predicates for guards.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::PipelineError;

/// Argument predicate evaluated by a validation guard
pub type Predicate<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// Wrap a closure as a shareable predicate
pub fn predicate<A, F>(f: F) -> Predicate<A>
where
    F: Fn(&A) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Validation context for better error messages
#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: BTreeMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Reject with a `Validation` error naming the operation when `condition` is false
    pub fn validate(&self, condition: bool, message: &str) -> Result<(), PipelineError> {
        if !condition {
            debug!(
                operation = %self.operation,
                attributes = ?self.attributes,
                "Validation failed: {}", message
            );
            return Err(PipelineError::validation(&self.operation, message));
        }
        Ok(())
    }
}

/// Common argument predicates
pub mod rules {
    /// Strictly greater than the type's zero value
    pub fn positive<T>(value: &T) -> bool
    where
        T: PartialOrd + Default,
    {
        *value > T::default()
    }

    /// Every element strictly positive (an empty slice passes)
    pub fn all_positive<T>(values: &[T]) -> bool
    where
        T: PartialOrd + Default,
    {
        values.iter().all(positive)
    }

    /// Non-blank text
    pub fn non_empty(value: &str) -> bool {
        !value.trim().is_empty()
    }

    /// Inclusive range check
    pub fn within<T>(min: T, max: T) -> impl Fn(&T) -> bool + Send + Sync
    where
        T: PartialOrd + Send + Sync,
    {
        move |value: &T| *value >= min && *value <= max
    }

    /// Finite and not negative
    pub fn non_negative_amount(value: f64) -> bool {
        value.is_finite() && value >= 0.0
    }
}
