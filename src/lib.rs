// Interlace - Composable Interception Pipelines
// Root library module

pub mod builders;
pub mod chain;
pub mod component;
pub mod config;
pub mod contracts;
pub mod error;
pub mod factory;
pub mod journal;
pub mod memo;
pub mod observability;
pub mod types;
pub mod validation;
pub mod wrappers;

// Re-export key types
pub use observability::{
    get_metrics, init_logging, init_logging_with_level, log_event, record_metric, with_trace_id,
    MetricType, OperationContext, PipelineEvent,
};

pub use contracts::{Component, Operation};

pub use error::{OperationResult, PipelineError};

// Re-export validated types
pub use types::{MaxAttempts, OperationName, ShotCount, Size};

pub use validation::{predicate, Predicate, ValidationContext};

// Re-export memoization
pub use memo::registry::SingletonRegistry;
pub use memo::{CacheStats, CallKey, MemoizationStore, Provenance};

pub use journal::{Journal, JournalEntry, Level};

// Re-export components and chains
pub use chain::{CacheLayer, Capability, Chain, DecoratorKind, DecoratorSpec, DynOperation};
pub use component::{Adjusted, Adjustment, BaseComponent, ComponentChain, SHOT_COST};

// Re-export builders
pub use builders::{ChainBuilder, ComponentBuilder, RetryPolicyBuilder};

// Re-export wrappers
pub use wrappers::{
    create_wrapped_operation, AsyncFnOperation, CachedOperation, DeprecatedOperation,
    FnOperation, FullyWrappedOperation, LoggedOperation, ResultStore, RetryPhase, RetryPolicy,
    RetryState, RetryableOperation, TimedOperation, TimingLog, TimingSummary, ValidatedOperation,
};

pub use config::PipelineConfig;
pub use factory::{configure_journal, create_guarded_pipeline, create_standard_pipeline};
