// Decorator Chains
// Type-erased composition of behavioral decorators around a base operation.
// A chain is an immutable singly-linked list of nodes: every `wrap` allocates
// a new outer node that holds one `Arc` to the previous head.

use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::contracts::Operation;
use crate::error::OperationResult;
use crate::journal::{self, Journal};
use crate::observability::with_trace_id;
use crate::types::MaxAttempts;
use crate::validation::{predicate, Predicate};
use crate::wrappers::{
    CachedOperation, DeprecatedOperation, LoggedOperation, ResultStore, RetryPolicy,
    RetryableOperation, TimedOperation, TimingLog, ValidatedOperation,
};

pub use crate::component::{Adjusted, Adjustment, ComponentChain};

/// Shared handle to any node of a chain
pub type DynOperation<A, R> = Arc<dyn Operation<A, R>>;

/// What a decorator may do around the call it wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Runs before the inner call, outer to inner
    Pre,
    /// Runs after the inner call, inner to outer
    Post,
    /// May return without calling inward at all
    ShortCircuit,
    /// May change the outcome (re-invoke, re-classify a failure)
    Transform,
}

/// Identity of one layer in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoratorKind {
    Logger,
    Timer,
    Cache,
    Retry,
    Validator,
    Deprecator,
    Custom(&'static str),
}

impl DecoratorKind {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            DecoratorKind::Logger | DecoratorKind::Timer => &[Pre, Post],
            DecoratorKind::Cache => &[ShortCircuit, Post],
            DecoratorKind::Retry => &[Transform],
            DecoratorKind::Validator => &[Pre, ShortCircuit],
            DecoratorKind::Deprecator => &[Pre],
            DecoratorKind::Custom(_) => &[Pre, Post, ShortCircuit, Transform],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl fmt::Display for DecoratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoratorKind::Logger => f.write_str("logger"),
            DecoratorKind::Timer => f.write_str("timer"),
            DecoratorKind::Cache => f.write_str("cache"),
            DecoratorKind::Retry => f.write_str("retry"),
            DecoratorKind::Validator => f.write_str("validator"),
            DecoratorKind::Deprecator => f.write_str("deprecator"),
            DecoratorKind::Custom(name) => f.write_str(name),
        }
    }
}

/// A decorator kind together with its configuration
pub enum DecoratorSpec<A, R> {
    Logger,
    Timer { log: Arc<TimingLog> },
    Cache(CacheLayer<A, R>),
    Retry(RetryPolicy),
    Validator { predicate: Predicate<A>, reason: String },
    Deprecator { message: String, journal: Arc<Journal> },
}

impl<A, R> DecoratorSpec<A, R> {
    pub fn kind(&self) -> DecoratorKind {
        match self {
            DecoratorSpec::Logger => DecoratorKind::Logger,
            DecoratorSpec::Timer { .. } => DecoratorKind::Timer,
            DecoratorSpec::Cache(_) => DecoratorKind::Cache,
            DecoratorSpec::Retry(_) => DecoratorKind::Retry,
            DecoratorSpec::Validator { .. } => DecoratorKind::Validator,
            DecoratorSpec::Deprecator { .. } => DecoratorKind::Deprecator,
        }
    }

    /// Timer recording into a fresh log
    pub fn timer() -> Self {
        DecoratorSpec::Timer {
            log: Arc::new(TimingLog::new()),
        }
    }

    /// Constant-delay retry
    pub fn retry(max_attempts: u32, delay_seconds: f64) -> anyhow::Result<Self> {
        let policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .delay_seconds(delay_seconds)?
            .build()?;
        Ok(DecoratorSpec::Retry(policy))
    }

    pub fn validator<F>(check: F, reason: impl Into<String>) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        DecoratorSpec::Validator {
            predicate: predicate(check),
            reason: reason.into(),
        }
    }

    /// Deprecation notice recorded in the process-wide journal
    pub fn deprecator(message: impl Into<String>) -> Self {
        DecoratorSpec::Deprecator {
            message: message.into(),
            journal: journal::global(),
        }
    }
}

impl<A, R> DecoratorSpec<A, R>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Cache into a fresh private store
    pub fn cache() -> Self {
        Self::cache_into(Arc::new(ResultStore::new()))
    }

    /// Cache into a store the caller keeps a handle to
    pub fn cache_into(store: Arc<ResultStore<A, R>>) -> Self {
        DecoratorSpec::Cache(CacheLayer::new(store))
    }
}

/// Cache decorator configuration.
///
/// Only constructible for hashable arguments and cloneable results, so
/// chains without a cache layer carry no such bounds.
pub struct CacheLayer<A, R> {
    decorate: Box<dyn FnOnce(DynOperation<A, R>) -> DynOperation<A, R> + Send>,
}

impl<A, R> CacheLayer<A, R>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<ResultStore<A, R>>) -> Self {
        Self {
            decorate: Box::new(move |inner| -> DynOperation<A, R> {
                Arc::new(CachedOperation::with_store(inner, store))
            }),
        }
    }
}

impl<A, R> fmt::Debug for DecoratorSpec<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoratorSpec::Retry(policy) => f.debug_tuple("Retry").field(policy).finish(),
            DecoratorSpec::Validator { reason, .. } => {
                f.debug_struct("Validator").field("reason", reason).finish()
            }
            DecoratorSpec::Deprecator { message, .. } => {
                f.debug_struct("Deprecator").field("message", message).finish()
            }
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Fixed, ordered nesting of decorators around a base operation.
///
/// Invocation enters the outermost layer first. A chain never changes after
/// construction; `wrap` returns a new chain that shares this one as its inner
/// prefix, so one prefix can back any number of independent chains.
pub struct Chain<A, R> {
    head: DynOperation<A, R>,
    layers: Vec<DecoratorKind>,
}

impl<A, R> Clone for Chain<A, R> {
    fn clone(&self) -> Self {
        Self {
            head: Arc::clone(&self.head),
            layers: self.layers.clone(),
        }
    }
}

impl<A, R> Chain<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Chain with no decorators around `base`
    pub fn build<O>(base: O) -> Self
    where
        O: Operation<A, R> + 'static,
    {
        Self {
            head: Arc::new(base),
            layers: Vec::new(),
        }
    }

    /// New chain with one more decorator outside this one
    pub fn wrap(&self, spec: DecoratorSpec<A, R>) -> Self {
        let inner = Arc::clone(&self.head);
        let kind = spec.kind();

        let head: DynOperation<A, R> = match spec {
            DecoratorSpec::Logger => Arc::new(LoggedOperation::new(inner)),
            DecoratorSpec::Timer { log } => Arc::new(TimedOperation::with_log(inner, log)),
            DecoratorSpec::Cache(layer) => (layer.decorate)(inner),
            DecoratorSpec::Retry(policy) => Arc::new(RetryableOperation::with_policy(inner, policy)),
            DecoratorSpec::Validator { predicate, reason } => {
                Arc::new(ValidatedOperation::new(inner, predicate, reason))
            }
            DecoratorSpec::Deprecator { message, journal } => {
                Arc::new(DeprecatedOperation::with_journal(inner, message, journal))
            }
        };

        self.push(kind, head)
    }

    /// New chain with a caller-supplied decorator outside this one
    pub fn wrap_with<W, F>(&self, name: &'static str, decorate: F) -> Self
    where
        F: FnOnce(DynOperation<A, R>) -> W,
        W: Operation<A, R> + 'static,
    {
        let head: DynOperation<A, R> = Arc::new(decorate(Arc::clone(&self.head)));
        self.push(DecoratorKind::Custom(name), head)
    }

    fn push(&self, kind: DecoratorKind, head: DynOperation<A, R>) -> Self {
        let mut layers = Vec::with_capacity(self.layers.len() + 1);
        layers.push(kind);
        layers.extend_from_slice(&self.layers);
        Self { head, layers }
    }

    /// Shorthand for wrapping a constant-delay retry
    pub fn retry(&self, max_attempts: MaxAttempts, delay: Duration) -> Self {
        self.wrap(DecoratorSpec::Retry(RetryPolicy::new(max_attempts, delay)))
    }

    /// Run the chain inside a fresh trace context
    pub async fn invoke_traced(&self, args: &A) -> OperationResult<R> {
        with_trace_id(self.head.name(), self.head.invoke(args)).await
    }

    /// Layers from outermost to innermost
    pub fn layers(&self) -> &[DecoratorKind] {
        &self.layers
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Outermost node, for embedding this chain in another structure
    pub fn as_operation(&self) -> DynOperation<A, R> {
        Arc::clone(&self.head)
    }
}

#[async_trait]
impl<A, R> Operation<A, R> for Chain<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    fn name(&self) -> &str {
        self.head.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        self.head.invoke(args).await
    }
}

impl<A, R> fmt::Debug for Chain<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("layers", &self.layers)
            .finish()
    }
}
