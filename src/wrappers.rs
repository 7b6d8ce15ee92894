// Wrapper Components
// Behavioral decorators for operations: logging, timing, caching, retries,
// argument validation and deprecation notices. Each wrapper owns exactly one
// inner operation and implements `Operation` itself, so wrappers nest freely.

pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contracts::Operation;
use crate::error::{OperationResult, PipelineError};
use crate::journal::{self, Journal};
use crate::memo::{CacheStats, CallKey, MemoizationStore, Provenance};
use crate::observability::*;
use crate::types::OperationName;
use crate::validation::{Predicate, ValidationContext};

pub use retry::{FatalRule, RetryPhase, RetryPolicy, RetryState};

fn into_pipeline_error(operation: &str, err: anyhow::Error) -> PipelineError {
    // Errors raised by a nested chain keep their classification
    match err.downcast::<PipelineError>() {
        Ok(pipeline) => pipeline,
        Err(other) => PipelineError::operation(operation, other),
    }
}

/// Base operation backed by a synchronous closure
pub struct FnOperation<F> {
    name: OperationName,
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new<A, R>(name: impl Into<String>, f: F) -> anyhow::Result<Self>
    where
        F: Fn(&A) -> anyhow::Result<R>,
    {
        Ok(Self {
            name: OperationName::new(name)?,
            f,
        })
    }
}

#[async_trait]
impl<A, R, F> Operation<A, R> for FnOperation<F>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&A) -> anyhow::Result<R> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        (self.f)(args).map_err(|e| into_pipeline_error(self.name.as_str(), e))
    }
}

/// Base operation backed by an async closure. The closure receives its own
/// copy of the arguments so the returned future can outlive the borrow.
pub struct AsyncFnOperation<F> {
    name: OperationName,
    f: F,
}

impl<F> AsyncFnOperation<F> {
    pub fn new<A, R, Fut>(name: impl Into<String>, f: F) -> anyhow::Result<Self>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        Ok(Self {
            name: OperationName::new(name)?,
            f,
        })
    }
}

#[async_trait]
impl<A, R, F, Fut> Operation<A, R> for AsyncFnOperation<F>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<R>> + Send,
{
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        (self.f)(args.clone())
            .await
            .map_err(|e| into_pipeline_error(self.name.as_str(), e))
    }
}

/// Operation wrapper that logs the start and successful finish of every call
pub struct LoggedOperation<O> {
    inner: O,
    trace_id: Uuid,
    invocations: AtomicU64,
}

impl<O> LoggedOperation<O> {
    /// Wrap an operation with logging
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            trace_id: Uuid::new_v4(),
            invocations: AtomicU64::new(0),
        }
    }

    /// Trace ID shared by every call through this wrapper
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Number of calls that have entered this wrapper
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<A, R, O> Operation<A, R> for LoggedOperation<O>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let invocation = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        let ctx = OperationContext::within(self.trace_id, self.inner.name());

        info!(
            trace_id = %ctx.trace_id,
            span_id = %ctx.span_id,
            invocation,
            "Starting execution of {}", ctx.operation
        );

        let result = self.inner.invoke(args).await;

        // Post-hook runs on success only; failures pass straight through
        if result.is_ok() {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = ctx.elapsed().as_millis(),
                "Finished execution of {}", ctx.operation
            );
            log_event(
                &ctx,
                &PipelineEvent::Invoked {
                    operation: ctx.operation.clone(),
                },
            );
        }

        result
    }
}

/// Summary of recorded call durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: u64,
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
}

/// Running timing statistics for successful calls, shareable between a
/// timer and its owner. Storage stays constant however many calls are made.
#[derive(Debug)]
pub struct TimingLog {
    count: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl TimingLog {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    pub fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Number of calls recorded
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn summary(&self) -> Option<TimingSummary> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        let min = Duration::from_nanos(self.min_nanos.load(Ordering::Relaxed));
        let max = Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed));
        let avg = Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed) / count);
        // Concurrent recording can leave the average briefly outside [min, max]
        Some(TimingSummary {
            count,
            min,
            avg: avg.clamp(min, max),
            max,
        })
    }
}

impl Default for TimingLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Operation wrapper that measures elapsed time of successful calls
pub struct TimedOperation<O> {
    inner: O,
    log: Arc<TimingLog>,
}

impl<O> TimedOperation<O> {
    pub fn new(inner: O) -> Self {
        Self::with_log(inner, Arc::new(TimingLog::new()))
    }

    /// Record into a log the caller keeps a handle to
    pub fn with_log(inner: O, log: Arc<TimingLog>) -> Self {
        Self { inner, log }
    }

    pub fn timing_log(&self) -> Arc<TimingLog> {
        Arc::clone(&self.log)
    }

    pub fn timing_stats(&self) -> Option<TimingSummary> {
        self.log.summary()
    }
}

#[async_trait]
impl<A, R, O> Operation<A, R> for TimedOperation<O>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let start = Instant::now();
        let result = self.inner.invoke(args).await;

        if result.is_ok() {
            let elapsed = start.elapsed();
            self.log.record(elapsed);
            info!(
                "{} took {:.6} seconds to run",
                self.inner.name(),
                elapsed.as_secs_f64()
            );
            record_metric(MetricType::Timer {
                name: "operation.duration",
                duration: elapsed,
            });
        }

        result
    }
}

/// Shared result store used by caching wrappers
pub type ResultStore<A, R> = MemoizationStore<CallKey<A>, R>;

/// Operation wrapper that memoizes results by operation name and arguments.
///
/// Only successful results are stored. Concurrent calls with the same
/// arguments run the inner operation once.
pub struct CachedOperation<O, A, R> {
    inner: O,
    store: Arc<ResultStore<A, R>>,
}

impl<O, A, R> CachedOperation<O, A, R>
where
    A: Eq + Hash + Clone + Send + Sync,
    R: Clone + Send + Sync,
{
    /// Cache into a private store
    pub fn new(inner: O) -> Self {
        Self::with_store(inner, Arc::new(MemoizationStore::new()))
    }

    /// Cache into a store owned by the composing code
    pub fn with_store(inner: O, store: Arc<ResultStore<A, R>>) -> Self {
        Self { inner, store }
    }

    pub fn store(&self) -> Arc<ResultStore<A, R>> {
        Arc::clone(&self.store)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }
}

#[async_trait]
impl<O, A, R> Operation<A, R> for CachedOperation<O, A, R>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let name = self.inner.name();
        let ctx = OperationContext::new(name);
        let key = CallKey::new(name, args.clone());

        let (value, provenance) = self
            .store
            .get_or_compute_tracked(key, || self.inner.invoke(args))
            .await?;

        match provenance {
            Provenance::Computed => {
                debug!("Computed result for {}", name);
                log_event(
                    &ctx,
                    &PipelineEvent::CacheMiss {
                        operation: name.to_string(),
                    },
                );
            }
            Provenance::Cached | Provenance::Shared => {
                debug!("Using cached result for {}", name);
                log_event(
                    &ctx,
                    &PipelineEvent::CacheHit {
                        operation: name.to_string(),
                    },
                );
            }
        }

        Ok(value)
    }
}

/// Operation wrapper that re-invokes its inner operation on retryable failure
pub struct RetryableOperation<O> {
    inner: O,
    policy: RetryPolicy,
}

impl<O> RetryableOperation<O> {
    /// Retry with the default policy (3 attempts, 1s constant delay)
    pub fn new(inner: O) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: O, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<A, R, O> Operation<A, R> for RetryableOperation<O>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let name = self.inner.name();
        let max = self.policy.max_attempts();
        let mut state = RetryState::new(&self.policy);

        loop {
            state.begin_attempt();

            match self.inner.invoke(args).await {
                Ok(result) => {
                    if state.attempt() > 1 {
                        info!("Operation {} succeeded after {} attempts", name, state.attempt());
                    }
                    state.finish(RetryPhase::Success);
                    return Ok(result);
                }
                Err(e) if self.policy.is_fatal(&e) => {
                    debug!(
                        "Operation {} failed with a fatal error on attempt {}: {}",
                        name,
                        state.attempt(),
                        e
                    );
                    state.finish(RetryPhase::Fatal);
                    return Err(e);
                }
                Err(e) if state.is_last_attempt(&self.policy) => {
                    error!(
                        "Operation {} failed after {} attempts: {}",
                        name,
                        state.attempt(),
                        e
                    );
                    state.finish(RetryPhase::Exhausted);
                    log_event(
                        &OperationContext::new(name),
                        &PipelineEvent::RetriesExhausted {
                            operation: name.to_string(),
                            attempts: state.attempt(),
                        },
                    );
                    return Err(PipelineError::Exhausted {
                        operation: name.to_string(),
                        attempts: state.attempt(),
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        "Operation {} failed (attempt {}/{}): {}",
                        name,
                        state.attempt(),
                        max,
                        e
                    );
                    let wait = state.schedule_retry(&self.policy);
                    log_event(
                        &OperationContext::new(name),
                        &PipelineEvent::RetryScheduled {
                            operation: name.to_string(),
                            attempt: state.attempt(),
                            delay_ms: wait.as_millis() as u64,
                        },
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Operation wrapper that checks arguments before delegating
pub struct ValidatedOperation<O, A> {
    inner: O,
    predicate: Predicate<A>,
    reason: String,
}

impl<O, A> ValidatedOperation<O, A> {
    /// Guard `inner` with `predicate`; `reason` is reported on rejection
    pub fn new(inner: O, predicate: Predicate<A>, reason: impl Into<String>) -> Self {
        Self {
            inner,
            predicate,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<O, A, R> Operation<A, R> for ValidatedOperation<O, A>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let ctx = ValidationContext::new(self.inner.name());

        if let Err(rejection) = ctx.validate((self.predicate)(args), &self.reason) {
            log_event(
                &OperationContext::new(self.inner.name()),
                &PipelineEvent::Rejected {
                    operation: self.inner.name().to_string(),
                    reason: self.reason.clone(),
                },
            );
            return Err(rejection);
        }

        self.inner.invoke(args).await
    }
}

/// Operation wrapper that emits a deprecation notice before every call
pub struct DeprecatedOperation<O> {
    inner: O,
    message: String,
    journal: Arc<Journal>,
}

impl<O> DeprecatedOperation<O> {
    /// Notices go to the process-wide journal
    pub fn new(inner: O, message: impl Into<String>) -> Self {
        Self::with_journal(inner, message, journal::global())
    }

    pub fn with_journal(inner: O, message: impl Into<String>, journal: Arc<Journal>) -> Self {
        Self {
            inner,
            message: message.into(),
            journal,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
impl<A, R, O> Operation<A, R> for DeprecatedOperation<O>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        let name = self.inner.name();
        log_event(
            &OperationContext::new(name),
            &PipelineEvent::Deprecated {
                operation: name.to_string(),
                message: self.message.clone(),
            },
        );
        self.journal.warning(format!("{}: {}", name, self.message));

        self.inner.invoke(args).await
    }
}

/// Compose the standard wrappers in their usual order
pub type FullyWrappedOperation<O, A, R> = LoggedOperation<
    TimedOperation<ValidatedOperation<RetryableOperation<CachedOperation<O, A, R>>, A>>,
>;

/// Helper to create a fully wrapped operation.
///
/// Validation sits outside the retry loop so a rejection is never retried;
/// the cache sits innermost so only successful attempts are stored.
pub fn create_wrapped_operation<O, A, R>(
    inner: O,
    predicate: Predicate<A>,
    reason: impl Into<String>,
    policy: RetryPolicy,
    store: Arc<ResultStore<A, R>>,
) -> FullyWrappedOperation<O, A, R>
where
    A: Eq + Hash + Clone + Send + Sync,
    R: Clone + Send + Sync,
{
    let cached = CachedOperation::with_store(inner, store);
    let retryable = RetryableOperation::with_policy(cached, policy);
    let validated = ValidatedOperation::new(retryable, predicate, reason);
    let timed = TimedOperation::new(validated);

    LoggedOperation::new(timed)
}
