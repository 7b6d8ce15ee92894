// Centralized Observability Infrastructure
// Structured logging, metrics and trace context for pipeline invocations.

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::error::OperationResult;

// Global atomic counters for metrics
static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static FAILURE_COUNTER: AtomicU64 = AtomicU64::new(0);
static CACHE_HIT_COUNTER: AtomicU64 = AtomicU64::new(0);
static CACHE_MISS_COUNTER: AtomicU64 = AtomicU64::new(0);
static RETRY_COUNTER: AtomicU64 = AtomicU64::new(0);
static REJECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

// Named metrics reported through `record_metric`
static NAMED_COUNTERS: Lazy<DashMap<&'static str, u64>> = Lazy::new(DashMap::new);
static NAMED_TIMERS: Lazy<DashMap<&'static str, TimerTotals>> = Lazy::new(DashMap::new);

#[derive(Debug, Clone, Copy, Default)]
struct TimerTotals {
    count: u64,
    total: Duration,
}

/// Initialize the logging and tracing infrastructure
/// This should be called once at application startup
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("interlace=debug,info")
    } else {
        EnvFilter::new("interlace=info,warn")
    };

    // Quiet always wins over RUST_LOG
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("Interlace observability initialized");
            }
            Ok(())
        }
        Err(_) => {
            // Already initialized, which is fine in test environments
            Ok(())
        }
    }
}

/// Events emitted by decorators for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    Invoked { operation: String },
    CacheHit { operation: String },
    CacheMiss { operation: String },
    RetryScheduled { operation: String, attempt: u32, delay_ms: u64 },
    RetriesExhausted { operation: String, attempts: u32 },
    Rejected { operation: String, reason: String },
    Deprecated { operation: String, message: String },
}

/// Metric types for performance monitoring
#[derive(Debug, Clone)]
pub enum MetricType {
    Counter {
        name: &'static str,
        value: u64,
    },
    Timer {
        name: &'static str,
        duration: Duration,
    },
}

/// Operation context for tracing through the system
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub operation: String,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            operation: operation.into(),
            start_time: Instant::now(),
        }
    }

    /// Context for a call made under an existing trace
    pub fn within(trace_id: Uuid, operation: impl Into<String>) -> Self {
        Self {
            trace_id,
            ..Self::new(operation)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Run `f` inside a fresh trace context, logging start, outcome and duration
pub async fn with_trace_id<F, T>(operation: &str, f: F) -> OperationResult<T>
where
    F: std::future::Future<Output = OperationResult<T>>,
{
    let ctx = OperationContext::new(operation);

    info!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        "Starting operation: {}", operation
    );

    let start = Instant::now();
    let result = f.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                "Operation completed successfully: {}", operation
            );
            record_metric(MetricType::Timer {
                name: "chain.duration",
                duration: elapsed,
            });
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                elapsed_ms = elapsed.as_millis(),
                error = %e,
                "Operation failed: {}", operation
            );
            record_metric(MetricType::Counter {
                name: "chain.errors",
                value: 1,
            });
        }
    }

    result
}

/// Log a pipeline event with full context and bump the matching counter
pub fn log_event(ctx: &OperationContext, event: &PipelineEvent) {
    match event {
        PipelineEvent::Rejected { .. }
        | PipelineEvent::Deprecated { .. }
        | PipelineEvent::RetryScheduled { .. } => {
            warn!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = ctx.elapsed().as_millis(),
                "Pipeline event: {:?}", event
            );
        }
        PipelineEvent::RetriesExhausted { .. } => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = ctx.elapsed().as_millis(),
                "Pipeline event: {:?}", event
            );
        }
        _ => {
            debug!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                operation = %ctx.operation,
                elapsed_ms = ctx.elapsed().as_millis(),
                "Pipeline event: {:?}", event
            );
        }
    }

    let counter = match event {
        PipelineEvent::Invoked { .. } => &INVOCATION_COUNTER,
        PipelineEvent::CacheHit { .. } => &CACHE_HIT_COUNTER,
        PipelineEvent::CacheMiss { .. } => &CACHE_MISS_COUNTER,
        PipelineEvent::RetryScheduled { .. } => &RETRY_COUNTER,
        PipelineEvent::RetriesExhausted { .. } => &FAILURE_COUNTER,
        PipelineEvent::Rejected { .. } => &REJECTION_COUNTER,
        PipelineEvent::Deprecated { .. } => return,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Record a metric and fold it into the process-wide totals for its name
pub fn record_metric(metric: MetricType) {
    match metric {
        MetricType::Counter { name, value } => {
            debug!("metric.counter {} = {}", name, value);
            *NAMED_COUNTERS.entry(name).or_insert(0) += value;
        }
        MetricType::Timer { name, duration } => {
            debug!("metric.timer {} = {:?}", name, duration);
            let mut totals = NAMED_TIMERS.entry(name).or_default();
            totals.count += 1;
            totals.total += duration;
        }
    }
}

/// Get current metrics snapshot
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "invocations": {
            "total": INVOCATION_COUNTER.load(Ordering::Relaxed),
            "exhausted": FAILURE_COUNTER.load(Ordering::Relaxed),
            "rejected": REJECTION_COUNTER.load(Ordering::Relaxed),
            "retries": RETRY_COUNTER.load(Ordering::Relaxed),
        },
        "cache": {
            "hits": CACHE_HIT_COUNTER.load(Ordering::Relaxed),
            "misses": CACHE_MISS_COUNTER.load(Ordering::Relaxed),
        },
        "counters": named_counters(),
        "timers": named_timers(),
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn named_counters() -> serde_json::Map<String, serde_json::Value> {
    NAMED_COUNTERS
        .iter()
        .map(|entry| (entry.key().to_string(), serde_json::json!(*entry.value())))
        .collect()
}

fn named_timers() -> serde_json::Map<String, serde_json::Value> {
    NAMED_TIMERS
        .iter()
        .map(|entry| {
            let totals = entry.value();
            (
                entry.key().to_string(),
                serde_json::json!({
                    "count": totals.count,
                    "total_ms": totals.total.as_secs_f64() * 1000.0,
                }),
            )
        })
        .collect()
}
