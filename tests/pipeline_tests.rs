// Pipeline Tests
// Evaluation order, short-circuiting, retry bounds and chain immutability,
// exercised through the public chain API.

use anyhow::Result;
use async_trait::async_trait;
use interlace::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Trace = Arc<Mutex<Vec<String>>>;

// Custom decorator that records when its pre and post hooks run
struct Recorder {
    inner: DynOperation<i64, i64>,
    label: &'static str,
    trace: Trace,
}

#[async_trait]
impl Operation<i64, i64> for Recorder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, args: &i64) -> OperationResult<i64> {
        self.trace.lock().push(format!("pre:{}", self.label));
        let result = self.inner.invoke(args).await;
        self.trace.lock().push(format!("post:{}", self.label));
        result
    }
}

fn recorder(label: &'static str, trace: &Trace) -> impl FnOnce(DynOperation<i64, i64>) -> Recorder {
    let trace = Arc::clone(trace);
    move |inner| Recorder {
        inner,
        label,
        trace,
    }
}

fn traced_base(trace: &Trace) -> Chain<i64, i64> {
    let trace = Arc::clone(trace);
    let op = FnOperation::new("increment", move |n: &i64| -> Result<i64> {
        trace.lock().push("base".to_string());
        Ok(n + 1)
    })
    .unwrap();
    Chain::build(op)
}

// Fails until the given attempt number, then doubles its argument
fn flaky(succeed_on: usize) -> (Chain<i64, i64>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let op = FnOperation::new("flaky", move |n: &i64| -> Result<i64> {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < succeed_on {
            anyhow::bail!("attempt {attempt} failed");
        }
        Ok(n * 2)
    })
    .unwrap();
    (Chain::build(op), calls)
}

fn three_quick_attempts() -> RetryPolicy {
    RetryPolicy::new(MaxAttempts::new(3).unwrap(), Duration::from_millis(1))
}

#[tokio::test]
async fn test_hooks_run_outer_to_inner_then_back() {
    let trace: Trace = Arc::default();
    let chain = traced_base(&trace)
        .wrap_with("inner", recorder("inner", &trace))
        .wrap_with("outer", recorder("outer", &trace));

    assert_eq!(chain.invoke(&1).await.unwrap(), 2);
    assert_eq!(
        *trace.lock(),
        vec!["pre:outer", "pre:inner", "base", "post:inner", "post:outer"]
    );
    assert_eq!(
        chain.layers(),
        &[DecoratorKind::Custom("outer"), DecoratorKind::Custom("inner")]
    );
}

#[tokio::test]
async fn test_validator_short_circuits_everything_inside() {
    let trace: Trace = Arc::default();
    let journal = Arc::new(Journal::new());

    let chain = traced_base(&trace)
        .wrap(DecoratorSpec::Deprecator {
            message: "use increment_v2".to_string(),
            journal: Arc::clone(&journal),
        })
        .wrap_with("inner", recorder("inner", &trace))
        .wrap(DecoratorSpec::validator(
            |n: &i64| *n > 0,
            "argument must be a positive integer",
        ))
        .wrap_with("outer", recorder("outer", &trace));

    let err = chain.invoke(&-1).await.unwrap_err();
    match &err {
        PipelineError::Validation { operation, reason } => {
            assert_eq!(operation, "increment");
            assert_eq!(reason, "argument must be a positive integer");
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
    assert_eq!(*trace.lock(), vec!["pre:outer", "post:outer"]);
    assert!(journal.is_empty());

    assert_eq!(chain.invoke(&4).await.unwrap(), 5);
    assert_eq!(journal.len(), 1);
    assert_eq!(journal.entries()[0].level, Level::Warning);
}

#[tokio::test]
async fn test_retry_stops_after_max_attempts() {
    let (base, calls) = flaky(usize::MAX);
    let chain = base.wrap(DecoratorSpec::Retry(three_quick_attempts()));

    let err = chain.invoke(&5).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts(), Some(3));
    assert!(matches!(err.root_cause(), PipelineError::Operation { .. }));
    assert!(err.root_cause().to_string().contains("attempt 3 failed"));
}

#[tokio::test]
async fn test_retry_returns_first_success() {
    let (base, calls) = flaky(3);
    let chain = base.retry(MaxAttempts::new(3).unwrap(), Duration::from_millis(1));

    assert_eq!(chain.invoke(&5).await.unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Later calls start a fresh attempt count
    assert_eq!(chain.invoke(&6).await.unwrap(), 12);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_validation_inside_retry_is_not_retried() {
    let (base, calls) = flaky(1);
    let chain = base
        .wrap(DecoratorSpec::validator(|n: &i64| *n >= 0, "n must be non-negative"))
        .wrap(DecoratorSpec::Retry(three_quick_attempts()));

    let err = chain.invoke(&-2).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    assert_eq!(err.attempts(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_inside_retry_stores_only_success() {
    let (base, calls) = flaky(2);
    let store = Arc::new(ResultStore::new());
    let chain = base
        .wrap(DecoratorSpec::cache_into(Arc::clone(&store)))
        .wrap(DecoratorSpec::Retry(three_quick_attempts()));

    assert_eq!(chain.invoke(&7).await.unwrap(), 14);
    assert_eq!(chain.invoke(&7).await.unwrap(), 14);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = store.stats();
    assert_eq!((stats.hits, stats.misses, stats.failures), (1, 1, 1));
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_observers_do_not_swallow_failures() {
    let (base, _) = flaky(usize::MAX);
    let log = Arc::new(TimingLog::new());
    let chain = base
        .wrap(DecoratorSpec::Timer {
            log: Arc::clone(&log),
        })
        .wrap(DecoratorSpec::Logger);

    let err = chain.invoke(&1).await.unwrap_err();
    assert!(matches!(err, PipelineError::Operation { ref operation, .. } if operation == "flaky"));
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_timer_records_successful_calls() {
    let (base, _) = flaky(1);
    let log = Arc::new(TimingLog::new());
    let chain = base.wrap(DecoratorSpec::Timer {
        log: Arc::clone(&log),
    });

    for n in 0..4 {
        chain.invoke(&n).await.unwrap();
    }
    let summary = log.summary().unwrap();
    assert_eq!(summary.count, 4);
    assert!(summary.min <= summary.avg && summary.avg <= summary.max);
}

#[tokio::test]
async fn test_shared_prefix_serves_independent_chains() {
    let (base, calls) = flaky(1);
    let prefix = base.wrap(DecoratorSpec::cache());
    let logged = prefix.wrap(DecoratorSpec::Logger);
    let guarded = prefix.wrap(DecoratorSpec::validator(|n: &i64| *n < 100, "n too large"));

    assert_eq!(logged.invoke(&2).await.unwrap(), 4);
    assert_eq!(guarded.invoke(&2).await.unwrap(), 4);
    assert!(guarded.invoke(&200).await.is_err());
    assert_eq!(logged.invoke(&200).await.unwrap(), 400);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(prefix.layers(), &[DecoratorKind::Cache]);
    assert_eq!(logged.layers(), &[DecoratorKind::Logger, DecoratorKind::Cache]);
    assert_eq!(
        guarded.layers(),
        &[DecoratorKind::Validator, DecoratorKind::Cache]
    );
}

#[tokio::test]
async fn test_async_base_operation() {
    let op = AsyncFnOperation::new("delayed_echo", |s: String| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, anyhow::Error>(s.to_uppercase())
    })
    .unwrap();
    let chain: Chain<String, String> = ChainBuilder::new(op).cached().logged().build();

    assert_eq!(chain.invoke(&"abc".to_string()).await.unwrap(), "ABC");
    assert_eq!(chain.invoke_traced(&"abc".to_string()).await.unwrap(), "ABC");
}

#[test]
fn test_component_order_sensitivity() {
    let base = ComponentChain::build(BaseComponent::new("Simple coffee", 2.0).unwrap());
    let milk = Adjustment::add("milk", 0.5).unwrap();
    let large = Adjustment::size(Size::Large);

    let milk_then_large = base.wrap(milk.clone()).wrap(large.clone());
    let large_then_milk = base.wrap(large).wrap(milk);

    assert!((milk_then_large.cost() - 3.25).abs() < 1e-9);
    assert!((large_then_milk.cost() - 3.1).abs() < 1e-9);
    assert_eq!(base.describe(), "Simple coffee");
    assert_eq!(base.depth(), 0);
}
