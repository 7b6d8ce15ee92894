// Retry policy and per-invocation retry state

use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::builders::RetryPolicyBuilder;
use crate::error::PipelineError;
use crate::types::MaxAttempts;

/// Rule that marks a failure as fatal (stop retrying immediately)
pub type FatalRule = Arc<dyn Fn(&PipelineError) -> bool + Send + Sync>;

/// How a retrying decorator re-invokes its inner operation.
///
/// Every failure is retryable except validation rejections and whatever the
/// configured fatal rules match. Delay is constant unless a backoff factor
/// above 1.0 is configured.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(crate) max_attempts: MaxAttempts,
    pub(crate) delay: Duration,
    pub(crate) backoff_factor: f64,
    pub(crate) max_delay: Duration,
    pub(crate) jitter: Option<Duration>,
    pub(crate) fatal_rules: Vec<FatalRule>,
}

impl RetryPolicy {
    /// Constant-delay policy
    pub fn new(max_attempts: MaxAttempts, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            ..Self::default()
        }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Stop retrying at once when the underlying cause is an `E`
    pub fn fatal_on<E>(mut self) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.fatal_rules
            .push(Arc::new(|err: &PipelineError| err.cause_is::<E>()));
        self
    }

    pub fn fatal_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&PipelineError) -> bool + Send + Sync + 'static,
    {
        self.fatal_rules.push(Arc::new(rule));
        self
    }

    /// Whether `err` ends the retry loop at once
    pub fn is_fatal(&self, err: &PipelineError) -> bool {
        !err.is_retryable() || self.fatal_rules.iter().any(|rule| rule(err))
    }

    /// Delay to use after `current`, applying backoff growth if configured
    pub fn next_delay(&self, current: Duration) -> Duration {
        if self.backoff_factor > 1.0 {
            std::cmp::min(current.mul_f64(self.backoff_factor), self.max_delay)
        } else {
            current
        }
    }

    /// `delay` plus a random amount up to the configured jitter bound
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        match self.jitter {
            Some(bound) if !bound.is_zero() => {
                let extra = rand::thread_rng().gen_range(0..=bound.as_millis() as u64);
                delay + Duration::from_millis(extra)
            }
            _ => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::default(),
            delay: Duration::from_secs(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: None,
            fatal_rules: Vec::new(),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts.get())
            .field("delay", &self.delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("fatal_rules", &self.fatal_rules.len())
            .finish()
    }
}

/// Where a single invocation is in the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Ready,
    Attempting,
    RetryWait,
    Success,
    Exhausted,
    Fatal,
}

/// Per-invocation retry bookkeeping. Never shared between calls.
#[derive(Debug)]
pub struct RetryState {
    attempt: u32,
    delay: Duration,
    phase: RetryPhase,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            delay: policy.delay,
            phase: RetryPhase::Ready,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempt += 1;
        self.phase = RetryPhase::Attempting;
    }

    pub(crate) fn is_last_attempt(&self, policy: &RetryPolicy) -> bool {
        self.attempt >= policy.max_attempts()
    }

    /// Enter the wait phase; returns how long to sleep before the next attempt
    pub(crate) fn schedule_retry(&mut self, policy: &RetryPolicy) -> Duration {
        self.phase = RetryPhase::RetryWait;
        let wait = policy.with_jitter(self.delay);
        self.delay = policy.next_delay(self.delay);
        wait
    }

    pub(crate) fn finish(&mut self, phase: RetryPhase) {
        self.phase = phase;
    }
}
