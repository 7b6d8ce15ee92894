// Builder Patterns
// Fluent builders for retry policies and component chains, with sensible
// defaults and validation at build time.

use anyhow::{anyhow, ensure, Result};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{Chain, DecoratorSpec};
use crate::component::{Adjustment, BaseComponent, ComponentChain};
use crate::contracts::Operation;
use crate::error::PipelineError;
use crate::types::{MaxAttempts, Size};
use crate::wrappers::{FatalRule, RetryPolicy};

/// Fluent builder for [`RetryPolicy`]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    jitter: Option<Duration>,
    fatal_rules: Vec<FatalRule>,
}

impl RetryPolicyBuilder {
    /// Create a new retry policy builder
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff_factor: 1.0, // constant delay
            max_delay: Duration::from_secs(30),
            jitter: None,
            fatal_rules: Vec::new(),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay between attempts
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the delay in (fractional) seconds
    pub fn delay_seconds(mut self, seconds: f64) -> Result<Self> {
        self.delay = Duration::try_from_secs_f64(seconds).map_err(|e| {
            anyhow!("Retry delay must be a non-negative number of seconds, got {seconds}: {e}")
        })?;
        Ok(self)
    }

    /// Grow the delay by `factor` after each failed attempt, capped at `max_delay`
    pub fn backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay;
        self
    }

    /// Add up to `bound` of random delay to every wait
    pub fn jitter(mut self, bound: Duration) -> Self {
        self.jitter = Some(bound);
        self
    }

    /// Stop retrying at once when the underlying cause is an `E`
    pub fn fatal_on<E>(mut self) -> Self
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.fatal_rules
            .push(Arc::new(|err: &PipelineError| err.cause_is::<E>()));
        self
    }

    /// Stop retrying at once when `rule` matches the failure
    pub fn fatal_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&PipelineError) -> bool + Send + Sync + 'static,
    {
        self.fatal_rules.push(Arc::new(rule));
        self
    }

    /// Build the policy
    pub fn build(self) -> Result<RetryPolicy> {
        let max_attempts = MaxAttempts::new(self.max_attempts)?;
        ensure!(
            self.backoff_factor.is_finite() && self.backoff_factor >= 1.0,
            "Backoff factor must be at least 1.0, got {}",
            self.backoff_factor
        );
        // The cap only matters once the delay grows
        ensure!(
            self.backoff_factor <= 1.0 || self.max_delay >= self.delay,
            "Maximum delay ({:?}) must not be shorter than the initial delay ({:?})",
            self.max_delay,
            self.delay
        );

        Ok(RetryPolicy {
            max_attempts,
            delay: self.delay,
            backoff_factor: self.backoff_factor,
            max_delay: self.max_delay,
            jitter: self.jitter,
            fatal_rules: self.fatal_rules,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for component chains.
///
/// Adjustments are applied in the order they are added, so the last one
/// added is the outermost layer.
pub struct ComponentBuilder {
    description: Option<String>,
    cost: Option<f64>,
    adjustments: Vec<Adjustment>,
}

impl ComponentBuilder {
    pub fn new() -> Self {
        Self {
            description: None,
            cost: None,
            adjustments: Vec::new(),
        }
    }

    /// Set the base component
    pub fn base(mut self, description: impl Into<String>, cost: f64) -> Self {
        self.description = Some(description.into());
        self.cost = Some(cost);
        self
    }

    /// Add an additive adjustment
    pub fn add(mut self, label: impl Into<String>, amount: f64) -> Result<Self> {
        self.adjustments.push(Adjustment::add(label, amount)?);
        Ok(self)
    }

    pub fn size(mut self, size: Size) -> Self {
        self.adjustments.push(Adjustment::size(size));
        self
    }

    pub fn extra_shots(mut self, shots: u32) -> Result<Self> {
        self.adjustments.push(Adjustment::extra_shots(shots)?);
        Ok(self)
    }

    /// Build the chain
    pub fn build(self) -> Result<ComponentChain> {
        let description = self
            .description
            .ok_or_else(|| anyhow::anyhow!("Base component is required"))?;
        let cost = self.cost.unwrap_or_default();

        let base = ComponentChain::build(BaseComponent::new(description, cost)?);
        Ok(self
            .adjustments
            .into_iter()
            .fold(base, |chain, adjustment| chain.wrap(adjustment)))
    }
}

impl Default for ComponentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for operation chains.
///
/// Layers are listed innermost first: the first call wraps the base
/// operation directly and the last call becomes the outermost layer.
pub struct ChainBuilder<A, R> {
    base: Chain<A, R>,
    specs: Vec<DecoratorSpec<A, R>>,
}

impl<A, R> ChainBuilder<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new<O>(base: O) -> Self
    where
        O: Operation<A, R> + 'static,
    {
        Self {
            base: Chain::build(base),
            specs: Vec::new(),
        }
    }

    /// Add an arbitrary decorator
    pub fn layer(mut self, spec: DecoratorSpec<A, R>) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn logged(self) -> Self {
        self.layer(DecoratorSpec::Logger)
    }

    pub fn timed(self) -> Self {
        self.layer(DecoratorSpec::timer())
    }

    pub fn retry(self, policy: RetryPolicy) -> Self {
        self.layer(DecoratorSpec::Retry(policy))
    }

    /// Reject arguments for which `check` returns false
    pub fn validated<F>(self, check: F, reason: impl Into<String>) -> Self
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.layer(DecoratorSpec::validator(check, reason))
    }

    pub fn deprecated(self, message: impl Into<String>) -> Self {
        self.layer(DecoratorSpec::deprecator(message))
    }

    /// Build the chain
    pub fn build(self) -> Chain<A, R> {
        self.specs
            .into_iter()
            .fold(self.base, |chain, spec| chain.wrap(spec))
    }
}

impl<A, R> ChainBuilder<A, R>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn cached(self) -> Self {
        self.layer(DecoratorSpec::cache())
    }
}
