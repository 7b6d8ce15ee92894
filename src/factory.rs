//! Factory functions for creating configured pipelines
//!
//! These return chains with the usual decorators already in place, driven by
//! a [`PipelineConfig`]. Validation always sits outside the retry loop so a
//! rejection is never retried, and the cache sits innermost so only
//! successful attempts are stored.

use anyhow::Result;
use std::hash::Hash;
use std::sync::Arc;

use crate::chain::{Chain, DecoratorSpec};
use crate::config::PipelineConfig;
use crate::contracts::Operation;
use crate::journal::{self, Journal};
use crate::wrappers::TimingLog;

/// Create a pipeline with the standard wrappers
///
/// Returns `base` wrapped with, from the inside out:
/// - Caching (if `cache.enabled`)
/// - Retry per the `retry` section
/// - Timing (if `logging.timing`)
/// - Logging
pub fn create_standard_pipeline<A, R, O>(base: O, config: &PipelineConfig) -> Result<Chain<A, R>>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Operation<A, R> + 'static,
{
    let inner = retrying(base, config)?;
    Ok(observed(inner, config))
}

/// Create a standard pipeline with an argument guard
///
/// Same layering as [`create_standard_pipeline`], with the guard placed
/// between the retry loop and the timing/logging layers.
pub fn create_guarded_pipeline<A, R, O, F>(
    base: O,
    config: &PipelineConfig,
    check: F,
    reason: impl Into<String>,
) -> Result<Chain<A, R>>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Operation<A, R> + 'static,
    F: Fn(&A) -> bool + Send + Sync + 'static,
{
    let guarded = retrying(base, config)?.wrap(DecoratorSpec::validator(check, reason));
    Ok(observed(guarded, config))
}

/// Apply the logging section to the process-wide journal
pub fn configure_journal(config: &PipelineConfig) -> Result<Arc<Journal>> {
    Ok(journal::init(config.logging.journal_level()?))
}

fn retrying<A, R, O>(base: O, config: &PipelineConfig) -> Result<Chain<A, R>>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    O: Operation<A, R> + 'static,
{
    let mut chain = Chain::build(base);
    if config.cache.enabled {
        chain = chain.wrap(DecoratorSpec::cache());
    }
    Ok(chain.wrap(DecoratorSpec::Retry(config.retry.to_policy()?)))
}

fn observed<A, R>(chain: Chain<A, R>, config: &PipelineConfig) -> Chain<A, R>
where
    A: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    let chain = if config.logging.timing {
        chain.wrap(DecoratorSpec::Timer {
            log: Arc::new(TimingLog::new()),
        })
    } else {
        chain
    };
    chain.wrap(DecoratorSpec::Logger)
}
