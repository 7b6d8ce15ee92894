// Contracts
// The two shapes of thing a chain can be built around: a behavioral
// operation (invoked with arguments) and an object-style component
// (asked for its description and cost).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::OperationResult;

/// Unit of work subject to wrapping.
///
/// `A` is the argument tuple (fixed arity by construction), `R` the result.
/// Implementations must be immutable once constructed: decorators and chains
/// share them across threads without synchronisation.
#[async_trait]
pub trait Operation<A, R>: Send + Sync
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Identity used in log lines and cache keys
    fn name(&self) -> &str;

    /// Run the operation
    async fn invoke(&self, args: &A) -> OperationResult<R>;
}

#[async_trait]
impl<A, R, O> Operation<A, R> for Arc<O>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    O: Operation<A, R> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn invoke(&self, args: &A) -> OperationResult<R> {
        (**self).invoke(args).await
    }
}

/// Object-style component whose description and cost accumulate through
/// its decorators.
///
/// Both methods must be pure: no side effects, and the same answer on every
/// call for an unchanged chain.
pub trait Component: Send + Sync {
    fn describe(&self) -> String;
    fn cost(&self) -> f64;
}

impl<C: Component + ?Sized> Component for Arc<C> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn cost(&self) -> f64 {
        (**self).cost()
    }
}
