//! Singleton registry
//!
//! A memoization store keyed by type identity: the first successful
//! constructor for a type wins and every later request shares that instance.
//!
//! Construction arguments from later callers are silently discarded. If the
//! first caller builds `DatabaseConnection::new("production")` and a second
//! asks for `DatabaseConnection::new("backup")`, both get the production
//! connection. This is the defining behaviour of a singleton, not a bug.
//!
//! The registry is an ordinary value owned by the composing code. There is no
//! hidden global; share it with `Arc` where several components need it.

use std::any::{type_name, Any, TypeId};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use super::{MemoizationStore, Provenance};
use crate::error::PipelineError;

type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct SingletonRegistry {
    store: MemoizationStore<TypeId, Instance>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance of `T`, running `construct` only if no instance exists yet.
    ///
    /// A failing constructor leaves the registry without a `T`; the next
    /// caller runs its own constructor.
    pub async fn get_or_init<T, F, Fut>(&self, construct: F) -> Result<Arc<T>, PipelineError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let (instance, provenance) = self
            .store
            .get_or_compute_tracked(TypeId::of::<T>(), || async move {
                let value = construct().await?;
                let instance: Instance = Arc::new(value);
                Ok::<_, anyhow::Error>(instance)
            })
            .await
            .map_err(|source| PipelineError::ComputationFailure {
                key: type_name::<T>().to_string(),
                source,
            })?;

        match provenance {
            Provenance::Computed => info!("Constructed singleton instance of {}", type_name::<T>()),
            _ => debug!(
                "Reusing singleton instance of {}; construction arguments ignored",
                type_name::<T>()
            ),
        }

        downcast(instance)
    }

    /// Synchronous-constructor form of [`get_or_init`](Self::get_or_init)
    pub async fn get_or_construct<T, F>(&self, construct: F) -> Result<Arc<T>, PipelineError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> anyhow::Result<T>,
    {
        self.get_or_init(|| async move { construct() }).await
    }

    /// Existing instance of `T`, if one has been constructed
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.store
            .get(&TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.store.contains(&TypeId::of::<T>())
    }

    /// Number of types with a live instance
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> Result<Arc<T>, PipelineError> {
    instance
        .downcast::<T>()
        .map_err(|_| PipelineError::ComputationFailure {
            key: type_name::<T>().to_string(),
            source: anyhow::anyhow!("registry slot holds an instance of another type"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Connection {
        target: String,
    }

    #[derive(Debug)]
    struct Pool(usize);

    #[tokio::test]
    async fn test_first_arguments_win() {
        let registry = SingletonRegistry::new();

        let first = registry
            .get_or_construct(|| {
                Ok(Connection {
                    target: "production".to_string(),
                })
            })
            .await
            .unwrap();
        let second = registry
            .get_or_construct(|| {
                Ok(Connection {
                    target: "backup".to_string(),
                })
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.target, "production");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_types_are_registered_independently() {
        let registry = SingletonRegistry::new();
        registry.get_or_construct(|| Ok(Pool(4))).await.unwrap();
        assert!(registry.contains::<Pool>());
        assert!(!registry.contains::<Connection>());
        assert_eq!(registry.get::<Pool>().map(|p| p.0), Some(4));
        assert!(registry.get::<Connection>().is_none());
    }

    #[tokio::test]
    async fn test_failed_constructor_can_be_retried() {
        let registry = SingletonRegistry::new();
        let attempts = AtomicUsize::new(0);

        let err = registry
            .get_or_construct::<Pool, _>(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("pool exhausted")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ComputationFailure { .. }));
        assert!(err.operation_name().contains("Pool"));
        assert!(registry.is_empty());

        let pool = registry
            .get_or_construct(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(Pool(8))
            })
            .await
            .unwrap();
        assert_eq!(pool.0, 8);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
