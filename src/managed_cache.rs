use crate::config::CacheConfig;
use crate::error::{CacheError, StorageError};
use crate::hydration::{FetchOutcome, Shared, StorageHook};
use crate::partition::{Callback, Identifier};
use crate::persistence::PersistenceBridge;
use crate::source_of_record::SourceOfRecord;
use crate::store::StorageAdapter;
use crate::validator::{run_gate, GateOutcome, ValidatorToken};
use futures::channel::oneshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// An uninitialized cache.
///
/// Collects the storage adapter and settings, then [`initialize`](Self::initialize) runs the
/// validator gate exactly once and yields the ready [`ManagedCache`].
pub struct CacheBuilder<V> {
    config: CacheConfig,
    storage: Option<Box<dyn StorageAdapter>>,
    on_storage_error: Option<StorageHook>,
    faults: Vec<StorageError>,
    phantom_value: PhantomData<fn() -> V>,
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        CacheBuilder {
            config: CacheConfig::default(),
            storage: None,
            on_storage_error: None,
            faults: Vec::new(),
            phantom_value: PhantomData,
        }
    }
}

impl<V> CacheBuilder<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        CacheBuilder::default()
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: impl StorageAdapter + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Uses the adapter if it could be constructed. A construction error leaves the cache in
    /// memory-only mode and is reported like any other storage fault.
    pub fn try_storage<S>(self, storage: Result<S, StorageError>) -> Self
    where
        S: StorageAdapter + 'static,
    {
        match storage {
            Ok(storage) => self.storage(storage),
            Err(error) => {
                let mut builder = self;
                builder.storage = None;
                builder.faults.push(error);
                builder
            }
        }
    }

    /// Called with every storage failure the cache absorbs.
    pub fn on_storage_error(
        mut self,
        hook: impl Fn(&StorageError) + Send + Sync + 'static,
    ) -> Self {
        self.on_storage_error = Some(Arc::new(hook));
        self
    }

    /// Runs the validator gate and wires up persistence.
    ///
    /// With a `validator`, persisted data written under a different (or no) validator is erased
    /// first. Without one, whatever is persisted is trusted. If storage is missing or misbehaves
    /// here, the cache runs memory-only for its whole lifetime.
    pub fn initialize(self, validator: Option<ValidatorToken>) -> ManagedCache<V> {
        let CacheBuilder {
            config,
            storage,
            on_storage_error,
            mut faults,
            ..
        } = self;

        let (storage, gate) = match storage {
            Some(mut storage) => match run_gate(&mut *storage, validator.as_ref(), &config) {
                Ok(outcome) => (Some(storage), Some(outcome)),
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "storage rejected during initialization, caching in memory only"
                    );
                    faults.push(error);
                    (None, None)
                }
            },
            None => {
                tracing::debug!("no storage configured, caching in memory only");
                (None, None)
            }
        };

        let shared = Shared::new(PersistenceBridge::new(storage), on_storage_error);
        shared.report(&faults);

        ManagedCache {
            shared: Arc::new(shared),
            config,
            validator,
            gate,
        }
    }
}

/// A fetch-through cache split into named partitions.
///
/// Clones are handles to the same cache.
pub struct ManagedCache<V> {
    shared: Arc<Shared<V>>,
    config: CacheConfig,
    validator: Option<ValidatorToken>,
    gate: Option<GateOutcome>,
}

impl<V> Clone for ManagedCache<V> {
    fn clone(&self) -> Self {
        ManagedCache {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            validator: self.validator.clone(),
            gate: self.gate,
        }
    }
}

impl<V> ManagedCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    /// A cache without persistence.
    pub fn memory_only() -> Self {
        CacheBuilder::new().initialize(None)
    }

    /// Delivers the value of `(category, id)` to `callback`, fetching it through `fetcher` if
    /// needed.
    ///
    /// On a hit, `callback` runs before this returns. On a miss, `fetcher` is invoked with `args`
    /// unless a fetch for the same key is already outstanding, in which case `callback` is queued
    /// behind it. Queued callbacks run in arrival order when the fetch completes, and all of them
    /// receive the same `Arc`.
    pub fn fetch_through<A, F>(
        &self,
        category: &str,
        id: impl Into<Identifier>,
        fetcher: F,
        args: A,
        callback: impl FnOnce(Arc<V>) + Send + 'static,
    ) -> FetchOutcome
    where
        F: SourceOfRecord<A, V>,
    {
        let callback: Callback<V> = Box::new(callback);
        self.shared
            .fetch_through(category, id.into(), fetcher, args, Some(callback))
    }

    /// Like [`fetch_through`](Self::fetch_through) without anyone to receive the value; only warms
    /// the cache.
    pub fn prefetch<A, F>(
        &self,
        category: &str,
        id: impl Into<Identifier>,
        fetcher: F,
        args: A,
    ) -> FetchOutcome
    where
        F: SourceOfRecord<A, V>,
    {
        self.shared
            .fetch_through(category, id.into(), fetcher, args, None)
    }

    /// Future flavour of [`fetch_through`](Self::fetch_through).
    ///
    /// The lookup starts immediately, not on first poll. The future fails with
    /// [`CacheError::Abandoned`] only if the cache and the completion were both dropped without a
    /// result.
    pub fn get<A, F>(
        &self,
        category: &str,
        id: impl Into<Identifier>,
        fetcher: F,
        args: A,
    ) -> impl Future<Output = Result<Arc<V>, CacheError>> + Send + 'static
    where
        F: SourceOfRecord<A, V>,
    {
        let (sender, receiver) = oneshot::channel();
        self.fetch_through(category, id, fetcher, args, move |value| {
            // the receiving future may have been dropped, that is fine
            let _ = sender.send(value);
        });

        async move { receiver.await.map_err(|_| CacheError::Abandoned) }
    }

    /// The cached value, without fetching.
    pub fn peek(&self, category: &str, id: impl Into<Identifier>) -> Option<Arc<V>> {
        self.shared.peek(category, &id.into())
    }

    pub fn is_in_flight(&self, category: &str, id: impl Into<Identifier>) -> bool {
        self.shared.is_in_flight(category, &id.into())
    }

    /// Runs a write-back pass now. Returns the number of partitions that are still dirty because
    /// storage refused them.
    pub fn flush(&self) -> usize {
        self.shared.write_back()
    }

    /// Erases all persisted data, keeping the current validator so the next initialization with
    /// the same token does not erase again. Memory is left as is.
    pub fn clear_persisted(&self) {
        let token = self.validator.as_ref().map(ToString::to_string);
        let validator = token
            .as_deref()
            .map(|token| (self.config.validator_key.as_str(), token));
        self.shared.clear_persisted(validator);
    }

    /// Whether a storage adapter survived initialization.
    pub fn is_persistent(&self) -> bool {
        self.shared.is_persistent()
    }

    /// What the validator gate did, or `None` when running memory-only.
    pub fn gate_outcome(&self) -> Option<GateOutcome> {
        self.gate
    }
}
