use crate::error::StorageError;
use crate::partition::{Identifier, Partition, Waiter};
use crate::persistence::PersistenceBridge;
use crate::source_of_record::{Completion, SourceOfRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Which path a [`fetch_through`](crate::managed_cache::ManagedCache::fetch_through) call took.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    /// Value was already cached and the callback has run.
    Hit,

    /// A fetch for the same key was already outstanding; the callback runs when it completes.
    Joined,

    /// This call started the fetch. The callback runs when it completes, which may already have
    /// happened if the source resolved synchronously.
    Issued,
}

pub(crate) type StorageHook = Arc<dyn Fn(&StorageError) + Send + Sync>;

/// State shared between a cache and the completions it handed out.
///
/// The lock is never held while a source of record, a callback or the diagnostic hook runs, so
/// all of them may call back into the cache.
pub(crate) struct Shared<V> {
    state: Mutex<CacheState<V>>,
    on_storage_error: Option<StorageHook>,
}

struct CacheState<V> {
    partitions: HashMap<String, Partition<V>>,
    persistence: PersistenceBridge,
}

impl<V> CacheState<V>
where
    V: DeserializeOwned,
{
    /// Looks up a partition, thawing it from storage on first use.
    fn partition_mut(&mut self, name: &str) -> &mut Partition<V> {
        let persistence = &mut self.persistence;
        self.partitions
            .entry(name.to_owned())
            .or_insert_with(|| Partition::thawed(persistence.thaw(name)))
    }
}

enum Step<V> {
    Hit(Arc<V>, Waiter<V>),
    Joined,
    Issue,
}

impl<V> Shared<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(persistence: PersistenceBridge, on_storage_error: Option<StorageHook>) -> Self {
        Shared {
            state: Mutex::new(CacheState {
                partitions: HashMap::new(),
                persistence,
            }),
            on_storage_error,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CacheState<V>) -> R) -> R {
        let (result, faults) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut *state);
            (result, state.persistence.take_faults())
        };
        self.report(&faults);

        result
    }

    pub fn report(&self, faults: &[StorageError]) {
        if let Some(hook) = &self.on_storage_error {
            for fault in faults {
                hook(fault);
            }
        }
    }

    pub fn fetch_through<A, F>(
        self: &Arc<Self>,
        name: &str,
        id: Identifier,
        fetcher: F,
        args: A,
        waiter: Waiter<V>,
    ) -> FetchOutcome
    where
        F: SourceOfRecord<A, V>,
    {
        let step = self.with_state(|state| {
            let partition = state.partition_mut(name);
            if let Some(value) = partition.get(&id) {
                return Step::Hit(value, waiter);
            }

            match partition.join(&id, waiter) {
                Ok(()) => Step::Joined,
                Err(waiter) => {
                    partition.begin(&id, waiter);
                    Step::Issue
                }
            }
        });

        match step {
            Step::Hit(value, waiter) => {
                tracing::trace!(partition = name, id = id.as_str(), "cache hit");
                if let Some(callback) = waiter {
                    callback(value);
                }
                FetchOutcome::Hit
            }
            Step::Joined => {
                tracing::trace!(partition = name, id = id.as_str(), "joined in-flight fetch");
                FetchOutcome::Joined
            }
            Step::Issue => {
                tracing::trace!(partition = name, id = id.as_str(), "issuing fetch");
                fetcher.retrieve(args, Completion::new(Arc::clone(self), name, id));
                FetchOutcome::Issued
            }
        }
    }

    pub fn complete(&self, name: &str, id: &Identifier, value: V) {
        let value = Arc::new(value);
        let waiters = self.with_state(|state| {
            state.persistence.mark_dirty(name);
            state.partition_mut(name).resolve(id, Arc::clone(&value))
        });

        tracing::trace!(
            partition = name,
            id = id.as_str(),
            waiters = waiters.len(),
            "fetch completed"
        );
        for waiter in waiters {
            waiter(Arc::clone(&value));
        }

        self.write_back();
    }

    /// Persists every dirty partition and returns how many are still dirty afterwards.
    pub fn write_back(&self) -> usize {
        self.with_state(|state| {
            state.persistence.write_back(&state.partitions);
            state.persistence.dirty_len()
        })
    }

    pub fn peek(&self, name: &str, id: &Identifier) -> Option<Arc<V>> {
        self.with_state(|state| state.partition_mut(name).get(id))
    }

    pub fn is_in_flight(&self, name: &str, id: &Identifier) -> bool {
        self.with_state(|state| {
            state
                .partitions
                .get(name)
                .is_some_and(|partition| partition.is_pending(id))
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.with_state(|state| state.persistence.is_persistent())
    }

    /// Erases the storage adapter, then writes `validator` (key, token) back if given.
    /// In-memory partitions are untouched.
    pub fn clear_persisted(&self, validator: Option<(&str, &str)>) {
        self.with_state(|state| {
            let Some(storage) = state.persistence.storage_mut() else {
                return;
            };

            let result = storage.clear().and_then(|()| match validator {
                Some((key, token)) => storage.set(key, token),
                None => Ok(()),
            });
            if let Err(error) = result {
                tracing::warn!(%error, "failed to clear persisted partitions");
                state.persistence.push_fault(error);
            }
        });
    }
}
