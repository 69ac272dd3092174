use crate::hydration::Shared;
use crate::partition::Identifier;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Produces the value for a cache miss.
///
/// `retrieve` is invoked at most once per outstanding key. It must eventually call
/// [`Completion::resolve`], either before returning or later from anywhere else, e.g. another
/// thread or an I/O callback. A completion that is never resolved leaves its key in flight for
/// the lifetime of the cache and every caller waiting on it waits forever.
pub trait SourceOfRecord<Args, Value> {
    fn retrieve(self, args: Args, on_result: Completion<Value>);
}

impl<Args, Value, F> SourceOfRecord<Args, Value> for F
where
    F: FnOnce(Args, Completion<Value>),
{
    fn retrieve(self, args: Args, on_result: Completion<Value>) {
        self(args, on_result)
    }
}

/// Handle through which a [`SourceOfRecord`] hands its result back to the cache.
#[must_use = "an unresolved completion leaves its key in flight forever"]
pub struct Completion<V> {
    shared: Arc<Shared<V>>,
    partition: String,
    id: Identifier,
    resolved: bool,
}

impl<V> Completion<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(shared: Arc<Shared<V>>, partition: &str, id: Identifier) -> Self {
        Completion {
            shared,
            partition: partition.to_owned(),
            id,
            resolved: false,
        }
    }

    /// Caches `value` and delivers it to every caller waiting on this key.
    pub fn resolve(mut self, value: V) {
        self.resolved = true;
        self.shared.complete(&self.partition, &self.id, value);
    }
}

impl<V> Completion<V> {
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }
}

impl<V> fmt::Debug for Completion<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("partition", &self.partition)
            .field("id", &self.id)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl<V> Drop for Completion<V> {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(
                partition = self.partition.as_str(),
                id = self.id.as_str(),
                "completion dropped without a result, key stays in flight"
            );
        }
    }
}
