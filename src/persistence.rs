use crate::error::StorageError;
use crate::partition::Partition;
use crate::store::StorageAdapter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Moves partitions between memory and the storage adapter.
///
/// Without an adapter every operation is a no-op: thawing yields nothing and write-back only
/// forgets the dirty set. Storage failures are never returned; they are logged and queued in
/// `faults` for the owner to report once it has released its lock.
pub(crate) struct PersistenceBridge {
    storage: Option<Box<dyn StorageAdapter>>,
    dirty: BTreeSet<String>,
    faults: Vec<StorageError>,
}

impl PersistenceBridge {
    pub fn new(storage: Option<Box<dyn StorageAdapter>>) -> Self {
        PersistenceBridge {
            storage,
            dirty: BTreeSet::new(),
            faults: Vec::new(),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage_mut(&mut self) -> Option<&mut (dyn StorageAdapter + 'static)> {
        self.storage.as_deref_mut()
    }

    /// Loads the persisted entries of `name`. Missing, unreadable and malformed blobs all come
    /// back as an empty partition.
    pub fn thaw<V: DeserializeOwned>(&mut self, name: &str) -> HashMap<String, Arc<V>> {
        let Some(storage) = self.storage.as_deref() else {
            return HashMap::new();
        };

        let blob = match storage.get(name) {
            Ok(Some(blob)) => blob,
            Ok(None) => return HashMap::new(),
            Err(error) => {
                tracing::warn!(partition = name, %error, "failed to read persisted partition");
                self.faults.push(error);
                return HashMap::new();
            }
        };

        match serde_json::from_str::<HashMap<String, V>>(&blob) {
            Ok(entries) => {
                tracing::debug!(partition = name, entries = entries.len(), "thawed partition");
                entries
                    .into_iter()
                    .map(|(id, value)| (id, Arc::new(value)))
                    .collect()
            }
            Err(error) => {
                tracing::debug!(partition = name, %error, "discarding malformed partition");
                HashMap::new()
            }
        }
    }

    pub fn mark_dirty(&mut self, name: &str) {
        if !self.dirty.contains(name) {
            self.dirty.insert(name.to_owned());
        }
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Writes every dirty partition in full. A partition stays dirty if its write fails, so the
    /// next pass retries it.
    pub fn write_back<V: Serialize>(&mut self, partitions: &HashMap<String, Partition<V>>) {
        let Some(storage) = self.storage.as_deref_mut() else {
            self.dirty.clear();
            return;
        };

        let faults = &mut self.faults;
        self.dirty.retain(|name| {
            let Some(partition) = partitions.get(name) else {
                return false;
            };

            match persist(storage, name, partition) {
                Ok(()) => {
                    tracing::debug!(
                        partition = name.as_str(),
                        entries = partition.entries().len(),
                        "flushed partition"
                    );
                    false
                }
                Err(error) => {
                    tracing::warn!(
                        partition = name.as_str(),
                        %error,
                        "failed to persist partition"
                    );
                    faults.push(error);
                    true
                }
            }
        });
    }

    pub fn take_faults(&mut self) -> Vec<StorageError> {
        std::mem::take(&mut self.faults)
    }

    pub fn push_fault(&mut self, error: StorageError) {
        self.faults.push(error);
    }
}

fn persist<V: Serialize>(
    storage: &mut dyn StorageAdapter,
    name: &str,
    partition: &Partition<V>,
) -> Result<(), StorageError> {
    // sorted so that identical partitions always produce identical blobs
    let entries: BTreeMap<&str, &V> = partition
        .entries()
        .iter()
        .map(|(id, value)| (id.as_str(), value.as_ref()))
        .collect();
    let blob = serde_json::to_string(&entries)?;
    storage.set(name, &blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Identifier;
    use crate::store::memory::MemoryStore;

    fn partition_with(values: &[(&str, u32)]) -> Partition<u32> {
        let mut partition = Partition::thawed(HashMap::new());
        for (id, value) in values {
            partition.resolve(&Identifier::from(*id), Arc::new(*value));
        }
        partition
    }

    #[test]
    fn thaw_without_storage_is_empty() {
        let mut bridge = PersistenceBridge::new(None);
        assert!(bridge.thaw::<u32>("numbers").is_empty());
        assert!(!bridge.is_persistent());
    }

    #[test]
    fn thaw_discards_malformed_blob() {
        let mut store = MemoryStore::new();
        store.set("numbers", "{not json").unwrap();
        let mut bridge = PersistenceBridge::new(Some(Box::new(store)));

        assert!(bridge.thaw::<u32>("numbers").is_empty());
        assert!(bridge.take_faults().is_empty());
    }

    #[test]
    fn thaw_discards_blob_of_the_wrong_shape() {
        let mut store = MemoryStore::new();
        store.set("numbers", r#"{"a": "not a number"}"#).unwrap();
        let mut bridge = PersistenceBridge::new(Some(Box::new(store)));

        assert!(bridge.thaw::<u32>("numbers").is_empty());
    }

    #[test]
    fn write_back_flushes_every_dirty_partition() {
        let store = MemoryStore::new();
        let mut bridge = PersistenceBridge::new(Some(Box::new(store.clone())));

        let mut partitions = HashMap::new();
        partitions.insert("a".to_owned(), partition_with(&[("1", 1), ("2", 2)]));
        partitions.insert("b".to_owned(), partition_with(&[("x", 3)]));
        bridge.mark_dirty("a");
        bridge.mark_dirty("b");

        bridge.write_back(&partitions);

        assert_eq!(bridge.dirty_len(), 0);
        assert_eq!(store.get("a").unwrap().as_deref(), Some(r#"{"1":1,"2":2}"#));
        assert_eq!(store.get("b").unwrap().as_deref(), Some(r#"{"x":3}"#));

        let thawed = bridge.thaw::<u32>("a");
        assert_eq!(thawed.get("2").map(|v| **v), Some(2));
    }

    #[test]
    fn failed_write_stays_dirty() {
        let store = MemoryStore::with_quota(8);
        let mut bridge = PersistenceBridge::new(Some(Box::new(store.clone())));

        let mut partitions = HashMap::new();
        partitions.insert("a".to_owned(), partition_with(&[("1", 1), ("2", 2)]));
        bridge.mark_dirty("a");

        bridge.write_back(&partitions);

        assert_eq!(bridge.dirty_len(), 1);
        assert!(store.is_empty());
        let faults = bridge.take_faults();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], StorageError::QuotaExceeded { .. }));
    }

    #[test]
    fn memory_only_write_back_forgets_dirty_set() {
        let mut bridge = PersistenceBridge::new(None);
        let mut partitions = HashMap::new();
        partitions.insert("a".to_owned(), partition_with(&[("1", 1)]));
        bridge.mark_dirty("a");

        bridge.write_back(&partitions);

        assert_eq!(bridge.dirty_len(), 0);
    }
}
