use crate::error::StorageError;
use crate::store::StorageAdapter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Volatile [`StorageAdapter`] backed by a `HashMap`.
///
/// Clones share the same map, so two caches built from clones of one store see each other's
/// writes the way two page loads see the same origin storage. A byte quota can be set to make
/// writes fail once the stored keys and values grow past it.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// A store that rejects writes once `key.len() + value.len()` summed over all entries would
    /// exceed `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            data: Default::default(),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn used_bytes(data: &HashMap<String, String>) -> usize {
    data.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl StorageAdapter for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut data = self.lock();

        if let Some(quota) = self.quota {
            let replaced = data.get(key).map_or(0, |old| key.len() + old.len());
            let required = used_bytes(&data) - replaced + key.len() + value.len();
            if required > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_owned(),
                    required,
                    quota,
                });
            }
        }

        data.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let mut a = MemoryStore::new();
        let b = a.clone();

        a.set("color", "{}").unwrap();
        assert_eq!(b.get("color").unwrap().as_deref(), Some("{}"));
        assert_eq!(b.len(), 1);

        a.clear().unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn quota_counts_keys_and_values() {
        let mut store = MemoryStore::with_quota(10);
        store.set("ab", "cdef").unwrap();

        let err = store.set("gh", "ijklm").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                required: 13,
                quota: 10,
                ..
            }
        ));
        assert!(!store.contains("gh"));

        // replacing an existing value only counts the difference
        store.set("ab", "cdefghij").unwrap();
        assert_eq!(store.get("ab").unwrap().as_deref(), Some("cdefghij"));
        assert_eq!(store.len(), 1);
    }
}
