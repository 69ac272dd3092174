pub mod discrete_files;
pub mod memory;

use crate::error::StorageError;

/// A string key/value store that partitions are persisted into.
///
/// Keys are partition names plus a couple of reserved bookkeeping keys (see
/// [`CacheConfig`](crate::config::CacheConfig)). Values are JSON documents or, for the validator
/// key, the raw token text. Every operation may fail; callers inside this crate treat failure as
/// reduced durability, never as a fault.
pub trait StorageAdapter: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Erases every key, including ones this crate did not write.
    fn clear(&mut self) -> Result<(), StorageError>;
}

impl<S: StorageAdapter + ?Sized> StorageAdapter for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }
}
