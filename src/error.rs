use thiserror::Error;

/// A failure reported by a [`StorageAdapter`](crate::store::StorageAdapter).
///
/// None of these ever reach a caller of
/// [`ManagedCache::fetch_through`](crate::managed_cache::ManagedCache::fetch_through). They are
/// absorbed at the persistence boundary, logged, and handed to the optional diagnostic hook.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing `key` would push the store past its capacity.
    #[error("quota exceeded writing {key:?}: {required} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        required: usize,
        quota: usize,
    },

    /// The backend cannot be used at all, e.g. it was never constructed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A value could not be converted to or from its stored representation.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// An error surfaced by the future-based lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Every handle able to resolve the request was dropped before it produced a value.
    #[error("fetch abandoned before a value was produced")]
    Abandoned,
}
