//! A fetch-through cache for asynchronous lookups.
//!
//! Values are grouped into named partitions and keyed by an [`Identifier`]. A lookup that misses
//! calls a [`SourceOfRecord`] once; every other lookup of the same key that arrives before the
//! source resolves is queued and receives the same value. Resolved partitions are written back to
//! a [`StorageAdapter`] so a later process can thaw them instead of fetching again.
//!
//! ```
//! use partition_cache::{Completion, ManagedCache, MemoryStore};
//!
//! let cache = ManagedCache::<String>::builder()
//!     .storage(MemoryStore::new())
//!     .initialize(Some("v1".into()));
//!
//! cache.fetch_through(
//!     "color",
//!     5,
//!     |(): (), done: Completion<String>| done.resolve("red".to_owned()),
//!     (),
//!     |color| assert_eq!(color.as_str(), "red"),
//! );
//! ```

pub mod config;
pub mod error;
pub mod hydration;
pub mod managed_cache;
pub mod partition;
mod persistence;
pub mod source_of_record;
pub mod store;
pub mod validator;

pub use config::CacheConfig;
pub use error::{CacheError, StorageError};
pub use hydration::FetchOutcome;
pub use managed_cache::{CacheBuilder, ManagedCache};
pub use partition::{Callback, Identifier};
pub use source_of_record::{Completion, SourceOfRecord};
pub use store::discrete_files::{DiscreteFileStoreBincode, DiscreteFileStoreJson};
pub use store::memory::MemoryStore;
pub use store::StorageAdapter;
pub use validator::{GateOutcome, ValidatorToken};
