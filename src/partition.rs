use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Receives the value of a lookup once it is available.
pub type Callback<V> = Box<dyn FnOnce(Arc<V>) + Send>;

/// A queued receiver. `None` is a placeholder left by a caller that did not want the value; it is
/// skipped when the queue drains.
pub(crate) type Waiter<V> = Option<Callback<V>>;

/// Key of an entry within a partition.
///
/// Partitions persist as JSON objects, whose keys are strings, so numeric identifiers are stored
/// by their decimal form and `5` addresses the same entry as `"5"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Identifier(id.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Identifier(id)
    }
}

impl From<&String> for Identifier {
    fn from(id: &String) -> Self {
        Identifier(id.clone())
    }
}

macro_rules! identifier_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Identifier {
                fn from(id: $ty) -> Self {
                    Identifier(id.to_string())
                }
            }
        )*
    };
}

identifier_from_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// One named category of cached values.
///
/// An identifier is either resolved (in `entries`) or in flight (in `pending`), never both.
pub(crate) struct Partition<V> {
    entries: HashMap<String, Arc<V>>,
    pending: HashMap<String, Vec<Waiter<V>>>,
}

impl<V> Partition<V> {
    pub fn thawed(entries: HashMap<String, Arc<V>>) -> Self {
        Partition {
            entries,
            pending: HashMap::new(),
        }
    }

    pub fn entries(&self) -> &HashMap<String, Arc<V>> {
        &self.entries
    }

    pub fn get(&self, id: &Identifier) -> Option<Arc<V>> {
        self.entries.get(id.as_str()).cloned()
    }

    pub fn is_pending(&self, id: &Identifier) -> bool {
        self.pending.contains_key(id.as_str())
    }

    /// Queues `waiter` behind an outstanding fetch of `id`.
    ///
    /// Hands the waiter back if nothing is in flight for `id`.
    pub fn join(&mut self, id: &Identifier, waiter: Waiter<V>) -> Result<(), Waiter<V>> {
        match self.pending.get_mut(id.as_str()) {
            Some(waiters) => {
                waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Marks `id` as in flight with `waiter` as its first receiver.
    pub fn begin(&mut self, id: &Identifier, waiter: Waiter<V>) {
        debug_assert!(!self.entries.contains_key(id.as_str()));
        self.pending.insert(id.as_str().to_owned(), vec![waiter]);
    }

    /// Stores `value` for `id` and returns every receiver queued for it, oldest first.
    pub fn resolve(&mut self, id: &Identifier, value: Arc<V>) -> Vec<Callback<V>> {
        self.entries.insert(id.as_str().to_owned(), value);
        self.pending
            .remove(id.as_str())
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect()
    }

    #[cfg(test)]
    pub fn pending_len(&self, id: &Identifier) -> usize {
        self.pending.get(id.as_str()).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_match() {
        assert_eq!(Identifier::from(5u32), Identifier::from("5"));
        assert_eq!(Identifier::from(-1i64).as_str(), "-1");
        assert_eq!(Identifier::from(7u8), Identifier::from("7"));
        assert_eq!(Identifier::from(300u16), Identifier::from(300usize));
        assert_eq!(Identifier::from(-8i8).as_str(), "-8");
    }

    #[test]
    fn resolve_moves_id_from_pending_to_entries() {
        let mut partition = Partition::<&str>::thawed(HashMap::new());
        let id = Identifier::from("a");

        assert!(partition.join(&id, None).is_err());
        partition.begin(&id, Some(Box::new(|_| {})));
        assert!(partition.join(&id, None).is_ok());
        assert!(partition.join(&id, Some(Box::new(|_| {}))).is_ok());
        assert_eq!(partition.pending_len(&id), 3);

        let waiters = partition.resolve(&id, Arc::new("value"));

        // the placeholder is dropped
        assert_eq!(waiters.len(), 2);
        assert!(!partition.is_pending(&id));
        assert_eq!(partition.get(&id).as_deref(), Some(&"value"));
    }
}
