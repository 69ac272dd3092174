use crate::error::StorageError;
use crate::store::StorageAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Non-volatile [`StorageAdapter`] that keeps every key in its own file under `cache_directory`.
///
/// File names are random, the key lives inside the file next to its value. Opening a store scans
/// the directory to rebuild the key index, so data written by a previous process is visible
/// again. Files that cannot be decoded are ignored during the scan.
///
/// Records are written to a temporary file in the same directory and renamed over their target,
/// so a failed write leaves the previous record of that key intact.
pub struct DiscreteFileStore<Serde>
where
    Serde: DiscreteFileSerializerDeserializer,
{
    cache_directory: PathBuf,
    index: HashMap<String, PathBuf>,
    phantom_serde: PhantomData<Serde>,
}

impl<Serde> DiscreteFileStore<Serde>
where
    Serde: DiscreteFileSerializerDeserializer,
{
    pub fn open(cache_directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let mut store = Self {
            cache_directory: cache_directory.into(),
            index: HashMap::new(),
            phantom_serde: PhantomData,
        };
        store.rehydrate_index()?;

        Ok(store)
    }

    pub fn cache_directory(&self) -> &Path {
        &self.cache_directory
    }

    fn rehydrate_index(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.cache_directory)?;

        for entry in fs::read_dir(&self.cache_directory)?.flatten() {
            let path = entry.path();
            if is_leftover_temp_file(&path) {
                continue;
            }
            match read_record::<Serde>(&path) {
                Ok(record) => {
                    self.index.insert(record.key, path);
                }
                Err(error) => {
                    tracing::debug!(?path, %error, "skipping unreadable cache record");
                }
            }
        }

        Ok(())
    }

    fn index_entry_or_new(&self, key: &str) -> PathBuf {
        match self.index.get(key) {
            Some(path) => path.clone(),
            None => self
                .cache_directory
                .join(Uuid::new_v4().hyphenated().to_string()),
        }
    }
}

impl<Serde> StorageAdapter for DiscreteFileStore<Serde>
where
    Serde: DiscreteFileSerializerDeserializer + Send,
{
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.index.get(key) {
            Some(path) => Ok(Some(read_record::<Serde>(path)?.value)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let record = Record {
            key: key.to_owned(),
            value: value.to_owned(),
        };

        let mut temp_file = NamedTempFile::new_in(&self.cache_directory)?;
        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            Serde::serialize(&mut writer, &record)?;
            writer.flush()?;
        }

        let path = self.index_entry_or_new(key);
        temp_file.persist(&path).map_err(|err| err.error)?;
        self.index.insert(key.to_owned(), path);

        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if let Some(path) = self.index.remove(key) {
            ignore_not_found(fs::remove_file(path))?;
        }

        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.index.clear();
        ignore_not_found(fs::remove_dir_all(&self.cache_directory))?;
        fs::create_dir_all(&self.cache_directory)?;

        Ok(())
    }
}

fn read_record<Serde>(path: &Path) -> Result<Record, StorageError>
where
    Serde: DiscreteFileSerializerDeserializer,
{
    let file = File::open(path)?;
    Serde::deserialize(&mut BufReader::new(file))
}

// `NamedTempFile` names start with ".tmp"; one survives only if the process died mid-write
fn is_leftover_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with(".tmp"))
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

/// Abstracts away the on-disk encoding of a [`Record`].
/// Callers hand in buffered I/O because partitions are written whole on every flush, and those
/// can be large.
pub trait DiscreteFileSerializerDeserializer {
    fn serialize(buffered_writer: &mut dyn Write, record: &Record) -> Result<(), StorageError>;

    fn deserialize(buffered_reader: &mut dyn Read) -> Result<Record, StorageError>;
}

pub struct JsonDiscreteFileSerializerDeserializer;

impl DiscreteFileSerializerDeserializer for JsonDiscreteFileSerializerDeserializer {
    fn serialize(buffered_writer: &mut dyn Write, record: &Record) -> Result<(), StorageError> {
        Ok(serde_json::to_writer(buffered_writer, record)?)
    }

    fn deserialize(buffered_reader: &mut dyn Read) -> Result<Record, StorageError> {
        Ok(serde_json::from_reader(buffered_reader)?)
    }
}

pub struct BincodeDiscreteFileSerializerDeserializer;

impl DiscreteFileSerializerDeserializer for BincodeDiscreteFileSerializerDeserializer {
    fn serialize(buffered_writer: &mut dyn Write, record: &Record) -> Result<(), StorageError> {
        Ok(bincode::serialize_into(buffered_writer, record)?)
    }

    fn deserialize(buffered_reader: &mut dyn Read) -> Result<Record, StorageError> {
        Ok(bincode::deserialize_from(buffered_reader)?)
    }
}

pub type DiscreteFileStoreJson = DiscreteFileStore<JsonDiscreteFileSerializerDeserializer>;
pub type DiscreteFileStoreBincode = DiscreteFileStore<BincodeDiscreteFileSerializerDeserializer>;

#[cfg(test)]
mod tests {
    use super::*;

    fn reopen_keeps_keys<Serde>()
    where
        Serde: DiscreteFileSerializerDeserializer + Send,
    {
        let dir = tempfile::tempdir().unwrap();

        let mut store = DiscreteFileStore::<Serde>::open(dir.path()).unwrap();
        store.set("color", r#"{"5":"red"}"#).unwrap();
        store.set("shape", r#"{"1":"square"}"#).unwrap();
        store.remove("shape").unwrap();
        drop(store);

        let store = DiscreteFileStore::<Serde>::open(dir.path()).unwrap();
        assert_eq!(
            store.get("color").unwrap().as_deref(),
            Some(r#"{"5":"red"}"#)
        );
        assert_eq!(store.get("shape").unwrap(), None);
    }

    #[test]
    fn json_store_survives_reopen() {
        reopen_keeps_keys::<JsonDiscreteFileSerializerDeserializer>();
    }

    #[test]
    fn bincode_store_survives_reopen() {
        reopen_keeps_keys::<BincodeDiscreteFileSerializerDeserializer>();
    }

    #[test]
    fn overwrite_reuses_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiscreteFileStoreJson::open(dir.path()).unwrap();

        store.set("color", "a").unwrap();
        store.set("color", "b").unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(store.get("color").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn clear_empties_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiscreteFileStoreJson::open(dir.path()).unwrap();
        store.set("color", "a").unwrap();

        store.clear().unwrap();

        assert_eq!(store.get("color").unwrap(), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        store.set("color", "b").unwrap();
        assert_eq!(store.get("color").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn failed_write_leaves_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiscreteFileStoreJson::open(dir.path().join("cache")).unwrap();
        fs::remove_dir_all(store.cache_directory()).unwrap();

        assert!(store.set("color", "a").is_err());
        assert_eq!(store.get("color").unwrap(), None);
    }

    /// Writes half a record, then fails. Reads like JSON.
    struct TornWrites;

    impl DiscreteFileSerializerDeserializer for TornWrites {
        fn serialize(buffered_writer: &mut dyn Write, _: &Record) -> Result<(), StorageError> {
            buffered_writer.write_all(br#"{"key":"col"#)?;
            Err(StorageError::Encoding("torn".to_owned()))
        }

        fn deserialize(buffered_reader: &mut dyn Read) -> Result<Record, StorageError> {
            JsonDiscreteFileSerializerDeserializer::deserialize(buffered_reader)
        }
    }

    #[test]
    fn failed_overwrite_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DiscreteFileStoreJson::open(dir.path()).unwrap();
        store.set("color", "a").unwrap();
        drop(store);

        let mut store = DiscreteFileStore::<TornWrites>::open(dir.path()).unwrap();
        assert!(store.set("color", "b").is_err());
        assert_eq!(store.get("color").unwrap().as_deref(), Some("a"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn leftover_temp_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".tmpAbC123"), br#"{"key":"color","value":"stale"}"#).unwrap();

        let store = DiscreteFileStoreJson::open(dir.path()).unwrap();
        assert_eq!(store.get("color").unwrap(), None);
    }

    #[test]
    fn garbage_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("junk"), b"not a record").unwrap();

        let store = DiscreteFileStoreJson::open(dir.path()).unwrap();
        assert_eq!(store.get("junk").unwrap(), None);
    }
}
