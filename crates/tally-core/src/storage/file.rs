//! File-backed key-value store, one file per key.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{validate_key, KeyValueStore};
use crate::{Error, Result};

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temp file in the same directory, are fsynced, then renamed
/// over the target.
///
/// All I/O is blocking and runs on the caller's thread, including calls made
/// from inside a sync pass. Queue values are small, so a pass holds a runtime
/// worker only for the duration of one fsync per write.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let key = validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::Storage(format!(
                "Failed to read {}: {error}",
                path.display()
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|error| {
            Error::Storage(format!("Failed to write {}: {}", path.display(), error.error))
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::Storage(format!(
                "Failed to remove {}: {error}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_key_reads_as_none() {
        let tmp = tempdir().unwrap();
        let store = FileKeyValueStore::open(tmp.path()).unwrap();
        assert_eq!(store.get("tally.sync_queue").unwrap(), None);
    }

    #[test]
    fn set_overwrites_previous_value() {
        let tmp = tempdir().unwrap();
        let store = FileKeyValueStore::open(tmp.path().join("nested")).unwrap();

        store.set("tally.sync_queue", "[1]").unwrap();
        store.set("tally.sync_queue", "[1,2]").unwrap();

        assert_eq!(
            store.get("tally.sync_queue").unwrap().as_deref(),
            Some("[1,2]")
        );
        let leftovers = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files should not linger");
    }

    #[test]
    fn reopened_store_sees_persisted_value() {
        let tmp = tempdir().unwrap();
        FileKeyValueStore::open(tmp.path())
            .unwrap()
            .set("k", "v")
            .unwrap();

        let reopened = FileKeyValueStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));

        reopened.remove("k").unwrap();
        reopened.remove("k").unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }
}
