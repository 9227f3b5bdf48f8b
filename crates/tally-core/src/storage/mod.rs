//! Local key-value storage backing the offline queue.

mod file;
mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

use crate::{Error, Result};

/// Durable string key-value store provided by the host platform.
///
/// `set` must replace the previous value atomically: a later `get` sees either
/// the old value or the new one, never a partial write.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub(crate) fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidInput(
            "Storage key must not be empty".to_string(),
        ));
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return Err(Error::InvalidInput(format!(
            "Storage key '{key}' may only contain ASCII letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(key)
}
