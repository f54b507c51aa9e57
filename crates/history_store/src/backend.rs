use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::HistoryStoreError;
use crate::paths::storage_file_name;

/// Durable key-value storage beneath the gateway.
///
/// The backend only moves opaque strings; serialization, corruption recovery,
/// and schema concerns all live in [`crate::HistoryStore`]. Writes to one key
/// replace its previous value whole, so readers never observe a partial
/// document.
pub trait StorageBackend: Send {
    fn read(&self, key: &str) -> Result<Option<String>, HistoryStoreError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), HistoryStoreError>;
    fn remove(&mut self, key: &str) -> Result<(), HistoryStoreError>;
}

/// File-per-key backend rooted at a storage directory.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(storage_file_name(key))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, HistoryStoreError> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(HistoryStoreError::io("reading storage key", path, source)),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), HistoryStoreError> {
        fs::create_dir_all(&self.root).map_err(|source| {
            HistoryStoreError::io("creating storage directory", &self.root, source)
        })?;

        let path = self.key_path(key);
        fs::write(&path, value)
            .map_err(|source| HistoryStoreError::io("writing storage key", path, source))
    }

    fn remove(&mut self, key: &str) -> Result<(), HistoryStoreError> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HistoryStoreError::io("removing storage key", path, source)),
        }
    }
}

/// In-memory backend for headless use and tests.
///
/// Counts writes so coalescing behavior (one write per mutation burst) can be
/// asserted directly.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
    write_count: u64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `write` calls accepted so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Installs a raw value without counting it as a gateway write. Used by
    /// tests to seed corrupted storage contents.
    pub fn seed(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, HistoryStoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), HistoryStoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.write_count += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), HistoryStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Shared backend handle. Lets a caller keep a window onto storage (write
/// counts, seeded corruption) after handing the gateway its boxed backend.
impl<B: StorageBackend> StorageBackend for Arc<Mutex<B>> {
    fn read(&self, key: &str) -> Result<Option<String>, HistoryStoreError> {
        lock_unpoisoned(self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), HistoryStoreError> {
        lock_unpoisoned(self).write(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), HistoryStoreError> {
        lock_unpoisoned(self).remove(key)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_counts_writes_and_replaces_values() {
        let mut backend = MemoryBackend::new();

        backend.write("k", "one").expect("write");
        backend.write("k", "two").expect("write");

        assert_eq!(backend.read("k").expect("read").as_deref(), Some("two"));
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn memory_backend_seed_does_not_count_as_a_write() {
        let mut backend = MemoryBackend::new();
        backend.seed("k", "raw");

        assert_eq!(backend.read("k").expect("read").as_deref(), Some("raw"));
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn missing_key_reads_as_none() {
        let backend = MemoryBackend::new();
        assert!(backend.read("absent").expect("read").is_none());
    }
}
