use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, PoisonError};

use crate::errors::{KitError, Result};
use crate::path;
use crate::storage::area::FileStore;

/// In-memory file store (no persistence). Paths are normalized the same way as
/// [`LocalFileStore`](crate::storage::LocalFileStore) so both behave alike.
#[derive(Default)]
pub struct InMemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted list of stored logical paths.
    pub fn paths(&self) -> Vec<String> {
        let mut v: Vec<String> = self.lock().keys().cloned().collect();
        v.sort_unstable();
        v
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(logical: &str) -> Result<String> {
        let normalized = path::combine(&["/", logical])?;
        Ok(normalized.trim_start_matches('/').to_string())
    }
}

impl FileStore for InMemoryFileStore {
    fn exists(&self, path: &str) -> bool {
        Self::key(path).map(|k| self.lock().contains_key(&k)).unwrap_or(false)
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let key = Self::key(path)?;
        self.lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| KitError::Io(io::Error::new(io::ErrorKind::NotFound, key)))
    }

    fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = Self::key(path)?;
        self.lock().insert(key, data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let key = Self::key(path)?;
        self.lock().remove(&key);
        Ok(())
    }

    fn append_text(&self, path: &str, text: &str) -> Result<()> {
        let key = Self::key(path)?;
        self.lock().entry(key).or_default().extend_from_slice(text.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_paths_share_a_file() {
        let store = InMemoryFileStore::new();
        store.write_text("/a/./b.txt", "v").unwrap();

        assert!(store.exists("a/b.txt"));
        assert!(store.exists("a/x/../b.txt"));
        assert_eq!(store.paths(), vec!["a/b.txt".to_string()]);
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let store = InMemoryFileStore::new();
        assert!(matches!(store.write_text("../x", "v"), Err(KitError::PathEscapesRoot(_))));
    }
}
