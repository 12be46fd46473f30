use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::path;
use crate::storage::area::FileStore;

/// File store backed by a directory on local disk.
///
/// Logical paths are resolved below `root`; absolute logical paths are treated
/// as relative to the root as well. Parent directories are created on write.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a logical path onto the filesystem, refusing anything outside the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf> {
        let normalized = path::combine(&["/", logical])?;
        let relative = normalized.trim_start_matches('/');
        Ok(self.root.join(relative))
    }

    fn ensure_parent(&self, full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl FileStore for LocalFileStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)?)?)
    }

    fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full)?;
        fs::write(full, data)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.resolve(path)?) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn append_text(&self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full)?;
        let mut file = OpenOptions::new().create(true).append(true).open(full)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KitError;

    #[test]
    fn writes_below_root_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write_text("deep/nested/file.txt", "hello").unwrap();
        assert!(dir.path().join("deep/nested/file.txt").is_file());
        assert_eq!(store.read_text("/deep/nested/file.txt").unwrap(), "hello");
        assert!(store.exists("deep/./nested/file.txt"));
    }

    #[test]
    fn append_accumulates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.append_text("registry.txt", "one\n").unwrap();
        store.append_text("registry.txt", "two\n").unwrap();
        assert_eq!(store.read_lines("registry.txt").unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("root"));

        assert!(matches!(store.resolve("../secret"), Err(KitError::PathEscapesRoot(_))));
        assert!(store.write_text("a/../../b", "x").is_err());
        assert!(!store.exists("../../etc/passwd"));
    }

    #[test]
    fn remove_deletes_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store.write_text("a.txt", "x").unwrap();
        store.remove("a.txt").unwrap();
        assert!(!store.exists("a.txt"));
        store.remove("a.txt").unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        assert!(matches!(store.read_bytes("nope"), Err(KitError::Io(_))));
    }
}
