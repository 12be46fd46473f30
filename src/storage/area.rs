use crate::errors::Result;

/// Object-safe file storage addressed by logical path.
///
/// All operations are synchronous. Paths are normalized with
/// [`crate::path::combine`] by the implementation; a path that would escape
/// the root fails with [`crate::KitError::PathEscapesRoot`].
pub trait FileStore: Send + Sync {
    /// Returns true when a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Reads the whole file as bytes.
    fn read_bytes(&self, path: &str) -> Result<Vec<u8>>;

    /// Writes `data`, replacing any existing content and creating parents as needed.
    fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Deletes the file. Removing a missing file is not an error.
    fn remove(&self, path: &str) -> Result<()>;

    /// Appends `text` to the file, creating it when missing.
    fn append_text(&self, path: &str, text: &str) -> Result<()>;

    /// Reads the file as UTF-8 text (invalid sequences are replaced).
    fn read_text(&self, path: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_bytes(path)?).into_owned())
    }

    /// Writes `text` as UTF-8.
    fn write_text(&self, path: &str, text: &str) -> Result<()> {
        self.write_bytes(path, text.as_bytes())
    }

    /// Reads the file and splits it into lines, without line terminators.
    fn read_lines(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.read_text(path)?.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryFileStore;

    #[test]
    fn file_store_basic_contract() {
        let store = InMemoryFileStore::new();

        assert!(!store.exists("a.txt"));
        assert!(store.read_bytes("a.txt").is_err());

        store.write_text("a.txt", "one").unwrap();
        assert!(store.exists("a.txt"));
        assert_eq!(store.read_text("a.txt").unwrap(), "one");

        // overwrite replaces
        store.write_text("a.txt", "two").unwrap();
        assert_eq!(store.read_text("a.txt").unwrap(), "two");

        // append creates and extends
        store.append_text("log.txt", "x\n").unwrap();
        store.append_text("log.txt", "y\n").unwrap();
        assert_eq!(store.read_lines("log.txt").unwrap(), vec!["x", "y"]);

        store.remove("a.txt").unwrap();
        assert!(!store.exists("a.txt"));
        store.remove("a.txt").unwrap();
    }
}
