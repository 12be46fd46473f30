//! File persistence for the kit.
//!
//! A [`FileStore`] addresses files by *logical path* (see [`crate::path`])
//! under a configured root. The cache registry uses it as its storage backend;
//! nothing in the HTTP stack touches the filesystem directly.
//!
//! # Available types
//!
//! - [`FileStore`]: trait for any backend.
//! - [`LocalFileStore`]: files on local disk below a root directory.
//! - [`InMemoryFileStore`]: a map of path to bytes, for tests and throwaway caches.
//!
//! # Example
//!
//! ```no_run
//! use kit::storage::{FileStore, LocalFileStore};
//!
//! let store = LocalFileStore::new("/tmp/kit-cache");
//! store.write_text("notes/today.txt", "hello").unwrap();
//! assert_eq!(store.read_text("notes/today.txt").unwrap(), "hello");
//! ```

use std::sync::Arc;

/// Storage area trait.
pub mod area;
/// Local disk backend.
pub mod local;
/// In-memory backend.
pub mod in_memory;

pub use area::FileStore;
pub use in_memory::InMemoryFileStore;
pub use local::LocalFileStore;

/// Shared, type-erased handle to a file store.
pub type FileStoreHandle = Arc<dyn FileStore>;
