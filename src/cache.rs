//! Disk-backed response cache.
//!
//! The cache is an append-only registry mapping a [`CacheKey`] (tag, verb,
//! absolute URL) to a [`CacheEntry`] (MIME type and body file name). Entries
//! are written once and never refreshed or evicted.
//!
//! # Layout
//!
//! Inside the cache's file store:
//!
//! - `registry.txt`: one line per entry,
//!   `(tag;GET) https://example.com/path | text/html | 0007 (tag;GET) https_example.com_path`
//! - `<file name>.html|.txt|<none>`: the body, extension chosen by MIME type
//! - `<file name>.info.txt`: request and response headers of the original fetch
//!
//! # Modes
//!
//! - [`CacheMode::Disabled`]: the registry is bypassed entirely.
//! - [`CacheMode::Full`]: read-through. A hit whose body file still exists is
//!   served from disk; anything else is fetched live and persisted.

use serde::{Deserialize, Serialize};

mod entry;
mod registry;

pub use entry::{CacheEntry, CacheKey};
pub use registry::{CacheRegistry, REGISTRY_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Always fetch live, never touch the registry.
    #[default]
    Disabled,
    /// Serve existing entries, persist new ones.
    Full,
}
