use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, CacheKey, CacheMode};
use crate::errors::{KitError, Result};
use crate::net::Response;
use crate::storage::{FileStoreHandle, LocalFileStore};

/// Name of the registry file inside the cache's file store.
pub const REGISTRY_FILE: &str = "registry.txt";

#[derive(Default)]
struct RegistryState {
    loaded: bool,
    entries: HashMap<String, CacheEntry>,
    next_sequence: u32,
}

/// Append-only cache registry over a [`FileStore`](crate::storage::FileStore).
///
/// The registry file is replayed into memory on first use. Lookups and the
/// insert+append sequence run under one lock, so concurrent misses never
/// share a sequence number; the live fetch itself runs outside the lock.
pub struct CacheRegistry {
    store: FileStoreHandle,
    state: Mutex<RegistryState>,
}

impl CacheRegistry {
    pub fn new(store: FileStoreHandle) -> Self {
        Self {
            store,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// A registry kept in a directory on local disk.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(LocalFileStore::new(dir)))
    }

    pub fn store(&self) -> &FileStoreHandle {
        &self.store
    }

    pub fn registry_path(&self) -> &'static str {
        REGISTRY_FILE
    }

    /// Number of known entries (loads the registry if needed).
    pub fn len(&self) -> Result<usize> {
        Ok(self.loaded_state()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The entry recorded for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.loaded_state()?.entries.get(&key.to_string()).cloned())
    }

    /// Serves `key` from the cache or runs `live` and persists its result.
    ///
    /// With [`CacheMode::Disabled`] the registry is not consulted and nothing
    /// is written. Only successful (2xx) live responses are persisted. A
    /// response that cannot be written to the store is still returned, uncached.
    pub async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        mode: CacheMode,
        cancel: &CancellationToken,
        live: F,
    ) -> Result<Response>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        if mode == CacheMode::Disabled {
            return live().await;
        }

        if let Some(hit) = self.lookup(key)? {
            log::debug!("cache hit: {key}");
            return Ok(hit);
        }

        log::debug!("cache miss: {key}");
        let mut response = live().await?;
        if response.status().is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(KitError::Canceled),
                body = response.bytes() => body?,
            };
            if let Err(err) = self.persist(key, &response, &body) {
                log::warn!("could not cache {key}: {err}");
            }
        }
        Ok(response)
    }

    /// A cached response for `key` when its body file is still on disk.
    fn lookup(&self, key: &CacheKey) -> Result<Option<Response>> {
        let Some(entry) = self.get(key)? else {
            return Ok(None);
        };

        let body_path = entry.body_path();
        if !self.store.exists(&body_path) {
            log::debug!("cache entry {} lost its body file, refetching", entry.file_name);
            return Ok(None);
        }

        Ok(Some(Response::cached(
            key.url.clone(),
            &entry.mime,
            self.store.clone(),
            body_path,
            entry.info_path(),
        )))
    }

    /// Writes body, info and registry line, in that order. A partly written
    /// entry is removed again so the store never holds an unregistered body.
    fn persist(&self, key: &CacheKey, response: &Response, body: &[u8]) -> Result<()> {
        let key_str = key.to_string();

        let mut state = self.loaded_state()?;
        if let Some(existing) = state.entries.get(&key_str) {
            if self.store.exists(&existing.body_path()) {
                // a concurrent miss for the same key got here first
                return Ok(());
            }
        }

        let entry = CacheEntry::new(state.next_sequence, key, response.mime());
        let body_path = entry.body_path();
        let info_path = entry.info_path();

        self.store.write_bytes(&body_path, body)?;
        let written = self
            .store
            .write_text(&info_path, &response.dump())
            .and_then(|()| self.store.append_text(REGISTRY_FILE, &format!("{}\n", entry.to_line())));
        if let Err(err) = written {
            for path in [&body_path, &info_path] {
                if let Err(cleanup) = self.store.remove(path) {
                    log::warn!("could not remove partial cache file {path}: {cleanup}");
                }
            }
            return Err(err);
        }

        log::debug!("cached {key} as {}", entry.file_name);
        state.next_sequence += 1;
        state.entries.insert(key_str, entry);
        Ok(())
    }

    /// Locks the state, replaying the registry file first if this is the first use.
    fn loaded_state(&self) -> Result<MutexGuard<'_, RegistryState>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.loaded {
            self.load(&mut state)?;
        }
        Ok(state)
    }

    fn load(&self, state: &mut RegistryState) -> Result<()> {
        let lines = if self.store.exists(REGISTRY_FILE) {
            self.store.read_lines(REGISTRY_FILE)?
        } else {
            Vec::new()
        };

        let mut max_sequence = 0;
        for line in lines.iter().filter(|l| !l.trim().is_empty()) {
            match CacheEntry::parse_line(line) {
                Some(entry) => {
                    max_sequence = max_sequence.max(entry.sequence().unwrap_or(0));
                    state.entries.insert(entry.key.clone(), entry);
                }
                None => log::warn!("skipping malformed cache registry line: {line}"),
            }
        }

        state.next_sequence = max_sequence + 1;
        state.loaded = true;
        log::debug!("cache registry loaded with {} entries", state.entries.len());
        Ok(())
    }
}
