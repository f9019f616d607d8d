use crate::error::StoreError;
use crate::store::OutputCacheStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// An in-process store keeping payloads in a hash map.
///
/// Expired entries are dropped when they are read, and every write or eviction sweeps
/// the remaining expired entries together with their tag links. The lock is only
/// taken inside each call and never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, StoredValue>,
    tags: HashMap<String, HashSet<String>>,
}

#[derive(Debug)]
struct StoredValue {
    value: Bytes,
    tags: Vec<String>,
    expires_at: Instant,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<StoredValue> {
        let stored = self.entries.remove(key)?;
        for tag in &stored.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(stored)
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self.entries.iter().filter(|(_, stored)| stored.expires_at <= now).map(|(key, _)| key.clone()).collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|e| StoreError::backend(format!("memory store lock poisoned: {e}")))
    }
}

fn sweep(inner: &mut Inner) {
    let expired = inner.remove_expired(Instant::now());
    if expired > 0 {
        trace!(expired, "swept expired entries");
    }
}

fn check_canceled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Canceled);
    }
    Ok(())
}

#[async_trait]
impl OutputCacheStore for MemoryStore {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Bytes>, StoreError> {
        check_canceled(cancel)?;
        let mut inner = self.lock()?;
        match inner.entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.value.clone())),
            Some(_) => {
                inner.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Option<Bytes>, tags: &[String], ttl: Duration, cancel: &CancellationToken) -> Result<(), StoreError> {
        check_canceled(cancel)?;
        let mut inner = self.lock()?;
        inner.remove(key);
        sweep(&mut inner);

        let Some(value) = value else {
            return Ok(());
        };

        for tag in tags {
            inner.tags.entry(tag.clone()).or_default().insert(key.to_owned());
        }
        let expires_at = Instant::now().checked_add(ttl).unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX.into()));
        inner.entries.insert(key.to_owned(), StoredValue { value, tags: tags.to_vec(), expires_at });
        Ok(())
    }

    async fn evict_by_tag(&self, tag: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        check_canceled(cancel)?;
        let mut inner = self.lock()?;
        sweep(&mut inner);
        let keys = inner.tags.remove(tag).unwrap_or_default();
        for key in &keys {
            inner.remove(key);
        }
        debug!(tag, evicted = keys.len(), "evicted entries by tag");
        Ok(())
    }
}
