//! The key-value store contract consumed by the entry formatter.
//!
//! Stores treat payloads as opaque bytes; only [`EntryFormatter`](crate::codec::EntryFormatter)
//! interprets them. Every call is a suspension point and receives the caller's
//! cancellation token.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutputCacheStore: Send + Sync {
    /// Fetches the payload stored under `key`.
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Bytes>, StoreError>;

    /// Stores `value` under `key` for `ttl`, associated with `tags`. `None` deletes the key.
    async fn set(&self, key: &str, value: Option<Bytes>, tags: &[String], ttl: Duration, cancel: &CancellationToken) -> Result<(), StoreError>;

    /// Removes every entry carrying `tag`.
    async fn evict_by_tag(&self, tag: &str, cancel: &CancellationToken) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: OutputCacheStore + ?Sized> OutputCacheStore for Arc<S> {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<Option<Bytes>, StoreError> {
        (**self).get(key, cancel).await
    }

    async fn set(&self, key: &str, value: Option<Bytes>, tags: &[String], ttl: Duration, cancel: &CancellationToken) -> Result<(), StoreError> {
        (**self).set(key, value, tags, ttl, cancel).await
    }

    async fn evict_by_tag(&self, tag: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        (**self).evict_by_tag(tag, cancel).await
    }
}
