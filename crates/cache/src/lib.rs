//! Output cache entry storage for HTTP responses
//!
//! This crate captures a response while it is being written, turns it into a
//! [`CacheEntry`](entry::CacheEntry) and persists it through an
//! [`OutputCacheStore`](store::OutputCacheStore) in a compact binary form. Reading
//! an entry back is zero-copy: body segments share the payload returned by the store.
//!
//! # Features
//!
//! - Pooled, segmented body buffers with bounded free lists
//! - Response body mirroring with a hard size limit
//! - Varint based binary format with header interning and a revision tag
//! - Pluggable async store, with an in-memory implementation
//!
//! # Example
//!
//! ```
//! use bytes::BufMut;
//! use bytes::BytesMut;
//! use chrono::Utc;
//! use http::{HeaderMap, StatusCode, header};
//! use micro_cache::codec::EntryFormatter;
//! use micro_cache::entry::CacheEntry;
//! use micro_cache::output::CachingWriter;
//! use micro_cache::store::MemoryStore;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), micro_cache::CacheError> {
//!     let mut writer = CachingWriter::new(BytesMut::new(), 1024, 64, || {})?;
//!     writer.put_slice(b"hello world");
//!
//!     let mut headers = HeaderMap::new();
//!     headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
//!
//!     let mut entry = CacheEntry::new(Utc::now().fixed_offset(), StatusCode::OK);
//!     entry.copy_headers_from(&headers);
//!     entry.set_body(writer.cached_body()?, true);
//!
//!     let store = MemoryStore::new();
//!     let formatter = EntryFormatter::default();
//!     let cancel = CancellationToken::new();
//!     formatter.store("/hello", entry, Duration::from_secs(60), &store, &cancel).await?;
//!
//!     let cached = formatter.get("/hello", &store, &cancel).await?.expect("entry was stored");
//!     assert_eq!(cached.status(), StatusCode::OK);
//!     assert_eq!(&cached.body().to_bytes()[..], b"hello world");
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod output;
pub mod store;

mod utils;

pub use config::CacheOptions;
pub use error::{CacheError, FormatError, StoreError};
