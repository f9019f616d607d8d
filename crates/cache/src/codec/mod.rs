//! Binary codec for stored cache entries.
//!
//! # Components
//!
//! - [`BinaryReader`] / [`BinaryWriter`]: varint, string and raw byte primitives
//! - [`HeaderTable`]: interning of frequent header names and values
//! - [`EntryFormatter`]: the versioned entry format built on top of them
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use chrono::Utc;
//! use http::StatusCode;
//! use micro_cache::codec::EntryFormatter;
//! use micro_cache::entry::CacheEntry;
//!
//! let formatter = EntryFormatter::default();
//! let entry = CacheEntry::new(Utc::now().fixed_offset(), StatusCode::OK);
//!
//! let mut buf = BytesMut::new();
//! formatter.serialize(&entry, &mut buf);
//!
//! let decoded = formatter.deserialize(&buf.freeze()).unwrap().unwrap();
//! assert_eq!(decoded.status(), StatusCode::OK);
//! ```

mod entry_formatter;
mod header_table;
mod reader;
mod writer;

pub use entry_formatter::{EntryFormatter, Revision};
pub use header_table::HeaderTable;
pub use reader::BinaryReader;
pub use writer::BinaryWriter;
