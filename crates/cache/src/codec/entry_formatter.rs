//! Serialization of [`CacheEntry`] values to and from the stored byte format.
//!
//! # Format
//!
//! Every integer is a 7-bit varint. Fields appear in this fixed order:
//!
//! ```text
//! revision        varint32            1 = original, 2 = interned header strings
//! created         varint64 ticks      100ns units since 0001-01-01, local clock time
//!                 varint64 minutes    offset from UTC
//! status          varint32
//! headers         varint32 count
//!   name          string              interned string in revision 2
//!   values        varint32 count
//!     value       string              interned string in revision 2
//! body            varint32 count
//!   segment       varint32 length + raw bytes
//! tags            varint32 count
//!   tag           varint32 length + utf-8 bytes, never interned
//! ```
//!
//! A payload with an unknown revision decodes to `None`, the same as a miss, so a
//! fleet can roll out a new revision against a shared store without failing requests.

use crate::buffer::{header_pool, tag_pool, BufferPool, ByteSequence, SegmentChain};
use crate::codec::{BinaryReader, BinaryWriter, HeaderTable};
use crate::config::CacheOptions;
use crate::entry::{CacheEntry, CachedHeader};
use crate::error::{CacheError, FormatError};
use crate::store::OutputCacheStore;
use crate::utils::ensure;
use bytes::{BufMut, Bytes};
use chrono::{DateTime, FixedOffset, TimeZone};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and the unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Revisions of the stored format this crate understands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Revision {
    /// Header names and values written as plain length-prefixed strings
    Original = 1,
    /// Header names and values may be replaced by [`HeaderTable`] indices
    Interned = 2,
}

impl Revision {
    /// The revision written by [`EntryFormatter::serialize`].
    pub const CURRENT: Revision = Revision::Interned;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Original),
            2 => Some(Self::Interned),
            _ => None,
        }
    }

    #[inline]
    fn interns_headers(self) -> bool {
        matches!(self, Self::Interned)
    }
}

/// Converts cache entries to and from their stored bytes.
#[derive(Debug, Clone, Default)]
pub struct EntryFormatter {
    table: Arc<HeaderTable>,
}

impl EntryFormatter {
    pub fn new(table: HeaderTable) -> Self {
        Self { table: Arc::new(table) }
    }

    pub fn from_options(options: &CacheOptions) -> Self {
        Self::new(options.header_table())
    }

    pub fn header_table(&self) -> &HeaderTable {
        &self.table
    }

    /// Fetches and decodes the entry stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is missing or was written in a revision this
    /// build does not know. A payload that fails to decode is reported as a
    /// [`CacheError::Format`] and should be treated as invalid by the caller.
    pub async fn get<S>(&self, key: &str, store: &S, cancel: &CancellationToken) -> Result<Option<CacheEntry>, CacheError>
    where
        S: OutputCacheStore + ?Sized,
    {
        ensure!(!key.is_empty(), CacheError::invalid_argument("cache key must not be empty"));

        let Some(content) = store.get(key, cancel).await? else {
            return Ok(None);
        };

        self.deserialize(&content).map_err(|e| {
            error!(key, size = content.len(), cause = %e, "stored cache entry is corrupted");
            e.into()
        })
    }

    /// Encodes `entry` and hands it to `store` under `key`.
    ///
    /// The entry's pooled arrays, its body chain and the encode buffer go back to
    /// their pools only once the store reports success. When the write fails, or this
    /// future is dropped while the write is pending, they are freed without pooling,
    /// since the store may still hold on to them.
    pub async fn store<S>(&self, key: &str, entry: CacheEntry, ttl: Duration, store: &S, cancel: &CancellationToken) -> Result<(), CacheError>
    where
        S: OutputCacheStore + ?Sized,
    {
        ensure!(!key.is_empty(), CacheError::invalid_argument("cache key must not be empty"));

        let mut buf = BufferPool::shared().rent(estimate_size(&entry));
        self.serialize(&entry, &mut buf);
        let payload = buf.freeze();
        let size = payload.len();

        let result = store.set(key, Some(payload.clone()), entry.tags(), ttl, cancel).await;
        match result {
            Ok(()) => {
                entry.recycle();
                if let Ok(buf) = payload.try_into_mut() {
                    BufferPool::shared().give_back(buf);
                }
                trace!(key, size, "stored cache entry");
                Ok(())
            }
            Err(e) => {
                warn!(key, size, cause = %e, "failed to store cache entry, buffers are released without pooling");
                drop(entry);
                Err(e.into())
            }
        }
    }

    /// Writes `entry` in the current revision.
    pub fn serialize<B: BufMut>(&self, entry: &CacheEntry, dst: &mut B) {
        self.serialize_as(entry, Revision::CURRENT, dst);
    }

    /// Writes `entry` in the given revision.
    pub fn serialize_as<B: BufMut>(&self, entry: &CacheEntry, revision: Revision, dst: &mut B) {
        let mut writer = BinaryWriter::new(dst);
        writer.write_varint32(revision as u32);

        let (ticks, offset_minutes) = to_wire_time(&entry.created());
        writer.write_varint64(ticks as u64);
        writer.write_varint64(offset_minutes as u64);

        writer.write_varint32(u32::from(entry.status().as_u16()));

        let headers = entry.headers();
        writer.write_varint32(headers.len() as u32);
        for header in headers {
            self.write_header_string(&mut writer, revision, header.name());
            writer.write_varint32(header.values().len() as u32);
            for value in header.values() {
                self.write_header_string(&mut writer, revision, value);
            }
        }

        let body = entry.body();
        writer.write_varint32(body.segment_count() as u32);
        for segment in body.segments() {
            writer.write_varint32(segment.len() as u32);
            writer.write_raw(segment);
        }

        let tags = entry.tags();
        writer.write_varint32(tags.len() as u32);
        for tag in tags {
            writer.write_string(tag);
        }
    }

    /// Decodes a stored payload.
    ///
    /// Body segments share `content`'s allocation rather than copying it.
    pub fn deserialize(&self, content: &Bytes) -> Result<Option<CacheEntry>, FormatError> {
        let mut reader = BinaryReader::new(content);

        let raw_revision = reader.read_varint32()?;
        let Some(revision) = Revision::from_u32(raw_revision) else {
            debug!(revision = raw_revision, "unknown cache entry revision, treat as a miss");
            return Ok(None);
        };

        let ticks = reader.read_varint64()? as i64;
        let offset_minutes = reader.read_varint64()? as i64;
        let created = from_wire_time(ticks, offset_minutes)
            .ok_or_else(|| FormatError::corrupted(format!("invalid creation time, ticks {ticks} offset {offset_minutes} minutes")))?;

        let status = reader.read_varint32()?;
        let status = u16::try_from(status)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| FormatError::corrupted(format!("invalid status code {status}")))?;

        let mut entry = CacheEntry::new(created, status);

        let header_count = read_count(&mut reader, "header")?;
        if header_count > 0 {
            let mut headers = header_pool().rent(header_count);
            for _ in 0..header_count {
                let name = self.read_header_string(&mut reader, revision)?;
                let value_count = read_count(&mut reader, "header value")?;
                let mut values = Vec::with_capacity(value_count);
                for _ in 0..value_count {
                    values.push(self.read_header_string(&mut reader, revision)?);
                }
                headers.push(CachedHeader::new(name, values));
            }
            entry.set_headers(headers);
        }

        let segment_count = read_count(&mut reader, "body segment")?;
        let body = match segment_count {
            0 => ByteSequence::Empty,
            1 => ByteSequence::Single(read_segment(&mut reader)?),
            count => {
                let mut chain = SegmentChain::with_capacity(count);
                for _ in 0..count {
                    chain.append(read_segment(&mut reader)?);
                }
                ByteSequence::Chain(chain)
            }
        };
        entry.set_body(body, false);

        let tag_count = read_count(&mut reader, "tag")?;
        if tag_count > 0 {
            let mut tags = tag_pool().rent(tag_count);
            for _ in 0..tag_count {
                tags.push(reader.read_string()?);
            }
            entry.set_tags(tags);
        }

        Ok(Some(entry))
    }

    fn write_header_string<B: BufMut>(&self, writer: &mut BinaryWriter<'_, B>, revision: Revision, value: &str) {
        if revision.interns_headers() {
            self.table.write(writer, value);
        } else {
            writer.write_string(value);
        }
    }

    fn read_header_string(&self, reader: &mut BinaryReader<'_>, revision: Revision) -> Result<String, FormatError> {
        if revision.interns_headers() { self.table.read(reader) } else { reader.read_string() }
    }
}

/// Reads an item count; every item takes at least one byte, so a count larger than
/// the rest of the input can only come from a damaged payload.
fn read_count(reader: &mut BinaryReader<'_>, what: &str) -> Result<usize, FormatError> {
    let count = reader.read_length()?;
    ensure!(
        count <= reader.remaining(),
        FormatError::corrupted(format!("{what} count {count} exceeds the {} remaining bytes", reader.remaining()))
    );
    Ok(count)
}

fn read_segment(reader: &mut BinaryReader<'_>) -> Result<Bytes, FormatError> {
    let len = reader.read_length()?;
    reader.read_bytes_shared(len)
}

fn estimate_size(entry: &CacheEntry) -> usize {
    let headers: usize = entry.headers().iter().map(|h| h.name().len() + 5 + h.values().iter().map(|v| v.len() + 5).sum::<usize>()).sum();
    let tags: usize = entry.tags().iter().map(|t| t.len() + 5).sum();
    32 + headers + entry.body().len() as usize + entry.body().segment_count() * 5 + tags
}

/// Splits a timestamp into local clock ticks and the UTC offset in minutes.
///
/// The offset is truncated to whole minutes first and the clock time is taken in that
/// offset, so the encoded instant never changes; only sub-minute offset seconds are lost.
fn to_wire_time(created: &DateTime<FixedOffset>) -> (i64, i64) {
    let offset_minutes = created.offset().local_minus_utc() / 60;
    let created = FixedOffset::east_opt(offset_minutes * 60).map_or(*created, |offset| created.with_timezone(&offset));
    let local = created.naive_local().and_utc();
    let ticks = local
        .timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(UNIX_EPOCH_TICKS)
        .saturating_add(i64::from(local.timestamp_subsec_nanos() / 100));
    (ticks, i64::from(offset_minutes))
}

fn from_wire_time(ticks: i64, offset_minutes: i64) -> Option<DateTime<FixedOffset>> {
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    let local = DateTime::from_timestamp(secs, nanos)?.naive_utc();
    let offset_secs = i32::try_from(offset_minutes.checked_mul(60)?).ok()?;
    FixedOffset::east_opt(offset_secs)?.from_local_datetime(&local).single()
}
