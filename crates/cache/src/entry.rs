//! In-memory form of a cached response.

use crate::buffer::{header_pool, tag_pool, ByteSequence};
use chrono::{DateTime, FixedOffset};
use http::header::{AGE, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::warn;

/// One captured header: the name as it was seen plus every value, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHeader {
    name: String,
    values: Vec<String>,
}

impl CachedHeader {
    pub fn new<N: Into<String>>(name: N, values: Vec<String>) -> Self {
        Self { name: name.into(), values }
    }

    pub fn single<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, vec![value.into()])
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Headers that are never stored, since they are derived when the entry is served.
    fn is_derived(name: &str) -> bool {
        name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) || name.eq_ignore_ascii_case(AGE.as_str())
    }
}

/// A cached response: creation time, status, headers, body and invalidation tags.
///
/// Headers and tags live in arrays rented from the shared pools and the body may be a
/// pooled segment chain. None of that is released on drop: the owner decides when the
/// memory is no longer referenced by an in-flight store write and calls
/// [`recycle`](Self::recycle). An entry that is simply dropped is freed normally.
#[derive(Debug)]
pub struct CacheEntry {
    created: DateTime<FixedOffset>,
    status: StatusCode,
    headers: Vec<CachedHeader>,
    body: ByteSequence,
    tags: Vec<String>,
    owns_body_buffers: bool,
}

impl CacheEntry {
    pub fn new(created: DateTime<FixedOffset>, status: StatusCode) -> Self {
        Self { created, status, headers: Vec::new(), body: ByteSequence::Empty, tags: Vec::new(), owns_body_buffers: false }
    }

    #[inline]
    pub fn created(&self) -> DateTime<FixedOffset> {
        self.created
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &[CachedHeader] {
        &self.headers
    }

    #[inline]
    pub fn body(&self) -> &ByteSequence {
        &self.body
    }

    #[inline]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Time elapsed between creation and `now`, zero if `now` is earlier.
    pub fn age(&self, now: DateTime<FixedOffset>) -> Duration {
        (now - self.created).to_std().unwrap_or_default()
    }

    /// Case-insensitive lookup; a header without values counts as missing.
    pub fn find_header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(CachedHeader::values)
            .filter(|values| !values.is_empty())
    }

    /// Replaces the headers, dropping `Content-Length` and `Age`.
    pub fn set_headers(&mut self, mut headers: Vec<CachedHeader>) {
        headers.retain(|header| !CachedHeader::is_derived(&header.name));
        self.headers = headers;
    }

    /// Replaces the body.
    ///
    /// `recycle_buffers` tells [`recycle`](Self::recycle) whether the segment memory
    /// belongs to this entry alone and may go back to the buffer pool.
    pub fn set_body(&mut self, body: ByteSequence, recycle_buffers: bool) {
        self.body = body;
        self.owns_body_buffers = recycle_buffers;
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
    }

    /// Captures response headers, skipping `Content-Length` and `Age`.
    ///
    /// Every other header is copied in insertion order with all of its values.
    /// [`HeaderMap`] stores names in lowercase, so the captured names are lowercase
    /// too; use [`copy_header_pairs`](Self::copy_header_pairs) to keep the spelling a
    /// response was written with.
    pub fn copy_headers_from(&mut self, headers: &HeaderMap) {
        let count = headers.keys_len();
        if count == 0 {
            return;
        }

        let mut captured = header_pool().rent(count);
        for name in headers.keys() {
            if *name == CONTENT_LENGTH || *name == AGE {
                continue;
            }

            let mut values = Vec::new();
            for value in headers.get_all(name) {
                match value.to_str() {
                    Ok(value) => values.push(value.to_owned()),
                    Err(e) => warn!(header = %name, cause = %e, "header value is not valid utf-8, skip caching it"),
                }
            }
            if !values.is_empty() {
                captured.push(CachedHeader::new(name.as_str(), values));
            }
        }

        if captured.is_empty() {
            header_pool().give_back(captured);
        } else {
            self.headers = captured;
        }
    }

    /// Captures headers from ordered `(name, value)` pairs, keeping each name's case.
    ///
    /// Repeated names are matched case-insensitively and their values are grouped
    /// under the first spelling seen. `Content-Length` and `Age` are skipped.
    pub fn copy_header_pairs<I, N, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        let pairs = pairs.into_iter();
        let mut captured = header_pool().rent(pairs.size_hint().0);
        for (name, value) in pairs {
            let name = name.as_ref();
            if CachedHeader::is_derived(name) {
                continue;
            }
            match captured.iter_mut().find(|header| header.name.eq_ignore_ascii_case(name)) {
                Some(header) => header.values.push(value.into()),
                None => captured.push(CachedHeader::new(name, vec![value.into()])),
            }
        }

        if captured.is_empty() {
            header_pool().give_back(captured);
        } else {
            self.headers = captured;
        }
    }

    /// Copies the distinct tags into a pooled array.
    pub fn copy_tags_from<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter();
        let mut seen = HashSet::new();
        let mut captured = tag_pool().rent(tags.size_hint().0);
        for tag in tags {
            let tag = tag.into();
            if seen.insert(tag.clone()) {
                captured.push(tag);
            }
        }

        if captured.is_empty() {
            tag_pool().give_back(captured);
        } else {
            self.tags = captured;
        }
    }

    /// Replays the cached headers onto a response.
    ///
    /// `Content-Length` is set from the body unless the response was chunked.
    pub fn copy_headers_to(&self, headers: &mut HeaderMap) {
        if self.find_header(TRANSFER_ENCODING.as_str()).is_none() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }

        for header in &self.headers {
            let name = match HeaderName::from_bytes(header.name.as_bytes()) {
                Ok(name) => name,
                Err(e) => {
                    warn!(header = %header.name, cause = %e, "cached header name is invalid, skip it");
                    continue;
                }
            };

            headers.remove(&name);
            for value in &header.values {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.append(&name, value);
                    }
                    Err(e) => warn!(header = %header.name, cause = %e, "cached header value is invalid, skip it"),
                }
            }
        }
    }

    /// Writes the cached body to `dst`.
    pub async fn copy_body_to<W>(&self, dst: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.body.copy_to(dst).await
    }

    /// Returns the header and tag arrays to their pools and recycles the body chain.
    pub fn recycle(self) {
        header_pool().give_back(self.headers);
        tag_pool().give_back(self.tags);
        self.body.recycle(self.owns_body_buffers);
    }
}
