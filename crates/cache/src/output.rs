//! Response body writer that mirrors the bytes it forwards into a cacheable buffer.
//!
//! [`CachingWriter`] sits between the response producer and the real sink. Every
//! write goes to the sink unchanged and, while buffering is enabled, is also copied
//! into a [`SegmentWriter`]. Once the mirrored body would grow past the configured
//! maximum, buffering is switched off for good and the partial copy is released; the
//! response itself is not affected.
//!
//! Two sink flavours are supported:
//!
//! - [`BufMut`] sinks such as [`BytesMut`](bytes::BytesMut) or `&mut [u8]`.
//!   `chunk_mut` hands out writable memory and remembers where it lives;
//!   `advance_mut` mirrors the committed prefix of that chunk before advancing the
//!   sink. Committing bytes that were not handed out by the last `chunk_mut`
//!   disables buffering, since they can't be mirrored.
//! - [`AsyncWrite`] sinks, where the bytes accepted by each write are mirrored.

use crate::buffer::{ByteSequence, SegmentWriter};
use crate::config::CacheOptions;
use crate::error::CacheError;
use bytes::buf::UninitSlice;
use bytes::BufMut;
use pin_project_lite::pin_project;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::ptr::NonNull;
use std::slice;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;
use tracing::debug;

pin_project! {
    pub struct CachingWriter<W, F> {
        #[pin]
        inner: W,
        buffer: Option<SegmentWriter>,
        pending: Option<PendingChunk>,
        max_body_size: u64,
        on_start: F,
    }
}

/// The writable chunk last handed out by `chunk_mut` and not yet committed.
#[derive(Debug, Clone, Copy)]
struct PendingChunk {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the pointer is only dereferenced inside `advance_mut`, which holds
// `&mut CachingWriter` and therefore exclusive access to the sink that owns the memory.
unsafe impl Send for PendingChunk {}

// SAFETY: shared references never dereference the pointer.
unsafe impl Sync for PendingChunk {}

impl<W, F> CachingWriter<W, F>
where
    F: FnMut(),
{
    /// Wraps `inner`.
    ///
    /// `on_start` runs every time writable memory is requested or a write is
    /// attempted, which tells the caller that the response body has started.
    pub fn new(inner: W, max_body_size: u64, segment_size: usize, on_start: F) -> Result<Self, CacheError> {
        let buffer = SegmentWriter::new(segment_size)?;
        Ok(Self { inner, buffer: Some(buffer), pending: None, max_body_size, on_start })
    }

    pub fn with_options(inner: W, options: &CacheOptions, on_start: F) -> Result<Self, CacheError> {
        Self::new(inner, options.max_body_size, options.segment_size, on_start)
    }
}

impl<W, F> CachingWriter<W, F> {
    #[inline]
    pub fn is_buffering(&self) -> bool {
        self.buffer.is_some()
    }

    /// Number of bytes mirrored so far, zero once buffering is disabled.
    pub fn buffered_len(&self) -> u64 {
        self.buffer.as_ref().map_or(0, SegmentWriter::len)
    }

    /// Stops mirroring and releases what was buffered so far.
    pub fn disable_buffering(&mut self) {
        self.buffer.take();
    }

    /// Takes the mirrored body.
    ///
    /// Fails with [`CacheError::BufferingDisabled`] when the body outgrew the limit,
    /// buffering was disabled explicitly or the body was already taken.
    pub fn cached_body(&mut self) -> Result<ByteSequence, CacheError> {
        self.buffer.take().map(SegmentWriter::detach_payload).ok_or(CacheError::BufferingDisabled)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.pending = None;
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn mirror(buffer: &mut Option<SegmentWriter>, max_body_size: u64, bytes: &[u8]) {
    let Some(writer) = buffer else {
        return;
    };
    if bytes.is_empty() {
        return;
    }

    if writer.len() + bytes.len() as u64 > max_body_size {
        debug!(buffered = writer.len(), incoming = bytes.len(), max_body_size, "response body exceeds the cache limit, disable buffering");
        buffer.take();
    } else {
        writer.write(bytes);
    }
}

// SAFETY: every call is forwarded to the inner `BufMut`, so its guarantees about
// `remaining_mut`, `chunk_mut` and `advance_mut` carry over unchanged.
unsafe impl<W, F> BufMut for CachingWriter<W, F>
where
    W: BufMut,
    F: FnMut(),
{
    fn remaining_mut(&self) -> usize {
        self.inner.remaining_mut()
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        (self.on_start)();
        let chunk = self.inner.chunk_mut();
        self.pending = NonNull::new(chunk.as_mut_ptr()).map(|ptr| PendingChunk { ptr, len: chunk.len() });
        chunk
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        let pending = self.pending.take();
        if cnt > 0 && self.buffer.is_some() {
            match pending {
                Some(chunk) if cnt <= chunk.len => {
                    // SAFETY: `chunk` is the inner buffer's memory from the latest
                    // `chunk_mut`, the sink has not been touched since, and the caller
                    // guarantees its first `cnt` bytes are initialized.
                    let written = unsafe { slice::from_raw_parts(chunk.ptr.as_ptr(), cnt) };
                    mirror(&mut self.buffer, self.max_body_size, written);
                }
                _ => {
                    debug!(cnt, "committed bytes were not handed out by chunk_mut, disable buffering");
                    self.buffer.take();
                }
            }
        }

        // SAFETY: the caller upholds the `advance_mut` contract for the inner buffer.
        unsafe { self.inner.advance_mut(cnt) };
    }

    fn put_slice(&mut self, src: &[u8]) {
        (self.on_start)();
        self.pending = None;
        mirror(&mut self.buffer, self.max_body_size, src);
        self.inner.put_slice(src);
    }
}

impl<W, F> AsyncWrite for CachingWriter<W, F>
where
    W: AsyncWrite,
    F: FnMut(),
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        (this.on_start)();
        let written = ready!(this.inner.poll_write(cx, buf))?;
        mirror(this.buffer, *this.max_body_size, &buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

impl<W: fmt::Debug, F> fmt::Debug for CachingWriter<W, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingWriter")
            .field("inner", &self.inner)
            .field("buffered", &self.buffered_len())
            .field("buffering", &self.is_buffering())
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::cell::Cell;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_below_limit_keeps_buffering() {
        let mut writer = CachingWriter::new(BytesMut::new(), 10, 4, || {}).unwrap();
        writer.put_slice(b"hello");
        writer.put_slice(b"world");
        assert!(writer.is_buffering());
        assert_eq!(writer.buffered_len(), 10);

        let body = writer.cached_body().unwrap();
        assert_eq!(&body.to_bytes()[..], b"helloworld");
        assert_eq!(body.segment_count(), 3);
        assert_eq!(&writer.get_ref()[..], b"helloworld");
    }

    #[test]
    fn test_over_limit_disables_buffering() {
        let mut writer = CachingWriter::new(BytesMut::new(), 10, 4, || {}).unwrap();
        writer.put_slice(b"hello");
        writer.put_slice(b"world!");
        assert!(!writer.is_buffering());

        writer.put_slice(b"more");
        assert!(!writer.is_buffering());
        assert_eq!(&writer.get_ref()[..], b"helloworld!more");
        assert!(matches!(writer.cached_body(), Err(CacheError::BufferingDisabled)));
    }

    #[test]
    fn test_cached_body_can_only_be_taken_once() {
        let mut writer = CachingWriter::new(BytesMut::new(), 10, 4, || {}).unwrap();
        writer.put_slice(b"abc");
        writer.cached_body().unwrap();
        assert!(matches!(writer.cached_body(), Err(CacheError::BufferingDisabled)));
    }

    #[test]
    fn test_chunk_mut_and_advance_mut_are_mirrored() {
        let started = Cell::new(0);
        let mut writer = CachingWriter::new(BytesMut::new(), 64, 8, || started.set(started.get() + 1)).unwrap();

        let chunk = writer.chunk_mut();
        assert!(chunk.len() >= 3);
        chunk[..3].copy_from_slice(b"abc");
        // SAFETY: the first three bytes of the chunk were just initialized
        unsafe { writer.advance_mut(3) };
        writer.put_u8(b'd');

        assert_eq!(started.get(), 2);
        assert_eq!(&writer.get_ref()[..], b"abcd");
        assert_eq!(&writer.cached_body().unwrap().to_bytes()[..], b"abcd");
    }

    #[test]
    fn test_slice_sink_is_mirrored_from_the_chunk() {
        let mut storage = [0u8; 16];
        let mut writer = CachingWriter::new(&mut storage[..], 64, 4, || {}).unwrap();

        let chunk = writer.chunk_mut();
        chunk[..3].copy_from_slice(b"abc");
        // SAFETY: the first three bytes of the chunk were just initialized
        unsafe { writer.advance_mut(3) };
        writer.put_slice(b"defg");

        assert!(writer.is_buffering());
        assert_eq!(writer.remaining_mut(), 9);
        assert_eq!(&writer.cached_body().unwrap().to_bytes()[..], b"abcdefg");
        drop(writer);
        assert_eq!(&storage[..7], b"abcdefg");
    }

    #[test]
    fn test_advance_without_chunk_disables_buffering() {
        let mut writer = CachingWriter::new(BytesMut::with_capacity(16), 64, 4, || {}).unwrap();
        writer.put_slice(b"ab");

        writer.get_mut().chunk_mut()[..2].copy_from_slice(b"cd");
        // SAFETY: two bytes of the inner chunk were initialized through `get_mut`
        unsafe { writer.advance_mut(2) };

        assert!(!writer.is_buffering());
        assert_eq!(&writer.get_ref()[..], b"abcd");
        assert!(matches!(writer.cached_body(), Err(CacheError::BufferingDisabled)));
    }

    #[test]
    fn test_disable_buffering() {
        let mut writer = CachingWriter::new(Vec::new(), 64, 8, || {}).unwrap();
        writer.put_slice(b"abc");
        writer.disable_buffering();
        writer.put_slice(b"def");
        assert_eq!(writer.buffered_len(), 0);
        assert_eq!(writer.into_inner(), b"abcdef");
    }

    #[tokio::test]
    async fn test_async_write_mirrors_and_forwards() {
        let started = Cell::new(false);
        let mut writer = CachingWriter::new(Vec::new(), 1024, 16, || started.set(true)).unwrap();
        writer.write_all(b"streamed ").await.unwrap();
        writer.write_all(b"response body").await.unwrap();
        writer.flush().await.unwrap();

        assert!(started.get());
        let body = writer.cached_body().unwrap();
        assert_eq!(&body.to_bytes()[..], b"streamed response body");
        assert_eq!(writer.get_ref(), b"streamed response body");
    }

    #[tokio::test]
    async fn test_async_write_over_limit() {
        let options = CacheOptions { max_body_size: 8, segment_size: 4, ..CacheOptions::default() };
        let mut writer = CachingWriter::with_options(Vec::new(), &options, || {}).unwrap();
        writer.write_all(b"0123456789").await.unwrap();
        assert!(!writer.is_buffering());
        assert_eq!(writer.get_ref(), b"0123456789");
        assert!(matches!(writer.cached_body(), Err(CacheError::BufferingDisabled)));
    }
}
