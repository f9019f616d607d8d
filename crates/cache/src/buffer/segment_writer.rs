use crate::buffer::{BufferPool, ByteSequence, SegmentChain};
use crate::error::CacheError;
use crate::utils::ensure;
use bytes::BytesMut;
use std::{cmp, io, mem};

/// Accumulates written bytes into fixed-size pooled segments.
///
/// Full segments are frozen and linked into a [`SegmentChain`]; the partially filled
/// tail stays mutable until the payload is detached. Dropping the writer without
/// detaching hands every buffer back to the shared [`BufferPool`].
#[derive(Debug)]
pub struct SegmentWriter {
    segment_size: usize,
    chain: SegmentChain,
    tail: BytesMut,
    length: u64,
}

impl SegmentWriter {
    pub fn new(segment_size: usize) -> Result<Self, CacheError> {
        ensure!(segment_size > 0, CacheError::invalid_argument("segment size must be greater than 0"));
        Ok(Self { segment_size, chain: SegmentChain::new(), tail: BytesMut::new(), length: 0 })
    }

    #[inline]
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Total number of bytes written so far.
    #[inline]
    pub fn len(&self) -> u64 {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Copies `src` into the tail segment, opening new segments as the tail fills up.
    pub fn write(&mut self, mut src: &[u8]) {
        while !src.is_empty() {
            if self.tail.len() == self.segment_size {
                let full = mem::take(&mut self.tail);
                self.chain.append(full.freeze());
            }
            if self.tail.capacity() == 0 {
                self.tail = BufferPool::shared().rent(self.segment_size);
            }

            let n = cmp::min(src.len(), self.segment_size - self.tail.len());
            self.tail.extend_from_slice(&src[..n]);
            src = &src[n..];
            self.length += n as u64;
        }
    }

    /// Closes the writer and returns everything written as an immutable sequence.
    pub fn detach_payload(mut self) -> ByteSequence {
        let mut chain = mem::take(&mut self.chain);
        let tail = mem::take(&mut self.tail);

        if self.length == 0 {
            chain.recycle(true);
            BufferPool::shared().give_back(tail);
            return ByteSequence::Empty;
        }

        if chain.is_empty() {
            return ByteSequence::Single(tail.freeze());
        }

        if !tail.is_empty() {
            chain.append(tail.freeze());
        }
        ByteSequence::Chain(chain)
    }
}

impl io::Write for SegmentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SegmentWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        mem::take(&mut self.chain).recycle(true);
        BufferPool::shared().give_back(mem::take(&mut self.tail));
    }
}
