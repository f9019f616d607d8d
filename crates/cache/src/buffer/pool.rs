//! Process-wide pools for segment buffers and the header/tag arrays of cache entries.
//!
//! All pools are backed by a lock-free [`ArrayQueue`]. Renting from an empty pool
//! allocates, returning to a full pool drops the value, so the pools never block
//! and never grow past their capacity.

use crate::entry::CachedHeader;
use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use once_cell::sync::Lazy;
use std::fmt;

/// Number of segment buffers kept around by the shared [`BufferPool`]
pub const BUFFER_POOL_CAPACITY: usize = 256;

/// Buffers larger than this are never pooled
pub const MAX_POOLED_BUFFER_SIZE: usize = 1024 * 1024;

/// Number of arrays kept per [`VecPool`]
pub const VEC_POOL_CAPACITY: usize = 128;

/// Arrays with a capacity above this are dropped instead of pooled
const MAX_POOLED_VEC_CAPACITY: usize = 1024;

static SHARED_BUFFERS: Lazy<BufferPool> = Lazy::new(|| BufferPool::new(BUFFER_POOL_CAPACITY));
static SHARED_HEADERS: Lazy<VecPool<CachedHeader>> = Lazy::new(|| VecPool::new(VEC_POOL_CAPACITY));
static SHARED_TAGS: Lazy<VecPool<String>> = Lazy::new(|| VecPool::new(VEC_POOL_CAPACITY));

/// A pool of byte buffers used as segment storage and serialization scratch space.
pub struct BufferPool {
    buffers: ArrayQueue<BytesMut>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self { buffers: ArrayQueue::new(capacity.max(1)) }
    }

    /// The pool shared by every cache entry in the process.
    pub fn shared() -> &'static BufferPool {
        &SHARED_BUFFERS
    }

    /// Rents an empty buffer with at least `min_capacity` bytes of capacity.
    pub fn rent(&self, min_capacity: usize) -> BytesMut {
        match self.buffers.pop() {
            Some(mut buf) => {
                if buf.capacity() < min_capacity {
                    buf.reserve(min_capacity);
                }
                buf
            }
            None => BytesMut::with_capacity(min_capacity),
        }
    }

    /// Returns a buffer to the pool; the content is discarded.
    pub fn give_back(&self, mut buf: BytesMut) {
        if buf.capacity() == 0 || buf.capacity() > MAX_POOLED_BUFFER_SIZE {
            return;
        }
        buf.clear();
        let _ = self.buffers.push(buf);
    }

    pub fn available(&self) -> usize {
        self.buffers.len()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool").field("available", &self.buffers.len()).field("capacity", &self.buffers.capacity()).finish()
    }
}

/// A pool of reusable arrays.
pub struct VecPool<T> {
    arrays: ArrayQueue<Vec<T>>,
}

impl<T> VecPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self { arrays: ArrayQueue::new(capacity.max(1)) }
    }

    /// Rents an empty array able to hold `count` items without reallocating.
    pub fn rent(&self, count: usize) -> Vec<T> {
        match self.arrays.pop() {
            Some(mut arr) => {
                arr.reserve_exact(count);
                arr
            }
            None => Vec::with_capacity(count),
        }
    }

    /// Returns an array to the pool, dropping its items.
    pub fn give_back(&self, mut arr: Vec<T>) {
        if arr.capacity() == 0 || arr.capacity() > MAX_POOLED_VEC_CAPACITY {
            return;
        }
        arr.clear();
        let _ = self.arrays.push(arr);
    }

    pub fn available(&self) -> usize {
        self.arrays.len()
    }
}

impl<T> fmt::Debug for VecPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecPool").field("available", &self.arrays.len()).field("capacity", &self.arrays.capacity()).finish()
    }
}

/// The pool of header arrays shared by cache entries.
pub fn header_pool() -> &'static VecPool<CachedHeader> {
    &SHARED_HEADERS
}

/// The pool of tag arrays shared by cache entries.
pub fn tag_pool() -> &'static VecPool<String> {
    &SHARED_TAGS
}
