//! Pooled segment chains.
//!
//! A [`SegmentChain`] is a singly linked list of [`Bytes`] views describing one logical
//! byte sequence without copying it. The node records are recycled through a
//! process-wide, lock-free free list so that building and tearing down chains on the
//! hot path does not allocate once the process is warm.
//!
//! Nodes are owned either by the free list or by exactly one chain, never by the
//! previous node. The `next` link is the index of the following node inside the
//! owning chain.

use crate::buffer::BufferPool;
use bytes::Bytes;
use crossbeam_queue::ArrayQueue;
use once_cell::sync::Lazy;
use tracing::trace;

/// Upper bound on the number of idle nodes kept by the free list
pub const MAX_SPARE_SEGMENTS: usize = 128;

static SPARE_SEGMENTS: Lazy<ArrayQueue<Box<SegmentNode>>> = Lazy::new(|| ArrayQueue::new(MAX_SPARE_SEGMENTS));

/// One contiguous chunk of a chained byte sequence.
#[derive(Debug, Default)]
pub struct SegmentNode {
    memory: Bytes,
    running_index: u64,
    next: Option<usize>,
}

impl SegmentNode {
    fn rent(memory: Bytes) -> Box<Self> {
        let mut node = SPARE_SEGMENTS.pop().unwrap_or_default();
        node.memory = memory;
        node
    }

    /// The bytes of this segment.
    #[inline]
    pub fn memory(&self) -> &Bytes {
        &self.memory
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Offset of this segment's first byte from the start of the sequence.
    #[inline]
    pub fn running_index(&self) -> u64 {
        self.running_index
    }

    /// Index of the following node in the owning chain.
    #[inline]
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    fn clear(&mut self) -> Bytes {
        self.running_index = 0;
        self.next = None;
        std::mem::take(&mut self.memory)
    }
}

/// An ordered chain of pooled segment nodes.
#[derive(Debug, Default)]
pub struct SegmentChain {
    nodes: Vec<Box<SegmentNode>>,
}

impl SegmentChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(segments: usize) -> Self {
        Self { nodes: Vec::with_capacity(segments) }
    }

    /// Links `memory` after the current tail and returns the index of the new node.
    ///
    /// The node comes from the free list when one is available. Its running index is
    /// the previous node's running index plus the previous node's length.
    pub fn append(&mut self, memory: Bytes) -> usize {
        let index = self.nodes.len();
        let mut node = SegmentNode::rent(memory);
        if let Some(previous) = self.nodes.last_mut() {
            node.running_index = previous.running_index + previous.len() as u64;
            previous.next = Some(index);
        }
        self.nodes.push(node);
        index
    }

    /// Number of segments in the chain.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of bytes across all segments.
    pub fn byte_len(&self) -> u64 {
        self.nodes.last().map_or(0, |last| last.running_index + last.len() as u64)
    }

    pub fn get(&self, index: usize) -> Option<&SegmentNode> {
        self.nodes.get(index).map(AsRef::as_ref)
    }

    pub fn first(&self) -> Option<&SegmentNode> {
        self.get(0)
    }

    /// Walks the chain from its head following the `next` links.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { chain: self, next: if self.nodes.is_empty() { None } else { Some(0) } }
    }

    /// Breaks the chain and hands every node back to the free list.
    ///
    /// Nodes beyond the free list's capacity are dropped. With `recycle_buffers` set,
    /// segment memory that is not shared with anyone else goes back to the shared
    /// [`BufferPool`]; it must be false whenever the memory may still be referenced
    /// elsewhere, for example by the live response.
    pub fn recycle(self, recycle_buffers: bool) {
        let pool = BufferPool::shared();
        let mut dropped = 0usize;
        for mut node in self.nodes {
            let memory = node.clear();
            if recycle_buffers && let Ok(buf) = memory.try_into_mut() {
                pool.give_back(buf);
            }
            if SPARE_SEGMENTS.push(node).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            trace!(dropped, "segment free list is full, dropping nodes");
        }
    }

    /// Number of idle nodes currently held by the free list.
    pub fn spare_count() -> usize {
        SPARE_SEGMENTS.len()
    }
}

/// Iterator over the segment memory of a [`SegmentChain`], in chain order.
#[derive(Debug)]
pub struct ChainIter<'a> {
    chain: &'a SegmentChain,
    next: Option<usize>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.chain.get(self.next?)?;
        self.next = node.next;
        Some(&node.memory)
    }
}
