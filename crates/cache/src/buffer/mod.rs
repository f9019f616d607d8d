//! Pooled buffer machinery used on the response write path.
//!
//! # Components
//!
//! - [`BufferPool`] and [`VecPool`]: lock-free, bounded pools of segment buffers and
//!   entry arrays
//! - [`SegmentChain`]: singly linked chain of byte views whose nodes are recycled
//!   through a process-wide free list
//! - [`ByteSequence`]: immutable view over zero, one or many segments
//! - [`SegmentWriter`]: accumulates written bytes into fixed-size pooled segments

mod pool;
mod segment;
mod segment_writer;
mod sequence;

pub use pool::{header_pool, tag_pool, BufferPool, VecPool};
pub use segment::{ChainIter, SegmentChain, SegmentNode, MAX_SPARE_SEGMENTS};
pub use segment_writer::SegmentWriter;
pub use sequence::{ByteSequence, Segments};
