use crate::buffer::segment::{ChainIter, SegmentChain};
use crate::buffer::BufferPool;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An immutable view over a logical byte sequence made of zero, one or many segments.
///
/// The single-segment shape is kept apart from the chained one so the common case of
/// a small body never touches the segment free list.
#[derive(Debug, Default)]
pub enum ByteSequence {
    /// No bytes at all
    #[default]
    Empty,
    /// One contiguous segment
    Single(Bytes),
    /// Two or more pooled segments
    Chain(SegmentChain),
}

impl ByteSequence {
    /// Builds a sequence over already materialized segments without copying them.
    pub fn from_segments(segments: Vec<Bytes>) -> Self {
        match segments.len() {
            0 => Self::Empty,
            1 => segments.into_iter().next().map_or(Self::Empty, Self::Single),
            count => {
                let mut chain = SegmentChain::with_capacity(count);
                for segment in segments {
                    chain.append(segment);
                }
                Self::Chain(chain)
            }
        }
    }

    /// Total number of bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Single(bytes) => bytes.len() as u64,
            Self::Chain(chain) => chain.byte_len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_single_segment(&self) -> bool {
        !matches!(self, Self::Chain(_))
    }

    pub fn segment_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Chain(chain) => chain.segment_count(),
        }
    }

    /// The first segment, if any.
    pub fn first(&self) -> Option<&Bytes> {
        self.segments().next()
    }

    /// Iterates the segments in order.
    pub fn segments(&self) -> Segments<'_> {
        let inner = match self {
            Self::Empty => SegmentsInner::Single(None),
            Self::Single(bytes) => SegmentsInner::Single(Some(bytes)),
            Self::Chain(chain) => SegmentsInner::Chain(chain.iter()),
        };
        Segments { inner }
    }

    /// Returns the whole sequence as one contiguous buffer.
    ///
    /// Only multi-segment sequences are copied.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Single(bytes) => bytes.clone(),
            Self::Chain(chain) => {
                let mut buf = BytesMut::with_capacity(chain.byte_len() as usize);
                for segment in chain.iter() {
                    buf.extend_from_slice(segment);
                }
                buf.freeze()
            }
        }
    }

    /// Releases the sequence.
    ///
    /// Chain nodes always go back to the free list. The segment memory is only handed
    /// to the buffer pool when `recycle_buffers` is set and nobody else holds it.
    pub fn recycle(self, recycle_buffers: bool) {
        match self {
            Self::Empty => {}
            Self::Single(bytes) => {
                if recycle_buffers && let Ok(buf) = bytes.try_into_mut() {
                    BufferPool::shared().give_back(buf);
                }
            }
            Self::Chain(chain) => chain.recycle(recycle_buffers),
        }
    }

    /// Writes every segment to `dst` in order.
    pub async fn copy_to<W>(&self, dst: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Self::Empty => Ok(()),
            Self::Single(bytes) => dst.write_all(bytes).await,
            Self::Chain(chain) => {
                for segment in chain.iter() {
                    dst.write_all(segment).await?;
                }
                Ok(())
            }
        }
    }
}

impl From<Bytes> for ByteSequence {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::Empty } else { Self::Single(bytes) }
    }
}

/// Iterator over the segments of a [`ByteSequence`].
#[derive(Debug)]
pub struct Segments<'a> {
    inner: SegmentsInner<'a>,
}

#[derive(Debug)]
enum SegmentsInner<'a> {
    Single(Option<&'a Bytes>),
    Chain(ChainIter<'a>),
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            SegmentsInner::Single(bytes) => bytes.take(),
            SegmentsInner::Chain(iter) => iter.next(),
        }
    }
}
