use std::str::Utf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("entry format error: {source}")]
    Format {
        #[from]
        source: FormatError,
    },

    #[error("store error: {source}")]
    Store {
        #[from]
        source: StoreError,
    },

    /// The response is still valid, it just can't be cached.
    #[error("buffered body cannot be retrieved since buffering is disabled")]
    BufferingDisabled,

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl CacheError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    /// Returns true if the stored bytes are unusable and the entry should be evicted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("unexpected end of data, need {needed} bytes but only {remaining} remain")]
    EndOfData { needed: usize, remaining: usize },

    #[error("varint exceeds {bits} bits")]
    Overflow { bits: u32 },

    #[error("invalid utf-8 string: {source}")]
    InvalidUtf8 {
        #[from]
        source: Utf8Error,
    },

    #[error("corrupted entry: {reason}")]
    Corrupted { reason: String },
}

impl FormatError {
    pub fn end_of_data(needed: usize, remaining: usize) -> Self {
        Self::EndOfData { needed, remaining }
    }

    pub fn overflow(bits: u32) -> Self {
        Self::Overflow { bits }
    }

    pub fn corrupted<S: ToString>(str: S) -> Self {
        Self::Corrupted { reason: str.to_string() }
    }

    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData { .. })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store operation canceled")]
    Canceled,

    #[error("store backend error: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn backend<S: ToString>(str: S) -> Self {
        Self::Backend { reason: str.to_string() }
    }
}
