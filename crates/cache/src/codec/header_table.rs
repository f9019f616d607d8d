//! Interning table for header names and values.
//!
//! A string found in the table is written as `(index << 1) | 1`; any other string is
//! written as `byte_len << 1` followed by its UTF-8 bytes. The empty string is a bare
//! zero preamble.
//!
//! Indices are part of the stored format, so every process sharing a store must use
//! the same table. Entries may only be appended; a retired entry is replaced by an
//! empty string, which keeps later indices stable and is never matched.

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::FormatError;
use bytes::BufMut;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct HeaderTable {
    values: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl HeaderTable {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let mut lookup = HashMap::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            if value.trim().is_empty() {
                continue;
            }
            lookup.entry(value.clone()).or_insert(index as u32);
        }
        Self { values, lookup }
    }

    /// A table that interns nothing; every string takes the literal path.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_of(&self, value: &str) -> Option<u32> {
        self.lookup.get(value).copied()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn write<B: BufMut>(&self, writer: &mut BinaryWriter<'_, B>, value: &str) {
        if value.is_empty() {
            writer.write_varint32(0);
            return;
        }

        match self.index_of(value) {
            Some(index) => writer.write_varint32((index << 1) | 1),
            None => {
                writer.write_varint32((value.len() as u32) << 1);
                writer.write_raw(value.as_bytes());
            }
        }
    }

    pub fn read(&self, reader: &mut BinaryReader<'_>) -> Result<String, FormatError> {
        let preamble = reader.read_length()?;
        // low bit selects between a table index and a literal length
        if preamble & 1 == 1 {
            let index = preamble >> 1;
            self.get(index)
                .map(str::to_owned)
                .ok_or_else(|| FormatError::corrupted(format!("interned string index {index} is outside a table of {}", self.len())))
        } else {
            reader.read_string_with_len(preamble >> 1)
        }
    }
}
