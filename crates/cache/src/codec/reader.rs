//! Zero-copy binary cursor over a stored entry.
//!
//! The varint layout is the classic 7-bit scheme: the low seven bits of every byte
//! carry data, least significant group first, and the high bit marks that another
//! byte follows.

use crate::error::FormatError;
use bytes::Bytes;
use std::str;

/// Bytes a 32-bit varint may use before the last, range-checked byte
const VARINT32_PLAIN_BYTES: u32 = 4;

/// Bytes a 64-bit varint may use before the last, range-checked byte
const VARINT64_PLAIN_BYTES: u32 = 9;

/// A forward-only reader borrowing the buffer it decodes.
///
/// Slices handed out by [`read_bytes_slice`](Self::read_bytes_slice) borrow the
/// underlying buffer, while [`read_bytes_shared`](Self::read_bytes_shared) returns a
/// [`Bytes`] handle sharing its allocation. Neither copies.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    original: &'a Bytes,
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(original: &'a Bytes) -> Self {
        Self { original, offset: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.original.len() - self.offset
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.offset >= self.original.len()
    }

    pub fn read_byte(&mut self) -> Result<u8, FormatError> {
        match self.original.get(self.offset) {
            Some(&byte) => {
                self.offset += 1;
                Ok(byte)
            }
            None => Err(FormatError::end_of_data(1, 0)),
        }
    }

    /// Reads a varint holding at most 32 bits.
    ///
    /// The first four bytes can't overflow; the fifth may only contribute the
    /// remaining four bits and must not carry a continuation bit.
    pub fn read_varint32(&mut self) -> Result<u32, FormatError> {
        let mut result = 0u32;
        for i in 0..VARINT32_PLAIN_BYTES {
            let byte = self.read_byte()?;
            result |= u32::from(byte & 0x7F) << (i * 7);
            if byte <= 0x7F {
                return Ok(result);
            }
        }

        let byte = self.read_byte()?;
        if byte > 0b1111 {
            return Err(FormatError::overflow(32));
        }
        Ok(result | u32::from(byte) << (VARINT32_PLAIN_BYTES * 7))
    }

    /// Reads a varint holding at most 64 bits.
    ///
    /// The first nine bytes can't overflow; the tenth may only contribute the last bit.
    pub fn read_varint64(&mut self) -> Result<u64, FormatError> {
        let mut result = 0u64;
        for i in 0..VARINT64_PLAIN_BYTES {
            let byte = self.read_byte()?;
            result |= u64::from(byte & 0x7F) << (i * 7);
            if byte <= 0x7F {
                return Ok(result);
            }
        }

        let byte = self.read_byte()?;
        if byte > 0b1 {
            return Err(FormatError::overflow(64));
        }
        Ok(result | u64::from(byte) << (VARINT64_PLAIN_BYTES * 7))
    }

    /// Reads a varint32 that must fit a non-negative `i32`, as counts and lengths do.
    pub fn read_length(&mut self) -> Result<usize, FormatError> {
        let value = self.read_varint32()?;
        if value > i32::MAX as u32 {
            return Err(FormatError::corrupted(format!("negative length {}", value as i32)));
        }
        Ok(value as usize)
    }

    /// Reads a varint32 length prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_length()?;
        self.read_string_with_len(len)
    }

    /// Reads `len` bytes of UTF-8 whose length is already known to the caller.
    pub fn read_string_with_len(&mut self, len: usize) -> Result<String, FormatError> {
        if len == 0 {
            self.check_available(0)?;
            return Ok(String::new());
        }
        let bytes = self.read_bytes_slice(len)?;
        Ok(str::from_utf8(bytes)?.to_owned())
    }

    /// Skips over a length-prefixed string.
    pub fn skip_string(&mut self) -> Result<(), FormatError> {
        let len = self.read_length()?;
        self.skip(len)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), FormatError> {
        self.check_available(count)?;
        self.offset += count;
        Ok(())
    }

    /// Borrows the next `count` bytes.
    pub fn read_bytes_slice(&mut self, count: usize) -> Result<&'a [u8], FormatError> {
        self.check_available(count)?;
        let original: &'a Bytes = self.original;
        let slice = &original[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    /// Copies the next `count` bytes into a fresh vector.
    pub fn read_bytes_owned(&mut self, count: usize) -> Result<Vec<u8>, FormatError> {
        self.read_bytes_slice(count).map(<[u8]>::to_vec)
    }

    /// Returns the next `count` bytes as a handle sharing the reader's buffer.
    pub fn read_bytes_shared(&mut self, count: usize) -> Result<Bytes, FormatError> {
        self.check_available(count)?;
        if count == 0 {
            return Ok(Bytes::new());
        }
        let bytes = self.original.slice(self.offset..self.offset + count);
        self.offset += count;
        Ok(bytes)
    }

    #[inline]
    fn check_available(&self, count: usize) -> Result<(), FormatError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(FormatError::end_of_data(count, remaining));
        }
        Ok(())
    }
}
