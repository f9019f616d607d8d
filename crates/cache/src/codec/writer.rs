use bytes::BufMut;

/// Encoder side of [`BinaryReader`](super::BinaryReader), writing into any growable buffer.
#[derive(Debug)]
pub struct BinaryWriter<'a, B> {
    dst: &'a mut B,
}

impl<'a, B: BufMut> BinaryWriter<'a, B> {
    pub fn new(dst: &'a mut B) -> Self {
        Self { dst }
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.dst.put_u8(byte);
    }

    pub fn write_varint32(&mut self, value: u32) {
        self.write_varint64(u64::from(value));
    }

    pub fn write_varint64(&mut self, mut value: u64) {
        while value > 0x7F {
            self.dst.put_u8((value as u8) | 0x80);
            value >>= 7;
        }
        self.dst.put_u8(value as u8);
    }

    /// Writes the UTF-8 length as a varint32 followed by the bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_varint32(value.len() as u32);
        self.write_raw(value.as_bytes());
    }

    /// Writes bytes the caller has already laid out.
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.dst.put_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BinaryReader;
    use bytes::BytesMut;

    fn encoded_len(value: u64) -> usize {
        let mut buf = BytesMut::new();
        BinaryWriter::new(&mut buf).write_varint64(value);
        buf.len()
    }

    #[test]
    fn test_varint_layout() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_varint32(0);
        writer.write_varint32(127);
        writer.write_varint32(128);
        writer.write_varint32(300);
        assert_eq!(&buf[..], &[0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_varint_sizes() {
        assert_eq!(encoded_len(0), 1);
        assert_eq!(encoded_len(u64::from(u32::MAX)), 5);
        assert_eq!(encoded_len(u64::MAX), 10);
    }

    #[test]
    fn test_varint32_round_trip() {
        let values = [0, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455, 268_435_456, i32::MAX as u32, u32::MAX];
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        for value in values {
            writer.write_varint32(value);
        }

        let bytes = buf.freeze();
        let mut reader = BinaryReader::new(&bytes);
        for value in values {
            assert_eq!(reader.read_varint32(), Ok(value));
        }
        assert!(reader.is_eof());
    }

    #[test]
    fn test_varint64_round_trip() {
        let mut values: Vec<u64> = (0..64).map(|shift| 1u64 << shift).collect();
        values.extend((1..64).map(|shift| (1u64 << shift) - 1));
        values.extend([u64::MAX, (-1i64) as u64, i64::MIN as u64]);

        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        for &value in &values {
            writer.write_varint64(value);
        }

        let bytes = buf.freeze();
        let mut reader = BinaryReader::new(&bytes);
        for &value in &values {
            assert_eq!(reader.read_varint64(), Ok(value));
        }
        assert!(reader.is_eof());
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_string("");
        writer.write_string("x-request-id");
        writer.write_string("naïve ☕");

        let bytes = buf.freeze();
        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.read_string().unwrap(), "x-request-id");
        assert_eq!(reader.read_string().unwrap(), "naïve ☕");
    }
}
