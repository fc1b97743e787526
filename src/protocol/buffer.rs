//! Buffer utilities for reading and writing binding codec data.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use bytes::{BufMut, Bytes, BytesMut};

/// Cursor over an encoded row or metadata block.
pub struct ReadBuffer {
    data: Bytes,
    pos: usize,
}

impl ReadBuffer {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[track_caller]
    fn ensure(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::BufferTooSmall {
                needed: n,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        Ok(())
    }

    /// Look at the next byte without consuming it.
    #[track_caller]
    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    #[track_caller]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    /// Read a big-endian u32.
    #[track_caller]
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let val = u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(val)
    }

    #[track_caller]
    pub fn read_i32_be(&mut self) -> Result<i32> {
        Ok(self.read_u32_be()? as i32)
    }

    /// Read a big-endian IEEE-754 double.
    #[track_caller]
    pub fn read_f64_be(&mut self) -> Result<f64> {
        self.ensure(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(f64::from_be_bytes(bytes))
    }

    #[track_caller]
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.ensure(n)?;
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Read a 64-bit length split into a high and a low big-endian u32.
    ///
    /// Lengths of 2^32 bytes or more are not supported.
    #[track_caller]
    pub fn read_field_length(&mut self) -> Result<usize> {
        let high = self.read_u32_be()?;
        if high > 0 {
            return Err(Error::codec("Field length > 2^32 not supported."));
        }
        Ok(self.read_u32_be()? as usize)
    }

    /// Read a length-prefixed payload following a tag byte.
    #[track_caller]
    pub fn read_field_payload(&mut self) -> Result<Bytes> {
        let len = self.read_field_length()?;
        self.read_bytes(len)
    }

    /// Read a length-prefixed UTF-8 payload.
    #[track_caller]
    pub fn read_field_str(&mut self) -> Result<String> {
        let payload = self.read_field_payload()?;
        String::from_utf8(payload.to_vec())
            .map_err(|e| Error::codec(format!("Invalid UTF-8 in field: {}", e)))
    }
}

/// Growable output for the row codec.
pub struct WriteBuffer {
    data: BytesMut,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    pub fn write_u8(&mut self, val: u8) {
        self.data.put_u8(val);
    }

    pub fn write_u32_be(&mut self, val: u32) {
        self.data.put_u32(val);
    }

    pub fn write_i32_be(&mut self, val: i32) {
        self.data.put_i32(val);
    }

    pub fn write_f64_be(&mut self, val: f64) {
        self.data.put_f64(val);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    /// Write a tag followed by a 64-bit length and the payload.
    pub fn write_field(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::codec("Field length > 2^32 not supported."))?;
        self.data.reserve(FIELD_HEADER_SIZE + payload.len());
        self.write_u8(tag);
        self.write_u32_be(0);
        self.write_u32_be(len);
        self.write_bytes(payload);
        Ok(())
    }

    /// Write the row terminator.
    pub fn write_terminator(&mut self) {
        self.write_u8(TAG_ROW_TERMINATOR);
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_field_layout() {
        let mut buf = WriteBuffer::new();
        buf.write_field(TAG_STRING, b"abc").unwrap();
        assert_eq!(
            buf.as_bytes(),
            &[b'S', 0, 0, 0, 0, 0, 0, 0, 3, b'a', b'b', b'c']
        );

        let mut rd = ReadBuffer::new(buf.freeze());
        assert_eq!(rd.read_u8().unwrap(), TAG_STRING);
        assert_eq!(rd.read_field_str().unwrap(), "abc");
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn test_read_too_short() {
        let mut rd = ReadBuffer::new(Bytes::from_static(&[0, 1]));
        let err = rd.read_u32_be().unwrap_err();
        assert!(matches!(
            err,
            Error::BufferTooSmall {
                needed: 4,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_high_length_rejected() {
        let mut rd = ReadBuffer::new(Bytes::from_static(&[0, 0, 0, 1, 0, 0, 0, 0]));
        assert!(matches!(rd.read_field_length(), Err(Error::Codec { .. })));
    }
}
