//! Packed cursor primitives: a typed reader/writer pair that advances by
//! known encodings and applies the canonical 8-byte alignment rule.
//!
//! Same incremental `read_*`/`write_*` shape as a conventional framed
//! buffer cursor, but big-endian throughout, with `align8`/padding
//! helpers in place of variable-length encodings.

use crate::error::{Error, Result};
use crate::protocol::constants::OR_ALIGNMENT;
use bytes::{Bytes, BytesMut};

/// A cursor for reading packed data out of a received reply buffer.
pub struct PackedReader {
    data: Bytes,
    pos: usize,
}

impl PackedReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[track_caller]
    fn need(&self, n: usize) -> Result<()> {
        if !self.has_remaining(n) {
            return Err(Error::BufferTooSmall {
                needed: n,
                available: self.remaining(),
                location: std::panic::Location::caller(),
            });
        }
        Ok(())
    }

    #[track_caller]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.need(n)?;
        self.pos += n;
        Ok(())
    }

    #[track_caller]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    #[track_caller]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        let val = i32::from_be_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(val)
    }

    #[track_caller]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let val = u32::from_be_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(val)
    }

    #[track_caller]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.need(8)?;
        let val = i64::from_be_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(val)
    }

    #[track_caller]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let val = u64::from_be_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(val)
    }

    #[track_caller]
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    #[track_caller]
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        let bytes = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(bytes)
    }

    /// Align the read position up to the next 8-byte boundary, consuming
    /// (and discarding) the padding bytes.
    #[track_caller]
    pub fn align8(&mut self) -> Result<()> {
        let pad = (OR_ALIGNMENT - (self.pos % OR_ALIGNMENT)) % OR_ALIGNMENT;
        if pad > 0 {
            self.skip(pad)?;
        }
        Ok(())
    }

    /// Read a length-prefixed string: `int32 length; bytes[length]; pad to 4`.
    #[track_caller]
    pub fn read_string_prefixed(&mut self) -> Result<String> {
        let len = self.read_i32()? as usize;
        let bytes = self.read_bytes(len)?;
        let pad = (4 - (len % 4)) % 4;
        self.skip(pad)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a null-padded string stream: `bytes[length]; 0x00; pad to 4`.
    #[track_caller]
    pub fn read_string_null_padded(&mut self, declared_len: usize) -> Result<String> {
        let bytes = self.read_bytes(declared_len)?;
        self.skip(1)?; // terminating zero byte
        let total = declared_len + 1;
        let pad = (4 - (total % 4)) % 4;
        self.skip(pad)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A cursor for building a packed request buffer.
pub struct PackedWriter {
    data: BytesMut,
}

impl PackedWriter {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
        }
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

    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    pub fn write_u8(&mut self, val: u8) {
        self.data.extend_from_slice(&[val]);
    }

    pub fn write_i32(&mut self, val: i32) {
        self.data.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.data.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_i64(&mut self, val: i64) {
        self.data.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.data.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_f64(&mut self, val: f64) {
        self.write_u64(val.to_bits());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }

    /// Pad the write position up to the next 8-byte boundary with zeros.
    pub fn align8(&mut self) {
        let pad = (OR_ALIGNMENT - (self.data.len() % OR_ALIGNMENT)) % OR_ALIGNMENT;
        self.write_zeros(pad);
    }

    /// Write a length-prefixed string: `int32 length; bytes; pad to 4`.
    pub fn write_string_prefixed(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.write_i32(bytes.len() as i32);
        self.write_bytes(bytes);
        let pad = (4 - (bytes.len() % 4)) % 4;
        self.write_zeros(pad);
    }

    /// Write a null-padded string stream: `bytes; 0x00; pad to 4`.
    pub fn write_string_null_padded(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.write_bytes(bytes);
        self.write_u8(0);
        let total = bytes.len() + 1;
        let pad = (4 - (total % 4)) % 4;
        self.write_zeros(pad);
    }
}

impl Default for PackedWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the wire size of a length-prefixed string without writing it
/// (§4.2: "packed_length must be called before allocation").
pub fn string_prefixed_packed_length(s: &str) -> usize {
    let len = s.len();
    4 + len + ((4 - (len % 4)) % 4)
}

/// Compute the wire size of a null-padded string stream.
pub fn string_null_padded_packed_length(s: &str) -> usize {
    let total = s.len() + 1;
    total + ((4 - (total % 4)) % 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_prefixed_round_trip() {
        let mut w = PackedWriter::new();
        w.write_string_prefixed("hello");
        let bytes = w.freeze();
        assert_eq!(bytes.len(), string_prefixed_packed_length("hello"));

        let mut r = PackedReader::new(bytes);
        assert_eq!(r.read_string_prefixed().unwrap(), "hello");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn string_null_padded_round_trip() {
        let mut w = PackedWriter::new();
        w.write_string_null_padded("abc");
        let bytes = w.freeze();
        assert_eq!(bytes.len(), string_null_padded_packed_length("abc"));

        let mut r = PackedReader::new(bytes);
        assert_eq!(r.read_string_null_padded(3).unwrap(), "abc");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn align8_pads_to_boundary() {
        let mut w = PackedWriter::new();
        w.write_u8(1);
        w.align8();
        assert_eq!(w.len(), 8);

        let mut r = PackedReader::new(w.freeze());
        r.read_u8().unwrap();
        r.align8().unwrap();
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn read_past_end_is_buffer_too_small() {
        let mut r = PackedReader::new(Bytes::from_static(&[1, 2]));
        assert!(matches!(r.read_i32(), Err(Error::BufferTooSmall { .. })));
    }
}
