//! Low-level byte-buffer reader/writer used by the frame protocol.
//!
//! `Decoder` reads fixed-width big-endian integers and byte ranges at
//! caller-supplied offsets; every read is bounds-checked and fails with
//! [`CodecError::OutOfRange`] past the end of the buffer.
//!
//! `Encoder` accumulates into a pre-sized buffer at a monotonic cursor and
//! is deliberately not resizable: encoding logic precomputes the exact
//! capacity, and overrunning it is a bug in the encoder, not a recoverable
//! condition, so it panics.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Codec-level errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("invalid utf-8 in {len}-byte string at offset {offset}")]
    InvalidString { offset: usize, len: usize },
}

/// Reader over an immutable byte range.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    b: &'a [u8],
}

macro_rules! read_be {
    ($name:ident, $ty:ty) => {
        pub fn $name(&self, offset: usize) -> Result<$ty, CodecError> {
            const N: usize = std::mem::size_of::<$ty>();
            let raw = self.read_bytes(offset, N)?;
            let mut buf = [0u8; N];
            buf.copy_from_slice(raw);
            Ok(<$ty>::from_be_bytes(buf))
        }
    };
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub const fn new(b: &'a [u8]) -> Self {
        Self { b }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.b.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    read_be!(read_u8, u8);
    read_be!(read_i8, i8);
    read_be!(read_u16, u16);
    read_be!(read_i16, i16);
    read_be!(read_u32, u32);
    read_be!(read_i32, i32);
    read_be!(read_u64, u64);
    read_be!(read_i64, i64);

    /// Borrow `len` raw bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], CodecError> {
        let end = offset.checked_add(len).filter(|end| *end <= self.b.len());
        match end {
            Some(end) => Ok(&self.b[offset..end]),
            None => Err(CodecError::OutOfRange {
                offset,
                len,
                size: self.b.len(),
            }),
        }
    }

    /// Borrow a `len`-byte UTF-8 string starting at `offset`.
    pub fn read_str(&self, offset: usize, len: usize) -> Result<&'a str, CodecError> {
        let raw = self.read_bytes(offset, len)?;
        std::str::from_utf8(raw).map_err(|_| CodecError::InvalidString { offset, len })
    }
}

/// Writer over a pre-sized buffer with a monotonic cursor.
///
/// `freeze` yields exactly the written prefix. Writes past the declared
/// capacity panic.
#[derive(Debug)]
pub struct Encoder {
    b: BytesMut,
    cap: usize,
}

macro_rules! write_be {
    ($name:ident, $put:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            self.claim(std::mem::size_of::<$ty>());
            self.b.$put(value);
        }
    };
}

impl Encoder {
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            b: BytesMut::with_capacity(cap),
            cap,
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.b.len()
    }

    fn claim(&mut self, n: usize) {
        assert!(
            self.b.len() + n <= self.cap,
            "encoder capacity overrun: {} + {} > {}",
            self.b.len(),
            n,
            self.cap
        );
    }

    write_be!(put_u8, put_u8, u8);
    write_be!(put_i8, put_i8, i8);
    write_be!(put_u16, put_u16, u16);
    write_be!(put_i16, put_i16, i16);
    write_be!(put_u32, put_u32, u32);
    write_be!(put_i32, put_i32, i32);
    write_be!(put_u64, put_u64, u64);
    write_be!(put_i64, put_i64, i64);

    pub fn put_slice(&mut self, value: &[u8]) {
        self.claim(value.len());
        self.b.extend_from_slice(value);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_slice(value.as_bytes());
    }

    /// String with a 1-byte length prefix. The string must fit in 255 bytes.
    pub fn put_str_u8(&mut self, value: &str) {
        assert!(value.len() <= u8::MAX as usize, "string too long for u8 prefix");
        self.put_u8(value.len() as u8);
        self.put_slice(value.as_bytes());
    }

    /// String with a 4-byte big-endian length prefix.
    pub fn put_str_u32(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.put_slice(value.as_bytes());
    }

    /// Finish, yielding exactly the written prefix.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.b.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_roundtrip() {
        let mut enc = Encoder::with_capacity(30);
        enc.put_u8(0xAB);
        enc.put_i8(-3);
        enc.put_u16(0xBEEF);
        enc.put_i16(-2_000);
        enc.put_u32(0xDEAD_BEEF);
        enc.put_i32(-70_000);
        enc.put_u64(0x0102_0304_0506_0708);
        enc.put_i64(-5_000_000_000);
        let b = enc.freeze();
        assert_eq!(b.len(), 30);

        let dec = Decoder::new(&b);
        assert_eq!(dec.read_u8(0).unwrap(), 0xAB);
        assert_eq!(dec.read_i8(1).unwrap(), -3);
        assert_eq!(dec.read_u16(2).unwrap(), 0xBEEF);
        assert_eq!(dec.read_i16(4).unwrap(), -2_000);
        assert_eq!(dec.read_u32(6).unwrap(), 0xDEAD_BEEF);
        assert_eq!(dec.read_i32(10).unwrap(), -70_000);
        assert_eq!(dec.read_u64(14).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(dec.read_i64(22).unwrap(), -5_000_000_000);
    }

    #[test]
    fn big_endian_on_the_wire() {
        let mut enc = Encoder::with_capacity(4);
        enc.put_u32(0x0102_0304);
        assert_eq!(&enc.freeze()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_reads_fail() {
        let dec = Decoder::new(&[1, 2, 3]);
        assert!(dec.read_u32(0).is_err());
        assert!(dec.read_u8(3).is_err());
        assert!(dec.read_bytes(2, 2).is_err());
        assert!(matches!(
            dec.read_u64(usize::MAX),
            Err(CodecError::OutOfRange { .. })
        ));
        assert_eq!(dec.read_u16(1).unwrap(), 0x0203);
    }

    #[test]
    fn length_prefixed_strings() {
        let mut enc = Encoder::with_capacity(1 + 3 + 4 + 5);
        enc.put_str_u8("key");
        enc.put_str_u32("value");
        let b = enc.freeze();

        let dec = Decoder::new(&b);
        let klen = dec.read_u8(0).unwrap() as usize;
        assert_eq!(dec.read_str(1, klen).unwrap(), "key");
        let vlen = dec.read_u32(1 + klen).unwrap() as usize;
        assert_eq!(dec.read_str(1 + klen + 4, vlen).unwrap(), "value");
    }

    #[test]
    fn freeze_is_exact_written_prefix() {
        let mut enc = Encoder::with_capacity(16);
        enc.put_u8(1);
        enc.put_u16(2);
        assert_eq!(enc.written(), 3);
        assert_eq!(enc.freeze().len(), 3);
    }

    #[test]
    #[should_panic(expected = "encoder capacity overrun")]
    fn overrun_panics() {
        let mut enc = Encoder::with_capacity(2);
        enc.put_u32(7);
    }
}
