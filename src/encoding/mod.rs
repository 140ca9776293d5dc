// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Compact binary primitives used by the update format.
//!
//! # Unsigned varints
//!
//! Seven payload bits per byte, least significant group first, with the
//! high bit set on every byte except the last. A `u32` takes at most five
//! bytes; a sixth byte is rejected.
//!
//! # Signed varints
//!
//! Sign-magnitude rather than zig-zag: the first byte carries a
//! continuation bit, a sign bit, and six payload bits; every following
//! byte carries seven. Because the sign is an explicit flag, "negative
//! zero" is representable, which the run-length encoders in [`rle`] use
//! as an in-band marker.
//!
//! # Strings and buffers
//!
//! Both are a varint byte length followed by the raw bytes. Strings must
//! be valid UTF-8.

pub mod any;
pub mod rle;

use crate::error::Error;
use crate::error::Result;

/// A signed value read from the wire, keeping the sign flag separately so
/// that `-0` survives a round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signed {
    /// The numeric value (`-0` reads as `0`).
    pub value: i64,
    /// Whether the sign bit was set.
    pub negative: bool,
}

impl Signed {
    /// Create a signed value whose sign flag follows the number.
    pub fn new(value: i64) -> Signed {
        return Signed { value, negative: value < 0 };
    }

    /// Create a signed value with an explicit sign flag.
    pub fn with_sign(value: i64, negative: bool) -> Signed {
        return Signed { value, negative };
    }
}

// =============================================================================
// Writing
// =============================================================================

/// A byte sink with the encoding helpers of the wire format.
pub trait Write {
    /// Append a single byte.
    fn write_u8(&mut self, value: u8);

    /// Append raw bytes with no length prefix.
    fn write_all(&mut self, bytes: &[u8]);

    /// Append an unsigned varint.
    fn write_var_u64(&mut self, mut num: u64) {
        while num > 0b0111_1111 {
            self.write_u8(0b1000_0000 | (num & 0b0111_1111) as u8);
            num >>= 7;
        }
        self.write_u8((num & 0b0111_1111) as u8);
    }

    /// Append an unsigned varint holding a 32-bit value.
    fn write_var_u32(&mut self, num: u32) {
        self.write_var_u64(num as u64);
    }

    /// Append a signed varint with an explicit sign flag.
    fn write_var_signed(&mut self, value: Signed) {
        let mut num = value.value.unsigned_abs();
        let cont = if num > 0b0011_1111 { 0b1000_0000 } else { 0 };
        let sign = if value.negative { 0b0100_0000 } else { 0 };
        self.write_u8(cont | sign | (num & 0b0011_1111) as u8);
        num >>= 6;
        while num > 0 {
            let cont = if num > 0b0111_1111 { 0b1000_0000 } else { 0 };
            self.write_u8(cont | (num & 0b0111_1111) as u8);
            num >>= 7;
        }
    }

    /// Append a signed varint.
    fn write_var_i64(&mut self, value: i64) {
        self.write_var_signed(Signed::new(value));
    }

    /// Append a length-prefixed UTF-8 string.
    fn write_string(&mut self, s: &str) {
        self.write_buf(s.as_bytes());
    }

    /// Append a length-prefixed byte buffer.
    fn write_buf(&mut self, buf: &[u8]) {
        self.write_var_u64(buf.len() as u64);
        self.write_all(buf);
    }

    /// Append a big-endian IEEE-754 single.
    fn write_f32(&mut self, value: f32) {
        self.write_all(&value.to_be_bytes());
    }

    /// Append a big-endian IEEE-754 double.
    fn write_f64(&mut self, value: f64) {
        self.write_all(&value.to_be_bytes());
    }

    /// Append a big-endian two's complement 64-bit integer.
    fn write_i64(&mut self, value: i64) {
        self.write_all(&value.to_be_bytes());
    }
}

impl Write for Vec<u8> {
    #[inline]
    fn write_u8(&mut self, value: u8) {
        self.push(value);
    }

    #[inline]
    fn write_all(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

// =============================================================================
// Reading
// =============================================================================

/// A read position over a borrowed byte slice.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    next: usize,
}

impl<'a> Cursor<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Cursor<'a> {
        return Cursor { buf, next: 0 };
    }

    /// True while unread bytes remain.
    #[inline]
    pub fn has_content(&self) -> bool {
        return self.next < self.buf.len();
    }

    /// The unread tail of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        return &self.buf[self.next..];
    }

    /// Read one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.next).ok_or(Error::EndOfBuffer)?;
        self.next += 1;
        return Ok(byte);
    }

    /// Read exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.next.checked_add(len).ok_or(Error::EndOfBuffer)?;
        if end > self.buf.len() {
            return Err(Error::EndOfBuffer);
        }
        let slice = &self.buf[self.next..end];
        self.next = end;
        return Ok(slice);
    }

    /// Read an unsigned varint of up to 64 bits.
    pub fn read_var_u64(&mut self) -> Result<u64> {
        let mut num: u64 = 0;
        let mut shift = 0;
        loop {
            let r = self.read_u8()?;
            if shift >= 64 || (shift == 63 && (r & 0b0111_1110) != 0) {
                return Err(Error::VarIntOverflow { bits: 64 });
            }
            num |= ((r & 0b0111_1111) as u64) << shift;
            if r < 0b1000_0000 {
                return Ok(num);
            }
            shift += 7;
        }
    }

    /// Read an unsigned varint that must fit in 32 bits (at most five
    /// encoded bytes).
    pub fn read_var_u32(&mut self) -> Result<u32> {
        let mut num: u64 = 0;
        let mut shift = 0;
        loop {
            if shift >= 35 {
                return Err(Error::VarIntOverflow { bits: 32 });
            }
            let r = self.read_u8()?;
            num |= ((r & 0b0111_1111) as u64) << shift;
            if r < 0b1000_0000 {
                break;
            }
            shift += 7;
        }
        if num > u32::MAX as u64 {
            return Err(Error::VarIntOverflow { bits: 32 });
        }
        return Ok(num as u32);
    }

    /// Read a signed varint, keeping the sign flag.
    pub fn read_var_signed(&mut self) -> Result<Signed> {
        let r = self.read_u8()?;
        let negative = (r & 0b0100_0000) != 0;
        let mut num = (r & 0b0011_1111) as u64;
        if (r & 0b1000_0000) != 0 {
            let mut shift = 6;
            loop {
                if shift >= 63 {
                    return Err(Error::VarIntOverflow { bits: 64 });
                }
                let r = self.read_u8()?;
                let payload = (r & 0b0111_1111) as u64;
                if shift > 57 && (payload >> (64 - shift)) != 0 {
                    return Err(Error::VarIntOverflow { bits: 64 });
                }
                num |= payload << shift;
                if r < 0b1000_0000 {
                    break;
                }
                shift += 7;
            }
        }
        if num > i64::MAX as u64 {
            return Err(Error::VarIntOverflow { bits: 64 });
        }
        let value = if negative { -(num as i64) } else { num as i64 };
        return Ok(Signed { value, negative });
    }

    /// Read a signed varint.
    pub fn read_var_i64(&mut self) -> Result<i64> {
        return Ok(self.read_var_signed()?.value);
    }

    /// Read a length-prefixed byte buffer.
    pub fn read_buf(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var_u64()?;
        let len = usize::try_from(len).map_err(|_| Error::EndOfBuffer)?;
        return self.read_exact(len);
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let bytes = self.read_buf()?;
        return std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8);
    }

    /// Read a big-endian IEEE-754 single.
    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_exact(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        return Ok(f32::from_be_bytes(arr));
    }

    /// Read a big-endian IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_exact(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        return Ok(f64::from_be_bytes(arr));
    }

    /// Read a big-endian 64-bit integer.
    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read_exact(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        return Ok(i64::from_be_bytes(arr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_u32_uses_seven_bits_per_byte() {
        let mut buf = Vec::new();
        buf.write_var_u32(127);
        assert_eq!(buf, vec![0x7F]);

        let mut buf = Vec::new();
        buf.write_var_u32(128);
        assert_eq!(buf, vec![0x80, 0x01]);

        let mut buf = Vec::new();
        buf.write_var_u32(u32::MAX);
        assert_eq!(buf.len(), 5);
        assert_eq!(Cursor::new(&buf).read_var_u32(), Ok(u32::MAX));
    }

    #[test]
    fn var_u32_rejects_sixth_byte() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(
            Cursor::new(&buf).read_var_u32(),
            Err(Error::VarIntOverflow { bits: 32 })
        );
    }

    #[test]
    fn var_u32_rejects_values_above_32_bits() {
        let mut buf = Vec::new();
        buf.write_var_u64(u32::MAX as u64 + 1);
        assert_eq!(
            Cursor::new(&buf).read_var_u32(),
            Err(Error::VarIntOverflow { bits: 32 })
        );
    }

    #[test]
    fn signed_rejects_bits_past_64() {
        let mut buf = Vec::new();
        buf.write_var_i64(i64::MAX);
        assert_eq!(buf.len(), 10);
        assert_eq!(Cursor::new(&buf).read_var_i64(), Ok(i64::MAX));

        // Last byte carries payload for bits 64 and up.
        let mut buf = vec![0x80];
        buf.extend([0x80; 8]);
        buf.push(0x04);
        assert_eq!(
            Cursor::new(&buf).read_var_signed(),
            Err(Error::VarIntOverflow { bits: 64 })
        );
    }

    #[test]
    fn signed_keeps_negative_zero() {
        let mut buf = Vec::new();
        buf.write_var_signed(Signed::with_sign(0, true));
        buf.write_var_i64(-65);
        buf.write_var_i64(1 << 40);

        let mut cursor = Cursor::new(&buf);
        let zero = cursor.read_var_signed().unwrap();
        assert_eq!(zero.value, 0);
        assert!(zero.negative);
        assert_eq!(cursor.read_var_i64(), Ok(-65));
        assert_eq!(cursor.read_var_i64(), Ok(1 << 40));
        assert!(!cursor.has_content());
    }

    #[test]
    fn signed_first_byte_holds_six_bits() {
        let mut buf = Vec::new();
        buf.write_var_i64(63);
        assert_eq!(buf, vec![63]);

        let mut buf = Vec::new();
        buf.write_var_i64(-1);
        assert_eq!(buf, vec![0b0100_0001]);
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut buf = Vec::new();
        buf.write_string("héllo");
        assert_eq!(buf[0] as usize, "héllo".len());
        assert_eq!(Cursor::new(&buf).read_string(), Ok("héllo"));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let buf = [0x80];
        assert_eq!(Cursor::new(&buf).read_var_u64(), Err(Error::EndOfBuffer));

        let mut buf = Vec::new();
        buf.write_var_u32(10);
        buf.extend_from_slice(b"abc");
        assert_eq!(Cursor::new(&buf).read_buf(), Err(Error::EndOfBuffer));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let buf = [2, 0xC3, 0x28];
        assert_eq!(Cursor::new(&buf).read_string(), Err(Error::InvalidUtf8));
    }

    #[test]
    fn floats_are_big_endian() {
        let mut buf = Vec::new();
        buf.write_f64(1.5);
        assert_eq!(buf, 1.5f64.to_be_bytes().to_vec());
        assert_eq!(Cursor::new(&buf).read_f64(), Ok(1.5));
    }
}
