// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Run-length and delta sub-encoders for the column-oriented update format.
//!
//! Each encoder owns its output buffer; the update encoder concatenates the
//! finished buffers as length-prefixed columns. Decoders read from a
//! borrowed column.
//!
//! - `RleEncoder`: a value, then `count - 1` once a different value follows.
//!   The final run's count is omitted; the decoder repeats the last value
//!   forever when the column is exhausted.
//! - `UIntOptRleEncoder`: a lone value is written as a positive signed
//!   varint. A run is written with the sign bit set, followed by
//!   `count - 2`. Zero runs use negative zero.
//! - `IntDiffOptRleEncoder`: like the above, but encodes the difference to
//!   the previous value, with the run flag packed into the low bit.
//! - `StringEncoder`: concatenates all strings into one and writes their
//!   byte lengths as a `UIntOptRleEncoder` column.

use super::Cursor;
use super::Signed;
use super::Write;
use crate::error::Error;
use crate::error::Result;

// =============================================================================
// Plain run-length (bytes)
// =============================================================================

/// Run-length encoder for single bytes.
#[derive(Debug, Default)]
pub struct RleEncoder {
    buf: Vec<u8>,
    last: Option<u8>,
    count: u32,
}

impl RleEncoder {
    pub fn new() -> RleEncoder {
        return RleEncoder::default();
    }

    pub fn write(&mut self, value: u8) {
        if self.last == Some(value) {
            self.count += 1;
            return;
        }
        if self.count > 0 {
            self.buf.write_var_u32(self.count - 1);
        }
        self.count = 1;
        self.buf.write_u8(value);
        self.last = Some(value);
    }

    pub fn finish(self) -> Vec<u8> {
        return self.buf;
    }
}

/// Decoder for [`RleEncoder`] columns.
#[derive(Debug)]
pub struct RleDecoder<'a> {
    cursor: Cursor<'a>,
    last: u8,
    /// Remaining repetitions; negative means "repeat forever".
    count: i64,
}

impl<'a> RleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> RleDecoder<'a> {
        return RleDecoder { cursor: Cursor::new(buf), last: 0, count: 0 };
    }

    pub fn read(&mut self) -> Result<u8> {
        if self.count == 0 {
            self.last = self.cursor.read_u8()?;
            if self.cursor.has_content() {
                self.count = self.cursor.read_var_u32()? as i64 + 1;
            } else {
                self.count = -1;
            }
        }
        if self.count > 0 {
            self.count -= 1;
        }
        return Ok(self.last);
    }
}

// =============================================================================
// Unsigned, optimized run-length
// =============================================================================

/// Run-length encoder for unsigned integers with the run flag in the sign.
#[derive(Debug, Default)]
pub struct UIntOptRleEncoder {
    buf: Vec<u8>,
    value: u32,
    count: u32,
}

impl UIntOptRleEncoder {
    pub fn new() -> UIntOptRleEncoder {
        return UIntOptRleEncoder::default();
    }

    pub fn write(&mut self, value: u32) {
        if self.value == value {
            self.count += 1;
        } else {
            self.flush();
            self.count = 1;
            self.value = value;
        }
    }

    fn flush(&mut self) {
        if self.count == 0 {
            return;
        }
        if self.count == 1 {
            self.buf.write_var_signed(Signed::new(self.value as i64));
        } else {
            self.buf.write_var_signed(Signed::with_sign(-(self.value as i64), true));
            self.buf.write_var_u32(self.count - 2);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        return self.buf;
    }
}

/// Decoder for [`UIntOptRleEncoder`] columns.
#[derive(Debug)]
pub struct UIntOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    value: u32,
    count: u32,
}

impl<'a> UIntOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> UIntOptRleDecoder<'a> {
        return UIntOptRleDecoder::from_cursor(Cursor::new(buf));
    }

    fn from_cursor(cursor: Cursor<'a>) -> UIntOptRleDecoder<'a> {
        return UIntOptRleDecoder { cursor, value: 0, count: 0 };
    }

    pub fn read(&mut self) -> Result<u32> {
        if self.count == 0 {
            let signed = self.cursor.read_var_signed()?;
            let magnitude = signed.value.unsigned_abs();
            self.value = u32::try_from(magnitude).map_err(|_| Error::VarIntOverflow { bits: 32 })?;
            self.count = 1;
            if signed.negative {
                self.count = self
                    .cursor
                    .read_var_u32()?
                    .checked_add(2)
                    .ok_or(Error::VarIntOverflow { bits: 32 })?;
            }
        }
        self.count -= 1;
        return Ok(self.value);
    }
}

// =============================================================================
// Integer-diff, optimized run-length
// =============================================================================

/// Encodes successive differences, run-length compressed.
///
/// Ideal for clocks that increase by a constant step.
#[derive(Debug, Default)]
pub struct IntDiffOptRleEncoder {
    buf: Vec<u8>,
    value: i64,
    count: u32,
    diff: i64,
}

impl IntDiffOptRleEncoder {
    pub fn new() -> IntDiffOptRleEncoder {
        return IntDiffOptRleEncoder::default();
    }

    pub fn write(&mut self, value: u32) {
        let value = value as i64;
        if self.diff == value - self.value {
            self.value = value;
            self.count += 1;
        } else {
            self.flush();
            self.count = 1;
            self.diff = value - self.value;
            self.value = value;
        }
    }

    fn flush(&mut self) {
        if self.count == 0 {
            return;
        }
        let has_count = if self.count == 1 { 0 } else { 1 };
        self.buf.write_var_i64(self.diff * 2 + has_count);
        if self.count > 1 {
            self.buf.write_var_u32(self.count - 2);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        return self.buf;
    }
}

/// Decoder for [`IntDiffOptRleEncoder`] columns.
#[derive(Debug)]
pub struct IntDiffOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    value: i64,
    count: u32,
    diff: i64,
}

impl<'a> IntDiffOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> IntDiffOptRleDecoder<'a> {
        return IntDiffOptRleDecoder { cursor: Cursor::new(buf), value: 0, count: 0, diff: 0 };
    }

    pub fn read(&mut self) -> Result<u32> {
        if self.count == 0 {
            let encoded = self.cursor.read_var_i64()?;
            let has_count = (encoded & 1) == 1;
            self.diff = encoded >> 1;
            self.count = 1;
            if has_count {
                self.count = self
                    .cursor
                    .read_var_u32()?
                    .checked_add(2)
                    .ok_or(Error::VarIntOverflow { bits: 32 })?;
            }
        }
        self.value += self.diff;
        self.count -= 1;
        return u32::try_from(self.value).map_err(|_| Error::VarIntOverflow { bits: 32 });
    }
}

// =============================================================================
// Batched strings
// =============================================================================

/// Concatenates strings into one buffer plus a column of byte lengths.
#[derive(Debug, Default)]
pub struct StringEncoder {
    joined: String,
    lens: UIntOptRleEncoder,
}

impl StringEncoder {
    pub fn new() -> StringEncoder {
        return StringEncoder::default();
    }

    pub fn write(&mut self, s: &str) {
        self.joined.push_str(s);
        self.lens.write(s.len() as u32);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.joined.len() + 8);
        buf.write_string(&self.joined);
        buf.write_all(&self.lens.finish());
        return buf;
    }
}

/// Decoder for [`StringEncoder`] columns.
#[derive(Debug)]
pub struct StringDecoder<'a> {
    joined: &'a str,
    pos: usize,
    lens: UIntOptRleDecoder<'a>,
}

impl<'a> StringDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<StringDecoder<'a>> {
        let mut cursor = Cursor::new(buf);
        let joined = cursor.read_string()?;
        return Ok(StringDecoder {
            joined,
            pos: 0,
            lens: UIntOptRleDecoder::from_cursor(cursor),
        });
    }

    pub fn read(&mut self) -> Result<&'a str> {
        let len = self.lens.read()? as usize;
        let end = self.pos.checked_add(len).ok_or(Error::EndOfBuffer)?;
        let s = self.joined.get(self.pos..end).ok_or(Error::InvalidUtf8)?;
        self.pos = end;
        return Ok(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_repeats_last_value_forever() {
        let mut enc = RleEncoder::new();
        for v in [1, 1, 1, 2, 3, 3] {
            enc.write(v);
        }
        let buf = enc.finish();
        let mut dec = RleDecoder::new(&buf);
        let read: Vec<u8> = (0..8).map(|_| dec.read().unwrap()).collect();
        assert_eq!(read, vec![1, 1, 1, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn uint_opt_rle_runs_are_compact() {
        let mut enc = UIntOptRleEncoder::new();
        for _ in 0..1000 {
            enc.write(7);
        }
        enc.write(0);
        enc.write(0);
        enc.write(9);
        let buf = enc.finish();
        assert!(buf.len() < 8, "encoded to {} bytes", buf.len());

        let mut dec = UIntOptRleDecoder::new(&buf);
        for _ in 0..1000 {
            assert_eq!(dec.read(), Ok(7));
        }
        assert_eq!(dec.read(), Ok(0));
        assert_eq!(dec.read(), Ok(0));
        assert_eq!(dec.read(), Ok(9));
        assert_eq!(dec.read(), Err(Error::EndOfBuffer));
    }

    #[test]
    fn int_diff_handles_steps_and_decreases() {
        let values = [0u32, 1, 2, 3, 4, 10, 8, 6, 4, 100, 100, 100];
        let mut enc = IntDiffOptRleEncoder::new();
        for v in values {
            enc.write(v);
        }
        let buf = enc.finish();
        let mut dec = IntDiffOptRleDecoder::new(&buf);
        for v in values {
            assert_eq!(dec.read(), Ok(v));
        }
    }

    #[test]
    fn strings_share_one_buffer() {
        let words = ["", "parent", "ключ", "a", "emoji 🎉"];
        let mut enc = StringEncoder::new();
        for w in words {
            enc.write(w);
        }
        let buf = enc.finish();
        let mut dec = StringDecoder::new(&buf).unwrap();
        for w in words {
            assert_eq!(dec.read(), Ok(w));
        }
    }

    #[test]
    fn string_lengths_must_land_on_char_boundaries() {
        let mut buf = Vec::new();
        buf.write_string("é");
        let mut lens = UIntOptRleEncoder::new();
        lens.write(1);
        buf.write_all(&lens.finish());
        let mut dec = StringDecoder::new(&buf).unwrap();
        assert_eq!(dec.read(), Err(Error::InvalidUtf8));
    }
}
