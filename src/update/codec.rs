// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Field encoders for the two update wire formats.
//!
//! Blocks and delete sets are written field by field through the
//! [`Encoder`] trait, so one writer serves both formats:
//!
//! - V1 writes every field inline as a varint or length-prefixed string.
//! - V2 transposes the fields into columns, each compressed with a
//!   run-length sub-encoder, followed by an inline "rest" stream.
//!
//! V2 layout:
//!
//! ```text
//! varuint(0)                  feature flag
//! buf(key clocks)             IntDiffOptRle
//! buf(clients)                UIntOptRle
//! buf(left clocks)            IntDiffOptRle
//! buf(right clocks)           IntDiffOptRle
//! buf(info bytes)             Rle
//! buf(strings)                StringEncoder
//! buf(parent info)            Rle
//! buf(type refs)              UIntOptRle
//! buf(lengths)                UIntOptRle
//! rest                        inline, not length-prefixed
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::ID;
use crate::encoding::Cursor;
use crate::encoding::Write;
use crate::encoding::any::Any;
use crate::encoding::rle::IntDiffOptRleDecoder;
use crate::encoding::rle::IntDiffOptRleEncoder;
use crate::encoding::rle::RleDecoder;
use crate::encoding::rle::RleEncoder;
use crate::encoding::rle::StringDecoder;
use crate::encoding::rle::StringEncoder;
use crate::encoding::rle::UIntOptRleDecoder;
use crate::encoding::rle::UIntOptRleEncoder;
use crate::error::Error;
use crate::error::Result;

// =============================================================================
// Traits
// =============================================================================

/// Field-level writer shared by the V1 and V2 formats.
pub trait Encoder {
    /// Write an unsigned varint to the inline stream.
    fn write_var(&mut self, value: u32);
    fn reset_ds_cur_val(&mut self);
    fn write_ds_clock(&mut self, clock: u32);
    fn write_ds_len(&mut self, len: u32);
    fn write_left_id(&mut self, id: &ID);
    fn write_right_id(&mut self, id: &ID);
    fn write_client(&mut self, client: ClientId);
    fn write_info(&mut self, info: u8);
    fn write_parent_info(&mut self, is_root_name: bool);
    fn write_type_ref(&mut self, type_ref: u8);
    fn write_len(&mut self, len: u32);
    fn write_str(&mut self, s: &str);
    fn write_any(&mut self, any: &Any);
    fn write_buf(&mut self, buf: &[u8]);
    fn write_json(&mut self, value: &Any);
    fn write_key(&mut self, key: &str);
    /// Finish and return the encoded bytes.
    fn to_vec(self) -> Vec<u8>;
}

/// Field-level reader shared by the V1 and V2 formats.
pub trait Decoder<'a> {
    /// Read an unsigned varint from the inline stream.
    fn read_var(&mut self) -> Result<u32>;
    fn reset_ds_cur_val(&mut self);
    fn read_ds_clock(&mut self) -> Result<u32>;
    fn read_ds_len(&mut self) -> Result<u32>;
    fn read_left_id(&mut self) -> Result<ID>;
    fn read_right_id(&mut self) -> Result<ID>;
    fn read_client(&mut self) -> Result<ClientId>;
    fn read_info(&mut self) -> Result<u8>;
    fn read_parent_info(&mut self) -> Result<bool>;
    fn read_type_ref(&mut self) -> Result<u8>;
    fn read_len(&mut self) -> Result<u32>;
    fn read_str(&mut self) -> Result<&'a str>;
    fn read_any(&mut self) -> Result<Any>;
    fn read_buf(&mut self) -> Result<&'a [u8]>;
    fn read_json(&mut self) -> Result<Any>;
    fn read_key(&mut self) -> Result<Arc<str>>;
    /// True while the inline stream has unread bytes.
    fn has_content(&self) -> bool;
}

// =============================================================================
// V1
// =============================================================================

/// Inline, field-by-field encoder.
#[derive(Debug, Default)]
pub struct EncoderV1 {
    buf: Vec<u8>,
}

impl EncoderV1 {
    pub fn new() -> EncoderV1 {
        return EncoderV1::default();
    }

    fn write_id(&mut self, id: &ID) {
        self.buf.write_var_u32(id.client);
        self.buf.write_var_u32(id.clock);
    }
}

impl Encoder for EncoderV1 {
    fn write_var(&mut self, value: u32) {
        self.buf.write_var_u32(value);
    }

    fn reset_ds_cur_val(&mut self) {}

    fn write_ds_clock(&mut self, clock: u32) {
        self.buf.write_var_u32(clock);
    }

    fn write_ds_len(&mut self, len: u32) {
        self.buf.write_var_u32(len);
    }

    fn write_left_id(&mut self, id: &ID) {
        self.write_id(id);
    }

    fn write_right_id(&mut self, id: &ID) {
        self.write_id(id);
    }

    fn write_client(&mut self, client: ClientId) {
        self.buf.write_var_u32(client);
    }

    fn write_info(&mut self, info: u8) {
        self.buf.write_u8(info);
    }

    fn write_parent_info(&mut self, is_root_name: bool) {
        self.buf.write_var_u32(if is_root_name { 1 } else { 0 });
    }

    fn write_type_ref(&mut self, type_ref: u8) {
        self.buf.write_var_u32(type_ref as u32);
    }

    fn write_len(&mut self, len: u32) {
        self.buf.write_var_u32(len);
    }

    fn write_str(&mut self, s: &str) {
        self.buf.write_string(s);
    }

    fn write_any(&mut self, any: &Any) {
        any.encode(&mut self.buf);
    }

    fn write_buf(&mut self, buf: &[u8]) {
        Write::write_buf(&mut self.buf, buf);
    }

    fn write_json(&mut self, value: &Any) {
        self.buf.write_string(&value.to_json_string());
    }

    fn write_key(&mut self, key: &str) {
        self.buf.write_string(key);
    }

    fn to_vec(self) -> Vec<u8> {
        return self.buf;
    }
}

/// Decoder for [`EncoderV1`] output.
#[derive(Debug)]
pub struct DecoderV1<'a> {
    cursor: Cursor<'a>,
}

impl<'a> DecoderV1<'a> {
    pub fn new(buf: &'a [u8]) -> DecoderV1<'a> {
        return DecoderV1 { cursor: Cursor::new(buf) };
    }

    fn read_id(&mut self) -> Result<ID> {
        let client = self.cursor.read_var_u32()?;
        let clock = self.cursor.read_var_u32()?;
        return Ok(ID::new(client, clock));
    }
}

impl<'a> Decoder<'a> for DecoderV1<'a> {
    fn read_var(&mut self) -> Result<u32> {
        return self.cursor.read_var_u32();
    }

    fn reset_ds_cur_val(&mut self) {}

    fn read_ds_clock(&mut self) -> Result<u32> {
        return self.cursor.read_var_u32();
    }

    fn read_ds_len(&mut self) -> Result<u32> {
        return self.cursor.read_var_u32();
    }

    fn read_left_id(&mut self) -> Result<ID> {
        return self.read_id();
    }

    fn read_right_id(&mut self) -> Result<ID> {
        return self.read_id();
    }

    fn read_client(&mut self) -> Result<ClientId> {
        return self.cursor.read_var_u32();
    }

    fn read_info(&mut self) -> Result<u8> {
        return self.cursor.read_u8();
    }

    fn read_parent_info(&mut self) -> Result<bool> {
        return Ok(self.cursor.read_var_u32()? == 1);
    }

    fn read_type_ref(&mut self) -> Result<u8> {
        let value = self.cursor.read_var_u32()?;
        return u8::try_from(value).map_err(|_| Error::UnexpectedTag { kind: "type ref", tag: value });
    }

    fn read_len(&mut self) -> Result<u32> {
        return self.cursor.read_var_u32();
    }

    fn read_str(&mut self) -> Result<&'a str> {
        return self.cursor.read_string();
    }

    fn read_any(&mut self) -> Result<Any> {
        return Any::decode(&mut self.cursor);
    }

    fn read_buf(&mut self) -> Result<&'a [u8]> {
        return self.cursor.read_buf();
    }

    fn read_json(&mut self) -> Result<Any> {
        let src = self.cursor.read_string()?;
        return Any::from_json(src);
    }

    fn read_key(&mut self) -> Result<Arc<str>> {
        return Ok(Arc::from(self.cursor.read_string()?));
    }

    fn has_content(&self) -> bool {
        return self.cursor.has_content();
    }
}

// =============================================================================
// V2
// =============================================================================

/// Column-oriented encoder.
#[derive(Debug, Default)]
pub struct EncoderV2 {
    rest: Vec<u8>,
    ds_curr_val: u32,
    key_clock: u32,
    key_map: FxHashMap<String, u32>,
    key_clock_encoder: IntDiffOptRleEncoder,
    client_encoder: UIntOptRleEncoder,
    left_clock_encoder: IntDiffOptRleEncoder,
    right_clock_encoder: IntDiffOptRleEncoder,
    info_encoder: RleEncoder,
    string_encoder: StringEncoder,
    parent_info_encoder: RleEncoder,
    type_ref_encoder: UIntOptRleEncoder,
    len_encoder: UIntOptRleEncoder,
}

impl EncoderV2 {
    pub fn new() -> EncoderV2 {
        return EncoderV2::default();
    }
}

impl Encoder for EncoderV2 {
    fn write_var(&mut self, value: u32) {
        self.rest.write_var_u32(value);
    }

    fn reset_ds_cur_val(&mut self) {
        self.ds_curr_val = 0;
    }

    fn write_ds_clock(&mut self, clock: u32) {
        let diff = clock.wrapping_sub(self.ds_curr_val);
        self.ds_curr_val = clock;
        self.rest.write_var_u32(diff);
    }

    fn write_ds_len(&mut self, len: u32) {
        debug_assert!(len > 0, "zero-length delete run");
        self.rest.write_var_u32(len - 1);
        self.ds_curr_val += len;
    }

    fn write_left_id(&mut self, id: &ID) {
        self.client_encoder.write(id.client);
        self.left_clock_encoder.write(id.clock);
    }

    fn write_right_id(&mut self, id: &ID) {
        self.client_encoder.write(id.client);
        self.right_clock_encoder.write(id.clock);
    }

    fn write_client(&mut self, client: ClientId) {
        self.client_encoder.write(client);
    }

    fn write_info(&mut self, info: u8) {
        self.info_encoder.write(info);
    }

    fn write_parent_info(&mut self, is_root_name: bool) {
        self.parent_info_encoder.write(if is_root_name { 1 } else { 0 });
    }

    fn write_type_ref(&mut self, type_ref: u8) {
        self.type_ref_encoder.write(type_ref as u32);
    }

    fn write_len(&mut self, len: u32) {
        self.len_encoder.write(len);
    }

    fn write_str(&mut self, s: &str) {
        self.string_encoder.write(s);
    }

    fn write_any(&mut self, any: &Any) {
        any.encode(&mut self.rest);
    }

    fn write_buf(&mut self, buf: &[u8]) {
        Write::write_buf(&mut self.rest, buf);
    }

    fn write_json(&mut self, value: &Any) {
        value.encode(&mut self.rest);
    }

    fn write_key(&mut self, key: &str) {
        match self.key_map.get(key) {
            Some(clock) => self.key_clock_encoder.write(*clock),
            None => {
                self.key_clock_encoder.write(self.key_clock);
                self.key_map.insert(key.to_owned(), self.key_clock);
                self.key_clock += 1;
                self.string_encoder.write(key);
            }
        }
    }

    fn to_vec(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.rest.len() + 64);
        buf.write_var_u32(0); // feature flag
        Write::write_buf(&mut buf, &self.key_clock_encoder.finish());
        Write::write_buf(&mut buf, &self.client_encoder.finish());
        Write::write_buf(&mut buf, &self.left_clock_encoder.finish());
        Write::write_buf(&mut buf, &self.right_clock_encoder.finish());
        Write::write_buf(&mut buf, &self.info_encoder.finish());
        Write::write_buf(&mut buf, &self.string_encoder.finish());
        Write::write_buf(&mut buf, &self.parent_info_encoder.finish());
        Write::write_buf(&mut buf, &self.type_ref_encoder.finish());
        Write::write_buf(&mut buf, &self.len_encoder.finish());
        buf.write_all(&self.rest);
        return buf;
    }
}

/// Decoder for [`EncoderV2`] output.
#[derive(Debug)]
pub struct DecoderV2<'a> {
    rest: Cursor<'a>,
    ds_curr_val: u32,
    keys: Vec<Arc<str>>,
    key_clock_decoder: IntDiffOptRleDecoder<'a>,
    client_decoder: UIntOptRleDecoder<'a>,
    left_clock_decoder: IntDiffOptRleDecoder<'a>,
    right_clock_decoder: IntDiffOptRleDecoder<'a>,
    info_decoder: RleDecoder<'a>,
    string_decoder: StringDecoder<'a>,
    parent_info_decoder: RleDecoder<'a>,
    type_ref_decoder: UIntOptRleDecoder<'a>,
    len_decoder: UIntOptRleDecoder<'a>,
}

impl<'a> DecoderV2<'a> {
    pub fn new(buf: &'a [u8]) -> Result<DecoderV2<'a>> {
        let mut cursor = Cursor::new(buf);
        let _features = cursor.read_var_u32()?;
        let key_clock_decoder = IntDiffOptRleDecoder::new(cursor.read_buf()?);
        let client_decoder = UIntOptRleDecoder::new(cursor.read_buf()?);
        let left_clock_decoder = IntDiffOptRleDecoder::new(cursor.read_buf()?);
        let right_clock_decoder = IntDiffOptRleDecoder::new(cursor.read_buf()?);
        let info_decoder = RleDecoder::new(cursor.read_buf()?);
        let string_decoder = StringDecoder::new(cursor.read_buf()?)?;
        let parent_info_decoder = RleDecoder::new(cursor.read_buf()?);
        let type_ref_decoder = UIntOptRleDecoder::new(cursor.read_buf()?);
        let len_decoder = UIntOptRleDecoder::new(cursor.read_buf()?);
        return Ok(DecoderV2 {
            rest: cursor,
            ds_curr_val: 0,
            keys: Vec::new(),
            key_clock_decoder,
            client_decoder,
            left_clock_decoder,
            right_clock_decoder,
            info_decoder,
            string_decoder,
            parent_info_decoder,
            type_ref_decoder,
            len_decoder,
        });
    }
}

impl<'a> Decoder<'a> for DecoderV2<'a> {
    fn read_var(&mut self) -> Result<u32> {
        return self.rest.read_var_u32();
    }

    fn reset_ds_cur_val(&mut self) {
        self.ds_curr_val = 0;
    }

    fn read_ds_clock(&mut self) -> Result<u32> {
        let diff = self.rest.read_var_u32()?;
        self.ds_curr_val = self
            .ds_curr_val
            .checked_add(diff)
            .ok_or(Error::VarIntOverflow { bits: 32 })?;
        return Ok(self.ds_curr_val);
    }

    fn read_ds_len(&mut self) -> Result<u32> {
        let len = self
            .rest
            .read_var_u32()?
            .checked_add(1)
            .ok_or(Error::VarIntOverflow { bits: 32 })?;
        self.ds_curr_val = self
            .ds_curr_val
            .checked_add(len)
            .ok_or(Error::VarIntOverflow { bits: 32 })?;
        return Ok(len);
    }

    fn read_left_id(&mut self) -> Result<ID> {
        let client = self.client_decoder.read()?;
        let clock = self.left_clock_decoder.read()?;
        return Ok(ID::new(client, clock));
    }

    fn read_right_id(&mut self) -> Result<ID> {
        let client = self.client_decoder.read()?;
        let clock = self.right_clock_decoder.read()?;
        return Ok(ID::new(client, clock));
    }

    fn read_client(&mut self) -> Result<ClientId> {
        return self.client_decoder.read();
    }

    fn read_info(&mut self) -> Result<u8> {
        return self.info_decoder.read();
    }

    fn read_parent_info(&mut self) -> Result<bool> {
        return Ok(self.parent_info_decoder.read()? == 1);
    }

    fn read_type_ref(&mut self) -> Result<u8> {
        let value = self.type_ref_decoder.read()?;
        return u8::try_from(value).map_err(|_| Error::UnexpectedTag { kind: "type ref", tag: value });
    }

    fn read_len(&mut self) -> Result<u32> {
        return self.len_decoder.read();
    }

    fn read_str(&mut self) -> Result<&'a str> {
        return self.string_decoder.read();
    }

    fn read_any(&mut self) -> Result<Any> {
        return Any::decode(&mut self.rest);
    }

    fn read_buf(&mut self) -> Result<&'a [u8]> {
        return self.rest.read_buf();
    }

    fn read_json(&mut self) -> Result<Any> {
        return Any::decode(&mut self.rest);
    }

    fn read_key(&mut self) -> Result<Arc<str>> {
        let clock = self.key_clock_decoder.read()? as usize;
        if clock < self.keys.len() {
            return Ok(self.keys[clock].clone());
        }
        let key: Arc<str> = Arc::from(self.string_decoder.read()?);
        self.keys.push(key.clone());
        return Ok(key);
    }

    fn has_content(&self) -> bool {
        return self.rest.has_content();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fields<E: Encoder>(encoder: &mut E) {
        encoder.write_info(0x84);
        encoder.write_left_id(&ID::new(9, 3));
        encoder.write_right_id(&ID::new(9, 8));
        encoder.write_parent_info(true);
        encoder.write_str("root");
        encoder.write_key("bold");
        encoder.write_key("bold");
        encoder.write_json(&Any::from(true));
        encoder.write_len(12);
        encoder.write_var(77);
    }

    fn read_fields<'a, D: Decoder<'a>>(decoder: &mut D) {
        assert_eq!(decoder.read_info().unwrap(), 0x84);
        assert_eq!(decoder.read_left_id().unwrap(), ID::new(9, 3));
        assert_eq!(decoder.read_right_id().unwrap(), ID::new(9, 8));
        assert!(decoder.read_parent_info().unwrap());
        assert_eq!(decoder.read_str().unwrap(), "root");
        assert_eq!(&*decoder.read_key().unwrap(), "bold");
        assert_eq!(&*decoder.read_key().unwrap(), "bold");
        assert_eq!(decoder.read_json().unwrap(), Any::from(true));
        assert_eq!(decoder.read_len().unwrap(), 12);
        assert_eq!(decoder.read_var().unwrap(), 77);
        assert!(!decoder.has_content());
    }

    #[test]
    fn v1_fields() {
        let mut encoder = EncoderV1::new();
        write_fields(&mut encoder);
        let buf = encoder.to_vec();
        read_fields(&mut DecoderV1::new(&buf));
    }

    #[test]
    fn v2_fields() {
        let mut encoder = EncoderV2::new();
        write_fields(&mut encoder);
        let buf = encoder.to_vec();
        read_fields(&mut DecoderV2::new(&buf).unwrap());
    }

    #[test]
    fn v2_rejects_truncated_header() {
        assert!(DecoderV2::new(&[0, 3, 1]).is_err());
    }
}
