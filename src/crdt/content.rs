// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Item content: the closed set of payloads an item can carry.
//!
//! | ref | variant | length          | countable |
//! |-----|---------|-----------------|-----------|
//! | 1   | Deleted | stored          | no        |
//! | 2   | JSON    | number of values| yes       |
//! | 3   | Binary  | 1               | yes       |
//! | 4   | String  | chars           | yes       |
//! | 5   | Embed   | 1               | yes       |
//! | 6   | Format  | 1               | no        |
//! | 7   | Type    | 1               | yes       |
//! | 8   | Any     | number of values| yes       |
//! | 9   | Doc     | 1               | yes       |
//!
//! Ref 0 (GC) and 10 (Skip) are block kinds, not content.

use std::sync::Arc;

use super::branch::TypeRef;
use crate::encoding::any::Any;
use crate::error::Error;
use crate::error::Result;
use crate::update::codec::Decoder;
use crate::update::codec::Encoder;

pub const BLOCK_GC_REF: u8 = 0;
pub const CONTENT_DELETED: u8 = 1;
pub const CONTENT_JSON: u8 = 2;
pub const CONTENT_BINARY: u8 = 3;
pub const CONTENT_STRING: u8 = 4;
pub const CONTENT_EMBED: u8 = 5;
pub const CONTENT_FORMAT: u8 = 6;
pub const CONTENT_TYPE: u8 = 7;
pub const CONTENT_ANY: u8 = 8;
pub const CONTENT_DOC: u8 = 9;
pub const BLOCK_SKIP_REF: u8 = 10;

/// Payload of an item.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemContent {
    Any(Vec<Any>),
    Binary(Arc<[u8]>),
    Deleted(u32),
    /// A sub-document, identified by guid, with its creation options.
    Doc { guid: Arc<str>, opts: Any },
    Embed(Any),
    Format { key: Arc<str>, value: Any },
    /// Legacy JSON values, stored as their serialized text.
    JSON(Vec<String>),
    String(String),
    Type(TypeRef),
}

impl ItemContent {
    pub fn tag(&self) -> u8 {
        return match self {
            ItemContent::Any(_) => CONTENT_ANY,
            ItemContent::Binary(_) => CONTENT_BINARY,
            ItemContent::Deleted(_) => CONTENT_DELETED,
            ItemContent::Doc { .. } => CONTENT_DOC,
            ItemContent::Embed(_) => CONTENT_EMBED,
            ItemContent::Format { .. } => CONTENT_FORMAT,
            ItemContent::JSON(_) => CONTENT_JSON,
            ItemContent::String(_) => CONTENT_STRING,
            ItemContent::Type(_) => CONTENT_TYPE,
        };
    }

    /// Number of clock units the content occupies.
    pub fn len(&self) -> u32 {
        return match self {
            ItemContent::Any(values) => values.len() as u32,
            ItemContent::Deleted(len) => *len,
            ItemContent::JSON(values) => values.len() as u32,
            ItemContent::String(s) => s.chars().count() as u32,
            ItemContent::Binary(_)
            | ItemContent::Doc { .. }
            | ItemContent::Embed(_)
            | ItemContent::Format { .. }
            | ItemContent::Type(_) => 1,
        };
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Whether the content contributes to its parent's visible length.
    pub fn is_countable(&self) -> bool {
        return !matches!(self, ItemContent::Deleted(_) | ItemContent::Format { .. });
    }

    /// Split off and return everything from `offset` onwards.
    pub fn splice(&mut self, offset: u32) -> ItemContent {
        let offset = offset as usize;
        return match self {
            ItemContent::Any(values) => ItemContent::Any(values.split_off(offset)),
            ItemContent::JSON(values) => ItemContent::JSON(values.split_off(offset)),
            ItemContent::Deleted(len) => {
                let right = *len - offset as u32;
                *len = offset as u32;
                ItemContent::Deleted(right)
            }
            ItemContent::String(s) => {
                let at = byte_offset(s, offset);
                ItemContent::String(s.split_off(at))
            }
            other => unreachable!("content {} cannot be split", other.tag()),
        };
    }

    /// Append `other` if both are the same splittable kind.
    pub fn try_squash(&mut self, other: &ItemContent) -> bool {
        match (self, other) {
            (ItemContent::Any(left), ItemContent::Any(right)) => left.extend(right.iter().cloned()),
            (ItemContent::JSON(left), ItemContent::JSON(right)) => {
                left.extend(right.iter().cloned())
            }
            (ItemContent::Deleted(left), ItemContent::Deleted(right)) => *left += *right,
            (ItemContent::String(left), ItemContent::String(right)) => left.push_str(right),
            _ => return false,
        }
        return true;
    }

    /// Write the units `[start, len - end)`.
    pub fn encode<E: Encoder>(&self, encoder: &mut E, start: u32, end: u32) {
        let (start, end) = (start as usize, end as usize);
        match self {
            ItemContent::Deleted(len) => encoder.write_len(*len - (start + end) as u32),
            ItemContent::JSON(values) => {
                let values = &values[start..values.len() - end];
                encoder.write_len(values.len() as u32);
                for value in values {
                    encoder.write_str(value);
                }
            }
            ItemContent::Binary(buf) => encoder.write_buf(buf),
            ItemContent::String(s) => {
                let total = s.chars().count();
                if start == 0 && end == 0 {
                    encoder.write_str(s);
                } else {
                    let from = byte_offset(s, start);
                    let to = byte_offset(s, total - end);
                    encoder.write_str(&s[from..to]);
                }
            }
            ItemContent::Embed(value) => encoder.write_json(value),
            ItemContent::Format { key, value } => {
                encoder.write_key(key);
                encoder.write_json(value);
            }
            ItemContent::Type(type_ref) => type_ref.encode(encoder),
            ItemContent::Any(values) => {
                let values = &values[start..values.len() - end];
                encoder.write_len(values.len() as u32);
                for value in values {
                    encoder.write_any(value);
                }
            }
            ItemContent::Doc { guid, opts } => {
                encoder.write_str(guid);
                encoder.write_any(opts);
            }
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D, tag: u8) -> Result<ItemContent> {
        return match tag {
            CONTENT_DELETED => Ok(ItemContent::Deleted(decoder.read_len()?)),
            CONTENT_JSON => {
                let len = decoder.read_len()?;
                let mut values = Vec::new();
                for _ in 0..len {
                    values.push(decoder.read_str()?.to_owned());
                }
                Ok(ItemContent::JSON(values))
            }
            CONTENT_BINARY => Ok(ItemContent::Binary(Arc::from(decoder.read_buf()?))),
            CONTENT_STRING => Ok(ItemContent::String(decoder.read_str()?.to_owned())),
            CONTENT_EMBED => Ok(ItemContent::Embed(decoder.read_json()?)),
            CONTENT_FORMAT => {
                let key = decoder.read_key()?;
                let value = decoder.read_json()?;
                Ok(ItemContent::Format { key, value })
            }
            CONTENT_TYPE => Ok(ItemContent::Type(TypeRef::decode(decoder)?)),
            CONTENT_ANY => {
                let len = decoder.read_len()?;
                let mut values = Vec::new();
                for _ in 0..len {
                    values.push(decoder.read_any()?);
                }
                Ok(ItemContent::Any(values))
            }
            CONTENT_DOC => {
                let guid = Arc::from(decoder.read_str()?);
                let opts = decoder.read_any()?;
                Ok(ItemContent::Doc { guid, opts })
            }
            other => Err(Error::UnexpectedTag { kind: "content", tag: other as u32 }),
        };
    }
}

/// Byte offset of the `chars`-th char of `s`.
pub(crate) fn byte_offset(s: &str, chars: usize) -> usize {
    return s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_splits_on_chars() {
        let mut content = ItemContent::String("añb🎉c".to_owned());
        assert_eq!(content.len(), 5);
        let right = content.splice(3);
        assert_eq!(content, ItemContent::String("añb".to_owned()));
        assert_eq!(right, ItemContent::String("🎉c".to_owned()));
    }

    #[test]
    fn squash_only_same_kind() {
        let mut content = ItemContent::Any(vec![Any::from(1)]);
        assert!(content.try_squash(&ItemContent::Any(vec![Any::from(2)])));
        assert!(!content.try_squash(&ItemContent::String("x".to_owned())));
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn countability() {
        assert!(!ItemContent::Deleted(3).is_countable());
        let format = ItemContent::Format { key: Arc::from("bold"), value: Any::from(true) };
        assert!(!format.is_countable());
        assert_eq!(format.len(), 1);
        assert!(ItemContent::Type(TypeRef::Map).is_countable());
    }
}
