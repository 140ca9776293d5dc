// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Blocks: the structs stored per client in the struct store.
//!
//! A block covers a contiguous clock range of one client and is one of:
//!
//! - `Item`: live content linked into a branch.
//! - `GC`: a tombstone whose content and links were discarded.
//! - `Skip`: a gap in an update. Never stored.
//!
//! Neighbour links are ids of block starts, resolved through the store.
//! Origins are the ids of the neighbours' *units* at creation time and
//! never change.

use std::sync::Arc;

use super::branch::BranchPtr;
use super::content::BLOCK_GC_REF;
use super::content::BLOCK_SKIP_REF;
use super::content::ItemContent;
use super::primitives::BlockRange;
use super::primitives::ID;
use crate::update::codec::Encoder;

/// Item flag: protected from garbage collection.
pub const ITEM_KEEP: u8 = 0b0001;
/// Item flag: contributes to the parent's length.
pub const ITEM_COUNTABLE: u8 = 0b0010;
/// Item flag: deleted.
pub const ITEM_DELETED: u8 = 0b0100;
/// Item flag: a search marker points at this item.
pub const ITEM_MARKED: u8 = 0b1000;

const HAS_ORIGIN: u8 = 0b1000_0000;
const HAS_RIGHT_ORIGIN: u8 = 0b0100_0000;
const HAS_PARENT_SUB: u8 = 0b0010_0000;

/// The parent of an item: resolved to a branch once integrated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypePtr {
    /// Not transmitted; inherited from the origins during integration.
    Unknown,
    Branch(BranchPtr),
    /// A root type named in an update.
    Named(Arc<str>),
    /// A nested type named by the id of its item.
    Id(ID),
}

// =============================================================================
// Item
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub id: ID,
    pub len: u32,
    /// Start of the block currently to the left.
    pub left: Option<ID>,
    /// Start of the block currently to the right.
    pub right: Option<ID>,
    /// Last unit of the left neighbour at creation time.
    pub origin: Option<ID>,
    /// First unit of the right neighbour at creation time.
    pub right_origin: Option<ID>,
    pub parent: TypePtr,
    /// Key of the slot when the parent is used as a map.
    pub parent_sub: Option<Arc<str>>,
    pub content: ItemContent,
    /// The item that re-inserted this one's content after an undo.
    pub redone: Option<ID>,
    pub info: u8,
}

impl Item {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ID,
        left: Option<ID>,
        origin: Option<ID>,
        right: Option<ID>,
        right_origin: Option<ID>,
        parent: TypePtr,
        parent_sub: Option<Arc<str>>,
        content: ItemContent,
    ) -> Item {
        let info = if content.is_countable() { ITEM_COUNTABLE } else { 0 };
        let len = content.len();
        return Item {
            id,
            len,
            left,
            right,
            origin,
            right_origin,
            parent,
            parent_sub,
            content,
            redone: None,
            info,
        };
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        return self.info & ITEM_DELETED != 0;
    }

    #[inline]
    pub fn is_countable(&self) -> bool {
        return self.info & ITEM_COUNTABLE != 0;
    }

    #[inline]
    pub fn is_keep(&self) -> bool {
        return self.info & ITEM_KEEP != 0;
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        return self.info & ITEM_MARKED != 0;
    }

    /// Visible and countable.
    #[inline]
    pub fn is_visible(&self) -> bool {
        return !self.is_deleted() && self.is_countable();
    }

    pub fn set_keep(&mut self, keep: bool) {
        if keep {
            self.info |= ITEM_KEEP;
        } else {
            self.info &= !ITEM_KEEP;
        }
    }

    pub fn set_marked(&mut self, marked: bool) {
        if marked {
            self.info |= ITEM_MARKED;
        } else {
            self.info &= !ITEM_MARKED;
        }
    }

    pub fn mark_deleted(&mut self) {
        self.info |= ITEM_DELETED;
    }

    /// Replace the content, keeping the countable flag in sync.
    pub fn set_content(&mut self, content: ItemContent) {
        if content.is_countable() {
            self.info |= ITEM_COUNTABLE;
        } else {
            self.info &= !ITEM_COUNTABLE;
        }
        self.content = content;
    }

    #[inline]
    pub fn last_id(&self) -> ID {
        return ID::new(self.id.client, self.id.clock + self.len - 1);
    }

    pub fn contains(&self, id: &ID) -> bool {
        return self.id.client == id.client
            && id.clock >= self.id.clock
            && id.clock < self.id.clock + self.len;
    }

    /// The branch this item belongs to, once integrated.
    pub fn parent_branch(&self) -> Option<&BranchPtr> {
        return match &self.parent {
            TypePtr::Branch(ptr) => Some(ptr),
            _ => None,
        };
    }

    /// Cut the item at `offset`, returning the right half.
    ///
    /// The caller relinks neighbours. The right half keeps the right origin
    /// and takes the last unit of the left half as its origin.
    pub fn splice(&mut self, offset: u32) -> Item {
        debug_assert!(offset > 0 && offset < self.len);
        let client = self.id.client;
        let clock = self.id.clock;
        let content = self.content.splice(offset);
        let mut right = Item::new(
            ID::new(client, clock + offset),
            Some(self.id),
            Some(ID::new(client, clock + offset - 1)),
            self.right,
            self.right_origin,
            self.parent.clone(),
            self.parent_sub.clone(),
            content,
        );
        if self.is_deleted() {
            right.mark_deleted();
        }
        if self.is_keep() {
            right.set_keep(true);
        }
        if let Some(redone) = self.redone {
            right.redone = Some(redone.offset(offset));
        }
        self.len = offset;
        return right;
    }

    /// Write the units `[start, len - end)`.
    pub fn encode<E: Encoder>(&self, encoder: &mut E, start: u32, end: u32) {
        let origin = if start > 0 {
            Some(ID::new(self.id.client, self.id.clock + start - 1))
        } else {
            self.origin
        };
        if origin.is_none() && self.right_origin.is_none() && matches!(self.parent, TypePtr::Unknown) {
            // Nothing to anchor the content to: peers get a tombstone.
            encoder.write_info(BLOCK_GC_REF);
            encoder.write_len(self.len - start - end);
            return;
        }
        let mut info = self.content.tag() & 0b1_1111;
        if origin.is_some() {
            info |= HAS_ORIGIN;
        }
        if self.right_origin.is_some() {
            info |= HAS_RIGHT_ORIGIN;
        }
        if self.parent_sub.is_some() {
            info |= HAS_PARENT_SUB;
        }
        encoder.write_info(info);
        if let Some(origin) = origin {
            encoder.write_left_id(&origin);
        }
        if let Some(right_origin) = &self.right_origin {
            encoder.write_right_id(right_origin);
        }
        if origin.is_none() && self.right_origin.is_none() {
            match &self.parent {
                TypePtr::Branch(BranchPtr::Root(name)) | TypePtr::Named(name) => {
                    encoder.write_parent_info(true);
                    encoder.write_str(name);
                }
                TypePtr::Branch(BranchPtr::Nested(id)) | TypePtr::Id(id) => {
                    encoder.write_parent_info(false);
                    encoder.write_left_id(id);
                }
                TypePtr::Unknown => {}
            }
            if let Some(sub) = &self.parent_sub {
                encoder.write_str(sub);
            }
        }
        self.content.encode(encoder, start, end);
    }

    /// A copy suitable for an update: links dropped, parent named by wire
    /// reference.
    pub fn detached(&self) -> Item {
        let mut item = self.clone();
        item.left = None;
        item.right = None;
        item.info &= !ITEM_MARKED;
        item.parent = match &self.parent {
            TypePtr::Branch(BranchPtr::Root(name)) => TypePtr::Named(name.clone()),
            TypePtr::Branch(BranchPtr::Nested(id)) => TypePtr::Id(*id),
            other => other.clone(),
        };
        return item;
    }

    pub fn has_origin_flag(info: u8) -> bool {
        return info & HAS_ORIGIN != 0;
    }

    pub fn has_right_origin_flag(info: u8) -> bool {
        return info & HAS_RIGHT_ORIGIN != 0;
    }

    pub fn has_parent_sub_flag(info: u8) -> bool {
        return info & HAS_PARENT_SUB != 0;
    }
}

// =============================================================================
// Block
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Item(Box<Item>),
    GC(BlockRange),
    Skip(BlockRange),
}

impl Block {
    #[inline]
    pub fn id(&self) -> ID {
        return match self {
            Block::Item(item) => item.id,
            Block::GC(range) | Block::Skip(range) => range.id,
        };
    }

    #[inline]
    pub fn len(&self) -> u32 {
        return match self {
            Block::Item(item) => item.len,
            Block::GC(range) | Block::Skip(range) => range.len,
        };
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// One past the last clock.
    #[inline]
    pub fn end(&self) -> u32 {
        return self.id().clock + self.len();
    }

    pub fn last_id(&self) -> ID {
        let id = self.id();
        return ID::new(id.client, id.clock + self.len() - 1);
    }

    pub fn is_deleted(&self) -> bool {
        return match self {
            Block::Item(item) => item.is_deleted(),
            Block::GC(_) => true,
            Block::Skip(_) => false,
        };
    }

    pub fn is_skip(&self) -> bool {
        return matches!(self, Block::Skip(_));
    }

    pub fn is_gc(&self) -> bool {
        return matches!(self, Block::GC(_));
    }

    pub fn as_item(&self) -> Option<&Item> {
        return match self {
            Block::Item(item) => Some(item),
            _ => None,
        };
    }

    pub fn as_item_mut(&mut self) -> Option<&mut Item> {
        return match self {
            Block::Item(item) => Some(item),
            _ => None,
        };
    }

    /// Drop the first `diff` units in place.
    pub fn slice_left(&mut self, diff: u32) {
        if diff == 0 {
            return;
        }
        match self {
            Block::Item(item) => {
                let right = item.splice(diff);
                **item = right;
            }
            Block::GC(range) | Block::Skip(range) => {
                range.id.clock += diff;
                range.len -= diff;
            }
        }
    }

    /// Merge a range block that directly continues this one, for update
    /// compaction. Items are never squashed outside the store, where their
    /// neighbours are known.
    pub fn try_squash(&mut self, other: &Block) -> bool {
        match (self, other) {
            (Block::GC(left), Block::GC(right)) | (Block::Skip(left), Block::Skip(right)) => {
                left.len += right.len;
                return true;
            }
            _ => return false,
        }
    }

    /// Write the units `[start, len - end)`.
    pub fn encode<E: Encoder>(&self, encoder: &mut E, start: u32, end: u32) {
        match self {
            Block::Item(item) => item.encode(encoder, start, end),
            Block::GC(range) => {
                encoder.write_info(BLOCK_GC_REF);
                encoder.write_len(range.len - start - end);
            }
            Block::Skip(range) => {
                encoder.write_info(BLOCK_SKIP_REF);
                encoder.write_var(range.len - start - end);
            }
        }
    }

    pub fn detached(&self) -> Block {
        return match self {
            Block::Item(item) => Block::Item(Box::new(item.detached())),
            other => other.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::any::Any;
    use crate::update::codec::EncoderV1;

    fn text_item(client: u32, clock: u32, text: &str) -> Item {
        return Item::new(
            ID::new(client, clock),
            None,
            None,
            None,
            None,
            TypePtr::Named(Arc::from("t")),
            None,
            ItemContent::String(text.to_owned()),
        );
    }

    #[test]
    fn orphan_item_encodes_as_tombstone() {
        let mut orphan = text_item(1, 0, "hello");
        orphan.parent = TypePtr::Unknown;
        let mut encoder = EncoderV1::new();
        Block::Item(Box::new(orphan)).encode(&mut encoder, 0, 1);

        let mut expected = EncoderV1::new();
        Block::GC(BlockRange::new(ID::new(1, 0), 4)).encode(&mut expected, 0, 0);
        assert_eq!(encoder.to_vec(), expected.to_vec());
    }

    #[test]
    fn splice_links_halves() {
        let mut item = text_item(1, 0, "hello");
        item.set_keep(true);
        item.redone = Some(ID::new(2, 10));
        let right = item.splice(2);

        assert_eq!(item.len, 2);
        assert_eq!(right.id, ID::new(1, 2));
        assert_eq!(right.len, 3);
        assert_eq!(right.origin, Some(ID::new(1, 1)));
        assert_eq!(right.left, Some(ID::new(1, 0)));
        assert!(right.is_keep());
        assert_eq!(right.redone, Some(ID::new(2, 12)));
        assert_eq!(right.content, ItemContent::String("llo".to_owned()));
    }

    #[test]
    fn format_items_are_not_countable() {
        let mut item = text_item(1, 0, "x");
        assert!(item.is_countable());
        item.set_content(ItemContent::Format { key: Arc::from("b"), value: Any::Null });
        assert!(!item.is_countable());
    }

    #[test]
    fn slice_gc_and_skip() {
        let mut gc = Block::GC(BlockRange::new(ID::new(1, 4), 6));
        gc.slice_left(2);
        assert_eq!(gc.id(), ID::new(1, 6));
        assert_eq!(gc.len(), 4);
        assert!(gc.try_squash(&Block::GC(BlockRange::new(ID::new(1, 10), 1))));
        assert_eq!(gc.len(), 5);
        assert!(!gc.try_squash(&Block::Skip(BlockRange::new(ID::new(1, 11), 1))));
    }
}
