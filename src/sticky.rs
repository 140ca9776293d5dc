// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Sticky indices: positions that follow the content they point at.
//!
//! A plain index goes stale as soon as anyone inserts before it. A sticky
//! index instead remembers the id of the unit it is attached to and is
//! resolved back to an index on demand. An index past the last unit is
//! attached to the type itself.

use std::sync::Arc;

use crate::crdt::branch::BranchPtr;
use crate::crdt::content::ItemContent;
use crate::crdt::primitives::ID;
use crate::crdt::store::Store;
use crate::encoding::Cursor;
use crate::encoding::Write;
use crate::error::Error;
use crate::error::Result;
use crate::transaction::ReadTxn;

const SCOPE_RELATIVE: u32 = 0;
const SCOPE_ROOT: u32 = 1;
const SCOPE_NESTED: u32 = 2;

/// Which neighbour a sticky index sticks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Assoc {
    /// The unit right of the position.
    #[default]
    After,
    /// The unit left of the position.
    Before,
}

/// What a sticky index is anchored to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StickyScope {
    /// A unit of content.
    Relative(ID),
    /// The start or end of a root type.
    Root(Arc<str>),
    /// The start or end of a nested type, by the id of its item.
    Nested(ID),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StickyIndex {
    pub scope: StickyScope,
    pub assoc: Assoc,
}

/// A resolved sticky index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Offset {
    pub branch: BranchPtr,
    pub index: u32,
    pub assoc: Assoc,
}

impl StickyIndex {
    fn scoped(branch: &BranchPtr, assoc: Assoc) -> StickyIndex {
        let scope = match branch {
            BranchPtr::Root(name) => StickyScope::Root(name.clone()),
            BranchPtr::Nested(id) => StickyScope::Nested(*id),
        };
        return StickyIndex { scope, assoc };
    }

    /// Anchor `index` of `branch`. Returns `None` if the branch does not
    /// exist in `txn`'s document.
    pub fn at<T: ReadTxn>(txn: &T, branch: &BranchPtr, mut index: u32, assoc: Assoc) -> Option<StickyIndex> {
        let store = txn.store();
        let start = store.branch(branch)?.start;
        if assoc == Assoc::Before {
            if index == 0 {
                return Some(StickyIndex::scoped(branch, assoc));
            }
            index -= 1;
        }
        let mut next = start;
        while let Some(id) = next {
            let item = store.get_item(&id)?;
            if item.is_visible() {
                if item.len > index {
                    let scope = StickyScope::Relative(ID::new(id.client, id.clock + index));
                    return Some(StickyIndex { scope, assoc });
                }
                index -= item.len;
            }
            if item.right.is_none() && assoc == Assoc::Before {
                return Some(StickyIndex { scope: StickyScope::Relative(item.last_id()), assoc });
            }
            next = item.right;
        }
        return Some(StickyIndex::scoped(branch, assoc));
    }

    /// The current index of this position. Content moved by undo is
    /// followed to where it was redone.
    pub fn resolve<T: ReadTxn>(&self, txn: &T) -> Option<Offset> {
        let store = txn.store();
        return match &self.scope {
            StickyScope::Relative(id) => self.resolve_relative(store, id),
            StickyScope::Root(name) => {
                let branch = BranchPtr::Root(name.clone());
                let len = store.branch(&branch).map(|b| b.len()).unwrap_or(0);
                Some(self.edge(branch, len))
            }
            StickyScope::Nested(id) => {
                if store.get_state(&id.client) <= id.clock {
                    return None;
                }
                let (start, _) = store.follow_redone(id)?;
                let item = store.get_item(&start)?;
                if !matches!(item.content, ItemContent::Type(_)) {
                    return None;
                }
                let branch = BranchPtr::Nested(start);
                let len = store.branch(&branch)?.len();
                Some(self.edge(branch, len))
            }
        };
    }

    fn edge(&self, branch: BranchPtr, len: u32) -> Offset {
        let index = match self.assoc {
            Assoc::After => len,
            Assoc::Before => 0,
        };
        return Offset { branch, index, assoc: self.assoc };
    }

    fn resolve_relative(&self, store: &Store, id: &ID) -> Option<Offset> {
        if store.get_state(&id.client) <= id.clock {
            return None;
        }
        let (start, diff) = store.follow_redone(id)?;
        let right = store.get_item(&start)?;
        let branch = right.parent_branch()?.clone();
        let mut index = 0;
        if !store.is_branch_deleted(&branch) {
            if right.is_visible() {
                index = match self.assoc {
                    Assoc::After => diff,
                    Assoc::Before => diff + 1,
                };
            }
            let mut next = right.left;
            while let Some(left) = next {
                let Some(item) = store.get_item(&left) else {
                    break;
                };
                if item.is_visible() {
                    index += item.len;
                }
                next = item.left;
            }
        }
        return Some(Offset { branch, index, assoc: self.assoc });
    }

    /// `tag payload assoc`, with `assoc` a signed varint (0 after, -1
    /// before).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match &self.scope {
            StickyScope::Relative(id) => {
                buf.write_var_u32(SCOPE_RELATIVE);
                buf.write_var_u32(id.client);
                buf.write_var_u32(id.clock);
            }
            StickyScope::Root(name) => {
                buf.write_var_u32(SCOPE_ROOT);
                buf.write_string(name);
            }
            StickyScope::Nested(id) => {
                buf.write_var_u32(SCOPE_NESTED);
                buf.write_var_u32(id.client);
                buf.write_var_u32(id.clock);
            }
        }
        let assoc = match self.assoc {
            Assoc::After => 0,
            Assoc::Before => -1,
        };
        buf.write_var_i64(assoc);
        return buf;
    }

    pub fn decode(buf: &[u8]) -> Result<StickyIndex> {
        let mut cursor = Cursor::new(buf);
        let scope = match cursor.read_var_u32()? {
            SCOPE_RELATIVE => {
                let client = cursor.read_var_u32()?;
                let clock = cursor.read_var_u32()?;
                StickyScope::Relative(ID::new(client, clock))
            }
            SCOPE_ROOT => StickyScope::Root(Arc::from(cursor.read_string()?)),
            SCOPE_NESTED => {
                let client = cursor.read_var_u32()?;
                let clock = cursor.read_var_u32()?;
                StickyScope::Nested(ID::new(client, clock))
            }
            tag => return Err(Error::UnexpectedTag { kind: "sticky index", tag }),
        };
        // Older encodings end before the association.
        let assoc = if cursor.has_content() { cursor.read_var_i64()? } else { 0 };
        let assoc = if assoc >= 0 { Assoc::After } else { Assoc::Before };
        return Ok(StickyIndex { scope, assoc });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::StateVector;
    use crate::doc::Doc;
    use crate::types::SharedRef;
    use crate::types::TextRef;

    fn hello() -> (Doc, TextRef) {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        doc.transact(|txn| text.insert(txn, 0, "hello").unwrap());
        return (doc, text);
    }

    fn index(doc: &Doc, sticky: &StickyIndex) -> u32 {
        return sticky.resolve(doc).unwrap().index;
    }

    #[test]
    fn follows_inserts_before() {
        let (mut doc, text) = hello();
        let sticky = StickyIndex::at(&doc, text.ptr(), 2, Assoc::After).unwrap();
        assert_eq!(sticky.scope, StickyScope::Relative(ID::new(1, 2)));
        doc.transact(|txn| text.insert(txn, 0, "XX").unwrap());
        assert_eq!(index(&doc, &sticky), 4);
        doc.transact(|txn| text.insert(txn, 4, "Y").unwrap());
        assert_eq!(index(&doc, &sticky), 5);
    }

    #[test]
    fn end_positions_differ_by_assoc() {
        let (mut doc, text) = hello();
        let before = StickyIndex::at(&doc, text.ptr(), 5, Assoc::Before).unwrap();
        let after = StickyIndex::at(&doc, text.ptr(), 5, Assoc::After).unwrap();
        assert_eq!(after.scope, StickyScope::Root(Arc::from("t")));
        doc.transact(|txn| text.insert(txn, 5, "!!").unwrap());
        assert_eq!(index(&doc, &before), 5);
        assert_eq!(index(&doc, &after), 7);
    }

    #[test]
    fn start_before_sticks_to_the_type() {
        let (mut doc, text) = hello();
        let sticky = StickyIndex::at(&doc, text.ptr(), 0, Assoc::Before).unwrap();
        doc.transact(|txn| text.insert(txn, 0, "ab").unwrap());
        assert_eq!(index(&doc, &sticky), 0);
    }

    #[test]
    fn deleted_anchor_collapses() {
        let (mut doc, text) = hello();
        let sticky = StickyIndex::at(&doc, text.ptr(), 3, Assoc::After).unwrap();
        doc.transact(|txn| text.remove_range(txn, 2, 2).unwrap());
        assert_eq!(text.get_string(&doc), "heo");
        assert_eq!(index(&doc, &sticky), 2);
    }

    #[test]
    fn unknown_ids_do_not_resolve() {
        let (doc, _) = hello();
        let sticky = StickyIndex { scope: StickyScope::Relative(ID::new(9, 0)), assoc: Assoc::After };
        assert!(sticky.resolve(&doc).is_none());
    }

    #[test]
    fn resolves_on_a_peer() {
        let (doc, text) = hello();
        let sticky = StickyIndex::at(&doc, text.ptr(), 1, Assoc::After).unwrap();
        let bytes = sticky.encode();

        let mut peer = Doc::with_client_id(2);
        let remote = peer.get_or_insert_text("t");
        peer.transact(|txn| remote.insert(txn, 0, ">>").unwrap());
        peer.apply_update_v1(&doc.encode_state_as_update_v1(&StateVector::new())).unwrap();
        let decoded = StickyIndex::decode(&bytes).unwrap();
        assert_eq!(decoded, sticky);
        let offset = decoded.resolve(&peer).unwrap();
        let text = remote.get_string(&peer);
        assert_eq!(&text[offset.index as usize..offset.index as usize + 1], "e");
    }

    #[test]
    fn decode_rejects_unknown_tags() {
        assert_eq!(
            StickyIndex::decode(&[7]).unwrap_err(),
            Error::UnexpectedTag { kind: "sticky index", tag: 7 }
        );
        let bare = StickyIndex::decode(&[1, 1, b't']).unwrap();
        assert_eq!(bare.assoc, Assoc::After);
    }
}
