// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Merging updates.
//!
//! Every input is read through a [`BlockCursor`] that yields its blocks
//! highest client first, then by clock. The merge repeatedly takes the
//! block with the highest client and lowest clock across all cursors and
//! appends it to the output. Ranges already covered are dropped or cut,
//! gaps become skips.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::Update;
use crate::crdt::block::Block;
use crate::crdt::primitives::BlockRange;
use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::ID;

/// Pull-based reader over the blocks of one update, skips left out.
pub(crate) struct BlockCursor {
    blocks: VecDeque<Block>,
}

impl BlockCursor {
    pub(crate) fn new(mut blocks: FxHashMap<ClientId, VecDeque<Block>>) -> BlockCursor {
        let mut clients: Vec<ClientId> = blocks.keys().copied().collect();
        clients.sort_unstable_by(|a, b| b.cmp(a));
        let mut flat = VecDeque::new();
        for client in clients {
            if let Some(queue) = blocks.remove(&client) {
                flat.extend(queue.into_iter().filter(|block| !block.is_skip()));
            }
        }
        return BlockCursor { blocks: flat };
    }

    pub(crate) fn current(&self) -> Option<&Block> {
        return self.blocks.front();
    }

    /// Take the current block and move to the next one.
    pub(crate) fn advance(&mut self) -> Option<Block> {
        return self.blocks.pop_front();
    }
}

/// Append `block` to its client's output, cutting what is already covered
/// and filling any gap with a skip.
fn append(out: &mut FxHashMap<ClientId, VecDeque<Block>>, mut block: Block) {
    let id = block.id();
    let queue = out.entry(id.client).or_default();
    if let Some(end) = queue.back().map(|last| last.end()) {
        if block.end() <= end {
            return;
        }
        if id.clock > end {
            queue.push_back(Block::Skip(BlockRange::new(ID::new(id.client, end), id.clock - end)));
        } else if id.clock < end {
            block.slice_left(end - id.clock);
        }
    }
    if let Some(last) = queue.back_mut() {
        if last.try_squash(&block) {
            return;
        }
    }
    queue.push_back(block);
}

pub(crate) fn merge(updates: Vec<Update>) -> Update {
    let mut delete_sets = Vec::with_capacity(updates.len());
    let mut cursors = Vec::with_capacity(updates.len());
    for update in updates {
        delete_sets.push(update.delete_set);
        cursors.push(BlockCursor::new(update.blocks));
    }

    let mut out: FxHashMap<ClientId, VecDeque<Block>> = FxHashMap::default();
    loop {
        let next = cursors
            .iter()
            .enumerate()
            .filter_map(|(i, cursor)| Some((i, cursor.current()?.id())))
            .min_by(|(_, a), (_, b)| b.client.cmp(&a.client).then(a.clock.cmp(&b.clock)));
        let Some((i, _)) = next else {
            break;
        };
        let Some(block) = cursors[i].advance() else {
            break;
        };
        append(&mut out, block);
    }
    return Update { blocks: out, delete_set: DeleteSet::merge_all(delete_sets) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::block::Item;
    use crate::crdt::block::TypePtr;
    use crate::crdt::content::ItemContent;

    fn text(client: ClientId, clock: u32, s: &str) -> Block {
        let origin = if clock > 0 { Some(ID::new(client, clock - 1)) } else { None };
        let parent = if origin.is_none() { TypePtr::Named("t".into()) } else { TypePtr::Unknown };
        let item = Item::new(ID::new(client, clock), None, origin, None, None, parent, None, ItemContent::String(s.into()));
        return Block::Item(Box::new(item));
    }

    fn update(blocks: Vec<Block>) -> Update {
        let mut map: FxHashMap<ClientId, VecDeque<Block>> = FxHashMap::default();
        for block in blocks {
            map.entry(block.id().client).or_default().push_back(block);
        }
        return Update { blocks: map, delete_set: DeleteSet::new() };
    }

    #[test]
    fn cursor_orders_clients_descending() {
        let mut cursor = BlockCursor::new(update(vec![text(1, 0, "a"), text(9, 0, "b")]).blocks);
        assert_eq!(cursor.current().map(|b| b.id()), Some(ID::new(9, 0)));
        cursor.advance();
        assert_eq!(cursor.advance().map(|b| b.id()), Some(ID::new(1, 0)));
        assert!(cursor.current().is_none());
    }

    #[test]
    fn overlaps_are_cut() {
        let a = update(vec![text(1, 0, "abc")]);
        let b = update(vec![text(1, 2, "cde")]);
        let merged = merge(vec![b, a]);
        let queue = &merged.blocks[&1];
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].id(), ID::new(1, 3));
        assert_eq!(queue[1].as_item().map(|item| item.content.clone()), Some(ItemContent::String("de".into())));
    }

    #[test]
    fn gaps_become_skips() {
        let merged = merge(vec![update(vec![text(1, 0, "a")]), update(vec![text(1, 4, "e")])]);
        let queue = &merged.blocks[&1];
        assert_eq!(queue.len(), 3);
        assert_eq!(queue[1], Block::Skip(BlockRange::new(ID::new(1, 1), 3)));
        assert_eq!(merged.state_vector().get(&1), 1);
    }

    #[test]
    fn delete_sets_are_unioned() {
        let mut a = update(vec![]);
        a.delete_set.insert(ID::new(2, 0), 2);
        let mut b = update(vec![]);
        b.delete_set.insert(ID::new(2, 1), 3);
        let merged = merge(vec![a, b]);
        assert!(merged.delete_set.is_deleted(&ID::new(2, 3)));
        assert_eq!(merged.delete_set.deleted_len(), 4);
    }
}
