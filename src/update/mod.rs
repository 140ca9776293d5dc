// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Updates: the unit of replication.
//!
//! An update is a set of blocks grouped by client plus a delete set:
//!
//! ```text
//! update      := blocks delete-set
//! blocks      := varuint(groups) { client varuint(clock) varuint(count) block* }*
//! block       := info [origin] [right origin] [parent] [parent sub] content
//! ```
//!
//! Applying an update is resumable. Blocks whose dependencies have not
//! arrived yet are kept in the store as a pending update together with the
//! lowest clock each missing client must reach. Every later update that
//! advances one of those clients retries the pending blocks. Deletions of
//! unknown ids are kept the same way.
//!
//! Updates are always decoded in full before anything is applied, so a
//! malformed update never touches the store.

pub mod codec;
mod merge;

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use self::codec::Decoder;
use self::codec::DecoderV1;
use self::codec::DecoderV2;
use self::codec::Encoder;
use self::codec::EncoderV1;
use self::codec::EncoderV2;
use crate::crdt::block::Block;
use crate::crdt::block::Item;
use crate::crdt::block::TypePtr;
use crate::crdt::content::BLOCK_GC_REF;
use crate::crdt::content::BLOCK_SKIP_REF;
use crate::crdt::content::ItemContent;
use crate::crdt::primitives::BlockRange;
use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::ID;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::error::Error;
use crate::error::Result;
use crate::transaction::Transaction;

/// A decoded update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    /// Blocks per client, sorted by clock. Gaps are filled with skips.
    pub(crate) blocks: FxHashMap<ClientId, VecDeque<Block>>,
    pub(crate) delete_set: DeleteSet,
}

/// Blocks that could not be integrated yet.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingUpdate {
    /// For every client blocking integration, the clock it must reach.
    pub missing: StateVector,
    pub update: Update,
}

fn malformed(reason: String) -> Error {
    return Error::MalformedUpdate { reason };
}

impl Update {
    pub fn new() -> Update {
        return Update::default();
    }

    pub fn is_empty(&self) -> bool {
        return self.blocks.values().all(|blocks| blocks.is_empty()) && self.delete_set.is_empty();
    }

    pub fn delete_set(&self) -> &DeleteSet {
        return &self.delete_set;
    }

    /// Every block of the update, highest client first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        let mut clients: Vec<&ClientId> = self.blocks.keys().collect();
        clients.sort_by(|a, b| b.cmp(a));
        return clients.into_iter().flat_map(|client| self.blocks[client].iter());
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    pub fn decode_v1(buf: &[u8]) -> Result<Update> {
        let mut decoder = DecoderV1::new(buf);
        return Update::decode(&mut decoder);
    }

    pub fn decode_v2(buf: &[u8]) -> Result<Update> {
        let mut decoder = DecoderV2::new(buf)?;
        return Update::decode(&mut decoder);
    }

    pub(crate) fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<Update> {
        let mut blocks: FxHashMap<ClientId, VecDeque<Block>> = FxHashMap::default();
        let groups = decoder.read_var()?;
        for _ in 0..groups {
            let client = decoder.read_client()?;
            let mut clock = decoder.read_var()?;
            let count = decoder.read_var()?;
            let queue = blocks.entry(client).or_default();
            for _ in 0..count {
                let block = decode_block(decoder, ID::new(client, clock))?;
                clock = clock
                    .checked_add(block.len())
                    .ok_or_else(|| malformed(format!("clock of client {client} overflows")))?;
                queue.push_back(block);
            }
        }
        blocks.retain(|_, queue| !queue.is_empty());
        let delete_set = DeleteSet::decode(decoder)?;
        return Ok(Update { blocks, delete_set });
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    pub fn encode_v1(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    pub fn encode_v2(&self) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    pub(crate) fn encode<E: Encoder>(&self, encoder: &mut E) {
        let mut clients: Vec<ClientId> =
            self.blocks.iter().filter(|(_, queue)| !queue.is_empty()).map(|(client, _)| *client).collect();
        clients.sort_by(|a, b| b.cmp(a));
        encoder.write_var(clients.len() as u32);
        for client in clients {
            let queue = &self.blocks[&client];
            encoder.write_client(client);
            encoder.write_var(queue[0].id().clock);
            encoder.write_var(queue.len() as u32);
            for block in queue.iter() {
                block.encode(encoder, 0, 0);
            }
        }
        self.delete_set.encode(encoder);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// The state a document reaches by applying only this update: for every
    /// client whose blocks start at clock 0, the end of the first run
    /// without skips.
    pub fn state_vector(&self) -> StateVector {
        let mut sv = StateVector::new();
        for (client, queue) in self.blocks.iter() {
            let mut clock = 0;
            for block in queue.iter() {
                if block.is_skip() || block.id().clock != clock {
                    break;
                }
                clock = block.end();
            }
            if clock > 0 {
                sv.set(*client, clock);
            }
        }
        return sv;
    }

    /// The part of this update a holder of `sv` has not seen. The delete
    /// set is kept whole.
    pub fn diff(&self, sv: &StateVector) -> Update {
        let mut blocks = FxHashMap::default();
        for (client, queue) in self.blocks.iter() {
            let known = sv.get(client);
            let mut out: VecDeque<Block> = VecDeque::new();
            for block in queue.iter() {
                if out.is_empty() {
                    if block.is_skip() || block.end() <= known {
                        continue;
                    }
                    let mut block = block.clone();
                    if block.id().clock < known {
                        block.slice_left(known - block.id().clock);
                    }
                    out.push_back(block);
                } else {
                    out.push_back(block.clone());
                }
            }
            if !out.is_empty() {
                blocks.insert(*client, out);
            }
        }
        return Update { blocks, delete_set: self.delete_set.clone() };
    }

    /// Combine several updates into one equivalent to applying them all.
    pub fn merge(updates: Vec<Update>) -> Update {
        return merge::merge(updates);
    }

    /// Everything `store` knows beyond `sv`, including pending blocks and
    /// deletions.
    pub(crate) fn from_store(store: &Store, sv: &StateVector) -> Update {
        let mut blocks = FxHashMap::default();
        for (client, stored) in store.blocks.iter() {
            let Some(last) = stored.last() else {
                continue;
            };
            let known = sv.get(client);
            if last.end() <= known {
                continue;
            }
            let clock = known.max(stored[0].id().clock);
            let Some(start) = Store::find_index(stored, clock) else {
                continue;
            };
            let mut queue: VecDeque<Block> = stored[start..].iter().map(|block| block.detached()).collect();
            if let Some(first) = queue.front_mut() {
                let offset = clock - first.id().clock;
                first.slice_left(offset);
            }
            blocks.insert(*client, queue);
        }
        let update = Update { blocks, delete_set: store.delete_set() };
        if !store.has_pending() {
            return update;
        }
        let mut parts = vec![update];
        if let Some(pending) = &store.pending {
            parts.push(pending.update.clone());
        }
        if let Some(ds) = &store.pending_ds {
            parts.push(Update { blocks: FxHashMap::default(), delete_set: ds.clone() });
        }
        return Update::merge(parts).diff(sv);
    }
}

fn decode_block<'a, D: Decoder<'a>>(decoder: &mut D, id: ID) -> Result<Block> {
    let info = decoder.read_info()?;
    let block = match info & 0b1_1111 {
        BLOCK_GC_REF => Block::GC(BlockRange::new(id, decoder.read_len()?)),
        BLOCK_SKIP_REF => Block::Skip(BlockRange::new(id, decoder.read_var()?)),
        tag => {
            let origin = match Item::has_origin_flag(info) {
                true => Some(decoder.read_left_id()?),
                false => None,
            };
            let right_origin = match Item::has_right_origin_flag(info) {
                true => Some(decoder.read_right_id()?),
                false => None,
            };
            let mut parent = TypePtr::Unknown;
            let mut parent_sub = None;
            if origin.is_none() && right_origin.is_none() {
                parent = match decoder.read_parent_info()? {
                    true => TypePtr::Named(Arc::from(decoder.read_str()?)),
                    false => TypePtr::Id(decoder.read_left_id()?),
                };
                if Item::has_parent_sub_flag(info) {
                    parent_sub = Some(Arc::from(decoder.read_str()?));
                }
            }
            let content = ItemContent::decode(decoder, tag)?;
            Block::Item(Box::new(Item::new(id, None, origin, None, right_origin, parent, parent_sub, content)))
        }
    };
    if block.is_empty() {
        return Err(malformed(format!("empty block at {id}")));
    }
    if id.clock.checked_add(block.len()).is_none() {
        return Err(malformed(format!("block at {id} overflows the clock")));
    }
    return Ok(block);
}

// =============================================================================
// Application
// =============================================================================

type BlockQueues = FxHashMap<ClientId, VecDeque<Block>>;

/// Highest client that still has blocks to integrate.
fn next_target(clients: &mut Vec<ClientId>, queues: &BlockQueues) -> Option<ClientId> {
    while let Some(client) = clients.last() {
        if queues.get(client).is_some_and(|queue| !queue.is_empty()) {
            return Some(*client);
        }
        clients.pop();
    }
    return None;
}

/// Move the stack and every remaining block of its clients aside.
fn spill(stack: &mut Vec<Block>, queues: &mut BlockQueues, rest: &mut BlockQueues, clients: &mut Vec<ClientId>) {
    for block in stack.drain(..) {
        let client = block.id().client;
        let held = rest.entry(client).or_default();
        held.push_back(block);
        if let Some(remaining) = queues.remove(&client) {
            held.extend(remaining);
        }
        clients.retain(|c| *c != client);
    }
}

impl Transaction<'_> {
    /// Integrate a decoded update, buffering whatever cannot be applied yet
    /// and retrying buffered blocks once their dependencies arrived.
    pub(crate) fn apply_update(&mut self, update: Update) {
        let Update { blocks, delete_set } = update;
        let rest = self.integrate_blocks(blocks);
        let mut retry = false;
        match self.doc.store.pending.take() {
            Some(mut pending) => {
                retry = pending.missing.iter().any(|(client, clock)| *clock < self.doc.store.get_state(client));
                if let Some(rest) = rest {
                    for (client, clock) in rest.missing.iter() {
                        pending.missing.set_min(*client, *clock);
                    }
                    pending.update = Update::merge(vec![pending.update, rest.update]);
                }
                self.doc.store.pending = Some(pending);
            }
            None => {
                if let Some(rest) = &rest {
                    debug!(missing = ?rest.missing, "buffering update with unmet dependencies");
                }
                self.doc.store.pending = rest;
            }
        }

        let unapplied = self.apply_delete_set(&delete_set);
        let still_pending = match self.doc.store.pending_ds.take() {
            Some(pending) => self.apply_delete_set(&pending),
            None => None,
        };
        self.doc.store.pending_ds = match (unapplied, still_pending) {
            (Some(mut a), Some(b)) => {
                a.merge(b);
                Some(a)
            }
            (a, b) => a.or(b),
        };

        if retry {
            if let Some(pending) = self.doc.store.pending.take() {
                debug!(missing = ?pending.missing, "retrying pending update");
                self.apply_update(pending.update);
            }
        }
    }

    /// Integrate blocks in causal order. A block whose dependency is another
    /// client's queued block waits on a stack until that block is in.
    /// Returns what could not be integrated.
    fn integrate_blocks(&mut self, mut queues: BlockQueues) -> Option<PendingUpdate> {
        let mut clients: Vec<ClientId> = queues.keys().copied().collect();
        clients.sort_unstable();
        let mut stack: Vec<Block> = Vec::new();
        let mut rest: BlockQueues = FxHashMap::default();
        let mut missing = StateVector::new();
        let mut state: FxHashMap<ClientId, u32> = FxHashMap::default();

        let mut current = next_target(&mut clients, &queues);
        let Some(mut head) = current.and_then(|client| queues.get_mut(&client)?.pop_front()) else {
            return None;
        };
        loop {
            if !head.is_skip() {
                let id = head.id();
                let local = *state.entry(id.client).or_insert_with(|| self.doc.store.get_state(&id.client));
                if local < id.clock {
                    missing.set_min(id.client, id.clock - 1);
                    stack.push(head);
                    spill(&mut stack, &mut queues, &mut rest, &mut clients);
                } else {
                    let offset = local - id.clock;
                    let dependency = match &mut head {
                        Block::Item(item) => self.missing(item),
                        _ => None,
                    };
                    match dependency {
                        Some(client) => {
                            stack.push(head);
                            match queues.get_mut(&client).and_then(|queue| queue.pop_front()) {
                                Some(next) => {
                                    head = next;
                                    continue;
                                }
                                None => {
                                    missing.set_min(client, self.doc.store.get_state(&client));
                                    spill(&mut stack, &mut queues, &mut rest, &mut clients);
                                }
                            }
                        }
                        None if offset < head.len() => {
                            let end = head.end();
                            self.integrate_block(head, offset);
                            state.insert(id.client, end);
                        }
                        None => {}
                    }
                }
            }
            head = match stack.pop() {
                Some(block) => block,
                None => {
                    let next = current.and_then(|client| queues.get_mut(&client)?.pop_front());
                    match next {
                        Some(block) => block,
                        None => {
                            current = next_target(&mut clients, &queues);
                            match current.and_then(|client| queues.get_mut(&client)?.pop_front()) {
                                Some(block) => block,
                                None => break,
                            }
                        }
                    }
                }
            };
        }

        if rest.is_empty() {
            return None;
        }
        for queue in rest.values_mut() {
            queue.make_contiguous().sort_by_key(|block| block.id().clock);
        }
        return Some(PendingUpdate { missing, update: Update { blocks: rest, delete_set: DeleteSet::new() } });
    }

    fn integrate_block(&mut self, block: Block, offset: u32) {
        match block {
            Block::Item(item) => self.integrate_item(*item, offset),
            Block::GC(range) => {
                let id = range.id.offset(offset);
                self.doc.store.push_block(Block::GC(BlockRange::new(id, range.len - offset)));
            }
            Block::Skip(_) => {}
        }
    }

    /// Delete every known id of `ds`. Returns the ids not known yet.
    fn apply_delete_set(&mut self, ds: &DeleteSet) -> Option<DeleteSet> {
        let mut unapplied = DeleteSet::new();
        for (client, runs) in ds.iter() {
            let state = self.doc.store.get_state(client);
            for run in runs {
                let end = run.end();
                if run.clock < state {
                    if state < end {
                        unapplied.insert(ID::new(*client, state), end - state);
                    }
                    for id in self.iterate_blocks(*client, run.clock, end.min(state) - run.clock) {
                        self.delete_item(&id);
                    }
                } else {
                    unapplied.insert(ID::new(*client, run.clock), run.len);
                }
            }
        }
        if unapplied.is_empty() {
            return None;
        }
        unapplied.squash();
        return Some(unapplied);
    }
}

// =============================================================================
// Byte-level utilities
// =============================================================================

/// Merge V1 updates into one.
pub fn merge_updates_v1(updates: &[&[u8]]) -> Result<Vec<u8>> {
    let decoded = updates.iter().map(|u| Update::decode_v1(u)).collect::<Result<Vec<_>>>()?;
    return Ok(Update::merge(decoded).encode_v1());
}

/// Merge V2 updates into one.
pub fn merge_updates_v2(updates: &[&[u8]]) -> Result<Vec<u8>> {
    let decoded = updates.iter().map(|u| Update::decode_v2(u)).collect::<Result<Vec<_>>>()?;
    return Ok(Update::merge(decoded).encode_v2());
}

/// Strip from a V1 update what the holder of the encoded state vector has.
pub fn diff_update_v1(update: &[u8], state_vector: &[u8]) -> Result<Vec<u8>> {
    let sv = StateVector::decode(state_vector)?;
    return Ok(Update::decode_v1(update)?.diff(&sv).encode_v1());
}

/// Strip from a V2 update what the holder of the encoded state vector has.
pub fn diff_update_v2(update: &[u8], state_vector: &[u8]) -> Result<Vec<u8>> {
    let sv = StateVector::decode(state_vector)?;
    return Ok(Update::decode_v2(update)?.diff(&sv).encode_v2());
}

pub fn encode_state_vector_from_update_v1(update: &[u8]) -> Result<Vec<u8>> {
    return Ok(Update::decode_v1(update)?.state_vector().encode());
}

pub fn encode_state_vector_from_update_v2(update: &[u8]) -> Result<Vec<u8>> {
    return Ok(Update::decode_v2(update)?.state_vector().encode());
}

pub fn convert_update_v1_to_v2(update: &[u8]) -> Result<Vec<u8>> {
    return Ok(Update::decode_v1(update)?.encode_v2());
}

pub fn convert_update_v2_to_v1(update: &[u8]) -> Result<Vec<u8>> {
    return Ok(Update::decode_v2(update)?.encode_v1());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Doc;
    use crate::types::In;

    fn doc_with_text(client: ClientId, text: &str) -> Doc {
        let mut doc = Doc::with_client_id(client);
        let t = doc.get_or_insert_text("t");
        doc.transact(|txn| t.insert(txn, 0, text).unwrap());
        return doc;
    }

    fn text_of(doc: &mut Doc) -> String {
        let t = doc.get_or_insert_text("t");
        return t.get_string(doc);
    }

    #[test]
    fn decode_matches_encode_in_both_formats() {
        let doc = doc_with_text(7, "héllo");
        let v1 = doc.encode_state_as_update_v1(&StateVector::new());
        let v2 = doc.encode_state_as_update_v2(&StateVector::new());
        let a = Update::decode_v1(&v1).unwrap();
        let b = Update::decode_v2(&v2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.state_vector(), StateVector::from_iter([(7, 5)]));
        assert_eq!(Update::decode_v2(&convert_update_v1_to_v2(&v1).unwrap()).unwrap(), a);
        assert_eq!(Update::decode_v1(&convert_update_v2_to_v1(&v2).unwrap()).unwrap(), b);
    }

    #[test]
    fn truncated_update_leaves_doc_untouched() {
        let source = doc_with_text(1, "abc");
        let update = source.encode_state_as_update_v1(&StateVector::new());
        let mut target = Doc::with_client_id(2);
        assert!(target.apply_update_v1(&update[..update.len() - 2]).is_err());
        assert!(target.state_vector().is_empty());
        target.apply_update_v1(&update).unwrap();
        assert_eq!(text_of(&mut target), "abc");
    }

    #[test]
    fn zero_length_blocks_are_rejected() {
        let mut encoder = EncoderV1::new();
        encoder.write_var(1);
        encoder.write_client(3);
        encoder.write_var(0);
        encoder.write_var(1);
        encoder.write_info(BLOCK_GC_REF);
        encoder.write_len(0);
        DeleteSet::new().encode(&mut encoder);
        let buf = encoder.to_vec();
        assert!(matches!(Update::decode_v1(&buf), Err(Error::MalformedUpdate { .. })));
    }

    #[test]
    fn out_of_order_updates_wait_in_pending() {
        let mut source = Doc::with_client_id(1);
        let t = source.get_or_insert_text("t");
        let mut updates = Vec::new();
        for (i, chunk) in ["a", "b", "c"].into_iter().enumerate() {
            let before = source.state_vector();
            source.transact(|txn| t.insert(txn, i as u32, chunk).unwrap());
            updates.push(source.encode_state_as_update_v1(&before));
        }
        let mut target = Doc::with_client_id(2);
        target.apply_update_v1(&updates[2]).unwrap();
        target.apply_update_v1(&updates[1]).unwrap();
        assert!(target.store.has_pending());
        assert_eq!(text_of(&mut target), "");
        target.apply_update_v1(&updates[0]).unwrap();
        assert!(!target.store.has_pending());
        assert_eq!(text_of(&mut target), "abc");
    }

    #[test]
    fn pending_deletes_apply_later() {
        let mut source = Doc::with_client_id(1);
        let array = source.get_or_insert_array("a");
        source.transact(|txn| array.insert_range(txn, 0, vec![In::from(1), In::from(2), In::from(3)]).unwrap());
        let insert = source.encode_state_as_update_v1(&StateVector::new());
        let sv = source.state_vector();
        source.transact(|txn| array.remove(txn, 1).unwrap());
        let delete = source.encode_state_as_update_v1(&sv);

        let mut target = Doc::with_client_id(2);
        target.apply_update_v1(&delete).unwrap();
        assert!(target.store.pending_ds.is_some());
        target.apply_update_v1(&insert).unwrap();
        assert!(target.store.pending_ds.is_none());
        let out = target.get_or_insert_array("a");
        assert_eq!(serde_json::to_value(out.to_json(&target)).unwrap(), serde_json::json!([1, 3]));
    }

    #[test]
    fn merged_update_equals_sequence() {
        let mut a = Doc::with_client_id(1);
        let mut b = Doc::with_client_id(2);
        let ta = a.get_or_insert_text("t");
        let tb = b.get_or_insert_text("t");
        a.transact(|txn| ta.insert(txn, 0, "ab").unwrap());
        b.transact(|txn| tb.insert(txn, 0, "cd").unwrap());
        let ua = a.encode_state_as_update_v1(&StateVector::new());
        let ub = b.encode_state_as_update_v1(&StateVector::new());
        let merged = merge_updates_v1(&[&ua, &ub]).unwrap();
        let reversed = merge_updates_v1(&[&ub, &ua]).unwrap();
        assert_eq!(merged, reversed);

        let mut x = Doc::with_client_id(3);
        x.apply_update_v1(&merged).unwrap();
        let mut y = Doc::with_client_id(4);
        y.apply_update_v1(&ub).unwrap();
        y.apply_update_v1(&ua).unwrap();
        assert_eq!(text_of(&mut x), text_of(&mut y));
        assert_eq!(x.state_vector(), y.state_vector());
    }

    #[test]
    fn diff_drops_known_prefix() {
        let mut doc = doc_with_text(1, "abc");
        let sv = doc.state_vector();
        let t = doc.get_or_insert_text("t");
        doc.transact(|txn| t.insert(txn, 3, "def").unwrap());
        let full = doc.encode_state_as_update_v1(&StateVector::new());
        let diff = diff_update_v1(&full, &sv.encode()).unwrap();
        let update = Update::decode_v1(&diff).unwrap();
        let blocks: Vec<&Block> = update.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id(), ID::new(1, 3));
        assert_eq!(blocks[0].len(), 3);

        let mut target = doc_with_text(1, "abc");
        target.apply_update_v1(&diff).unwrap();
        assert_eq!(text_of(&mut target), "abcdef");
    }

    #[test]
    fn state_vector_from_update_stops_at_gaps() {
        let doc = doc_with_text(5, "xyz");
        let update = doc.encode_state_as_update_v1(&StateVector::new());
        let sv = StateVector::decode(&encode_state_vector_from_update_v1(&update).unwrap()).unwrap();
        assert_eq!(sv, StateVector::from_iter([(5, 3)]));

        let tail = doc.encode_state_as_update_v1(&StateVector::from_iter([(5, 1)]));
        let sv = Update::decode_v1(&tail).unwrap().state_vector();
        assert!(sv.is_empty());
    }
}
