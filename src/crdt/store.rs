// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! The struct store: every block a replica knows, indexed by client.
//!
//! Each client owns one vector of blocks sorted by clock with no gaps, so
//! the clock ranges of a client tile `0..state`. The store is the only
//! owner of items; everything else refers to them by [`ID`] and resolves
//! through [`Store::find_index`], a binary search pivoted by linear
//! interpolation.
//!
//! The store also owns every [`Branch`] (root and nested) and the two
//! pending slots for updates that arrived before their dependencies.
//!
//! Complexity:
//! - lookup by id: O(log n) per client, usually O(1) thanks to the pivot
//! - push: O(1) amortized
//! - split: O(n) for the vector insert

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::block::Block;
use super::block::Item;
use super::branch::Branch;
use super::branch::BranchPtr;
use super::branch::MAX_SEARCH_MARKERS;
use super::branch::SearchMarker;
use super::branch::TypeRef;
use super::content::ItemContent;
use super::primitives::BlockRange;
use super::primitives::ClientId;
use super::primitives::DeleteSet;
use super::primitives::ID;
use super::primitives::StateVector;
use crate::update::PendingUpdate;
use crate::update::codec::Encoder;

#[derive(Debug, Default)]
pub struct Store {
    pub(crate) blocks: FxHashMap<ClientId, Vec<Block>>,
    pub(crate) branches: FxHashMap<BranchPtr, Branch>,
    /// Blocks whose dependencies have not arrived yet.
    pub(crate) pending: Option<PendingUpdate>,
    /// Deletions targeting blocks that have not arrived yet.
    pub(crate) pending_ds: Option<DeleteSet>,
}

impl Store {
    pub fn new() -> Store {
        return Store::default();
    }

    // =========================================================================
    // Clocks
    // =========================================================================

    /// Next expected clock of a client.
    pub fn get_state(&self, client: &ClientId) -> u32 {
        return match self.blocks.get(client).and_then(|blocks| blocks.last()) {
            Some(last) => last.end(),
            None => 0,
        };
    }

    pub fn state_vector(&self) -> StateVector {
        return self
            .blocks
            .iter()
            .filter_map(|(client, blocks)| blocks.last().map(|last| (*client, last.end())))
            .collect();
    }

    /// Scan every client for deleted blocks.
    pub fn delete_set(&self) -> DeleteSet {
        let mut ds = DeleteSet::new();
        for (client, blocks) in self.blocks.iter() {
            let mut i = 0;
            while i < blocks.len() {
                if !blocks[i].is_deleted() {
                    i += 1;
                    continue;
                }
                let clock = blocks[i].id().clock;
                let mut len = blocks[i].len();
                i += 1;
                while i < blocks.len() && blocks[i].is_deleted() {
                    len += blocks[i].len();
                    i += 1;
                }
                ds.insert(ID::new(*client, clock), len);
            }
        }
        ds.squash();
        return ds;
    }

    pub fn has_pending(&self) -> bool {
        return self.pending.is_some() || self.pending_ds.is_some();
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Index of the block containing `clock`, or `None` past the end.
    pub fn find_index(blocks: &[Block], clock: u32) -> Option<usize> {
        let last = blocks.last()?;
        if clock >= last.end() {
            return None;
        }
        let mut left = 0usize;
        let mut right = blocks.len() - 1;
        let last_clock = last.id().clock;
        if last_clock <= clock {
            return Some(right);
        }
        // Pivot on the assumption that clocks are spread evenly
        let span = (last.end() - 1).max(1) as u64;
        let mut mid = ((clock as u64 * right as u64) / span) as usize;
        mid = mid.min(right);
        loop {
            let block = &blocks[mid];
            let mid_clock = block.id().clock;
            if mid_clock <= clock {
                if clock < mid_clock + block.len() {
                    return Some(mid);
                }
                left = mid + 1;
            } else {
                if mid == 0 {
                    return None;
                }
                right = mid - 1;
            }
            if left > right {
                return None;
            }
            mid = (left + right) / 2;
        }
    }

    /// Position of the block containing `id` in its client's vector.
    pub(crate) fn locate(&self, id: &ID) -> Option<usize> {
        let blocks = self.blocks.get(&id.client)?;
        return Store::find_index(blocks, id.clock);
    }

    /// The block containing `id`.
    pub fn get_block(&self, id: &ID) -> Option<&Block> {
        let blocks = self.blocks.get(&id.client)?;
        let index = Store::find_index(blocks, id.clock)?;
        return Some(&blocks[index]);
    }

    pub(crate) fn get_block_mut(&mut self, id: &ID) -> Option<&mut Block> {
        let blocks = self.blocks.get_mut(&id.client)?;
        let index = Store::find_index(blocks, id.clock)?;
        return Some(&mut blocks[index]);
    }

    /// The item containing `id`, if that block is an item.
    pub fn get_item(&self, id: &ID) -> Option<&Item> {
        return self.get_block(id)?.as_item();
    }

    pub(crate) fn get_item_mut(&mut self, id: &ID) -> Option<&mut Item> {
        return self.get_block_mut(id)?.as_item_mut();
    }

    /// Follow `redone` links to the item that currently carries the content
    /// of `id`. Returns that item's id and the offset of the unit inside it.
    pub fn follow_redone(&self, id: &ID) -> Option<(ID, u32)> {
        let mut next = *id;
        loop {
            let block = self.get_block(&next)?;
            let start = block.id();
            let diff = next.clock - start.clock;
            match block.as_item().and_then(|item| item.redone) {
                Some(redone) => next = redone.offset(diff),
                None => return Some((start, diff)),
            }
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Append a block to its client. The block must start exactly where the
    /// client's last block ends.
    pub(crate) fn push_block(&mut self, block: Block) {
        let id = block.id();
        let blocks = self.blocks.entry(id.client).or_default();
        let expected = blocks.last().map(|last| last.end()).unwrap_or(0);
        assert!(
            expected == id.clock,
            "block {} does not abut client state {}",
            id,
            expected
        );
        blocks.push(block);
    }

    /// Split the item at `index` of `client` after `diff` units. Returns the
    /// id of the new right half. Links, the parent's key slot and marker
    /// flags are kept consistent.
    pub(crate) fn split_block(&mut self, client: ClientId, index: usize, diff: u32) -> Option<ID> {
        let blocks = self.blocks.get_mut(&client)?;
        let left = blocks.get_mut(index)?.as_item_mut()?;
        if diff == 0 || diff >= left.len {
            return None;
        }
        let mut right = left.splice(diff);
        right.set_marked(false);
        let right_id = right.id;
        left.right = Some(right_id);
        let next = right.right;
        let slot = match (&right.parent_sub, right.right) {
            (Some(sub), None) => right.parent_branch().cloned().map(|ptr| (ptr, sub.clone())),
            _ => None,
        };
        blocks.insert(index + 1, Block::Item(Box::new(right)));

        if let Some(next) = next {
            if let Some(item) = self.get_item_mut(&next) {
                item.left = Some(right_id);
            }
        }
        if let Some((ptr, sub)) = slot {
            if let Some(branch) = self.branches.get_mut(&ptr) {
                branch.map.insert(sub, right_id);
            }
        }
        return Some(right_id);
    }

    /// Merge the block at `pos` into its left neighbours for as long as
    /// they are compatible. Returns how many blocks were absorbed.
    pub(crate) fn try_merge_with_lefts(&mut self, client: ClientId, pos: usize) -> usize {
        struct Merged {
            left: ID,
            right: ID,
            next: Option<ID>,
            parent: Option<BranchPtr>,
            parent_sub: Option<Arc<str>>,
            shift: u32,
        }

        let Some(blocks) = self.blocks.get_mut(&client) else {
            return 0;
        };
        if pos == 0 || pos >= blocks.len() {
            return 0;
        }
        let mut fixups = Vec::new();
        let mut i = pos;
        while i > 0 {
            let (head, tail) = blocks.split_at_mut(i);
            let left = &mut head[i - 1];
            let right = &tail[0];
            if left.is_deleted() != right.is_deleted() {
                break;
            }
            match (left, right) {
                (Block::GC(left), Block::GC(right)) => {
                    if left.id.clock + left.len != right.id.clock {
                        break;
                    }
                    left.len += right.len;
                }
                (Block::Item(left), Block::Item(right)) => {
                    let mergeable = right.origin == Some(left.last_id())
                        && left.right == Some(right.id)
                        && left.right_origin == right.right_origin
                        && left.id.clock + left.len == right.id.clock
                        && left.redone.is_none()
                        && right.redone.is_none()
                        && left.content.try_squash(&right.content);
                    if !mergeable {
                        break;
                    }
                    let shift = if left.is_visible() { left.len } else { 0 };
                    fixups.push(Merged {
                        left: left.id,
                        right: right.id,
                        next: right.right,
                        parent: right.parent_branch().cloned(),
                        parent_sub: right.parent_sub.clone(),
                        shift,
                    });
                    if right.is_keep() {
                        left.set_keep(true);
                    }
                    if right.is_marked() {
                        left.set_marked(true);
                    }
                    left.right = right.right;
                    left.len += right.len;
                }
                _ => break,
            }
            i -= 1;
        }
        let merged = pos - i;
        if merged > 0 {
            blocks.drain(i + 1..=pos);
        }

        for fix in fixups {
            if let Some(next) = fix.next {
                if let Some(item) = self.get_item_mut(&next) {
                    item.left = Some(fix.left);
                }
            }
            let Some(ptr) = fix.parent else {
                continue;
            };
            let Some(branch) = self.branches.get_mut(&ptr) else {
                continue;
            };
            if let Some(markers) = branch.markers.as_mut() {
                markers.replace_item(fix.right, fix.left, fix.shift);
            }
            if let Some(sub) = fix.parent_sub {
                if branch.map.get(&sub) == Some(&fix.right) {
                    branch.map.insert(sub, fix.left);
                }
            }
        }
        return merged;
    }

    /// Discard the content of a deleted item. Nested types are collected
    /// recursively and their children replaced by GC blocks; when
    /// `parent_gcd` is set the item itself becomes a GC block.
    pub(crate) fn gc_item(&mut self, id: &ID, parent_gcd: bool) {
        let Some(item) = self.get_item(id) else {
            return;
        };
        let start = item.id;
        let len = item.len;
        if let ItemContent::Type(_) = item.content {
            let ptr = BranchPtr::Nested(start);
            if let Some(branch) = self.branches.remove(&ptr) {
                let mut children = Vec::new();
                let mut next = branch.start;
                while let Some(child) = next {
                    children.push(child);
                    next = self.get_item(&child).and_then(|item| item.right);
                }
                for slot in branch.map.values() {
                    let mut next = Some(*slot);
                    while let Some(child) = next {
                        children.push(child);
                        next = self.get_item(&child).and_then(|item| item.left);
                    }
                }
                for child in children {
                    self.gc_item(&child, true);
                }
            }
        }
        let Some(block) = self.get_block_mut(&start) else {
            return;
        };
        if parent_gcd {
            *block = Block::GC(BlockRange::new(start, len));
        } else if let Some(item) = block.as_item_mut() {
            item.set_content(ItemContent::Deleted(len));
        }
    }

    /// Collect every deleted, unprotected item covered by `ds`.
    pub(crate) fn gc_delete_set(&mut self, ds: &DeleteSet, filter: Option<&dyn Fn(&Item) -> bool>) {
        for (client, runs) in ds.iter() {
            for run in runs.iter().rev() {
                let Some(blocks) = self.blocks.get(client) else {
                    continue;
                };
                let Some(mut si) = Store::find_index(blocks, run.clock) else {
                    continue;
                };
                let mut targets = Vec::new();
                while si < blocks.len() && blocks[si].id().clock < run.end() {
                    if let Block::Item(item) = &blocks[si] {
                        if item.is_deleted() && !item.is_keep() && filter.is_none_or(|f| f(item)) {
                            targets.push(item.id);
                        }
                    }
                    si += 1;
                }
                for id in targets {
                    self.gc_item(&id, false);
                }
            }
        }
    }

    /// Merge blocks around every run of `ds`, right to left.
    pub(crate) fn merge_delete_set(&mut self, ds: &DeleteSet) {
        for (client, runs) in ds.iter() {
            for run in runs.iter().rev() {
                let Some(blocks) = self.blocks.get(client) else {
                    continue;
                };
                let Some(last) = Store::find_index(blocks, run.end() - 1) else {
                    continue;
                };
                let mut si = (blocks.len() - 1).min(last + 1);
                while si > 0 && self.blocks[client][si].id().clock >= run.clock {
                    let merged = self.try_merge_with_lefts(*client, si);
                    if merged + 1 > si {
                        break;
                    }
                    si -= merged + 1;
                }
            }
        }
    }

    /// Merge every block a client appended since `before`.
    pub(crate) fn merge_since(&mut self, before: &StateVector, after: &StateVector) {
        for (client, clock) in after.iter() {
            let before_clock = before.get(client);
            if before_clock == *clock {
                continue;
            }
            let Some(blocks) = self.blocks.get(client) else {
                continue;
            };
            let first = Store::find_index(blocks, before_clock).unwrap_or(0).max(1);
            let mut i = blocks.len() - 1;
            while i >= first {
                let merged = self.try_merge_with_lefts(*client, i);
                if merged + 1 > i {
                    break;
                }
                i -= merged + 1;
            }
        }
    }

    /// Retry merges around blocks that were split off during a transaction.
    pub(crate) fn merge_split_blocks(&mut self, ids: &[ID]) {
        for id in ids.iter().rev() {
            let Some(blocks) = self.blocks.get(&id.client) else {
                continue;
            };
            let Some(pos) = Store::find_index(blocks, id.clock) else {
                continue;
            };
            if pos + 1 < blocks.len() && self.try_merge_with_lefts(id.client, pos + 1) > 1 {
                continue;
            }
            if pos > 0 {
                self.try_merge_with_lefts(id.client, pos);
            }
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    pub fn branch(&self, ptr: &BranchPtr) -> Option<&Branch> {
        return self.branches.get(ptr);
    }

    pub(crate) fn branch_mut(&mut self, ptr: &BranchPtr) -> Option<&mut Branch> {
        return self.branches.get_mut(ptr);
    }

    /// Look up a root type, creating it when missing and giving an untyped
    /// root its concrete kind.
    pub(crate) fn get_or_create_root(&mut self, name: &str, type_ref: TypeRef) -> BranchPtr {
        let ptr = BranchPtr::root(name);
        match self.branches.get_mut(&ptr) {
            Some(branch) => branch.repair_type_ref(type_ref),
            None => {
                let name: Arc<str> = Arc::from(name);
                self.branches.insert(ptr.clone(), Branch::root(name, type_ref));
            }
        }
        return ptr;
    }

    /// Names of all root types, sorted.
    pub fn root_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self
            .branches
            .keys()
            .filter_map(|ptr| match ptr {
                BranchPtr::Root(name) => Some(name.clone()),
                BranchPtr::Nested(_) => None,
            })
            .collect();
        names.sort();
        return names;
    }

    /// True if the item holding the branch has been deleted.
    pub(crate) fn is_branch_deleted(&self, ptr: &BranchPtr) -> bool {
        return match ptr {
            BranchPtr::Root(_) => false,
            BranchPtr::Nested(id) => self.get_block(id).map(|b| b.is_deleted()).unwrap_or(true),
        };
    }

    /// The parent of a branch, or `None` for roots.
    pub(crate) fn parent_of(&self, ptr: &BranchPtr) -> Option<BranchPtr> {
        return match ptr {
            BranchPtr::Root(_) => None,
            BranchPtr::Nested(id) => self.get_item(id)?.parent_branch().cloned(),
        };
    }

    /// Walk the visible children of a list branch.
    pub(crate) fn list_items(&self, ptr: &BranchPtr) -> Vec<ID> {
        let mut ids = Vec::new();
        let mut next = self.branches.get(ptr).and_then(|b| b.start);
        while let Some(id) = next {
            let Some(item) = self.get_item(&id) else {
                break;
            };
            ids.push(id);
            next = item.right;
        }
        return ids;
    }

    // =========================================================================
    // Search markers
    // =========================================================================

    fn set_marked(&mut self, id: &ID, marked: bool) {
        if let Some(item) = self.get_item_mut(id) {
            item.set_marked(marked);
        }
    }

    /// Find a cached position near `index` and move it onto the item that
    /// contains `index`. The returned marker points at a block start.
    pub(crate) fn find_marker(&mut self, ptr: &BranchPtr, index: u32) -> Option<SearchMarker> {
        let branch = self.branches.get(ptr)?;
        let start = branch.start?;
        if index == 0 {
            return None;
        }
        let markers = branch.markers.as_ref()?;
        let parent_len = branch.block_len;
        let mut slot = markers.closest(index);
        let (mut p, mut pindex) = match slot {
            Some(s) => (markers.markers[s].item, markers.markers[s].index),
            None => (start, 0),
        };
        if slot.is_some() && self.get_item(&p).map(|item| item.id) != Some(p) {
            // Stale marker: start over
            if let Some(markers) = self.branches.get_mut(ptr).and_then(|b| b.markers.as_mut()) {
                markers.clear();
            }
            slot = None;
            p = start;
            pindex = 0;
        }
        if let Some(s) = slot {
            if let Some(markers) = self.branches.get_mut(ptr).and_then(|b| b.markers.as_mut()) {
                markers.refresh(s);
            }
        }

        // Walk right
        while pindex < index {
            let item = self.get_item(&p)?;
            let Some(right) = item.right else {
                break;
            };
            if item.is_visible() {
                if index < pindex + item.len {
                    break;
                }
                pindex += item.len;
            }
            p = right;
        }
        // Walk left
        while pindex > index {
            let Some(left) = self.get_item(&p)?.left else {
                break;
            };
            p = left;
            let item = self.get_item(&p)?;
            if item.is_visible() {
                pindex -= item.len;
            }
        }
        // Never mark an item that could be merged into its left neighbour
        loop {
            let item = self.get_item(&p)?;
            let Some(left_id) = item.left else {
                break;
            };
            let left = self.get_item(&left_id)?;
            if left.id.client != item.id.client || left.id.clock + left.len != item.id.clock {
                break;
            }
            p = left_id;
            if left.is_visible() {
                pindex -= left.len;
            }
        }

        let markers = self.branches.get_mut(ptr)?.markers.as_mut()?;
        let marker = match slot {
            Some(s)
                if (markers.markers[s].index.abs_diff(pindex) as u64) * (MAX_SEARCH_MARKERS as u64)
                    < parent_len as u64 =>
            {
                let old = markers.overwrite(s, p, pindex);
                let marker = markers.markers[s];
                self.set_marked(&old, false);
                marker
            }
            _ => {
                let (s, evicted) = markers.mark(p, pindex);
                let marker = markers.markers[s];
                if let Some(old) = evicted {
                    self.set_marked(&old, false);
                }
                marker
            }
        };
        self.set_marked(&p, true);
        return Some(marker);
    }

    /// Shift markers after `len` units were inserted (positive) or removed
    /// (negative) at `index`.
    pub(crate) fn update_marker_changes(&mut self, ptr: &BranchPtr, index: u32, len: i64) {
        let Some(mut markers) = self.branches.get_mut(ptr).and_then(|b| b.markers.take()) else {
            return;
        };
        let mut i = markers.markers.len();
        while i > 0 {
            i -= 1;
            let mut marker = markers.markers[i];
            if len > 0 {
                self.set_marked(&marker.item, false);
                let mut p = Some(marker.item);
                // Move to the previous visible item
                while let Some(id) = p {
                    let Some(item) = self.get_item(&id) else {
                        p = None;
                        break;
                    };
                    if item.is_visible() {
                        break;
                    }
                    p = item.left;
                    if let Some(left) = p.and_then(|left| self.get_item(&left)) {
                        if left.is_visible() {
                            marker.index = marker.index.saturating_sub(left.len);
                        }
                    }
                }
                let already_marked = p
                    .and_then(|id| self.get_item(&id))
                    .map(|item| item.is_marked())
                    .unwrap_or(true);
                if already_marked {
                    markers.markers.remove(i);
                    continue;
                }
                if let Some(id) = p {
                    marker.item = id;
                    self.set_marked(&id, true);
                }
            }
            if index < marker.index || (len > 0 && index == marker.index) {
                marker.index = (index as i64).max(marker.index as i64 + len) as u32;
            }
            markers.markers[i] = marker;
        }
        if let Some(branch) = self.branches.get_mut(ptr) {
            branch.markers = Some(markers);
        }
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Write every block the holder of `sv` has not seen, highest client
    /// first. Each client group is `client, start clock, count, blocks`.
    pub(crate) fn encode_blocks<E: Encoder>(&self, sv: &StateVector, encoder: &mut E) {
        let mut clients: Vec<(ClientId, u32)> = Vec::new();
        for (client, blocks) in self.blocks.iter() {
            let Some(last) = blocks.last() else {
                continue;
            };
            let known = sv.get(client);
            if last.end() > known {
                clients.push((*client, known));
            }
        }
        clients.sort_by(|a, b| b.0.cmp(&a.0));
        encoder.write_var(clients.len() as u32);
        for (client, known) in clients {
            let blocks = &self.blocks[&client];
            let clock = known.max(blocks[0].id().clock);
            let Some(start) = Store::find_index(blocks, clock) else {
                continue;
            };
            encoder.write_client(client);
            encoder.write_var(clock);
            encoder.write_var((blocks.len() - start) as u32);
            let first = &blocks[start];
            first.encode(encoder, clock - first.id().clock, 0);
            for block in &blocks[start + 1..] {
                block.encode(encoder, 0, 0);
            }
        }
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    /// Check list links and cached lengths of every branch. Meant for tests.
    #[doc(hidden)]
    pub fn check_integrity(&self) -> Result<(), String> {
        for (client, blocks) in self.blocks.iter() {
            let mut clock = 0;
            for block in blocks {
                if block.id().client != *client || block.id().clock != clock {
                    return Err(format!("gap before {} in client {}", block.id(), client));
                }
                clock = block.end();
            }
        }
        for (ptr, branch) in self.branches.iter() {
            let mut len = 0;
            let mut prev: Option<ID> = None;
            let mut next = branch.start;
            while let Some(id) = next {
                let item = self
                    .get_item(&id)
                    .ok_or_else(|| format!("{ptr:?}: dangling link {id}"))?;
                if item.id != id {
                    return Err(format!("{ptr:?}: link {id} is not a block start"));
                }
                if item.left != prev {
                    return Err(format!("{ptr:?}: {id} has left {:?}, expected {prev:?}", item.left));
                }
                if item.parent_sub.is_none() && item.is_visible() {
                    len += item.len;
                }
                prev = Some(id);
                next = item.right;
            }
            if len != branch.block_len {
                return Err(format!("{ptr:?}: cached length {} but {} visible", branch.block_len, len));
            }
        }
        return Ok(());
    }
}
