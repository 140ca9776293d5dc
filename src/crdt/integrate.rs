// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Item integration: placing a new item among concurrent siblings.
//!
//! An item remembers the neighbours it saw when it was created (`origin`
//! and `right_origin`). Concurrent writers may since have inserted other
//! items between those two. Integration scans that conflict window from
//! left to right and decides, for every item `o` in it, whether the new
//! item goes before or after `o`:
//!
//! 1. `o` has the same origin: the lower client id goes left. Equal right
//!    origins too means the new item belongs exactly here.
//! 2. `o`'s origin lies inside the part of the window already scanned: `o`
//!    was inserted relative to something the new item also saw, so it
//!    stays left unless its origin is itself still conflicting.
//! 3. Otherwise the window ends.
//!
//! Rule 1 is always checked before rule 2. Every replica applies the same
//! rules to the same origins and therefore ends up with the same order.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use super::block::Block;
use super::block::Item;
use super::block::TypePtr;
use super::branch::Branch;
use super::branch::BranchPtr;
use super::branch::TypeRef;
use super::content::ItemContent;
use super::primitives::BlockRange;
use super::primitives::ClientId;
use super::primitives::ID;
use super::store::Store;
use crate::doc::Doc;
use crate::transaction::Transaction;

impl Transaction<'_> {
    // =========================================================================
    // Clean splits
    // =========================================================================

    /// Make sure a block starts exactly at `id`. Returns the id of the block
    /// containing `id` afterwards (GC blocks are never split).
    pub(crate) fn clean_start(&mut self, id: &ID) -> Option<ID> {
        let store = &mut self.doc.store;
        let index = store.locate(id)?;
        let block = &store.blocks[&id.client][index];
        let start = block.id();
        if start.clock < id.clock && !block.is_gc() {
            let right = store.split_block(id.client, index, id.clock - start.clock)?;
            self.state.merge_blocks.push(right);
            return Some(right);
        }
        return Some(start);
    }

    /// Make sure a block ends exactly at `id`. Returns the start of the
    /// block containing `id` afterwards.
    pub(crate) fn clean_end(&mut self, id: &ID) -> Option<ID> {
        let store = &mut self.doc.store;
        let index = store.locate(id)?;
        let block = &store.blocks[&id.client][index];
        let start = block.id();
        if id.clock != block.end() - 1 && !block.is_gc() {
            if let Some(right) = store.split_block(id.client, index, id.clock - start.clock + 1) {
                self.state.merge_blocks.push(right);
            }
        }
        return Some(start);
    }

    /// Split blocks so that `[clock, clock + len)` of `client` is covered
    /// exactly, and return the starts of the covering blocks.
    pub(crate) fn iterate_blocks(&mut self, client: ClientId, clock: u32, len: u32) -> Vec<ID> {
        let mut ids = Vec::new();
        if len == 0 {
            return ids;
        }
        let end = clock + len;
        if self.clean_start(&ID::new(client, clock)).is_none() {
            return ids;
        }
        if end < self.doc.store.get_state(&client) {
            self.clean_start(&ID::new(client, end));
        }
        let Some(blocks) = self.doc.store.blocks.get(&client) else {
            return ids;
        };
        let Some(mut index) = Store::find_index(blocks, clock) else {
            return ids;
        };
        while index < blocks.len() && blocks[index].id().clock < end {
            ids.push(blocks[index].id());
            index += 1;
        }
        return ids;
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    /// Return a client whose blocks this item depends on and which have not
    /// arrived yet. When nothing is missing, resolve the item's neighbours
    /// and parent against the store.
    pub(crate) fn missing(&mut self, item: &mut Item) -> Option<ClientId> {
        let store = &self.doc.store;
        let own = item.id.client;
        if let Some(origin) = item.origin {
            if origin.client != own && origin.clock >= store.get_state(&origin.client) {
                return Some(origin.client);
            }
        }
        if let Some(right_origin) = item.right_origin {
            if right_origin.client != own && right_origin.clock >= store.get_state(&right_origin.client) {
                return Some(right_origin.client);
            }
        }
        if let TypePtr::Id(parent) = &item.parent {
            if parent.client != own && parent.clock >= store.get_state(&parent.client) {
                return Some(parent.client);
            }
        }

        let mut dangling = false;
        if let Some(origin) = item.origin {
            match self.clean_end(&origin) {
                Some(left) => {
                    item.left = Some(left);
                    item.origin = self.doc.store.get_block(&left).map(|block| block.last_id());
                }
                None => dangling = true,
            }
        }
        if let Some(right_origin) = item.right_origin {
            match self.clean_start(&right_origin) {
                Some(right) => {
                    item.right = Some(right);
                    item.right_origin = Some(right);
                }
                None => dangling = true,
            }
        }

        let store = &mut self.doc.store;
        let left = item.left.and_then(|id| store.get_block(&id));
        let right = item.right.and_then(|id| store.get_block(&id));
        let touches_gc = left.is_some_and(|b| b.is_gc()) || right.is_some_and(|b| b.is_gc());
        let parent = std::mem::replace(&mut item.parent, TypePtr::Unknown);
        item.parent = if dangling || touches_gc {
            TypePtr::Unknown
        } else {
            match parent {
                TypePtr::Unknown => {
                    let neighbour = left.and_then(|b| b.as_item()).or_else(|| right.and_then(|b| b.as_item()));
                    match neighbour {
                        Some(neighbour) => {
                            item.parent_sub = neighbour.parent_sub.clone();
                            neighbour.parent.clone()
                        }
                        None => TypePtr::Unknown,
                    }
                }
                TypePtr::Id(id) => match store.get_item(&id) {
                    Some(holder) if holder.id == id && matches!(holder.content, ItemContent::Type(_)) => {
                        TypePtr::Branch(BranchPtr::Nested(id))
                    }
                    _ => TypePtr::Unknown,
                },
                TypePtr::Named(name) => TypePtr::Branch(store.get_or_create_root(&name, TypeRef::Undefined)),
                resolved @ TypePtr::Branch(_) => resolved,
            }
        };
        return None;
    }

    // =========================================================================
    // Integration
    // =========================================================================

    /// Link a new item into its parent and append it to the store. `offset`
    /// units at the front are already known and get cut off first.
    pub(crate) fn integrate_item(&mut self, mut item: Item, offset: u32) {
        if offset > 0 {
            item.id.clock += offset;
            item.left = self.clean_end(&ID::new(item.id.client, item.id.clock - 1));
            item.origin = item
                .left
                .and_then(|id| self.doc.store.get_block(&id))
                .map(|block| block.last_id());
            let content = item.content.splice(offset);
            item.content = content;
            item.len -= offset;
        }

        let parent = match item.parent_branch() {
            Some(ptr) if self.doc.store.branches.contains_key(ptr) => ptr.clone(),
            _ => {
                trace!(id = %item.id, len = item.len, "parent unreachable, storing as gc");
                self.doc.store.push_block(Block::GC(BlockRange::new(item.id, item.len)));
                return;
            }
        };
        if item.left.is_some_and(|id| self.doc.store.get_item(&id).is_none()) {
            item.left = None;
        }
        if item.right.is_some_and(|id| self.doc.store.get_item(&id).is_none()) {
            item.right = None;
        }

        let store = &mut self.doc.store;
        let needs_scan = match item.left {
            None => match item.right {
                None => true,
                Some(right) => store.get_item(&right).is_some_and(|r| r.left.is_some()),
            },
            Some(left) => store.get_item(&left).map(|l| l.right) != Some(item.right),
        };
        if needs_scan {
            let mut left = item.left;
            let mut o = match left {
                Some(left) => store.get_item(&left).and_then(|l| l.right),
                None => match &item.parent_sub {
                    Some(sub) => leftmost_in_slot(store, &parent, sub),
                    None => store.branch(&parent).and_then(|b| b.start),
                },
            };
            let mut conflicting: FxHashSet<ID> = FxHashSet::default();
            let mut before_origin: FxHashSet<ID> = FxHashSet::default();
            while let Some(o_id) = o {
                if Some(o_id) == item.right {
                    break;
                }
                let Some(other) = store.get_item(&o_id) else {
                    break;
                };
                before_origin.insert(o_id);
                conflicting.insert(o_id);
                if item.origin == other.origin {
                    if other.id.client < item.id.client {
                        left = Some(o_id);
                        conflicting.clear();
                    } else if item.right_origin == other.right_origin {
                        break;
                    }
                } else {
                    let origin_start = other.origin.and_then(|origin| store.get_block(&origin)).map(|b| b.id());
                    match origin_start {
                        Some(start) if before_origin.contains(&start) => {
                            if !conflicting.contains(&start) {
                                left = Some(o_id);
                                conflicting.clear();
                            }
                        }
                        _ => break,
                    }
                }
                o = other.right;
            }
            item.left = left;
        }

        // Relink
        if let Some(left) = item.left {
            if let Some(left_item) = store.get_item_mut(&left) {
                item.right = left_item.right;
                left_item.right = Some(item.id);
            }
        } else {
            item.right = match &item.parent_sub {
                Some(sub) => leftmost_in_slot(store, &parent, sub),
                None => match store.branch_mut(&parent) {
                    Some(branch) => branch.start.replace(item.id),
                    None => None,
                },
            };
        }
        let mut replaced = None;
        if let Some(right) = item.right {
            if let Some(right_item) = store.get_item_mut(&right) {
                right_item.left = Some(item.id);
            }
        } else if let Some(sub) = &item.parent_sub {
            if let Some(branch) = store.branch_mut(&parent) {
                branch.map.insert(sub.clone(), item.id);
            }
            replaced = item.left;
        }
        if let Some(previous) = replaced {
            self.delete_item(&previous);
        }

        let store = &mut self.doc.store;
        if item.parent_sub.is_none() && item.is_visible() {
            if let Some(branch) = store.branch_mut(&parent) {
                branch.block_len += item.len;
            }
        }
        let id = item.id;
        let parent_sub = item.parent_sub.clone();
        let superseded = parent_sub.is_some() && item.right.is_some();
        trace!(id = %id, len = item.len, parent = ?parent, "integrate");
        store.push_block(Block::Item(Box::new(item)));
        self.integrate_content(&id, &parent);
        self.add_changed_type(&parent, parent_sub);
        if self.doc.store.is_branch_deleted(&parent) || superseded {
            self.delete_item(&id);
        }
    }

    /// Side effects of content once its item is in the store.
    fn integrate_content(&mut self, id: &ID, parent: &BranchPtr) {
        let store = &mut self.doc.store;
        let Some(item) = store.get_item_mut(id) else {
            return;
        };
        match &item.content {
            ItemContent::Deleted(len) => {
                let len = *len;
                item.mark_deleted();
                self.state.delete_set.insert(*id, len);
            }
            ItemContent::Type(type_ref) => {
                let branch = Branch::nested(*id, type_ref.clone());
                store.branches.insert(BranchPtr::Nested(*id), branch);
            }
            ItemContent::Format { .. } => {
                if let Some(branch) = store.branch_mut(parent) {
                    branch.markers = None;
                    branch.has_formatting = true;
                }
            }
            ItemContent::Doc { guid, opts } => {
                let guid = guid.clone();
                if !self.doc.subdocs.contains_key(&guid) {
                    let subdoc = Doc::from_content_opts(guid.clone(), opts);
                    self.doc.subdocs.insert(guid.clone(), subdoc);
                }
                if self.doc.subdocs.get(&guid).is_some_and(|subdoc| subdoc.should_load()) {
                    self.state.subdocs_loaded.insert(guid.clone());
                }
                self.state.subdocs_added.insert(guid);
            }
            _ => {}
        }
    }

    /// Record that `ptr` changed (at `key`, or in its list for `None`).
    /// Types created in this transaction are not reported.
    pub(crate) fn add_changed_type(&mut self, ptr: &BranchPtr, key: Option<Arc<str>>) {
        let report = match ptr {
            BranchPtr::Root(_) => true,
            BranchPtr::Nested(id) => self.doc.store.get_item(id).is_some_and(|item| {
                item.id.clock < self.state.before_state.get(&item.id.client) && !item.is_deleted()
            }),
        };
        if report {
            self.state.changed.entry(ptr.clone()).or_default().insert(key);
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete the whole block starting at `id`. Returns false if it was
    /// already deleted.
    pub(crate) fn delete_item(&mut self, id: &ID) -> bool {
        let store = &mut self.doc.store;
        let Some(item) = store.get_item_mut(id) else {
            return false;
        };
        if item.is_deleted() {
            return false;
        }
        item.mark_deleted();
        let start = item.id;
        let len = item.len;
        let countable = item.is_countable();
        let parent = item.parent_branch().cloned();
        let parent_sub = item.parent_sub.clone();
        let guid = match &item.content {
            ItemContent::Doc { guid, .. } => Some(guid.clone()),
            _ => None,
        };
        let is_type = matches!(item.content, ItemContent::Type(_));

        if let Some(ptr) = &parent {
            if countable && parent_sub.is_none() {
                if let Some(branch) = store.branch_mut(ptr) {
                    branch.block_len -= len;
                }
            }
        }
        self.state.delete_set.insert(start, len);
        if let Some(ptr) = &parent {
            self.add_changed_type(ptr, parent_sub);
        }

        if is_type {
            let ptr = BranchPtr::Nested(start);
            let mut children = self.doc.store.list_items(&ptr);
            if let Some(branch) = self.doc.store.branch(&ptr) {
                children.extend(branch.map.values().copied());
            }
            for child in children {
                let Some(child_item) = self.doc.store.get_item(&child) else {
                    continue;
                };
                if !child_item.is_deleted() {
                    self.delete_item(&child);
                } else if child.clock < self.state.before_state.get(&child.client) {
                    self.state.merge_blocks.push(child);
                }
            }
            self.state.changed.remove(&ptr);
        }
        if let Some(guid) = guid {
            if !self.state.subdocs_added.remove(&guid) {
                self.state.subdocs_removed.insert(guid);
            }
        }
        return true;
    }
}

/// First item of a key slot's history.
fn leftmost_in_slot(store: &Store, parent: &BranchPtr, key: &Arc<str>) -> Option<ID> {
    let mut current = store.branch(parent)?.map.get(key).copied()?;
    while let Some(left) = store.get_item(&current).and_then(|item| item.left) {
        current = left;
    }
    return Some(current);
}
