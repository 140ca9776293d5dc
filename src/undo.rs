// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Undo and redo, scoped to a set of shared types.
//!
//! The manager listens to committed transactions. Every tracked
//! transaction that touched the scope becomes a stack item: the ids it
//! inserted and the ids it deleted. Transactions closer together than the
//! capture timeout share one stack item.
//!
//! Undoing a stack item deletes what it inserted and re-inserts copies of
//! what it deleted. A deleted item points at its copy through `redone`,
//! so later undos and sticky indices can follow it. Deleted items in
//! scope are flagged `keep` so garbage collection leaves their content
//! alone while they can still be redone.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::crdt::block::Item;
use crate::crdt::block::TypePtr;
use crate::crdt::branch::BranchPtr;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::ID;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::event::Subscription;
use crate::transaction::Origin;
use crate::transaction::Transaction;
use crate::transaction::TransactionEvent;
use crate::types::SharedRef;

pub type DeleteFilter = Rc<dyn Fn(&Item) -> bool>;

pub struct UndoOptions {
    /// Changes closer together than this are undone as one.
    pub capture_timeout_millis: u64,
    /// Origins whose transactions are captured. `None` stands for
    /// transactions without an origin.
    pub tracked_origins: FxHashSet<Option<Origin>>,
    /// Items an undo may delete. Everything by default.
    pub delete_filter: Option<DeleteFilter>,
}

impl Default for UndoOptions {
    fn default() -> UndoOptions {
        let mut tracked_origins = FxHashSet::default();
        tracked_origins.insert(None);
        return UndoOptions { capture_timeout_millis: 500, tracked_origins, delete_filter: None };
    }
}

/// One undoable step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackItem {
    insertions: DeleteSet,
    deletions: DeleteSet,
}

impl StackItem {
    pub fn insertions(&self) -> &DeleteSet {
        return &self.insertions;
    }

    pub fn deletions(&self) -> &DeleteSet {
        return &self.deletions;
    }
}

/// State shared with the after-transaction callback.
struct Stacks {
    scope: Vec<BranchPtr>,
    tracked_origins: FxHashSet<Option<Origin>>,
    capture_timeout: Duration,
    undo: Vec<StackItem>,
    redo: Vec<StackItem>,
    undoing: bool,
    redoing: bool,
    last_change: Option<Instant>,
}

pub struct UndoManager {
    stacks: Rc<RefCell<Stacks>>,
    origin: Origin,
    delete_filter: Option<DeleteFilter>,
    subscription: Subscription,
}

impl UndoManager {
    pub fn new<S: SharedRef>(doc: &mut Doc, scope: &S) -> UndoManager {
        return UndoManager::with_options(doc, scope, UndoOptions::default());
    }

    pub fn with_options<S: SharedRef>(doc: &mut Doc, scope: &S, options: UndoOptions) -> UndoManager {
        let origin = Origin::from(format!("undo-{}", uuid::Uuid::new_v4()));
        let mut tracked_origins = options.tracked_origins;
        tracked_origins.insert(Some(origin.clone()));
        let stacks = Rc::new(RefCell::new(Stacks {
            scope: vec![scope.ptr().clone()],
            tracked_origins,
            capture_timeout: Duration::from_millis(options.capture_timeout_millis),
            undo: Vec::new(),
            redo: Vec::new(),
            undoing: false,
            redoing: false,
            last_change: None,
        }));
        let shared = stacks.clone();
        let subscription = doc.observe_after_transaction(move |doc, event| {
            capture(doc, &mut shared.borrow_mut(), event);
        });
        return UndoManager { stacks, origin, delete_filter: options.delete_filter, subscription };
    }

    /// Origin of the transactions this manager runs.
    pub fn origin(&self) -> &Origin {
        return &self.origin;
    }

    pub fn expand_scope<S: SharedRef>(&mut self, scope: &S) {
        let mut stacks = self.stacks.borrow_mut();
        if !stacks.scope.contains(scope.ptr()) {
            stacks.scope.push(scope.ptr().clone());
        }
    }

    pub fn include_origin(&mut self, origin: impl Into<Origin>) {
        self.stacks.borrow_mut().tracked_origins.insert(Some(origin.into()));
    }

    pub fn exclude_origin(&mut self, origin: impl Into<Origin>) {
        self.stacks.borrow_mut().tracked_origins.remove(&Some(origin.into()));
    }

    pub fn can_undo(&self) -> bool {
        return !self.stacks.borrow().undo.is_empty();
    }

    pub fn can_redo(&self) -> bool {
        return !self.stacks.borrow().redo.is_empty();
    }

    pub fn undo_stack(&self) -> Vec<StackItem> {
        return self.stacks.borrow().undo.clone();
    }

    pub fn redo_stack(&self) -> Vec<StackItem> {
        return self.stacks.borrow().redo.clone();
    }

    /// Start a new stack item with the next change.
    pub fn stop_capturing(&mut self) {
        self.stacks.borrow_mut().last_change = None;
    }

    /// Drop both stacks and release the content they protected.
    pub fn clear(&mut self, doc: &mut Doc) {
        let stacks = &mut *self.stacks.borrow_mut();
        let items: Vec<StackItem> = stacks.undo.drain(..).chain(stacks.redo.drain(..)).collect();
        for item in &items {
            release(&mut doc.store, &stacks.scope, &item.deletions);
        }
    }

    /// Revert the latest stack item. Returns false if nothing changed.
    pub fn undo(&mut self, doc: &mut Doc) -> bool {
        self.stacks.borrow_mut().undoing = true;
        let changed = self.pop(doc, false);
        self.stacks.borrow_mut().undoing = false;
        return changed;
    }

    /// Reapply the latest undone stack item. Returns false if nothing
    /// changed.
    pub fn redo(&mut self, doc: &mut Doc) -> bool {
        self.stacks.borrow_mut().redoing = true;
        let changed = self.pop(doc, true);
        self.stacks.borrow_mut().redoing = false;
        return changed;
    }

    /// Stop listening to `doc`.
    pub fn destroy(self, doc: &mut Doc) {
        doc.unobserve(self.subscription);
    }

    fn pop(&mut self, doc: &mut Doc, redo: bool) -> bool {
        loop {
            let (item, scope, blocked) = {
                let mut stacks = self.stacks.borrow_mut();
                let stack = if redo { &mut stacks.redo } else { &mut stacks.undo };
                let Some(item) = stack.pop() else {
                    return false;
                };
                let blocked: Vec<DeleteSet> =
                    stacks.undo.iter().chain(stacks.redo.iter()).map(|s| s.deletions.clone()).collect();
                (item, stacks.scope.clone(), blocked)
            };
            let filter = self.delete_filter.clone();
            let performed = doc.transact_with(self.origin.clone(), |txn| {
                let stepper = Stepper { scope: &scope, item: &item, blocked: &blocked };
                return stepper.apply(txn, filter.as_deref());
            });
            debug!(redo, performed, "popped undo stack item");
            if performed {
                return true;
            }
        }
    }
}

// =============================================================================
// Capturing
// =============================================================================

fn capture(doc: &mut Doc, stacks: &mut Stacks, event: &TransactionEvent) {
    if !stacks.scope.iter().any(|ptr| event.changed_parent_types.contains(ptr)) {
        return;
    }
    if !stacks.tracked_origins.contains(&event.origin) {
        return;
    }
    // Remote transactions are only captured through an explicit origin.
    if !event.local && event.origin.is_none() {
        return;
    }
    let undoing = stacks.undoing;
    let redoing = stacks.redoing;
    if undoing {
        stacks.last_change = None;
    } else if !redoing {
        let cleared: Vec<StackItem> = stacks.redo.drain(..).collect();
        for item in &cleared {
            release(&mut doc.store, &stacks.scope, &item.deletions);
        }
    }

    let mut insertions = DeleteSet::new();
    for (client, after) in event.after_state.iter() {
        let before = event.before_state.get(client);
        if *after > before {
            insertions.insert(ID::new(*client, before), after - before);
        }
    }

    let now = Instant::now();
    let capture_timeout = stacks.capture_timeout;
    let extend = !undoing
        && !redoing
        && stacks.last_change.is_some_and(|last| now.duration_since(last) < capture_timeout);
    let stack = if undoing { &mut stacks.redo } else { &mut stacks.undo };
    match stack.last_mut() {
        Some(last) if extend => {
            last.deletions.merge(event.delete_set.clone());
            last.insertions.merge(insertions);
        }
        _ => stack.push(StackItem { insertions, deletions: event.delete_set.clone() }),
    }
    if !undoing && !redoing {
        stacks.last_change = Some(now);
    }

    let mut protect = Vec::new();
    for_each_block(&doc.store, &event.delete_set, |item| {
        if in_scope(&doc.store, &stacks.scope, item) {
            protect.push(item.id);
        }
    });
    for id in protect {
        keep_item(&mut doc.store, id, true);
    }
}

/// Clear the `keep` flag of deleted items in scope.
fn release(store: &mut Store, scope: &[BranchPtr], deletions: &DeleteSet) {
    let mut ids = Vec::new();
    for_each_block(store, deletions, |item| {
        if in_scope(store, scope, item) {
            ids.push(item.id);
        }
    });
    for id in ids {
        keep_item(store, id, false);
    }
}

/// Visit every item overlapping a run of `ds`.
fn for_each_block<'a>(store: &'a Store, ds: &DeleteSet, mut f: impl FnMut(&'a Item)) {
    for (client, runs) in ds.iter() {
        let Some(blocks) = store.blocks.get(client) else {
            continue;
        };
        for run in runs {
            let Some(mut index) = Store::find_index(blocks, run.clock) else {
                continue;
            };
            while index < blocks.len() && blocks[index].id().clock < run.end() {
                if let Some(item) = blocks[index].as_item() {
                    f(item);
                }
                index += 1;
            }
        }
    }
}

/// Whether `item` lives somewhere below one of the scope's types.
fn in_scope(store: &Store, scope: &[BranchPtr], item: &Item) -> bool {
    let mut parent = item.parent_branch().cloned();
    while let Some(ptr) = parent {
        if scope.contains(&ptr) {
            return true;
        }
        parent = store.parent_of(&ptr);
    }
    return false;
}

/// Set `keep` on an item and on every ancestor item up to the first one
/// that already agrees.
fn keep_item(store: &mut Store, id: ID, keep: bool) {
    let mut current = Some(id);
    while let Some(id) = current {
        let Some(item) = store.get_item_mut(&id) else {
            break;
        };
        if item.is_keep() == keep {
            break;
        }
        item.set_keep(keep);
        current = match item.parent_branch() {
            Some(BranchPtr::Nested(parent)) => Some(*parent),
            _ => None,
        };
    }
}

// =============================================================================
// Reverting
// =============================================================================

/// Applies one stack item inside a transaction.
struct Stepper<'a> {
    scope: &'a [BranchPtr],
    item: &'a StackItem,
    /// Deletions of every stack item still on either stack.
    blocked: &'a [DeleteSet],
}

impl Stepper<'_> {
    fn apply(&self, txn: &mut Transaction<'_>, filter: Option<&dyn Fn(&Item) -> bool>) -> bool {
        let mut to_delete = Vec::new();
        for (client, runs) in self.item.insertions.iter() {
            for run in runs.to_vec() {
                for id in txn.iterate_blocks(*client, run.clock, run.len) {
                    let Some(target) = current_of(txn, id) else {
                        continue;
                    };
                    let store = &txn.doc.store;
                    let Some(item) = store.get_item(&target) else {
                        continue;
                    };
                    if !item.is_deleted() && in_scope(store, self.scope, item) {
                        to_delete.push(target);
                    }
                }
            }
        }

        let mut to_redo = Vec::new();
        for (client, runs) in self.item.deletions.iter() {
            for run in runs.to_vec() {
                for id in txn.iterate_blocks(*client, run.clock, run.len) {
                    let store = &txn.doc.store;
                    let Some(item) = store.get_item(&id) else {
                        continue;
                    };
                    // Created and deleted within the same step: nothing to bring back.
                    if in_scope(store, self.scope, item) && !self.item.insertions.is_deleted(&id) {
                        to_redo.push(id);
                    }
                }
            }
        }

        let redo_set: FxHashSet<ID> = to_redo.iter().copied().collect();
        let mut performed = false;
        for id in &to_redo {
            performed |= self.redo_item(txn, *id, &redo_set).is_some();
        }
        for id in to_delete.iter().rev() {
            let allowed = match (filter, txn.doc.store.get_item(id)) {
                (Some(filter), Some(item)) => filter(item),
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if allowed && txn.delete_item(id) {
                performed = true;
            }
        }

        let changed: Vec<BranchPtr> = txn.state.changed.keys().cloned().collect();
        for ptr in changed {
            if let Some(markers) = txn.doc.store.branch_mut(&ptr).and_then(|b| b.markers.as_mut()) {
                markers.clear();
            }
        }
        return performed;
    }

    /// Insert a copy of the deleted item `id` where it used to be. Returns
    /// the id of the copy, or `None` if it cannot be brought back.
    fn redo_item(&self, txn: &mut Transaction<'_>, id: ID, redo_set: &FxHashSet<ID>) -> Option<ID> {
        let item = txn.doc.store.get_item(&id)?;
        if let Some(redone) = item.redone {
            return txn.clean_start(&redone);
        }
        let mut parent = item.parent_branch()?.clone();

        if let BranchPtr::Nested(parent_id) = parent {
            let parent_item = txn.doc.store.get_item(&parent_id)?;
            if parent_item.is_deleted() {
                if parent_item.redone.is_none()
                    && (!redo_set.contains(&parent_id) || self.redo_item(txn, parent_id, redo_set).is_none())
                {
                    return None;
                }
                let mut current = parent_id;
                while let Some(next) = txn.doc.store.get_item(&current).and_then(|i| i.redone) {
                    current = txn.clean_start(&next)?;
                }
                parent = BranchPtr::Nested(current);
            }
        }

        let item = txn.doc.store.get_item(&id)?;
        let parent_sub = item.parent_sub.clone();
        let content = item.content.clone();
        let item_left = item.left;
        let item_right = item.right;
        let (left, right) = match &parent_sub {
            None => {
                let mut left = None;
                let mut cursor = item_left;
                while let Some(candidate) = cursor {
                    if let Some(found) = trace_into(txn, candidate, &parent) {
                        left = Some(found);
                        break;
                    }
                    cursor = txn.doc.store.get_item(&candidate).and_then(|i| i.left);
                }
                let mut right = None;
                let mut cursor = Some(id);
                while let Some(candidate) = cursor {
                    if let Some(found) = trace_into(txn, candidate, &parent) {
                        right = Some(found);
                        break;
                    }
                    cursor = txn.doc.store.get_item(&candidate).and_then(|i| i.right);
                }
                (left, right)
            }
            Some(key) => {
                if item_right.is_none() {
                    let left = txn.doc.store.branch(&parent).and_then(|b| b.map.get(key).copied());
                    (left, None)
                } else {
                    let mut left = id;
                    loop {
                        let Some(next) = txn.doc.store.get_item(&left).and_then(|i| i.right) else {
                            break;
                        };
                        let Some(next_item) = txn.doc.store.get_item(&next) else {
                            break;
                        };
                        let superseded = next_item.redone.is_some()
                            || self.item.insertions.is_deleted(&next)
                            || self.blocked.iter().any(|ds| ds.is_deleted(&next));
                        if !superseded {
                            break;
                        }
                        left = next;
                        while let Some(redone) = txn.doc.store.get_item(&left).and_then(|i| i.redone) {
                            left = txn.clean_start(&redone)?;
                        }
                    }
                    // Someone else wrote this key since: their value wins.
                    if txn.doc.store.get_item(&left).and_then(|i| i.right).is_some() {
                        return None;
                    }
                    (Some(left), None)
                }
            }
        };

        let next_id = txn.next_id();
        let origin = left.and_then(|l| txn.doc.store.get_block(&l)).map(|b| b.last_id());
        let copy = Item::new(next_id, left, origin, right, right, TypePtr::Branch(parent), parent_sub, content);
        if let Some(original) = txn.doc.store.get_item_mut(&id) {
            original.redone = Some(next_id);
        }
        txn.integrate_item(copy, 0);
        keep_item(&mut txn.doc.store, next_id, true);
        return Some(next_id);
    }
}

/// Follow `redone` from the block at `id` to the block that now carries
/// its content.
fn current_of(txn: &mut Transaction<'_>, id: ID) -> Option<ID> {
    let redone = txn.doc.store.get_item(&id)?.redone;
    if redone.is_none() {
        return Some(id);
    }
    let (start, diff) = txn.doc.store.follow_redone(&id)?;
    if diff > 0 {
        return txn.clean_start(&start.offset(diff));
    }
    return Some(start);
}

/// Follow `redone` links from `id` until reaching an item inside `parent`.
fn trace_into(txn: &mut Transaction<'_>, id: ID, parent: &BranchPtr) -> Option<ID> {
    let mut current = id;
    loop {
        let item = txn.doc.store.get_item(&current)?;
        if item.parent_branch() == Some(parent) {
            return Some(current);
        }
        let redone = item.redone?;
        current = txn.clean_start(&redone)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::StateVector;
    use crate::encoding::any::Any;
    use crate::types::In;
    use crate::types::Out;

    fn options(timeout: u64) -> UndoOptions {
        return UndoOptions { capture_timeout_millis: timeout, ..UndoOptions::default() };
    }

    #[test]
    fn undo_and_redo_text() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut undo = UndoManager::with_options(&mut doc, &text, options(0));
        doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
        doc.transact(|txn| text.insert(txn, 3, "def").unwrap());
        assert_eq!(text.get_string(&doc), "abcdef");

        assert!(undo.undo(&mut doc));
        assert_eq!(text.get_string(&doc), "abc");
        assert!(undo.undo(&mut doc));
        assert_eq!(text.get_string(&doc), "");
        assert!(!undo.undo(&mut doc));

        assert!(undo.redo(&mut doc));
        assert_eq!(text.get_string(&doc), "abc");
        assert!(undo.redo(&mut doc));
        assert_eq!(text.get_string(&doc), "abcdef");
        assert!(!undo.can_redo());
    }

    #[test]
    fn quick_changes_are_grouped() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut undo = UndoManager::with_options(&mut doc, &text, options(60_000));
        doc.transact(|txn| text.insert(txn, 0, "a").unwrap());
        doc.transact(|txn| text.insert(txn, 1, "b").unwrap());
        undo.stop_capturing();
        doc.transact(|txn| text.insert(txn, 2, "c").unwrap());
        assert_eq!(undo.undo_stack().len(), 2);
        undo.undo(&mut doc);
        assert_eq!(text.get_string(&doc), "ab");
        undo.undo(&mut doc);
        assert_eq!(text.get_string(&doc), "");
    }

    #[test]
    fn undo_restores_deleted_text() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut undo = UndoManager::with_options(&mut doc, &text, options(0));
        doc.transact(|txn| text.insert(txn, 0, "hello").unwrap());
        doc.transact(|txn| text.remove_range(txn, 1, 2).unwrap());
        assert_eq!(text.get_string(&doc), "hlo");
        undo.undo(&mut doc);
        assert_eq!(text.get_string(&doc), "hello");
        undo.redo(&mut doc);
        assert_eq!(text.get_string(&doc), "hlo");
        undo.undo(&mut doc);
        assert_eq!(text.get_string(&doc), "hello");
    }

    #[test]
    fn kept_content_survives_gc() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let _undo = UndoManager::with_options(&mut doc, &text, options(0));
        doc.transact(|txn| text.insert(txn, 0, "xyz").unwrap());
        doc.transact(|txn| text.remove_range(txn, 0, 3).unwrap());
        let item = doc.store.get_item(&ID::new(1, 0)).unwrap();
        assert!(item.is_deleted());
        assert!(item.is_keep());
        assert_eq!(item.content, crate::crdt::content::ItemContent::String("xyz".into()));
    }

    #[test]
    fn untracked_origins_are_ignored() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mut undo = UndoManager::with_options(&mut doc, &array, options(0));
        doc.transact_with("sync", |txn| array.push_back(txn, 1).unwrap());
        assert!(!undo.can_undo());
        undo.include_origin("sync");
        doc.transact_with("sync", |txn| array.push_back(txn, 2).unwrap());
        assert!(undo.can_undo());
        undo.undo(&mut doc);
        assert_eq!(array.to_json(&doc), Any::from(vec![Any::from(1)]));
    }

    #[test]
    fn changes_outside_scope_are_ignored() {
        let mut doc = Doc::with_client_id(1);
        let tracked = doc.get_or_insert_array("a");
        let other = doc.get_or_insert_array("b");
        let undo = UndoManager::with_options(&mut doc, &tracked, options(0));
        doc.transact(|txn| other.push_back(txn, 1).unwrap());
        assert!(!undo.can_undo());
    }

    #[test]
    fn remote_changes_are_kept_on_undo() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut undo = UndoManager::with_options(&mut doc, &text, options(0));
        doc.transact(|txn| text.insert(txn, 0, "mine").unwrap());

        let mut peer = Doc::with_client_id(2);
        peer.apply_update_v1(&doc.encode_state_as_update_v1(&StateVector::new())).unwrap();
        let remote = peer.get_or_insert_text("t");
        let before = peer.state_vector();
        peer.transact(|txn| remote.insert(txn, 4, "+theirs").unwrap());
        let update = crate::update::Update::decode_v1(&peer.encode_state_as_update_v1(&before)).unwrap();
        doc.apply_update(update, Some(Origin::from("peer")));

        undo.undo(&mut doc);
        assert_eq!(text.get_string(&doc), "+theirs");
    }

    #[test]
    fn map_values_come_back() {
        let mut doc = Doc::with_client_id(1);
        let map = doc.get_or_insert_map("m");
        let mut undo = UndoManager::with_options(&mut doc, &map, options(0));
        doc.transact(|txn| map.insert(txn, "k", "first"));
        doc.transact(|txn| map.insert(txn, "k", "second"));
        undo.undo(&mut doc);
        assert_eq!(map.get(&doc, "k"), Some(Out::Any("first".into())));
        undo.undo(&mut doc);
        assert_eq!(map.get(&doc, "k"), None);
        undo.redo(&mut doc);
        undo.redo(&mut doc);
        assert_eq!(map.get(&doc, "k"), Some(Out::Any("second".into())));
    }

    #[test]
    fn nested_types_are_recreated() {
        let mut doc = Doc::with_client_id(1);
        let root = doc.get_or_insert_array("a");
        let mut undo = UndoManager::with_options(&mut doc, &root, options(0));
        doc.transact(|txn| root.push_back(txn, In::Array(vec![In::from(1), In::from(2)])).unwrap());
        doc.transact(|txn| root.remove(txn, 0).unwrap());
        assert_eq!(root.len(&doc), 0);
        undo.undo(&mut doc);
        let Some(Out::Array(nested)) = root.get(&doc, 0) else {
            panic!("expected the nested array back");
        };
        assert_eq!(nested.len(&doc), 2);
    }

    #[test]
    fn delete_filter_can_veto() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let filter: DeleteFilter = Rc::new(|_| false);
        let opts = UndoOptions { delete_filter: Some(filter), ..options(0) };
        let mut undo = UndoManager::with_options(&mut doc, &text, opts);
        doc.transact(|txn| text.insert(txn, 0, "stay").unwrap());
        assert!(!undo.undo(&mut doc));
        assert_eq!(text.get_string(&doc), "stay");
    }

    #[test]
    fn clear_releases_content() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut undo = UndoManager::with_options(&mut doc, &text, options(0));
        doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
        doc.transact(|txn| text.remove_range(txn, 0, 3).unwrap());
        undo.clear(&mut doc);
        assert!(!undo.can_undo());
        assert!(!doc.store.get_item(&ID::new(1, 0)).unwrap().is_keep());
        undo.destroy(&mut doc);
    }
}
