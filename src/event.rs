// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Change events and subscriber lists.
//!
//! Each shared type can be observed shallowly (its own [`Event`]) or deeply
//! (events of itself and every nested type, each carrying the path from
//! the observed type). Documents expose a fixed set of lifecycle events,
//! each with its own typed subscriber list.
//!
//! Events are computed eagerly during cleanup, before garbage collection
//! discards deleted content, so callbacks can always read old values.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::crdt::block::Item;
use crate::crdt::branch::Branch;
use crate::crdt::branch::BranchPtr;
use crate::crdt::branch::TypeRef;
use crate::crdt::content::ItemContent;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::encoding::any::Any;
use crate::transaction::Origin;
use crate::transaction::TransactionState;
use crate::types::Attrs;
use crate::types::Out;

// =============================================================================
// Subscriptions
// =============================================================================

/// Handle returned by every `observe*` call, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(pub(crate) u32);

pub(crate) type Callback<E> = Box<dyn FnMut(&mut Doc, &E)>;

/// Subscribers of one event kind, in registration order.
pub(crate) struct Observer<E: ?Sized> {
    pub(crate) callbacks: Vec<(Subscription, Callback<E>)>,
    /// Subscriptions removed while their list was being dispatched.
    pub(crate) removed: FxHashSet<Subscription>,
}

impl<E: ?Sized> Default for Observer<E> {
    fn default() -> Self {
        return Observer { callbacks: Vec::new(), removed: FxHashSet::default() };
    }
}

impl<E: ?Sized> Observer<E> {
    pub(crate) fn is_empty(&self) -> bool {
        return self.callbacks.is_empty();
    }

    pub(crate) fn subscribe(&mut self, id: Subscription, callback: Callback<E>) {
        self.callbacks.push((id, callback));
    }

    pub(crate) fn unsubscribe(&mut self, id: Subscription) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(sub, _)| *sub != id);
        self.removed.insert(id);
        return self.callbacks.len() != before;
    }

    /// Move the callbacks out for dispatch.
    pub(crate) fn take(&mut self) -> Vec<(Subscription, Callback<E>)> {
        self.removed.clear();
        return std::mem::take(&mut self.callbacks);
    }

    /// Put dispatched callbacks back, dropping those unsubscribed in the
    /// meantime and keeping those subscribed in the meantime.
    pub(crate) fn restore(&mut self, mut taken: Vec<(Subscription, Callback<E>)>) {
        let removed = std::mem::take(&mut self.removed);
        taken.retain(|(sub, _)| !removed.contains(sub));
        taken.append(&mut self.callbacks);
        self.callbacks = taken;
    }
}

/// Shallow and deep subscribers of one shared type.
#[derive(Default)]
pub(crate) struct TypeObservers {
    pub(crate) shallow: Observer<Event>,
    pub(crate) deep: Observer<[Event]>,
}

/// Document lifecycle subscribers.
#[derive(Default)]
pub(crate) struct DocEvents {
    pub(crate) update_v1: Observer<UpdateEvent>,
    pub(crate) update_v2: Observer<UpdateEvent>,
    pub(crate) before_transaction: Observer<crate::transaction::TransactionEvent>,
    pub(crate) after_transaction: Observer<crate::transaction::TransactionEvent>,
    pub(crate) after_transaction_cleanup: Observer<crate::transaction::TransactionEvent>,
    pub(crate) before_all_transactions: Observer<()>,
    pub(crate) after_all_transactions: Observer<()>,
    pub(crate) subdocs: Observer<SubdocsEvent>,
    pub(crate) destroy: Observer<()>,
}

impl DocEvents {
    pub(crate) fn unsubscribe(&mut self, id: Subscription) -> bool {
        return self.update_v1.unsubscribe(id)
            | self.update_v2.unsubscribe(id)
            | self.before_transaction.unsubscribe(id)
            | self.after_transaction.unsubscribe(id)
            | self.after_transaction_cleanup.unsubscribe(id)
            | self.before_all_transactions.unsubscribe(id)
            | self.after_all_transactions.unsubscribe(id)
            | self.subdocs.unsubscribe(id)
            | self.destroy.unsubscribe(id);
    }
}

// =============================================================================
// Document events
// =============================================================================

/// An encoded update produced by a committed transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateEvent {
    pub update: Vec<u8>,
    pub origin: Option<Origin>,
}

/// Sub-documents added, removed or loaded by a transaction, by guid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubdocsEvent {
    pub added: Vec<Arc<str>>,
    pub removed: Vec<Arc<str>>,
    pub loaded: Vec<Arc<str>>,
}

// =============================================================================
// Type events
// =============================================================================

/// One step from an observed type towards a nested type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(Arc<str>),
    Index(u32),
}

/// One operation of a sequence change, in document order.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    Inserted(Vec<Out>, Option<Box<Attrs>>),
    Deleted(u32),
    Retain(u32, Option<Box<Attrs>>),
}

/// Change of a single key.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryChange {
    Inserted(Out),
    /// Old value, new value.
    Updated(Out, Out),
    Removed(Out),
}

/// What changed in one shared type during one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub(crate) target: BranchPtr,
    pub(crate) kind: TypeRef,
    pub(crate) path: Vec<PathSegment>,
    pub(crate) delta: Vec<Delta>,
    pub(crate) keys: BTreeMap<Arc<str>, EntryChange>,
}

impl Event {
    /// The type that changed.
    pub fn target(&self) -> &BranchPtr {
        return &self.target;
    }

    pub fn kind(&self) -> &TypeRef {
        return &self.kind;
    }

    /// Path from the observed type to the target. Empty for shallow events.
    pub fn path(&self) -> &[PathSegment] {
        return &self.path;
    }

    /// Changes to the child list (or text).
    pub fn delta(&self) -> &[Delta] {
        return &self.delta;
    }

    /// Changes to keys (map entries or XML attributes).
    pub fn keys(&self) -> &BTreeMap<Arc<str>, EntryChange> {
        return &self.keys;
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Classifies items against a committed transaction.
struct Changes<'a> {
    before: &'a StateVector,
    deleted: &'a DeleteSet,
}

impl Changes<'_> {
    fn adds(&self, item: &Item) -> bool {
        return item.id.clock >= self.before.get(&item.id.client);
    }

    fn deletes(&self, item: &Item) -> bool {
        return self.deleted.is_deleted(&item.id);
    }
}

/// Compute the event of one changed type. The transaction's delete set
/// must be squashed.
pub(crate) fn compute_event(
    store: &Store,
    state: &TransactionState,
    ptr: &BranchPtr,
    keys: &FxHashSet<Option<Arc<str>>>,
) -> Option<Event> {
    let branch = store.branch(ptr)?;
    let changes = Changes { before: &state.before_state, deleted: &state.delete_set };
    let delta = match branch.type_ref() {
        TypeRef::Text | TypeRef::XmlText => text_delta(store, branch, &changes),
        _ if keys.contains(&None) => list_delta(store, branch, &changes),
        _ => Vec::new(),
    };
    let mut key_changes = BTreeMap::new();
    for key in keys.iter().flatten() {
        if let Some(change) = key_change(store, branch, key, &changes) {
            key_changes.insert(key.clone(), change);
        }
    }
    return Some(Event {
        target: ptr.clone(),
        kind: branch.type_ref().clone(),
        path: Vec::new(),
        delta,
        keys: key_changes,
    });
}

fn last_value(item: &Item) -> Out {
    return Out::from_item(item).pop().unwrap_or_default();
}

fn key_change(store: &Store, branch: &Branch, key: &Arc<str>, changes: &Changes<'_>) -> Option<EntryChange> {
    let item = store.get_item(branch.map.get(key)?)?;
    if changes.adds(item) {
        let mut prev = item.left.and_then(|id| store.get_item(&id));
        while let Some(p) = prev {
            if !changes.adds(p) {
                break;
            }
            prev = p.left.and_then(|id| store.get_item(&id));
        }
        let prev_deleted = prev.filter(|p| changes.deletes(p));
        if changes.deletes(item) {
            return prev_deleted.map(|p| EntryChange::Removed(last_value(p)));
        }
        return Some(match prev_deleted {
            Some(p) => EntryChange::Updated(last_value(p), last_value(item)),
            None => EntryChange::Inserted(last_value(item)),
        });
    }
    if changes.deletes(item) {
        return Some(EntryChange::Removed(last_value(item)));
    }
    return None;
}

fn list_delta(store: &Store, branch: &Branch, changes: &Changes<'_>) -> Vec<Delta> {
    let mut delta = Vec::new();
    let mut current: Option<Delta> = None;
    let mut next = branch.start;
    while let Some(id) = next {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        next = item.right;
        if item.is_deleted() {
            if changes.deletes(item) && !changes.adds(item) {
                match &mut current {
                    Some(Delta::Deleted(len)) => *len += item.len,
                    _ => {
                        delta.extend(current.take());
                        current = Some(Delta::Deleted(item.len));
                    }
                }
            }
        } else if !item.is_countable() {
            continue;
        } else if changes.adds(item) {
            let values = Out::from_item(item);
            match &mut current {
                Some(Delta::Inserted(inserted, _)) => inserted.extend(values),
                _ => {
                    delta.extend(current.take());
                    current = Some(Delta::Inserted(values, None));
                }
            }
        } else {
            match &mut current {
                Some(Delta::Retain(len, _)) => *len += item.len,
                _ => {
                    delta.extend(current.take());
                    current = Some(Delta::Retain(item.len, None));
                }
            }
        }
    }
    match current {
        Some(Delta::Retain(..)) | None => {}
        Some(op) => delta.push(op),
    }
    return delta;
}

#[derive(PartialEq)]
enum Action {
    Insert,
    Retain,
    Delete,
}

/// Builds a rich-text delta op by op.
struct TextDeltaBuilder {
    delta: Vec<Delta>,
    action: Option<Action>,
    insert: String,
    insert_value: Option<Out>,
    retain: u32,
    delete: u32,
    current_attrs: Attrs,
    attrs: BTreeMap<Arc<str>, Any>,
}

impl TextDeltaBuilder {
    fn flush(&mut self) {
        let Some(action) = self.action.take() else {
            return;
        };
        match action {
            Action::Delete => {
                if self.delete > 0 {
                    self.delta.push(Delta::Deleted(self.delete));
                }
                self.delete = 0;
            }
            Action::Insert => {
                let value = match self.insert_value.take() {
                    Some(value) => Some(value),
                    None if !self.insert.is_empty() => {
                        Some(Out::Any(Any::from(std::mem::take(&mut self.insert))))
                    }
                    None => None,
                };
                if let Some(value) = value {
                    let attrs: Attrs = self
                        .current_attrs
                        .iter()
                        .filter(|(_, v)| !v.is_null_or_undefined())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let attrs = if attrs.is_empty() { None } else { Some(Box::new(attrs)) };
                    self.delta.push(Delta::Inserted(vec![value], attrs));
                }
                self.insert.clear();
            }
            Action::Retain => {
                if self.retain > 0 {
                    let attrs = if self.attrs.is_empty() { None } else { Some(Box::new(self.attrs.clone())) };
                    self.delta.push(Delta::Retain(self.retain, attrs));
                }
                self.retain = 0;
            }
        }
    }

    fn switch(&mut self, action: Action) {
        if self.action.as_ref() != Some(&action) {
            self.flush();
            self.action = Some(action);
        }
    }
}

fn text_delta(store: &Store, branch: &Branch, changes: &Changes<'_>) -> Vec<Delta> {
    let mut b = TextDeltaBuilder {
        delta: Vec::new(),
        action: None,
        insert: String::new(),
        insert_value: None,
        retain: 0,
        delete: 0,
        current_attrs: Attrs::new(),
        attrs: BTreeMap::new(),
    };
    let mut old_attrs = Attrs::new();
    let mut next = branch.start;
    while let Some(id) = next {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        next = item.right;
        match &item.content {
            ItemContent::Type(_) | ItemContent::Embed(_) => {
                if changes.adds(item) {
                    if !changes.deletes(item) {
                        b.flush();
                        b.action = Some(Action::Insert);
                        b.insert_value = Out::from_item(item).pop();
                        b.flush();
                    }
                } else if changes.deletes(item) {
                    b.switch(Action::Delete);
                    b.delete += 1;
                } else if !item.is_deleted() {
                    b.switch(Action::Retain);
                    b.retain += 1;
                }
            }
            ItemContent::String(s) => {
                if changes.adds(item) {
                    if !changes.deletes(item) {
                        b.switch(Action::Insert);
                        b.insert.push_str(s);
                    }
                } else if changes.deletes(item) {
                    b.switch(Action::Delete);
                    b.delete += item.len;
                } else if !item.is_deleted() {
                    b.switch(Action::Retain);
                    b.retain += item.len;
                }
            }
            ItemContent::Format { key, value } => {
                if changes.adds(item) {
                    if !changes.deletes(item) {
                        let current = b.current_attrs.get(key).cloned().unwrap_or(Any::Null);
                        if current != *value {
                            if b.action == Some(Action::Retain) {
                                b.flush();
                            }
                            let old = old_attrs.get(key).cloned().unwrap_or(Any::Null);
                            if *value == old {
                                b.attrs.remove(key);
                            } else {
                                b.attrs.insert(key.clone(), value.clone());
                            }
                        }
                    }
                } else if changes.deletes(item) {
                    old_attrs.insert(key.clone(), value.clone());
                    let current = b.current_attrs.get(key).cloned().unwrap_or(Any::Null);
                    if current != *value {
                        if b.action == Some(Action::Retain) {
                            b.flush();
                        }
                        b.attrs.insert(key.clone(), current);
                    }
                } else if !item.is_deleted() {
                    old_attrs.insert(key.clone(), value.clone());
                    if let Some(attr) = b.attrs.get(key).cloned() {
                        if attr != *value {
                            if b.action == Some(Action::Retain) {
                                b.flush();
                            }
                            if value.is_null_or_undefined() {
                                b.attrs.remove(key);
                            } else {
                                b.attrs.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
                if !item.is_deleted() {
                    if b.action == Some(Action::Insert) {
                        b.flush();
                    }
                    crate::types::text::update_current_attributes(&mut b.current_attrs, key, value);
                }
            }
            _ => {}
        }
    }
    b.flush();
    while let Some(Delta::Retain(_, None)) = b.delta.last() {
        b.delta.pop();
    }
    return b.delta;
}

/// Path from `parent` down to `child`: keys for map slots, visible
/// indices for list positions.
pub(crate) fn path_to(store: &Store, parent: &BranchPtr, child: &BranchPtr) -> Vec<PathSegment> {
    let mut path = VecDeque::new();
    let mut current = child.clone();
    while current != *parent {
        let BranchPtr::Nested(id) = &current else {
            break;
        };
        let Some(item) = store.get_item(id) else {
            break;
        };
        let Some(up) = item.parent_branch() else {
            break;
        };
        match &item.parent_sub {
            Some(key) => path.push_front(PathSegment::Key(key.clone())),
            None => {
                let mut index = 0;
                let mut next = store.branch(up).and_then(|b| b.start);
                while let Some(sibling) = next {
                    if sibling == item.id {
                        break;
                    }
                    let Some(sibling) = store.get_item(&sibling) else {
                        break;
                    };
                    if sibling.is_visible() {
                        index += sibling.len;
                    }
                    next = sibling.right;
                }
                path.push_front(PathSegment::Index(index));
            }
        }
        current = up.clone();
    }
    return path.into_iter().collect();
}
