// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared types: typed views over branches.
//!
//! A shared type handle ([`ArrayRef`], [`MapRef`], [`TextRef`] and the XML
//! refs) is just a [`BranchPtr`]. Handles are cheap to clone and stay
//! valid across transactions; they stop resolving once the item holding a
//! nested type is garbage collected.
//!
//! Values go in as [`In`] and come out as [`Out`]. Plain values are packed
//! into `Any` content, so consecutive plain values inserted together share
//! one item. Binary blobs, nested types and sub-documents always get an
//! item of their own.
//!
//! Reads take any [`ReadTxn`] and walk the item list. Writes take a
//! [`Transaction`] and use the branch's search markers.

pub mod array;
pub mod map;
pub mod text;
pub mod xml;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

pub use array::ArrayRef;
pub use map::MapRef;
pub use text::TextRef;
pub use xml::XmlElementPrelim;
pub use xml::XmlElementRef;
pub use xml::XmlFragmentRef;
pub use xml::XmlHookPrelim;
pub use xml::XmlHookRef;
pub use xml::XmlTextPrelim;
pub use xml::XmlTextRef;

use crate::crdt::block::Item;
use crate::crdt::block::TypePtr;
use crate::crdt::branch::BranchPtr;
use crate::crdt::branch::TypeRef;
use crate::crdt::content::ItemContent;
use crate::crdt::primitives::ID;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::encoding::any::Any;
use crate::error::Error;
use crate::error::Result;
use crate::event::Event;
use crate::event::Subscription;
use crate::transaction::ReadTxn;
use crate::transaction::Transaction;

/// Formatting attributes of a text run.
pub type Attrs = BTreeMap<Arc<str>, Any>;

// =============================================================================
// Shared refs
// =============================================================================

/// Behaviour common to every shared type handle.
pub trait SharedRef: Sized {
    fn from_ptr(ptr: BranchPtr) -> Self;

    fn ptr(&self) -> &BranchPtr;

    /// Subscribe to changes of this type alone.
    fn observe<F>(&self, doc: &mut Doc, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &Event) + 'static,
    {
        return doc.observe_type(self.ptr().clone(), f);
    }

    /// Subscribe to changes of this type and everything nested in it.
    fn observe_deep<F>(&self, doc: &mut Doc, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &[Event]) + 'static,
    {
        return doc.observe_type_deep(self.ptr().clone(), f);
    }

    /// Whether the handle still resolves in `txn`'s document.
    fn is_alive<T: ReadTxn>(&self, txn: &T) -> bool {
        return txn.store().branch(self.ptr()).is_some() && !txn.store().is_branch_deleted(self.ptr());
    }
}

macro_rules! shared_ref {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) $crate::crdt::branch::BranchPtr);

        impl $crate::types::SharedRef for $name {
            fn from_ptr(ptr: $crate::crdt::branch::BranchPtr) -> $name {
                return $name(ptr);
            }

            fn ptr(&self) -> &$crate::crdt::branch::BranchPtr {
                return &self.0;
            }
        }
    };
}

pub(crate) use shared_ref;

// =============================================================================
// Values in
// =============================================================================

/// A value to insert into a shared type.
#[derive(Debug)]
pub enum In {
    Any(Any),
    Binary(Vec<u8>),
    Array(Vec<In>),
    Map(BTreeMap<String, In>),
    Text(String),
    XmlElement(XmlElementPrelim),
    XmlText(XmlTextPrelim),
    XmlFragment(Vec<In>),
    XmlHook(XmlHookPrelim),
    Doc(Doc),
}

impl In {
    fn type_ref(&self) -> Option<TypeRef> {
        return match self {
            In::Array(_) => Some(TypeRef::Array),
            In::Map(_) => Some(TypeRef::Map),
            In::Text(_) => Some(TypeRef::Text),
            In::XmlElement(p) => Some(TypeRef::XmlElement(p.tag.clone())),
            In::XmlText(_) => Some(TypeRef::XmlText),
            In::XmlFragment(_) => Some(TypeRef::XmlFragment),
            In::XmlHook(p) => Some(TypeRef::XmlHook(p.name.clone())),
            In::Any(_) | In::Binary(_) | In::Doc(_) => None,
        };
    }
}

impl From<Any> for In {
    fn from(value: Any) -> In {
        return In::Any(value);
    }
}

impl From<&str> for In {
    fn from(value: &str) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<String> for In {
    fn from(value: String) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<f64> for In {
    fn from(value: f64) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<i64> for In {
    fn from(value: i64) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<i32> for In {
    fn from(value: i32) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<bool> for In {
    fn from(value: bool) -> In {
        return In::Any(Any::from(value));
    }
}

impl From<Vec<u8>> for In {
    fn from(value: Vec<u8>) -> In {
        return In::Binary(value);
    }
}

impl From<Doc> for In {
    fn from(value: Doc) -> In {
        return In::Doc(value);
    }
}

impl From<serde_json::Value> for In {
    fn from(value: serde_json::Value) -> In {
        return In::Any(Any::from(value));
    }
}

// =============================================================================
// Values out
// =============================================================================

/// A value read from a shared type.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Out {
    Any(Any),
    Array(ArrayRef),
    Map(MapRef),
    Text(TextRef),
    XmlElement(XmlElementRef),
    XmlFragment(XmlFragmentRef),
    XmlText(XmlTextRef),
    XmlHook(XmlHookRef),
    /// A root type no one has requested with a concrete kind yet.
    UndefinedRef(BranchPtr),
    /// A sub-document, by guid.
    Doc(Arc<str>),
    #[default]
    Undefined,
}

impl Out {
    /// The typed handle of a branch.
    pub fn from_branch(ptr: BranchPtr, type_ref: &TypeRef) -> Out {
        return match type_ref {
            TypeRef::Array => Out::Array(ArrayRef(ptr)),
            TypeRef::Map => Out::Map(MapRef(ptr)),
            TypeRef::Text => Out::Text(TextRef(ptr)),
            TypeRef::XmlElement(_) => Out::XmlElement(XmlElementRef(ptr)),
            TypeRef::XmlFragment => Out::XmlFragment(XmlFragmentRef(ptr)),
            TypeRef::XmlText => Out::XmlText(XmlTextRef(ptr)),
            TypeRef::XmlHook(_) => Out::XmlHook(XmlHookRef(ptr)),
            TypeRef::Undefined => Out::UndefinedRef(ptr),
        };
    }

    /// Every value carried by an item, one per clock unit. Strings are
    /// split into chars.
    pub fn from_item(item: &Item) -> Vec<Out> {
        return match &item.content {
            ItemContent::Any(values) => values.iter().cloned().map(Out::Any).collect(),
            ItemContent::JSON(values) => values
                .iter()
                .map(|s| Out::Any(Any::from_json(s).unwrap_or(Any::Undefined)))
                .collect(),
            ItemContent::Binary(buf) => vec![Out::Any(Any::Buffer(buf.clone()))],
            ItemContent::String(s) => s.chars().map(|c| Out::Any(Any::from(c.to_string()))).collect(),
            ItemContent::Embed(value) => vec![Out::Any(value.clone())],
            ItemContent::Type(type_ref) => vec![Out::from_branch(BranchPtr::Nested(item.id), type_ref)],
            ItemContent::Doc { guid, .. } => vec![Out::Doc(guid.clone())],
            ItemContent::Deleted(_) | ItemContent::Format { .. } => Vec::new(),
        };
    }

    pub fn as_any(&self) -> Option<&Any> {
        return match self {
            Out::Any(value) => Some(value),
            _ => None,
        };
    }

    /// Render as a plain value. Nested types are rendered recursively.
    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        return match self {
            Out::Any(value) => value.clone(),
            Out::Array(r) => r.to_json(txn),
            Out::Map(r) => r.to_json(txn),
            Out::Text(r) => Any::from(r.get_string(txn)),
            Out::XmlElement(r) => Any::from(r.get_string(txn)),
            Out::XmlFragment(r) => Any::from(r.get_string(txn)),
            Out::XmlText(r) => Any::from(r.get_string(txn)),
            Out::XmlHook(r) => r.to_json(txn),
            Out::Doc(guid) => Any::map([("guid", Any::from(guid.clone()))]),
            Out::UndefinedRef(_) | Out::Undefined => Any::Undefined,
        };
    }
}

impl From<Any> for Out {
    fn from(value: Any) -> Out {
        return Out::Any(value);
    }
}

// =============================================================================
// Item creation
// =============================================================================

/// Create an item between `left` and `right` (block starts) and integrate
/// it. Returns the new item's id.
pub(crate) fn insert_item(
    txn: &mut Transaction<'_>,
    parent: &BranchPtr,
    left: Option<ID>,
    right: Option<ID>,
    parent_sub: Option<Arc<str>>,
    content: ItemContent,
) -> ID {
    let id = txn.next_id();
    let origin = left.and_then(|l| txn.doc.store.get_item(&l)).map(|l| l.last_id());
    let item = Item::new(
        id,
        left,
        origin,
        right,
        right,
        TypePtr::Branch(parent.clone()),
        parent_sub,
        content,
    );
    txn.integrate_item(item, 0);
    return id;
}

/// Turn a non-plain value into its content and the part that fills the
/// new nested type once it exists.
pub(crate) fn into_content(txn: &mut Transaction<'_>, value: In) -> (ItemContent, Option<In>) {
    match value {
        In::Any(value) => return (ItemContent::Any(vec![value]), None),
        In::Binary(buf) => return (ItemContent::Binary(Arc::from(buf)), None),
        In::Doc(subdoc) => {
            let guid = subdoc.guid();
            let opts = subdoc.content_opts();
            txn.doc.subdocs.insert(guid.clone(), subdoc);
            return (ItemContent::Doc { guid, opts }, None);
        }
        prelim => {
            let type_ref = prelim.type_ref().unwrap_or(TypeRef::Undefined);
            return (ItemContent::Type(type_ref), Some(prelim));
        }
    }
}

/// Fill a freshly integrated nested type.
pub(crate) fn integrate_prelim(txn: &mut Transaction<'_>, ptr: &BranchPtr, prelim: In) {
    match prelim {
        In::Array(values) | In::XmlFragment(values) => {
            insert_after(txn, ptr, None, values);
        }
        In::Map(entries) => {
            for (key, value) in entries {
                map_set(txn, ptr, Arc::from(key), value);
            }
        }
        In::Text(s) => {
            if let Err(err) = text::insert(txn, ptr, 0, &s, None) {
                warn!(%err, ?ptr, "failed to fill nested text");
            }
        }
        In::XmlElement(p) => {
            for (key, value) in p.attributes {
                map_set(txn, ptr, Arc::from(key), In::Any(Any::from(value)));
            }
            insert_after(txn, ptr, None, p.children);
        }
        In::XmlText(p) => {
            if let Err(err) = text::insert(txn, ptr, 0, &p.text, None) {
                warn!(%err, ?ptr, "failed to fill nested xml text");
            }
            for (key, value) in p.attributes {
                map_set(txn, ptr, Arc::from(key), In::Any(Any::from(value)));
            }
        }
        In::XmlHook(p) => {
            for (key, value) in p.entries {
                map_set(txn, ptr, Arc::from(key), value);
            }
        }
        In::Any(_) | In::Binary(_) | In::Doc(_) => {}
    }
}

// =============================================================================
// Lists
// =============================================================================

/// Insert values after `left` (a block start, or `None` for the front).
/// Returns the last item created.
pub(crate) fn insert_after(
    txn: &mut Transaction<'_>,
    parent: &BranchPtr,
    mut left: Option<ID>,
    values: Vec<In>,
) -> Option<ID> {
    let right = match left {
        Some(l) => txn.doc.store.get_item(&l).and_then(|l| l.right),
        None => txn.doc.store.branch(parent).and_then(|b| b.start),
    };
    let mut pending: Vec<Any> = Vec::new();
    for value in values {
        if let In::Any(any) = value {
            pending.push(any);
            continue;
        }
        if !pending.is_empty() {
            let content = ItemContent::Any(std::mem::take(&mut pending));
            left = Some(insert_item(txn, parent, left, right, None, content));
        }
        let (content, prelim) = into_content(txn, value);
        let id = insert_item(txn, parent, left, right, None, content);
        if let Some(prelim) = prelim {
            integrate_prelim(txn, &BranchPtr::Nested(id), prelim);
        }
        left = Some(id);
    }
    if !pending.is_empty() {
        left = Some(insert_item(txn, parent, left, right, None, ItemContent::Any(pending)));
    }
    return left;
}

/// The nearest item left of `id` that is not deleted.
fn prev_live(store: &Store, id: &ID) -> Option<ID> {
    let mut next = store.get_item(id)?.left;
    while let Some(left) = next {
        let item = store.get_item(&left)?;
        if !item.is_deleted() {
            return Some(left);
        }
        next = item.left;
    }
    return None;
}

/// Number of clock units `values` will occupy.
fn units(values: &[In]) -> u32 {
    return values.len() as u32;
}

/// Insert values so the first one lands at visible `index`.
pub(crate) fn list_insert(txn: &mut Transaction<'_>, parent: &BranchPtr, index: u32, values: Vec<In>) -> Result<()> {
    let len = txn.doc.store.branch(parent).ok_or(Error::TypeNotFound)?.block_len;
    if index > len {
        return Err(Error::LengthExceeded { index, len });
    }
    if values.is_empty() {
        return Ok(());
    }
    let count = units(&values) as i64;
    if index == 0 {
        txn.doc.store.update_marker_changes(parent, 0, count);
        insert_after(txn, parent, None, values);
        return Ok(());
    }
    let start_index = index;
    let mut index = index;
    let mut n = txn.doc.store.branch(parent).and_then(|b| b.start);
    if let Some(marker) = txn.doc.store.find_marker(parent, index) {
        index -= marker.index;
        if index == 0 {
            // The marked item starts at `index`: insert right before it.
            let prev = prev_live(&txn.doc.store, &marker.item);
            txn.doc.store.update_marker_changes(parent, start_index, count);
            insert_after(txn, parent, prev, values);
            return Ok(());
        }
        n = Some(marker.item);
    }
    while let Some(id) = n {
        let Some(item) = txn.doc.store.get_item(&id) else {
            break;
        };
        if item.is_visible() {
            if index <= item.len {
                if index < item.len {
                    txn.clean_start(&ID::new(id.client, id.clock + index));
                }
                break;
            }
            index -= item.len;
        }
        n = item.right;
    }
    txn.doc.store.update_marker_changes(parent, start_index, count);
    insert_after(txn, parent, n, values);
    return Ok(());
}

/// Delete `len` visible units starting at `index`.
pub(crate) fn list_delete(txn: &mut Transaction<'_>, parent: &BranchPtr, index: u32, len: u32) -> Result<()> {
    let total = txn.doc.store.branch(parent).ok_or(Error::TypeNotFound)?.block_len;
    if index.checked_add(len).is_none_or(|end| end > total) {
        return Err(Error::LengthExceeded { index: index.saturating_add(len), len: total });
    }
    if len == 0 {
        return Ok(());
    }
    let start_index = index;
    let mut index = index;
    let mut n = txn.doc.store.branch(parent).and_then(|b| b.start);
    if let Some(marker) = txn.doc.store.find_marker(parent, index) {
        n = Some(marker.item);
        index -= marker.index;
    }
    while index > 0 {
        let Some(id) = n else {
            break;
        };
        let Some(item) = txn.doc.store.get_item(&id) else {
            break;
        };
        if item.is_visible() {
            if index < item.len {
                n = txn.clean_start(&ID::new(id.client, id.clock + index));
                break;
            }
            index -= item.len;
        }
        n = txn.doc.store.get_item(&id).and_then(|item| item.right);
    }
    let mut remaining = len;
    while remaining > 0 {
        let Some(id) = n else {
            break;
        };
        let Some(item) = txn.doc.store.get_item(&id) else {
            break;
        };
        if item.is_visible() {
            if remaining < item.len {
                txn.clean_start(&ID::new(id.client, id.clock + remaining));
            }
            let item_len = txn.doc.store.get_item(&id).map(|item| item.len).unwrap_or(0);
            txn.delete_item(&id);
            remaining -= item_len.min(remaining);
        }
        n = txn.doc.store.get_item(&id).and_then(|item| item.right);
    }
    txn.doc.store.update_marker_changes(parent, start_index, -(len as i64) + remaining as i64);
    return Ok(());
}

/// The value at visible `index`.
pub(crate) fn list_get(store: &Store, parent: &BranchPtr, index: u32) -> Option<Out> {
    let mut index = index;
    let mut next = store.branch(parent)?.start;
    while let Some(id) = next {
        let item = store.get_item(&id)?;
        if item.is_visible() {
            if index < item.len {
                return Out::from_item(item).into_iter().nth(index as usize);
            }
            index -= item.len;
        }
        next = item.right;
    }
    return None;
}

/// Every visible value, in order.
pub(crate) fn list_values(store: &Store, parent: &BranchPtr) -> Vec<Out> {
    let mut values = Vec::new();
    let mut next = store.branch(parent).and_then(|b| b.start);
    while let Some(id) = next {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        if item.is_visible() {
            values.extend(Out::from_item(item));
        }
        next = item.right;
    }
    return values;
}

// =============================================================================
// Maps
// =============================================================================

/// Set a key slot, superseding its current value.
pub(crate) fn map_set(txn: &mut Transaction<'_>, parent: &BranchPtr, key: Arc<str>, value: In) {
    let left = txn.doc.store.branch(parent).and_then(|b| b.map.get(&key).copied());
    let (content, prelim) = into_content(txn, value);
    let id = insert_item(txn, parent, left, None, Some(key), content);
    if let Some(prelim) = prelim {
        integrate_prelim(txn, &BranchPtr::Nested(id), prelim);
    }
}

/// Delete the current value of a key slot. Returns false if there was none.
pub(crate) fn map_delete(txn: &mut Transaction<'_>, parent: &BranchPtr, key: &str) -> bool {
    let Some(id) = txn.doc.store.branch(parent).and_then(|b| b.map.get(key).copied()) else {
        return false;
    };
    return txn.delete_item(&id);
}

pub(crate) fn map_get(store: &Store, parent: &BranchPtr, key: &str) -> Option<Out> {
    let id = store.branch(parent)?.map.get(key)?;
    let item = store.get_item(id)?;
    if item.is_deleted() {
        return None;
    }
    return Out::from_item(item).pop();
}

/// Live entries, sorted by key.
pub(crate) fn map_entries(store: &Store, parent: &BranchPtr) -> Vec<(Arc<str>, Out)> {
    let Some(branch) = store.branch(parent) else {
        return Vec::new();
    };
    let mut entries: Vec<(Arc<str>, Out)> = branch
        .map
        .iter()
        .filter_map(|(key, id)| {
            let item = store.get_item(id)?;
            if item.is_deleted() {
                return None;
            }
            return Some((key.clone(), Out::from_item(item).pop()?));
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    return entries;
}

/// Render live entries as a plain map value.
pub(crate) fn map_to_json<T: ReadTxn>(txn: &T, parent: &BranchPtr) -> Any {
    let entries = map_entries(txn.store(), parent);
    return Any::map(entries.into_iter().map(|(key, value)| (key.to_string(), value.to_json(txn))));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_share_an_item() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        doc.transact(|txn| {
            array
                .insert_range(txn, 0, vec![In::from(1), In::from("two"), In::from(vec![3u8]), In::from(4)])
                .unwrap();
        });
        let blocks = &doc.store.blocks[&1];
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 2);
        assert_eq!(array.len(&doc), 4);
    }

    #[test]
    fn nested_prelims_are_filled() {
        let mut doc = Doc::with_client_id(1);
        let map = doc.get_or_insert_map("m");
        doc.transact(|txn| {
            let inner = BTreeMap::from([("k".to_owned(), In::from(true))]);
            map.insert(txn, "inner", In::Map(inner));
            map.insert(txn, "list", In::Array(vec![In::from(1), In::Text("hi".into())]));
        });
        let json = serde_json::to_value(map.to_json(&doc)).unwrap();
        assert_eq!(json, serde_json::json!({ "inner": { "k": true }, "list": [1, "hi"] }));
    }
}
