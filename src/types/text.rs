// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared rich text.
//!
//! Text is a list of string, embed and format items. A format item is a
//! zero-width marker that sets one attribute from its position onwards
//! (a `Null` value clears it). Formatting a range therefore inserts a
//! marker at the start and a marker restoring the previous value at the
//! end.
//!
//! Indices count chars (Unicode scalar values) plus one per embed. Format
//! markers occupy a clock unit but no index.
//!
//! Concurrent formatting can leave redundant markers behind. After every
//! remote transaction that touched formatted text, a cleanup pass deletes
//! markers that do not change the attribute state.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use super::Attrs;
use super::In;
use super::Out;
use super::SharedRef;
use super::insert_item;
use super::integrate_prelim;
use super::into_content;
use crate::crdt::block::Item;
use crate::crdt::branch::BranchPtr;
use crate::crdt::content::ItemContent;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::ID;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::encoding::any::Any;
use crate::error::Error;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::transaction::ReadTxn;
use crate::transaction::Transaction;

super::shared_ref!(TextRef);

/// One run of a rendered text.
#[derive(Clone, Debug, PartialEq)]
pub struct Diff {
    /// A string for text runs, the embedded value otherwise.
    pub insert: Out,
    pub attributes: Option<Box<Attrs>>,
    /// Set when rendering the difference between two snapshots.
    pub ychange: Option<YChange>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
}

/// Who added or removed a run between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YChange {
    pub kind: ChangeKind,
    pub id: ID,
}

/// One operation of a delta to apply.
#[derive(Debug)]
pub enum TextDelta {
    /// Insert a string (`In::Any(Any::String)`) or an embed.
    Insert(In, Option<Box<Attrs>>),
    /// Skip over a range, applying the attributes to it.
    Retain(u32, Option<Box<Attrs>>),
    Delete(u32),
}

impl TextRef {
    /// Length in chars plus embeds.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.ptr()).map(|b| b.block_len).unwrap_or(0);
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    /// The plain string, without embeds or formatting.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return get_string(txn.store(), self.ptr());
    }

    /// Insert text that takes on the formatting at `index`.
    pub fn insert(&self, txn: &mut Transaction<'_>, index: u32, chunk: &str) -> Result<()> {
        return insert(txn, self.ptr(), index, chunk, None);
    }

    /// Insert text with exactly the given attributes.
    pub fn insert_with_attributes(
        &self,
        txn: &mut Transaction<'_>,
        index: u32,
        chunk: &str,
        attributes: Attrs,
    ) -> Result<()> {
        return insert(txn, self.ptr(), index, chunk, Some(attributes));
    }

    /// Insert a single non-text value (an `Any` embed or a nested type).
    pub fn insert_embed<V: Into<In>>(
        &self,
        txn: &mut Transaction<'_>,
        index: u32,
        embed: V,
        attributes: Option<Attrs>,
    ) -> Result<()> {
        return insert_embed(txn, self.ptr(), index, embed.into(), attributes);
    }

    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        return remove(txn, self.ptr(), index, len);
    }

    /// Set attributes on a range. `Null` values clear an attribute.
    pub fn format(&self, txn: &mut Transaction<'_>, index: u32, len: u32, attributes: Attrs) -> Result<()> {
        return format(txn, self.ptr(), index, len, attributes);
    }

    /// The text as formatted runs.
    pub fn to_delta<T: ReadTxn>(&self, txn: &T) -> Vec<Diff> {
        return render(txn.store(), self.ptr(), None, None);
    }

    /// The text as it was at `hi`. With `lo` set, runs added or removed
    /// between the two snapshots carry a [`YChange`].
    pub fn diff(&self, txn: &mut Transaction<'_>, hi: Option<&Snapshot>, lo: Option<&Snapshot>) -> Vec<Diff> {
        for snapshot in [hi, lo].into_iter().flatten() {
            split_for_snapshot(txn, snapshot);
        }
        return render(&txn.doc.store, self.ptr(), hi, lo);
    }

    /// Apply a delta starting at index 0.
    pub fn apply_delta(&self, txn: &mut Transaction<'_>, delta: Vec<TextDelta>) -> Result<()> {
        return apply_delta(txn, self.ptr(), delta);
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Apply a format marker to a running attribute map.
pub(crate) fn update_current_attributes(attrs: &mut Attrs, key: &Arc<str>, value: &Any) {
    if *value == Any::Null {
        attrs.remove(key);
    } else {
        attrs.insert(key.clone(), value.clone());
    }
}

fn attr_or_null(attrs: &Attrs, key: &str) -> Any {
    return attrs.get(key).cloned().unwrap_or(Any::Null);
}

// =============================================================================
// Positions
// =============================================================================

/// A cursor between two items, with the attributes active at that point.
struct Position {
    parent: BranchPtr,
    left: Option<ID>,
    right: Option<ID>,
    index: u32,
    attrs: Attrs,
}

impl Position {
    fn start(store: &Store, parent: &BranchPtr) -> Position {
        return Position {
            parent: parent.clone(),
            left: None,
            right: store.branch(parent).and_then(|b| b.start),
            index: 0,
            attrs: Attrs::new(),
        };
    }

    /// Step over the item to the right.
    fn forward(&mut self, store: &Store) {
        let Some(right) = self.right else {
            return;
        };
        let Some(item) = store.get_item(&right) else {
            self.right = None;
            return;
        };
        if !item.is_deleted() {
            match &item.content {
                ItemContent::Format { key, value } => update_current_attributes(&mut self.attrs, key, value),
                _ => self.index += item.len,
            }
        }
        self.left = Some(right);
        self.right = item.right;
    }

    /// Advance `count` index units, splitting the last item if needed.
    fn advance(&mut self, txn: &mut Transaction<'_>, mut count: u32) {
        while count > 0 {
            let Some(right) = self.right else {
                break;
            };
            let Some(item) = txn.doc.store.get_item(&right) else {
                break;
            };
            if !item.is_deleted() {
                match &item.content {
                    ItemContent::Format { key, value } => update_current_attributes(&mut self.attrs, key, value),
                    _ => {
                        if count < item.len {
                            txn.clean_start(&ID::new(right.client, right.clock + count));
                        }
                        let len = txn.doc.store.get_item(&right).map(|item| item.len).unwrap_or(0);
                        self.index += len;
                        count -= len.min(count);
                    }
                }
            }
            self.left = Some(right);
            self.right = txn.doc.store.get_item(&right).and_then(|item| item.right);
        }
    }

    /// Insert an item at the cursor and step over it.
    fn insert(&mut self, txn: &mut Transaction<'_>, content: ItemContent) -> ID {
        let id = insert_item(txn, &self.parent, self.left, self.right, None, content);
        self.right = Some(id);
        self.forward(&txn.doc.store);
        return id;
    }
}

fn find_position(txn: &mut Transaction<'_>, parent: &BranchPtr, index: u32, use_marker: bool) -> Position {
    let marker = if use_marker { txn.doc.store.find_marker(parent, index) } else { None };
    let mut pos = Position::start(&txn.doc.store, parent);
    if let Some(marker) = marker {
        pos.left = txn.doc.store.get_item(&marker.item).and_then(|item| item.left);
        pos.right = Some(marker.item);
        pos.index = marker.index;
    }
    let count = index.saturating_sub(pos.index);
    pos.advance(txn, count);
    return pos;
}

// =============================================================================
// Editing
// =============================================================================

/// Skip markers that already match the attributes about to be set.
fn minimize_attribute_changes(store: &Store, pos: &mut Position, attrs: &Attrs) {
    while let Some(item) = pos.right.and_then(|right| store.get_item(&right)) {
        let redundant = item.is_deleted()
            || matches!(&item.content, ItemContent::Format { key, value } if attr_or_null(attrs, key) == *value);
        if !redundant {
            break;
        }
        pos.forward(store);
    }
}

/// Insert markers for every attribute that differs from the cursor's.
/// Returns the values to restore afterwards.
fn insert_attributes(txn: &mut Transaction<'_>, pos: &mut Position, attrs: &Attrs) -> Attrs {
    let mut negated = Attrs::new();
    for (key, value) in attrs.iter() {
        let current = attr_or_null(&pos.attrs, key);
        if current != *value {
            negated.insert(key.clone(), current);
            pos.insert(txn, ItemContent::Format { key: key.clone(), value: value.clone() });
        }
    }
    return negated;
}

/// Restore the attributes that were active before an insert or format.
fn insert_negated_attributes(txn: &mut Transaction<'_>, pos: &mut Position, mut negated: Attrs) {
    while let Some(right) = pos.right {
        let Some(item) = txn.doc.store.get_item(&right) else {
            break;
        };
        let skip = item.is_deleted()
            || matches!(&item.content, ItemContent::Format { key, value } if negated.get(key) == Some(value));
        if !skip {
            break;
        }
        if !item.is_deleted() {
            if let ItemContent::Format { key, .. } = &item.content {
                negated.remove(key);
            }
        }
        pos.forward(&txn.doc.store);
    }
    for (key, value) in negated {
        pos.insert(txn, ItemContent::Format { key, value });
    }
}

fn insert_content(
    txn: &mut Transaction<'_>,
    pos: &mut Position,
    content: ItemContent,
    prelim: Option<In>,
    mut attrs: Attrs,
) {
    for key in pos.attrs.keys() {
        if !attrs.contains_key(key) {
            attrs.insert(key.clone(), Any::Null);
        }
    }
    minimize_attribute_changes(&txn.doc.store, pos, &attrs);
    let negated = insert_attributes(txn, pos, &attrs);
    let parent = pos.parent.clone();
    txn.doc.store.update_marker_changes(&parent, pos.index, content.len() as i64);
    let id = pos.insert(txn, content);
    if let Some(prelim) = prelim {
        integrate_prelim(txn, &BranchPtr::Nested(id), prelim);
    }
    insert_negated_attributes(txn, pos, negated);
}

fn format_range(txn: &mut Transaction<'_>, pos: &mut Position, mut len: u32, attrs: &Attrs) -> Result<()> {
    minimize_attribute_changes(&txn.doc.store, pos, attrs);
    let mut negated = insert_attributes(txn, pos, attrs);
    while let Some(right) = pos.right {
        let Some(item) = txn.doc.store.get_item(&right) else {
            break;
        };
        let gap = item.is_deleted() || matches!(item.content, ItemContent::Format { .. });
        if !(len > 0 || (!negated.is_empty() && gap)) {
            break;
        }
        if !item.is_deleted() {
            match &item.content {
                ItemContent::Format { key, value } => match attrs.get(key) {
                    Some(attr) => {
                        if attr == value {
                            negated.remove(key);
                        } else {
                            if len == 0 {
                                break;
                            }
                            negated.insert(key.clone(), value.clone());
                        }
                        txn.delete_item(&right);
                    }
                    None => {
                        pos.attrs.insert(key.clone(), value.clone());
                    }
                },
                _ => {
                    if len < item.len {
                        txn.clean_start(&ID::new(right.client, right.clock + len));
                    }
                    let item_len = txn.doc.store.get_item(&right).map(|item| item.len).unwrap_or(0);
                    len -= item_len.min(len);
                }
            }
        }
        pos.forward(&txn.doc.store);
    }
    insert_negated_attributes(txn, pos, negated);
    if len > 0 {
        return Err(Error::LengthExceeded { index: pos.index + len, len: pos.index });
    }
    return Ok(());
}

fn delete_range(txn: &mut Transaction<'_>, pos: &mut Position, len: u32) {
    let mut remaining = len;
    let start_attrs = pos.attrs.clone();
    let start = pos.right;
    while remaining > 0 {
        let Some(right) = pos.right else {
            break;
        };
        let Some(item) = txn.doc.store.get_item(&right) else {
            break;
        };
        let deletable = matches!(item.content, ItemContent::Type(_) | ItemContent::Embed(_) | ItemContent::String(_));
        if !item.is_deleted() && deletable {
            if remaining < item.len {
                txn.clean_start(&ID::new(right.client, right.clock + remaining));
            }
            let item_len = txn.doc.store.get_item(&right).map(|item| item.len).unwrap_or(0);
            remaining -= item_len.min(remaining);
            txn.delete_item(&right);
        }
        pos.forward(&txn.doc.store);
    }
    if let Some(start) = start {
        let end = pos.right;
        cleanup_formatting_gap(txn, start, end, &start_attrs, &mut pos.attrs);
    }
    let parent = pos.parent.clone();
    txn.doc.store.update_marker_changes(&parent, pos.index, -(len as i64) + remaining as i64);
}

// =============================================================================
// Entry points
// =============================================================================

fn text_len(txn: &Transaction<'_>, parent: &BranchPtr) -> Result<u32> {
    return txn.doc.store.branch(parent).map(|b| b.block_len).ok_or(Error::TypeNotFound);
}

pub(crate) fn insert(
    txn: &mut Transaction<'_>,
    parent: &BranchPtr,
    index: u32,
    chunk: &str,
    attrs: Option<Attrs>,
) -> Result<()> {
    let len = text_len(txn, parent)?;
    if index > len {
        return Err(Error::LengthExceeded { index, len });
    }
    if chunk.is_empty() {
        return Ok(());
    }
    let mut pos = find_position(txn, parent, index, attrs.is_none());
    let attrs = attrs.unwrap_or_else(|| pos.attrs.clone());
    insert_content(txn, &mut pos, ItemContent::String(chunk.to_owned()), None, attrs);
    return Ok(());
}

fn embed_content(txn: &mut Transaction<'_>, value: In) -> (ItemContent, Option<In>) {
    return match value {
        In::Any(value) => (ItemContent::Embed(value), None),
        other => into_content(txn, other),
    };
}

pub(crate) fn insert_embed(
    txn: &mut Transaction<'_>,
    parent: &BranchPtr,
    index: u32,
    embed: In,
    attrs: Option<Attrs>,
) -> Result<()> {
    let len = text_len(txn, parent)?;
    if index > len {
        return Err(Error::LengthExceeded { index, len });
    }
    let mut pos = find_position(txn, parent, index, attrs.is_none());
    let (content, prelim) = embed_content(txn, embed);
    insert_content(txn, &mut pos, content, prelim, attrs.unwrap_or_default());
    return Ok(());
}

pub(crate) fn remove(txn: &mut Transaction<'_>, parent: &BranchPtr, index: u32, len: u32) -> Result<()> {
    let total = text_len(txn, parent)?;
    if index.checked_add(len).is_none_or(|end| end > total) {
        return Err(Error::LengthExceeded { index: index.saturating_add(len), len: total });
    }
    if len == 0 {
        return Ok(());
    }
    let mut pos = find_position(txn, parent, index, true);
    delete_range(txn, &mut pos, len);
    return Ok(());
}

pub(crate) fn format(txn: &mut Transaction<'_>, parent: &BranchPtr, index: u32, len: u32, attrs: Attrs) -> Result<()> {
    let total = text_len(txn, parent)?;
    if index.checked_add(len).is_none_or(|end| end > total) {
        return Err(Error::LengthExceeded { index: index.saturating_add(len), len: total });
    }
    if len == 0 {
        return Ok(());
    }
    let mut pos = find_position(txn, parent, index, false);
    if pos.right.is_none() {
        return Ok(());
    }
    return format_range(txn, &mut pos, len, &attrs);
}

pub(crate) fn apply_delta(txn: &mut Transaction<'_>, parent: &BranchPtr, delta: Vec<TextDelta>) -> Result<()> {
    text_len(txn, parent)?;
    let mut pos = Position::start(&txn.doc.store, parent);
    for op in delta {
        match op {
            TextDelta::Insert(In::Any(Any::String(s)), attrs) => {
                if !s.is_empty() {
                    let attrs = attrs.map(|a| *a).unwrap_or_default();
                    insert_content(txn, &mut pos, ItemContent::String(s.to_string()), None, attrs);
                }
            }
            TextDelta::Insert(value, attrs) => {
                let (content, prelim) = embed_content(txn, value);
                insert_content(txn, &mut pos, content, prelim, attrs.map(|a| *a).unwrap_or_default());
            }
            TextDelta::Retain(len, attrs) => {
                format_range(txn, &mut pos, len, &attrs.map(|a| *a).unwrap_or_default())?;
            }
            TextDelta::Delete(len) => delete_range(txn, &mut pos, len),
        }
    }
    return Ok(());
}

// =============================================================================
// Reading
// =============================================================================

pub(crate) fn get_string(store: &Store, parent: &BranchPtr) -> String {
    let mut s = String::new();
    let mut next = store.branch(parent).and_then(|b| b.start);
    while let Some(id) = next {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        if !item.is_deleted() {
            if let ItemContent::String(chunk) = &item.content {
                s.push_str(chunk);
            }
        }
        next = item.right;
    }
    return s;
}

fn visible(item: &Item, snapshot: Option<&Snapshot>) -> bool {
    return match snapshot {
        Some(snapshot) => snapshot.is_visible(item),
        None => !item.is_deleted(),
    };
}

/// Render formatted runs. Items must already be split at every snapshot
/// boundary.
pub(crate) fn render(store: &Store, parent: &BranchPtr, hi: Option<&Snapshot>, lo: Option<&Snapshot>) -> Vec<Diff> {
    struct Runs {
        diffs: Vec<Diff>,
        attrs: Attrs,
        ychange: Option<YChange>,
        text: String,
    }

    impl Runs {
        fn attributes(&self) -> Option<Box<Attrs>> {
            if self.attrs.is_empty() {
                return None;
            }
            return Some(Box::new(self.attrs.clone()));
        }

        fn pack(&mut self) {
            if self.text.is_empty() {
                return;
            }
            let text = std::mem::take(&mut self.text);
            self.diffs.push(Diff {
                insert: Out::Any(Any::from(text)),
                attributes: self.attributes(),
                ychange: self.ychange,
            });
        }
    }

    let mut runs = Runs { diffs: Vec::new(), attrs: Attrs::new(), ychange: None, text: String::new() };
    let mut next = store.branch(parent).and_then(|b| b.start);
    while let Some(id) = next {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        next = item.right;
        if !(visible(item, hi) || (lo.is_some() && visible(item, lo))) {
            continue;
        }
        match &item.content {
            ItemContent::String(chunk) => {
                let change = if hi.is_some() && !visible(item, hi) {
                    Some(ChangeKind::Removed)
                } else if lo.is_some() && !visible(item, lo) {
                    Some(ChangeKind::Added)
                } else {
                    None
                };
                match change {
                    Some(kind) => {
                        let same = runs.ychange.is_some_and(|c| c.kind == kind && c.id.client == item.id.client);
                        if !same {
                            runs.pack();
                            runs.ychange = Some(YChange { kind, id: item.id });
                        }
                    }
                    None => {
                        if runs.ychange.is_some() {
                            runs.pack();
                            runs.ychange = None;
                        }
                    }
                }
                runs.text.push_str(chunk);
            }
            ItemContent::Type(_) | ItemContent::Embed(_) => {
                runs.pack();
                if let Some(insert) = Out::from_item(item).pop() {
                    let attributes = runs.attributes();
                    runs.diffs.push(Diff { insert, attributes, ychange: None });
                }
            }
            ItemContent::Format { key, value } => {
                if visible(item, hi) {
                    runs.pack();
                    update_current_attributes(&mut runs.attrs, key, value);
                }
            }
            _ => {}
        }
    }
    runs.pack();
    return runs.diffs;
}

/// Split items so every boundary of `snapshot` falls between two items.
pub(crate) fn split_for_snapshot(txn: &mut Transaction<'_>, snapshot: &Snapshot) {
    for (client, clock) in snapshot.state_vector().iter() {
        if *clock < txn.doc.store.get_state(client) {
            txn.clean_start(&ID::new(*client, *clock));
        }
    }
    for (client, runs) in snapshot.delete_set().iter() {
        for run in runs.to_vec() {
            txn.iterate_blocks(*client, run.clock, run.len);
        }
    }
}

// =============================================================================
// Formatting cleanup
// =============================================================================

/// Delete redundant format markers between `start` and the next visible
/// content item. Returns how many were deleted.
fn cleanup_formatting_gap(
    txn: &mut Transaction<'_>,
    start: ID,
    curr: Option<ID>,
    start_attrs: &Attrs,
    curr_attrs: &mut Attrs,
) -> u32 {
    let store = &txn.doc.store;
    let mut end = Some(start);
    let mut end_formats: FxHashMap<Arc<str>, ID> = FxHashMap::default();
    while let Some(id) = end {
        let Some(item) = store.get_item(&id) else {
            break;
        };
        if item.is_visible() {
            break;
        }
        if let (false, ItemContent::Format { key, .. }) = (item.is_deleted(), &item.content) {
            end_formats.insert(key.clone(), id);
        }
        end = item.right;
    }

    let mut cleanups = 0;
    let mut reached_curr = false;
    let mut cursor = Some(start);
    while cursor != end {
        let Some(id) = cursor else {
            break;
        };
        if curr == Some(id) {
            reached_curr = true;
        }
        let Some(item) = txn.doc.store.get_item(&id) else {
            break;
        };
        cursor = item.right;
        let format = match (&item.content, item.is_deleted()) {
            (ItemContent::Format { key, value }, false) => Some((key.clone(), value.clone())),
            _ => None,
        };
        let Some((key, value)) = format else {
            continue;
        };
        let start_value = attr_or_null(start_attrs, &key);
        let mut deleted = false;
        if end_formats.get(&key) != Some(&id) || start_value == value {
            txn.delete_item(&id);
            deleted = true;
            cleanups += 1;
            if !reached_curr && attr_or_null(curr_attrs, &key) == value && start_value != value {
                if start_value == Any::Null {
                    curr_attrs.remove(&key);
                } else {
                    curr_attrs.insert(key.clone(), start_value);
                }
            }
        }
        if !reached_curr && !deleted {
            update_current_attributes(curr_attrs, &key, &value);
        }
    }
    return cleanups;
}

/// Delete duplicate markers around a deleted item without knowing the
/// attributes in effect before it.
fn cleanup_contextless_gap(txn: &mut Transaction<'_>, id: ID) {
    let store = &txn.doc.store;
    let mut cursor = Some(id);
    while let Some(right) = cursor.and_then(|c| store.get_item(&c)).and_then(|item| item.right) {
        let Some(item) = store.get_item(&right) else {
            break;
        };
        if item.is_visible() {
            break;
        }
        cursor = Some(right);
    }
    let mut seen: FxHashSet<Arc<str>> = FxHashSet::default();
    while let Some(c) = cursor {
        let Some(item) = txn.doc.store.get_item(&c) else {
            break;
        };
        if item.is_visible() {
            break;
        }
        cursor = item.left;
        let key = match (&item.content, item.is_deleted()) {
            (ItemContent::Format { key, .. }, false) => Some(key.clone()),
            _ => None,
        };
        if let Some(key) = key {
            if !seen.insert(key) {
                txn.delete_item(&c);
            }
        }
    }
}

/// Rescan a whole text and delete every redundant format marker.
fn cleanup_formatting(txn: &mut Transaction<'_>, parent: &BranchPtr) -> u32 {
    let mut cleanups = 0;
    let mut start = txn.doc.store.branch(parent).and_then(|b| b.start);
    let mut next = start;
    let mut start_attrs = Attrs::new();
    let mut curr_attrs = Attrs::new();
    while let Some(id) = next {
        let Some(item) = txn.doc.store.get_item(&id) else {
            break;
        };
        next = item.right;
        if item.is_deleted() {
            continue;
        }
        match &item.content {
            ItemContent::Format { key, value } => update_current_attributes(&mut curr_attrs, key, value),
            _ => {
                if let Some(gap) = start {
                    cleanups += cleanup_formatting_gap(txn, gap, Some(id), &start_attrs, &mut curr_attrs);
                }
                start_attrs = curr_attrs.clone();
                start = next;
            }
        }
    }
    if let Some(gap) = start {
        cleanups += cleanup_formatting_gap(txn, gap, None, &start_attrs, &mut curr_attrs);
    }
    return cleanups;
}

/// Remove redundant formatting left behind by a remote transaction.
pub(crate) fn cleanup_after_transaction(doc: &mut Doc, before: &StateVector, after: &StateVector, ds: &DeleteSet) {
    let mut full: FxHashSet<BranchPtr> = FxHashSet::default();
    for (client, after_clock) in after.iter() {
        let clock = before.get(client);
        if *after_clock == clock {
            continue;
        }
        let Some(blocks) = doc.store.blocks.get(client) else {
            continue;
        };
        let Some(mut index) = Store::find_index(blocks, clock) else {
            continue;
        };
        while index < blocks.len() && blocks[index].id().clock < *after_clock {
            if let Some(item) = blocks[index].as_item() {
                if !item.is_deleted() && matches!(item.content, ItemContent::Format { .. }) {
                    full.extend(item.parent_branch().cloned());
                }
            }
            index += 1;
        }
    }
    doc.transact(|txn| {
        for (client, runs) in ds.iter() {
            for run in runs.to_vec() {
                for id in txn.iterate_blocks(*client, run.clock, run.len) {
                    let Some(item) = txn.doc.store.get_item(&id) else {
                        continue;
                    };
                    let Some(parent) = item.parent_branch().cloned() else {
                        continue;
                    };
                    let formatted = txn.doc.store.branch(&parent).is_some_and(|b| b.has_formatting);
                    if !formatted || full.contains(&parent) {
                        continue;
                    }
                    if matches!(item.content, ItemContent::Format { .. }) {
                        full.insert(parent);
                    } else {
                        cleanup_contextless_gap(txn, id);
                    }
                }
            }
        }
        let mut parents: Vec<BranchPtr> = full.into_iter().collect();
        parents.sort();
        for parent in parents {
            cleanup_formatting(txn, &parent);
        }
    });
}
