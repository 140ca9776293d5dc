// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared XML trees.
//!
//! A fragment is a list of nodes. An element is a fragment with a tag and
//! attributes (kept in the branch's key slots). A text node is rich text
//! with attributes. A hook is a named map for custom node kinds.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::In;
use super::Out;
use super::SharedRef;
use super::list_delete;
use super::list_get;
use super::list_insert;
use super::list_values;
use super::map_delete;
use super::map_entries;
use super::map_get;
use super::map_set;
use super::map_to_json;
use super::text;
use super::text::Diff;
use super::text::TextDelta;
use crate::crdt::branch::BranchPtr;
use crate::crdt::branch::TypeRef;
use crate::crdt::store::Store;
use crate::encoding::any::Any;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::transaction::ReadTxn;
use crate::transaction::Transaction;

super::shared_ref!(XmlFragmentRef);
super::shared_ref!(XmlElementRef);
super::shared_ref!(XmlTextRef);
super::shared_ref!(XmlHookRef);

// =============================================================================
// Prelims
// =============================================================================

/// An element to insert, filled once it is integrated.
#[derive(Debug)]
pub struct XmlElementPrelim {
    pub tag: Arc<str>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<In>,
}

impl XmlElementPrelim {
    pub fn new(tag: &str) -> XmlElementPrelim {
        return XmlElementPrelim { tag: Arc::from(tag), attributes: BTreeMap::new(), children: Vec::new() };
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> XmlElementPrelim {
        self.attributes.insert(key.to_owned(), value.to_owned());
        return self;
    }

    pub fn with_child<V: Into<In>>(mut self, child: V) -> XmlElementPrelim {
        self.children.push(child.into());
        return self;
    }
}

impl From<XmlElementPrelim> for In {
    fn from(value: XmlElementPrelim) -> In {
        return In::XmlElement(value);
    }
}

#[derive(Debug, Default)]
pub struct XmlTextPrelim {
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

impl XmlTextPrelim {
    pub fn new(text: &str) -> XmlTextPrelim {
        return XmlTextPrelim { text: text.to_owned(), attributes: BTreeMap::new() };
    }
}

impl From<XmlTextPrelim> for In {
    fn from(value: XmlTextPrelim) -> In {
        return In::XmlText(value);
    }
}

#[derive(Debug)]
pub struct XmlHookPrelim {
    pub name: Arc<str>,
    pub entries: BTreeMap<String, In>,
}

impl XmlHookPrelim {
    pub fn new(name: &str) -> XmlHookPrelim {
        return XmlHookPrelim { name: Arc::from(name), entries: BTreeMap::new() };
    }
}

impl From<XmlHookPrelim> for In {
    fn from(value: XmlHookPrelim) -> In {
        return In::XmlHook(value);
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn attribute_string(value: &Any) -> String {
    return match value {
        Any::String(s) => s.to_string(),
        other => other.to_json_string(),
    };
}

/// Live attributes of a node, sorted by key.
fn attributes(store: &Store, ptr: &BranchPtr) -> Vec<(Arc<str>, Any)> {
    return map_entries(store, ptr)
        .into_iter()
        .filter_map(|(key, value)| Some((key, value.as_any()?.clone())))
        .collect();
}

fn render_children(store: &Store, ptr: &BranchPtr) -> String {
    let mut s = String::new();
    for child in list_values(store, ptr) {
        render_out(store, &child, &mut s);
    }
    return s;
}

fn render_out(store: &Store, out: &Out, s: &mut String) {
    match out {
        Out::XmlElement(r) => s.push_str(&render_element(store, r.ptr())),
        Out::XmlFragment(r) => s.push_str(&render_children(store, r.ptr())),
        Out::XmlText(r) => s.push_str(&render_text(store, r.ptr())),
        Out::Any(value) => s.push_str(&attribute_string(value)),
        _ => {}
    }
}

fn render_element(store: &Store, ptr: &BranchPtr) -> String {
    let tag = match store.branch(ptr).map(|b| b.type_ref()) {
        Some(TypeRef::XmlElement(tag)) => tag.clone(),
        _ => Arc::from("UNDEFINED"),
    };
    let mut s = format!("<{tag}");
    for (key, value) in attributes(store, ptr) {
        s.push_str(&format!(" {key}=\"{}\"", attribute_string(&value)));
    }
    s.push('>');
    s.push_str(&render_children(store, ptr));
    s.push_str(&format!("</{tag}>"));
    return s;
}

/// Each formatting attribute becomes a tag around its run. Map-valued
/// attributes become the tag's attributes.
fn render_text(store: &Store, ptr: &BranchPtr) -> String {
    let mut s = String::new();
    for diff in text::render(store, ptr, None, None) {
        let mut tags: Vec<(Arc<str>, Vec<(String, Any)>)> = Vec::new();
        for (name, value) in diff.attributes.iter().flat_map(|attrs| attrs.iter()) {
            let mut attrs: Vec<(String, Any)> = match value {
                Any::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                _ => Vec::new(),
            };
            attrs.sort_by(|a, b| a.0.cmp(&b.0));
            tags.push((name.clone(), attrs));
        }
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, attrs) in tags.iter() {
            s.push('<');
            s.push_str(name);
            for (key, value) in attrs {
                s.push_str(&format!(" {key}=\"{}\"", attribute_string(value)));
            }
            s.push('>');
        }
        render_out(store, &diff.insert, &mut s);
        for (name, _) in tags.iter().rev() {
            s.push_str(&format!("</{name}>"));
        }
    }
    return s;
}

// =============================================================================
// Tree navigation
// =============================================================================

fn parent_of<T: ReadTxn>(txn: &T, ptr: &BranchPtr) -> Option<Out> {
    let store = txn.store();
    let parent = store.parent_of(ptr)?;
    let type_ref = store.branch(&parent)?.type_ref();
    return Some(Out::from_branch(parent.clone(), type_ref));
}

fn sibling<T: ReadTxn>(txn: &T, ptr: &BranchPtr, forward: bool) -> Option<Out> {
    let BranchPtr::Nested(id) = ptr else {
        return None;
    };
    let store = txn.store();
    let mut item = store.get_item(id)?;
    loop {
        let next = if forward { item.right } else { item.left };
        item = store.get_item(&next?)?;
        if !item.is_deleted() {
            return Out::from_item(item).pop();
        }
    }
}

// =============================================================================
// Fragment
// =============================================================================

impl XmlFragmentRef {
    /// Number of child nodes.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.ptr()).map(|b| b.block_len).unwrap_or(0);
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    pub fn insert<V: Into<In>>(&self, txn: &mut Transaction<'_>, index: u32, node: V) -> Result<()> {
        return list_insert(txn, self.ptr(), index, vec![node.into()]);
    }

    pub fn push_back<V: Into<In>>(&self, txn: &mut Transaction<'_>, node: V) -> Result<()> {
        let len = self.len(txn);
        return self.insert(txn, len, node);
    }

    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        return list_delete(txn, self.ptr(), index, len);
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<Out> {
        return list_get(txn.store(), self.ptr(), index);
    }

    pub fn first_child<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return self.get(txn, 0);
    }

    pub fn children<T: ReadTxn>(&self, txn: &T) -> std::vec::IntoIter<Out> {
        return list_values(txn.store(), self.ptr()).into_iter();
    }

    /// Concatenated markup of every child.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return render_children(txn.store(), self.ptr());
    }
}

// =============================================================================
// Element
// =============================================================================

impl XmlElementRef {
    pub fn tag<T: ReadTxn>(&self, txn: &T) -> Option<Arc<str>> {
        return match txn.store().branch(self.ptr())?.type_ref() {
            TypeRef::XmlElement(tag) => Some(tag.clone()),
            _ => None,
        };
    }

    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.ptr()).map(|b| b.block_len).unwrap_or(0);
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    pub fn insert<V: Into<In>>(&self, txn: &mut Transaction<'_>, index: u32, node: V) -> Result<()> {
        return list_insert(txn, self.ptr(), index, vec![node.into()]);
    }

    pub fn push_back<V: Into<In>>(&self, txn: &mut Transaction<'_>, node: V) -> Result<()> {
        let len = self.len(txn);
        return self.insert(txn, len, node);
    }

    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        return list_delete(txn, self.ptr(), index, len);
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<Out> {
        return list_get(txn.store(), self.ptr(), index);
    }

    pub fn first_child<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return self.get(txn, 0);
    }

    pub fn children<T: ReadTxn>(&self, txn: &T) -> std::vec::IntoIter<Out> {
        return list_values(txn.store(), self.ptr()).into_iter();
    }

    pub fn insert_attribute<V: Into<Any>>(&self, txn: &mut Transaction<'_>, key: &str, value: V) {
        map_set(txn, self.ptr(), Arc::from(key), In::Any(value.into()));
    }

    pub fn get_attribute<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<Any> {
        return map_get(txn.store(), self.ptr(), key)?.as_any().cloned();
    }

    pub fn remove_attribute(&self, txn: &mut Transaction<'_>, key: &str) {
        map_delete(txn, self.ptr(), key);
    }

    /// Attributes, sorted by key.
    pub fn attributes<T: ReadTxn>(&self, txn: &T) -> Vec<(Arc<str>, Any)> {
        return attributes(txn.store(), self.ptr());
    }

    pub fn parent<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return parent_of(txn, self.ptr());
    }

    pub fn next_sibling<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return sibling(txn, self.ptr(), true);
    }

    pub fn prev_sibling<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return sibling(txn, self.ptr(), false);
    }

    /// `<tag key="value">children</tag>`, attributes sorted by key.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return render_element(txn.store(), self.ptr());
    }
}

// =============================================================================
// Text
// =============================================================================

impl XmlTextRef {
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.ptr()).map(|b| b.block_len).unwrap_or(0);
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    pub fn insert(&self, txn: &mut Transaction<'_>, index: u32, chunk: &str) -> Result<()> {
        return text::insert(txn, self.ptr(), index, chunk, None);
    }

    pub fn insert_with_attributes(
        &self,
        txn: &mut Transaction<'_>,
        index: u32,
        chunk: &str,
        attributes: super::Attrs,
    ) -> Result<()> {
        return text::insert(txn, self.ptr(), index, chunk, Some(attributes));
    }

    pub fn insert_embed<V: Into<In>>(
        &self,
        txn: &mut Transaction<'_>,
        index: u32,
        embed: V,
        attributes: Option<super::Attrs>,
    ) -> Result<()> {
        return text::insert_embed(txn, self.ptr(), index, embed.into(), attributes);
    }

    pub fn remove_range(&self, txn: &mut Transaction<'_>, index: u32, len: u32) -> Result<()> {
        return text::remove(txn, self.ptr(), index, len);
    }

    pub fn format(&self, txn: &mut Transaction<'_>, index: u32, len: u32, attributes: super::Attrs) -> Result<()> {
        return text::format(txn, self.ptr(), index, len, attributes);
    }

    pub fn to_delta<T: ReadTxn>(&self, txn: &T) -> Vec<Diff> {
        return text::render(txn.store(), self.ptr(), None, None);
    }

    pub fn diff(&self, txn: &mut Transaction<'_>, hi: Option<&Snapshot>, lo: Option<&Snapshot>) -> Vec<Diff> {
        for snapshot in [hi, lo].into_iter().flatten() {
            text::split_for_snapshot(txn, snapshot);
        }
        return text::render(&txn.doc.store, self.ptr(), hi, lo);
    }

    pub fn apply_delta(&self, txn: &mut Transaction<'_>, delta: Vec<TextDelta>) -> Result<()> {
        return text::apply_delta(txn, self.ptr(), delta);
    }

    pub fn insert_attribute<V: Into<Any>>(&self, txn: &mut Transaction<'_>, key: &str, value: V) {
        map_set(txn, self.ptr(), Arc::from(key), In::Any(value.into()));
    }

    pub fn get_attribute<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<Any> {
        return map_get(txn.store(), self.ptr(), key)?.as_any().cloned();
    }

    pub fn remove_attribute(&self, txn: &mut Transaction<'_>, key: &str) {
        map_delete(txn, self.ptr(), key);
    }

    pub fn attributes<T: ReadTxn>(&self, txn: &T) -> Vec<(Arc<str>, Any)> {
        return attributes(txn.store(), self.ptr());
    }

    pub fn parent<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return parent_of(txn, self.ptr());
    }

    pub fn next_sibling<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return sibling(txn, self.ptr(), true);
    }

    pub fn prev_sibling<T: ReadTxn>(&self, txn: &T) -> Option<Out> {
        return sibling(txn, self.ptr(), false);
    }

    /// The text with formatting rendered as nested tags, sorted by name.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return render_text(txn.store(), self.ptr());
    }
}

// =============================================================================
// Hook
// =============================================================================

impl XmlHookRef {
    pub fn name<T: ReadTxn>(&self, txn: &T) -> Option<Arc<str>> {
        return match txn.store().branch(self.ptr())?.type_ref() {
            TypeRef::XmlHook(name) => Some(name.clone()),
            _ => None,
        };
    }

    pub fn insert<V: Into<In>>(&self, txn: &mut Transaction<'_>, key: &str, value: V) {
        map_set(txn, self.ptr(), Arc::from(key), value.into());
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<Out> {
        return map_get(txn.store(), self.ptr(), key);
    }

    pub fn remove(&self, txn: &mut Transaction<'_>, key: &str) -> bool {
        return map_delete(txn, self.ptr(), key);
    }

    pub fn keys<T: ReadTxn>(&self, txn: &T) -> Vec<Arc<str>> {
        return map_entries(txn.store(), self.ptr()).into_iter().map(|(key, _)| key).collect();
    }

    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        return map_to_json(txn, self.ptr());
    }
}
