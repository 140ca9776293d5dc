// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Branches: the shared types that own item lists and key slots.
//!
//! A branch is either a root type, registered under a name on the
//! document, or nested inside an item whose content is a type. Items name
//! their branch through a [`BranchPtr`] handle, resolved through the
//! store.
//!
//! # Search markers
//!
//! Index lookups walk the item list from the start. To make repeated
//! lookups near the same position cheap, a list branch caches up to
//! [`MAX_SEARCH_MARKERS`] `(item, index)` pairs. When the cache is full the
//! least recently used marker is overwritten. Markers are shifted on local
//! inserts and deletes and dropped entirely after remote changes.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::primitives::ID;
use crate::error::Error;
use crate::error::Result;
use crate::update::codec::Decoder;
use crate::update::codec::Encoder;

/// Maximum number of cached positions per branch.
pub const MAX_SEARCH_MARKERS: usize = 80;

// =============================================================================
// Type refs
// =============================================================================

pub const TYPE_REF_ARRAY: u8 = 0;
pub const TYPE_REF_MAP: u8 = 1;
pub const TYPE_REF_TEXT: u8 = 2;
pub const TYPE_REF_XML_ELEMENT: u8 = 3;
pub const TYPE_REF_XML_FRAGMENT: u8 = 4;
pub const TYPE_REF_XML_HOOK: u8 = 5;
pub const TYPE_REF_XML_TEXT: u8 = 6;

/// The kind of a shared type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Array,
    Map,
    Text,
    XmlElement(Arc<str>),
    XmlFragment,
    XmlHook(Arc<str>),
    XmlText,
    /// A root type referenced by a remote update before it was requested
    /// locally with a concrete kind.
    Undefined,
}

impl TypeRef {
    pub fn tag(&self) -> u8 {
        return match self {
            TypeRef::Array => TYPE_REF_ARRAY,
            TypeRef::Map => TYPE_REF_MAP,
            TypeRef::Text => TYPE_REF_TEXT,
            TypeRef::XmlElement(_) => TYPE_REF_XML_ELEMENT,
            TypeRef::XmlFragment => TYPE_REF_XML_FRAGMENT,
            TypeRef::XmlHook(_) => TYPE_REF_XML_HOOK,
            TypeRef::XmlText => TYPE_REF_XML_TEXT,
            TypeRef::Undefined => u8::MAX,
        };
    }

    /// Whether branches of this kind keep an ordered child list.
    pub fn is_sequence(&self) -> bool {
        return !matches!(self, TypeRef::Map | TypeRef::XmlHook(_));
    }

    pub fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_type_ref(self.tag());
        match self {
            TypeRef::XmlElement(name) | TypeRef::XmlHook(name) => encoder.write_key(name),
            _ => {}
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<TypeRef> {
        let tag = decoder.read_type_ref()?;
        return match tag {
            TYPE_REF_ARRAY => Ok(TypeRef::Array),
            TYPE_REF_MAP => Ok(TypeRef::Map),
            TYPE_REF_TEXT => Ok(TypeRef::Text),
            TYPE_REF_XML_ELEMENT => Ok(TypeRef::XmlElement(decoder.read_key()?)),
            TYPE_REF_XML_FRAGMENT => Ok(TypeRef::XmlFragment),
            TYPE_REF_XML_HOOK => Ok(TypeRef::XmlHook(decoder.read_key()?)),
            TYPE_REF_XML_TEXT => Ok(TypeRef::XmlText),
            other => Err(Error::UnexpectedTag { kind: "type ref", tag: other as u32 }),
        };
    }
}

// =============================================================================
// Branch handles
// =============================================================================

/// A handle naming a branch: a root type by name, or a nested type by the
/// id of the item that holds it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BranchPtr {
    Root(Arc<str>),
    Nested(ID),
}

impl BranchPtr {
    pub fn root(name: &str) -> BranchPtr {
        return BranchPtr::Root(Arc::from(name));
    }
}

impl fmt::Debug for BranchPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            BranchPtr::Root(name) => write!(f, "root({name})"),
            BranchPtr::Nested(id) => write!(f, "nested({id})"),
        };
    }
}

// =============================================================================
// Search markers
// =============================================================================

/// A cached `(item, index)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchMarker {
    /// Start of a countable item.
    pub item: ID,
    /// Number of visible units before `item`.
    pub index: u32,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SearchMarkers {
    pub(crate) markers: Vec<SearchMarker>,
    clock: u64,
}

impl SearchMarkers {
    pub fn new() -> SearchMarkers {
        return SearchMarkers::default();
    }

    pub fn is_empty(&self) -> bool {
        return self.markers.is_empty();
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub(crate) fn tick(&mut self) -> u64 {
        self.clock += 1;
        return self.clock;
    }

    /// The marker closest to `index`.
    pub(crate) fn closest(&self, index: u32) -> Option<usize> {
        return self
            .markers
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| m.index.abs_diff(index))
            .map(|(i, _)| i);
    }

    pub(crate) fn refresh(&mut self, slot: usize) {
        let ts = self.tick();
        self.markers[slot].timestamp = ts;
    }

    /// Point a marker somewhere else, returning the item it used to mark.
    pub(crate) fn overwrite(&mut self, slot: usize, item: ID, index: u32) -> ID {
        let timestamp = self.tick();
        let old = self.markers[slot].item;
        self.markers[slot] = SearchMarker { item, index, timestamp };
        return old;
    }

    /// Record a new position, evicting the oldest marker when full. Returns
    /// the slot and the item of the evicted marker, if any.
    pub(crate) fn mark(&mut self, item: ID, index: u32) -> (usize, Option<ID>) {
        if self.markers.len() >= MAX_SEARCH_MARKERS {
            let oldest = self
                .markers
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| m.timestamp)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let evicted = self.overwrite(oldest, item, index);
            return (oldest, Some(evicted));
        }
        let timestamp = self.tick();
        self.markers.push(SearchMarker { item, index, timestamp });
        return (self.markers.len() - 1, None);
    }

    /// Redirect markers after `right` was merged into `left`.
    pub(crate) fn replace_item(&mut self, right: ID, left: ID, shift: u32) {
        for marker in self.markers.iter_mut() {
            if marker.item == right {
                marker.item = left;
                marker.index -= shift;
            }
        }
    }
}

// =============================================================================
// Branch
// =============================================================================

/// The state of one shared type.
#[derive(Clone, Debug)]
pub struct Branch {
    pub(crate) type_ref: TypeRef,
    /// First item of the child list.
    pub(crate) start: Option<ID>,
    /// Current (rightmost) item of every key slot.
    pub(crate) map: FxHashMap<Arc<str>, ID>,
    /// The item holding this branch; `None` for root types.
    pub(crate) item: Option<ID>,
    /// Name of a root type.
    pub(crate) name: Option<Arc<str>>,
    /// Number of visible units in the child list.
    pub(crate) block_len: u32,
    pub(crate) markers: Option<SearchMarkers>,
    pub(crate) has_formatting: bool,
}

impl Branch {
    pub fn new(type_ref: TypeRef) -> Branch {
        let markers = if type_ref.is_sequence() { Some(SearchMarkers::new()) } else { None };
        return Branch {
            type_ref,
            start: None,
            map: FxHashMap::default(),
            item: None,
            name: None,
            block_len: 0,
            markers,
            has_formatting: false,
        };
    }

    pub fn root(name: Arc<str>, type_ref: TypeRef) -> Branch {
        let mut branch = Branch::new(type_ref);
        branch.name = Some(name);
        return branch;
    }

    pub fn nested(item: ID, type_ref: TypeRef) -> Branch {
        let mut branch = Branch::new(type_ref);
        branch.item = Some(item);
        return branch;
    }

    pub fn type_ref(&self) -> &TypeRef {
        return &self.type_ref;
    }

    /// Visible length of the child list.
    pub fn len(&self) -> u32 {
        return self.block_len;
    }

    pub fn is_empty(&self) -> bool {
        return self.block_len == 0;
    }

    /// Handle of this branch.
    pub fn ptr(&self) -> BranchPtr {
        return match (&self.item, &self.name) {
            (Some(id), _) => BranchPtr::Nested(*id),
            (None, Some(name)) => BranchPtr::Root(name.clone()),
            (None, None) => unreachable!("branch without item or name"),
        };
    }

    /// Give an untyped root its concrete kind.
    pub(crate) fn repair_type_ref(&mut self, type_ref: TypeRef) {
        if self.type_ref == TypeRef::Undefined {
            if type_ref.is_sequence() && self.markers.is_none() {
                self.markers = Some(SearchMarkers::new());
            }
            self.type_ref = type_ref;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_evict_oldest() {
        let mut markers = SearchMarkers::new();
        for i in 0..MAX_SEARCH_MARKERS as u32 {
            markers.mark(ID::new(1, i), i);
        }
        markers.refresh(0);
        let (slot, evicted) = markers.mark(ID::new(2, 0), 500);
        assert_eq!(slot, 1); // slot 0 was refreshed
        assert_eq!(evicted, Some(ID::new(1, 1)));
        assert_eq!(markers.markers.len(), MAX_SEARCH_MARKERS);
        assert_eq!(markers.closest(499), Some(1));
    }

    #[test]
    fn untyped_root_takes_first_kind() {
        let mut branch = Branch::root(Arc::from("doc"), TypeRef::Undefined);
        branch.repair_type_ref(TypeRef::Text);
        branch.repair_type_ref(TypeRef::Map);
        assert_eq!(branch.type_ref(), &TypeRef::Text);
        assert!(branch.markers.is_some());
    }
}
