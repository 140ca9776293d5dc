// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! The document: a struct store, its root types and its subscribers.
//!
//! All reads go through [`ReadTxn`](crate::transaction::ReadTxn), which a
//! [`Doc`] implements directly.
//! All writes go through [`Doc::transact`]. When the outermost transaction
//! returns, its state is queued and the queue is drained: every queued
//! transaction fires its events, runs garbage collection and emits its
//! update before the next one starts. Transactions opened by callbacks
//! during that drain join the queue instead of nesting.

use std::collections::VecDeque;
use std::fmt;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use rand_core::OsRng;
use rand_core::RngCore;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::crdt::block::Item;
use crate::crdt::branch::BranchPtr;
use crate::crdt::branch::TypeRef;
use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::encoding::any::Any;
use crate::error::Result;
use crate::event::Callback;
use crate::event::DocEvents;
use crate::event::Event;
use crate::event::SubdocsEvent;
use crate::event::Subscription;
use crate::event::TypeObservers;
use crate::event::UpdateEvent;
use crate::event::compute_event;
use crate::event::path_to;
use crate::transaction::Origin;
use crate::transaction::Transaction;
use crate::transaction::TransactionEvent;
use crate::transaction::TransactionState;
use crate::types::ArrayRef;
use crate::types::MapRef;
use crate::types::Out;
use crate::types::SharedRef;
use crate::types::TextRef;
use crate::types::XmlFragmentRef;
use crate::types::text;
use crate::update::Update;
use crate::update::codec::Encoder;
use crate::update::codec::EncoderV1;
use crate::update::codec::EncoderV2;

/// A random client id.
pub(crate) fn random_client_id() -> ClientId {
    return OsRng.next_u32();
}

// =============================================================================
// Options
// =============================================================================

/// Configuration of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Replica id stamped on every block this document creates.
    pub client_id: ClientId,
    pub guid: Arc<str>,
    pub collection_id: Option<Arc<str>>,
    /// Collect the content of deleted items on commit.
    pub gc: bool,
    /// Load a sub-document as soon as its parent integrates it.
    pub auto_load: bool,
    pub should_load: bool,
    pub meta: Option<Any>,
}

impl Default for Options {
    fn default() -> Options {
        return Options {
            client_id: random_client_id(),
            guid: Arc::from(uuid::Uuid::new_v4().to_string()),
            collection_id: None,
            gc: true,
            auto_load: false,
            should_load: true,
            meta: None,
        };
    }
}

impl Options {
    pub fn with_client_id(client_id: ClientId) -> Options {
        return Options { client_id, ..Options::default() };
    }
}

// =============================================================================
// Doc
// =============================================================================

type GcFilter = Box<dyn Fn(&Item) -> bool>;

pub struct Doc {
    client_id: ClientId,
    options: Options,
    pub(crate) store: Store,
    events: DocEvents,
    observers: FxHashMap<BranchPtr, TypeObservers>,
    cleanups: VecDeque<TransactionState>,
    cleaning: bool,
    pub(crate) subdocs: FxHashMap<Arc<str>, Doc>,
    gc_filter: Option<GcFilter>,
    next_subscription: u32,
    /// First panic raised by a callback during the current drain.
    panic: Option<Box<dyn std::any::Any + Send>>,
}

impl fmt::Debug for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Doc")
            .field("client_id", &self.client_id)
            .field("guid", &self.options.guid)
            .field("store", &self.store)
            .field("subdocs", &self.subdocs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive();
    }
}

impl Default for Doc {
    fn default() -> Doc {
        return Doc::new();
    }
}

macro_rules! emit {
    ($doc:expr, $field:ident, $event:expr) => {{
        if !$doc.events.$field.is_empty() {
            let mut taken = $doc.events.$field.take();
            $doc.dispatch(&mut taken, $event);
            $doc.events.$field.restore(taken);
        }
    }};
}

impl Doc {
    pub fn new() -> Doc {
        return Doc::with_options(Options::default());
    }

    pub fn with_client_id(client_id: ClientId) -> Doc {
        return Doc::with_options(Options::with_client_id(client_id));
    }

    pub fn with_options(options: Options) -> Doc {
        return Doc {
            client_id: options.client_id,
            options,
            store: Store::new(),
            events: DocEvents::default(),
            observers: FxHashMap::default(),
            cleanups: VecDeque::new(),
            cleaning: false,
            subdocs: FxHashMap::default(),
            gc_filter: None,
            next_subscription: 0,
            panic: None,
        };
    }

    /// Rebuild a sub-document from the options carried by its content.
    pub(crate) fn from_content_opts(guid: Arc<str>, opts: &Any) -> Doc {
        let mut options = Options { guid, ..Options::default() };
        if let Any::Map(map) = opts {
            options.gc = !matches!(map.get("gc"), Some(Any::Bool(false)));
            options.auto_load = matches!(map.get("autoLoad"), Some(Any::Bool(true)));
            options.meta = map.get("meta").cloned();
        }
        options.should_load = options.auto_load;
        return Doc::with_options(options);
    }

    /// Options a parent stores alongside this document's guid.
    pub(crate) fn content_opts(&self) -> Any {
        let mut entries: Vec<(&str, Any)> = Vec::new();
        if !self.options.gc {
            entries.push(("gc", Any::Bool(false)));
        }
        if self.options.auto_load {
            entries.push(("autoLoad", Any::Bool(true)));
        }
        if let Some(meta) = &self.options.meta {
            entries.push(("meta", meta.clone()));
        }
        return Any::map(entries);
    }

    pub fn client_id(&self) -> ClientId {
        return self.client_id;
    }

    pub fn guid(&self) -> Arc<str> {
        return self.options.guid.clone();
    }

    pub fn options(&self) -> &Options {
        return &self.options;
    }

    pub fn should_load(&self) -> bool {
        return self.options.should_load;
    }

    /// Restrict which deleted items garbage collection may collect.
    pub fn set_gc_filter<F>(&mut self, filter: F)
    where
        F: Fn(&Item) -> bool + 'static,
    {
        self.gc_filter = Some(Box::new(filter));
    }

    // =========================================================================
    // Root types
    // =========================================================================

    pub fn get_or_insert_array(&mut self, name: &str) -> ArrayRef {
        return ArrayRef::from_ptr(self.store.get_or_create_root(name, TypeRef::Array));
    }

    pub fn get_or_insert_map(&mut self, name: &str) -> MapRef {
        return MapRef::from_ptr(self.store.get_or_create_root(name, TypeRef::Map));
    }

    pub fn get_or_insert_text(&mut self, name: &str) -> TextRef {
        return TextRef::from_ptr(self.store.get_or_create_root(name, TypeRef::Text));
    }

    pub fn get_or_insert_xml_fragment(&mut self, name: &str) -> XmlFragmentRef {
        return XmlFragmentRef::from_ptr(self.store.get_or_create_root(name, TypeRef::XmlFragment));
    }

    /// Every root type with a known kind, rendered as plain values.
    pub fn to_json(&self) -> Any {
        let mut entries = Vec::new();
        for name in self.store.root_names() {
            let ptr = BranchPtr::Root(name.clone());
            let Some(branch) = self.store.branch(&ptr) else {
                continue;
            };
            if *branch.type_ref() == TypeRef::Undefined {
                continue;
            }
            let out = Out::from_branch(ptr, branch.type_ref());
            entries.push((name.to_string(), out.to_json(self)));
        }
        return Any::map(entries);
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` inside a local transaction.
    pub fn transact<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Transaction<'_>) -> R,
    {
        return self.transact_inner(None, true, f);
    }

    /// Run `f` inside a local transaction tagged with `origin`.
    pub fn transact_with<F, R>(&mut self, origin: impl Into<Origin>, f: F) -> R
    where
        F: FnOnce(&mut Transaction<'_>) -> R,
    {
        return self.transact_inner(Some(origin.into()), true, f);
    }

    pub(crate) fn transact_inner<F, R>(&mut self, origin: Option<Origin>, local: bool, f: F) -> R
    where
        F: FnOnce(&mut Transaction<'_>) -> R,
    {
        let outermost = !self.cleaning;
        if outermost {
            emit!(self, before_all_transactions, &());
        }
        let state = TransactionState::new(self.store.state_vector(), origin, local);
        if !self.events.before_transaction.is_empty() {
            let event = TransactionEvent::new(&state, Vec::new());
            emit!(self, before_transaction, &event);
        }
        let mut txn = Transaction::new(self, state);
        let result = f(&mut txn);
        let state = txn.state;
        self.cleanups.push_back(state);
        if outermost {
            self.cleaning = true;
            while let Some(state) = self.cleanups.pop_front() {
                self.cleanup(state);
            }
            self.cleaning = false;
            emit!(self, after_all_transactions, &());
            if let Some(payload) = self.panic.take() {
                panic::resume_unwind(payload);
            }
        }
        return result;
    }

    /// Call every callback, recording the first panic instead of unwinding
    /// through the cleanup.
    fn dispatch<E: ?Sized>(&mut self, callbacks: &mut [(Subscription, Callback<E>)], event: &E) {
        for (_, callback) in callbacks.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(self, event)));
            if let Err(payload) = result {
                if self.panic.is_none() {
                    self.panic = Some(payload);
                }
            }
        }
    }

    fn cleanup(&mut self, mut state: TransactionState) {
        state.delete_set.squash();
        state.after_state = self.store.state_vector();
        debug!(local = state.local, changed = state.changed.len(), "cleaning up transaction");

        let mut targets: Vec<BranchPtr> = state.changed.keys().cloned().collect();
        targets.sort();
        let mut events = Vec::new();
        for ptr in targets {
            if self.store.is_branch_deleted(&ptr) {
                continue;
            }
            if let Some(branch) = self.store.branch_mut(&ptr) {
                if !state.local {
                    if let Some(markers) = branch.markers.as_mut() {
                        markers.clear();
                    }
                    let is_text = matches!(branch.type_ref(), TypeRef::Text | TypeRef::XmlText);
                    if is_text && branch.has_formatting {
                        state.need_formatting_cleanup = true;
                    }
                }
            }
            if let Some(event) = compute_event(&self.store, &state, &ptr, &state.changed[&ptr]) {
                events.push(event);
            }
        }

        for event in &events {
            self.emit_shallow(event);
        }
        let changed_parents = self.emit_deep(&events);

        if !self.events.after_transaction.is_empty() {
            let event = TransactionEvent::new(&state, changed_parents);
            emit!(self, after_transaction, &event);
        }

        if state.need_formatting_cleanup {
            text::cleanup_after_transaction(self, &state.before_state, &state.after_state, &state.delete_set);
        }

        if self.options.gc {
            self.store.gc_delete_set(&state.delete_set, self.gc_filter.as_deref());
        }
        self.store.merge_delete_set(&state.delete_set);
        self.store.merge_since(&state.before_state, &state.after_state);
        self.store.merge_split_blocks(&state.merge_blocks);

        if !state.local && state.after_state.get(&self.client_id) != state.before_state.get(&self.client_id) {
            let previous = self.client_id;
            self.client_id = random_client_id();
            self.options.client_id = self.client_id;
            warn!(previous, next = self.client_id, "remote update used our client id, regenerating");
        }

        if !self.events.after_transaction_cleanup.is_empty() {
            let event = TransactionEvent::new(&state, Vec::new());
            emit!(self, after_transaction_cleanup, &event);
        }

        if state.has_changes() {
            if !self.events.update_v1.is_empty() {
                let mut encoder = EncoderV1::new();
                state.encode_update(&self.store, &mut encoder);
                let event = UpdateEvent { update: encoder.to_vec(), origin: state.origin.clone() };
                emit!(self, update_v1, &event);
            }
            if !self.events.update_v2.is_empty() {
                let mut encoder = EncoderV2::new();
                state.encode_update(&self.store, &mut encoder);
                let event = UpdateEvent { update: encoder.to_vec(), origin: state.origin.clone() };
                emit!(self, update_v2, &event);
            }
        }

        self.finish_subdocs(&state);
    }

    fn emit_shallow(&mut self, event: &Event) {
        let Some(observers) = self.observers.get_mut(&event.target) else {
            return;
        };
        if observers.shallow.is_empty() {
            return;
        }
        let mut taken = observers.shallow.take();
        self.dispatch(&mut taken, event);
        self.observers.entry(event.target.clone()).or_default().shallow.restore(taken);
    }

    /// Hand every event to the deep observers of its target and of all the
    /// target's ancestors. Returns every type that changed, ancestors
    /// included.
    fn emit_deep(&mut self, events: &[Event]) -> Vec<BranchPtr> {
        let mut changed: Vec<BranchPtr> = Vec::new();
        let mut per_observer: FxHashMap<BranchPtr, Vec<Event>> = FxHashMap::default();
        for event in events {
            let mut current = Some(event.target.clone());
            while let Some(ptr) = current {
                let observed = self.observers.get(&ptr).is_some_and(|o| !o.deep.is_empty());
                if observed {
                    let mut scoped = event.clone();
                    scoped.path = path_to(&self.store, &ptr, &event.target);
                    per_observer.entry(ptr.clone()).or_default().push(scoped);
                }
                current = self.store.parent_of(&ptr);
                changed.push(ptr);
            }
        }
        changed.sort();
        changed.dedup();

        let mut observed: Vec<BranchPtr> = per_observer.keys().cloned().collect();
        observed.sort();
        for ptr in observed {
            let Some(mut batch) = per_observer.remove(&ptr) else {
                continue;
            };
            batch.sort_by_key(|event| event.path.len());
            let Some(observers) = self.observers.get_mut(&ptr) else {
                continue;
            };
            let mut taken = observers.deep.take();
            self.dispatch(&mut taken, batch.as_slice());
            self.observers.entry(ptr).or_default().deep.restore(taken);
        }
        return changed;
    }

    fn finish_subdocs(&mut self, state: &TransactionState) {
        if state.subdocs_added.is_empty() && state.subdocs_removed.is_empty() && state.subdocs_loaded.is_empty() {
            return;
        }
        for guid in &state.subdocs_loaded {
            if let Some(subdoc) = self.subdocs.get_mut(guid) {
                subdoc.options.should_load = true;
            }
        }
        let sorted = |set: &FxHashSet<Arc<str>>| {
            let mut guids: Vec<Arc<str>> = set.iter().cloned().collect();
            guids.sort();
            return guids;
        };
        let event = SubdocsEvent {
            added: sorted(&state.subdocs_added),
            removed: sorted(&state.subdocs_removed),
            loaded: sorted(&state.subdocs_loaded),
        };
        emit!(self, subdocs, &event);
        for guid in &event.removed {
            if let Some(mut subdoc) = self.subdocs.remove(guid) {
                subdoc.destroy();
            }
        }
    }

    // =========================================================================
    // Sub-documents
    // =========================================================================

    /// Guids of every sub-document currently embedded, sorted.
    pub fn subdoc_guids(&self) -> Vec<Arc<str>> {
        let mut guids: Vec<Arc<str>> = self.subdocs.keys().cloned().collect();
        guids.sort();
        return guids;
    }

    pub fn subdoc(&self, guid: &str) -> Option<&Doc> {
        return self.subdocs.get(guid);
    }

    pub fn subdoc_mut(&mut self, guid: &str) -> Option<&mut Doc> {
        return self.subdocs.get_mut(guid);
    }

    /// Request that a sub-document be loaded. Reported in the next
    /// `subdocs` event.
    pub fn load_subdoc(&mut self, guid: &str) -> bool {
        let Some(subdoc) = self.subdocs.get(guid) else {
            return false;
        };
        if subdoc.should_load() {
            return true;
        }
        let guid = subdoc.guid();
        self.transact(|txn| {
            txn.state.subdocs_loaded.insert(guid);
        });
        return true;
    }

    /// Destroy every sub-document and notify `destroy` subscribers.
    pub fn destroy(&mut self) {
        let guids = self.subdoc_guids();
        for guid in guids {
            if let Some(mut subdoc) = self.subdocs.remove(&guid) {
                subdoc.destroy();
            }
        }
        emit!(self, destroy, &());
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    fn next_subscription(&mut self) -> Subscription {
        self.next_subscription += 1;
        return Subscription(self.next_subscription);
    }

    pub(crate) fn observe_type<F>(&mut self, ptr: BranchPtr, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &Event) + 'static,
    {
        let id = self.next_subscription();
        self.observers.entry(ptr).or_default().shallow.subscribe(id, Box::new(f));
        return id;
    }

    pub(crate) fn observe_type_deep<F>(&mut self, ptr: BranchPtr, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &[Event]) + 'static,
    {
        let id = self.next_subscription();
        self.observers.entry(ptr).or_default().deep.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_update_v1<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &UpdateEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.update_v1.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_update_v2<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &UpdateEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.update_v2.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_before_transaction<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &TransactionEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.before_transaction.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_after_transaction<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &TransactionEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.after_transaction.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_transaction_cleanup<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &TransactionEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.after_transaction_cleanup.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_before_all_transactions<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &()) + 'static,
    {
        let id = self.next_subscription();
        self.events.before_all_transactions.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_after_all_transactions<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &()) + 'static,
    {
        let id = self.next_subscription();
        self.events.after_all_transactions.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_subdocs<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &SubdocsEvent) + 'static,
    {
        let id = self.next_subscription();
        self.events.subdocs.subscribe(id, Box::new(f));
        return id;
    }

    pub fn observe_destroy<F>(&mut self, f: F) -> Subscription
    where
        F: FnMut(&mut Doc, &()) + 'static,
    {
        let id = self.next_subscription();
        self.events.destroy.subscribe(id, Box::new(f));
        return id;
    }

    /// Remove a subscription of any kind. Returns false if it was unknown.
    pub fn unobserve(&mut self, subscription: Subscription) -> bool {
        let mut found = self.events.unsubscribe(subscription);
        for observers in self.observers.values_mut() {
            found |= observers.shallow.unsubscribe(subscription);
            found |= observers.deep.unsubscribe(subscription);
        }
        return found;
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Apply a V1 update. Nothing is touched if the update fails to decode.
    pub fn apply_update_v1(&mut self, update: &[u8]) -> Result<()> {
        let update = Update::decode_v1(update)?;
        self.apply_update(update, None);
        return Ok(());
    }

    /// Apply a V2 update. Nothing is touched if the update fails to decode.
    pub fn apply_update_v2(&mut self, update: &[u8]) -> Result<()> {
        let update = Update::decode_v2(update)?;
        self.apply_update(update, None);
        return Ok(());
    }

    /// Apply a decoded update in a remote transaction.
    pub fn apply_update(&mut self, update: Update, origin: Option<Origin>) {
        self.transact_inner(origin, false, |txn| txn.apply_update(update));
    }

    pub fn state_vector(&self) -> StateVector {
        return self.store.state_vector();
    }

    pub fn encode_state_vector(&self) -> Vec<u8> {
        return self.store.state_vector().encode();
    }

    /// Whether some received blocks or deletions wait on missing updates.
    pub fn has_pending(&self) -> bool {
        return self.store.has_pending();
    }

    /// Everything the holder of `sv` is missing, V1.
    pub fn encode_state_as_update_v1(&self, sv: &StateVector) -> Vec<u8> {
        return Update::from_store(&self.store, sv).encode_v1();
    }

    /// Everything the holder of `sv` is missing, V2.
    pub fn encode_state_as_update_v2(&self, sv: &StateVector) -> Vec<u8> {
        return Update::from_store(&self.store, sv).encode_v2();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::crdt::content::ItemContent;
    use crate::crdt::primitives::ID;

    #[test]
    fn committed_deletes_are_collected() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
        doc.transact(|txn| text.remove_range(txn, 1, 1).unwrap());
        let item = doc.store.get_item(&ID::new(1, 1)).unwrap();
        assert_eq!(item.content, ItemContent::Deleted(1));
        assert_eq!(text.get_string(&doc), "ac");
    }

    #[test]
    fn disabled_gc_keeps_content() {
        let mut doc = Doc::with_options(Options { gc: false, ..Options::with_client_id(1) });
        let text = doc.get_or_insert_text("t");
        doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
        doc.transact(|txn| text.remove_range(txn, 1, 1).unwrap());
        let item = doc.store.get_item(&ID::new(1, 1)).unwrap();
        assert_eq!(item.content, ItemContent::String("b".into()));
        assert!(item.is_deleted());
    }

    #[test]
    fn gc_filter_protects_items() {
        let mut doc = Doc::with_client_id(1);
        doc.set_gc_filter(|_| false);
        let text = doc.get_or_insert_text("t");
        doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
        doc.transact(|txn| text.remove_range(txn, 0, 3).unwrap());
        let item = doc.store.get_item(&ID::new(1, 0)).unwrap();
        assert_eq!(item.content, ItemContent::String("abc".into()));
    }

    #[test]
    fn lifecycle_events_fire_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut doc = Doc::with_client_id(1);
        let l = log.clone();
        doc.observe_before_all_transactions(move |_, _| l.borrow_mut().push("before_all"));
        let l = log.clone();
        doc.observe_before_transaction(move |_, _| l.borrow_mut().push("before"));
        let l = log.clone();
        doc.observe_after_transaction(move |_, _| l.borrow_mut().push("after"));
        let l = log.clone();
        doc.observe_transaction_cleanup(move |_, _| l.borrow_mut().push("cleanup"));
        let l = log.clone();
        doc.observe_update_v1(move |_, _| l.borrow_mut().push("update"));
        let l = log.clone();
        doc.observe_after_all_transactions(move |_, _| l.borrow_mut().push("after_all"));
        let array = doc.get_or_insert_array("a");
        doc.transact(|txn| array.push_back(txn, 1).unwrap());
        assert_eq!(
            *log.borrow(),
            vec!["before_all", "before", "after", "cleanup", "update", "after_all"]
        );
    }

    #[test]
    fn empty_transactions_emit_no_update() {
        let count = Rc::new(RefCell::new(0));
        let mut doc = Doc::with_client_id(1);
        let c = count.clone();
        doc.observe_update_v1(move |_, _| *c.borrow_mut() += 1);
        doc.transact(|_| ());
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn update_events_replay_on_a_peer() {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let mut a = Doc::with_client_id(1);
        let u = updates.clone();
        a.observe_update_v2(move |_, e| u.borrow_mut().push(e.update.clone()));
        let map = a.get_or_insert_map("m");
        a.transact_with("me", |txn| map.insert(txn, "k", "v"));
        a.transact(|txn| map.insert(txn, "n", 2));

        let mut b = Doc::with_client_id(2);
        for update in updates.borrow().iter() {
            b.apply_update_v2(update).unwrap();
        }
        assert_eq!(b.to_json(), a.to_json());
    }

    #[test]
    fn callbacks_may_transact() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mirror = doc.get_or_insert_array("b");
        let m = mirror.clone();
        array.observe(&mut doc, move |doc, _| {
            let m = m.clone();
            doc.transact(|txn| m.push_back(txn, "seen").unwrap());
        });
        doc.transact(|txn| array.push_back(txn, 1).unwrap());
        assert_eq!(mirror.len(&doc), 1);
    }

    #[test]
    fn panicking_callback_does_not_stop_siblings() {
        let ran = Rc::new(RefCell::new(false));
        let mut doc = Doc::with_client_id(1);
        doc.observe_after_transaction(|_, _| panic!("boom"));
        let r = ran.clone();
        doc.observe_after_transaction(move |_, _| *r.borrow_mut() = true);
        let array = doc.get_or_insert_array("a");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            doc.transact(|txn| array.push_back(txn, 1).unwrap());
        }));
        assert!(result.is_err());
        assert!(*ran.borrow());
        assert_eq!(array.len(&doc), 1);
    }

    #[test]
    fn unobserve_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut doc = Doc::with_client_id(1);
        let c = count.clone();
        let sub = doc.observe_update_v1(move |_, _| *c.borrow_mut() += 1);
        let array = doc.get_or_insert_array("a");
        doc.transact(|txn| array.push_back(txn, 1).unwrap());
        assert!(doc.unobserve(sub));
        doc.transact(|txn| array.push_back(txn, 2).unwrap());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn deep_observers_see_nested_paths() {
        let paths = Rc::new(RefCell::new(Vec::new()));
        let mut doc = Doc::with_client_id(1);
        let root = doc.get_or_insert_map("root");
        doc.transact(|txn| root.insert(txn, "list", crate::types::In::Array(Vec::new())));
        let p = paths.clone();
        root.observe_deep(&mut doc, move |_, events| {
            for event in events {
                p.borrow_mut().push(event.path().len());
            }
        });
        let Some(Out::Array(list)) = root.get(&doc, "list") else {
            panic!("expected a nested array");
        };
        doc.transact(|txn| {
            list.push_back(txn, 1).unwrap();
            root.insert(txn, "x", 1);
        });
        assert_eq!(*paths.borrow(), vec![0, 1]);
    }

    #[test]
    fn colliding_client_id_is_regenerated() {
        let mut a = Doc::with_client_id(7);
        let mut b = Doc::with_client_id(7);
        let text = a.get_or_insert_text("t");
        a.transact(|txn| text.insert(txn, 0, "x").unwrap());
        b.apply_update_v1(&a.encode_state_as_update_v1(&StateVector::new())).unwrap();
        assert_ne!(b.client_id(), 7);
    }

    #[test]
    fn content_options_round_trip() {
        let opts = Options { gc: false, auto_load: true, meta: Some(Any::from("m")), ..Options::default() };
        let doc = Doc::with_options(opts);
        let copy = Doc::from_content_opts(doc.guid(), &doc.content_opts());
        assert!(!copy.options().gc);
        assert!(copy.options().auto_load);
        assert!(copy.should_load());
        assert_eq!(copy.options().meta, Some(Any::from("m")));
        assert_eq!(Doc::new().content_opts(), Any::map(Vec::<(String, Any)>::new()));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: Options = serde_json::from_str(r#"{"clientId": 5, "gc": false}"#).unwrap();
        assert_eq!(opts.client_id, 5);
        assert!(!opts.gc);
        assert!(opts.should_load);
    }

    #[test]
    fn subdocs_are_reported() {
        let local = Rc::new(RefCell::new(Vec::new()));
        let mut a = Doc::with_client_id(1);
        let e = local.clone();
        a.observe_subdocs(move |_, event| e.borrow_mut().push(event.clone()));
        let array = a.get_or_insert_array("a");
        let sub = Doc::new();
        let guid = sub.guid();
        a.transact(|txn| array.push_back(txn, sub).unwrap());
        assert_eq!(a.subdoc_guids(), vec![guid.clone()]);

        let remote = Rc::new(RefCell::new(Vec::new()));
        let mut b = Doc::with_client_id(2);
        let e = remote.clone();
        b.observe_subdocs(move |_, event| e.borrow_mut().push(event.clone()));
        b.apply_update_v1(&a.encode_state_as_update_v1(&StateVector::new())).unwrap();
        assert!(!b.subdoc(&guid).unwrap().should_load());
        assert!(b.load_subdoc(&guid));
        assert!(b.subdoc(&guid).unwrap().should_load());

        a.transact(|txn| array.remove(txn, 0).unwrap());
        assert!(a.subdoc_guids().is_empty());

        let local = local.borrow();
        assert_eq!(local.len(), 2);
        assert_eq!(local[0].added, vec![guid.clone()]);
        assert_eq!(local[0].loaded, vec![guid.clone()]);
        assert_eq!(local[1].removed, vec![guid.clone()]);
        let remote = remote.borrow();
        assert_eq!(remote.len(), 2);
        assert_eq!(remote[0].added, vec![guid.clone()]);
        assert!(remote[0].loaded.is_empty());
        assert_eq!(remote[1].loaded, vec![guid]);
    }
}
