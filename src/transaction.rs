// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Transactions: atomic batches of changes to a document.
//!
//! Every mutation runs inside [`Doc::transact`]. A transaction records the
//! state vector before it started, the ids it deleted, and which types
//! changed. When the outermost call returns, the transaction is queued for
//! cleanup: events fire, deleted content is garbage collected, adjacent
//! blocks are merged and update events are emitted.
//!
//! Callbacks that open new transactions during cleanup do not nest: their
//! cleanups join the same queue and run after the current one.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use crate::crdt::branch::BranchPtr;
use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::ID;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::update::codec::Encoder;
use crate::update::codec::EncoderV1;
use crate::update::codec::EncoderV2;

/// A caller-supplied tag describing where a transaction came from.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(Arc<str>);

impl Origin {
    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Origin({:?})", &*self.0);
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Origin {
        return Origin(Arc::from(value));
    }
}

impl From<String> for Origin {
    fn from(value: String) -> Origin {
        return Origin(Arc::from(value));
    }
}

/// Read access to a document's store, shared by [`Doc`] and
/// [`Transaction`].
pub trait ReadTxn {
    fn store(&self) -> &Store;

    fn state_vector(&self) -> StateVector {
        return self.store().state_vector();
    }
}

impl ReadTxn for Doc {
    fn store(&self) -> &Store {
        return &self.store;
    }
}

impl ReadTxn for Transaction<'_> {
    fn store(&self) -> &Store {
        return &self.doc.store;
    }
}

// =============================================================================
// State
// =============================================================================

/// Everything a transaction accumulates, kept after the closure returns
/// until cleanup runs.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    pub(crate) before_state: StateVector,
    pub(crate) after_state: StateVector,
    pub(crate) delete_set: DeleteSet,
    /// Changed types, with the changed keys (`None` for the child list).
    pub(crate) changed: FxHashMap<BranchPtr, FxHashSet<Option<Arc<str>>>>,
    /// Blocks split during the transaction that may merge again.
    pub(crate) merge_blocks: Vec<ID>,
    pub(crate) origin: Option<Origin>,
    pub(crate) local: bool,
    pub(crate) subdocs_added: FxHashSet<Arc<str>>,
    pub(crate) subdocs_removed: FxHashSet<Arc<str>>,
    pub(crate) subdocs_loaded: FxHashSet<Arc<str>>,
    pub(crate) need_formatting_cleanup: bool,
}

impl TransactionState {
    pub(crate) fn new(before_state: StateVector, origin: Option<Origin>, local: bool) -> TransactionState {
        return TransactionState { before_state, origin, local, ..TransactionState::default() };
    }

    /// True if the transaction created or deleted anything.
    pub(crate) fn has_changes(&self) -> bool {
        if !self.delete_set.is_empty() {
            return true;
        }
        return self
            .after_state
            .iter()
            .any(|(client, clock)| self.before_state.get(client) != *clock);
    }

    /// Encode the blocks created and the ids deleted by this transaction.
    pub(crate) fn encode_update<E: Encoder>(&self, store: &Store, encoder: &mut E) {
        store.encode_blocks(&self.before_state, encoder);
        self.delete_set.encode(encoder);
    }
}

/// Summary of a transaction handed to document-level callbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionEvent {
    pub origin: Option<Origin>,
    pub local: bool,
    pub before_state: StateVector,
    /// Empty in `before_transaction` callbacks.
    pub after_state: StateVector,
    pub delete_set: DeleteSet,
    /// Every type that changed, together with all of its ancestors.
    pub changed_parent_types: Vec<BranchPtr>,
}

impl TransactionEvent {
    pub(crate) fn new(state: &TransactionState, changed_parent_types: Vec<BranchPtr>) -> TransactionEvent {
        return TransactionEvent {
            origin: state.origin.clone(),
            local: state.local,
            before_state: state.before_state.clone(),
            after_state: state.after_state.clone(),
            delete_set: state.delete_set.clone(),
            changed_parent_types,
        };
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A mutable view of a document for the duration of [`Doc::transact`].
pub struct Transaction<'doc> {
    pub(crate) doc: &'doc mut Doc,
    pub(crate) state: TransactionState,
}

impl<'doc> Transaction<'doc> {
    pub(crate) fn new(doc: &'doc mut Doc, state: TransactionState) -> Transaction<'doc> {
        return Transaction { doc, state };
    }

    pub fn doc(&self) -> &Doc {
        return self.doc;
    }

    pub fn origin(&self) -> Option<&Origin> {
        return self.state.origin.as_ref();
    }

    /// False for transactions that apply remote updates.
    pub fn is_local(&self) -> bool {
        return self.state.local;
    }

    pub fn before_state(&self) -> &StateVector {
        return &self.state.before_state;
    }

    /// Ids deleted so far. Not squashed.
    pub fn delete_set(&self) -> &DeleteSet {
        return &self.state.delete_set;
    }

    pub fn client_id(&self) -> ClientId {
        return self.doc.client_id();
    }

    /// Id of the next block this replica creates.
    pub(crate) fn next_id(&self) -> ID {
        let client = self.doc.client_id();
        return ID::new(client, self.doc.store.get_state(&client));
    }

    /// Encode what this transaction changed so far (V1).
    pub fn encode_update_v1(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        self.encode_update(&mut encoder);
        return encoder.to_vec();
    }

    /// Encode what this transaction changed so far (V2).
    pub fn encode_update_v2(&self) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        self.encode_update(&mut encoder);
        return encoder.to_vec();
    }

    fn encode_update<E: Encoder>(&self, encoder: &mut E) {
        let mut ds = self.state.delete_set.clone();
        ds.squash();
        self.doc.store.encode_blocks(&self.state.before_state, encoder);
        ds.encode(encoder);
    }
}
