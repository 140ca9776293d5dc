// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Tandem - shared documents that merge without a server.
//!
//! A [`Doc`] holds named root types (arrays, maps, text and XML trees).
//! Every change happens in a transaction and produces a binary update.
//! Updates can be applied in any order, any number of times, and every
//! replica that has seen the same updates holds the same document.
//!
//! # Quick Start
//!
//! ```
//! use tandem::Doc;
//! use tandem::StateVector;
//!
//! let mut alice = Doc::with_client_id(1);
//! let text = alice.get_or_insert_text("notes");
//! alice.transact(|txn| text.insert(txn, 0, "Hello, World!").unwrap());
//!
//! let mut bob = Doc::with_client_id(2);
//! let update = alice.encode_state_as_update_v1(&StateVector::new());
//! bob.apply_update_v1(&update).unwrap();
//! let notes = bob.get_or_insert_text("notes");
//! assert_eq!(notes.get_string(&bob), "Hello, World!");
//! ```

pub mod crdt;
pub mod doc;
pub mod encoding;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod sticky;
pub mod sync;
pub mod transaction;
pub mod types;
pub mod undo;
pub mod update;

pub use crdt::primitives::ClientId;
pub use crdt::primitives::DeleteSet;
pub use crdt::primitives::ID;
pub use crdt::primitives::StateVector;
pub use doc::Doc;
pub use doc::Options;
pub use encoding::any::Any;
pub use error::Error;
pub use error::Result;
pub use event::Event;
pub use event::Subscription;
pub use snapshot::Snapshot;
pub use sticky::Assoc;
pub use sticky::StickyIndex;
pub use sync::Message;
pub use transaction::Origin;
pub use transaction::ReadTxn;
pub use transaction::Transaction;
pub use transaction::TransactionEvent;
pub use types::ArrayRef;
pub use types::In;
pub use types::MapRef;
pub use types::Out;
pub use types::SharedRef;
pub use types::TextRef;
pub use types::XmlElementRef;
pub use types::XmlFragmentRef;
pub use types::XmlTextRef;
pub use undo::UndoManager;
pub use undo::UndoOptions;
pub use update::Update;
pub use update::diff_update_v1;
pub use update::diff_update_v2;
pub use update::merge_updates_v1;
pub use update::merge_updates_v2;
