// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Shared primitives for the document engine.
//!
//! # Primitives
//!
//! ## IDs
//! - `ClientId`: replica identifier
//! - `ID`: one unit of content, `(client, clock)`
//! - `BlockRange`: a clock range owned by one client
//!
//! ## Clocks
//! - `StateVector`: per-client next expected clock
//!
//! ## Sets
//! - `DeleteSet`: run-length set of deleted ids

pub mod clock;
pub mod id;
pub mod id_set;

// Re-exports for convenience
pub use clock::StateVector;
pub use id::BlockRange;
pub use id::ClientId;
pub use id::ID;
pub use id_set::DeleteItem;
pub use id_set::DeleteSet;
