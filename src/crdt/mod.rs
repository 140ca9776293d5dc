// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! The block store and the integration algorithm.
//!
//! Every insertion is an [`Item`](block::Item) with a unique [`ID`](primitives::ID)
//! and the ids of its neighbours at creation time. Integration places a
//! remote item among concurrent siblings so that every replica ends up with
//! the same order no matter the order items arrive in.

pub mod block;
pub mod branch;
pub mod content;
mod integrate;
pub mod primitives;
pub mod store;
