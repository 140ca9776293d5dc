// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Identifier types for blocks in the struct store.
//!
//! # Identifier Hierarchy
//!
//! - `ClientId`: a replica, chosen at random when a document is created
//! - `ID`: one atomic unit of content, `(client, clock)`
//!
//! A block of length `n` starting at `ID { client, clock }` owns the ids
//! `clock..clock + n` of that client. IDs are globally unique and ordered
//! by `(client, clock)`, which is used only for tie-breaking, never for
//! causality.

use std::cmp::Ordering;
use std::fmt;

/// A replica identifier.
pub type ClientId = u32;

/// A unique identifier for a single unit of content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ID {
    /// The replica that created the unit.
    pub client: ClientId,
    /// Position in that replica's own sequence, starting at 0.
    pub clock: u32,
}

impl ID {
    /// Create a new identifier.
    #[inline]
    pub const fn new(client: ClientId, clock: u32) -> ID {
        return ID { client, clock };
    }

    /// The identifier `offset` units later from the same client.
    #[inline]
    pub fn offset(&self, offset: u32) -> ID {
        return ID::new(self.client, self.clock + offset);
    }
}

impl fmt::Debug for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "<{}#{}>", self.client, self.clock);
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "<{}#{}>", self.client, self.clock);
    }
}

impl PartialOrd for ID {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for ID {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by client first, then by clock
        match self.client.cmp(&other.client) {
            Ordering::Equal => self.clock.cmp(&other.clock),
            other => other,
        }
    }
}

/// A half-open clock range `[start, end)` owned by one client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub id: ID,
    pub len: u32,
}

impl BlockRange {
    pub fn new(id: ID, len: u32) -> BlockRange {
        return BlockRange { id, len };
    }

    /// The last id covered by the range.
    pub fn last_id(&self) -> ID {
        return ID::new(self.id.client, self.id.clock + self.len - 1);
    }

    /// Check if this range covers the given id.
    pub fn contains(&self, id: &ID) -> bool {
        return self.id.client == id.client
            && id.clock >= self.id.clock
            && id.clock < self.id.clock + self.len;
    }
}
