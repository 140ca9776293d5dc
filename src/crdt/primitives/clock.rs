// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! State vectors: what a replica has seen.
//!
//! A state vector maps each client to the next clock it expects from that
//! client, so `sv.get(c) == n` means clocks `0..n` of client `c` are known.
//! Because every client's blocks arrive in order, this is a vector clock
//! that also describes exactly which blocks exist locally.
//!
//! Complexity:
//! - get / set: O(1)
//! - merge: O(n) where n is number of clients
//! - encode: O(n log n) (clients are written in descending order)

use std::collections::HashMap;

use rustc_hash::FxHashMap;

use super::id::ClientId;
use super::id::ID;
use crate::encoding::Cursor;
use crate::encoding::Write;
use crate::error::Result;

/// Per-client next expected clock.
#[derive(Clone, Debug, Default)]
pub struct StateVector(FxHashMap<ClientId, u32>);

impl StateVector {
    /// Create an empty state vector.
    pub fn new() -> StateVector {
        return StateVector(FxHashMap::default());
    }

    /// Get the next expected clock of a client (0 if unknown).
    #[inline]
    pub fn get(&self, client: &ClientId) -> u32 {
        return *self.0.get(client).unwrap_or(&0);
    }

    /// Set the clock of a client unconditionally.
    pub fn set(&mut self, client: ClientId, clock: u32) {
        self.0.insert(client, clock);
    }

    /// Raise the clock of a client to at least `clock`.
    pub fn set_max(&mut self, client: ClientId, clock: u32) {
        let entry = self.0.entry(client).or_insert(0);
        *entry = (*entry).max(clock);
    }

    /// Lower the clock of a client to at most `clock`, inserting it if the
    /// client was unknown.
    pub fn set_min(&mut self, client: ClientId, clock: u32) {
        match self.0.get_mut(&client) {
            Some(existing) => *existing = (*existing).min(clock),
            None => {
                self.0.insert(client, clock);
            }
        }
    }

    /// Check whether the given id has been seen.
    #[inline]
    pub fn contains(&self, id: &ID) -> bool {
        return id.clock < self.get(&id.client);
    }

    /// Check whether a client has an entry (even a zero one).
    pub fn contains_client(&self, client: &ClientId) -> bool {
        return self.0.contains_key(client);
    }

    /// Merge with another state vector, taking the pointwise maximum.
    pub fn merge(&mut self, other: &StateVector) {
        for (client, clock) in other.0.iter() {
            self.set_max(*client, *clock);
        }
    }

    /// True if every entry here is <= the matching entry in `other`.
    pub fn is_covered_by(&self, other: &StateVector) -> bool {
        return self.0.iter().all(|(client, clock)| *clock <= other.get(client));
    }

    /// Iterate over `(client, clock)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &u32)> {
        return self.0.iter();
    }

    /// Entries ordered by descending client id, skipping zero clocks.
    pub fn sorted_desc(&self) -> Vec<(ClientId, u32)> {
        let mut entries: Vec<(ClientId, u32)> = self
            .0
            .iter()
            .filter(|(_, clock)| **clock > 0)
            .map(|(c, k)| (*c, *k))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        return entries;
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.values().all(|clock| *clock == 0);
    }

    /// Write `varuint(n) { varuint(client) varuint(clock) }*`, highest
    /// client first.
    pub fn encode_to<W: Write>(&self, w: &mut W) {
        let entries = self.sorted_desc();
        w.write_var_u64(entries.len() as u64);
        for (client, clock) in entries {
            w.write_var_u32(client);
            w.write_var_u32(clock);
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        return buf;
    }

    /// Read a state vector written by [`StateVector::encode_to`].
    pub fn decode_from(cursor: &mut Cursor<'_>) -> Result<StateVector> {
        let len = cursor.read_var_u32()?;
        let mut sv = StateVector::new();
        for _ in 0..len {
            let client = cursor.read_var_u32()?;
            let clock = cursor.read_var_u32()?;
            sv.set(client, clock);
        }
        return Ok(sv);
    }

    /// Decode a whole buffer.
    pub fn decode(buf: &[u8]) -> Result<StateVector> {
        return StateVector::decode_from(&mut Cursor::new(buf));
    }
}

impl PartialEq for StateVector {
    fn eq(&self, other: &Self) -> bool {
        // Zero entries are equivalent to missing ones
        return self.is_covered_by(other) && other.is_covered_by(self);
    }
}

impl Eq for StateVector {}

impl FromIterator<(ClientId, u32)> for StateVector {
    fn from_iter<T: IntoIterator<Item = (ClientId, u32)>>(iter: T) -> StateVector {
        let mut sv = StateVector::new();
        for (client, clock) in iter {
            sv.set(client, clock);
        }
        return sv;
    }
}

impl From<StateVector> for HashMap<ClientId, u32> {
    fn from(sv: StateVector) -> HashMap<ClientId, u32> {
        return sv.0.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_vector_basic() {
        let mut sv = StateVector::new();
        assert_eq!(sv.get(&1), 0);

        sv.set_max(1, 4);
        sv.set_max(1, 2);
        assert_eq!(sv.get(&1), 4);
        assert!(sv.contains(&ID::new(1, 3)));
        assert!(!sv.contains(&ID::new(1, 4)));
    }

    #[test]
    fn state_vector_merge() {
        let mut a: StateVector = [(1, 2), (2, 5)].into_iter().collect();
        let b: StateVector = [(1, 7), (3, 1)].into_iter().collect();
        a.merge(&b);

        assert_eq!(a.get(&1), 7);
        assert_eq!(a.get(&2), 5);
        assert_eq!(a.get(&3), 1);
    }

    #[test]
    fn state_vector_equality_ignores_zero() {
        let a: StateVector = [(1, 2), (9, 0)].into_iter().collect();
        let b: StateVector = [(1, 2)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn encodes_highest_client_first() {
        let sv: StateVector = [(5, 3), (9, 7)].into_iter().collect();
        let buf = sv.encode();
        assert_eq!(buf, vec![2, 9, 7, 5, 3]);

        let decoded = StateVector::decode(&buf).unwrap();
        assert_eq!(decoded.get(&5), 3);
        assert_eq!(decoded.get(&9), 7);
        assert_eq!(decoded.len(), 2);
    }
}
