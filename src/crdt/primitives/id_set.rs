// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Delete sets: sparse, run-length sets of deleted ids.
//!
//! A delete set maps each client to a list of `(clock, len)` runs. Runs are
//! appended unsorted while a transaction accumulates deletions and must be
//! [`DeleteSet::squash`]ed (sorted and coalesced) before lookups or
//! encoding.
//!
//! Wire layout, clients in descending order:
//!
//! ```text
//! varuint(num_clients) { varuint(client) varuint(num_runs) { clock len }* }*
//! ```
//!
//! `clock` and `len` go through the update encoder, which in the V2 format
//! writes clocks as deltas from a cursor that is reset for every client.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::id::ClientId;
use super::id::ID;
use crate::error::Error;
use crate::error::Result;
use crate::update::codec::Decoder;
use crate::update::codec::Encoder;

/// One run of deleted clocks, `[clock, clock + len)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteItem {
    pub clock: u32,
    pub len: u32,
}

impl DeleteItem {
    pub fn new(clock: u32, len: u32) -> DeleteItem {
        return DeleteItem { clock, len };
    }

    #[inline]
    pub fn end(&self) -> u32 {
        return self.clock + self.len;
    }
}

type Runs = SmallVec<[DeleteItem; 4]>;

/// Per-client runs of deleted clocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteSet {
    clients: FxHashMap<ClientId, Runs>,
}

impl DeleteSet {
    pub fn new() -> DeleteSet {
        return DeleteSet::default();
    }

    /// Append a run. Does not keep the set sorted.
    pub fn insert(&mut self, id: ID, len: u32) {
        if len == 0 {
            return;
        }
        self.clients
            .entry(id.client)
            .or_default()
            .push(DeleteItem::new(id.clock, len));
    }

    pub fn is_empty(&self) -> bool {
        return self.clients.values().all(|runs| runs.is_empty());
    }

    /// Runs of a single client.
    pub fn get(&self, client: &ClientId) -> Option<&[DeleteItem]> {
        return self.clients.get(client).map(|runs| runs.as_slice());
    }

    /// Iterate over `(client, runs)` in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &[DeleteItem])> {
        return self.clients.iter().map(|(client, runs)| (client, runs.as_slice()));
    }

    /// Clients ordered from highest to lowest id.
    pub fn clients_desc(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.clients.keys().copied().collect();
        clients.sort_unstable_by(|a, b| b.cmp(a));
        return clients;
    }

    /// Sort every client's runs and coalesce overlapping or adjacent ones.
    pub fn squash(&mut self) {
        for runs in self.clients.values_mut() {
            runs.sort_unstable_by_key(|run| run.clock);
            let mut j = 1;
            for i in 1..runs.len() {
                let right = runs[i];
                let left = &mut runs[j - 1];
                if left.end() >= right.clock {
                    left.len = left.len.max(right.end() - left.clock);
                } else {
                    runs[j] = right;
                    j += 1;
                }
            }
            runs.truncate(j.min(runs.len()));
        }
        self.clients.retain(|_, runs| !runs.is_empty());
    }

    /// Union with another set. The result is squashed.
    pub fn merge(&mut self, other: DeleteSet) {
        for (client, runs) in other.clients {
            self.clients.entry(client).or_default().extend(runs);
        }
        self.squash();
    }

    /// Union of many sets.
    pub fn merge_all<I: IntoIterator<Item = DeleteSet>>(sets: I) -> DeleteSet {
        let mut result = DeleteSet::new();
        for set in sets {
            for (client, runs) in set.clients {
                result.clients.entry(client).or_default().extend(runs);
            }
        }
        result.squash();
        return result;
    }

    /// Binary search for the run covering `id`. Requires a squashed set.
    pub fn find_run(&self, id: &ID) -> Option<DeleteItem> {
        let runs = self.clients.get(&id.client)?;
        let mut left = 0usize;
        let mut right = runs.len();
        while left < right {
            let mid = (left + right) / 2;
            let run = runs[mid];
            if run.clock <= id.clock {
                if id.clock < run.end() {
                    return Some(run);
                }
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        return None;
    }

    /// Check whether `id` is deleted. Requires a squashed set.
    #[inline]
    pub fn is_deleted(&self, id: &ID) -> bool {
        return self.find_run(id).is_some();
    }

    /// Total number of deleted units.
    pub fn deleted_len(&self) -> u64 {
        return self
            .clients
            .values()
            .flat_map(|runs| runs.iter())
            .map(|run| run.len as u64)
            .sum();
    }

    pub fn encode<E: Encoder>(&self, encoder: &mut E) {
        let clients = self.clients_desc();
        encoder.write_var(clients.len() as u32);
        for client in clients {
            let runs = &self.clients[&client];
            encoder.reset_ds_cur_val();
            encoder.write_var(client);
            encoder.write_var(runs.len() as u32);
            for run in runs.iter() {
                encoder.write_ds_clock(run.clock);
                encoder.write_ds_len(run.len);
            }
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<DeleteSet> {
        let mut ds = DeleteSet::new();
        let num_clients = decoder.read_var()?;
        for _ in 0..num_clients {
            decoder.reset_ds_cur_val();
            let client = decoder.read_var()?;
            let num_runs = decoder.read_var()?;
            let runs = ds.clients.entry(client).or_default();
            for _ in 0..num_runs {
                let clock = decoder.read_ds_clock()?;
                let len = decoder.read_ds_len()?;
                if clock.checked_add(len).is_none() {
                    return Err(Error::MalformedUpdate {
                        reason: format!("delete range of client {client} overflows"),
                    });
                }
                if len > 0 {
                    runs.push(DeleteItem::new(clock, len));
                }
            }
        }
        ds.squash();
        return Ok(ds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::codec::DecoderV1;
    use crate::update::codec::DecoderV2;
    use crate::update::codec::EncoderV1;
    use crate::update::codec::EncoderV2;

    fn sample() -> DeleteSet {
        let mut ds = DeleteSet::new();
        ds.insert(ID::new(1, 10), 2);
        ds.insert(ID::new(1, 0), 3);
        ds.insert(ID::new(1, 3), 1); // adjacent to the first run
        ds.insert(ID::new(1, 11), 4); // overlaps
        ds.insert(ID::new(7, 5), 1);
        ds.squash();
        return ds;
    }

    #[test]
    fn squash_coalesces_runs() {
        let ds = sample();
        assert_eq!(ds.get(&1), Some(&[DeleteItem::new(0, 4), DeleteItem::new(10, 5)][..]));
        assert_eq!(ds.get(&7), Some(&[DeleteItem::new(5, 1)][..]));
    }

    #[test]
    fn lookup() {
        let ds = sample();
        assert!(ds.is_deleted(&ID::new(1, 0)));
        assert!(ds.is_deleted(&ID::new(1, 3)));
        assert!(!ds.is_deleted(&ID::new(1, 4)));
        assert!(ds.is_deleted(&ID::new(1, 14)));
        assert!(!ds.is_deleted(&ID::new(1, 15)));
        assert!(!ds.is_deleted(&ID::new(2, 0)));
    }

    #[test]
    fn merge_is_monotonic() {
        let a = sample();
        let mut b = DeleteSet::new();
        b.insert(ID::new(1, 4), 6);
        let merged = DeleteSet::merge_all([a.clone(), b]);
        for client in [1, 7] {
            for run in a.get(&client).unwrap() {
                for clock in run.clock..run.end() {
                    assert!(merged.is_deleted(&ID::new(client, clock)));
                }
            }
        }
        assert_eq!(merged.get(&1), Some(&[DeleteItem::new(0, 15)][..]));
    }

    #[test]
    fn wire_round_trip_v1() {
        let ds = sample();
        let mut encoder = EncoderV1::new();
        ds.encode(&mut encoder);
        let buf = encoder.to_vec();
        let mut decoder = DecoderV1::new(&buf);
        assert_eq!(DeleteSet::decode(&mut decoder).unwrap(), ds);
    }

    #[test]
    fn wire_round_trip_v2() {
        let ds = sample();
        let mut encoder = EncoderV2::new();
        ds.encode(&mut encoder);
        let buf = encoder.to_vec();
        let mut decoder = DecoderV2::new(&buf).unwrap();
        assert_eq!(DeleteSet::decode(&mut decoder).unwrap(), ds);
    }

    #[test]
    fn decode_sorts_and_merges_runs() {
        // A peer may send runs unsorted and overlapping.
        let mut encoder = EncoderV1::new();
        encoder.write_var(1);
        encoder.reset_ds_cur_val();
        encoder.write_var(3);
        encoder.write_var(3);
        for (clock, len) in [(5, 2), (0, 1), (6, 3)] {
            encoder.write_ds_clock(clock);
            encoder.write_ds_len(len);
        }
        let buf = encoder.to_vec();
        let mut decoder = DecoderV1::new(&buf);
        let ds = DeleteSet::decode(&mut decoder).unwrap();
        assert_eq!(ds.get(&3), Some(&[DeleteItem::new(0, 1), DeleteItem::new(5, 4)][..]));
        for clock in [0, 5, 6, 8] {
            assert!(ds.is_deleted(&ID::new(3, clock)));
        }
        assert!(!ds.is_deleted(&ID::new(3, 1)));
        assert!(!ds.is_deleted(&ID::new(3, 9)));
    }
}
