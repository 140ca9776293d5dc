// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Snapshots: a state vector plus a delete set.
//!
//! A snapshot names a point in a document's history. Content is visible at
//! that point if it was created before the state vector and not yet in the
//! delete set. Reconstructing an old state needs the deleted content, so it
//! only works on documents that do not garbage collect.

use crate::crdt::block::Item;
use crate::crdt::primitives::ClientId;
use crate::crdt::primitives::DeleteSet;
use crate::crdt::primitives::StateVector;
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::doc::Options;
use crate::error::Error;
use crate::error::Result;
use crate::update::codec::Decoder;
use crate::update::codec::DecoderV1;
use crate::update::codec::DecoderV2;
use crate::update::codec::Encoder;
use crate::update::codec::EncoderV1;
use crate::update::codec::EncoderV2;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    sv: StateVector,
    ds: DeleteSet,
}

impl Snapshot {
    pub fn new(sv: StateVector, mut ds: DeleteSet) -> Snapshot {
        ds.squash();
        return Snapshot { sv, ds };
    }

    pub fn state_vector(&self) -> &StateVector {
        return &self.sv;
    }

    pub fn delete_set(&self) -> &DeleteSet {
        return &self.ds;
    }

    /// Whether `item` existed and was not deleted at this point.
    pub fn is_visible(&self, item: &Item) -> bool {
        return item.id.clock < self.sv.get(&item.id.client) && !self.ds.is_deleted(&item.id);
    }

    pub fn encode_v1(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    pub fn encode_v2(&self) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    /// The delete set, then the state vector as `count { client clock }`.
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        self.ds.encode(encoder);
        let entries = self.sv.sorted_desc();
        encoder.write_var(entries.len() as u32);
        for (client, clock) in entries {
            encoder.write_var(client);
            encoder.write_var(clock);
        }
    }

    pub fn decode_v1(buf: &[u8]) -> Result<Snapshot> {
        let mut decoder = DecoderV1::new(buf);
        return Snapshot::decode(&mut decoder);
    }

    pub fn decode_v2(buf: &[u8]) -> Result<Snapshot> {
        let mut decoder = DecoderV2::new(buf)?;
        return Snapshot::decode(&mut decoder);
    }

    fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<Snapshot> {
        let ds = DeleteSet::decode(decoder)?;
        let len = decoder.read_var()?;
        let mut sv = StateVector::new();
        for _ in 0..len {
            let client = decoder.read_var()?;
            let clock = decoder.read_var()?;
            sv.set(client, clock);
        }
        return Ok(Snapshot { sv, ds });
    }
}

/// Write every block below the snapshot's state vector, cutting the last
/// block of each client at the boundary, followed by the snapshot's
/// delete set.
fn encode_at<E: Encoder>(store: &Store, snapshot: &Snapshot, encoder: &mut E) {
    let mut clients: Vec<(ClientId, u32)> = snapshot
        .sv
        .iter()
        .map(|(client, clock)| (*client, (*clock).min(store.get_state(client))))
        .filter(|(_, clock)| *clock > 0)
        .collect();
    clients.sort_by(|a, b| b.0.cmp(&a.0));
    encoder.write_var(clients.len() as u32);
    for (client, clock) in clients {
        let blocks = &store.blocks[&client];
        let last = Store::find_index(blocks, clock - 1).unwrap_or(blocks.len() - 1);
        encoder.write_client(client);
        encoder.write_var(0);
        encoder.write_var(last as u32 + 1);
        for block in &blocks[..last] {
            block.encode(encoder, 0, 0);
        }
        let tail = &blocks[last];
        tail.encode(encoder, 0, tail.end() - clock);
    }
    snapshot.ds.encode(encoder);
}

impl Doc {
    /// The current state vector and delete set.
    pub fn snapshot(&self) -> Snapshot {
        return Snapshot::new(self.store.state_vector(), self.store.delete_set());
    }

    /// Encode the document as it was at `snapshot`, V1.
    pub fn encode_state_from_snapshot_v1(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        if self.options().gc {
            return Err(Error::GcEnabled);
        }
        let mut encoder = EncoderV1::new();
        encode_at(&self.store, snapshot, &mut encoder);
        return Ok(encoder.to_vec());
    }

    /// Encode the document as it was at `snapshot`, V2.
    pub fn encode_state_from_snapshot_v2(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        if self.options().gc {
            return Err(Error::GcEnabled);
        }
        let mut encoder = EncoderV2::new();
        encode_at(&self.store, snapshot, &mut encoder);
        return Ok(encoder.to_vec());
    }

    /// A new document holding this one's state at `snapshot`.
    pub fn restore_snapshot(&self, snapshot: &Snapshot) -> Result<Doc> {
        let update = self.encode_state_from_snapshot_v2(snapshot)?;
        let mut doc = Doc::with_options(Options { gc: false, ..Options::default() });
        doc.apply_update_v2(&update)?;
        return Ok(doc);
    }
}
