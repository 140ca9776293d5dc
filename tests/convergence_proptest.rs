// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Property-based tests: replicas that saw the same updates agree.

mod common;

use proptest::prelude::*;
use tandem::ArrayRef;
use tandem::Doc;
use tandem::StateVector;
use tandem::TextRef;

// =============================================================================
// Test helpers
// =============================================================================

/// A random edit, with positions as fractions of the current length.
#[derive(Clone, Debug)]
enum EditOp {
    Insert { pos_pct: f64, content: String },
    Delete { pos_pct: f64, len_pct: f64 },
    Push { value: i64 },
    Pop,
}

fn arbitrary_edit_op() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        (0.0..=1.0f64, "[a-zé]{1,6}").prop_map(|(pos_pct, content)| EditOp::Insert { pos_pct, content }),
        (0.0..=1.0f64, 0.0..=0.5f64).prop_map(|(pos_pct, len_pct)| EditOp::Delete { pos_pct, len_pct }),
        any::<i64>().prop_map(|value| EditOp::Push { value }),
        Just(EditOp::Pop),
    ]
}

struct Replica {
    doc: Doc,
    text: TextRef,
    array: ArrayRef,
}

impl Replica {
    fn new(client: u32) -> Replica {
        let mut doc = Doc::with_client_id(client);
        let text = doc.get_or_insert_text("t");
        let array = doc.get_or_insert_array("a");
        return Replica { doc, text, array };
    }

    /// Apply one edit, returning the update it produced.
    fn edit(&mut self, op: &EditOp) -> Vec<u8> {
        let before = self.doc.state_vector();
        let (text, array) = (&self.text, &self.array);
        let len = text.len(&self.doc);
        let items = array.len(&self.doc);
        self.doc.transact(|txn| match op {
            EditOp::Insert { pos_pct, content } => {
                let pos = ((*pos_pct * len as f64) as u32).min(len);
                text.insert(txn, pos, content).unwrap();
            }
            EditOp::Delete { pos_pct, len_pct } => {
                if len == 0 {
                    return;
                }
                let start = ((*pos_pct * len as f64) as u32).min(len - 1);
                let count = ((*len_pct * (len - start) as f64) as u32).clamp(1, len - start);
                text.remove_range(txn, start, count).unwrap();
            }
            EditOp::Push { value } => array.push_back(txn, *value).unwrap(),
            EditOp::Pop => {
                if items > 0 {
                    array.remove(txn, items - 1).unwrap();
                }
            }
        });
        return self.doc.encode_state_as_update_v1(&before);
    }

    fn snapshot(&self) -> (String, tandem::Any) {
        return (self.text.get_string(&self.doc), self.array.to_json(&self.doc));
    }
}

/// A positional array edit for the sequential model.
#[derive(Clone, Debug)]
enum ArrayOp {
    Insert { pos_pct: f64, values: Vec<i64> },
    Remove { pos_pct: f64, len_pct: f64 },
}

fn arbitrary_array_op() -> impl Strategy<Value = ArrayOp> {
    prop_oneof![
        (0.0..=1.0f64, prop::collection::vec(-1000..1000i64, 1..4))
            .prop_map(|(pos_pct, values)| ArrayOp::Insert { pos_pct, values }),
        (0.0..=1.0f64, 0.0..=0.5f64).prop_map(|(pos_pct, len_pct)| ArrayOp::Remove { pos_pct, len_pct }),
    ]
}

fn model_json(model: &[i64]) -> tandem::Any {
    return tandem::Any::from(model.iter().map(|v| tandem::Any::from(*v)).collect::<Vec<_>>());
}

// =============================================================================
// Sequential model
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Interleaved inserts and removes, each in its own transaction, match a
    /// plain `Vec` after every step.
    #[test]
    fn array_matches_vec_model(ops in prop::collection::vec(arbitrary_array_op(), 1..60)) {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mut model: Vec<i64> = Vec::new();
        for op in &ops {
            let len = model.len() as u32;
            match op {
                ArrayOp::Insert { pos_pct, values } => {
                    let pos = ((*pos_pct * len as f64) as u32).min(len);
                    let items = values.iter().map(|v| tandem::In::from(*v)).collect();
                    doc.transact(|txn| array.insert_range(txn, pos, items).unwrap());
                    model.splice(pos as usize..pos as usize, values.iter().copied());
                }
                ArrayOp::Remove { pos_pct, len_pct } => {
                    if len == 0 {
                        continue;
                    }
                    let start = ((*pos_pct * len as f64) as u32).min(len - 1);
                    let count = ((*len_pct * (len - start) as f64) as u32).clamp(1, len - start);
                    doc.transact(|txn| array.remove_range(txn, start, count).unwrap());
                    model.drain(start as usize..(start + count) as usize);
                }
            }
            prop_assert_eq!(array.len(&doc), model.len() as u32);
            prop_assert_eq!(array.to_json(&doc), model_json(&model));
            if !model.is_empty() {
                let mid = model.len() / 2;
                prop_assert_eq!(array.get(&doc, mid as u32), Some(tandem::Out::Any(tandem::Any::from(model[mid]))));
            }
        }

        let mut peer = Doc::with_client_id(2);
        let copy = peer.get_or_insert_array("a");
        common::sync_into(&doc, &mut peer);
        prop_assert_eq!(copy.to_json(&peer), model_json(&model));
    }
}

// =============================================================================
// Convergence
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Concurrent edits applied in different orders give the same document.
    #[test]
    fn replicas_converge(
        edits in prop::collection::vec((0..3usize, arbitrary_edit_op()), 1..40),
        seed in any::<u64>(),
    ) {
        let mut replicas: Vec<Replica> = (1..=3).map(Replica::new).collect();
        let mut updates = Vec::new();
        for (author, op) in &edits {
            updates.push(replicas[*author].edit(op));
        }

        // Each replica receives everything in its own shuffled order.
        for (i, replica) in replicas.iter_mut().enumerate() {
            let mut order: Vec<usize> = (0..updates.len()).collect();
            let mut state = seed.wrapping_add(i as u64);
            for j in (1..order.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                order.swap(j, (state >> 33) as usize % (j + 1));
            }
            for k in order {
                replica.doc.apply_update_v1(&updates[k]).unwrap();
            }
        }

        let expected = replicas[0].snapshot();
        for replica in &replicas[1..] {
            prop_assert_eq!(replica.snapshot(), expected.clone());
            prop_assert_eq!(replica.doc.state_vector(), replicas[0].doc.state_vector());
            prop_assert!(!replica.doc.has_pending());
        }
    }

    /// Merging updates in either order yields the same document as
    /// applying them one by one.
    #[test]
    fn merge_is_order_independent(
        left in prop::collection::vec(arbitrary_edit_op(), 1..20),
        right in prop::collection::vec(arbitrary_edit_op(), 1..20),
    ) {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);
        let ua: Vec<Vec<u8>> = left.iter().map(|op| a.edit(op)).collect();
        let ub: Vec<Vec<u8>> = right.iter().map(|op| b.edit(op)).collect();
        let all: Vec<&[u8]> = ua.iter().chain(ub.iter()).map(|u| u.as_slice()).collect();
        let reversed: Vec<&[u8]> = all.iter().rev().copied().collect();

        let mut direct = Replica::new(3);
        for update in &all {
            direct.doc.apply_update_v1(update).unwrap();
        }
        let mut forward = Replica::new(4);
        forward.doc.apply_update_v1(&tandem::merge_updates_v1(&all).unwrap()).unwrap();
        let mut backward = Replica::new(5);
        backward.doc.apply_update_v1(&tandem::merge_updates_v1(&reversed).unwrap()).unwrap();

        prop_assert_eq!(forward.snapshot(), direct.snapshot());
        prop_assert_eq!(backward.snapshot(), direct.snapshot());
    }

    /// Once an id is deleted it stays deleted, whatever arrives later.
    #[test]
    fn deletions_are_monotonic(
        edits in prop::collection::vec((0..2usize, arbitrary_edit_op()), 1..40),
    ) {
        let mut replicas: Vec<Replica> = (1..=2).map(Replica::new).collect();
        let mut updates = Vec::new();
        for (author, op) in &edits {
            updates.push(replicas[*author].edit(op));
        }
        let mut observer = Replica::new(9);
        let mut deleted: Vec<tandem::ID> = Vec::new();
        for update in &updates {
            observer.doc.apply_update_v1(update).unwrap();
            let snapshot = observer.doc.snapshot();
            for id in &deleted {
                prop_assert!(snapshot.delete_set().is_deleted(id), "{} came back", id);
            }
            for (client, runs) in snapshot.delete_set().iter() {
                for run in runs {
                    deleted.push(tandem::ID::new(*client, run.clock));
                }
            }
        }
    }

    /// A V2 encoding of any document rebuilds it exactly.
    #[test]
    fn v2_round_trips(ops in prop::collection::vec(arbitrary_edit_op(), 1..40)) {
        let mut source = Replica::new(7);
        for op in &ops {
            source.edit(op);
        }
        let mut copy = Replica::new(8);
        copy.doc.apply_update_v2(&source.doc.encode_state_as_update_v2(&StateVector::new())).unwrap();
        prop_assert_eq!(copy.snapshot(), source.snapshot());
        prop_assert_eq!(copy.doc.state_vector(), source.doc.state_vector());
    }
}
