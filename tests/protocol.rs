// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Update encoding, application order and the update helpers.

mod common;

use common::full_update;
use common::sync_both;
use tandem::Doc;
use tandem::Error;
use tandem::StateVector;
use tandem::Update;
use tandem::update::convert_update_v1_to_v2;
use tandem::update::convert_update_v2_to_v1;
use tandem::update::encode_state_vector_from_update_v1;

// =============================================================================
// Test helpers
// =============================================================================

/// Three consecutive edits of one client, each as its own update.
fn three_steps() -> (Doc, Vec<Vec<u8>>) {
    let mut doc = Doc::with_client_id(1);
    let text = doc.get_or_insert_text("t");
    let mut updates = Vec::new();
    for (index, chunk) in [(0, "abc"), (3, "def"), (1, "XY")] {
        let before = doc.state_vector();
        doc.transact(|txn| text.insert(txn, index, chunk).unwrap());
        updates.push(doc.encode_state_as_update_v1(&before));
    }
    return (doc, updates);
}

fn text_of(doc: &mut Doc) -> String {
    let text = doc.get_or_insert_text("t");
    return text.get_string(&*doc);
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn concurrent_inserts_converge() {
    let mut a = Doc::with_client_id(1);
    let mut b = Doc::with_client_id(2);
    let ta = a.get_or_insert_text("t");
    let tb = b.get_or_insert_text("t");
    a.transact(|txn| ta.insert(txn, 0, "ab").unwrap());
    b.transact(|txn| tb.insert(txn, 0, "cd").unwrap());
    sync_both(&mut a, &mut b);

    let merged = ta.get_string(&a);
    assert_eq!(merged, tb.get_string(&b));
    let mut chars: Vec<char> = merged.chars().collect();
    chars.sort();
    assert_eq!(chars, vec!['a', 'b', 'c', 'd']);
    assert_eq!(a.state_vector(), b.state_vector());
}

#[test]
fn delete_inside_a_run() {
    let mut doc = Doc::with_client_id(1);
    let text = doc.get_or_insert_text("t");
    doc.transact(|txn| text.insert(txn, 0, "hello").unwrap());
    doc.transact(|txn| text.remove_range(txn, 1, 2).unwrap());
    assert_eq!(text.get_string(&doc), "hlo");
    assert_eq!(text.len(&doc), 3);

    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&full_update(&doc)).unwrap();
    assert_eq!(text_of(&mut peer), "hlo");
}

#[test]
fn state_vector_limits_the_update() {
    let mut doc = Doc::with_client_id(5);
    let text = doc.get_or_insert_text("t");
    doc.transact(|txn| text.insert(txn, 0, "abcde").unwrap());
    for (client, chunk) in [(9, "0123456"), (7, "xy")] {
        let mut other = Doc::with_client_id(client);
        let t = other.get_or_insert_text("t");
        other.transact(|txn| t.insert(txn, 0, chunk).unwrap());
        doc.apply_update_v1(&full_update(&other)).unwrap();
    }

    let sv = StateVector::from_iter([(5, 3), (9, 7)]);
    let decoded = StateVector::decode(&sv.encode()).unwrap();
    assert_eq!(decoded, sv);
    assert_eq!(decoded.get(&5), 3);
    assert_eq!(decoded.get(&9), 7);
    assert_eq!(decoded.len(), 2);

    let update = Update::decode_v1(&doc.encode_state_as_update_v1(&sv)).unwrap();
    let mut seen = StateVector::new();
    for block in update.blocks() {
        let id = block.id();
        assert!(id.clock >= sv.get(&id.client), "block {id} is already known");
        seen.set_max(id.client, id.clock + block.len());
    }
    assert_eq!(seen.get(&5), 5);
    assert_eq!(seen.get(&9), 0);
    assert_eq!(seen.get(&7), 2);
}

// =============================================================================
// Application order
// =============================================================================

#[test]
fn applying_twice_changes_nothing() {
    let (doc, updates) = three_steps();
    let mut peer = Doc::with_client_id(2);
    for update in &updates {
        peer.apply_update_v1(update).unwrap();
    }
    let json = peer.to_json();
    let sv = peer.state_vector();
    for update in &updates {
        peer.apply_update_v1(update).unwrap();
    }
    assert_eq!(peer.to_json(), json);
    assert_eq!(peer.state_vector(), sv);
    assert_eq!(peer.to_json(), doc.to_json());
}

#[test]
fn every_order_converges() {
    let (mut doc, updates) = three_steps();
    let expected = text_of(&mut doc);
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    for order in orders {
        let mut peer = Doc::with_client_id(2);
        for index in order {
            peer.apply_update_v1(&updates[index]).unwrap();
        }
        assert!(!peer.has_pending(), "order {order:?} left pending blocks");
        assert_eq!(text_of(&mut peer), expected, "order {order:?}");
    }
}

#[test]
fn gaps_wait_for_missing_updates() {
    let (_, updates) = three_steps();
    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&updates[1]).unwrap();
    assert!(peer.has_pending());
    assert_eq!(text_of(&mut peer), "");
    assert_eq!(peer.state_vector().get(&1), 0);
    peer.apply_update_v1(&updates[0]).unwrap();
    assert!(!peer.has_pending());
    assert_eq!(text_of(&mut peer), "abcdef");
}

#[test]
fn deletes_of_unknown_content_wait_too() {
    let mut doc = Doc::with_client_id(1);
    let text = doc.get_or_insert_text("t");
    doc.transact(|txn| text.insert(txn, 0, "hello").unwrap());
    let insert = full_update(&doc);
    let before = doc.state_vector();
    doc.transact(|txn| text.remove_range(txn, 0, 1).unwrap());
    let delete = doc.encode_state_as_update_v1(&before);

    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&delete).unwrap();
    assert!(peer.has_pending());
    peer.apply_update_v1(&insert).unwrap();
    assert!(!peer.has_pending());
    assert_eq!(text_of(&mut peer), "ello");
}

// =============================================================================
// Formats and helpers
// =============================================================================

#[test]
fn v2_carries_the_same_document() {
    let mut doc = Doc::with_client_id(4);
    let map = doc.get_or_insert_map("m");
    let array = doc.get_or_insert_array("a");
    let text = doc.get_or_insert_text("t");
    doc.transact(|txn| {
        map.insert(txn, "name", "tandem");
        map.insert(txn, "count", 3);
        array.push_back(txn, true).unwrap();
        array.push_back(txn, vec![1u8, 2, 3]).unwrap();
        text.insert(txn, 0, "héllo wörld").unwrap();
    });
    doc.transact(|txn| text.remove_range(txn, 2, 4).unwrap());

    let mut peer = Doc::with_client_id(5);
    peer.apply_update_v2(&doc.encode_state_as_update_v2(&StateVector::new())).unwrap();
    assert_eq!(peer.to_json(), doc.to_json());
    assert_eq!(peer.state_vector(), doc.state_vector());

    let v1 = full_update(&doc);
    let back = convert_update_v2_to_v1(&convert_update_v1_to_v2(&v1).unwrap()).unwrap();
    let mut converted = Doc::with_client_id(6);
    converted.apply_update_v1(&back).unwrap();
    assert_eq!(converted.to_json(), doc.to_json());
}

#[test]
fn merged_updates_apply_like_their_parts() {
    let (doc, updates) = three_steps();
    let parts: Vec<&[u8]> = updates.iter().map(|u| u.as_slice()).collect();
    let merged = tandem::merge_updates_v1(&parts).unwrap();
    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&merged).unwrap();
    assert_eq!(peer.to_json(), doc.to_json());

    let reversed: Vec<&[u8]> = parts.iter().rev().copied().collect();
    let mut other = Doc::with_client_id(3);
    other.apply_update_v1(&tandem::merge_updates_v1(&reversed).unwrap()).unwrap();
    assert_eq!(other.to_json(), doc.to_json());
}

#[test]
fn diff_drops_known_blocks() {
    let (doc, updates) = three_steps();
    let full = full_update(&doc);
    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&updates[0]).unwrap();

    let diff = tandem::diff_update_v1(&full, &peer.encode_state_vector()).unwrap();
    let update = Update::decode_v1(&diff).unwrap();
    assert!(update.blocks().all(|block| block.id().clock >= 3));
    peer.apply_update_v1(&diff).unwrap();
    assert_eq!(peer.to_json(), doc.to_json());
}

#[test]
fn state_vector_of_an_update() {
    let (doc, _) = three_steps();
    let sv = encode_state_vector_from_update_v1(&full_update(&doc)).unwrap();
    assert_eq!(StateVector::decode(&sv).unwrap(), doc.state_vector());
}

#[test]
fn malformed_updates_leave_the_doc_alone() {
    let (doc, _) = three_steps();
    let full = full_update(&doc);
    let mut peer = Doc::with_client_id(2);
    let err = peer.apply_update_v1(&full[..full.len() / 2]).unwrap_err();
    assert!(err.is_decode_error());
    assert!(peer.state_vector().is_empty());
    assert!(!peer.has_pending());
}

#[test]
fn out_of_range_edits_fail() {
    let mut doc = Doc::with_client_id(1);
    let text = doc.get_or_insert_text("t");
    doc.transact(|txn| text.insert(txn, 0, "abc").unwrap());
    let err = doc.transact(|txn| text.remove_range(txn, 2, 5)).unwrap_err();
    assert!(matches!(err, Error::LengthExceeded { .. }));
    let err = doc.transact(|txn| text.insert(txn, 9, "x")).unwrap_err();
    assert!(matches!(err, Error::LengthExceeded { .. }));
    assert_eq!(text.get_string(&doc), "abc");
}
