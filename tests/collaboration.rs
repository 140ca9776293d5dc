// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Peers talking through sync messages, with undo and sticky cursors.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use tandem::Assoc;
use tandem::Doc;
use tandem::Message;
use tandem::StickyIndex;
use tandem::SharedRef;
use tandem::UndoManager;
use tandem::UndoOptions;
use tandem::sync;

/// A peer that records every update it commits as an outgoing message.
struct Peer {
    doc: Doc,
    outbox: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Peer {
    fn new(client: u32) -> Peer {
        let mut doc = Doc::with_client_id(client);
        let outbox = Rc::new(RefCell::new(Vec::new()));
        let sink = outbox.clone();
        doc.observe_update_v1(move |_, event| {
            if event.origin.as_ref().map(|o| o.as_str()) != Some("remote") {
                sink.borrow_mut().push(Message::Update(event.update.clone()).encode());
            }
        });
        return Peer { doc, outbox };
    }

    fn receive(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        let message = Message::decode(bytes).unwrap();
        return match message {
            Message::Update(update) => {
                let decoded = tandem::Update::decode_v1(&update).unwrap();
                self.doc.apply_update(decoded, Some("remote".into()));
                None
            }
            other => sync::handle_message(&mut self.doc, other).unwrap().map(|m| m.encode()),
        };
    }

    fn drain(&self) -> Vec<Vec<u8>> {
        return self.outbox.borrow_mut().drain(..).collect();
    }
}

/// Deliver every pending outgoing message to every other peer.
fn flush(peers: &mut [Peer]) {
    loop {
        let mut delivered = false;
        for from in 0..peers.len() {
            for bytes in peers[from].drain() {
                delivered = true;
                for to in 0..peers.len() {
                    if to != from {
                        peers[to].receive(&bytes);
                    }
                }
            }
        }
        if !delivered {
            return;
        }
    }
}

#[test]
fn late_joiner_catches_up_through_the_handshake() {
    let mut peers = vec![Peer::new(1), Peer::new(2)];
    let text = peers[0].doc.get_or_insert_text("t");
    peers[0].doc.transact(|txn| text.insert(txn, 0, "shared").unwrap());
    flush(&mut peers);

    let mut late = Peer::new(3);
    let step1 = sync::sync_step1(&late.doc).encode();
    let step2 = peers[1].receive(&step1).unwrap();
    assert!(late.receive(&step2).is_none());
    let remote = late.doc.get_or_insert_text("t");
    assert_eq!(remote.get_string(&late.doc), "shared");
}

#[test]
fn three_peers_converge() {
    let mut peers = vec![Peer::new(1), Peer::new(2), Peer::new(3)];
    let texts: Vec<_> = peers.iter_mut().map(|p| p.doc.get_or_insert_text("t")).collect();
    for (i, peer) in peers.iter_mut().enumerate() {
        let text = &texts[i];
        peer.doc.transact(|txn| text.insert(txn, 0, &format!("<{i}>")).unwrap());
    }
    flush(&mut peers);
    for (i, peer) in peers.iter_mut().enumerate() {
        let text = &texts[i];
        let len = text.len(&peer.doc);
        peer.doc.transact(|txn| text.insert(txn, len, "!").unwrap());
    }
    flush(&mut peers);

    let expected = texts[0].get_string(&peers[0].doc);
    assert_eq!(expected.len(), 12);
    for (i, peer) in peers.iter().enumerate() {
        assert_eq!(texts[i].get_string(&peer.doc), expected);
    }
}

#[test]
fn undo_propagates_but_only_reverts_local_edits() {
    let mut peers = vec![Peer::new(1), Peer::new(2)];
    let ta = peers[0].doc.get_or_insert_text("t");
    let tb = peers[1].doc.get_or_insert_text("t");
    let options = UndoOptions { capture_timeout_millis: 0, ..UndoOptions::default() };
    let mut undo = UndoManager::with_options(&mut peers[0].doc, &ta, options);

    peers[0].doc.transact(|txn| ta.insert(txn, 0, "mine ").unwrap());
    flush(&mut peers);
    peers[1].doc.transact(|txn| tb.insert(txn, 5, "theirs").unwrap());
    flush(&mut peers);
    assert_eq!(ta.get_string(&peers[0].doc), "mine theirs");

    assert!(undo.undo(&mut peers[0].doc));
    flush(&mut peers);
    assert_eq!(ta.get_string(&peers[0].doc), "theirs");
    assert_eq!(tb.get_string(&peers[1].doc), "theirs");

    assert!(undo.redo(&mut peers[0].doc));
    flush(&mut peers);
    assert_eq!(tb.get_string(&peers[1].doc), "mine theirs");
}

#[test]
fn cursors_survive_remote_edits() {
    let mut peers = vec![Peer::new(1), Peer::new(2)];
    let ta = peers[0].doc.get_or_insert_text("t");
    let tb = peers[1].doc.get_or_insert_text("t");
    peers[0].doc.transact(|txn| ta.insert(txn, 0, "hello world").unwrap());
    flush(&mut peers);

    let cursor = StickyIndex::at(&peers[0].doc, ta.ptr(), 6, Assoc::After).unwrap();
    let wire = cursor.encode();
    peers[1].doc.transact(|txn| tb.insert(txn, 0, ">> ").unwrap());
    peers[1].doc.transact(|txn| tb.remove_range(txn, 8, 1).unwrap());
    flush(&mut peers);

    assert_eq!(ta.get_string(&peers[0].doc), ">> helloworld");
    let decoded = StickyIndex::decode(&wire).unwrap();
    for (peer, text) in peers.iter().zip([&ta, &tb]) {
        let offset = decoded.resolve(&peer.doc).unwrap();
        let rest: String = text.get_string(&peer.doc).chars().skip(offset.index as usize).collect();
        assert_eq!(rest, "world");
    }
}
