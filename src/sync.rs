// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! The sync handshake.
//!
//! A peer opens with [`Message::SyncStep1`] carrying its state vector. The
//! other side answers with [`Message::SyncStep2`], the update holding
//! everything the first peer is missing. After that either side pushes
//! [`Message::Update`]s as local changes commit. Updates are V1 encoded.
//! Moving the bytes is up to the caller.

use tracing::debug;
use tracing::warn;

use crate::crdt::primitives::StateVector;
use crate::doc::Doc;
use crate::encoding::Cursor;
use crate::encoding::Write;
use crate::error::Error;
use crate::error::Result;

pub const MSG_SYNC_STEP_1: u32 = 0;
pub const MSG_SYNC_STEP_2: u32 = 1;
pub const MSG_UPDATE: u32 = 2;

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// The sender's state vector.
    SyncStep1(StateVector),
    /// An update answering a [`Message::SyncStep1`].
    SyncStep2(Vec<u8>),
    /// A live update.
    Update(Vec<u8>),
}

impl Message {
    /// `varuint(type) varuint(len) payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::SyncStep1(sv) => {
                buf.write_var_u32(MSG_SYNC_STEP_1);
                buf.write_buf(&sv.encode());
            }
            Message::SyncStep2(update) => {
                buf.write_var_u32(MSG_SYNC_STEP_2);
                buf.write_buf(update);
            }
            Message::Update(update) => {
                buf.write_var_u32(MSG_UPDATE);
                buf.write_buf(update);
            }
        }
        return buf;
    }

    pub fn decode(buf: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(buf);
        return Message::decode_from(&mut cursor);
    }

    /// Read one message, leaving the cursor after it.
    pub fn decode_from(cursor: &mut Cursor<'_>) -> Result<Message> {
        let tag = cursor.read_var_u32()?;
        let payload = cursor.read_buf()?;
        return match tag {
            MSG_SYNC_STEP_1 => Ok(Message::SyncStep1(StateVector::decode(payload)?)),
            MSG_SYNC_STEP_2 => Ok(Message::SyncStep2(payload.to_vec())),
            MSG_UPDATE => Ok(Message::Update(payload.to_vec())),
            tag => Err(Error::UnexpectedTag { kind: "sync message", tag }),
        };
    }
}

/// The message that opens a handshake.
pub fn sync_step1(doc: &Doc) -> Message {
    return Message::SyncStep1(doc.state_vector());
}

/// React to a message from a peer. Returns the reply, if any. An update
/// that fails to decode is logged and rejected and the document is left
/// as it was.
pub fn handle_message(doc: &mut Doc, message: Message) -> Result<Option<Message>> {
    match message {
        Message::SyncStep1(sv) => {
            debug!(clients = sv.len(), "answering sync step 1");
            return Ok(Some(Message::SyncStep2(doc.encode_state_as_update_v1(&sv))));
        }
        Message::SyncStep2(update) | Message::Update(update) => {
            if let Err(err) = doc.apply_update_v1(&update) {
                warn!(%err, len = update.len(), "rejected update from peer");
                return Err(err);
            }
            return Ok(None);
        }
    }
}

/// Decode and handle a raw message, encoding the reply.
pub fn handle_bytes(doc: &mut Doc, buf: &[u8]) -> Result<Option<Vec<u8>>> {
    let message = match Message::decode(buf) {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, len = buf.len(), "rejected malformed sync message");
            return Err(err);
        }
    };
    let reply = handle_message(doc, message)?;
    return Ok(reply.map(|reply| reply.encode()));
}
