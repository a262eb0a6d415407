use bytes::Bytes;
use prost::Message;

use super::{Action, Namespace, RoomOp};
use crate::proto::room::Operation;

/// Wrap an encoded payload in the operation envelope.
pub fn encode_operation<M: Message>(tag: impl Into<String>, payload: &M) -> Bytes {
    Operation {
        tag: tag.into(),
        payload: payload.encode_to_vec(),
    }
    .encode_to_vec()
    .into()
}

impl RoomOp {
    pub fn encode(&self, namespace: &Namespace) -> Bytes {
        let tag = namespace.tag(self.action());
        match self {
            RoomOp::AddWriter(writer) => encode_operation(tag, writer),
            RoomOp::AddInvite(invite) | RoomOp::DelInvite(invite) => {
                encode_operation(tag, invite)
            }
            RoomOp::AddUser(user) | RoomOp::DelUser(user) => encode_operation(tag, user),
            RoomOp::AddEvent(event) | RoomOp::DelEvent(event) => encode_operation(tag, event),
        }
    }
}

impl Action {
    /// Encode a payload under this action's tag.
    pub fn encode<M: Message>(&self, namespace: &Namespace, payload: &M) -> Bytes {
        encode_operation(namespace.tag(*self), payload)
    }
}
