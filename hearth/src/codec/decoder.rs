use prost::Message;

use super::{Action, CodecError, Namespace, RoomOp};
use crate::proto::room::{Event, Invite, Operation, User, Writer};

/// Split a log entry into its tag and payload bytes.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation, CodecError> {
    Ok(Operation::decode(bytes)?)
}

impl RoomOp {
    pub fn decode(namespace: &Namespace, bytes: &[u8]) -> Result<Self, CodecError> {
        let Operation { tag, payload } = decode_operation(bytes)?;
        let payload = payload.as_slice();
        let op = match namespace.action(&tag)? {
            Action::AddWriter => RoomOp::AddWriter(Writer::decode(payload)?),
            Action::AddInvite => RoomOp::AddInvite(Invite::decode(payload)?),
            Action::DelInvite => RoomOp::DelInvite(Invite::decode(payload)?),
            Action::AddUser => RoomOp::AddUser(User::decode(payload)?),
            Action::DelUser => RoomOp::DelUser(User::decode(payload)?),
            Action::AddEvent => RoomOp::AddEvent(Event::decode(payload)?),
            Action::DelEvent => RoomOp::DelEvent(Event::decode(payload)?),
        };
        Ok(op)
    }
}
