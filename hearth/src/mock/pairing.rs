use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::network::MockNetwork;
use crate::{
    keys::{DiscoveryKey, EncryptionKey, LogKey, WriterKey},
    oplog::LogKeys,
    pairing::{invite, MemberRequest, Pairing, PairingError, RequestHandler},
    proto::{
        pairing::{PairingRequest, PairingResponse},
        room::Invite,
    },
};

/// A pairing request as delivered to a member of a [MockNetwork].
pub struct MockRequest {
    request: PairingRequest,
    reply: mpsc::UnboundedSender<PairingResponse>,
    opened: bool,
}

impl MockRequest {
    fn new(request: PairingRequest, reply: mpsc::UnboundedSender<PairingResponse>) -> Self {
        Self {
            request,
            reply,
            opened: false,
        }
    }
}

#[async_trait]
impl MemberRequest for MockRequest {
    type Error = PairingError;

    fn invite_id(&self) -> &[u8] {
        &self.request.invite_id
    }

    fn user_data(&self) -> &[u8] {
        &self.request.user_data
    }

    fn open(&mut self, public_key: &[u8]) -> Result<(), Self::Error> {
        invite::open_request(&self.request, public_key)?;
        self.opened = true;
        Ok(())
    }

    async fn confirm(self, keys: LogKeys) -> Result<(), Self::Error> {
        if !self.opened {
            return Err(PairingError::NotOpened);
        }
        self.reply
            .send(PairingResponse {
                key: keys.key.to_vec(),
                encryption_key: keys.encryption_key.to_vec(),
            })
            .map_err(|_| PairingError::CandidateGone)
    }
}

pub struct MockMember {
    id: u64,
    cancel: CancellationToken,
}

/// Pairing over a [MockNetwork]. Candidates broadcast their request to every
/// member of the invite's topic, including members that show up later, and
/// wait for the first confirmation.
pub struct MockPairing {
    network: MockNetwork,
    cancel: CancellationToken,
    members: Mutex<Vec<u64>>,
}

impl MockPairing {
    pub fn new(network: MockNetwork) -> Self {
        Self {
            network,
            cancel: CancellationToken::new(),
            members: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Pairing for MockPairing {
    type Error = PairingError;
    type Request = MockRequest;
    type Member = MockMember;

    async fn create_invite(&self, key: &LogKey, expires: i64) -> Result<Invite, Self::Error> {
        Ok(invite::create_invite(key, expires))
    }

    async fn add_candidate(&self, invite: &[u8], user_data: WriterKey) -> Result<LogKeys, Self::Error> {
        let token = invite::decode_token(invite)?;
        let topic = invite::token_topic(&token)?;
        let request = invite::candidate_request(&token, &user_data)?;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let mut members_changed = self.network.watch_members();
        let mut sent = HashSet::new();
        debug!("Candidate {} looking for members of {}", user_data, topic);

        loop {
            for (id, member) in self.network.members(&topic) {
                if sent.insert(id) {
                    trace!("Sending pairing request to member {}", id);
                    // a member that went away simply never answers
                    let _ = member.send(MockRequest::new(request.clone(), reply_tx.clone()));
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PairingError::Closed),
                response = reply_rx.recv() => {
                    let response = response.ok_or(PairingError::Closed)?;
                    return Ok(LogKeys {
                        key: LogKey::try_from(response.key.as_slice())?,
                        encryption_key: EncryptionKey::try_from(response.encryption_key.as_slice())?,
                    });
                }
                changed = members_changed.changed() => {
                    if changed.is_err() {
                        return Err(PairingError::Closed);
                    }
                }
            }
        }
    }

    async fn add_member(
        &self,
        topic: DiscoveryKey,
        handler: Arc<dyn RequestHandler<Self::Request>>,
    ) -> Result<Self::Member, Self::Error> {
        if self.cancel.is_cancelled() {
            return Err(PairingError::Closed);
        }
        let (requests_tx, mut requests) = mpsc::unbounded_channel();
        let id = self.network.add_member(topic, requests_tx);
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);

        let cancel = self.cancel.child_token();
        let member_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = member_cancel.cancelled() => break,
                    request = requests.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                };
                // a handshake in flight is abandoned when the member closes
                tokio::select! {
                    _ = member_cancel.cancelled() => break,
                    _ = handler.on_request(request) => {}
                }
            }
            debug!("Member {} stopped", id);
        });
        info!("Member {} listening on {}", id, topic);
        Ok(MockMember { id, cancel })
    }

    async fn close_member(&self, member: Self::Member) -> Result<(), Self::Error> {
        self.network.remove_member(member.id);
        member.cancel.cancel();
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id| *id != member.id);
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.cancel.cancel();
        let members = std::mem::take(&mut *self.members.lock().unwrap_or_else(PoisonError::into_inner));
        for id in members {
            self.network.remove_member(id);
        }
        Ok(())
    }
}
