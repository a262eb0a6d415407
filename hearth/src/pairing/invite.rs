//! The cryptographic core shared by every pairing transport.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use prost::Message;

use super::PairingError;
use crate::{
    constants::{INVITE_ID_CONTEXT, PAIRING_REQUEST_PREFIX},
    keys::{DiscoveryKey, LogKey, WriterKey},
    proto::{
        pairing::{InviteToken, PairingRequest},
        room::Invite,
    },
};

/// The id under which an invite is stored, derived from its public key.
pub fn invite_id(public_key: &[u8]) -> Vec<u8> {
    blake3::derive_key(INVITE_ID_CONTEXT, public_key).to_vec()
}

fn signed_bytes(invite_id: &[u8], user_data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAIRING_REQUEST_PREFIX.len() + invite_id.len() + user_data.len());
    buf.extend_from_slice(PAIRING_REQUEST_PREFIX);
    buf.extend_from_slice(invite_id);
    buf.extend_from_slice(user_data);
    buf
}

fn signing_key(token: &InviteToken) -> Result<SigningKey, PairingError> {
    let seed: [u8; 32] = token
        .seed
        .as_slice()
        .try_into()
        .map_err(|_| PairingError::InvalidInvite("seed must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Generate a new invite for `key`. The returned record's `invite` field is
/// the encoded [InviteToken] to hand to the candidate.
pub fn create_invite(key: &LogKey, expires: i64) -> Invite {
    let seed: [u8; 32] = rand::random();
    let public_key = SigningKey::from_bytes(&seed).verifying_key().to_bytes().to_vec();
    let token = InviteToken {
        seed: seed.to_vec(),
        discovery_key: key.discovery_key().to_vec(),
        expires,
    };
    Invite {
        id: invite_id(&public_key),
        invite: token.encode_to_vec(),
        public_key,
        expires,
    }
}

/// Decode and validate an invite token.
pub fn decode_token(invite: &[u8]) -> Result<InviteToken, PairingError> {
    let token = InviteToken::decode(invite)?;
    signing_key(&token)?;
    DiscoveryKey::try_from(token.discovery_key.as_slice())?;
    Ok(token)
}

/// The topic a token's room is found under.
pub fn token_topic(token: &InviteToken) -> Result<DiscoveryKey, PairingError> {
    Ok(DiscoveryKey::try_from(token.discovery_key.as_slice())?)
}

/// Build the request a candidate sends to the members of the room.
pub fn candidate_request(token: &InviteToken, user_data: &WriterKey) -> Result<PairingRequest, PairingError> {
    let signing = signing_key(token)?;
    let invite_id = invite_id(signing.verifying_key().as_bytes());
    let signature = signing.sign(&signed_bytes(&invite_id, user_data.as_bytes()));
    Ok(PairingRequest {
        invite_id,
        user_data: user_data.to_vec(),
        signature: signature.to_bytes().to_vec(),
    })
}

/// Check that `request` was signed with the seed behind `public_key`.
pub fn open_request(request: &PairingRequest, public_key: &[u8]) -> Result<(), PairingError> {
    let bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| PairingError::InvalidPublicKey)?;
    let verifying = VerifyingKey::from_bytes(&bytes).map_err(|_| PairingError::InvalidPublicKey)?;
    if invite_id(&bytes) != request.invite_id {
        return Err(PairingError::InviteMismatch);
    }
    let signature = Signature::from_slice(&request.signature).map_err(|_| PairingError::BadSignature)?;
    verifying
        .verify_strict(&signed_bytes(&request.invite_id, &request.user_data), &signature)
        .map_err(|_| PairingError::BadSignature)
}
