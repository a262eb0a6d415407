/// The secret shared with a candidate, z-base-32 encoded for humans.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InviteToken {
    #[prost(bytes = "vec", required, tag = "1")]
    pub seed: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub discovery_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(int64, required, tag = "3")]
    pub expires: i64,
}
/// Sent by a candidate to every member of the room topic.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub invite_id: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub user_data: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "3")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}
/// Sent back to the candidate once a member has admitted it.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingResponse {
    #[prost(bytes = "vec", required, tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub encryption_key: ::prost::alloc::vec::Vec<u8>,
}
