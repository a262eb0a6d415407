/// An operation as it is appended to the shared log.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operation {
    /// Namespaced operation tag, e.g. `@multiWriter/add-user`.
    #[prost(string, required, tag = "1")]
    pub tag: ::prost::alloc::string::String,
    /// The encoded payload record for the tag.
    #[prost(bytes = "vec", required, tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
/// A peer allowed to append to the shared log.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Writer {
    #[prost(bytes = "vec", required, tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
}
/// A pairing invite as stored in the document view.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Invite {
    #[prost(bytes = "vec", required, tag = "1")]
    pub id: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub invite: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", required, tag = "3")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
    /// Unix timestamp in milliseconds.
    #[prost(int64, required, tag = "4")]
    pub expires: i64,
}
/// A user record. `info` is JSON text.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(string, required, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "2")]
    pub info: ::core::option::Option<::prost::alloc::string::String>,
}
/// An event record. `data` is JSON text.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(string, required, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "2")]
    pub data: ::core::option::Option<::prost::alloc::string::String>,
}
