//! Fixed size keys identifying logs, writers and discovery topics.
//!
//! All keys are 32 bytes and render as z-base-32 for humans.

use std::fmt;

use thiserror::Error;

use crate::constants::DISCOVERY_KEY_CONTEXT;

/// Raised when bytes of the wrong length are interpreted as a key.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("expected a 32 byte key, found {0} bytes")]
pub struct KeyLengthError(pub usize);

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// A fresh random key.
            pub fn generate() -> Self {
                Self(rand::random())
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            pub fn to_z32(&self) -> String {
                z32::encode(&self.0)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = KeyLengthError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                <[u8; 32]>::try_from(bytes)
                    .map(Self)
                    .map_err(|_| KeyLengthError(bytes.len()))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_z32())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let z32 = self.to_z32();
                write!(f, "{}({})", stringify!($name), &z32[..10])
            }
        }
    };
}

key_type!(
    /// Identifies a shared log, and therefore a room.
    LogKey
);
key_type!(
    /// Identifies a peer's writer core.
    WriterKey
);
key_type!(
    /// The topic under which peers of a room find each other. Derived from
    /// the [LogKey] so that it can be published without revealing the log.
    DiscoveryKey
);
key_type!(
    /// Symmetric key handed to admitted writers alongside the [LogKey].
    EncryptionKey
);

impl LogKey {
    pub fn discovery_key(&self) -> DiscoveryKey {
        DiscoveryKey(blake3::derive_key(DISCOVERY_KEY_CONTEXT, &self.0))
    }
}
