use std::{path::PathBuf, time::Duration};

use crate::constants::{DEFAULT_INVITE_TTL, DEFAULT_NAMESPACE, DEFAULT_STORAGE};

/// Everything needed to construct a [Room](crate::Room).
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Where this peer keeps its writer core, log and views.
    pub storage: PathBuf,
    /// Bootstrap peers handed to discovery.
    pub bootstrap: Vec<String>,
    /// z-base-32 invite to join an existing room with.
    pub invite: Option<String>,
    /// Prefix of every operation tag and collection name.
    pub namespace: String,
    /// Lifetime of invites created by this peer.
    pub invite_ttl: Duration,
    /// Give up joining after this long. Waits forever when unset.
    pub join_timeout: Option<Duration>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            storage: PathBuf::from(DEFAULT_STORAGE),
            bootstrap: Vec::new(),
            invite: None,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            invite_ttl: DEFAULT_INVITE_TTL,
            join_timeout: None,
        }
    }
}

impl RoomConfig {
    pub fn new(storage: impl Into<PathBuf>) -> Self {
        Self {
            storage: storage.into(),
            ..Default::default()
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: Vec<String>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_invite(mut self, invite: impl Into<String>) -> Self {
        self.invite = Some(invite.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_invite_ttl(mut self, ttl: Duration) -> Self {
        self.invite_ttl = ttl;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }
}
