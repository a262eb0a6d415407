use std::time::Duration;

/// Namespace used for operation tags and collection names unless configured.
pub const DEFAULT_NAMESPACE: &str = "multiWriter";

/// Storage location used when none is configured.
pub const DEFAULT_STORAGE: &str = "storage";

/// How long a freshly created invite stays valid.
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default page size for event queries.
pub const DEFAULT_EVENT_LIMIT: usize = 100;

/// Capacity of the update notification channel. Slow subscribers observe
/// `Lagged` rather than blocking the apply engine.
pub const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// blake3 key derivation context for topic discovery keys.
pub const DISCOVERY_KEY_CONTEXT: &str = "hearth 2024-01-01 room discovery key";

/// blake3 key derivation context for invite ids.
pub const INVITE_ID_CONTEXT: &str = "hearth 2024-01-01 pairing invite id";

/// Domain separation prefix for signed pairing requests.
pub const PAIRING_REQUEST_PREFIX: &[u8] = b"hearth pairing request";
