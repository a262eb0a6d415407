use bytes::Bytes;

use crate::keys::WriterKey;

/// A single entry of the ordered log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Position in the total order, starting at 0.
    pub seq: u64,
    /// The writer which appended this node.
    pub writer: WriterKey,
    /// An encoded [Operation](crate::proto::room::Operation).
    pub value: Bytes,
}

/// Effects on the log requested while applying a batch.
#[derive(Debug, Default)]
pub struct LogHandle {
    writers: Vec<WriterKey>,
}

impl LogHandle {
    /// Admit `key` as a writer. Admitting an existing writer is a no-op.
    pub fn add_writer(&mut self, key: WriterKey) {
        if !self.writers.contains(&key) {
            self.writers.push(key);
        }
    }

    /// Writers admitted during the batch, in the order they were added.
    pub fn writers(&self) -> &[WriterKey] {
        &self.writers
    }

    pub fn merge(&mut self, other: LogHandle) {
        for key in other.writers {
            self.add_writer(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_writer_is_idempotent() {
        let a = WriterKey::from_bytes([1; 32]);
        let b = WriterKey::from_bytes([2; 32]);
        let mut handle = LogHandle::default();
        handle.add_writer(a);
        handle.add_writer(b);
        handle.add_writer(a);
        assert_eq!(handle.writers(), &[a, b]);
    }
}
