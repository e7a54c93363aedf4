//! Remote authority abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An append-only, sequence-checked log of record.
///
/// Streams are addressed by `(stream, shard)`. The authority stores opaque
/// blobs and never sees plaintext.
pub trait RemoteLog: Send + Sync {
    /// Returns the number of entries in a stream (0 if it does not exist).
    fn get_index(&self, stream: &str, shard: &str) -> SyncResult<u64>;

    /// Fetches one entry.
    ///
    /// Fails with [`SyncError::NotFound`] if `index` is past the end.
    fn get_entry(&self, stream: &str, shard: &str, index: u64) -> SyncResult<Vec<u8>>;

    /// Appends an entry at `index`.
    ///
    /// Fails with [`SyncError::SequenceConflict`] unless `index` equals the
    /// current entry count.
    fn put_entry(
        &self,
        stream: &str,
        shard: &str,
        index: u64,
        blob: &[u8],
        proof: &[u8],
    ) -> SyncResult<()>;

    /// Creates an empty stream.
    fn create(&self, owner_proof: &[u8], stream: &str, shard: &str) -> SyncResult<()>;
}

impl<R: RemoteLog + ?Sized> RemoteLog for Arc<R> {
    fn get_index(&self, stream: &str, shard: &str) -> SyncResult<u64> {
        (**self).get_index(stream, shard)
    }

    fn get_entry(&self, stream: &str, shard: &str, index: u64) -> SyncResult<Vec<u8>> {
        (**self).get_entry(stream, shard, index)
    }

    fn put_entry(
        &self,
        stream: &str,
        shard: &str,
        index: u64,
        blob: &[u8],
        proof: &[u8],
    ) -> SyncResult<()> {
        (**self).put_entry(stream, shard, index, blob, proof)
    }

    fn create(&self, owner_proof: &[u8], stream: &str, shard: &str) -> SyncResult<()> {
        (**self).create(owner_proof, stream, shard)
    }
}

type StreamKey = (String, String);

/// An in-memory remote for tests.
///
/// Streams must be created before they accept appends. The remote can be
/// disconnected to exercise transport failures.
#[derive(Debug)]
pub struct MockRemote {
    connected: AtomicBool,
    streams: RwLock<HashMap<StreamKey, Vec<Vec<u8>>>>,
}

impl MockRemote {
    /// Creates a connected remote with no streams.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Checks if the remote is connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns a copy of a stream's entries.
    pub fn entries(&self, stream: &str, shard: &str) -> Vec<Vec<u8>> {
        self.streams
            .read()
            .get(&key(stream, shard))
            .cloned()
            .unwrap_or_default()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn key(stream: &str, shard: &str) -> StreamKey {
    (stream.to_string(), shard.to_string())
}

impl RemoteLog for MockRemote {
    fn get_index(&self, stream: &str, shard: &str) -> SyncResult<u64> {
        self.check_connected()?;
        Ok(self
            .streams
            .read()
            .get(&key(stream, shard))
            .map_or(0, |entries| entries.len() as u64))
    }

    fn get_entry(&self, stream: &str, shard: &str, index: u64) -> SyncResult<Vec<u8>> {
        self.check_connected()?;
        self.streams
            .read()
            .get(&key(stream, shard))
            .and_then(|entries| entries.get(index as usize))
            .cloned()
            .ok_or(SyncError::NotFound { index })
    }

    fn put_entry(
        &self,
        stream: &str,
        shard: &str,
        index: u64,
        blob: &[u8],
        _proof: &[u8],
    ) -> SyncResult<()> {
        self.check_connected()?;
        let mut streams = self.streams.write();
        let entries = streams
            .get_mut(&key(stream, shard))
            .ok_or_else(|| SyncError::transport_fatal(format!("stream not created: {stream}")))?;
        let expected = entries.len() as u64;
        if index != expected {
            return Err(SyncError::SequenceConflict {
                expected,
                actual: index,
            });
        }
        entries.push(blob.to_vec());
        Ok(())
    }

    fn create(&self, _owner_proof: &[u8], stream: &str, shard: &str) -> SyncResult<()> {
        self.check_connected()?;
        self.streams
            .write()
            .entry(key(stream, shard))
            .or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_remote_connection() {
        let remote = MockRemote::new();
        assert!(remote.is_connected());
        remote.set_connected(false);
        assert!(matches!(
            remote.get_index("s", "actions"),
            Err(SyncError::NotConnected)
        ));
    }

    #[test]
    fn appends_are_sequence_checked() {
        let remote = MockRemote::new();
        remote.create(b"", "s", "actions").unwrap();
        remote.put_entry("s", "actions", 0, b"a", b"").unwrap();

        let err = remote.put_entry("s", "actions", 0, b"b", b"").unwrap_err();
        assert!(matches!(
            err,
            SyncError::SequenceConflict {
                expected: 1,
                actual: 0
            }
        ));
        assert!(remote.put_entry("s", "actions", 2, b"b", b"").unwrap_err().is_conflict());

        remote.put_entry("s", "actions", 1, b"b", b"").unwrap();
        assert_eq!(remote.get_index("s", "actions").unwrap(), 2);
        assert_eq!(remote.get_entry("s", "actions", 1).unwrap(), b"b");
    }

    #[test]
    fn missing_entries() {
        let remote = MockRemote::new();
        assert_eq!(remote.get_index("s", "actions").unwrap(), 0);
        assert!(matches!(
            remote.get_entry("s", "actions", 0),
            Err(SyncError::NotFound { index: 0 })
        ));
        assert!(remote.put_entry("s", "actions", 0, b"a", b"").is_err());
    }

    #[test]
    fn shared_through_arc() {
        let remote = Arc::new(MockRemote::new());
        let other = Arc::clone(&remote);
        remote.create(b"", "s", "actions").unwrap();
        other.put_entry("s", "actions", 0, b"a", b"").unwrap();
        assert_eq!(RemoteLog::get_index(&remote, "s", "actions").unwrap(), 1);
        assert_eq!(remote.entries("s", "actions").len(), 1);
    }
}
