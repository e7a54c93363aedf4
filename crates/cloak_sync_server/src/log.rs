//! Server-side stream storage.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;

type StreamKey = (String, String);

/// Append-only entry logs, one per `(stream, shard)`.
///
/// Appends are sequence-checked: an entry is accepted only at the index
/// equal to the current entry count. This is the only serialization point
/// between clients sharing a stream.
#[derive(Debug, Default)]
pub struct ServerLog {
    streams: RwLock<HashMap<StreamKey, Vec<Vec<u8>>>>,
}

fn key(stream: &str, shard: &str) -> StreamKey {
    (stream.to_string(), shard.to_string())
}

impl ServerLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream.
    pub fn create(&self, stream: &str, shard: &str) -> ServerResult<()> {
        let mut streams = self.streams.write();
        let k = key(stream, shard);
        if streams.contains_key(&k) {
            return Err(ServerError::StreamExists {
                stream: stream.to_string(),
                shard: shard.to_string(),
            });
        }
        streams.insert(k, Vec::new());
        Ok(())
    }

    /// Returns true if the stream exists.
    pub fn contains(&self, stream: &str, shard: &str) -> bool {
        self.streams.read().contains_key(&key(stream, shard))
    }

    /// Returns the entry count (0 for a stream that was never created).
    pub fn index(&self, stream: &str, shard: &str) -> u64 {
        self.streams
            .read()
            .get(&key(stream, shard))
            .map_or(0, |entries| entries.len() as u64)
    }

    /// Returns the entry at `index`.
    pub fn entry(&self, stream: &str, shard: &str, index: u64) -> ServerResult<Vec<u8>> {
        let streams = self.streams.read();
        let entries = streams
            .get(&key(stream, shard))
            .ok_or_else(|| ServerError::StreamNotFound {
                stream: stream.to_string(),
                shard: shard.to_string(),
            })?;
        usize::try_from(index)
            .ok()
            .and_then(|i| entries.get(i))
            .cloned()
            .ok_or(ServerError::EntryNotFound { index })
    }

    /// Appends an entry at `index`, which must equal the entry count.
    ///
    /// Returns the new entry count.
    pub fn append(
        &self,
        stream: &str,
        shard: &str,
        index: u64,
        blob: Vec<u8>,
    ) -> ServerResult<u64> {
        let mut streams = self.streams.write();
        let entries = streams
            .get_mut(&key(stream, shard))
            .ok_or_else(|| ServerError::StreamNotFound {
                stream: stream.to_string(),
                shard: shard.to_string(),
            })?;
        let expected = entries.len() as u64;
        if index != expected {
            return Err(ServerError::SequenceConflict {
                expected,
                actual: index,
            });
        }
        entries.push(blob);
        Ok(expected + 1)
    }

    /// Returns the number of streams.
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log() {
        let log = ServerLog::new();
        assert_eq!(log.index("s", "actions"), 0);
        assert!(!log.contains("s", "actions"));
        assert!(matches!(
            log.entry("s", "actions", 0),
            Err(ServerError::StreamNotFound { .. })
        ));
        assert!(log.append("s", "actions", 0, vec![1]).is_err());
    }

    #[test]
    fn create_once() {
        let log = ServerLog::new();
        log.create("s", "actions").unwrap();
        assert!(matches!(
            log.create("s", "actions"),
            Err(ServerError::StreamExists { .. })
        ));
        log.create("s", "keys").unwrap();
        assert_eq!(log.stream_count(), 2);
    }

    #[test]
    fn append_and_read() {
        let log = ServerLog::new();
        log.create("s", "actions").unwrap();
        assert_eq!(log.append("s", "actions", 0, b"a".to_vec()).unwrap(), 1);
        assert_eq!(log.append("s", "actions", 1, b"b".to_vec()).unwrap(), 2);

        assert_eq!(log.index("s", "actions"), 2);
        assert_eq!(log.entry("s", "actions", 0).unwrap(), b"a");
        assert_eq!(log.entry("s", "actions", 1).unwrap(), b"b");
        assert!(matches!(
            log.entry("s", "actions", 2),
            Err(ServerError::EntryNotFound { index: 2 })
        ));
    }

    #[test]
    fn stale_or_skipped_index_conflicts() {
        let log = ServerLog::new();
        log.create("s", "actions").unwrap();
        log.append("s", "actions", 0, b"a".to_vec()).unwrap();

        for index in [0, 2, 7] {
            match log.append("s", "actions", index, b"x".to_vec()) {
                Err(ServerError::SequenceConflict { expected, actual }) => {
                    assert_eq!(expected, 1);
                    assert_eq!(actual, index);
                }
                other => panic!("expected conflict, got {other:?}"),
            }
        }
        assert_eq!(log.index("s", "actions"), 1);
    }
}
