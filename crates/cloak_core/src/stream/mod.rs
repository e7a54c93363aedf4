//! Dual-partition ordered log of encrypted blobs.
//!
//! Every stream identity `(id, shard)` owns two FIFO partitions:
//!
//! - **pending**: local writes not yet accepted by the remote authority
//! - **saved**: entries confirmed by the remote authority
//!
//! Each partition numbers its entries independently. Entries only ever move
//! from pending to saved (see [`Stream::shift`]), and a moved entry is
//! renumbered at the end of the saved partition.
//!
//! ## Invariants
//!
//! - Sequence numbers within a partition are contiguous and never reused.
//!   The next sequence per partition is kept in `cache_sequence`, so an
//!   emptied partition continues from its high-water mark.
//! - `size = next - min`, or 0 for an empty partition.
//! - Saved entries are never rewritten.
//!
//! A stream also carries a persisted "rewound" marker in `cache_rewound`.
//! It is set while the rows derived from the log are being rebuilt and
//! cleared once they match the log again.

mod cursor;

pub use cursor::{Direction, Entries, EntrySlot, EntrySlots};

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache (
    id TEXT NOT NULL,
    shard TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    pending INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (id, shard, pending, sequence)
);
CREATE TABLE IF NOT EXISTS cache_sequence (
    id TEXT NOT NULL,
    shard TEXT NOT NULL,
    pending INTEGER NOT NULL,
    next INTEGER NOT NULL,
    PRIMARY KEY (id, shard, pending)
);
CREATE TABLE IF NOT EXISTS cache_rewound (
    id TEXT NOT NULL,
    shard TEXT NOT NULL,
    PRIMARY KEY (id, shard)
);
";

/// One of the two partitions of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Local, unconfirmed writes.
    Pending,
    /// Remote-confirmed entries.
    Saved,
}

impl Partition {
    fn flag(self) -> i64 {
        match self {
            Partition::Pending => 1,
            Partition::Saved => 0,
        }
    }
}

/// An entry read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Position within the partition.
    pub sequence: u64,
    /// Partition the entry was read from.
    pub partition: Partition,
    /// Opaque (encrypted) payload.
    pub data: Vec<u8>,
}

/// Owner of the log tables in a database.
#[derive(Debug, Clone)]
pub struct StreamCache {
    db: Database,
}

impl StreamCache {
    /// Creates the log tables if needed.
    pub fn new(db: Database) -> CoreResult<Self> {
        db.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })?;
        Ok(Self { db })
    }

    /// Returns the stream for one stream identity.
    pub fn stream(&self, id: impl Into<String>, shard: impl Into<String>) -> Stream {
        Stream {
            db: self.db.clone(),
            key: StreamKey {
                id: id.into(),
                shard: shard.into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StreamKey {
    pub(crate) id: String,
    pub(crate) shard: String,
}

impl StreamKey {
    fn min(&self, conn: &Connection, partition: Partition) -> CoreResult<Option<u64>> {
        let min: Option<i64> = conn.query_row(
            "SELECT min(sequence) FROM cache WHERE id = ?1 AND shard = ?2 AND pending = ?3",
            params![self.id, self.shard, partition.flag()],
            |row| row.get(0),
        )?;
        Ok(min.map(|v| v as u64))
    }

    fn next(&self, conn: &Connection, partition: Partition) -> CoreResult<u64> {
        let next: Option<i64> = conn
            .query_row(
                "SELECT next FROM cache_sequence WHERE id = ?1 AND shard = ?2 AND pending = ?3",
                params![self.id, self.shard, partition.flag()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(next.map_or(0, |v| v as u64))
    }

    fn set_next(&self, conn: &Connection, partition: Partition, next: u64) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO cache_sequence (id, shard, pending, next) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id, shard, pending) DO UPDATE SET next = excluded.next",
            params![self.id, self.shard, partition.flag(), next as i64],
        )?;
        Ok(())
    }

    pub(crate) fn bounds(
        &self,
        conn: &Connection,
        partition: Partition,
    ) -> CoreResult<Option<(u64, u64)>> {
        match self.min(conn, partition)? {
            Some(min) => Ok(Some((min, self.next(conn, partition)?))),
            None => Ok(None),
        }
    }

    fn size(&self, conn: &Connection, partition: Partition) -> CoreResult<u64> {
        Ok(self
            .bounds(conn, partition)?
            .map_or(0, |(min, next)| next.saturating_sub(min)))
    }

    fn push(&self, conn: &Connection, partition: Partition, blob: &[u8]) -> CoreResult<u64> {
        let sequence = self.next(conn, partition)?;
        conn.execute(
            "INSERT INTO cache (id, shard, sequence, pending, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.shard, sequence as i64, partition.flag(), blob],
        )?;
        self.set_next(conn, partition, sequence + 1)?;
        Ok(sequence)
    }

    pub(crate) fn fetch(
        &self,
        conn: &Connection,
        partition: Partition,
        sequence: u64,
    ) -> CoreResult<Option<Vec<u8>>> {
        Ok(conn
            .query_row(
                "SELECT data FROM cache
                 WHERE id = ?1 AND shard = ?2 AND sequence = ?3 AND pending = ?4",
                params![self.id, self.shard, sequence as i64, partition.flag()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub(crate) fn replace(&self, conn: &Connection, sequence: u64, data: &[u8]) -> CoreResult<()> {
        conn.execute(
            "UPDATE cache SET data = ?1
             WHERE id = ?2 AND shard = ?3 AND sequence = ?4 AND pending = ?5",
            params![
                data,
                self.id,
                self.shard,
                sequence as i64,
                Partition::Pending.flag()
            ],
        )?;
        Ok(())
    }
}

/// The log of one stream identity.
#[derive(Debug, Clone)]
pub struct Stream {
    db: Database,
    key: StreamKey,
}

impl Stream {
    /// Returns the stream id.
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Returns the shard name.
    pub fn shard(&self) -> &str {
        &self.key.shard
    }

    /// Returns the number of entries in a partition.
    pub fn size(&self, partition: Partition) -> CoreResult<u64> {
        self.db.with_conn(|conn| self.key.size(conn, partition))
    }

    /// Appends one entry at the partition's next sequence number.
    ///
    /// Returns the assigned sequence number.
    pub fn push(&self, partition: Partition, blob: &[u8]) -> CoreResult<u64> {
        self.db
            .transaction(|tx| self.key.push(tx, partition, blob))
    }

    /// Appends entries in input order.
    ///
    /// All entries land in one transaction, so no other push can interleave.
    pub fn push_all<B: AsRef<[u8]>>(&self, partition: Partition, blobs: &[B]) -> CoreResult<()> {
        self.db.transaction(|tx| {
            for blob in blobs {
                self.key.push(tx, partition, blob.as_ref())?;
            }
            Ok(())
        })
    }

    /// Moves the `count` oldest pending entries to the saved partition.
    ///
    /// Entries move one at a time; every step re-reads the lowest pending
    /// sequence and the next saved sequence. The size check and the moves
    /// share one transaction: if `count` exceeds the pending size nothing
    /// moves.
    pub fn shift(&self, count: u64) -> CoreResult<()> {
        self.db.transaction(|tx| {
            let size = self.key.size(tx, Partition::Pending)?;
            if count > size {
                return Err(CoreError::ShiftExceedsSize {
                    requested: count,
                    size,
                });
            }

            for _ in 0..count {
                let from = self
                    .key
                    .min(tx, Partition::Pending)?
                    .ok_or(CoreError::ShiftExceedsSize {
                        requested: count,
                        size,
                    })?;
                let to = self.key.next(tx, Partition::Saved)?;
                tx.execute(
                    "UPDATE cache SET sequence = ?1, pending = ?2
                     WHERE id = ?3 AND shard = ?4 AND sequence = ?5 AND pending = ?6",
                    params![
                        to as i64,
                        Partition::Saved.flag(),
                        self.key.id,
                        self.key.shard,
                        from as i64,
                        Partition::Pending.flag()
                    ],
                )?;
                self.key.set_next(tx, Partition::Saved, to + 1)?;
                debug!(stream = %self.key.id, from, to, "shifted entry to saved");
            }
            Ok(())
        })
    }

    /// Returns the `n` oldest entries of a partition in ascending order.
    pub fn head(&self, partition: Partition, n: usize) -> CoreResult<Vec<LogEntry>> {
        self.forward(partition)?.take(n).collect()
    }

    /// Returns every entry of a partition in ascending order.
    pub fn entries(&self, partition: Partition) -> CoreResult<Vec<LogEntry>> {
        self.forward(partition)?.collect()
    }

    /// Iterates a partition oldest-first.
    pub fn forward(&self, partition: Partition) -> CoreResult<Entries> {
        Entries::open(self.db.clone(), self.key.clone(), partition, Direction::Forward)
    }

    /// Iterates a partition newest-first.
    pub fn reverse(&self, partition: Partition) -> CoreResult<Entries> {
        Entries::open(self.db.clone(), self.key.clone(), partition, Direction::Reverse)
    }

    /// Iterates a partition oldest-first with in-place replacement.
    ///
    /// Only the pending partition may be rewritten; asking for the saved
    /// partition fails with [`CoreError::ImmutableHistory`].
    pub fn forward_mut(&self, partition: Partition) -> CoreResult<EntrySlots> {
        EntrySlots::open(self.rewritable(partition, Direction::Forward)?)
    }

    /// Iterates a partition newest-first with in-place replacement.
    pub fn reverse_mut(&self, partition: Partition) -> CoreResult<EntrySlots> {
        EntrySlots::open(self.rewritable(partition, Direction::Reverse)?)
    }

    /// Sets or clears the rewound marker.
    pub fn set_rewound(&self, rewound: bool) -> CoreResult<()> {
        let sql = if rewound {
            "INSERT OR IGNORE INTO cache_rewound (id, shard) VALUES (?1, ?2)"
        } else {
            "DELETE FROM cache_rewound WHERE id = ?1 AND shard = ?2"
        };
        self.db.with_conn(|conn| {
            conn.execute(sql, params![self.key.id, self.key.shard])?;
            Ok(())
        })
    }

    /// Returns true while the rewound marker is set.
    pub fn is_rewound(&self) -> CoreResult<bool> {
        self.db.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM cache_rewound WHERE id = ?1 AND shard = ?2",
                    params![self.key.id, self.key.shard],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn rewritable(&self, partition: Partition, direction: Direction) -> CoreResult<Entries> {
        if partition != Partition::Pending {
            return Err(CoreError::ImmutableHistory);
        }
        Entries::open(self.db.clone(), self.key.clone(), partition, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stream() -> Stream {
        let db = Database::open_in_memory().unwrap();
        StreamCache::new(db).unwrap().stream("stream-1", "testing")
    }

    fn strings(entries: CoreResult<Vec<LogEntry>>) -> Vec<String> {
        entries
            .unwrap()
            .into_iter()
            .map(|e| String::from_utf8(e.data).unwrap())
            .collect()
    }

    fn expect_values(stream: &Stream, partition: Partition, expected: &[&str]) {
        let forward = strings(stream.forward(partition).unwrap().collect());
        assert_eq!(forward, expected);

        let mut reversed: Vec<&str> = expected.to_vec();
        reversed.reverse();
        let reverse = strings(stream.reverse(partition).unwrap().collect());
        assert_eq!(reverse, reversed);
    }

    fn storage(partition: Partition) {
        let stream = stream();
        stream.push_all(partition, &["A", "B", "C"]).unwrap();
        assert_eq!(stream.size(partition).unwrap(), 3);
        assert_eq!(strings(stream.head(partition, 2)), ["A", "B"]);
        assert_eq!(strings(stream.head(partition, 10)), ["A", "B", "C"]);
    }

    #[test]
    fn persists_in_saved_partition() {
        storage(Partition::Saved);
    }

    #[test]
    fn persists_in_pending_partition() {
        storage(Partition::Pending);
    }

    #[test]
    fn empty_partition_has_zero_size() {
        let stream = stream();
        assert_eq!(stream.size(Partition::Pending).unwrap(), 0);
        assert_eq!(stream.size(Partition::Saved).unwrap(), 0);
        assert!(stream.head(Partition::Pending, 5).unwrap().is_empty());
        assert_eq!(stream.reverse(Partition::Saved).unwrap().count(), 0);
    }

    #[test]
    fn partitions_are_independent() {
        let stream = stream();
        stream.push_all(Partition::Saved, &["A", "B", "C"]).unwrap();
        stream.push_all(Partition::Pending, &["1", "2", "3"]).unwrap();

        assert_eq!(stream.size(Partition::Saved).unwrap(), 3);
        assert_eq!(stream.size(Partition::Pending).unwrap(), 3);
        expect_values(&stream, Partition::Saved, &["A", "B", "C"]);
        expect_values(&stream, Partition::Pending, &["1", "2", "3"]);
    }

    #[test]
    fn shift_moves_pending_to_saved() {
        let stream = stream();
        stream.push_all(Partition::Saved, &["A", "B", "C"]).unwrap();
        stream.push_all(Partition::Pending, &["1", "2", "3"]).unwrap();

        stream.shift(2).unwrap();
        expect_values(&stream, Partition::Saved, &["A", "B", "C", "1", "2"]);
        expect_values(&stream, Partition::Pending, &["3"]);
        assert_eq!(stream.size(Partition::Pending).unwrap(), 1);

        let err = stream.shift(2).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ShiftExceedsSize {
                requested: 2,
                size: 1
            }
        ));

        stream.shift(1).unwrap();
        expect_values(&stream, Partition::Saved, &["A", "B", "C", "1", "2", "3"]);
        expect_values(&stream, Partition::Pending, &[]);
        assert!(matches!(
            stream.shift(1),
            Err(CoreError::ShiftExceedsSize { .. })
        ));
    }

    #[test]
    fn failed_shift_changes_nothing() {
        let stream = stream();
        stream.push_all(Partition::Saved, &["A"]).unwrap();
        stream.push_all(Partition::Pending, &["1", "2"]).unwrap();

        let saved = stream.entries(Partition::Saved).unwrap();
        let pending = stream.entries(Partition::Pending).unwrap();
        assert!(stream.shift(3).is_err());
        assert_eq!(stream.entries(Partition::Saved).unwrap(), saved);
        assert_eq!(stream.entries(Partition::Pending).unwrap(), pending);
    }

    #[test]
    fn pushes_after_sync_point() {
        let stream = stream();
        stream.push_all(Partition::Saved, &["A", "B", "C"]).unwrap();
        stream.push_all(Partition::Pending, &["1", "2", "3"]).unwrap();

        stream.push(Partition::Saved, b"D").unwrap();
        expect_values(&stream, Partition::Saved, &["A", "B", "C", "D"]);
        expect_values(&stream, Partition::Pending, &["1", "2", "3"]);

        stream.shift(3).unwrap();
        expect_values(
            &stream,
            Partition::Saved,
            &["A", "B", "C", "D", "1", "2", "3"],
        );
        expect_values(&stream, Partition::Pending, &[]);
    }

    #[test]
    fn sequences_are_not_reused() {
        let stream = stream();
        assert_eq!(stream.push(Partition::Pending, b"1").unwrap(), 0);
        assert_eq!(stream.push(Partition::Pending, b"2").unwrap(), 1);
        stream.shift(2).unwrap();
        assert_eq!(stream.size(Partition::Pending).unwrap(), 0);

        assert_eq!(stream.push(Partition::Pending, b"3").unwrap(), 2);
        assert_eq!(stream.size(Partition::Pending).unwrap(), 1);
        let saved = stream.entries(Partition::Saved).unwrap();
        assert_eq!(
            saved.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            [0, 1]
        );
    }

    #[test]
    fn streams_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        let cache = StreamCache::new(db).unwrap();
        let a = cache.stream("a", "actions");
        let b = cache.stream("a", "keyring");
        a.push(Partition::Pending, b"x").unwrap();
        assert_eq!(a.size(Partition::Pending).unwrap(), 1);
        assert_eq!(b.size(Partition::Pending).unwrap(), 0);
    }

    #[test]
    fn replace_rewrites_pending_in_place() {
        let stream = stream();
        stream.push_all(Partition::Pending, &["1", "2", "3"]).unwrap();

        for slot in stream.forward_mut(Partition::Pending).unwrap() {
            let slot = slot.unwrap();
            let upper = format!("{}!", String::from_utf8_lossy(slot.data()));
            slot.replace(upper.as_bytes()).unwrap();
        }

        expect_values(&stream, Partition::Pending, &["1!", "2!", "3!"]);
        assert_eq!(stream.size(Partition::Saved).unwrap(), 0);
    }

    #[test]
    fn saved_partition_cannot_be_rewritten() {
        let stream = stream();
        stream.push(Partition::Saved, b"A").unwrap();
        assert!(matches!(
            stream.forward_mut(Partition::Saved),
            Err(CoreError::ImmutableHistory)
        ));
        assert!(matches!(
            stream.reverse_mut(Partition::Saved),
            Err(CoreError::ImmutableHistory)
        ));
    }

    #[test]
    fn iteration_is_restartable() {
        let stream = stream();
        stream.push_all(Partition::Pending, &["1", "2"]).unwrap();
        let first: Vec<_> = stream.forward(Partition::Pending).unwrap().collect();
        stream.push(Partition::Pending, b"3").unwrap();
        let second: Vec<_> = stream.forward(Partition::Pending).unwrap().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn rewound_marker_persists_per_stream() {
        let db = Database::open_in_memory().unwrap();
        let cache = StreamCache::new(db.clone()).unwrap();
        let a = cache.stream("a", "actions");
        let b = cache.stream("b", "actions");
        assert!(!a.is_rewound().unwrap());

        a.set_rewound(true).unwrap();
        a.set_rewound(true).unwrap();
        assert!(a.is_rewound().unwrap());
        assert!(!b.is_rewound().unwrap());

        let again = StreamCache::new(db).unwrap().stream("a", "actions");
        assert!(again.is_rewound().unwrap());
        again.set_rewound(false).unwrap();
        assert!(!a.is_rewound().unwrap());
    }

    proptest! {
        #[test]
        fn size_tracks_pushes_minus_shifts(
            blobs in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..20),
            shifts in 0usize..25,
        ) {
            let stream = stream();
            stream.push_all(Partition::Pending, &blobs).unwrap();
            let shifted = shifts.min(blobs.len());
            stream.shift(shifted as u64).unwrap();

            prop_assert_eq!(stream.size(Partition::Pending).unwrap(), (blobs.len() - shifted) as u64);
            prop_assert_eq!(stream.size(Partition::Saved).unwrap(), shifted as u64);

            let forward: Vec<Vec<u8>> = stream
                .forward(Partition::Pending).unwrap()
                .map(|e| e.unwrap().data)
                .collect();
            let mut reverse: Vec<Vec<u8>> = stream
                .reverse(Partition::Pending).unwrap()
                .map(|e| e.unwrap().data)
                .collect();
            reverse.reverse();
            prop_assert_eq!(&forward, &reverse);
            prop_assert_eq!(forward, blobs[shifted..].to_vec());
        }
    }
}
