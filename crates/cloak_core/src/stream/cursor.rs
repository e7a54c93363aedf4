//! Lazy iteration over one partition.

use super::{LogEntry, Partition, StreamKey};
use crate::database::Database;
use crate::error::CoreResult;

/// Iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lowest sequence first.
    Forward,
    /// Highest sequence first.
    Reverse,
}

/// Iterator over the entries of one partition.
///
/// Bounds are read when the iterator is created; each call to `next`
/// fetches exactly one entry. Entries that leave the partition while the
/// iterator is alive are skipped.
#[derive(Debug)]
pub struct Entries {
    db: Database,
    key: StreamKey,
    partition: Partition,
    direction: Direction,
    front: u64,
    back: u64,
}

impl Entries {
    pub(super) fn open(
        db: Database,
        key: StreamKey,
        partition: Partition,
        direction: Direction,
    ) -> CoreResult<Self> {
        let (front, back) = db
            .with_conn(|conn| key.bounds(conn, partition))?
            .unwrap_or((0, 0));
        Ok(Self {
            db,
            key,
            partition,
            direction,
            front,
            back,
        })
    }

    fn next_sequence(&mut self) -> Option<u64> {
        if self.front >= self.back {
            return None;
        }
        match self.direction {
            Direction::Forward => {
                self.front += 1;
                Some(self.front - 1)
            }
            Direction::Reverse => {
                self.back -= 1;
                Some(self.back)
            }
        }
    }
}

impl Iterator for Entries {
    type Item = CoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(sequence) = self.next_sequence() {
            let fetched = self
                .db
                .with_conn(|conn| self.key.fetch(conn, self.partition, sequence));
            match fetched {
                Ok(Some(data)) => {
                    return Some(Ok(LogEntry {
                        sequence,
                        partition: self.partition,
                        data,
                    }))
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Iterator over pending entries that can be rewritten in place.
#[derive(Debug)]
pub struct EntrySlots {
    inner: Entries,
}

impl EntrySlots {
    pub(super) fn open(inner: Entries) -> CoreResult<Self> {
        Ok(Self { inner })
    }
}

impl Iterator for EntrySlots {
    type Item = CoreResult<EntrySlot>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        Some(entry.map(|entry| EntrySlot {
            db: self.inner.db.clone(),
            key: self.inner.key.clone(),
            entry,
        }))
    }
}

/// A pending entry yielded by [`EntrySlots`].
#[derive(Debug)]
pub struct EntrySlot {
    db: Database,
    key: StreamKey,
    entry: LogEntry,
}

impl EntrySlot {
    /// Returns the sequence number.
    pub fn sequence(&self) -> u64 {
        self.entry.sequence
    }

    /// Returns the stored payload.
    pub fn data(&self) -> &[u8] {
        &self.entry.data
    }

    /// Overwrites the payload, keeping the sequence number.
    pub fn replace(&self, data: &[u8]) -> CoreResult<()> {
        self.db
            .with_conn(|conn| self.key.replace(conn, self.entry.sequence, data))
    }

    /// Consumes the slot, returning the entry as read.
    pub fn into_entry(self) -> LogEntry {
        self.entry
    }
}
