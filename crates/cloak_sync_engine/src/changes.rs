//! Change notifications for a store.
//!
//! Subscribers receive the store's [`StreamIndex`] after every local write
//! and after every sync that pulled or pushed entries. A receiver's
//! iterator ends once the store (and its feed) is dropped.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Entry counts of a store's log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StreamIndex {
    /// Remote-confirmed entries.
    pub saved: u64,
    /// Local entries not yet confirmed.
    pub pending: u64,
}

/// Distributes index updates to subscribers.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<StreamIndex>>>,
}

impl ChangeFeed {
    /// Creates a feed with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for all future updates.
    pub fn subscribe(&self) -> Receiver<StreamIndex> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends an update to every live subscriber, dropping closed ones.
    pub fn emit(&self, index: StreamIndex) {
        self.subscribers.write().retain(|tx| tx.send(index).is_ok());
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
