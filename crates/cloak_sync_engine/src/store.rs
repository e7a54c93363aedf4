//! The store: local writes, reads and sync for one stream.
//!
//! ## Sync
//!
//! [`Store::sync`] runs, in order:
//!
//! 1. **Undo**: if the remote holds entries the saved partition lacks,
//!    every applied action is removed (pending newest-first, then saved
//!    newest-first) and the saved history is replayed oldest-first, leaving
//!    the rows exactly as the confirmed history defines them.
//! 2. **Pull**: one page of missing remote entries is opened, appended to
//!    the saved partition and applied.
//! 3. **Rebase**: every pending action, oldest-first, recomputes its priors
//!    against the merged rows, is sealed back into its slot and reapplied.
//! 4. **Push**: up to one batch of pending entries is submitted, each at
//!    the next remote index and shifted to saved once accepted. A sequence
//!    conflict stops the batch and leaves the entry pending.
//!
//! Steps 1 to 3 run under the stream's persisted rewound marker. An error
//! aborts the call with the rows possibly undone and the marker still set;
//! the next `sync` sees the marker and repeats the undo, replay and rebase
//! even when nothing is left to pull.

use crate::action::{Action, CreateAction, UpdateAction};
use crate::changes::{ChangeFeed, StreamIndex};
use crate::config::StoreConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{Fields, Model};
use crate::registry::Registry;
use crate::remote::RemoteLog;
use cloak_core::crypto::{pad, unpad};
use cloak_core::{Database, Keyring, Partition, Query, Row, Stream, StreamCache};
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

/// Outcome of one [`Store::sync`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote entries pulled into the saved partition.
    pub pulled: u64,
    /// Pending entries accepted by the remote.
    pub pushed: u64,
    /// Pending actions rebased onto pulled entries.
    pub rebased: u64,
    /// Whether the push stopped on a sequence conflict.
    pub conflicted: bool,
}

/// A local, encrypted, syncable store.
pub struct Store<R: RemoteLog, K: Keyring> {
    config: StoreConfig,
    stream: Stream,
    registry: Registry,
    remote: R,
    keyring: K,
    changes: ChangeFeed,
}

impl<R: RemoteLog, K: Keyring> Store<R, K> {
    /// Opens a store over a database.
    ///
    /// The stream is identified by the keyring id and the configured shard.
    pub fn new(config: StoreConfig, db: Database, remote: R, keyring: K) -> SyncResult<Self> {
        let stream = StreamCache::new(db.clone())?.stream(keyring.id(), config.shard.as_str());
        Ok(Self {
            config,
            stream,
            registry: Registry::new(db),
            remote,
            keyring,
            changes: ChangeFeed::new(),
        })
    }

    /// Registers a model so the store can write, read and replay it.
    pub fn register<M: Model>(&mut self) -> SyncResult<()> {
        self.registry.register::<M>()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the keyring.
    pub fn keyring(&self) -> &K {
        &self.keyring
    }

    /// Returns the remote.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the underlying log.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Creates rows. Returns their new ids in input order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if any object fails `M`'s shape;
    /// nothing is persisted or applied in that case.
    pub fn create<M: Model>(&mut self, objects: Vec<Fields>) -> SyncResult<Vec<String>> {
        self.registry.table_of::<M>()?;
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        self.commit::<M>(CreateAction::build::<M>(objects).into())
    }

    /// Sets fields on existing rows. Returns the target ids.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if a target row is missing or the
    /// merged row fails `M`'s shape.
    pub fn update<M: Model>(&mut self, ids: Vec<String>, update: Fields) -> SyncResult<Vec<String>> {
        self.registry.table_of::<M>()?;
        if ids.is_empty() || update.is_empty() {
            return Ok(Vec::new());
        }
        let action = UpdateAction::build::<M>(&self.registry, ids, update)?;
        self.commit::<M>(action.into())
    }

    fn commit<M: Model>(&mut self, action: Action) -> SyncResult<Vec<String>> {
        let errors = action.errors::<M>(&self.registry)?;
        if !errors.is_empty() {
            return Err(SyncError::Validation {
                kind: action.kind(),
                errors,
            });
        }
        self.persist(&action)?;
        let ids = action.apply(&self.registry)?;
        debug!(kind = %action.kind(), action = %action.id(), rows = ids.len(), "committed action");
        self.changes.emit(self.index()?);
        Ok(ids)
    }

    /// Looks up one row of `M`.
    pub fn get<M: Model>(&self, id: &str) -> SyncResult<Option<Row>> {
        Ok(self.registry.table_of::<M>()?.get(id)?)
    }

    /// Starts a query over `M`'s table.
    pub fn query<M: Model>(&self) -> SyncResult<Query> {
        Ok(self.registry.table_of::<M>()?.query())
    }

    /// Runs a query against the table it names.
    pub fn fetch(&self, query: &Query) -> SyncResult<Vec<Row>> {
        Ok(self.registry.table(query.table())?.fetch(query)?)
    }

    /// Seals an action and appends it to the pending partition.
    ///
    /// Returns the pending sequence number.
    pub fn persist(&self, action: &Action) -> SyncResult<u64> {
        let blob = self.seal(action)?;
        Ok(self.stream.push(Partition::Pending, &blob)?)
    }

    fn seal(&self, action: &Action) -> SyncResult<Vec<u8>> {
        let padded = pad(&action.encode()?, self.config.pad_block);
        Ok(self.keyring.encrypt(&padded)?)
    }

    fn open(&self, blob: &[u8]) -> SyncResult<Action> {
        let action = Action::decode(&unpad(&self.keyring.decrypt(blob)?)?)?;
        if !self.registry.contains(action.model()) {
            return Err(SyncError::UnknownModel(action.model().to_string()));
        }
        Ok(action)
    }

    /// Returns the local entry counts.
    pub fn index(&self) -> SyncResult<StreamIndex> {
        Ok(StreamIndex {
            saved: self.stream.size(Partition::Saved)?,
            pending: self.stream.size(Partition::Pending)?,
        })
    }

    /// Returns the remote entry count for this stream.
    pub fn server_index(&self) -> SyncResult<u64> {
        self.remote.get_index(self.keyring.id(), &self.config.shard)
    }

    /// Creates this stream on the remote.
    pub fn initialize_remote(&self, owner_proof: &[u8]) -> SyncResult<()> {
        self.remote
            .create(owner_proof, self.keyring.id(), &self.config.shard)
    }

    /// Subscribes to index updates.
    pub fn subscribe(&self) -> Receiver<StreamIndex> {
        self.changes.subscribe()
    }

    /// Reconciles the log with the remote.
    pub fn sync(&mut self) -> SyncResult<SyncReport> {
        let remote_index = self.server_index()?;
        let saved = self.stream.size(Partition::Saved)?;
        let mut report = SyncReport::default();

        if remote_index < saved {
            warn!(
                stream = %self.keyring.id(),
                remote_index,
                saved,
                "remote holds fewer entries than the saved partition"
            );
        }

        let interrupted = self.stream.is_rewound()?;
        if remote_index > saved || interrupted {
            if interrupted {
                info!(stream = %self.keyring.id(), "resuming interrupted reconciliation");
            }
            self.stream.set_rewound(true)?;
            self.rewind()?;
            self.replay()?;
            if remote_index > saved {
                report.pulled = self.pull(saved, remote_index)?;
            }
            report.rebased = self.rebase()?;
            self.stream.set_rewound(false)?;
        }

        let (pushed, conflicted) = self.push()?;
        report.pushed = pushed;
        report.conflicted = conflicted;

        if report.pulled > 0 || report.pushed > 0 {
            self.changes.emit(self.index()?);
        }
        info!(
            stream = %self.keyring.id(),
            pulled = report.pulled,
            pushed = report.pushed,
            rebased = report.rebased,
            conflicted = report.conflicted,
            "sync finished"
        );
        Ok(report)
    }

    fn rewind(&self) -> SyncResult<()> {
        let mut undone = 0u64;
        for partition in [Partition::Pending, Partition::Saved] {
            for entry in self.stream.reverse(partition)? {
                self.open(&entry?.data)?.remove(&self.registry)?;
                undone += 1;
            }
        }
        debug!(undone, "rewound local history");
        Ok(())
    }

    fn replay(&self) -> SyncResult<()> {
        for entry in self.stream.forward(Partition::Saved)? {
            self.open(&entry?.data)?.apply(&self.registry)?;
        }
        Ok(())
    }

    fn pull(&self, saved: u64, remote_index: u64) -> SyncResult<u64> {
        let end = remote_index.min(saved + self.config.pull_batch_size as u64);
        let shard = self.config.shard.as_str();
        for index in saved..end {
            let blob = self.remote.get_entry(self.keyring.id(), shard, index)?;
            let action = self.open(&blob)?;
            self.stream.push(Partition::Saved, &blob)?;
            action.apply(&self.registry)?;
        }
        debug!(from = saved, to = end, "pulled remote entries");
        Ok(end - saved)
    }

    fn rebase(&self) -> SyncResult<u64> {
        let mut rebased = 0u64;
        for slot in self.stream.forward_mut(Partition::Pending)? {
            let slot = slot?;
            let action = self.open(slot.data())?.rebase(&self.registry)?;
            slot.replace(&self.seal(&action)?)?;
            action.apply(&self.registry)?;
            rebased += 1;
        }
        Ok(rebased)
    }

    fn push(&self) -> SyncResult<(u64, bool)> {
        let mut next = self.stream.size(Partition::Saved)?;
        let shard = self.config.shard.as_str();
        let mut pushed = 0u64;
        for entry in self.stream.head(Partition::Pending, self.config.push_batch_size)? {
            let result = self.remote.put_entry(
                self.keyring.id(),
                shard,
                next,
                &entry.data,
                &self.config.auth_token,
            );
            match result {
                Ok(()) => {
                    self.stream.shift(1)?;
                    next += 1;
                    pushed += 1;
                }
                Err(e) if e.is_conflict() => {
                    warn!(stream = %self.keyring.id(), index = next, error = %e, "push rejected");
                    return Ok((pushed, true));
                }
                Err(e) => return Err(e),
            }
        }
        Ok((pushed, false))
    }
}

impl<R: RemoteLog + std::fmt::Debug, K: Keyring + std::fmt::Debug> std::fmt::Debug for Store<R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("stream", &self.stream)
            .field("remote", &self.remote)
            .field("keyring", &self.keyring)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{non_blank, optional, Shape};
    use crate::remote::MockRemote;
    use cloak_core::crypto::{NONCE_SIZE, TAG_SIZE};
    use cloak_core::{CoreError, CoreResult, SecretKeyring};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Note;

    impl Model for Note {
        const KIND: &'static str = "note";

        fn shape() -> Shape {
            Shape::new()
                .field("title", non_blank())
                .field("body", optional(non_blank()))
        }
    }

    type TestStore = Store<Arc<MockRemote>, SecretKeyring>;

    fn store_with(remote: Arc<MockRemote>, keyring: SecretKeyring) -> TestStore {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(StoreConfig::default(), db, remote, keyring).unwrap();
        store.register::<Note>().unwrap();
        store
    }

    fn store() -> (TestStore, Arc<MockRemote>) {
        let remote = Arc::new(MockRemote::new());
        let store = store_with(Arc::clone(&remote), SecretKeyring::generate());
        store.initialize_remote(b"owner").unwrap();
        (store, remote)
    }

    fn note(title: &str) -> Fields {
        [("title".to_string(), title.to_string())].into_iter().collect()
    }

    fn titles(store: &TestStore) -> Vec<String> {
        let query = store.query::<Note>().unwrap().order("title");
        store
            .fetch(&query)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.fields.get("title").cloned())
            .collect()
    }

    #[test]
    fn create_persists_and_applies() {
        let (mut store, _) = store();
        let ids = store.create::<Note>(vec![note("a"), note("b")]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.get::<Note>(&ids[1]).unwrap().unwrap().fields["title"], "b");
        assert_eq!(
            store.index().unwrap(),
            StreamIndex {
                saved: 0,
                pending: 1
            }
        );
    }

    #[test]
    fn entries_are_padded_and_sealed() {
        let (mut store, _) = store();
        store.create::<Note>(vec![note("secret title")]).unwrap();

        let entry = &store.stream().entries(Partition::Pending).unwrap()[0];
        assert_eq!(entry.data.len(), NONCE_SIZE + 1024 + TAG_SIZE);
        assert!(!entry
            .data
            .windows(b"secret title".len())
            .any(|w| w == b"secret title"));
    }

    #[test]
    fn invalid_writes_persist_nothing() {
        let (mut store, _) = store();
        let err = store.create::<Note>(vec![note("ok"), note("")]).unwrap_err();
        match err {
            SyncError::Validation { kind, errors } => {
                assert_eq!(kind, "note.create");
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        let missing = uuid::Uuid::new_v4().to_string();
        let err = store.update::<Note>(vec![missing], note("x")).unwrap_err();
        assert!(matches!(err, SyncError::Validation { kind, .. } if kind == "note.update"));

        assert_eq!(store.index().unwrap(), StreamIndex::default());
        assert!(titles(&store).is_empty());
    }

    #[test]
    fn unusable_shape_fields_never_reach_the_log() {
        struct Dashed;
        impl Model for Dashed {
            const KIND: &'static str = "dashed";
            fn shape() -> Shape {
                Shape::new().field("due-date", non_blank())
            }
        }

        let (mut store, _) = store();
        let before = store.index().unwrap();
        assert!(matches!(
            store.register::<Dashed>(),
            Err(SyncError::Core(CoreError::Validation { .. }))
        ));

        let fields: Fields = [("due-date".to_string(), "monday".to_string())]
            .into_iter()
            .collect();
        assert!(store.create::<Dashed>(vec![fields]).is_err());
        assert_eq!(store.index().unwrap(), before);
        assert_eq!(store.index().unwrap().pending, 0);
    }

    #[test]
    fn declared_fields_are_queryable_before_any_write() {
        let (mut store, _) = store();
        assert!(titles(&store).is_empty());

        store.create::<Note>(vec![note("a")]).unwrap();
        let query = store.query::<Note>().unwrap().where_eq("body", "body");
        assert!(store.fetch(&query).unwrap().is_empty());

        let query = store.query::<Note>().unwrap().order("body");
        assert_eq!(store.fetch(&query).unwrap().len(), 1);
    }

    #[test]
    fn empty_writes_are_noops() {
        let (mut store, _) = store();
        assert!(store.create::<Note>(Vec::new()).unwrap().is_empty());
        let ids = store.create::<Note>(vec![note("a")]).unwrap();
        assert!(store.update::<Note>(ids, Fields::new()).unwrap().is_empty());
        assert!(store.update::<Note>(Vec::new(), note("b")).unwrap().is_empty());
        assert_eq!(store.index().unwrap().pending, 1);
    }

    #[test]
    fn unregistered_model_is_rejected() {
        struct Other;
        impl Model for Other {
            const KIND: &'static str = "other";
            fn shape() -> Shape {
                Shape::new()
            }
        }

        let (mut store, _) = store();
        assert!(matches!(
            store.create::<Other>(vec![Fields::new()]),
            Err(SyncError::UnknownModel(kind)) if kind == "other"
        ));
    }

    #[test]
    fn update_changes_rows() {
        let (mut store, _) = store();
        let ids = store.create::<Note>(vec![note("a")]).unwrap();
        store.update::<Note>(ids.clone(), note("z")).unwrap();
        assert_eq!(titles(&store), ["z"]);
        assert_eq!(store.index().unwrap().pending, 2);
    }

    #[test]
    fn sync_pushes_pending_entries() {
        let (mut store, remote) = store();
        store.create::<Note>(vec![note("a")]).unwrap();
        store.create::<Note>(vec![note("b")]).unwrap();
        store.create::<Note>(vec![note("c")]).unwrap();

        let report = store.sync().unwrap();
        assert_eq!(report.pushed, 3);
        assert_eq!(report.pulled, 0);
        assert!(!report.conflicted);
        assert_eq!(store.server_index().unwrap(), 3);
        assert_eq!(
            store.index().unwrap(),
            StreamIndex {
                saved: 3,
                pending: 0
            }
        );
        assert_eq!(
            remote.entries(store.keyring().id(), "actions"),
            store
                .stream()
                .entries(Partition::Saved)
                .unwrap()
                .into_iter()
                .map(|e| e.data)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn push_respects_batch_size() {
        let remote = Arc::new(MockRemote::new());
        let db = Database::open_in_memory().unwrap();
        let config = StoreConfig::default().with_push_batch_size(2);
        let mut store = Store::new(config, db, remote, SecretKeyring::generate()).unwrap();
        store.register::<Note>().unwrap();
        store.initialize_remote(b"").unwrap();
        for title in ["a", "b", "c"] {
            store.create::<Note>(vec![note(title)]).unwrap();
        }

        assert_eq!(store.sync().unwrap().pushed, 2);
        assert_eq!(store.sync().unwrap().pushed, 1);
        assert_eq!(store.index().unwrap().pending, 0);
    }

    #[test]
    fn sync_notifies_subscribers() {
        let (mut store, _) = store();
        let rx = store.subscribe();
        store.create::<Note>(vec![note("a")]).unwrap();
        store.sync().unwrap();
        store.sync().unwrap();

        let seen: Vec<_> = rx.try_iter().map(|i| (i.saved, i.pending)).collect();
        assert_eq!(seen, [(0, 1), (1, 0)]);
    }

    #[test]
    fn disconnected_sync_changes_nothing() {
        let (mut store, remote) = store();
        store.create::<Note>(vec![note("a")]).unwrap();
        remote.set_connected(false);
        assert!(matches!(store.sync(), Err(SyncError::NotConnected)));
        assert_eq!(store.index().unwrap().pending, 1);
        assert_eq!(titles(&store), ["a"]);
    }

    #[test]
    fn foreign_keyring_cannot_pull() {
        let (mut writer, remote) = store();
        writer.create::<Note>(vec![note("a")]).unwrap();
        writer.sync().unwrap();

        let key = [9u8; 32];
        let wrong = SecretKeyring::from_bytes(writer.keyring().id(), &key).unwrap();
        let mut reader = store_with(remote, wrong);
        let err = reader.sync().unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::DecryptionFailed { .. })));
        assert_eq!(reader.index().unwrap(), StreamIndex::default());
    }

    #[test]
    fn pull_merges_and_rebases() {
        let remote = Arc::new(MockRemote::new());
        let keyring = SecretKeyring::generate();
        let mut a = store_with(Arc::clone(&remote), keyring.clone());
        let mut b = store_with(Arc::clone(&remote), keyring);
        a.initialize_remote(b"").unwrap();

        a.create::<Note>(vec![note("from a")]).unwrap();
        b.create::<Note>(vec![note("from b")]).unwrap();
        a.sync().unwrap();

        let report = b.sync().unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.rebased, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(titles(&b), ["from a", "from b"]);

        a.sync().unwrap();
        assert_eq!(titles(&a), ["from a", "from b"]);
    }

    /// Wraps a keyring and fails every decrypt once its allowance runs out.
    struct FailingKeyring {
        inner: SecretKeyring,
        allowance: AtomicUsize,
    }

    impl FailingKeyring {
        fn new(inner: SecretKeyring) -> Self {
            Self {
                inner,
                allowance: AtomicUsize::new(usize::MAX),
            }
        }

        fn allow(&self, decrypts: usize) {
            self.allowance.store(decrypts, Ordering::SeqCst);
        }
    }

    impl Keyring for FailingKeyring {
        fn id(&self) -> &str {
            self.inner.id()
        }

        fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
            self.inner.encrypt(plaintext)
        }

        fn decrypt(&self, blob: &[u8]) -> CoreResult<Vec<u8>> {
            self.allowance
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| CoreError::decryption_failed("allowance exhausted"))?;
            self.inner.decrypt(blob)
        }
    }

    #[test]
    fn failed_rebase_is_completed_by_the_next_sync() {
        let remote = Arc::new(MockRemote::new());
        let keyring = SecretKeyring::generate();
        let mut a = store_with(Arc::clone(&remote), keyring.clone());
        a.initialize_remote(b"").unwrap();
        a.create::<Note>(vec![note("a")]).unwrap();
        a.sync().unwrap();

        let db = Database::open_in_memory().unwrap();
        let mut b = Store::new(
            StoreConfig::default(),
            db,
            Arc::clone(&remote),
            FailingKeyring::new(keyring),
        )
        .unwrap();
        b.register::<Note>().unwrap();
        b.create::<Note>(vec![note("b1")]).unwrap();
        b.create::<Note>(vec![note("b2")]).unwrap();

        // Undo reads both pending entries, the pull reads one remote entry
        // and the rebase reads the first pending entry; the second fails.
        b.keyring().allow(4);
        let err = b.sync().unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::DecryptionFailed { .. })));
        assert!(b.stream().is_rewound().unwrap());
        assert_eq!(b.index().unwrap(), StreamIndex { saved: 1, pending: 2 });
        assert_eq!(b.server_index().unwrap(), 1);

        let query = b.query::<Note>().unwrap().order("title");
        let partial: Vec<_> = b
            .fetch(&query)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.fields.get("title").cloned())
            .collect();
        assert_eq!(partial, ["a", "b1"]);

        b.keyring().allow(usize::MAX);
        let report = b.sync().unwrap();
        assert_eq!(report.pulled, 0);
        assert_eq!(report.rebased, 2);
        assert_eq!(report.pushed, 2);
        assert!(!b.stream().is_rewound().unwrap());

        let merged: Vec<_> = b
            .fetch(&query)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.fields.get("title").cloned())
            .collect();
        assert_eq!(merged, ["a", "b1", "b2"]);

        a.sync().unwrap();
        assert_eq!(titles(&a), ["a", "b1", "b2"]);
    }
}
