//! Configuration for a store.

/// Configuration for one store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Shard name; with the keyring id it identifies the stream.
    pub shard: String,
    /// Maximum remote entries fetched per sync.
    pub pull_batch_size: usize,
    /// Maximum pending entries submitted per sync.
    pub push_batch_size: usize,
    /// Plaintexts are padded to a multiple of this many bytes.
    pub pad_block: usize,
    /// Proof presented with every remote append.
    pub auth_token: Vec<u8>,
}

impl StoreConfig {
    /// Creates a configuration for a shard.
    pub fn new(shard: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            pull_batch_size: 10,
            push_batch_size: 10,
            pad_block: 1024,
            auth_token: Vec::new(),
        }
    }

    /// Sets the pull batch size.
    pub fn with_pull_batch_size(mut self, size: usize) -> Self {
        self.pull_batch_size = size;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the padding block size.
    pub fn with_pad_block(mut self, block: usize) -> Self {
        self.pad_block = block;
        self
    }

    /// Sets the append proof.
    pub fn with_auth_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.auth_token = token.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("actions")
    }
}
