//! Profile persistence.
//!
//! A [`ProfileStore`] keeps one [`PersistedRecord`] per player id. The session
//! layer never knows which backend it talks to; the binary uses
//! [`SledProfileStore`] and tests mostly use [`MemoryProfileStore`].

pub mod memory;
pub mod sled_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::progression::PersistedRecord;

pub use memory::MemoryProfileStore;
pub use sled_store::{SledProfileStore, SledProfileStoreBuilder, DEFAULT_RECORD_KEY};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt profile record: {0}")]
    Corrupt(String),

    #[error("invalid player id: {0}")]
    InvalidKey(String),

    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the stored record for `player_id`. `Ok(None)` means the player
    /// has never been saved, which is not an error.
    async fn load(&self, player_id: &str) -> Result<Option<PersistedRecord>, StoreError>;

    /// Insert or overwrite the record for `player_id`.
    async fn save(&self, player_id: &str, record: &PersistedRecord) -> Result<(), StoreError>;
}
