use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ProfileStore, StoreError};
use crate::progression::PersistedRecord;

/// In-process [`ProfileStore`]. Failures and latency can be injected so the
/// session layer's error paths are testable without a broken disk.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    records: Mutex<HashMap<String, PersistedRecord>>,
    saves: AtomicUsize,
    loads: AtomicUsize,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    load_delay: Mutex<Option<Duration>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a save.
    pub fn insert(&self, player_id: &str, record: PersistedRecord) {
        self.with_records(|records| {
            records.insert(player_id.to_string(), record);
        });
    }

    pub fn get(&self, player_id: &str) -> Option<PersistedRecord> {
        self.with_records(|records| records.get(player_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.with_records(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every load sleep first; used to hold a sign-in mid-flight.
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        match self.load_delay.lock() {
            Ok(mut guard) => *guard = delay,
            Err(poisoned) => *poisoned.into_inner() = delay,
        }
    }

    fn load_delay(&self) -> Option<Duration> {
        match self.load_delay.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn with_records<R>(&self, f: impl FnOnce(&mut HashMap<String, PersistedRecord>) -> R) -> R {
        match self.records.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, player_id: &str) -> Result<Option<PersistedRecord>, StoreError> {
        if let Some(delay) = self.load_delay() {
            tokio::time::sleep(delay).await;
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        Ok(self.get(player_id))
    }

    async fn save(&self, player_id: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        self.insert(player_id, record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
