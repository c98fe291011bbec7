use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use sled::IVec;

use super::{ProfileStore, StoreError};
use crate::progression::PersistedRecord;
use crate::validation::{escape_log, validate_player_id};

pub const DEFAULT_RECORD_KEY: &str = "player_profile";
const TREE_PROFILES: &str = "profiles";
const PROFILE_PREFIX: &str = "profiles:";

pub struct SledProfileStoreBuilder {
    path: PathBuf,
    record_key: String,
}

impl SledProfileStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            record_key: DEFAULT_RECORD_KEY.to_string(),
        }
    }

    /// Name the record slot inside each player's key space.
    pub fn record_key(mut self, key: impl Into<String>) -> Self {
        self.record_key = key.into();
        self
    }

    pub fn open(self) -> Result<SledProfileStore, StoreError> {
        SledProfileStore::open_with_key(self.path, self.record_key)
    }
}

/// Sled-backed profile storage. Records are JSON under
/// `profiles:<player_id>:<record_key>`.
pub struct SledProfileStore {
    _db: sled::Db,
    profiles: sled::Tree,
    record_key: String,
}

impl SledProfileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_key(path, DEFAULT_RECORD_KEY.to_string())
    }

    fn open_with_key<P: AsRef<Path>>(path: P, record_key: String) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        if record_key.is_empty() || record_key.contains(':') {
            return Err(StoreError::InvalidKey(format!(
                "record key '{}' must be non-empty and contain no ':'",
                escape_log(&record_key)
            )));
        }
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let profiles = db.open_tree(TREE_PROFILES)?;
        debug!("opened profile store at {}", path_ref.display());
        Ok(Self {
            _db: db,
            profiles,
            record_key,
        })
    }

    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    fn profile_key(&self, player_id: &str) -> Result<Vec<u8>, StoreError> {
        validate_player_id(player_id)
            .map_err(|e| StoreError::InvalidKey(format!("{}: {}", escape_log(player_id), e)))?;
        Ok(format!("{}{}:{}", PROFILE_PREFIX, player_id, self.record_key).into_bytes())
    }

    fn serialize(record: &PersistedRecord) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(record)?)
    }

    fn deserialize(player_id: &str, bytes: IVec) -> Result<PersistedRecord, StoreError> {
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", escape_log(player_id), e)))?;
        PersistedRecord::from_json(text)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", escape_log(player_id), e)))
    }

    pub fn get(&self, player_id: &str) -> Result<Option<PersistedRecord>, StoreError> {
        let key = self.profile_key(player_id)?;
        let Some(bytes) = self.profiles.get(key)? else {
            return Ok(None);
        };
        Self::deserialize(player_id, bytes).map(Some)
    }

    pub fn put(&self, player_id: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        let key = self.profile_key(player_id)?;
        let bytes = Self::serialize(record)?;
        self.profiles.insert(key, bytes)?;
        self.profiles.flush()?;
        Ok(())
    }

    /// Remove a player's record. Returns whether one existed.
    pub fn delete(&self, player_id: &str) -> Result<bool, StoreError> {
        let key = self.profile_key(player_id)?;
        let existed = self.profiles.remove(key)?.is_some();
        self.profiles.flush()?;
        Ok(existed)
    }

    /// List every player id that has a record under this store's record key.
    pub fn list_player_ids(&self) -> Result<Vec<String>, StoreError> {
        let suffix = format!(":{}", self.record_key);
        let mut ids = Vec::new();
        for entry in self.profiles.scan_prefix(PROFILE_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            let Some(rest) = text.strip_prefix(PROFILE_PREFIX) else {
                continue;
            };
            match rest.strip_suffix(suffix.as_str()) {
                Some(id) => ids.push(id.to_string()),
                None => debug!("skipping foreign profile key {}", escape_log(&text)),
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl ProfileStore for SledProfileStore {
    async fn load(&self, player_id: &str) -> Result<Option<PersistedRecord>, StoreError> {
        self.get(player_id)
    }

    async fn save(&self, player_id: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        self.put(player_id, record).map_err(|e| {
            warn!("failed to persist profile {}: {}", escape_log(player_id), e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, level: u32) -> PersistedRecord {
        PersistedRecord {
            player_id: Some(id.to_string()),
            player_name: Some("Ada".to_string()),
            level: Some(level),
            ..PersistedRecord::default()
        }
    }

    #[test]
    fn put_get_delete_cycle() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledProfileStore::open(dir.path()).expect("open");
        assert!(store.get("u1").expect("get").is_none());

        store.put("u1", &record("u1", 4)).expect("put");
        let loaded = store.get("u1").expect("get").expect("present");
        assert_eq!(loaded.level, Some(4));

        assert!(store.delete("u1").expect("delete"));
        assert!(!store.delete("u1").expect("delete again"));
        assert!(store.get("u1").expect("get").is_none());
    }

    #[test]
    fn record_keys_partition_players() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = SledProfileStore::open(dir.path()).expect("open");
            store.put("a:1", &record("a:1", 2)).expect("put");
            store.put("b", &record("b", 3)).expect("put");
        }
        let alt = SledProfileStoreBuilder::new(dir.path())
            .record_key("slot_two")
            .open()
            .expect("open alt");
        assert!(alt.get("b").expect("get").is_none());
        alt.put("c", &record("c", 5)).expect("put");
        assert_eq!(alt.list_player_ids().expect("list"), vec!["c".to_string()]);
        drop(alt);

        let store = SledProfileStore::open(dir.path()).expect("reopen");
        let mut ids = store.list_player_ids().expect("list");
        ids.sort();
        assert_eq!(ids, vec!["a:1".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_bad_ids_and_record_keys() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            SledProfileStoreBuilder::new(dir.path()).record_key("a:b").open(),
            Err(StoreError::InvalidKey(_))
        ));
        let store = SledProfileStore::open(dir.path()).expect("open");
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn garbage_bytes_are_reported_as_corrupt() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledProfileStore::open(dir.path()).expect("open");
        let key = store.profile_key("u9").expect("key");
        store.profiles.insert(key, b"{not json".to_vec()).expect("raw insert");
        assert!(matches!(store.get("u9"), Err(StoreError::Corrupt(_))));
    }
}
