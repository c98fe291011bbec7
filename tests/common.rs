//! Test utilities & fixtures.
//! A scripted identity provider and small builders shared by the session tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use heroledger::auth::{AuthError, Identity, IdentityProvider};
use heroledger::progression::{LevelTuning, PersistedRecord, ProfileCodec};
use heroledger::session::SessionReconciler;
use heroledger::storage::MemoryProfileStore;

pub const GAME_VERSION: &str = "2.1.0";

/// Identity provider that replays queued sign-in results. When the queue is
/// empty it keeps answering with `fallback`.
pub struct ScriptedIdentity {
    sign_ins: Mutex<VecDeque<Result<Identity, AuthError>>>,
    fallback: Identity,
    /// Overrides the name echoed back from a rename.
    confirmed_name: Mutex<Option<String>>,
    fail_rename: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    rename_delay: Mutex<Option<Duration>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl ScriptedIdentity {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            sign_ins: Mutex::new(VecDeque::new()),
            fallback: Identity::new(id, display_name),
            confirmed_name: Mutex::new(None),
            fail_rename: Mutex::new(false),
            delay: Mutex::new(None),
            rename_delay: Mutex::new(None),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<Identity, AuthError>) {
        self.sign_ins.lock().unwrap().push_back(result);
    }

    pub fn confirm_rename_as(&self, name: &str) {
        *self.confirmed_name.lock().unwrap() = Some(name.to_string());
    }

    pub fn fail_renames(&self, fail: bool) {
        *self.fail_rename.lock().unwrap() = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_rename_delay(&self, delay: Option<Duration>) {
        *self.rename_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn sign_in(&self) -> Result<Identity, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.sign_ins.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn update_display_name(&self, new_name: &str) -> Result<String, AuthError> {
        let delay = *self.rename_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_rename.lock().unwrap() {
            return Err(AuthError::Unavailable("rename service down".to_string()));
        }
        let confirmed = self.confirmed_name.lock().unwrap().clone();
        Ok(confirmed.unwrap_or_else(|| new_name.to_string()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn codec() -> ProfileCodec {
    ProfileCodec::new(GAME_VERSION, LevelTuning::default())
}

pub struct Harness {
    pub identity: Arc<ScriptedIdentity>,
    pub store: Arc<MemoryProfileStore>,
    pub session: Arc<SessionReconciler>,
}

pub fn harness(id: &str, display_name: &str) -> Harness {
    let identity = Arc::new(ScriptedIdentity::new(id, display_name));
    let store = Arc::new(MemoryProfileStore::new());
    let session = Arc::new(SessionReconciler::new(
        identity.clone(),
        store.clone(),
        codec(),
    ));
    Harness {
        identity,
        store,
        session,
    }
}

/// A saved level 3 player with a little progress.
pub fn veteran_record(id: &str, name: &str) -> PersistedRecord {
    PersistedRecord {
        player_id: Some(id.to_string()),
        player_name: Some(name.to_string()),
        level: Some(3),
        experience: Some(50),
        available_skill_points: Some(4),
        strength: Some(12),
        defense: Some(10),
        agility: Some(11),
        base_exp_required: Some(100),
        exp_multiplier: Some(1.5),
        points_per_level: Some(3),
        game_version: Some(GAME_VERSION.to_string()),
    }
}

pub fn counter(session: &SessionReconciler) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    session.subscribe(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    count
}
