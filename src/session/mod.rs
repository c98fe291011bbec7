//! Sign-in state machine and save/load reconciliation.
//!
//! A [`SessionReconciler`] owns at most one [`ProgressionModel`]. Signing in
//! asks the [`IdentityProvider`] who the player is, loads that player's stored
//! record and merges the two: the identity is authoritative for id and display
//! name, the store is authoritative for progress. Gameplay actions mutate the
//! model and persist it before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::auth::{Identity, IdentityProvider};
use crate::metrics;
use crate::progression::{
    ChangeNotifier, PersistedRecord, ProfileCodec, ProgressionError, ProgressionModel, Stat,
    SubscriptionId,
};
use crate::storage::ProfileStore;
use crate::validation::{escape_log, validate_display_name, validate_player_id};

/// Experience granted by one [`SessionReconciler::train`] call unless configured.
pub const DEFAULT_EXP_PER_TRAIN: u32 = 10;
const EVENT_CAPACITY: usize = 32;

/// Where a session is in its sign-in lifecycle.
///
/// ```text
/// Unauthenticated ──sign_in──▶ Authenticating ──identity ok──▶ Reconciling ──▶ Ready
///        ▲                          │                              │            │
///        │                          └──────────error───────────────┴──▶ Failed  │
///        └────────────────────────────sign_out──────────────────────────────────┘
/// ```
///
/// `Failed` and `Ready` both accept a new `sign_in`; from `Ready` the current
/// model is discarded first. While `Authenticating` or `Reconciling` any
/// further `sign_in` is rejected instead of queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Reconciling,
    Ready,
    Failed,
}

impl SessionState {
    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Authenticating | SessionState::Reconciling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { display_name: String },
    SignInFailed { reason: String },
    SignedOut,
    /// A local change is committed but could not be persisted.
    SaveFailed { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a sign-in is already in progress")]
    SignInInProgress,

    #[error("not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Progression(#[from] ProgressionError),

    /// Identity or storage failure, rendered for display.
    #[error("{0}")]
    External(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Marks a sign-in as abandoned unless it reaches `Ready` or `Failed`.
/// Dropping the `sign_in` future mid-flight must not leave the session busy.
struct PendingSignIn<'a> {
    session: &'a SessionReconciler,
    armed: bool,
}

impl PendingSignIn<'_> {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSignIn<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(&self.session.state);
        if !state.is_busy() {
            return;
        }
        debug!("session state {:?} -> {:?}", *state, SessionState::Failed);
        *state = SessionState::Failed;
        drop(state);
        metrics::inc_sign_in_failed();
        warn!("sign-in abandoned before completion");
        self.session.emit(SessionEvent::SignInFailed {
            reason: "sign-in was cancelled".to_string(),
        });
    }
}

pub struct SessionReconciler {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    codec: ProfileCodec,
    exp_per_train: u32,
    state: Mutex<SessionState>,
    model: Mutex<Option<ProgressionModel>>,
    notifier: ChangeNotifier,
    save_gate: tokio::sync::Mutex<()>,
    dirty: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionReconciler {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        codec: ProfileCodec,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            identity,
            store,
            codec,
            exp_per_train: DEFAULT_EXP_PER_TRAIN,
            state: Mutex::new(SessionState::Unauthenticated),
            model: Mutex::new(None),
            notifier: ChangeNotifier::new(),
            save_gate: tokio::sync::Mutex::new(()),
            dirty: AtomicBool::new(false),
            events,
        }
    }

    pub fn with_exp_per_train(mut self, amount: u32) -> Self {
        self.exp_per_train = amount;
        self
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Register a change listener. Subscriptions outlive sign-out and re-sign-in.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Read the current model. `None` unless the session is ready.
    pub fn with_model<R>(&self, f: impl FnOnce(&ProgressionModel) -> R) -> Option<R> {
        lock(&self.model).as_ref().map(f)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        debug!("session state {:?} -> {:?}", *state, next);
        *state = next;
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Atomically move into `Authenticating`.
    fn begin_sign_in(&self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        if state.is_busy() {
            metrics::inc_sign_in_rejected();
            warn!("sign-in rejected: another sign-in is in flight");
            return Err(SessionError::SignInInProgress);
        }
        if *state == SessionState::Ready {
            info!("re-authenticating; discarding current profile");
        }
        debug!("session state {:?} -> {:?}", *state, SessionState::Authenticating);
        *state = SessionState::Authenticating;
        Ok(())
    }

    /// Drop the current model. Caller holds the save gate.
    fn discard_model(&self) {
        let previous = lock(&self.model).take();
        if self.dirty.swap(false, Ordering::SeqCst) && previous.is_some() {
            warn!("re-authenticating with unsaved profile changes");
        }
    }

    /// Authenticate, load or create the profile and make it current.
    /// Returns the signed-in display name.
    pub async fn sign_in(&self) -> Result<String, SessionError> {
        self.begin_sign_in()?;
        let pending = PendingSignIn {
            session: self,
            armed: true,
        };
        metrics::inc_sign_in_started();
        let _gate = self.save_gate.lock().await;
        self.discard_model();

        let outcome = self.reconcile().await;
        pending.settle();
        match outcome {
            Ok(model) => {
                let display_name = model.player_name().to_string();
                *lock(&self.model) = Some(model);
                self.set_state(SessionState::Ready);
                metrics::inc_sign_in_succeeded();
                info!("signed in as {}", escape_log(&display_name));
                self.notifier.notify();
                self.emit(SessionEvent::SignedIn {
                    display_name: display_name.clone(),
                });
                Ok(display_name)
            }
            Err(reason) => {
                self.set_state(SessionState::Failed);
                metrics::inc_sign_in_failed();
                warn!("sign-in failed: {}", escape_log(&reason));
                self.emit(SessionEvent::SignInFailed {
                    reason: reason.clone(),
                });
                Err(SessionError::External(reason))
            }
        }
    }

    async fn reconcile(&self) -> Result<ProgressionModel, String> {
        let identity = self
            .identity
            .sign_in()
            .await
            .map_err(|e| format!("authentication failed: {}", e))?;
        validate_player_id(&identity.id)
            .map_err(|e| format!("identity provider returned an unusable player id: {}", e))?;
        self.set_state(SessionState::Reconciling);

        let stored = self
            .store
            .load(&identity.id)
            .await
            .map_err(|e| format!("could not load profile: {}", e))?;

        match stored {
            Some(record) => self.merge(&identity, &record).await,
            None => self.create(&identity).await,
        }
    }

    /// Existing player: keep stored progress, take id and name from the identity.
    async fn merge(
        &self,
        identity: &Identity,
        record: &PersistedRecord,
    ) -> Result<ProgressionModel, String> {
        let decoded = self.codec.decode(record);
        let mut model = decoded.model;
        if model.player_id() != identity.id {
            warn!(
                "stored profile id '{}' differs from identity '{}'; identity wins",
                escape_log(model.player_id()),
                escape_log(&identity.id)
            );
        }
        let renamed = model.player_name() != identity.display_name;
        model.set_identity(&identity.id, &identity.display_name);

        if renamed {
            debug!("display name changed upstream; saving merged profile");
            let record = self.codec.encode(&model);
            self.persist(&identity.id, &record)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(model)
    }

    async fn create(&self, identity: &Identity) -> Result<ProgressionModel, String> {
        let mut model = ProgressionModel::new(*self.codec.fallback_tuning());
        model.initialize(&identity.id, &identity.display_name);
        let record = self.codec.encode(&model);
        self.persist(&identity.id, &record)
            .await
            .map_err(|e| e.to_string())?;
        metrics::inc_profile_created();
        info!(
            "created profile for {} ({})",
            escape_log(&identity.display_name),
            escape_log(&identity.id)
        );
        Ok(model)
    }

    async fn persist(&self, player_id: &str, record: &PersistedRecord) -> Result<(), SessionError> {
        match self.store.save(player_id, record).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                metrics::inc_save_ok();
                debug!("saved profile {}", escape_log(player_id));
                Ok(())
            }
            Err(e) => {
                metrics::inc_save_failed();
                let reason = format!("could not save profile: {}", e);
                warn!("{}", escape_log(&reason));
                Err(SessionError::External(reason))
            }
        }
    }

    /// Apply `change` to the current model and persist the result. The local
    /// change stays even when the save fails; the session is then dirty.
    async fn mutate_and_save<R>(
        &self,
        change: impl FnOnce(&mut ProgressionModel) -> Result<R, ProgressionError>,
    ) -> Result<R, SessionError> {
        let _gate = self.save_gate.lock().await;
        self.mutate_and_save_gated(change).await
    }

    async fn mutate_and_save_gated<R>(
        &self,
        change: impl FnOnce(&mut ProgressionModel) -> Result<R, ProgressionError>,
    ) -> Result<R, SessionError> {
        let (value, player_id, record) = {
            let mut guard = lock(&self.model);
            let model = guard.as_mut().ok_or(SessionError::NotSignedIn)?;
            let value = change(model)?;
            (value, model.player_id().to_string(), self.codec.encode(model))
        };
        self.dirty.store(true, Ordering::SeqCst);
        self.notifier.notify();

        if let Err(e) = self.persist(&player_id, &record).await {
            self.emit(SessionEvent::SaveFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }
        Ok(value)
    }

    /// Returns the number of levels gained.
    pub async fn gain_experience(&self, amount: i64) -> Result<u32, SessionError> {
        let gained = self
            .mutate_and_save(|model| model.add_experience(amount))
            .await?;
        metrics::add_level_ups(gained);
        Ok(gained)
    }

    pub async fn train(&self) -> Result<u32, SessionError> {
        self.gain_experience(i64::from(self.exp_per_train)).await
    }

    /// Returns the stat's new value.
    pub async fn assign_skill_points(&self, stat: Stat, count: u32) -> Result<u32, SessionError> {
        self.mutate_and_save(|model| model.assign_skill_point(stat, count))
            .await
    }

    /// Rename through the identity provider, then mirror the confirmed name.
    /// The save gate is held throughout so the session cannot sign out or
    /// switch players between the provider rename and the local one.
    pub async fn update_display_name(&self, new_name: &str) -> Result<String, SessionError> {
        if !self.is_ready() {
            return Err(SessionError::NotSignedIn);
        }
        let name = validate_display_name(new_name)
            .map_err(|e| ProgressionError::InvalidArgument(e.to_string()))?;

        let _gate = self.save_gate.lock().await;
        if !self.is_ready() {
            return Err(SessionError::NotSignedIn);
        }
        let confirmed = self
            .identity
            .update_display_name(&name)
            .await
            .map_err(|e| SessionError::External(format!("could not change name: {}", e)))?;

        self.mutate_and_save_gated(|model| {
            model.update_name(&confirmed);
            Ok(())
        })
        .await?;
        info!("display name changed to {}", escape_log(&confirmed));
        Ok(confirmed)
    }

    /// Persist the current model as is.
    pub async fn save(&self) -> Result<(), SessionError> {
        let _gate = self.save_gate.lock().await;
        let (player_id, record) = {
            let guard = lock(&self.model);
            let model = guard.as_ref().ok_or(SessionError::NotSignedIn)?;
            (model.player_id().to_string(), self.codec.encode(model))
        };
        self.persist(&player_id, &record).await
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Ready => {}
            state if state.is_busy() => return Err(SessionError::SignInInProgress),
            _ => return Err(SessionError::NotSignedIn),
        }
        let _gate = self.save_gate.lock().await;
        if let Err(e) = self.identity.sign_out().await {
            warn!("identity provider sign-out failed: {}", e);
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            warn!("signing out with unsaved profile changes");
        }
        lock(&self.model).take();
        self.set_state(SessionState::Unauthenticated);
        self.notifier.notify();
        self.emit(SessionEvent::SignedOut);
        info!("signed out");
        Ok(())
    }
}
