//! Player progression: levels, experience, skill points and the three stats.
//!
//! A [`ProgressionModel`] is owned by whoever displays it (a menu, the CLI, the
//! session reconciler). Every successful mutation fires exactly one change
//! notification through its [`ChangeNotifier`]; observers re-read the model.
//!
//! Two invariants hold after every mutation:
//!
//! - experience is always below the threshold of the current level (excess is
//!   converted to level-ups, each granting `points_per_level` skill points);
//! - available skill points only go down through an allocation that raises
//!   exactly one stat by the same amount.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::errors::ProgressionError;

pub const STARTING_LEVEL: u32 = 1;
pub const DEFAULT_STAT_VALUE: u32 = 10;
pub const DEFAULT_BASE_EXP_REQUIRED: u32 = 100;
pub const DEFAULT_EXP_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_POINTS_PER_LEVEL: u32 = 3;

/// The stats a skill point can be spent on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Strength,
    Defense,
    Agility,
}

impl Stat {
    pub const ALL: [Stat; 3] = [Stat::Strength, Stat::Defense, Stat::Agility];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stat::Strength => "strength",
            Stat::Defense => "defense",
            Stat::Agility => "agility",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stat {
    type Err = ProgressionError;

    /// Accepts full names and the three-letter abbreviations, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strength" | "str" => Ok(Stat::Strength),
            "defense" | "defence" | "def" => Ok(Stat::Defense),
            "agility" | "agi" => Ok(Stat::Agility),
            other => Err(ProgressionError::InvalidArgument(format!(
                "unknown stat '{}'",
                other
            ))),
        }
    }
}

/// Leveling curve constants. Only constructible through [`LevelTuning::new`],
/// so a model can never carry a curve that fails to grow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelTuning {
    base_exp_required: u32,
    exp_multiplier: f64,
    points_per_level: u32,
}

impl LevelTuning {
    pub fn new(
        base_exp_required: u32,
        exp_multiplier: f64,
        points_per_level: u32,
    ) -> Result<Self, ProgressionError> {
        if base_exp_required < 1 {
            return Err(ProgressionError::Configuration(format!(
                "base_exp_required must be at least 1, got {}",
                base_exp_required
            )));
        }
        if !exp_multiplier.is_finite() || exp_multiplier <= 1.0 {
            return Err(ProgressionError::Configuration(format!(
                "exp_multiplier must be a finite value greater than 1, got {}",
                exp_multiplier
            )));
        }
        Ok(Self {
            base_exp_required,
            exp_multiplier,
            points_per_level,
        })
    }

    pub fn base_exp_required(&self) -> u32 {
        self.base_exp_required
    }

    pub fn exp_multiplier(&self) -> f64 {
        self.exp_multiplier
    }

    pub fn points_per_level(&self) -> u32 {
        self.points_per_level
    }

    /// Experience needed to advance from `level` to `level + 1`:
    /// `round(base_exp_required * exp_multiplier^(level - 1))`.
    ///
    /// Evaluated in `f64` and rounded half-to-even, so the threshold is always
    /// recomputable from a persisted level. Level 0 is read as level 1. The
    /// result saturates at `u64::MAX`.
    pub fn required_exp_for_level(&self, level: u32) -> u64 {
        let exponent = i32::try_from(level.max(STARTING_LEVEL) - 1).unwrap_or(i32::MAX);
        let raw = f64::from(self.base_exp_required) * self.exp_multiplier.powi(exponent);
        let rounded = raw.round_ties_even();
        if rounded >= u64::MAX as f64 {
            u64::MAX
        } else {
            rounded as u64
        }
    }
}

impl Default for LevelTuning {
    fn default() -> Self {
        Self {
            base_exp_required: DEFAULT_BASE_EXP_REQUIRED,
            exp_multiplier: DEFAULT_EXP_MULTIPLIER,
            points_per_level: DEFAULT_POINTS_PER_LEVEL,
        }
    }
}

pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, ChangeListener>,
}

/// Payload-free "state changed" signal.
///
/// Cloning yields another handle to the same listener set, which lets a
/// session hand one notifier to every model it creates.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<Mutex<Listeners>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut listeners = self.listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners().entries.remove(&id.0).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().entries.len()
    }

    pub fn notify(&self) {
        // Call outside the lock so listeners may (un)subscribe re-entrantly.
        let snapshot: Vec<ChangeListener> = self.listeners().entries.values().cloned().collect();
        for listener in snapshot {
            listener();
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Progress fields as read back from storage, before invariants are restored.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RestoredProgress {
    pub level: u32,
    pub experience: u64,
    pub available_skill_points: u32,
    pub strength: u32,
    pub defense: u32,
    pub agility: u32,
}

#[derive(Debug)]
pub struct ProgressionModel {
    player_id: String,
    player_name: String,
    level: u32,
    experience: u64,
    available_skill_points: u32,
    strength: u32,
    defense: u32,
    agility: u32,
    tuning: LevelTuning,
    notifier: ChangeNotifier,
}

impl ProgressionModel {
    /// A level 1 model with default stats and no identity yet.
    pub fn new(tuning: LevelTuning) -> Self {
        Self::with_notifier(tuning, ChangeNotifier::new())
    }

    pub fn with_notifier(tuning: LevelTuning, notifier: ChangeNotifier) -> Self {
        Self {
            player_id: String::new(),
            player_name: String::new(),
            level: STARTING_LEVEL,
            experience: 0,
            available_skill_points: 0,
            strength: DEFAULT_STAT_VALUE,
            defense: DEFAULT_STAT_VALUE,
            agility: DEFAULT_STAT_VALUE,
            tuning,
            notifier,
        }
    }

    /// Reset all progress and bind the model to a player.
    pub fn initialize(&mut self, id: &str, name: &str) {
        self.player_id = id.to_string();
        self.player_name = name.to_string();
        self.level = STARTING_LEVEL;
        self.experience = 0;
        self.available_skill_points = 0;
        self.strength = DEFAULT_STAT_VALUE;
        self.defense = DEFAULT_STAT_VALUE;
        self.agility = DEFAULT_STAT_VALUE;
        self.notifier.notify();
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn experience(&self) -> u64 {
        self.experience
    }

    pub fn available_skill_points(&self) -> u32 {
        self.available_skill_points
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    pub fn defense(&self) -> u32 {
        self.defense
    }

    pub fn agility(&self) -> u32 {
        self.agility
    }

    pub fn stat(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Strength => self.strength,
            Stat::Defense => self.defense,
            Stat::Agility => self.agility,
        }
    }

    pub fn tuning(&self) -> &LevelTuning {
        &self.tuning
    }

    pub fn required_exp_for_level(&self, level: u32) -> u64 {
        self.tuning.required_exp_for_level(level)
    }

    pub fn required_exp_for_next_level(&self) -> u64 {
        self.tuning.required_exp_for_level(self.level)
    }

    /// Add experience and convert any excess into level-ups.
    ///
    /// Returns the number of levels gained. One notification is fired per
    /// call, after all level-ups, even when `amount` is zero.
    pub fn add_experience(&mut self, amount: i64) -> Result<u32, ProgressionError> {
        let amount = u64::try_from(amount).map_err(|_| {
            ProgressionError::InvalidArgument(format!(
                "experience amount must not be negative, got {}",
                amount
            ))
        })?;
        self.experience = self.experience.checked_add(amount).ok_or_else(|| {
            ProgressionError::InvalidArgument(format!(
                "adding {} experience overflows the experience counter",
                amount
            ))
        })?;
        let gained = self.apply_level_ups();
        if gained > 0 {
            info!(
                "player {} reached level {} (+{} skill points)",
                self.player_id,
                self.level,
                u64::from(gained) * u64::from(self.tuning.points_per_level)
            );
        }
        self.notifier.notify();
        Ok(gained)
    }

    fn apply_level_ups(&mut self) -> u32 {
        let mut gained = 0u32;
        loop {
            let threshold = self.required_exp_for_next_level();
            if self.experience < threshold {
                break;
            }
            let Some(next_level) = self.level.checked_add(1) else {
                warn!("player {} hit the level ceiling", self.player_id);
                break;
            };
            self.experience -= threshold;
            self.level = next_level;
            self.available_skill_points = self
                .available_skill_points
                .saturating_add(self.tuning.points_per_level);
            gained += 1;
        }
        gained
    }

    /// All stats draw from the same pool, so the stat does not change the answer.
    pub fn can_assign_skill_point(&self, _stat: Stat, count: u32) -> bool {
        count > 0 && self.available_skill_points >= count
    }

    /// Spend `count` skill points on `stat`. Returns the new stat value.
    pub fn assign_skill_point(&mut self, stat: Stat, count: u32) -> Result<u32, ProgressionError> {
        if count == 0 {
            return Err(ProgressionError::InvalidArgument(
                "allocation count must be at least 1".to_string(),
            ));
        }
        if !self.can_assign_skill_point(stat, count) {
            warn!(
                "player {} tried to spend {} points on {} with only {} available",
                self.player_id, count, stat, self.available_skill_points
            );
            return Err(ProgressionError::InsufficientSkillPoints {
                requested: count,
                available: self.available_skill_points,
            });
        }

        self.available_skill_points -= count;
        let slot = match stat {
            Stat::Strength => &mut self.strength,
            Stat::Defense => &mut self.defense,
            Stat::Agility => &mut self.agility,
        };
        *slot = slot.saturating_add(count);
        let value = *slot;
        debug!("player {} {} raised to {}", self.player_id, stat, value);
        self.notifier.notify();
        Ok(value)
    }

    /// Mirror the identity provider's display name. No validation happens here.
    pub fn update_name(&mut self, new_name: &str) {
        self.player_name = new_name.to_string();
        self.notifier.notify();
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Overwrite the identity fields without touching progress or notifying.
    pub(crate) fn set_identity(&mut self, player_id: &str, player_name: &str) {
        self.player_id = player_id.to_string();
        self.player_name = player_name.to_string();
    }

    /// Load stored progress and re-establish the experience invariant.
    /// Returns the number of levels applied while normalizing.
    pub(crate) fn restore(&mut self, progress: RestoredProgress) -> u32 {
        self.level = progress.level.max(STARTING_LEVEL);
        self.experience = progress.experience;
        self.available_skill_points = progress.available_skill_points;
        self.strength = progress.strength;
        self.defense = progress.defense;
        self.agility = progress.agility;
        self.apply_level_ups()
    }
}
