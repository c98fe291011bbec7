//! Flat persisted form of a [`ProgressionModel`].
//!
//! The record mirrors the model field for field plus the game version that
//! wrote it. Every field is optional on read so older or partial saves still
//! load; missing fields fall back to model defaults. A version mismatch is
//! reported to the caller, never treated as a failure, and no migration is
//! attempted here.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::model::{
    ChangeNotifier, LevelTuning, ProgressionModel, RestoredProgress, DEFAULT_STAT_VALUE,
    STARTING_LEVEL,
};
use crate::validation::{escape_log, secure_json_parse, PayloadError};

/// Upper bound for a serialized profile; real records are a few hundred bytes.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_skill_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agility: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_exp_required: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_per_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_version: Option<String>,
}

impl PersistedRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(content: &str) -> Result<Self, PayloadError> {
        secure_json_parse(content, MAX_RECORD_BYTES)
    }
}

/// The stored record was written by a different game version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub stored: String,
    pub current: String,
}

#[derive(Debug)]
pub struct Decoded {
    pub model: ProgressionModel,
    pub version_mismatch: Option<VersionMismatch>,
    /// The stored curve was missing or invalid and the configured one was used.
    pub tuning_replaced: bool,
    /// Levels applied while re-establishing the experience invariant.
    pub normalized_levels: u32,
}

#[derive(Debug, Clone)]
pub struct ProfileCodec {
    current_version: String,
    fallback_tuning: LevelTuning,
}

impl ProfileCodec {
    pub fn new(current_version: impl Into<String>, fallback_tuning: LevelTuning) -> Self {
        Self {
            current_version: current_version.into(),
            fallback_tuning,
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn fallback_tuning(&self) -> &LevelTuning {
        &self.fallback_tuning
    }

    pub fn encode(&self, model: &ProgressionModel) -> PersistedRecord {
        let tuning = model.tuning();
        PersistedRecord {
            player_id: Some(model.player_id().to_string()),
            player_name: Some(model.player_name().to_string()),
            level: Some(model.level()),
            experience: Some(model.experience()),
            available_skill_points: Some(model.available_skill_points()),
            strength: Some(model.strength()),
            defense: Some(model.defense()),
            agility: Some(model.agility()),
            base_exp_required: Some(tuning.base_exp_required()),
            exp_multiplier: Some(tuning.exp_multiplier()),
            points_per_level: Some(tuning.points_per_level()),
            game_version: Some(self.current_version.clone()),
        }
    }

    pub fn decode(&self, record: &PersistedRecord) -> Decoded {
        self.decode_with_notifier(record, ChangeNotifier::new())
    }

    /// Decode into a model that reports through an existing notifier. No
    /// notification is fired while decoding.
    pub fn decode_with_notifier(
        &self,
        record: &PersistedRecord,
        notifier: ChangeNotifier,
    ) -> Decoded {
        let player_id = record.player_id.clone().unwrap_or_default();
        let (tuning, tuning_replaced) = self.stored_tuning(record, &player_id);

        let mut model = ProgressionModel::with_notifier(tuning, notifier);
        model.set_identity(
            &player_id,
            record.player_name.as_deref().unwrap_or_default(),
        );
        let normalized_levels = model.restore(RestoredProgress {
            level: record.level.unwrap_or(STARTING_LEVEL),
            experience: record.experience.unwrap_or(0),
            available_skill_points: record.available_skill_points.unwrap_or(0),
            strength: record.strength.unwrap_or(DEFAULT_STAT_VALUE),
            defense: record.defense.unwrap_or(DEFAULT_STAT_VALUE),
            agility: record.agility.unwrap_or(DEFAULT_STAT_VALUE),
        });
        if normalized_levels > 0 {
            warn!(
                "profile {} carried overflowing experience; applied {} level-ups on load",
                escape_log(&player_id),
                normalized_levels
            );
        }

        let stored_version = record.game_version.clone().unwrap_or_default();
        let version_mismatch = if stored_version != self.current_version {
            info!(
                "profile {} was saved by version '{}', running '{}'",
                escape_log(&player_id),
                escape_log(&stored_version),
                self.current_version
            );
            Some(VersionMismatch {
                stored: stored_version,
                current: self.current_version.clone(),
            })
        } else {
            None
        };

        Decoded {
            model,
            version_mismatch,
            tuning_replaced,
            normalized_levels,
        }
    }

    fn stored_tuning(&self, record: &PersistedRecord, player_id: &str) -> (LevelTuning, bool) {
        let (Some(base), Some(multiplier), Some(points)) = (
            record.base_exp_required,
            record.exp_multiplier,
            record.points_per_level,
        ) else {
            return (self.fallback_tuning, true);
        };
        match LevelTuning::new(base, multiplier, points) {
            Ok(tuning) => (tuning, false),
            Err(e) => {
                warn!(
                    "profile {} has unusable tuning ({}); using configured curve",
                    escape_log(player_id),
                    e
                );
                (self.fallback_tuning, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::Stat;

    fn codec() -> ProfileCodec {
        ProfileCodec::new("1.4.0", LevelTuning::default())
    }

    #[test]
    fn encode_maps_every_field_and_stamps_version() {
        let mut model = ProgressionModel::new(LevelTuning::new(80, 1.25, 2).unwrap());
        model.initialize("u1", "Ada");
        model.add_experience(100).unwrap();
        model.assign_skill_point(Stat::Defense, 2).unwrap();

        let record = codec().encode(&model);
        assert_eq!(record.player_id.as_deref(), Some("u1"));
        assert_eq!(record.player_name.as_deref(), Some("Ada"));
        assert_eq!(record.level, Some(2));
        assert_eq!(record.experience, Some(20));
        assert_eq!(record.available_skill_points, Some(0));
        assert_eq!(record.strength, Some(10));
        assert_eq!(record.defense, Some(12));
        assert_eq!(record.agility, Some(10));
        assert_eq!(record.base_exp_required, Some(80));
        assert_eq!(record.exp_multiplier, Some(1.25));
        assert_eq!(record.points_per_level, Some(2));
        assert_eq!(record.game_version.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn empty_record_decodes_to_defaults() {
        let decoded = codec().decode(&PersistedRecord::default());
        let model = decoded.model;
        assert_eq!(model.player_id(), "");
        assert_eq!(model.player_name(), "");
        assert_eq!(model.level(), 1);
        assert_eq!(model.experience(), 0);
        assert_eq!(model.available_skill_points(), 0);
        assert_eq!(model.strength(), 10);
        assert_eq!(model.defense(), 10);
        assert_eq!(model.agility(), 10);
        assert_eq!(model.tuning(), &LevelTuning::default());
        assert!(decoded.tuning_replaced);
        assert_eq!(
            decoded.version_mismatch,
            Some(VersionMismatch {
                stored: String::new(),
                current: "1.4.0".to_string()
            })
        );
    }

    #[test]
    fn level_zero_is_clamped() {
        let record = PersistedRecord {
            level: Some(0),
            ..PersistedRecord::default()
        };
        assert_eq!(codec().decode(&record).model.level(), 1);
    }

    #[test]
    fn overflowing_experience_levels_up_on_load() {
        let record = PersistedRecord {
            level: Some(1),
            experience: Some(260),
            available_skill_points: Some(1),
            base_exp_required: Some(100),
            exp_multiplier: Some(1.5),
            points_per_level: Some(3),
            game_version: Some("1.4.0".to_string()),
            ..PersistedRecord::default()
        };
        let decoded = codec().decode(&record);
        assert_eq!(decoded.normalized_levels, 2);
        assert_eq!(decoded.model.level(), 3);
        assert_eq!(decoded.model.experience(), 10);
        assert_eq!(decoded.model.available_skill_points(), 7);
        assert!(decoded.version_mismatch.is_none());
        assert!(!decoded.tuning_replaced);
    }

    #[test]
    fn invalid_stored_tuning_falls_back() {
        let record = PersistedRecord {
            base_exp_required: Some(100),
            exp_multiplier: Some(1.0),
            points_per_level: Some(3),
            ..PersistedRecord::default()
        };
        let decoded = codec().decode(&record);
        assert!(decoded.tuning_replaced);
        assert_eq!(decoded.model.tuning(), &LevelTuning::default());
    }

    #[test]
    fn json_uses_snake_case_keys_and_tolerates_missing_ones() {
        let mut model = ProgressionModel::new(LevelTuning::default());
        model.initialize("u7", "Kit");
        let json = codec().encode(&model).to_json().unwrap();
        assert!(json.contains("\"available_skill_points\":0"));
        assert!(json.contains("\"game_version\":\"1.4.0\""));

        let partial = PersistedRecord::from_json(r#"{"player_id":"u7","level":4}"#).unwrap();
        assert_eq!(partial.level, Some(4));
        assert_eq!(partial.strength, None);
        assert!(PersistedRecord::from_json("not json").is_err());
    }
}
