//! Player progression model and its persisted form.
//!
//! The model converts experience into levels and skill points; the codec maps
//! it to and from the flat record written to a profile store.

pub mod codec;
pub mod errors;
pub mod model;

pub use codec::{Decoded, PersistedRecord, ProfileCodec, VersionMismatch, MAX_RECORD_BYTES};
pub use errors::ProgressionError;
pub use model::{
    ChangeListener, ChangeNotifier, LevelTuning, ProgressionModel, Stat, SubscriptionId,
    DEFAULT_BASE_EXP_REQUIRED, DEFAULT_EXP_MULTIPLIER, DEFAULT_POINTS_PER_LEVEL,
    DEFAULT_STAT_VALUE, STARTING_LEVEL,
};
