use thiserror::Error;

/// Errors raised by the progression model and its tuning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressionError {
    /// Caller contract violation (negative experience, unknown stat, zero allocation).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough skill points for the requested allocation. Recoverable.
    #[error("insufficient skill points: requested {requested}, available {available}")]
    InsufficientSkillPoints { requested: u32, available: u32 },

    /// A tuning constant violates its invariant. Programming error, fails at construction.
    #[error("invalid progression configuration: {0}")]
    Configuration(String),
}
