//! Identity provider boundary.
//!
//! The session reconciler only needs two answers from an identity service:
//! who signed in, and what display name the service confirmed after a rename.
//! [`LocalIdentityProvider`] implements this over on-disk local accounts.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::{Account, AccountDirectory, LocalIdentityProvider, SignInMethod, ANONYMOUS_DISPLAY_NAME};

/// Authoritative "who" for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt account record: {0}")]
    Corrupt(String),

    #[error("password hash failure: {0}")]
    Hash(String),

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate and report the signed-in identity.
    async fn sign_in(&self) -> Result<Identity, AuthError>;

    /// Change the display name of the signed-in identity. Returns the name the
    /// service actually stored, which callers must treat as authoritative.
    async fn update_display_name(&self, new_name: &str) -> Result<String, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
