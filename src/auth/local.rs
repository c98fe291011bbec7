//! File-backed local accounts.
//!
//! ```text
//! <data_dir>/
//! ├── accounts/<name>.json   ← password accounts (Argon2id hashes)
//! └── device.json            ← anonymous identity for this installation
//! ```
//!
//! Files are written under an exclusive lock on a `<name>.lock` sidecar,
//! through a temp file and an atomic rename, so a crash never leaves a
//! half-written account behind.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{info, warn};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use super::{AuthError, Identity, IdentityProvider};
use crate::validation::{
    escape_log, safe_filename, secure_json_parse, validate_account_name, validate_display_name,
};

pub const ANONYMOUS_DISPLAY_NAME: &str = "Player";
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;
const MAX_ACCOUNT_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub player_id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl Account {
    fn new(username: &str, display_name: &str, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            player_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            password_hash,
            created_at: now,
            last_login: now,
        }
    }

    fn identity(&self) -> Identity {
        Identity::new(self.player_id.clone(), self.display_name.clone())
    }
}

/// Which local account a signed-in provider refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AccountRef {
    Device,
    Named(String),
}

pub struct AccountDirectory {
    root: PathBuf,
    argon2: Argon2<'static>,
}

impl AccountDirectory {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AuthError> {
        Self::open_with_params(root, None).await
    }

    /// Open with explicit Argon2 params (memory/time/parallelism from config).
    pub async fn open_with_params(
        root: impl Into<PathBuf>,
        params: Option<Params>,
    ) -> Result<Self, AuthError> {
        let root = root.into();
        fs::create_dir_all(root.join("accounts")).await?;
        let argon2 = match params {
            Some(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
            None => Argon2::default(),
        };
        Ok(Self { root, argon2 })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn account_path(&self, username: &str) -> PathBuf {
        self.root
            .join("accounts")
            .join(format!("{}.json", safe_filename(&username.to_ascii_lowercase())))
    }

    fn device_path(&self) -> PathBuf {
        self.root.join("device.json")
    }

    fn path_for(&self, account: &AccountRef) -> PathBuf {
        match account {
            AccountRef::Device => self.device_path(),
            AccountRef::Named(username) => self.account_path(username),
        }
    }

    async fn read_account(path: &Path) -> Result<Option<Account>, AuthError> {
        match fs::read_to_string(path).await {
            Ok(content) => secure_json_parse(&content, MAX_ACCOUNT_BYTES)
                .map(Some)
                .map_err(|e| AuthError::Corrupt(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_account(path: &Path, account: &Account) -> Result<(), AuthError> {
        let content = serde_json::to_string_pretty(account)?;
        replace_file(path, content.as_bytes())
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    /// Create a password account; fails if the name is taken.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Account, AuthError> {
        let username =
            validate_account_name(username).map_err(|e| AuthError::InvalidInput(e.to_string()))?;
        if password.len() < PASSWORD_MIN {
            return Err(AuthError::InvalidInput(format!(
                "password too short (minimum {} characters)",
                PASSWORD_MIN
            )));
        }
        if password.len() > PASSWORD_MAX {
            return Err(AuthError::InvalidInput("password too long".to_string()));
        }
        let display_name = match display_name {
            Some(name) => {
                validate_display_name(name).map_err(|e| AuthError::InvalidInput(e.to_string()))?
            }
            None => username.clone(),
        };

        let path = self.account_path(&username);
        if Self::read_account(&path).await?.is_some() {
            return Err(AuthError::AccountExists(username));
        }
        let hash = self.hash_password(password)?;
        let account = Account::new(&username, &display_name, Some(hash));
        Self::write_account(&path, &account).await?;
        info!("registered local account {}", escape_log(&username));
        Ok(account)
    }

    pub async fn get(&self, username: &str) -> Result<Option<Account>, AuthError> {
        Self::read_account(&self.account_path(username)).await
    }

    /// Check a password and stamp the login time.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let path = self.account_path(username);
        let Some(mut account) = Self::read_account(&path).await? else {
            warn!(target: "security", "sign-in for unknown account {}", escape_log(username));
            return Err(AuthError::AccountNotFound(username.to_string()));
        };
        let Some(stored) = account.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        let parsed =
            PasswordHash::new(stored).map_err(|e| AuthError::Corrupt(format!("password hash: {e}")))?;
        if self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            warn!(target: "security", "bad password for {}", escape_log(username));
            return Err(AuthError::InvalidCredentials);
        }
        account.last_login = Utc::now();
        Self::write_account(&path, &account).await?;
        Ok(account)
    }

    /// The anonymous identity of this installation, created on first use.
    pub async fn device_account(&self) -> Result<Account, AuthError> {
        let path = self.device_path();
        let mut account = match Self::read_account(&path).await? {
            Some(account) => account,
            None => {
                let account = Account::new("", ANONYMOUS_DISPLAY_NAME, None);
                info!("created anonymous device identity {}", account.player_id);
                account
            }
        };
        account.last_login = Utc::now();
        Self::write_account(&path, &account).await?;
        Ok(account)
    }

    async fn set_display_name(
        &self,
        account: &AccountRef,
        display_name: &str,
    ) -> Result<Account, AuthError> {
        let path = self.path_for(account);
        let Some(mut stored) = Self::read_account(&path).await? else {
            return Err(AuthError::AccountNotFound(match account {
                AccountRef::Device => "device".to_string(),
                AccountRef::Named(name) => name.clone(),
            }));
        };
        stored.display_name = display_name.to_string();
        Self::write_account(&path, &stored).await?;
        Ok(stored)
    }
}

impl fmt::Debug for AccountDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountDirectory")
            .field("root", &self.root)
            .finish()
    }
}

/// Replace an account file in one step. Writers serialize on a sidecar
/// `.lock` file so the record itself is never observed empty or half written.
fn replace_file(path: &Path, content: &[u8]) -> Result<(), AuthError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.with_extension("lock"))?;
    lock_file.lock_exclusive()?;

    let tmp_path = dir.join(format!(".{}.tmp", Uuid::new_v4().simple()));
    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .and_then(|mut tmp| {
            tmp.write_all(content)?;
            tmp.sync_all()
        })
        .and_then(|()| std::fs::rename(&tmp_path, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        let _ = FileExt::unlock(&lock_file);
        return Err(AuthError::Io(e));
    }

    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    FileExt::unlock(&lock_file)?;
    Ok(())
}

#[derive(Clone)]
pub enum SignInMethod {
    /// Per-installation identity with no credentials.
    Anonymous,
    Password { username: String, password: String },
}

impl fmt::Debug for SignInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignInMethod::Anonymous => f.write_str("Anonymous"),
            SignInMethod::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// [`IdentityProvider`] over an [`AccountDirectory`].
#[derive(Debug)]
pub struct LocalIdentityProvider {
    directory: AccountDirectory,
    method: SignInMethod,
    current: Mutex<Option<AccountRef>>,
}

impl LocalIdentityProvider {
    pub fn new(directory: AccountDirectory, method: SignInMethod) -> Self {
        Self {
            directory,
            method,
            current: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    fn current(&self) -> Option<AccountRef> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_current(&self, account: Option<AccountRef>) {
        match self.current.lock() {
            Ok(mut guard) => *guard = account,
            Err(poisoned) => *poisoned.into_inner() = account,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in(&self) -> Result<Identity, AuthError> {
        let (account, reference) = match &self.method {
            SignInMethod::Anonymous => (self.directory.device_account().await?, AccountRef::Device),
            SignInMethod::Password { username, password } => (
                self.directory.verify(username, password).await?,
                AccountRef::Named(username.clone()),
            ),
        };
        self.set_current(Some(reference));
        info!(
            "signed in as {} ({})",
            escape_log(&account.display_name),
            account.player_id
        );
        Ok(account.identity())
    }

    async fn update_display_name(&self, new_name: &str) -> Result<String, AuthError> {
        let Some(reference) = self.current() else {
            return Err(AuthError::NotSignedIn);
        };
        let name =
            validate_display_name(new_name).map_err(|e| AuthError::InvalidInput(e.to_string()))?;
        let account = self.directory.set_display_name(&reference, &name).await?;
        Ok(account.display_name)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_current(None);
        Ok(())
    }
}
