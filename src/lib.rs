//! # heroledger - player progression with save/load reconciliation
//!
//! heroledger keeps a player's level, experience, skill points and stats,
//! signs the player in through an identity provider and reconciles the
//! signed-in identity with whatever progress was saved before.
//!
//! ## Features
//!
//! - **Leveling curve**: geometric thresholds (`base * multiplier^(level-1)`), excess
//!   experience rolls into further level-ups, each granting skill points.
//! - **Change notification**: payload-free subscribe/unsubscribe signal for front ends.
//! - **Reconciliation**: identity wins for id and name, the store wins for progress.
//! - **Pluggable seams**: async [`auth::IdentityProvider`] and [`storage::ProfileStore`]
//!   traits with local-account and sled backends.
//! - **Security**: Argon2id password hashing and validated, escaped user input.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heroledger::auth::{AccountDirectory, LocalIdentityProvider, SignInMethod};
//! use heroledger::config::Config;
//! use heroledger::session::SessionReconciler;
//! use heroledger::storage::SledProfileStoreBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let accounts = AccountDirectory::open(config.storage.accounts_path()).await?;
//!     let store = SledProfileStoreBuilder::new(config.storage.profiles_path())
//!         .record_key(config.storage.profile_key.clone())
//!         .open()?;
//!     let session = SessionReconciler::new(
//!         Arc::new(LocalIdentityProvider::new(accounts, SignInMethod::Anonymous)),
//!         Arc::new(store),
//!         config.codec()?,
//!     );
//!
//!     let name = session.sign_in().await?;
//!     session.train().await?;
//!     println!("{} is level {:?}", name, session.with_model(|m| m.level()));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`progression`] - the progression model and its persisted record codec
//! - [`session`] - sign-in state machine and persisted gameplay actions
//! - [`auth`] - identity provider trait and local accounts
//! - [`storage`] - profile store trait, sled and in-memory backends
//! - [`config`] - TOML configuration
//! - [`metrics`] - process-wide counters
//! - [`validation`] - name, id and payload validation

pub mod auth;
pub mod config;
pub mod metrics;
pub mod progression;
pub mod session;
pub mod storage;
pub mod validation;
