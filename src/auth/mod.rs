//
//  buildkite-cli
//  auth/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Token Storage Module
//!
//! API tokens are stored per organization behind the [`TokenStore`]
//! contract. Two backends exist:
//!
//! - [`KeyringStore`]: the operating system's secret store, keyed by
//!   `(com.buildkite.cli, <org_slug>)`
//! - [`FileTokenStore`]: plaintext under `organizations.<slug>.api_token` in
//!   the user config file
//!
//! ## Backend Selection
//!
//! `BUILDKITE_TOKEN_STORAGE` chooses `keychain` or `file`. When it is unset
//! the keychain is used, except when `CI` is set, where no keychain is
//! expected to exist.
//!
//! ## Module Structure
//!
//! - [`keyring`]: OS keychain backend
//! - [`file`]: config-file backend
//! - [`migrate`]: one-way copy from file to keychain
//!
//! ## Example
//!
//! ```rust,no_run
//! use buildkite_cli::auth::{select_store, StorageKind};
//!
//! let store = select_store(StorageKind::from_env(), "/home/me/.config/bk.yaml".into());
//! if let Some(token) = store.get("acme")? {
//!     println!("Found token for acme ({} chars)", token.len());
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

mod file;
mod keyring;
mod migrate;

pub use file::*;
pub use keyring::*;
pub use migrate::*;

use std::path::PathBuf;

use anyhow::Result;

/// Environment variable selecting the token backend.
pub const TOKEN_STORAGE_ENV: &str = "BUILDKITE_TOKEN_STORAGE";

/// Which backend holds tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Keychain,
    File,
}

impl StorageKind {
    /// Reads `BUILDKITE_TOKEN_STORAGE` and `CI` from the environment.
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var(TOKEN_STORAGE_ENV).ok().as_deref(),
            std::env::var_os("CI").is_some(),
        )
    }

    /// Picks a backend from the raw variable values.
    ///
    /// An explicit choice always wins; otherwise CI environments use the
    /// file and everything else the keychain.
    pub fn resolve(storage: Option<&str>, in_ci: bool) -> Self {
        match storage.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("file") => Self::File,
            Some("keychain") | Some("keyring") => Self::Keychain,
            Some("") | None => {
                if in_ci {
                    Self::File
                } else {
                    Self::Keychain
                }
            }
            Some(other) => {
                tracing::warn!(
                    "Unknown {} value {:?}, using keychain",
                    TOKEN_STORAGE_ENV,
                    other
                );
                Self::Keychain
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keychain => "keychain",
            Self::File => "file",
        }
    }
}

/// The secret contract shared by both backends.
///
/// `list` enumerates organizations holding a token where the backend can
/// enumerate at all; the keychain cannot, and always returns an empty list.
pub trait TokenStore: Send + Sync {
    fn get(&self, org: &str) -> Result<Option<String>>;

    fn set(&self, org: &str, token: &str) -> Result<()>;

    fn delete(&self, org: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<String>>;

    fn kind(&self) -> StorageKind;
}

/// Builds the backend for `kind`. The file backend writes to `user_config`.
pub fn select_store(kind: StorageKind, user_config: PathBuf) -> Box<dyn TokenStore> {
    tracing::debug!("Using {} token storage", kind.as_str());
    match kind {
        StorageKind::Keychain => Box::new(KeyringStore::new()),
        StorageKind::File => Box::new(FileTokenStore::new(user_config)),
    }
}

/// In-memory backend for tests.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    pub struct MemoryTokenStore {
        kind: StorageKind,
        tokens: Mutex<BTreeMap<String, String>>,
    }

    impl MemoryTokenStore {
        pub fn new(kind: StorageKind) -> Self {
            Self {
                kind,
                tokens: Mutex::new(BTreeMap::new()),
            }
        }
    }

    impl TokenStore for MemoryTokenStore {
        fn get(&self, org: &str) -> Result<Option<String>> {
            Ok(self.tokens.lock().unwrap().get(org).cloned())
        }

        fn set(&self, org: &str, token: &str) -> Result<()> {
            self.tokens
                .lock()
                .unwrap()
                .insert(org.to_string(), token.to_string());
            Ok(())
        }

        fn delete(&self, org: &str) -> Result<()> {
            self.tokens.lock().unwrap().remove(org);
            Ok(())
        }

        fn list(&self) -> Result<Vec<String>> {
            match self.kind {
                StorageKind::Keychain => Ok(Vec::new()),
                StorageKind::File => Ok(self.tokens.lock().unwrap().keys().cloned().collect()),
            }
        }

        fn kind(&self) -> StorageKind {
            self.kind
        }
    }
}
