//
//  buildkite-cli
//  auth/keyring.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Keychain Token Storage
//!
//! Tokens stored in the platform's native secret store:
//!
//! - **macOS**: Keychain Services
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//! - **Windows**: Windows Credential Manager
//!
//! Each token is one entry with service `com.buildkite.cli` and the
//! organization slug as the account name. The secret store offers no way to
//! enumerate entries, so [`TokenStore::list`] is always empty; the set of
//! organizations comes from the user config file instead.

use anyhow::{Context, Result};
use keyring::Entry;

use super::{StorageKind, TokenStore};

/// Service name under which tokens are stored.
pub const SERVICE_NAME: &str = "com.buildkite.cli";

pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, org: &str) -> Result<Entry> {
        Entry::new(&self.service, org)
            .with_context(|| format!("Failed to open keychain entry for {org}"))
    }
}

impl TokenStore for KeyringStore {
    fn get(&self, org: &str) -> Result<Option<String>> {
        match self.entry(org)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read token for {org} from keychain"))),
        }
    }

    fn set(&self, org: &str, token: &str) -> Result<()> {
        self.entry(org)?
            .set_password(token)
            .with_context(|| format!("Failed to store token for {org} in keychain"))
    }

    fn delete(&self, org: &str) -> Result<()> {
        match self.entry(org)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Keychain
    }
}
