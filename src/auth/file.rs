//
//  buildkite-cli
//  auth/file.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Plaintext token storage in the user config file.
//!
//! Every operation re-reads the file and writes it back, so tokens written
//! here never clobber other keys that changed on disk in the meantime.

use std::path::PathBuf;

use anyhow::Result;

use super::{StorageKind, TokenStore};
use crate::config::{read_yaml, write_yaml, UserConfig};

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All organizations in the file, with or without a token.
    pub fn organizations(&self) -> Result<Vec<String>> {
        let config: UserConfig = read_yaml(&self.path)?;
        Ok(config.organizations.into_keys().collect())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, org: &str) -> Result<Option<String>> {
        let config: UserConfig = read_yaml(&self.path)?;
        Ok(config
            .organizations
            .get(org)
            .and_then(|entry| entry.api_token.clone())
            .filter(|token| !token.is_empty()))
    }

    fn set(&self, org: &str, token: &str) -> Result<()> {
        let mut config: UserConfig = read_yaml(&self.path)?;
        config
            .organizations
            .entry(org.to_string())
            .or_default()
            .api_token = Some(token.to_string());
        write_yaml(&self.path, &config)
    }

    /// Clears the token but keeps the organization entry.
    fn delete(&self, org: &str) -> Result<()> {
        let mut config: UserConfig = read_yaml(&self.path)?;
        let Some(entry) = config.organizations.get_mut(org) else {
            return Ok(());
        };
        if entry.api_token.take().is_none() {
            return Ok(());
        }
        write_yaml(&self.path, &config)
    }

    fn list(&self) -> Result<Vec<String>> {
        let config: UserConfig = read_yaml(&self.path)?;
        Ok(config
            .organizations
            .into_iter()
            .filter(|(_, entry)| entry.api_token.as_deref().is_some_and(|t| !t.is_empty()))
            .map(|(slug, _)| slug)
            .collect())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::File
    }
}
