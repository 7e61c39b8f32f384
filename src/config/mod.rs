//
//  buildkite-cli
//  config/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Configuration Module
//!
//! Process-wide access to the user configuration (`bk.yaml`), the
//! repository-local configuration (`.bk.yaml`) and the token backend.
//!
//! ## Resolution Order
//!
//! | Value | Sources, highest precedence first |
//! |-------|-----------------------------------|
//! | Organization | `BUILDKITE_ORGANIZATION_SLUG`, `.bk.yaml` `selected_org`, `bk.yaml` `selected_org` |
//! | API token | `BUILDKITE_API_TOKEN`, the token backend for the organization |
//! | Preferred pipelines | `.bk.yaml` (`default_pipeline` first), `bk.yaml` `preferred_pipelines` |
//!
//! ## Example
//!
//! ```rust,no_run
//! use buildkite_cli::config::Config;
//!
//! let config = Config::load()?;
//! let org = config.organization_slug();
//! if config.has_configured_organization(&org) {
//!     println!("Using {}", org);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Notes
//!
//! `Config` is a handle threaded through commands, never a global. Its
//! mutating methods take `&self` and write through to disk immediately so
//! resolvers holding a shared reference can persist pipeline choices.

mod file;

pub use file::*;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::auth::{select_store, StorageKind, TokenStore};
use crate::context::git::GitContext;

/// Environment variable overriding the API token.
pub const API_TOKEN_ENV: &str = "BUILDKITE_API_TOKEN";

/// Environment variable overriding the organization.
pub const ORGANIZATION_ENV: &str = "BUILDKITE_ORGANIZATION_SLUG";

/// Environment overrides captured at load time.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub api_token: Option<String>,
    pub organization: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_token: non_empty(API_TOKEN_ENV),
            organization: non_empty(ORGANIZATION_ENV),
        }
    }
}

/// The configuration store.
pub struct Config {
    user_path: PathBuf,
    local_path: Option<PathBuf>,
    user: Mutex<UserConfig>,
    local: Mutex<LocalConfig>,
    store: Box<dyn TokenStore>,
    env: EnvOverrides,
    /// Backend lookup for the organization it was made for.
    token: Mutex<Option<(String, Option<String>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Config {
    /// Loads both files from their standard locations.
    ///
    /// The repository file is only consulted when the current directory is
    /// inside a git work tree.
    pub fn load() -> Result<Self> {
        let user_path = user_config_path()?;
        let local_path = GitContext::discover()
            .and_then(|git| git.root_dir())
            .map(|root| root.join(LOCAL_CONFIG_FILE));
        let store = select_store(StorageKind::from_env(), user_path.clone());
        Self::from_parts(user_path, local_path, store, EnvOverrides::from_env())
    }

    /// Builds a store from explicit paths, backend and overrides.
    pub fn from_parts(
        user_path: PathBuf,
        local_path: Option<PathBuf>,
        store: Box<dyn TokenStore>,
        env: EnvOverrides,
    ) -> Result<Self> {
        let user: UserConfig = read_yaml(&user_path)?;
        let local: LocalConfig = match &local_path {
            Some(path) => read_yaml(path)?,
            None => LocalConfig::default(),
        };
        tracing::debug!(
            "Loaded config from {} (repo config: {})",
            user_path.display(),
            local_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(Self {
            user_path,
            local_path,
            user: Mutex::new(user),
            local: Mutex::new(local),
            store,
            env,
            token: Mutex::new(None),
        })
    }

    pub fn user_path(&self) -> &Path {
        &self.user_path
    }

    /// True when a repository-local file is in effect.
    pub fn in_git_repo(&self) -> bool {
        self.local_path.is_some()
    }

    pub fn token_store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    /// The active organization, or an empty string when none is selected.
    pub fn organization_slug(&self) -> String {
        if let Some(org) = &self.env.organization {
            return org.clone();
        }
        if let Some(org) = lock(&self.local).selected_org.clone().filter(|o| !o.is_empty()) {
            return org;
        }
        lock(&self.user).selected_org.clone()
    }

    /// The API token for the active organization.
    ///
    /// The environment wins; otherwise the backend is asked once per
    /// organization and the result is cached until the selection or the
    /// stored token changes.
    pub fn api_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.env.api_token {
            return Ok(Some(token.clone()));
        }
        let org = self.organization_slug();
        if org.is_empty() {
            return Ok(None);
        }
        let mut cached = lock(&self.token);
        if let Some((cached_org, token)) = cached.as_ref() {
            if *cached_org == org {
                return Ok(token.clone());
            }
        }
        let token = self.store.get(&org)?;
        *cached = Some((org, token.clone()));
        Ok(token)
    }

    /// Organizations listed in the user file, sorted.
    pub fn configured_organizations(&self) -> Vec<String> {
        lock(&self.user).organizations.keys().cloned().collect()
    }

    pub fn has_configured_organization(&self, slug: &str) -> bool {
        lock(&self.user).organizations.contains_key(slug)
    }

    /// Selects an organization, in the repository file when `in_git_repo`
    /// and one is available, else in the user file.
    pub fn select_organization(&self, slug: &str, in_git_repo: bool) -> Result<()> {
        match (&self.local_path, in_git_repo) {
            (Some(path), true) => {
                let mut local = lock(&self.local);
                local.selected_org = Some(slug.to_string());
                write_yaml(path, &*local)
            }
            _ => {
                let mut user = lock(&self.user);
                user.selected_org = slug.to_string();
                user.organizations.entry(slug.to_string()).or_default();
                write_yaml(&self.user_path, &*user)
            }
        }
    }

    /// Stores a token and records the organization in the user file.
    ///
    /// With the keychain active, any plaintext copy in the file is removed
    /// so a token never lives in both places.
    pub fn set_token_for_org(&self, slug: &str, token: &str) -> Result<()> {
        {
            let mut user = lock(&self.user);
            user.organizations.entry(slug.to_string()).or_default();
            write_yaml(&self.user_path, &*user)?;
        }

        self.store.set(slug, token)?;
        lock(&self.token).take();

        let mut user = lock(&self.user);
        *user = read_yaml(&self.user_path)?;
        if self.store.kind() == StorageKind::Keychain {
            if let Some(entry) = user.organizations.get_mut(slug) {
                if entry.api_token.take().is_some() {
                    write_yaml(&self.user_path, &*user)?;
                }
            }
        }
        Ok(())
    }

    /// Pipelines to offer first for the active organization.
    pub fn preferred_pipelines(&self) -> Vec<String> {
        let org = self.organization_slug();
        let local = lock(&self.local);

        let mut pipelines: Vec<String> = Vec::new();
        if let Some(default) = local.default_pipeline.as_ref().filter(|p| !p.is_empty()) {
            pipelines.push(default.clone());
        }
        if let Some(entry) = local.organizations.get(&org) {
            for name in &entry.pipelines {
                if !pipelines.contains(name) {
                    pipelines.push(name.clone());
                }
            }
        }
        if pipelines.is_empty() {
            if let Some(names) = lock(&self.user).preferred_pipelines.get(&org) {
                pipelines.extend(names.iter().cloned());
            }
        }
        pipelines
    }

    /// Replaces the cached pipeline list in the repository file.
    ///
    /// Does nothing outside a git repository.
    pub fn set_preferred_pipelines(&self, pipelines: &[String]) -> Result<()> {
        let Some(path) = &self.local_path else {
            return Ok(());
        };
        let org = self.organization_slug();
        let mut local = lock(&self.local);
        local.organizations.entry(org).or_default().pipelines = pipelines.to_vec();
        write_yaml(path, &*local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryTokenStore;
    use crate::auth::FileTokenStore;

    fn config_in(dir: &tempfile::TempDir, local: bool, kind: StorageKind, env: EnvOverrides) -> Config {
        let user_path = dir.path().join("config").join(USER_CONFIG_FILE);
        let local_path = local.then(|| dir.path().join(LOCAL_CONFIG_FILE));
        let store: Box<dyn TokenStore> = match kind {
            StorageKind::File => Box::new(FileTokenStore::new(user_path.clone())),
            StorageKind::Keychain => Box::new(MemoryTokenStore::new(StorageKind::Keychain)),
        };
        Config::from_parts(user_path, local_path, store, env).unwrap()
    }

    #[test]
    fn test_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, false, StorageKind::File, EnvOverrides::default());
        assert_eq!(config.organization_slug(), "");
        assert!(!config.has_configured_organization("acme"));
        assert!(!config.has_configured_organization(""));
        assert_eq!(config.api_token().unwrap(), None);
    }

    #[test]
    fn test_env_overrides_files() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvOverrides {
            api_token: Some("env-token".into()),
            organization: Some("env-org".into()),
        };
        let config = config_in(&dir, false, StorageKind::File, env);
        config.set_token_for_org("acme", "file-token").unwrap();
        config.select_organization("acme", false).unwrap();

        assert_eq!(config.organization_slug(), "env-org");
        assert_eq!(config.api_token().unwrap().as_deref(), Some("env-token"));
    }

    #[test]
    fn test_file_token_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, false, StorageKind::File, EnvOverrides::default());
        config.set_token_for_org("acme", "t1").unwrap();
        config.select_organization("acme", false).unwrap();

        assert_eq!(config.configured_organizations(), vec!["acme"]);
        assert_eq!(config.api_token().unwrap().as_deref(), Some("t1"));
        let on_disk: UserConfig = read_yaml(config.user_path()).unwrap();
        assert_eq!(on_disk.selected_org, "acme");
        assert_eq!(on_disk.organizations["acme"].api_token.as_deref(), Some("t1"));
    }

    #[test]
    fn test_token_follows_organization_switch() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, false, StorageKind::File, EnvOverrides::default());
        config.set_token_for_org("acme", "t-acme").unwrap();
        config.set_token_for_org("globex", "t-globex").unwrap();

        config.select_organization("acme", false).unwrap();
        assert_eq!(config.api_token().unwrap().as_deref(), Some("t-acme"));

        config.select_organization("globex", false).unwrap();
        assert_eq!(config.api_token().unwrap().as_deref(), Some("t-globex"));

        config.set_token_for_org("globex", "t-rotated").unwrap();
        assert_eq!(config.api_token().unwrap().as_deref(), Some("t-rotated"));
    }

    #[test]
    fn test_keychain_token_is_never_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let user_path = dir.path().join("config").join(USER_CONFIG_FILE);
        write_yaml(
            &user_path,
            &serde_yaml::from_str::<UserConfig>("organizations:\n  acme:\n    api_token: old\n").unwrap(),
        )
        .unwrap();

        let config = config_in(&dir, false, StorageKind::Keychain, EnvOverrides::default());
        config.set_token_for_org("acme", "new").unwrap();

        let on_disk: UserConfig = read_yaml(&user_path).unwrap();
        assert!(on_disk.organizations.contains_key("acme"));
        assert_eq!(on_disk.organizations["acme"].api_token, None);
        assert_eq!(config.token_store().get("acme").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_select_in_repo_writes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, true, StorageKind::File, EnvOverrides::default());
        config.select_organization("widgets", true).unwrap();

        assert_eq!(config.organization_slug(), "widgets");
        let local: LocalConfig = read_yaml(&dir.path().join(LOCAL_CONFIG_FILE)).unwrap();
        assert_eq!(local.selected_org.as_deref(), Some("widgets"));
    }

    #[test]
    fn test_preferred_pipelines_put_default_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LOCAL_CONFIG_FILE),
            "selected_org: acme\ndefault_pipeline: deploy\norganizations:\n  acme:\n    pipelines: [web, deploy, api]\n",
        )
        .unwrap();
        let config = config_in(&dir, true, StorageKind::File, EnvOverrides::default());
        assert_eq!(config.preferred_pipelines(), vec!["deploy", "web", "api"]);
    }

    #[test]
    fn test_set_preferred_pipelines_only_in_repo() {
        let dir = tempfile::tempdir().unwrap();
        let outside = config_in(&dir, false, StorageKind::File, EnvOverrides::default());
        outside.set_preferred_pipelines(&["web".to_string()]).unwrap();
        assert!(!dir.path().join(LOCAL_CONFIG_FILE).exists());

        let inside = config_in(&dir, true, StorageKind::File, EnvOverrides::default());
        inside.select_organization("acme", true).unwrap();
        inside
            .set_preferred_pipelines(&["api".to_string(), "web".to_string()])
            .unwrap();
        assert_eq!(inside.preferred_pipelines(), vec!["api", "web"]);
    }

    #[test]
    fn test_invalid_local_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCAL_CONFIG_FILE), "organizations: [unclosed").unwrap();
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let result = Config::from_parts(
            user_path.clone(),
            Some(dir.path().join(LOCAL_CONFIG_FILE)),
            Box::new(FileTokenStore::new(user_path)),
            EnvOverrides::default(),
        );
        assert!(format!("{:#}", result.err().unwrap()).contains(".bk.yaml"));
    }
}
