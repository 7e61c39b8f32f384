//
//  buildkite-cli
//  config/file.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Configuration File I/O Module
//!
//! On-disk shapes of the two YAML configuration files and the functions
//! that locate, read and write them.
//!
//! ## Files
//!
//! | File | Location | Contents |
//! |------|----------|----------|
//! | `bk.yaml` | user config directory | selected organization, per-org tokens, preferred pipelines |
//! | `.bk.yaml` | repository root | selected organization, cached pipelines, default pipeline |
//!
//! ## Location Precedence
//!
//! 1. `$XDG_CONFIG_HOME`
//! 2. The roaming application-data directory (Windows only)
//! 3. `$HOME/.config`
//!
//! ## Notes
//!
//! - A missing file reads as the default (empty) configuration
//! - Invalid YAML is an error that names the offending file
//! - Write operations create parent directories

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// File name of the user configuration.
pub const USER_CONFIG_FILE: &str = "bk.yaml";

/// File name of the repository-local configuration.
pub const LOCAL_CONFIG_FILE: &str = ".bk.yaml";

/// Per-organization entry in the user file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

/// The user configuration file.
///
/// ```yaml
/// selected_org: acme
/// organizations:
///   acme:
///     api_token: bkua_xxx
///   widgets: {}
/// preferred_pipelines:
///   acme: [web, api]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selected_org: String,
    #[serde(default)]
    pub organizations: BTreeMap<String, OrganizationEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preferred_pipelines: BTreeMap<String, Vec<String>>,
}

/// Per-organization entry in the repository file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalOrganization {
    #[serde(default)]
    pub pipelines: Vec<String>,
}

/// The repository-local configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pipeline: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub organizations: BTreeMap<String, LocalOrganization>,
}

/// Returns the path of the user configuration file.
pub fn user_config_path() -> Result<PathBuf> {
    let dir = resolve_config_dir(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
        BaseDirs::new(),
    )
    .context("Could not determine config directory; set XDG_CONFIG_HOME or HOME")?;
    Ok(dir.join(USER_CONFIG_FILE))
}

fn resolve_config_dir(
    xdg: Option<OsString>,
    home: Option<OsString>,
    base: Option<BaseDirs>,
) -> Option<PathBuf> {
    if let Some(xdg) = xdg.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg));
    }
    if cfg!(windows) {
        if let Some(base) = &base {
            return Some(base.config_dir().to_path_buf());
        }
    }
    home.filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| base.map(|b| b.home_dir().to_path_buf()))
        .map(|home| home.join(".config"))
}

/// Reads a YAML file, returning the default value when it does not exist.
pub fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
}

/// Writes a value as YAML, creating parent directories.
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_yaml::to_string(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xdg_wins() {
        let dir = resolve_config_dir(Some("/xdg".into()), Some("/home/u".into()), None);
        assert_eq!(dir, Some(PathBuf::from("/xdg")));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_home_fallback() {
        let dir = resolve_config_dir(Some("".into()), Some("/home/u".into()), None);
        assert_eq!(dir, Some(PathBuf::from("/home/u/.config")));
    }

    #[test]
    fn test_missing_and_empty_files_read_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing: UserConfig = read_yaml(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(missing, UserConfig::default());

        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "").unwrap();
        let empty: UserConfig = read_yaml(&empty).unwrap();
        assert!(empty.organizations.is_empty());
    }

    #[test]
    fn test_invalid_yaml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bk.yaml");
        std::fs::write(&path, "organizations: [unclosed").unwrap();
        let err = read_yaml::<UserConfig>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bk.yaml"));
        assert!(err.chain().any(|c| c.downcast_ref::<serde_yaml::Error>().is_some()));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bk.yaml");
        let mut config = UserConfig {
            selected_org: "acme".into(),
            ..Default::default()
        };
        config.organizations.insert(
            "acme".into(),
            OrganizationEntry {
                api_token: Some("t1".into()),
            },
        );
        config.organizations.insert("widgets".into(), OrganizationEntry::default());
        write_yaml(&path, &config).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("api_token: t1"));
        assert_eq!(read_yaml::<UserConfig>(&path).unwrap(), config);
    }
}
