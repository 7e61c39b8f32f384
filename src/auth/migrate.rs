//
//  buildkite-cli
//  auth/migrate.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! One-way token migration from the config file to the keychain.

use anyhow::Result;

use super::{StorageKind, TokenStore};
use crate::error::CliError;

/// Copies every file token into the keychain.
///
/// # Parameters
///
/// * `file` - The file backend to read from
/// * `keychain` - The active backend; must be the keychain
/// * `remove_from_file` - Clear each file entry once it is in the keychain
///
/// # Returns
///
/// The number of tokens newly written to the keychain. A token already in
/// the keychain with the same value is not counted, so a second run
/// reports zero.
///
/// # Errors
///
/// Fails with a configuration error when `keychain` is not a keychain
/// backend, and with the backend's error when a read or write fails.
pub fn migrate_to_keychain(
    file: &dyn TokenStore,
    keychain: &dyn TokenStore,
    remove_from_file: bool,
) -> Result<usize> {
    if keychain.kind() != StorageKind::Keychain {
        return Err(CliError::configuration("Keychain token storage is not active")
            .with_suggestions(["Unset BUILDKITE_TOKEN_STORAGE or set it to keychain"])
            .into());
    }

    let mut migrated = 0;
    for org in file.list()? {
        let Some(token) = file.get(&org)?.filter(|t| !t.is_empty()) else {
            continue;
        };

        if keychain.get(&org)?.as_deref() == Some(token.as_str()) {
            tracing::debug!("Token for {} already in keychain", org);
        } else {
            keychain.set(&org, &token)?;
            migrated += 1;
            tracing::info!("Migrated token for {} to keychain", org);
        }

        if remove_from_file {
            file.delete(&org)?;
        }
    }
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryTokenStore;
    use crate::auth::FileTokenStore;
    use crate::error::ErrorCategory;

    fn seeded_file(dir: &tempfile::TempDir) -> FileTokenStore {
        let path = dir.path().join("bk.yaml");
        std::fs::write(
            &path,
            "organizations:\n  x:\n    api_token: t1\n  y:\n    api_token: t2\n  z: {}\n",
        )
        .unwrap();
        FileTokenStore::new(path)
    }

    #[test]
    fn test_migration_with_removal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = seeded_file(&dir);
        let keychain = MemoryTokenStore::new(StorageKind::Keychain);

        assert_eq!(migrate_to_keychain(&file, &keychain, true).unwrap(), 2);
        assert_eq!(keychain.get("x").unwrap().as_deref(), Some("t1"));
        assert_eq!(keychain.get("y").unwrap().as_deref(), Some("t2"));
        assert_eq!(file.get("x").unwrap(), None);
        assert_eq!(file.get("y").unwrap(), None);
        assert_eq!(file.organizations().unwrap(), vec!["x", "y", "z"]);

        assert_eq!(migrate_to_keychain(&file, &keychain, true).unwrap(), 0);
    }

    #[test]
    fn test_migration_without_removal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = seeded_file(&dir);
        let keychain = MemoryTokenStore::new(StorageKind::Keychain);

        assert_eq!(migrate_to_keychain(&file, &keychain, false).unwrap(), 2);
        assert_eq!(file.get("x").unwrap().as_deref(), Some("t1"));
        assert_eq!(migrate_to_keychain(&file, &keychain, false).unwrap(), 0);
    }

    #[test]
    fn test_migration_requires_keychain() {
        let dir = tempfile::tempdir().unwrap();
        let file = seeded_file(&dir);
        let other = MemoryTokenStore::new(StorageKind::File);

        let err = migrate_to_keychain(&file, &other, false).unwrap_err();
        let cli = err.downcast_ref::<CliError>().unwrap();
        assert_eq!(cli.category, ErrorCategory::Configuration);
    }
}
