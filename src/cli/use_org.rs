//
//  buildkite-cli
//  cli/use_org.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Organization selection

use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;

use crate::error::CliError;
use crate::interactive::select_with_default;
use crate::output::TableRow;

use super::Factory;

/// Select the active organization
///
/// Inside a git repository the choice is stored in the repository's
/// `.bk.yaml`; elsewhere it goes to the user config.
#[derive(Args, Debug)]
pub struct UseCommand {
    /// Organization slug; omit to choose from the configured ones
    pub org: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrganizationItem {
    slug: String,
    selected: bool,
}

impl TableRow for OrganizationItem {
    fn headers() -> Vec<&'static str> {
        vec!["ORGANIZATION", "SELECTED"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let marker = match (self.selected, color) {
            (true, true) => style("✓").green().to_string(),
            (true, false) => "✓".to_string(),
            (false, _) => String::new(),
        };
        vec![self.slug.clone(), marker]
    }
}

impl UseCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        let config = f.config();
        let orgs = config.configured_organizations();
        let current = config.organization_slug();

        let chosen = match self.org.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(org) => {
                if !config.has_configured_organization(org) {
                    return Err(CliError::configuration(format!("Organization {org} is not configured"))
                        .with_suggestions([format!("Run `bk configure add --org {org}` first")])
                        .into());
                }
                org.to_string()
            }
            None => {
                if orgs.is_empty() {
                    return Err(CliError::configuration("No organizations are configured")
                        .with_suggestions(["Run `bk configure` to add one"])
                        .into());
                }
                if !f.is_interactive() {
                    let items: Vec<OrganizationItem> = orgs
                        .iter()
                        .map(|slug| OrganizationItem {
                            selected: *slug == current,
                            slug: slug.clone(),
                        })
                        .collect();
                    return f.output().write_list(&items, "organizations");
                }

                let default = orgs.iter().position(|o| *o == current).unwrap_or(0);
                match select_with_default("Select an organization", &orgs, default)? {
                    Some(index) => orgs[index].clone(),
                    None => return Err(CliError::user_aborted("No organization selected").into()),
                }
            }
        };

        config.select_organization(&chosen, config.in_git_repo())?;
        tracing::debug!("Selected organization {}", chosen);
        f.output().write_success(&format!("Switched to organization {chosen}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FileTokenStore;
    use crate::cli::GlobalOptions;
    use crate::config::{Config, EnvOverrides, USER_CONFIG_FILE};
    use crate::error::ErrorCategory;

    fn factory(dir: &tempfile::TempDir) -> Factory {
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let store = Box::new(FileTokenStore::new(user_path.clone()));
        let config = Config::from_parts(user_path, None, store, EnvOverrides::default()).unwrap();
        config.set_token_for_org("acme", "t1").unwrap();
        config.set_token_for_org("globex", "t2").unwrap();
        let global = GlobalOptions {
            no_input: true,
            quiet: true,
            ..Default::default()
        };
        Factory::with_config(global, config, None)
    }

    #[tokio::test]
    async fn test_use_selects_configured_org() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(&dir);
        UseCommand {
            org: Some("globex".into()),
        }
        .run(&f)
        .await
        .unwrap();
        assert_eq!(f.config().organization_slug(), "globex");
    }

    #[tokio::test]
    async fn test_use_unknown_org_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(&dir);
        let err = UseCommand {
            org: Some("initech".into()),
        }
        .run(&f)
        .await
        .unwrap_err()
        .downcast::<CliError>()
        .unwrap();
        assert_eq!(err.category, ErrorCategory::Configuration);
        assert_eq!(f.config().organization_slug(), "");
    }

    #[test]
    fn test_selected_marker() {
        let item = OrganizationItem {
            slug: "acme".into(),
            selected: true,
        };
        assert_eq!(item.cells(false), vec!["acme", "✓"]);
    }
}
