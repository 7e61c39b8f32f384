//
//  buildkite-cli
//  cli/configure.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Token setup commands
//!
//! `bk configure` stores an API token for an organization and selects it.
//! `bk configure add` adds another organization without the overwrite
//! check, and `bk configure migrate` moves plaintext tokens from the config
//! file into the OS keychain.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::auth::{migrate_to_keychain, FileTokenStore};
use crate::error::CliError;
use crate::interactive::{prompt_input, prompt_password};
use crate::output::{print_field, TableOutput};

use super::Factory;

/// Add an API token for an organization
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct ConfigureCommand {
    #[command(subcommand)]
    pub command: Option<ConfigureSubcommand>,

    #[command(flatten)]
    pub args: AddArgs,
}

#[derive(Subcommand, Debug)]
pub enum ConfigureSubcommand {
    /// Add a token for another organization
    Add(AddArgs),

    /// Move tokens from the config file into the OS keychain
    Migrate(MigrateArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddArgs {
    /// Replace a token that is already configured
    #[arg(long)]
    pub force: bool,

    /// Organization slug
    #[arg(long)]
    pub org: Option<String>,

    /// API access token
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MigrateArgs {
    /// Remove each token from the config file once it is in the keychain
    #[arg(long)]
    pub remove_from_file: bool,
}

// Display types

#[derive(Debug, Serialize)]
struct Configured {
    organization: String,
    storage: &'static str,
    scopes: Vec<String>,
}

impl TableOutput for Configured {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        print_field(out, "Organization", &self.organization, color)?;
        print_field(out, "Token storage", self.storage, color)?;
        print_field(out, "Scopes", &self.scopes.join(", "), color)
    }
}

#[derive(Debug, Serialize)]
struct Migrated {
    migrated: usize,
    removed_from_file: bool,
}

impl TableOutput for Migrated {
    fn print_table(&self, out: &mut dyn Write, _color: bool) -> std::io::Result<()> {
        let plural = if self.migrated == 1 { "" } else { "s" };
        writeln!(out, "Migrated {} token{} to the keychain", self.migrated, plural)
    }
}

impl ConfigureCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            None => self.add(&self.args, f, true).await,
            Some(ConfigureSubcommand::Add(args)) => self.add(args, f, false).await,
            Some(ConfigureSubcommand::Migrate(args)) => self.migrate(args, f),
        }
    }

    /// Stores and selects a token; with `guard`, an existing token is only
    /// replaced under `--force`.
    async fn add(&self, args: &AddArgs, f: &Factory, guard: bool) -> Result<()> {
        let config = f.config();
        let interactive = f.is_interactive();

        let org = match args.org.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(org) => org.to_string(),
            None if interactive => prompt_input("Organization slug")?,
            None => {
                return Err(CliError::validation("An organization slug is required")
                    .with_suggestions(["Pass --org <slug>"])
                    .into())
            }
        };

        if guard && !args.force && config.token_store().get(&org)?.is_some() {
            return Err(CliError::validation(format!("Organization {org} is already configured"))
                .with_suggestions([
                    "Pass --force to replace its token",
                    "Run `bk use` to switch organizations",
                ])
                .into());
        }

        let token = match args.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None if interactive => prompt_password("API token")?,
            None => {
                return Err(CliError::validation("An API token is required")
                    .with_suggestions([
                        "Pass --token <token>",
                        "Create one at https://buildkite.com/user/api-access-tokens",
                    ])
                    .into())
            }
        };

        let client = f.client_for_token(token.clone())?;
        let info = f.spin("Checking token", client.access_token()).await?;
        tracing::debug!("Token {} has {} scope(s)", info.uuid, info.scopes.len());

        config.set_token_for_org(&org, &token)?;
        config.select_organization(&org, config.in_git_repo())?;

        let output = f.output();
        output.write_success(&format!("Configured organization {org}"));
        output.write(&Configured {
            organization: org,
            storage: config.token_store().kind().as_str(),
            scopes: info.scopes.clone(),
        })
    }

    fn migrate(&self, args: &MigrateArgs, f: &Factory) -> Result<()> {
        let config = f.config();
        let file = FileTokenStore::new(config.user_path().to_path_buf());
        let migrated = migrate_to_keychain(&file, config.token_store(), args.remove_from_file)?;

        f.output().write(&Migrated {
            migrated,
            removed_from_file: args.remove_from_file,
        })
    }
}
