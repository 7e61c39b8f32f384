//
//  buildkite-cli
//  cli/package.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Package registry commands

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::api::packages::Package;
use crate::error::CliError;
use crate::output::{print_field, print_header, TableOutput};
use crate::util::format_size;

use super::Factory;

/// Push packages to Buildkite Package Registries
#[derive(Args, Debug)]
pub struct PackageCommand {
    #[command(subcommand)]
    pub command: PackageSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum PackageSubcommand {
    /// Upload a package file to a registry
    Push(PushArgs),
}

#[derive(Args, Debug, Default)]
pub struct PushArgs {
    /// Registry slug
    pub registry: String,

    /// Package file, or - to read from stdin
    pub file: String,

    /// File name to upload stdin as
    #[arg(long, value_name = "NAME")]
    pub stdin_file_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct PushedPackage {
    registry: String,
    file_name: String,
    size: u64,
    #[serde(flatten)]
    package: Package,
}

impl TableOutput for PushedPackage {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let title = self.package.name.as_deref().unwrap_or(&self.file_name);
        print_header(out, title, color)?;
        print_field(out, "ID", &self.package.id, color)?;
        print_field(out, "Registry", &self.registry, color)?;
        print_field(out, "Size", &format_size(self.size), color)?;
        if let Some(url) = &self.package.web_url {
            print_field(out, "URL", url, color)?;
        }
        Ok(())
    }
}

impl PackageCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            PackageSubcommand::Push(args) => self.push(args, f).await,
        }
    }

    async fn push(&self, args: &PushArgs, f: &Factory) -> Result<()> {
        let (file_name, contents) = read_package(args)?;
        let org = f.organization()?;
        let client = f.client()?;

        let size = contents.len() as u64;
        tracing::debug!("Pushing {} ({} bytes) to {}", file_name, size, args.registry);
        let package = f
            .spin(
                &format!("Pushing {file_name}"),
                client.push_package(&org, &args.registry, &file_name, contents),
            )
            .await?;

        f.output().write(&PushedPackage {
            registry: args.registry.clone(),
            file_name,
            size,
            package,
        })
    }
}

/// Returns the upload file name and contents.
fn read_package(args: &PushArgs) -> Result<(String, Vec<u8>)> {
    if args.file == "-" {
        let name = args
            .stdin_file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                CliError::validation("--stdin-file-name is required when reading from stdin")
                    .with_suggestions(["bk package push my-registry - --stdin-file-name pkg.tgz"])
            })?;
        let mut contents = Vec::new();
        std::io::stdin()
            .read_to_end(&mut contents)
            .context("Failed to read package from stdin")?;
        return Ok((name.to_string(), contents));
    }

    if args.stdin_file_name.is_some() {
        return Err(CliError::validation("--stdin-file-name only applies when the file is -").into());
    }

    let path = Path::new(&args.file);
    if !path.is_file() {
        return Err(CliError::validation(format!("{} is not a file", args.file)).into());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::validation(format!("{} has no file name", args.file)))?;
    let contents = std::fs::read(path).with_context(|| format!("Failed to read {}", args.file))?;
    Ok((name, contents))
}
