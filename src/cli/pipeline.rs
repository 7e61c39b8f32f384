//
//  buildkite-cli
//  cli/pipeline.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Pipeline commands

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;

use crate::api::pipelines::CreatePipeline;
use crate::api::Pipeline;
use crate::error::CliError;
use crate::interactive::prompt_input;
use crate::output::{print_field, print_header, TableOutput};
use crate::util::{format_time, open_browser};

use super::Factory;

/// Steps used when a new pipeline is created without `--config`.
const DEFAULT_CONFIGURATION: &str = "steps:\n  - command: \"buildkite-agent pipeline upload\"\n";

/// Files `pipeline validate` looks for, in order.
const PIPELINE_FILES: [&str; 4] = [
    ".buildkite/pipeline.yml",
    ".buildkite/pipeline.yaml",
    "buildkite.yml",
    "buildkite.yaml",
];

/// Manage pipelines
#[derive(Args, Debug)]
pub struct PipelineCommand {
    #[command(subcommand)]
    pub command: PipelineSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum PipelineSubcommand {
    /// Create a pipeline
    Create(CreateArgs),

    /// View a pipeline
    View(ViewArgs),

    /// Check a pipeline file's structure
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Pipeline name
    pub name: Option<String>,

    /// Repository URL (defaults to the git origin)
    #[arg(long, short = 'r')]
    pub repository: Option<String>,

    /// Description
    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Cluster ID to run the pipeline's jobs in
    #[arg(long)]
    pub cluster: Option<String>,

    /// Default branch
    #[arg(long)]
    pub default_branch: Option<String>,

    /// YAML steps file (defaults to uploading .buildkite/pipeline.yml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct ViewArgs {
    /// Pipeline as NAME, ORG/NAME, or URL
    pub pipeline: Option<String>,

    /// Open in browser
    #[arg(long, short = 'w')]
    pub web: bool,
}

#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    /// Pipeline file (defaults to .buildkite/pipeline.yml and friends)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

// Display types

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct PipelineDetail(Pipeline);

impl TableOutput for PipelineDetail {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let pipeline = &self.0;
        print_header(out, &pipeline.name, color)?;
        print_field(out, "Slug", &pipeline.slug, color)?;
        if let Some(description) = pipeline.description.as_deref().filter(|d| !d.is_empty()) {
            print_field(out, "Description", description, color)?;
        }
        if let Some(repository) = &pipeline.repository {
            print_field(out, "Repository", repository, color)?;
        }
        if let Some(branch) = &pipeline.default_branch {
            print_field(out, "Default branch", branch, color)?;
        }
        if let Some(cluster) = &pipeline.cluster_id {
            print_field(out, "Cluster", cluster, color)?;
        }
        if let Some(running) = pipeline.running_builds_count {
            print_field(out, "Running builds", &running.to_string(), color)?;
        }
        if let Some(scheduled) = pipeline.scheduled_builds_count {
            print_field(out, "Scheduled builds", &scheduled.to_string(), color)?;
        }
        if let Some(created) = pipeline.created_at {
            print_field(out, "Created", &format_time(created), color)?;
        }
        print_field(out, "URL", &pipeline.web_url, color)?;

        if let Some(configuration) = pipeline.configuration.as_deref().filter(|c| !c.is_empty()) {
            writeln!(out)?;
            writeln!(out, "Steps:")?;
            for line in configuration.lines() {
                writeln!(out, "  {}", line)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Validation {
    file: PathBuf,
    valid: bool,
    steps: usize,
}

impl TableOutput for Validation {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let mark = if color { style("✓").green().to_string() } else { "✓".to_string() };
        writeln!(out, "{} {} is valid ({} step(s))", mark, self.file.display(), self.steps)
    }
}

impl PipelineCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            PipelineSubcommand::Create(args) => self.create(args, f).await,
            PipelineSubcommand::View(args) => self.view(args, f).await,
            PipelineSubcommand::Validate(args) => self.validate(args, f),
        }
    }

    /// Create a pipeline
    async fn create(&self, args: &CreateArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;

        let name = match args.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None if f.is_interactive() => prompt_input("Pipeline name")?,
            None => {
                return Err(CliError::validation("A pipeline name is required")
                    .with_suggestions(["Pass the name: bk pipeline create <name>"])
                    .into())
            }
        };

        let repository = match args.repository.clone().or_else(|| f.origin_urls().first().cloned()) {
            Some(repository) => repository,
            None => {
                return Err(CliError::validation("A repository URL is required")
                    .with_suggestions(["Pass --repository <url>, or run inside a git repository with an origin"])
                    .into())
            }
        };

        let configuration = match &args.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                validate_pipeline_yaml(&content)?;
                content
            }
            None => DEFAULT_CONFIGURATION.to_string(),
        };

        let request = CreatePipeline {
            name: name.clone(),
            repository,
            configuration,
            description: args.description.clone(),
            cluster_id: args.cluster.clone(),
            default_branch: args.default_branch.clone(),
        };

        let client = f.client()?;
        let pipeline = f
            .spin("Creating pipeline", client.create_pipeline(&org, &request))
            .await?;
        tracing::debug!("Created pipeline {}/{}", org, pipeline.slug);

        let output = f.output();
        output.write_success(&format!("Created pipeline {}/{}", org, pipeline.slug));
        output.write(&PipelineDetail(pipeline))
    }

    /// View a pipeline
    async fn view(&self, args: &ViewArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let positional: Vec<String> = args.pipeline.iter().cloned().collect();
        let resolved = f.resolve_pipeline(&client, None, &positional).await?;

        if args.web {
            let url = format!("https://buildkite.com/{}/{}", resolved.org, resolved.name);
            println!("{} Opening pipeline {} in browser...", style("→").cyan(), resolved);
            return open_browser(&url);
        }

        let pipeline = f
            .spin("Loading pipeline", client.get_pipeline(&resolved.org, &resolved.name))
            .await?;
        f.output().write(&PipelineDetail(pipeline))
    }

    /// Check that a pipeline file has a top-level list of steps
    fn validate(&self, args: &ValidateArgs, f: &Factory) -> Result<()> {
        let file = match &args.file {
            Some(file) => file.clone(),
            None => find_pipeline_file(Path::new("."))?,
        };
        let content =
            std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
        let steps = validate_pipeline_yaml(&content)
            .map_err(|e| e.context(format!("{} is not a valid pipeline", file.display())))?;

        f.output().write(&Validation {
            file,
            valid: true,
            steps,
        })
    }
}

/// The first conventional pipeline file under `dir`.
fn find_pipeline_file(dir: &Path) -> Result<PathBuf> {
    PIPELINE_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            CliError::validation("No pipeline file found")
                .with_suggestions([format!("Pass --file, or create one of: {}", PIPELINE_FILES.join(", "))])
                .into()
        })
}

/// Parses pipeline YAML and returns its step count.
///
/// The document must be a mapping with a `steps` sequence. A bare
/// sequence of steps is accepted too, as the agent's upload does.
pub fn validate_pipeline_yaml(content: &str) -> Result<usize> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| CliError::validation(format!("Invalid YAML: {e}")))?;

    let steps = match &document {
        serde_yaml::Value::Sequence(steps) => steps,
        serde_yaml::Value::Mapping(map) => match map.get("steps") {
            Some(serde_yaml::Value::Sequence(steps)) => steps,
            Some(_) => return Err(CliError::validation("`steps` must be a list").into()),
            None => return Err(CliError::validation("Missing top-level `steps`").into()),
        },
        _ => return Err(CliError::validation("Pipeline must be a mapping with `steps`").into()),
    };

    if steps.is_empty() {
        return Err(CliError::validation("`steps` is empty").into());
    }
    Ok(steps.len())
}
