//
//  buildkite-cli
//  cli/build.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Build commands
//!
//! Creates, inspects, lists, watches, cancels and rebuilds builds, and
//! downloads a build's artifacts and job logs.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;

use crate::api::{Annotation, Artifact, Build, BuildkiteClient, BuildsListOptions, CreateBuild};
use crate::error::CliError;
use crate::fetch::{fetch_paged, BuildFilter, BuildPages, DurationFilter, FetchOptions};
use crate::output::{format_status, print_field, print_header, truncate, TableBuilder, TableOutput, TableRow};
use crate::util::{
    format_elapsed, format_relative_time, format_size, open_browser, parse_env_file, parse_key_values,
    strip_html,
};
use crate::workers::{join3, run_bounded, DEFAULT_DOWNLOAD_PARALLELISM};

use super::artifacts::{download_artifacts, finish_download, safe_join, select_artifacts, DownloadRow};
use super::{BuildTarget, Factory};

/// Manage builds
#[derive(Args, Debug)]
pub struct BuildCommand {
    #[command(subcommand)]
    pub command: BuildSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum BuildSubcommand {
    /// Create a new build
    #[command(visible_alias = "create")]
    New(NewArgs),

    /// View a build
    View(ViewArgs),

    /// List builds
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Follow a build until it finishes
    Watch(WatchArgs),

    /// Cancel a build
    Cancel(CancelArgs),

    /// Rebuild a build
    Rebuild(RebuildArgs),

    /// Download a build's artifacts and logs
    Download(DownloadArgs),
}

#[derive(Args, Debug, Default)]
pub struct NewArgs {
    /// Pipeline as NAME, ORG/NAME, or URL
    pub pipeline: Option<String>,

    /// Branch to build (defaults to the pipeline's default branch)
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Commit to build
    #[arg(long, short = 'c', default_value = "HEAD")]
    pub commit: String,

    /// Build message
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(long = "env", short = 'e', value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// File of KEY=VALUE lines to add to the environment
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Meta-data as KEY=VALUE (repeatable)
    #[arg(long = "metadata", short = 'M', value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,

    /// Build even when the branch is filtered out by the pipeline
    #[arg(long)]
    pub ignore_branch_filters: bool,

    /// Open the new build in the browser
    #[arg(long, short = 'w')]
    pub web: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct ViewArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Open in browser
    #[arg(long, short = 'w')]
    pub web: bool,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Pipeline as NAME, ORG/NAME, or URL (defaults to every pipeline)
    #[arg(long, short = 'p')]
    pub pipeline: Option<String>,

    /// Only builds created within this long ago, e.g. 24h
    #[arg(long)]
    pub since: Option<String>,

    /// Only builds created before this long ago, e.g. 1h
    #[arg(long)]
    pub until: Option<String>,

    /// Filter by run time, e.g. ">10m" or "<30s"
    #[arg(long)]
    pub duration: Option<String>,

    /// Filter by state (repeatable)
    #[arg(long, short = 's')]
    pub state: Vec<String>,

    /// Filter by branch (repeatable)
    #[arg(long, short = 'b')]
    pub branch: Vec<String>,

    /// Filter by creator user ID
    #[arg(long)]
    pub creator: Option<String>,

    /// Filter by commit SHA
    #[arg(long)]
    pub commit: Option<String>,

    /// Only builds whose message contains this text
    #[arg(long)]
    pub message: Option<String>,

    /// Filter by meta-data as KEY=VALUE (repeatable)
    #[arg(long = "meta-data", value_name = "KEY=VALUE")]
    pub meta_data: Vec<String>,

    /// Maximum builds to return
    #[arg(long, default_value = "50")]
    pub limit: usize,

    /// Return every matching build
    #[arg(long, conflicts_with = "limit")]
    pub no_limit: bool,
}

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Seconds between refreshes
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

#[derive(Args, Debug, Default)]
pub struct CancelArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct RebuildArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Open the new build in the browser
    #[arg(long, short = 'w')]
    pub web: bool,
}

#[derive(Args, Debug, Default)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Directory to download into (defaults to build-<number>)
    #[arg(long, short = 'd')]
    pub destination: Option<PathBuf>,

    /// Only artifacts of this job
    #[arg(long)]
    pub job: Option<String>,

    /// Only artifacts whose path matches this glob
    #[arg(long)]
    pub pattern: Option<String>,

    /// Also save each job's log under logs/
    #[arg(long)]
    pub logs: bool,

    /// Only save logs of failed jobs
    #[arg(long, requires = "logs")]
    pub failed_only: bool,

    /// Maximum downloads at once
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_PARALLELISM)]
    pub limit: usize,
}

// Display types

fn write_build_summary(out: &mut dyn Write, build: &Build, color: bool) -> std::io::Result<()> {
    let title = match build.headline() {
        "" => format!("Build #{}", build.number),
        headline => format!("Build #{}: {}", build.number, headline),
    };
    print_header(out, &title, color)?;
    if let Some(pipeline) = build.pipeline_slug() {
        print_field(out, "Pipeline", pipeline, color)?;
    }
    print_field(out, "State", &format_status(&build.state, color), color)?;
    print_field(out, "Branch", &build.branch, color)?;
    print_field(out, "Commit", &build.commit, color)?;
    if let Some(creator) = &build.creator {
        print_field(out, "Creator", &creator.name, color)?;
    }
    if let Some(created) = build.created_at {
        print_field(out, "Created", &format_relative_time(created, Utc::now()), color)?;
    }
    if build.started_at.is_some() {
        print_field(
            out,
            "Duration",
            &format_elapsed(build.started_at, build.finished_at, Utc::now()),
            color,
        )?;
    }
    print_field(out, "URL", &build.web_url, color)
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct BuildDetail(Build);

impl TableOutput for BuildDetail {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        write_build_summary(out, &self.0, color)
    }
}

#[derive(Debug, Serialize)]
struct BuildView {
    build: Build,
    artifacts: Vec<Artifact>,
    annotations: Vec<Annotation>,
}

impl TableOutput for BuildView {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        write_build_summary(out, &self.build, color)?;

        let jobs: Vec<_> = self.build.jobs.iter().filter(|j| j.job_type != "waiter").collect();
        if !jobs.is_empty() {
            writeln!(out)?;
            let now = Utc::now();
            TableBuilder::new()
                .color(color)
                .headers(["JOB", "STATE", "DURATION", "AGENT"])
                .rows(jobs.iter().map(|job| {
                    vec![
                        truncate(job.label(), 60),
                        format_status(job.state(), color),
                        format_elapsed(job.started_at, job.finished_at, now),
                        job.agent.as_ref().map(|a| a.name.clone()).unwrap_or_else(|| "-".into()),
                    ]
                }))
                .write_to(out)?;
        }

        if !self.artifacts.is_empty() {
            writeln!(out)?;
            writeln!(out, "Artifacts:")?;
            for artifact in &self.artifacts {
                writeln!(out, "  {} ({})", artifact.path, format_size(artifact.file_size))?;
            }
        }

        for annotation in &self.annotations {
            writeln!(out)?;
            let heading = format!("Annotation [{}] {}", annotation.style, annotation.context);
            if color {
                writeln!(out, "{}", style(heading).bold())?;
            } else {
                writeln!(out, "{}", heading)?;
            }
            writeln!(out, "{}", strip_html(&annotation.body_html))?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct BuildRow(Build);

impl TableRow for BuildRow {
    fn headers() -> Vec<&'static str> {
        vec!["PIPELINE", "NUMBER", "STATE", "BRANCH", "MESSAGE", "DURATION", "CREATED"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let build = &self.0;
        let now = Utc::now();
        vec![
            build.pipeline_slug().unwrap_or("-").to_string(),
            build.number.to_string(),
            format_status(&build.state, color),
            truncate(&build.branch, 30),
            truncate(build.headline(), 50),
            format_elapsed(build.started_at, build.finished_at, now),
            build
                .created_at
                .map(|at| format_relative_time(at, now))
                .unwrap_or_else(|| "-".into()),
        ]
    }
}

impl BuildCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            BuildSubcommand::New(args) => self.create(args, f).await,
            BuildSubcommand::View(args) => self.view(args, f).await,
            BuildSubcommand::List(args) => self.list(args, f).await,
            BuildSubcommand::Watch(args) => self.watch(args, f).await,
            BuildSubcommand::Cancel(args) => self.cancel(args, f).await,
            BuildSubcommand::Rebuild(args) => self.rebuild(args, f).await,
            BuildSubcommand::Download(args) => self.download(args, f).await,
        }
    }

    /// Create a new build
    async fn create(&self, args: &NewArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let positional: Vec<String> = args.pipeline.iter().cloned().collect();
        let pipeline = f.resolve_pipeline(&client, None, &positional).await?;

        let branch = match &args.branch {
            Some(branch) => branch.clone(),
            None => {
                let details = f
                    .spin("Loading pipeline", client.get_pipeline(&pipeline.org, &pipeline.name))
                    .await?;
                details
                    .default_branch
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| "main".to_string())
            }
        };
        let request = create_request(args, branch)?;

        f.confirm(
            &format!("Create a build on {} ({} @ {})?", pipeline, request.branch, request.commit),
            args.yes,
        )?;

        let build = f
            .spin(
                "Creating build",
                client.create_build(&pipeline.org, &pipeline.name, &request),
            )
            .await?;
        tracing::debug!("Created build {} on {}", build.number, pipeline);

        if args.web {
            return open_browser(&build.web_url);
        }
        let output = f.output();
        output.write_success(&format!("Created build #{} on {}", build.number, pipeline));
        output.write(&BuildDetail(build))
    }

    /// View a build with its artifacts and annotations
    async fn view(&self, args: &ViewArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let target = f.resolve_build(&client, &args.target).await?;

        if args.web {
            let url = format!(
                "https://buildkite.com/{}/{}/builds/{}",
                target.org, target.pipeline, target.number
            );
            println!("{} Opening build {} in browser...", style("→").cyan(), target);
            return open_browser(&url);
        }

        let (build, artifacts, annotations) = f
            .spin(
                "Loading build",
                join3(
                    client.get_build(&target.org, &target.pipeline, target.number),
                    client.list_artifacts(&target.org, &target.pipeline, target.number),
                    client.list_annotations(&target.org, &target.pipeline, target.number),
                ),
            )
            .await?;

        f.output().write(&BuildView {
            build,
            artifacts,
            annotations,
        })
    }

    /// List builds with server-side and client-side filters
    async fn list(&self, args: &ListArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;

        let pipeline = match args.pipeline.as_deref().filter(|p| !p.is_empty()) {
            Some(flag) => Some(f.resolve_pipeline(&client, Some(flag), &[]).await?),
            None => None,
        };
        let org = pipeline.as_ref().map_or(org, |p| p.org.clone());

        let now = Utc::now();
        let options = BuildsListOptions {
            state: args.state.clone(),
            branch: args.branch.clone(),
            creator: args.creator.clone(),
            commit: args.commit.clone(),
            created_from: args.since.as_deref().map(|s| ago(s, now)).transpose()?,
            created_to: args.until.as_deref().map(|s| ago(s, now)).transpose()?,
            meta_data: parse_key_values(&args.meta_data)?,
            ..Default::default()
        };
        let filter = BuildFilter {
            duration: args.duration.as_deref().map(str::parse::<DurationFilter>).transpose()?,
            message: args.message.clone(),
        };

        let source = BuildPages::new(&client, org, pipeline.map(|p| p.name), options);
        let fetch = FetchOptions::new(args.limit, args.no_limit);
        let builds = f
            .spin(
                "Loading builds",
                fetch_paged(&source, &fetch, f.confirmer(), |page| filter.apply(page)),
            )
            .await?;

        let rows: Vec<BuildRow> = builds.into_iter().map(BuildRow).collect();
        f.output().write_list(&rows, "builds")
    }

    /// Poll a build until it finishes
    async fn watch(&self, args: &WatchArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let target = f.resolve_build(&client, &args.target).await?;
        let output = f.output();
        let text = output.format().is_text();

        let mut build_state = String::new();
        let mut job_states: HashMap<String, String> = HashMap::new();
        let build = loop {
            let build = client.get_build(&target.org, &target.pipeline, target.number).await?;

            if text && !output.is_quiet() {
                if build.state != build_state {
                    println!(
                        "Build #{} is {}",
                        build.number,
                        format_status(&build.state, output.color_enabled())
                    );
                    build_state = build.state.clone();
                }
                for job in build.jobs.iter().filter(|j| j.job_type != "waiter") {
                    let state = job.state();
                    if job_states.get(&job.id).map(String::as_str) != Some(state) {
                        println!("  {} {}", format_status(state, output.color_enabled()), job.label());
                        job_states.insert(job.id.clone(), state.to_string());
                    }
                }
            }

            if build.is_finished() {
                break build;
            }
            tokio::time::sleep(Duration::from_secs(args.interval)).await;
        };

        if !text {
            output.write(&BuildDetail(build.clone()))?;
        }
        if build.state != "passed" {
            return Err(CliError::generic(format!(
                "Build #{} finished with state {}",
                build.number, build.state
            ))
            .into());
        }
        output.write_success(&format!("Build #{} passed", build.number));
        Ok(())
    }

    /// Cancel a build
    async fn cancel(&self, args: &CancelArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let target = f.resolve_build(&client, &args.target).await?;

        f.confirm(&format!("Cancel build {}?", target), args.yes)?;
        let build = f
            .spin(
                "Canceling build",
                client.cancel_build(&target.org, &target.pipeline, target.number),
            )
            .await?;

        let output = f.output();
        output.write_success(&format!("Canceled build {}", target));
        if !output.format().is_text() {
            output.write(&BuildDetail(build))?;
        }
        Ok(())
    }

    /// Rebuild a build
    async fn rebuild(&self, args: &RebuildArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let target = f.resolve_build(&client, &args.target).await?;

        let build = f
            .spin(
                "Rebuilding",
                client.rebuild_build(&target.org, &target.pipeline, target.number),
            )
            .await?;

        if args.web {
            return open_browser(&build.web_url);
        }
        let output = f.output();
        output.write_success(&format!("Rebuilt #{} as #{}", target.number, build.number));
        output.write(&BuildDetail(build))
    }

    /// Download artifacts and, with `--logs`, job logs
    async fn download(&self, args: &DownloadArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let target = f.resolve_build(&client, &args.target).await?;
        let destination = args
            .destination
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("build-{}", target.number)));

        let artifacts = f
            .spin(
                "Loading artifacts",
                client.list_artifacts(&target.org, &target.pipeline, target.number),
            )
            .await?;
        let selected = select_artifacts(artifacts, args.job.as_deref(), args.pattern.as_deref())?;

        let mut rows = if selected.is_empty() {
            Vec::new()
        } else {
            download_artifacts(f, &client, selected, &destination, args.limit).await?
        };

        if args.logs {
            let build = client.get_build(&target.org, &target.pipeline, target.number).await?;
            rows.extend(download_logs(&client, &build, &destination, args.failed_only, args.limit).await?);
        }

        if rows.is_empty() {
            f.output().write_info("Nothing to download.");
            return Ok(());
        }
        finish_download(f, &rows)
    }
}

/// Builds the create request from flags; `-e` values override the env file.
fn create_request(args: &NewArgs, branch: String) -> Result<CreateBuild> {
    let mut env = match &args.env_file {
        Some(path) => parse_env_file(path)?,
        None => BTreeMap::new(),
    };
    env.extend(parse_key_values(&args.env)?);

    Ok(CreateBuild {
        commit: args.commit.clone(),
        branch,
        message: args.message.clone().filter(|m| !m.is_empty()),
        env,
        meta_data: parse_key_values(&args.metadata)?,
        ignore_pipeline_branch_filters: args.ignore_branch_filters,
    })
}

/// `now` minus a duration like `24h`.
fn ago(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let parsed: DurationFilter = input.parse()?;
    Ok(now - parsed.threshold)
}

/// Saves the logs of the build's command jobs under `logs/`.
async fn download_logs(
    client: &Arc<BuildkiteClient>,
    build: &Build,
    destination: &std::path::Path,
    failed_only: bool,
    limit: usize,
) -> Result<Vec<DownloadRow>> {
    let org = build.org_slug().unwrap_or_default().to_string();
    let pipeline = build.pipeline_slug().unwrap_or_default().to_string();

    let mut items = Vec::new();
    for job in build
        .jobs
        .iter()
        .filter(|j| j.job_type == "script")
        .filter(|j| !failed_only || j.is_failed())
    {
        let relative = format!("logs/{}.log", job.id);
        let file = safe_join(destination, &relative)?;
        items.push((relative, (job.id.clone(), file)));
    }
    let files: Vec<PathBuf> = items.iter().map(|(_, (_, file))| file.clone()).collect();
    let number = build.number;

    let outcomes = run_bounded(items, limit, None, |(job_id, file)| {
        let client = Arc::clone(client);
        let org = org.clone();
        let pipeline = pipeline.clone();
        async move {
            let log = client.get_job_log(&org, &pipeline, number, &job_id).await?;
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&file, log.content.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            Ok(log.content.len() as u64)
        }
    })
    .await;

    Ok(outcomes
        .into_iter()
        .zip(files)
        .map(|(outcome, file)| {
            let (size, error) = match outcome.result {
                Ok(size) => (Some(size), None),
                Err(e) => (None, Some(format!("{e:#}"))),
            };
            DownloadRow {
                path: outcome.id,
                file,
                size,
                error,
            }
        })
        .collect())
}
