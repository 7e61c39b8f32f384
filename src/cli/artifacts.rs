//
//  buildkite-cli
//  cli/artifacts.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Artifact commands
//!
//! Lists and downloads the artifacts uploaded by a build's jobs. The
//! downloader here is shared with `build download`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::api::{Artifact, BuildkiteClient};
use crate::error::CliError;
use crate::output::{format_status, TableRow};
use crate::util::format_size;
use crate::workers::{run_bounded, spawn_progress, DEFAULT_DOWNLOAD_PARALLELISM};

use super::{BuildTarget, Factory};

/// Manage build artifacts
#[derive(Args, Debug)]
pub struct ArtifactsCommand {
    #[command(subcommand)]
    pub command: ArtifactsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ArtifactsSubcommand {
    /// List the artifacts of a build
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Download the artifacts of a build
    #[command(visible_alias = "dl")]
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Only artifacts of this job
    #[arg(long)]
    pub job: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub target: BuildTarget,

    /// Directory to download into
    #[arg(long, short = 'd', default_value = ".")]
    pub destination: PathBuf,

    /// Only artifacts of this job
    #[arg(long)]
    pub job: Option<String>,

    /// Only artifacts whose path matches this glob
    #[arg(long)]
    pub pattern: Option<String>,

    /// Maximum downloads at once
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_PARALLELISM)]
    pub limit: usize,
}

// Display types

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct ArtifactRow(Artifact);

impl TableRow for ArtifactRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "PATH", "JOB", "STATE", "SIZE"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let artifact = &self.0;
        vec![
            artifact.id.clone(),
            artifact.path.clone(),
            artifact.job_id.clone(),
            format_status(&artifact.state, color),
            format_size(artifact.file_size),
        ]
    }
}

/// One downloaded file.
#[derive(Debug, Serialize)]
pub(crate) struct DownloadRow {
    pub path: String,
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableRow for DownloadRow {
    fn headers() -> Vec<&'static str> {
        vec!["ARTIFACT", "FILE", "SIZE"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let size = match (&self.error, self.size) {
            (Some(e), _) if color => console::style(format!("failed: {e}")).red().to_string(),
            (Some(e), _) => format!("failed: {e}"),
            (None, Some(size)) => format_size(size),
            (None, None) => "-".to_string(),
        };
        vec![self.path.clone(), self.file.display().to_string(), size]
    }
}

impl ArtifactsCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            ArtifactsSubcommand::List(args) => self.list(args, f).await,
            ArtifactsSubcommand::Download(args) => self.download(args, f).await,
        }
    }

    async fn list(&self, args: &ListArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let build = f.resolve_build(&client, &args.target).await?;

        let artifacts = match &args.job {
            Some(job) => {
                f.spin(
                    "Loading artifacts",
                    client.list_job_artifacts(&build.org, &build.pipeline, build.number, job),
                )
                .await?
            }
            None => {
                f.spin(
                    "Loading artifacts",
                    client.list_artifacts(&build.org, &build.pipeline, build.number),
                )
                .await?
            }
        };

        let rows: Vec<ArtifactRow> = artifacts.into_iter().map(ArtifactRow).collect();
        f.output().write_list(&rows, "artifacts")
    }

    async fn download(&self, args: &DownloadArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let build = f.resolve_build(&client, &args.target).await?;

        let artifacts = f
            .spin(
                "Loading artifacts",
                client.list_artifacts(&build.org, &build.pipeline, build.number),
            )
            .await?;
        let selected = select_artifacts(artifacts, args.job.as_deref(), args.pattern.as_deref())?;
        if selected.is_empty() {
            f.output().write_info("No artifacts found.");
            return Ok(());
        }

        let rows = download_artifacts(f, &client, selected, &args.destination, args.limit).await?;
        finish_download(f, &rows)
    }
}

/// Keeps finished artifacts matching the job and glob filters.
pub(crate) fn select_artifacts(
    artifacts: Vec<Artifact>,
    job: Option<&str>,
    pattern: Option<&str>,
) -> Result<Vec<Artifact>> {
    let matcher = pattern.map(compile_glob).transpose()?;
    Ok(artifacts
        .into_iter()
        .filter(|a| {
            if a.state != "finished" {
                tracing::debug!("Skipping artifact {} in state {}", a.path, a.state);
                return false;
            }
            true
        })
        .filter(|a| job.map_or(true, |j| a.job_id == j))
        .filter(|a| matcher.as_ref().map_or(true, |p| glob_matches(p, &a.path)))
        .collect())
}

/// Compiles a path glob.
///
/// `*` and `?` stay within one path segment, `**` crosses segments.
pub(crate) fn compile_glob(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| CliError::validation(format!("Invalid pattern \"{pattern}\": {e}")).into())
}

fn glob_matches(pattern: &Pattern, path: &str) -> bool {
    pattern.matches_with(
        path,
        MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        },
    )
}

/// Joins an artifact path onto `destination`, refusing paths that would
/// land outside it.
pub(crate) fn safe_join(destination: &Path, artifact_path: &str) -> Result<PathBuf> {
    let relative = Path::new(artifact_path);
    let mut joined = destination.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CliError::validation(format!(
                    "Refusing to write artifact outside the destination: {artifact_path}"
                ))
                .into());
            }
        }
    }
    if joined == destination {
        return Err(CliError::validation(format!("Artifact has an empty path: \"{artifact_path}\"")).into());
    }
    Ok(joined)
}

/// Downloads `artifacts` into `destination` with at most `limit` at once.
///
/// Artifacts sharing a path across jobs are written under a directory
/// named after the job.
pub(crate) async fn download_artifacts(
    f: &Factory,
    client: &Arc<BuildkiteClient>,
    artifacts: Vec<Artifact>,
    destination: &Path,
    limit: usize,
) -> Result<Vec<DownloadRow>> {
    let mut path_counts: HashMap<&str, usize> = HashMap::new();
    for artifact in &artifacts {
        *path_counts.entry(artifact.path.as_str()).or_default() += 1;
    }

    let mut items = Vec::with_capacity(artifacts.len());
    for artifact in &artifacts {
        let label = if path_counts.get(artifact.path.as_str()).copied().unwrap_or(0) > 1 {
            format!("{}/{}", artifact.job_id, artifact.path)
        } else {
            artifact.path.clone()
        };
        let target = safe_join(destination, &label)?;
        items.push((label, (artifact.download_url.clone(), target)));
    }
    let targets: Vec<(String, PathBuf)> = items.iter().map(|(id, (_, t))| (id.clone(), t.clone())).collect();

    let output = f.output();
    let show_progress = output.format().is_text() && !output.is_quiet();
    let ids: Vec<String> = targets.iter().map(|(id, _)| id.clone()).collect();
    let (updates, renderer) = if show_progress {
        let (tx, handle) = spawn_progress(&ids, console::Term::stderr().is_term());
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    let outcomes = run_bounded(items, limit, updates, |(url, target)| {
        let client = Arc::clone(client);
        async move { fetch_to_file(client, url, target).await }
    })
    .await;

    if let Some(renderer) = renderer {
        if let Err(e) = renderer.await {
            tracing::debug!("Progress renderer stopped: {}", e);
        }
    }

    Ok(outcomes
        .into_iter()
        .zip(targets)
        .map(|(outcome, (_, file))| match outcome.result {
            Ok(size) => DownloadRow {
                path: outcome.id,
                file,
                size: Some(size),
                error: None,
            },
            Err(e) => DownloadRow {
                path: outcome.id,
                file,
                size: None,
                error: Some(format!("{e:#}")),
            },
        })
        .collect())
}

/// Reports a finished download; any failure fails the command.
pub(crate) fn finish_download(f: &Factory, rows: &[DownloadRow]) -> Result<()> {
    let output = f.output();
    let failed = rows.iter().filter(|r| r.error.is_some()).count();

    if output.format().is_text() {
        if failed == 0 {
            output.write_success(&format!("Downloaded {} file(s)", rows.len()));
        }
    } else {
        output.write_list(rows, "artifacts")?;
    }

    if failed > 0 {
        return Err(CliError::generic(format!("{} of {} download(s) failed", failed, rows.len())).into());
    }
    Ok(())
}

async fn fetch_to_file(client: Arc<BuildkiteClient>, url: String, target: PathBuf) -> Result<u64> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut response = client.download(&url).await?;
    let mut file = tokio::fs::File::create(&target)
        .await
        .with_context(|| format!("Failed to create {}", target.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    tracing::debug!("Wrote {} bytes to {}", written, target.display());
    Ok(written)
}
