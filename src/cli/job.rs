//
//  buildkite-cli
//  cli/job.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Job commands
//!
//! Job mutations go through GraphQL, addressed by the job's UUID. Logs are
//! read over REST, so the owning build is located first unless it is given
//! with `--pipeline` and `--build`.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::api::{BuildRef, BuildsListOptions, Job, JobLog};
use crate::error::{is_already_unblocked, CliError};
use crate::fetch::{fetch_paged, jobs_of, BuildPages, DurationFilter, FetchOptions, JobFilter, QueueJobPages};
use crate::output::{format_status, truncate, TableRow};
use crate::util::{format_elapsed, strip_timestamps};

use super::Factory;

/// Manage jobs
#[derive(Args, Debug)]
pub struct JobCommand {
    #[command(subcommand)]
    pub command: JobSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum JobSubcommand {
    /// Show a job's log
    #[command(visible_alias = "log")]
    Logs(LogsArgs),

    /// Retry a job
    Retry(JobArgs),

    /// Unblock a block step
    Unblock(UnblockArgs),

    /// Cancel a job
    Cancel(CancelArgs),

    /// Change a job's priority
    Reprioritize(ReprioritizeArgs),

    /// List jobs
    #[command(visible_alias = "ls")]
    List(ListArgs),
}

#[derive(Args, Debug, Default)]
pub struct JobArgs {
    /// Job UUID
    pub uuid: String,
}

#[derive(Args, Debug, Default)]
pub struct LogsArgs {
    /// Job UUID
    pub uuid: String,

    /// Pipeline of the job's build; skips the job lookup with --build
    #[arg(long, short = 'p', requires = "build")]
    pub pipeline: Option<String>,

    /// Number of the job's build
    #[arg(long, short = 'b', requires = "pipeline")]
    pub build: Option<u64>,

    /// Remove the agent's inline timestamps
    #[arg(long)]
    pub no_timestamps: bool,
}

#[derive(Args, Debug, Default)]
pub struct UnblockArgs {
    /// Job UUID of the block step
    pub uuid: String,

    /// Form field values as a JSON object
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct CancelArgs {
    /// Job UUID
    pub uuid: String,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct ReprioritizeArgs {
    /// Job UUID
    pub uuid: String,

    /// New priority; higher runs first
    #[arg(allow_negative_numbers = true)]
    pub priority: i64,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Pipeline as NAME, ORG/NAME, or URL (defaults to every pipeline)
    #[arg(long, short = 'p')]
    pub pipeline: Option<String>,

    /// Only jobs targeting this queue
    #[arg(long)]
    pub queue: Option<String>,

    /// Filter by job state (repeatable)
    #[arg(long, short = 's')]
    pub state: Vec<String>,

    /// Filter by run time, e.g. ">10m" or "<30s"
    #[arg(long)]
    pub duration: Option<String>,

    /// Filter by branch (repeatable)
    #[arg(long, short = 'b')]
    pub branch: Vec<String>,

    /// Only jobs of builds created within this long ago, e.g. 24h
    #[arg(long)]
    pub since: Option<String>,

    /// Only jobs of builds created before this long ago
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum jobs to return
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Return every matching job
    #[arg(long, conflicts_with = "limit")]
    pub no_limit: bool,
}

// Display types

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct JobRow(Job);

impl TableRow for JobRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "PIPELINE", "BUILD", "LABEL", "STATE", "QUEUE", "DURATION"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let job = &self.0;
        let (pipeline, number) = match &job.build {
            Some(b) => (b.pipeline.clone(), b.number.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        vec![
            job.id.clone(),
            pipeline,
            number,
            truncate(job.label(), 40),
            format_status(job.state(), color),
            job.queue().unwrap_or("default").to_string(),
            format_elapsed(job.started_at, job.finished_at, Utc::now()),
        ]
    }
}

#[derive(Debug, Serialize)]
struct JobMutation {
    id: String,
    action: &'static str,
    result: serde_json::Value,
}

impl JobCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            JobSubcommand::Logs(args) => self.logs(args, f).await,
            JobSubcommand::Retry(args) => self.retry(args, f).await,
            JobSubcommand::Unblock(args) => self.unblock(args, f).await,
            JobSubcommand::Cancel(args) => self.cancel(args, f).await,
            JobSubcommand::Reprioritize(args) => self.reprioritize(args, f).await,
            JobSubcommand::List(args) => self.list(args, f).await,
        }
    }

    /// Show a job's log
    async fn logs(&self, args: &LogsArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;

        let build = match (&args.pipeline, args.build) {
            (Some(pipeline), Some(number)) => {
                let pipeline = f.resolve_pipeline(&client, Some(pipeline), &[]).await?;
                BuildRef {
                    org: pipeline.org,
                    pipeline: pipeline.name,
                    number,
                }
            }
            _ => f.spin("Locating job", client.locate_job(&args.uuid)).await?,
        };
        tracing::debug!("Job {} belongs to {}/{}#{}", args.uuid, build.org, build.pipeline, build.number);

        let mut log = f
            .spin(
                "Loading log",
                client.get_job_log(&build.org, &build.pipeline, build.number, &args.uuid),
            )
            .await?;
        if args.no_timestamps {
            log.content = strip_timestamps(&log.content);
        }

        f.output().write_with(&log, |out, _| write_log(out, &log))
    }

    /// Retry a job
    async fn retry(&self, args: &JobArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let result = f.spin("Retrying job", client.retry_job(&args.uuid)).await?;
        report_mutation(f, &args.uuid, "retried", result)
    }

    /// Unblock a block step; an already unblocked job is not an error
    async fn unblock(&self, args: &UnblockArgs, f: &Factory) -> Result<()> {
        let fields = args.data.as_deref().map(parse_fields).transpose()?;
        f.organization()?;
        let client = f.client()?;

        match f.spin("Unblocking job", client.unblock_job(&args.uuid, fields)).await {
            Ok(result) => report_mutation(f, &args.uuid, "unblocked", result),
            Err(e) if is_already_unblocked(&e) => {
                f.output().write_info(&format!("Job {} is already unblocked", args.uuid));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel a job
    async fn cancel(&self, args: &CancelArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        f.confirm(&format!("Cancel job {}?", args.uuid), args.yes)?;
        let result = f.spin("Canceling job", client.cancel_job(&args.uuid)).await?;
        report_mutation(f, &args.uuid, "canceled", result)
    }

    /// Change a job's priority
    async fn reprioritize(&self, args: &ReprioritizeArgs, f: &Factory) -> Result<()> {
        f.organization()?;
        let client = f.client()?;
        let result = f
            .spin(
                "Updating priority",
                client.reprioritize_job(&args.uuid, args.priority),
            )
            .await?;
        report_mutation(f, &args.uuid, "reprioritized", result)
    }

    /// List jobs
    ///
    /// With `--queue` and no pipeline or branch, jobs are read from the
    /// queue through GraphQL. Otherwise builds are paged over REST and their
    /// command jobs filtered client-side.
    async fn list(&self, args: &ListArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;

        let duration = args.duration.as_deref().map(str::parse::<DurationFilter>).transpose()?;
        let fetch = FetchOptions::new(args.limit, args.no_limit);
        let queue = args.queue.as_deref().filter(|q| !q.is_empty());
        let by_queue = args.pipeline.is_none() && args.branch.is_empty();

        let jobs = if let Some(queue) = queue.filter(|_| by_queue) {
            let queue_ids = f.spin("Finding queue", client.queue_ids(&org, queue)).await?;
            if queue_ids.is_empty() {
                return Err(CliError::not_found(format!("No queue named {queue} in {org}"))
                    .with_suggestions(["Run `bk cluster view <cluster>` to see its queues"])
                    .into());
            }
            let filter = JobFilter {
                queue: None,
                states: args.state.clone(),
                duration,
            };
            let source = QueueJobPages::new(&client, org, queue_ids);
            f.spin(
                "Loading jobs",
                fetch_paged(&source, &fetch, f.confirmer(), |page| filter.apply(page)),
            )
            .await?
        } else {
            let pipeline = match args.pipeline.as_deref().filter(|p| !p.is_empty()) {
                Some(flag) => Some(f.resolve_pipeline(&client, Some(flag), &[]).await?),
                None => None,
            };
            let org = pipeline.as_ref().map_or(org, |p| p.org.clone());

            let now = Utc::now();
            let since = args.since.as_deref().map(str::parse::<DurationFilter>).transpose()?;
            let until = args.until.as_deref().map(str::parse::<DurationFilter>).transpose()?;
            let options = BuildsListOptions {
                branch: args.branch.clone(),
                created_from: since.map(|d| now - d.threshold),
                created_to: until.map(|d| now - d.threshold),
                ..Default::default()
            };
            let filter = JobFilter {
                queue: queue.map(str::to_string),
                states: args.state.clone(),
                duration,
            };
            let source = BuildPages::new(&client, org, pipeline.map(|p| p.name), options);
            f.spin(
                "Loading jobs",
                fetch_paged(&source, &fetch, f.confirmer(), |page| filter.apply(jobs_of(page))),
            )
            .await?
        };

        let rows: Vec<JobRow> = jobs.into_iter().map(JobRow).collect();
        f.output().write_list(&rows, "jobs")
    }
}

fn write_log(out: &mut dyn Write, log: &JobLog) -> std::io::Result<()> {
    out.write_all(log.content.as_bytes())?;
    if !log.content.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

/// Parses `--data` into the block step's field values.
fn parse_fields(data: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| CliError::validation(format!("--data is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(CliError::validation("--data must be a JSON object")
            .with_suggestions([r#"For example --data '{"release-name":"v1.2"}'"#])
            .into());
    }
    Ok(value)
}

fn report_mutation(f: &Factory, uuid: &str, action: &'static str, result: serde_json::Value) -> Result<()> {
    let output = f.output();
    if output.format().is_text() {
        output.write_success(&format!("Job {uuid} {action}"));
        return Ok(());
    }
    let mutation = JobMutation {
        id: uuid.to_string(),
        action,
        result,
    };
    output.write_with(&mutation, |_, _| Ok(()))
}
