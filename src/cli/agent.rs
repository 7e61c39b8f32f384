//
//  buildkite-cli
//  cli/agent.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Agent commands
//!
//! Lists, inspects and stops the agents connected to an organization.
//! `agent stop` fans out over the given IDs with a bounded worker pool and
//! reports each agent's progress as it goes.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use console::style;
use serde::Serialize;

use crate::api::agents::AgentListOptions;
use crate::api::Agent;
use crate::error::CliError;
use crate::output::{
    format_status, print_field, print_header, write_json_to, write_yaml_to, OutputFormat, TableOutput, TableRow,
};
use crate::util::{format_relative_time, open_browser};
use crate::workers::{run_bounded, spawn_progress, DEFAULT_STOP_PARALLELISM};

use super::Factory;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Manage agents
#[derive(Args, Debug)]
pub struct AgentCommand {
    #[command(subcommand)]
    pub command: AgentSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AgentSubcommand {
    /// List agents
    #[command(visible_alias = "ls", disable_version_flag = true)]
    List(ListArgs),

    /// Stop one or more agents
    Stop(StopArgs),

    /// View an agent
    View(ViewArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only agents serving this queue
    #[arg(long)]
    pub queue: Option<String>,

    /// Filter by hostname
    #[arg(long)]
    pub hostname: Option<String>,

    /// Filter by agent version
    #[arg(long = "version", value_name = "VERSION")]
    pub agent_version: Option<String>,

    /// Filter by agent name
    #[arg(long)]
    pub name: Option<String>,

    /// Agents per page
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub per_page: u32,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Agent IDs
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Cancel any running job instead of waiting for it
    #[arg(long)]
    pub force: bool,

    /// Maximum agents stopped at once
    #[arg(long, default_value_t = DEFAULT_STOP_PARALLELISM)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Agent ID
    pub id: String,

    /// Open in browser
    #[arg(long, short = 'w')]
    pub web: bool,

    /// Refresh every two seconds until interrupted
    #[arg(long)]
    pub watch: bool,
}

// Display types

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct AgentRow(Agent);

impl TableRow for AgentRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "NAME", "STATE", "QUEUE", "VERSION", "HOSTNAME", "JOB"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let agent = &self.0;
        vec![
            agent.id.clone(),
            agent.name.clone(),
            format_status(&agent.connection_state, color),
            agent.queue().to_string(),
            agent.version.clone(),
            agent.hostname.clone(),
            agent.activity().to_string(),
        ]
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct AgentDetail(Agent);

impl TableOutput for AgentDetail {
    fn print_table(&self, out: &mut dyn Write, color: bool) -> std::io::Result<()> {
        let agent = &self.0;
        print_header(out, &agent.name, color)?;
        print_field(out, "ID", &agent.id, color)?;
        print_field(out, "State", &format_status(&agent.connection_state, color), color)?;
        print_field(out, "Queue", agent.queue(), color)?;
        print_field(out, "Hostname", &agent.hostname, color)?;
        print_field(out, "Version", &agent.version, color)?;
        if let Some(ip) = &agent.ip_address {
            print_field(out, "IP address", ip, color)?;
        }
        if let Some(priority) = agent.priority {
            print_field(out, "Priority", &priority.to_string(), color)?;
        }
        if let Some(connected) = agent.created_at {
            print_field(out, "Connected", &format_relative_time(connected, Utc::now()), color)?;
        }
        match &agent.job {
            Some(job) => print_field(out, "Running", &format!("{} ({})", job.label(), job.id), color)?,
            None => print_field(out, "Running", "idle", color)?,
        }
        if !agent.meta_data.is_empty() {
            writeln!(out)?;
            writeln!(out, "Tags:")?;
            for tag in &agent.meta_data {
                writeln!(out, "  {}", tag)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StopResult {
    id: String,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TableRow for StopResult {
    fn headers() -> Vec<&'static str> {
        vec!["AGENT", "RESULT"]
    }

    fn cells(&self, color: bool) -> Vec<String> {
        let result = match (&self.error, color) {
            (None, true) => style("stopped").green().to_string(),
            (None, false) => "stopped".to_string(),
            (Some(e), true) => style(format!("failed: {e}")).red().to_string(),
            (Some(e), false) => format!("failed: {e}"),
        };
        vec![self.id.clone(), result]
    }
}

impl AgentCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        match &self.command {
            AgentSubcommand::List(args) => self.list(args, f).await,
            AgentSubcommand::Stop(args) => self.stop(args, f).await,
            AgentSubcommand::View(args) => self.view(args, f).await,
        }
    }

    /// List agents
    async fn list(&self, args: &ListArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;

        let options = AgentListOptions {
            name: args.name.clone(),
            hostname: args.hostname.clone(),
            version: args.agent_version.clone(),
            page: None,
            per_page: Some(args.per_page),
        };
        let agents = f.spin("Loading agents", client.list_agents(&org, &options)).await?;

        let rows: Vec<AgentRow> = agents
            .into_iter()
            .filter(|agent| {
                args.queue
                    .as_deref()
                    .map_or(true, |q| agent.queue().eq_ignore_ascii_case(q))
            })
            .map(AgentRow)
            .collect();
        f.output().write_list(&rows, "agents")
    }

    /// Stop agents with at most `--limit` requests in flight
    async fn stop(&self, args: &StopArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;
        let client = f.client()?;
        let output = f.output();

        let show_progress = output.format().is_text() && !output.is_quiet();
        let (updates, renderer) = if show_progress {
            let (tx, handle) = spawn_progress(&args.ids, console::Term::stderr().is_term());
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        let items: Vec<(String, String)> = args.ids.iter().map(|id| (id.clone(), id.clone())).collect();
        let force = args.force;
        let outcomes = run_bounded(items, args.limit, updates, |id| {
            let client = Arc::clone(&client);
            let org = org.clone();
            async move { client.stop_agent(&org, &id, force).await }
        })
        .await;

        if let Some(renderer) = renderer {
            if let Err(e) = renderer.await {
                tracing::debug!("Progress renderer stopped: {}", e);
            }
        }

        let results: Vec<StopResult> = outcomes
            .into_iter()
            .map(|outcome| StopResult {
                stopped: outcome.result.is_ok(),
                error: outcome.result.err().map(|e| format!("{e:#}")),
                id: outcome.id,
            })
            .collect();
        let failed = results.iter().filter(|r| !r.stopped).count();

        if !output.format().is_text() {
            output.write_list(&results, "agents")?;
        } else if failed == 0 {
            output.write_success(&format!("Stopped {} agent(s)", results.len()));
        }

        if failed > 0 {
            return Err(CliError::generic(format!(
                "{} of {} agent(s) could not be stopped",
                failed,
                results.len()
            ))
            .into());
        }
        Ok(())
    }

    /// View an agent
    async fn view(&self, args: &ViewArgs, f: &Factory) -> Result<()> {
        let org = f.organization()?;

        if args.web {
            let url = format!("https://buildkite.com/organizations/{}/agents/{}", org, args.id);
            println!("{} Opening agent {} in browser...", style("→").cyan(), args.id);
            return open_browser(&url);
        }

        let client = f.client()?;
        let output = f.output();

        if !args.watch {
            let agent = f.spin("Loading agent", client.get_agent(&org, &args.id)).await?;
            return output.write(&AgentDetail(agent));
        }

        let term = console::Term::stdout();
        loop {
            let agent = client.get_agent(&org, &args.id).await?;
            if output.format().is_text() && term.is_term() {
                term.clear_screen()?;
            }
            let detail = AgentDetail(agent);
            let mut stdout = std::io::stdout().lock();
            match output.format() {
                OutputFormat::Text => detail.print_table(&mut stdout, output.color_enabled())?,
                OutputFormat::Json => write_json_to(&mut stdout, &detail)?,
                OutputFormat::Yaml => write_yaml_to(&mut stdout, &detail)?,
            }
            stdout.flush()?;
            drop(stdout);
            tokio::time::sleep(WATCH_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FileTokenStore;
    use crate::cli::GlobalOptions;
    use crate::config::{Config, EnvOverrides, USER_CONFIG_FILE};

    fn factory(dir: &tempfile::TempDir, server: &mockito::Server) -> Factory {
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let store = Box::new(FileTokenStore::new(user_path.clone()));
        let env = EnvOverrides {
            api_token: Some("bkua_test".into()),
            organization: Some("acme".into()),
        };
        let config = Config::from_parts(user_path, None, store, env).unwrap();
        let global = GlobalOptions {
            no_input: true,
            quiet: true,
            output: OutputFormat::Json,
            rest_endpoint: Some(server.url()),
            ..Default::default()
        };
        Factory::with_config(global, config, None)
    }

    #[tokio::test]
    async fn test_stop_reports_partial_failure() {
        let mut server = mockito::Server::new_async().await;
        for id in ["a", "b", "d"] {
            server
                .mock("PUT", format!("/organizations/acme/agents/{id}/stop").as_str())
                .match_body(mockito::Matcher::Json(serde_json::json!({"force": true})))
                .with_status(204)
                .create_async()
                .await;
        }
        server
            .mock("PUT", "/organizations/acme/agents/c/stop")
            .with_status(404)
            .with_body(r#"{"message":"No agent found"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let f = factory(&dir, &server);
        let cmd = AgentCommand {
            command: AgentSubcommand::Stop(StopArgs {
                ids: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                force: true,
                limit: 2,
            }),
        };
        let err = cmd.run(&f).await.unwrap_err().downcast::<CliError>().unwrap();
        assert_eq!(err.exit_code(), crate::exit_codes::ERROR);
        assert!(err.details.starts_with("1 of 4"));
    }

    #[tokio::test]
    async fn test_stop_all_succeed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", mockito::Matcher::Regex(r"^/organizations/acme/agents/[a-z]+/stop$".into()))
            .with_status(204)
            .expect(3)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let f = factory(&dir, &server);
        let cmd = AgentCommand {
            command: AgentSubcommand::Stop(StopArgs {
                ids: vec!["x".into(), "y".into(), "z".into()],
                force: false,
                limit: 5,
            }),
        };
        cmd.run(&f).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_agent_row_cells() {
        let agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "ag-1",
            "name": "builder-1",
            "hostname": "ip-10-0-0-1",
            "version": "3.80.0",
            "connection_state": "connected",
            "meta_data": ["queue=deploy", "os=linux"]
        }))
        .unwrap();
        let cells = AgentRow(agent).cells(false);
        assert_eq!(
            cells,
            vec!["ag-1", "builder-1", "connected", "deploy", "3.80.0", "ip-10-0-0-1", "idle"]
        );
    }
}
