//
//  buildkite-cli
//  cli/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! CLI command definitions using clap derive macros

mod agent;
mod api;
mod artifacts;
mod build;
mod cluster;
mod configure;
pub mod factory;
mod job;
mod package;
mod pipeline;
mod prompt;
mod use_org;
mod user;

pub use agent::AgentCommand;
pub use api::ApiCommand;
pub use artifacts::ArtifactsCommand;
pub use build::BuildCommand;
pub use cluster::ClusterCommand;
pub use configure::ConfigureCommand;
pub use factory::{BuildTarget, Factory};
pub use job::JobCommand;
pub use package::PackageCommand;
pub use pipeline::PipelineCommand;
pub use prompt::PromptCommand;
pub use use_org::UseCommand;
pub use user::UserCommand;

use clap::{ArgMatches, Parser, Subcommand};

use crate::output::OutputFormat;

/// Buildkite CLI - Work with Buildkite from the command line
#[derive(Parser, Debug)]
#[command(
    name = "bk",
    version,
    about = "Work with Buildkite from the command line",
    long_about = "bk is a CLI for Buildkite.\n\n\
                  It brings builds, jobs, agents, artifacts and pipelines to your terminal.",
    propagate_version = true,
    after_help = "Use 'bk <command> --help' for more information about a command."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Disable interactive prompts
    #[arg(long, global = true, env = "BK_NO_INPUT")]
    pub no_input: bool,

    /// Never send output through a pager
    #[arg(long, global = true, env = "BK_NO_PAGER")]
    pub no_pager: bool,

    /// Suppress progress and informational messages
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Show debug logging and every error suggestion
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// REST API base URL
    #[arg(long, global = true, hide = true, env = "BUILDKITE_REST_API_ENDPOINT")]
    pub rest_endpoint: Option<String>,

    /// GraphQL endpoint URL
    #[arg(long, global = true, hide = true, env = "BUILDKITE_GRAPHQL_ENDPOINT")]
    pub graphql_endpoint: Option<String>,

    /// Retries after a rate-limited (429) response
    #[arg(long, global = true, env = "BK_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,

    /// Longest wait between rate-limit retries, in seconds
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = 60)]
    pub max_retry_delay: u64,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add an API token for an organization
    Configure(ConfigureCommand),

    /// Select the active organization
    Use(UseCommand),

    /// Manage agents
    Agent(AgentCommand),

    /// Create, inspect and manage builds
    #[command(visible_alias = "b")]
    Build(BuildCommand),

    /// Inspect and manage jobs
    Job(JobCommand),

    /// List and download build artifacts
    #[command(visible_alias = "artifact")]
    Artifacts(ArtifactsCommand),

    /// Manage pipelines
    #[command(visible_alias = "p")]
    Pipeline(PipelineCommand),

    /// Inspect clusters
    Cluster(ClusterCommand),

    /// Inspect and invite users
    User(UserCommand),

    /// Show the selected organization in your shell prompt
    Prompt(PromptCommand),

    /// Push packages to Buildkite Package Registries
    Package(PackageCommand),

    /// Make API requests
    Api(ApiCommand),

    /// Print version information
    Version,
}

/// Space-separated path of the subcommand that was run, e.g. `build view`.
pub fn command_path(matches: &ArgMatches) -> String {
    let mut parts = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        parts.push(name.to_string());
        current = sub;
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_path() {
        let matches = Cli::command()
            .try_get_matches_from(["bk", "build", "view", "42", "-o", "json"])
            .unwrap();
        assert_eq!(command_path(&matches), "build view");

        let cli = Cli::from_arg_matches(&matches).unwrap();
        assert_eq!(cli.global.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Build(_)));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bk", "agent", "list", "--no-input", "-q", "--max-retries", "3"]).unwrap();
        assert!(cli.global.no_input);
        assert!(cli.global.quiet);
        assert_eq!(cli.global.max_retries, 3);
        assert_eq!(cli.global.max_retry_delay, 60);
    }

    #[test]
    fn test_agent_list_version_filter() {
        let cli = Cli::try_parse_from(["bk", "agent", "list", "--version", "3.80.0"]).unwrap();
        assert!(matches!(cli.command, Commands::Agent(_)));
        assert!(Cli::try_parse_from(["bk", "--version"]).is_err());
    }
}
