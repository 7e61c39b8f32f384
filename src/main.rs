//
//  buildkite-cli
//  main.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

use anyhow::Result;
use clap::{CommandFactory, FromArgMatches};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use buildkite_cli::cli::{command_path, Cli, Commands, Factory};
use buildkite_cli::error::{categorize, report, with_help_hint, CliError};
use buildkite_cli::exit_codes;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let path = command_path(&matches);

    init_logging(cli.global.verbose);

    let format = cli.global.output;
    let verbose = cli.global.verbose;

    // Ctrl-C drops the command future, which cancels in-flight requests
    // and cleans up the pager and spinner.
    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => Err(CliError::user_aborted("Interrupted").into()),
    };

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            let err = with_help_hint(categorize(e), &path);
            std::process::exit(report(&err, format, verbose));
        }
    }
}

/// Initialize logging from `BK_DEBUG`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("BK_DEBUG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Main command dispatcher
async fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("bk version {}", buildkite_cli::VERSION);
        return Ok(());
    }

    let factory = Factory::new(cli.global)?;
    dispatch(cli.command, &factory).await
}

async fn dispatch(command: Commands, f: &Factory) -> Result<()> {
    match command {
        Commands::Configure(cmd) => cmd.run(f).await,
        Commands::Use(cmd) => cmd.run(f).await,
        Commands::Agent(cmd) => cmd.run(f).await,
        Commands::Build(cmd) => cmd.run(f).await,
        Commands::Job(cmd) => cmd.run(f).await,
        Commands::Artifacts(cmd) => cmd.run(f).await,
        Commands::Pipeline(cmd) => cmd.run(f).await,
        Commands::Cluster(cmd) => cmd.run(f).await,
        Commands::User(cmd) => cmd.run(f).await,
        Commands::Prompt(cmd) => cmd.run(f).await,
        Commands::Package(cmd) => cmd.run(f).await,
        Commands::Api(cmd) => cmd.run(f).await,
        Commands::Version => Ok(()),
    }
}

