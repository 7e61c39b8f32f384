//
//  buildkite-cli
//  lib.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Buildkite CLI Library
//!
//! The core of the `bk` command-line tool for Buildkite.
//!
//! ## Overview
//!
//! `bk` lets developers create and inspect builds, manage jobs, download
//! artifacts and logs, stop agents and manage pipelines without leaving the
//! terminal. Targets are inferred from the surrounding repository where
//! possible, and every result can be printed as a table, JSON or YAML.
//!
//! ## Features
//!
//! - **Repository-aware defaults**: pipelines are found from flags,
//!   arguments, the repo-local `.bk.yaml` or the `origin` remote
//! - **Rich filtering**: server-side build filters combined with client-side
//!   duration, message, state and queue filters over paged results
//! - **Secure token storage**: OS keychain or the config file, with a
//!   one-way migration between them
//! - **Scriptable**: JSON and YAML output, machine-readable errors and
//!   deterministic exit codes
//!
//! ## Module Structure
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`api`]: REST and GraphQL client for the Buildkite API
//! - [`auth`]: Token storage backends and migration
//! - [`config`]: User and repository configuration files
//! - [`context`]: Git facts and the pipeline/build resolvers
//! - [`fetch`]: Paged fetching with client-side filters
//! - [`output`]: Table, JSON and YAML output, pager and spinner
//! - [`workers`]: Bounded fan-out with progress reporting
//! - [`interactive`]: Prompts and selectors
//! - [`error`]: Error categories, suggestions and exit codes
//! - [`util`]: Utility functions
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use buildkite_cli::context::{parse_pipeline, Resolved};
//!
//! let parsed = parse_pipeline("acme/web", "").unwrap();
//! if let Resolved::Found(pipeline) = parsed {
//!     println!("Pipeline: {}", pipeline);
//! }
//! ```

/// Command-line interface definitions.
///
/// Contains all CLI commands, arguments, and subcommands defined using the
/// clap derive API, plus the [`cli::Factory`] that wires them to the rest
/// of the crate.
pub mod cli;

/// Buildkite API client.
///
/// Handles authentication headers, rate-limit retries, typed error
/// responses and the GraphQL endpoint.
pub mod api;

/// Token storage.
///
/// - OS keychain (default)
/// - Plaintext user config file (`BUILDKITE_TOKEN_STORAGE=file`, or CI)
pub mod auth;

/// Configuration file management.
///
/// The user file lives at `$XDG_CONFIG_HOME/bk.yaml` (or the platform
/// equivalent); a repository may add `.bk.yaml` at its root.
pub mod config;

/// Repository context and target resolution.
pub mod context;

/// Error categories and reporting.
pub mod error;

/// Paged fetching and client-side filters.
pub mod fetch;

/// Output formatting for text, JSON and YAML.
pub mod output;

/// Interactive terminal prompts.
pub mod interactive;

/// Bounded concurrent tasks.
pub mod workers;

/// Utility functions and helpers.
pub mod util;

/// Re-export of the main CLI struct for convenient access.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use buildkite_cli::Cli;
///
/// let cli = Cli::parse();
/// // Handle cli.command...
/// ```
pub use cli::Cli;

/// Re-export of the configuration store.
pub use config::Config;

/// Re-export of the categorized error type.
pub use error::CliError;

/// Application name constant.
///
/// The name of the CLI binary, used in the `User-Agent` header and messages.
pub const APP_NAME: &str = "bk";

/// Application version constant.
///
/// ```rust
/// use buildkite_cli::VERSION;
///
/// println!("bk version {}", VERSION);
/// ```
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes for the CLI.
///
/// Each error category maps to exactly one code so scripts can tell
/// failures apart.
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | Success |
/// | 1 | Generic error |
/// | 2 | Validation |
/// | 3 | API |
/// | 4 | Resource not found |
/// | 5 | Permission denied |
/// | 6 | Configuration |
/// | 7 | Authentication |
/// | 8 | Internal |
/// | 130 | Aborted by the user |
///
/// # Example
///
/// ```rust,no_run
/// use buildkite_cli::exit_codes;
/// use std::process;
///
/// process::exit(exit_codes::AUTHENTICATION);
/// ```
pub mod exit_codes {
    /// The command completed without errors.
    pub const SUCCESS: i32 = 0;

    /// An unspecified error occurred, or a bulk operation partly failed.
    pub const ERROR: i32 = 1;

    /// Invalid user input: a flag value, URL, slug or duration.
    pub const VALIDATION: i32 = 2;

    /// The API failed or returned something unusable.
    pub const API: i32 = 3;

    /// The requested resource does not exist.
    pub const NOT_FOUND: i32 = 4;

    /// The token lacks access to the resource.
    pub const PERMISSION_DENIED: i32 = 5;

    /// Missing or invalid configuration, e.g. no organization selected.
    ///
    /// Run `bk use <org>` or `bk configure`.
    pub const CONFIGURATION: i32 = 6;

    /// No token, or the token was rejected.
    ///
    /// Run `bk configure` to add a token.
    pub const AUTHENTICATION: i32 = 7;

    /// A bug in the CLI.
    pub const INTERNAL: i32 = 8;

    /// The user pressed Ctrl+C or declined a prompt.
    pub const USER_ABORTED: i32 = 130;
}
