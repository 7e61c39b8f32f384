//
//  buildkite-cli
//  error/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Error Taxonomy
//!
//! Every failure that reaches the top of a command is turned into a
//! [`CliError`]: a category, a one-line description, and a list of
//! suggestions the user can act on. The category alone decides the process
//! exit code, so scripts can branch on it.
//!
//! ## Categories
//!
//! | Category | Exit code | Typical source |
//! |----------|-----------|----------------|
//! | `Validation` | 2 | Bad flag values, unparsable URLs or durations, HTTP 400/422 |
//! | `Api` | 3 | HTTP 5xx, exhausted rate limit, looping pagination |
//! | `ResourceNotFound` | 4 | HTTP 404 |
//! | `PermissionDenied` | 5 | HTTP 403 |
//! | `Configuration` | 6 | Missing organization, unreadable config file |
//! | `Authentication` | 7 | Missing token, HTTP 401 |
//! | `Internal` | 8 | Bugs and invariant violations |
//! | `UserAborted` | 130 | Ctrl-C or a declined prompt |
//!
//! Anything that cannot be classified is `Generic` and exits with 1.
//!
//! ## Example
//!
//! ```rust
//! use buildkite_cli::error::{CliError, ErrorCategory};
//!
//! let err = CliError::validation("Invalid duration \"ten minutes\"")
//!     .with_suggestions(["Use a duration like 10m or >1h30m"]);
//!
//! assert_eq!(err.category, ErrorCategory::Validation);
//! assert_eq!(err.exit_code(), 2);
//! ```

use std::io::Write;

use console::style;
use serde::Serialize;
use thiserror::Error;

use crate::api::{ErrorResponse, GraphQLError};
use crate::exit_codes;
use crate::output::OutputFormat;

/// Message returned by the GraphQL API when unblocking a job that is no
/// longer blocked.
const ALREADY_UNBLOCKED_MESSAGE: &str = "The job's state must be blocked";

/// The category of a [`CliError`].
///
/// Categories map one-to-one onto exit codes (see [`ErrorCategory::exit_code`])
/// and onto the `code` field of the machine-readable error document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unclassified failure.
    Generic,
    /// User input was rejected, locally or by the API.
    Validation,
    /// The API failed on its side or behaved unexpectedly.
    Api,
    /// The addressed resource does not exist.
    ResourceNotFound,
    /// The token is valid but lacks access.
    PermissionDenied,
    /// The local configuration is missing or broken.
    Configuration,
    /// No token, or the token was rejected.
    Authentication,
    /// A bug in the CLI itself.
    Internal,
    /// The user interrupted or declined.
    UserAborted,
}

impl ErrorCategory {
    /// Returns the process exit code for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Generic => exit_codes::ERROR,
            Self::Validation => exit_codes::VALIDATION,
            Self::Api => exit_codes::API,
            Self::ResourceNotFound => exit_codes::NOT_FOUND,
            Self::PermissionDenied => exit_codes::PERMISSION_DENIED,
            Self::Configuration => exit_codes::CONFIGURATION,
            Self::Authentication => exit_codes::AUTHENTICATION,
            Self::Internal => exit_codes::INTERNAL,
            Self::UserAborted => exit_codes::USER_ABORTED,
        }
    }

    /// Returns the stable machine-readable code for this category.
    pub fn code(self) -> &'static str {
        match self {
            Self::Generic => "error",
            Self::Validation => "validation_error",
            Self::Api => "api_error",
            Self::ResourceNotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Configuration => "configuration_error",
            Self::Authentication => "authentication_error",
            Self::Internal => "internal_error",
            Self::UserAborted => "user_aborted",
        }
    }

    /// Human-readable prefix used when rendering to a terminal.
    fn prefix(self) -> &'static str {
        match self {
            Self::Generic => "Error",
            Self::Validation => "Validation error",
            Self::Api => "API error",
            Self::ResourceNotFound => "Not found",
            Self::PermissionDenied => "Permission denied",
            Self::Configuration => "Configuration error",
            Self::Authentication => "Authentication error",
            Self::Internal => "Internal error",
            Self::UserAborted => "Aborted",
        }
    }
}

/// A categorized, user-facing error.
///
/// `CliError` is what commands return when they know what went wrong, and
/// what [`categorize`] produces for everything else. It composes with
/// [`with_suggestions`](Self::with_suggestions) and
/// [`with_details`](Self::with_details) so call sites can enrich an error
/// as it travels upward.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::error::CliError;
///
/// let err = CliError::configuration("No organization selected")
///     .with_suggestions(["Run `bk use <org>` to select one"]);
/// assert_eq!(err.to_string(), "No organization selected");
/// ```
#[derive(Debug, Error)]
#[error("{details}")]
pub struct CliError {
    /// The category, which decides the exit code.
    pub category: ErrorCategory,
    /// One-line description shown to the user.
    pub details: String,
    /// Actionable hints, most useful first.
    pub suggestions: Vec<String>,
    /// The underlying error, if any.
    #[source]
    pub original: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CliError {
    /// Creates an error in the given category.
    pub fn new(category: ErrorCategory, details: impl Into<String>) -> Self {
        Self {
            category,
            details: details.into(),
            suggestions: Vec::new(),
            original: None,
        }
    }

    pub fn generic(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Generic, details)
    }

    pub fn validation(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, details)
    }

    pub fn api(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Api, details)
    }

    pub fn not_found(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ResourceNotFound, details)
    }

    pub fn permission_denied(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::PermissionDenied, details)
    }

    pub fn configuration(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, details)
    }

    pub fn authentication(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authentication, details)
    }

    pub fn user_aborted(details: impl Into<String>) -> Self {
        Self::new(ErrorCategory::UserAborted, details)
    }

    /// Appends suggestions, keeping existing ones first.
    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions
            .extend(suggestions.into_iter().map(Into::into));
        self
    }

    /// Replaces the description.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Attaches the underlying error.
    pub fn with_original(mut self, original: anyhow::Error) -> Self {
        self.original = Some(original.into());
        self
    }

    /// Returns the exit code for this error's category.
    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// Builds the machine-readable document written for JSON/YAML output.
    pub fn document(&self) -> ErrorDocument {
        ErrorDocument {
            schema_version: "1",
            error: ErrorBody {
                code: self.category.code(),
                message: self.details.clone(),
                hint: self.suggestions.first().cloned(),
                exit_code: self.exit_code(),
                recoverable: self.category == ErrorCategory::Api,
            },
        }
    }
}

/// Machine-readable error document written to stderr in JSON/YAML mode.
#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    pub schema_version: &'static str,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub exit_code: i32,
    pub recoverable: bool,
}

/// Converts any error into a [`CliError`].
///
/// A `CliError` anywhere at the top of the chain is returned as-is. HTTP
/// and GraphQL failures are mapped through [`from_response`] and the
/// GraphQL rules; everything else becomes `Generic` with the full context
/// chain as its description.
pub fn categorize(err: anyhow::Error) -> CliError {
    let err = match err.downcast::<CliError>() {
        Ok(cli) => return cli,
        Err(err) => err,
    };

    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            let mut mapped = CliError::new(cli.category, format!("{err:#}"));
            mapped.suggestions = cli.suggestions.clone();
            return mapped;
        }
        if let Some(response) = cause.downcast_ref::<ErrorResponse>() {
            let mapped = from_response(response);
            return mapped.with_original(err);
        }
        if let Some(gql) = cause.downcast_ref::<GraphQLError>() {
            let details = gql.to_string();
            return CliError::api(details).with_original(err);
        }
        if cause.downcast_ref::<serde_yaml::Error>().is_some() {
            let details = format!("{err:#}");
            return CliError::configuration(details).with_original(err);
        }
        if cause.downcast_ref::<keyring::Error>().is_some() {
            let details = format!("{err:#}");
            return CliError::configuration(details)
                .with_suggestions(["Set BUILDKITE_TOKEN_STORAGE=file to store tokens in the config file"])
                .with_original(err);
        }
    }

    let details = format!("{err:#}");
    CliError::generic(details).with_original(err)
}

/// Maps an HTTP error response onto a category with suggestions.
pub fn from_response(response: &ErrorResponse) -> CliError {
    match response {
        r if r.is_unauthorized() => CliError::authentication("The API token was rejected (401 Unauthorized)")
            .with_suggestions([
                "Run `bk configure` to set a valid API token",
                "Check BUILDKITE_API_TOKEN if it is set in your environment",
            ]),
        r if r.is_forbidden() => CliError::permission_denied(format!(
            "Access denied to {} (403 Forbidden)",
            r.path()
        ))
        .with_suggestions([
            "Check that your token has the required scopes (`bk user whoami` lists them)",
            "Check that you are a member of the organization",
        ]),
        r if r.is_not_found() => CliError::not_found(format!("Not found: {}", r.path()))
            .with_suggestions(not_found_suggestions(r.path())),
        r if r.is_bad_request() => {
            let (message, fields) = parse_validation_body(&r.body);
            CliError::validation(
                message.unwrap_or_else(|| format!("The request was rejected ({})", r.status)),
            )
            .with_suggestions(fields)
        }
        r if r.is_too_many_requests() => {
            CliError::api("Rate limit exceeded (429 Too Many Requests)").with_suggestions([
                "Wait for the rate limit to reset, or rerun with --max-retries to wait automatically",
            ])
        }
        r if r.is_server_error() => {
            CliError::api(format!("Buildkite returned a server error ({})", r.status))
                .with_suggestions(["This is a problem on the server side; try again later"])
        }
        r => CliError::api(format!("Unexpected response from {} ({})", r.path(), r.status)),
    }
}

/// Suggestions for a 404, chosen by the shape of the request path.
fn not_found_suggestions(path: &str) -> Vec<String> {
    let hint = if path.contains("/artifacts") {
        "Check the build number and that the build uploaded artifacts (`bk artifacts list <build>`)"
    } else if path.contains("/builds/") {
        "Check the build number (`bk build list` shows recent builds)"
    } else if path.contains("/agents/") {
        "Check the agent ID (`bk agent list` shows connected agents)"
    } else if path.contains("/pipelines/") {
        "Check the pipeline slug, or pass it explicitly with -p <org>/<pipeline>"
    } else if path.contains("/organizations/") {
        "Check the organization slug (`bk use` switches organizations)"
    } else {
        "Check the identifier and try again"
    };
    vec![hint.to_string()]
}

/// Extracts the top-level message and field errors from a validation body.
fn parse_validation_body(body: &str) -> (Option<String>, Vec<String>) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, Vec::new());
    };

    let message = json
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string);

    let fields = json
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|error| match error {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(obj) => {
                        let detail = obj
                            .get("message")
                            .or_else(|| obj.get("code"))
                            .and_then(|v| v.as_str())?;
                        match obj.get("field").and_then(|f| f.as_str()) {
                            Some(field) => Some(format!("{field}: {detail}")),
                            None => Some(detail.to_string()),
                        }
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    (message, fields)
}

/// Returns true when an unblock failed because the job was already unblocked.
pub fn is_already_unblocked(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<GraphQLError>()
            .is_some_and(|gql| gql.messages.iter().any(|m| m == ALREADY_UNBLOCKED_MESSAGE))
    })
}

/// Adds the `--help` pointer that not-found errors carry at command boundaries.
pub fn with_help_hint(mut err: CliError, command_path: &str) -> CliError {
    if err.category == ErrorCategory::ResourceNotFound {
        err.suggestions
            .push(format!("Run `bk {command_path} --help` for usage"));
    }
    err
}

/// Writes the error to stderr and returns the exit code.
///
/// Human output prints the category prefix, the description, and either the
/// first suggestion or all of them when `verbose` is set. JSON and YAML
/// output write an [`ErrorDocument`] instead.
pub fn report(err: &CliError, format: OutputFormat, verbose: bool) -> i32 {
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    // stderr is best-effort; nothing useful can be done if it is closed
    let _ = write_report(&mut out, err, format, verbose, console::colors_enabled_stderr());
    err.exit_code()
}

/// Renders the error into `out`.
pub fn write_report<W: Write>(
    out: &mut W,
    err: &CliError,
    format: OutputFormat,
    verbose: bool,
    color: bool,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &err.document())?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *out, &err.document())?;
        }
        OutputFormat::Text => {
            let prefix = format!("{}:", err.category.prefix());
            if color {
                writeln!(out, "{} {}", style(prefix).red().bold(), err.details)?;
            } else {
                writeln!(out, "{} {}", prefix, err.details)?;
            }

            let shown = if verbose {
                err.suggestions.len()
            } else {
                err.suggestions.len().min(1)
            };
            for suggestion in err.suggestions.iter().take(shown) {
                if color {
                    writeln!(out, "  {} {}", style("→").cyan(), suggestion)?;
                } else {
                    writeln!(out, "  → {}", suggestion)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn response(status: u16, url: &str, body: &str) -> ErrorResponse {
        ErrorResponse {
            status_code: status,
            status: format!("{status}"),
            url: url.to_string(),
            body: body.to_string(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_exit_codes_are_deterministic() {
        assert_eq!(ErrorCategory::Generic.exit_code(), 1);
        assert_eq!(ErrorCategory::Validation.exit_code(), 2);
        assert_eq!(ErrorCategory::Api.exit_code(), 3);
        assert_eq!(ErrorCategory::ResourceNotFound.exit_code(), 4);
        assert_eq!(ErrorCategory::PermissionDenied.exit_code(), 5);
        assert_eq!(ErrorCategory::Configuration.exit_code(), 6);
        assert_eq!(ErrorCategory::Authentication.exit_code(), 7);
        assert_eq!(ErrorCategory::Internal.exit_code(), 8);
        assert_eq!(ErrorCategory::UserAborted.exit_code(), 130);
    }

    #[test]
    fn test_http_status_mapping() {
        let url = "https://api.buildkite.com/v2/organizations/acme/pipelines/web";
        assert_eq!(from_response(&response(401, url, "")).category, ErrorCategory::Authentication);
        assert_eq!(from_response(&response(403, url, "")).category, ErrorCategory::PermissionDenied);
        assert_eq!(from_response(&response(404, url, "")).category, ErrorCategory::ResourceNotFound);
        assert_eq!(from_response(&response(400, url, "")).category, ErrorCategory::Validation);
        assert_eq!(from_response(&response(502, url, "")).category, ErrorCategory::Api);
    }

    #[test]
    fn test_not_found_suggestion_depends_on_path() {
        let build = from_response(&response(
            404,
            "https://api.buildkite.com/v2/organizations/acme/pipelines/web/builds/42",
            "",
        ));
        assert!(build.suggestions[0].contains("build number"));

        let agent = from_response(&response(
            404,
            "https://api.buildkite.com/v2/organizations/acme/agents/abc",
            "",
        ));
        assert!(agent.suggestions[0].contains("agent ID"));
    }

    #[test]
    fn test_validation_fields_become_suggestions() {
        let body = r#"{"message":"Validation Failed","errors":[{"field":"branch","code":"missing"},"commit is invalid"]}"#;
        let err = from_response(&response(422, "https://x/v2/organizations/a/pipelines/b/builds", body));
        assert_eq!(err.details, "Validation Failed");
        assert_eq!(err.suggestions, vec!["branch: missing", "commit is invalid"]);
    }

    #[test]
    fn test_categorize_finds_response_in_chain() {
        let err = anyhow::Error::new(response(404, "https://x/v2/organizations/a/agents/1", ""))
            .context("Failed to fetch agent");
        let cli = categorize(err);
        assert_eq!(cli.category, ErrorCategory::ResourceNotFound);
        assert!(cli.original.is_some());
    }

    #[test]
    fn test_categorize_keeps_cli_error() {
        let err: anyhow::Error = CliError::user_aborted("Interrupted").into();
        assert_eq!(categorize(err).exit_code(), 130);
    }

    #[test]
    fn test_already_unblocked_is_detected() {
        let err: anyhow::Error = GraphQLError {
            messages: vec![ALREADY_UNBLOCKED_MESSAGE.to_string()],
        }
        .into();
        assert!(is_already_unblocked(&err));

        let other: anyhow::Error = GraphQLError {
            messages: vec!["Something else".to_string()],
        }
        .into();
        assert!(!is_already_unblocked(&other));
    }

    #[test]
    fn test_json_document_shape() {
        let err = CliError::api("API returned duplicate results").with_suggestions(["retry"]);
        let mut buf = Vec::new();
        write_report(&mut buf, &err, OutputFormat::Json, false, false).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(doc["schema_version"], "1");
        assert_eq!(doc["error"]["code"], "api_error");
        assert_eq!(doc["error"]["exit_code"], 3);
        assert_eq!(doc["error"]["hint"], "retry");
        assert_eq!(doc["error"]["recoverable"], true);
    }

    #[test]
    fn test_text_report_shows_first_suggestion_unless_verbose() {
        let err = CliError::not_found("Not found: /builds/9").with_suggestions(["one", "two"]);

        let mut terse = Vec::new();
        write_report(&mut terse, &err, OutputFormat::Text, false, false).unwrap();
        let terse = String::from_utf8(terse).unwrap();
        assert!(terse.contains("one"));
        assert!(!terse.contains("two"));

        let mut verbose = Vec::new();
        write_report(&mut verbose, &err, OutputFormat::Text, true, false).unwrap();
        assert!(String::from_utf8(verbose).unwrap().contains("two"));
    }

    #[test]
    fn test_help_hint_only_for_not_found() {
        let nf = with_help_hint(CliError::not_found("x"), "build view");
        assert!(nf.suggestions.iter().any(|s| s.contains("bk build view --help")));

        let other = with_help_hint(CliError::validation("x"), "build view");
        assert!(other.suggestions.is_empty());
    }
}
