//
//  buildkite-cli
//  cli/api.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Direct REST API access
//!
//! Sends one request through the authenticated client, including its
//! rate-limit retry, and prints the response.
//!
//! ## Examples
//!
//! ```bash
//! # Paths are relative to the selected organization
//! bk api pipelines/web/builds
//!
//! # Method first for anything but GET
//! bk api POST pipelines/web/builds -d '{"commit":"HEAD","branch":"main"}'
//!
//! # Body from a file, extra headers
//! bk api PUT agents/0190-aaaa/stop -d @stop.json -H "X-Trace: 1"
//!
//! # Paths outside the organization
//! bk api user
//! ```

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;
use reqwest::Method;
use serde_json::Value;

use crate::error::CliError;
use crate::output::{write_json_to, write_yaml_to, OutputFormat};

use super::Factory;

/// Prefixes that are not scoped to an organization.
const UNSCOPED_PREFIXES: [&str; 3] = ["organizations", "user", "access-token"];

/// Make a REST API request
#[derive(Args, Debug, Default)]
pub struct ApiCommand {
    /// HTTP method, or the path for a GET
    pub method: String,

    /// API path, relative to the organization unless it starts with
    /// organizations/, user or access-token
    pub endpoint: Option<String>,

    /// Request body; @FILE reads a file and @- reads stdin
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Request header as "Name: Value" (repeatable)
    #[arg(long, short = 'H', action = clap::ArgAction::Append)]
    pub header: Vec<String>,
}

impl ApiCommand {
    pub async fn run(&self, f: &Factory) -> Result<()> {
        let (method, path) = match &self.endpoint {
            Some(endpoint) => (parse_method(&self.method)?, endpoint.as_str()),
            None => (Method::GET, self.method.as_str()),
        };

        let org = f.organization()?;
        let endpoint = resolve_endpoint(&org, path);
        let body = self.read_body()?;
        let headers = self.parse_headers()?;

        let client = f.client()?;
        tracing::debug!("{} {}", method, endpoint);
        let (status, text) = f
            .spin("Sending request", client.raw(method, &endpoint, body, &headers))
            .await?;
        tracing::debug!("Response status {}", status);

        print_response(&text, f.global().output)
    }

    fn read_body(&self) -> Result<Option<Vec<u8>>> {
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let bytes = match data.strip_prefix('@') {
            Some("-") => {
                let mut buffer = Vec::new();
                std::io::stdin()
                    .read_to_end(&mut buffer)
                    .context("Failed to read the request body from stdin")?;
                buffer
            }
            Some(path) => std::fs::read(path).with_context(|| format!("Failed to read {path}"))?,
            None => data.as_bytes().to_vec(),
        };
        Ok(Some(bytes))
    }

    fn parse_headers(&self) -> Result<Vec<(String, String)>> {
        self.header
            .iter()
            .map(|header| match header.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    Ok((name.trim().to_string(), value.trim().to_string()))
                }
                _ => Err(CliError::validation(format!("Invalid header \"{header}\""))
                    .with_suggestions(["Use -H \"Name: Value\""])
                    .into()),
            })
            .collect()
    }
}

fn parse_method(method: &str) -> Result<Method> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(CliError::validation(format!("Unsupported HTTP method: {method}"))
            .with_suggestions(["Use GET, POST, PUT, PATCH or DELETE"])
            .into()),
    }
}

/// Scopes `path` to `organizations/<org>/` unless it already names a
/// top-level resource.
fn resolve_endpoint(org: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    let first = path.split(['/', '?']).next().unwrap_or_default();
    if UNSCOPED_PREFIXES.contains(&first) {
        path.to_string()
    } else {
        format!("organizations/{org}/{path}")
    }
}

/// JSON bodies are re-rendered in the selected format; anything else is
/// printed as received.
fn print_response(text: &str, format: OutputFormat) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match serde_json::from_str::<Value>(text) {
        Ok(json) if format == OutputFormat::Yaml => write_yaml_to(&mut stdout, &json),
        Ok(json) => write_json_to(&mut stdout, &json),
        Err(_) if text.is_empty() => Ok(()),
        Err(_) => {
            println!("{}", text);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FileTokenStore;
    use crate::cli::GlobalOptions;
    use crate::config::{Config, EnvOverrides, USER_CONFIG_FILE};

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(resolve_endpoint("acme", "pipelines"), "organizations/acme/pipelines");
        assert_eq!(resolve_endpoint("acme", "/agents?per_page=5"), "organizations/acme/agents?per_page=5");
        assert_eq!(resolve_endpoint("acme", "user"), "user");
        assert_eq!(resolve_endpoint("acme", "/organizations/other/builds"), "organizations/other/builds");
        assert_eq!(resolve_endpoint("acme", "access-token"), "access-token");
        assert_eq!(resolve_endpoint("acme", "users-report"), "organizations/acme/users-report");
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert!(parse_method("FETCH").is_err());
    }

    #[tokio::test]
    async fn test_request_sends_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/organizations/acme/pipelines/web/builds")
            .match_header("x-trace", "1")
            .match_body(r#"{"commit":"HEAD"}"#)
            .with_status(201)
            .with_body(r#"{"number":9}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let store = Box::new(FileTokenStore::new(user_path.clone()));
        let env = EnvOverrides {
            api_token: Some("bkua_test".into()),
            organization: Some("acme".into()),
        };
        let config = Config::from_parts(user_path, None, store, env).unwrap();
        let global = GlobalOptions {
            quiet: true,
            rest_endpoint: Some(server.url()),
            ..Default::default()
        };
        let f = Factory::with_config(global, config, None);

        let cmd = ApiCommand {
            method: "POST".into(),
            endpoint: Some("pipelines/web/builds".into()),
            data: Some(r#"{"commit":"HEAD"}"#.into()),
            header: vec!["X-Trace: 1".into()],
        };
        cmd.run(&f).await.unwrap();
        mock.assert_async().await;
    }
}
