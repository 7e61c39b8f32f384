//
//  buildkite-cli
//  context/build.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Build Resolution
//!
//! Resolvers that produce a [`ResolvedBuild`].
//!
//! ## Accepted Forms
//!
//! - `42`: build 42 of the pipeline the pipeline chain resolves
//! - `acme/web/42`
//! - `https://buildkite.com/acme/web/builds/42`
//!
//! When no build is named, [`QueryBuildResolver`] asks the API for the most
//! recent build matching a set of [`BuildOption`]s (branch, creator).

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{AggregateResolver, Resolved, ResolvedPipeline, Resolver};
use crate::api::{BuildkiteClient, BuildsListOptions};
use crate::error::CliError;

static BUILD_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^/]+/([^/]+)/([^/]+)/builds/(\d+)$").unwrap());

/// A fully qualified build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBuild {
    pub org: String,
    pub pipeline: String,
    pub number: u64,
}

impl ResolvedBuild {
    pub fn new(org: impl Into<String>, pipeline: impl Into<String>, number: u64) -> Self {
        Self {
            org: org.into(),
            pipeline: pipeline.into(),
            number,
        }
    }
}

impl std::fmt::Display for ResolvedBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.org, self.pipeline, self.number)
    }
}

/// A parsed build argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildArg {
    /// A number; the pipeline still has to be resolved.
    Number(u64),
    /// Organization, pipeline and number were all given.
    Qualified(ResolvedBuild),
}

fn parse_number(value: &str, input: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(0) => Err(CliError::validation("Build numbers start at 1").into()),
        Ok(n) => Ok(n),
        Err(_) => Err(CliError::validation(format!("Invalid build \"{input}\""))
            .with_suggestions(["Use a build number, <org>/<pipeline>/<number>, or a build URL"])
            .into()),
    }
}

/// Parses a build argument.
///
/// # Returns
///
/// `None` for empty input.
///
/// # Errors
///
/// Validation error for anything that is not one of the accepted forms,
/// including build number zero.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::context::{parse_build_arg, BuildArg, ResolvedBuild};
///
/// assert_eq!(parse_build_arg("42").unwrap(), Some(BuildArg::Number(42)));
/// assert_eq!(
///     parse_build_arg("https://buildkite.com/acme/web/builds/42").unwrap(),
///     Some(BuildArg::Qualified(ResolvedBuild::new("acme", "web", 42)))
/// );
/// ```
pub fn parse_build_arg(input: &str) -> Result<Option<BuildArg>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if input.chars().all(|c| c.is_ascii_digit()) {
        return parse_number(input, input).map(|n| Some(BuildArg::Number(n)));
    }

    if input.contains("://") {
        let Some(caps) = BUILD_URL.captures(input) else {
            return Err(CliError::validation(format!("Invalid build URL \"{input}\""))
                .with_suggestions(["Expected https://buildkite.com/<org>/<pipeline>/builds/<number>"])
                .into());
        };
        let number = parse_number(&caps[3], input)?;
        return Ok(Some(BuildArg::Qualified(ResolvedBuild::new(&caps[1], &caps[2], number))));
    }

    let parts: Vec<&str> = input.split('/').collect();
    match parts.as_slice() {
        [org, pipeline, number] if !org.is_empty() && !pipeline.is_empty() => {
            let number = parse_number(number, input)?;
            Ok(Some(BuildArg::Qualified(ResolvedBuild::new(*org, *pipeline, number))))
        }
        _ => Err(CliError::validation(format!("Invalid build \"{input}\""))
            .with_suggestions(["Use a build number, <org>/<pipeline>/<number>, or a build URL"])
            .into()),
    }
}

/// Resolves from a positional build argument.
///
/// A bare number is combined with the pipeline chain; failing to resolve a
/// pipeline for an explicit number is an error, not a skip.
pub struct BuildArgResolver<'a> {
    arg: Option<&'a str>,
    pipelines: &'a AggregateResolver<'a, ResolvedPipeline>,
}

impl<'a> BuildArgResolver<'a> {
    pub fn new(arg: Option<&'a str>, pipelines: &'a AggregateResolver<'a, ResolvedPipeline>) -> Self {
        Self { arg, pipelines }
    }
}

#[async_trait]
impl Resolver<ResolvedBuild> for BuildArgResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedBuild>> {
        let Some(arg) = self.arg else {
            return Ok(Resolved::Skip);
        };
        match parse_build_arg(arg)? {
            None => Ok(Resolved::Skip),
            Some(BuildArg::Qualified(build)) => Ok(Resolved::Found(build)),
            Some(BuildArg::Number(number)) => {
                let pipeline = self.pipelines.resolve().await?.ok_or_else(|| {
                    CliError::validation(format!("Could not determine the pipeline for build {number}"))
                        .with_suggestions([
                            "Pass --pipeline <org>/<pipeline>",
                            "Or use <org>/<pipeline>/<number>",
                        ])
                })?;
                Ok(Resolved::Found(ResolvedBuild::new(pipeline.org, pipeline.name, number)))
            }
        }
    }
}

/// Adjusts the list query used to find a build.
///
/// Options never overwrite a field an earlier option already set.
#[async_trait]
pub trait BuildOption: Send + Sync {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()>;
}

/// Branch filter from `--branch`.
pub struct BranchFromFlag(pub Vec<String>);

#[async_trait]
impl BuildOption for BranchFromFlag {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()> {
        if options.branch.is_empty() {
            options.branch = self.0.iter().filter(|b| !b.is_empty()).cloned().collect();
        }
        Ok(())
    }
}

/// Branch filter from the checked-out branch, when no branch is set yet.
pub struct CurrentBranch(pub Option<String>);

#[async_trait]
impl BuildOption for CurrentBranch {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()> {
        if options.branch.is_empty() {
            if let Some(branch) = self.0.as_ref().filter(|b| !b.is_empty()) {
                options.branch.push(branch.clone());
            }
        }
        Ok(())
    }
}

/// Creator filter from `--user`.
pub struct UserFromFlag(pub Option<String>);

#[async_trait]
impl BuildOption for UserFromFlag {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()> {
        if options.creator.is_none() {
            options.creator = self.0.clone().filter(|u| !u.is_empty());
        }
        Ok(())
    }
}

/// Creator filter set to the token's user.
pub struct CurrentUser<'a>(pub &'a BuildkiteClient);

#[async_trait]
impl BuildOption for CurrentUser<'_> {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()> {
        if options.creator.is_none() {
            let user = self.0.current_user().await?;
            tracing::debug!("Filtering builds by current user {}", user.id);
            options.creator = Some(user.id);
        }
        Ok(())
    }
}

/// Applies `option` only when `condition` holds.
pub struct When<'a> {
    condition: bool,
    option: Box<dyn BuildOption + 'a>,
}

impl<'a> When<'a> {
    pub fn new(condition: bool, option: impl BuildOption + 'a) -> Self {
        Self {
            condition,
            option: Box::new(option),
        }
    }
}

#[async_trait]
impl BuildOption for When<'_> {
    async fn apply(&self, options: &mut BuildsListOptions) -> Result<()> {
        if self.condition {
            self.option.apply(options).await?;
        }
        Ok(())
    }
}

/// Resolves to the newest build matching the configured options.
pub struct QueryBuildResolver<'a> {
    client: &'a BuildkiteClient,
    pipelines: &'a AggregateResolver<'a, ResolvedPipeline>,
    options: Vec<Box<dyn BuildOption + 'a>>,
}

impl<'a> QueryBuildResolver<'a> {
    pub fn new(client: &'a BuildkiteClient, pipelines: &'a AggregateResolver<'a, ResolvedPipeline>) -> Self {
        Self {
            client,
            pipelines,
            options: Vec::new(),
        }
    }

    pub fn with(mut self, option: impl BuildOption + 'a) -> Self {
        self.options.push(Box::new(option));
        self
    }
}

#[async_trait]
impl Resolver<ResolvedBuild> for QueryBuildResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedBuild>> {
        let Some(pipeline) = self.pipelines.resolve().await? else {
            return Ok(Resolved::Skip);
        };

        let mut query = BuildsListOptions {
            per_page: Some(1),
            ..Default::default()
        };
        for option in &self.options {
            option.apply(&mut query).await?;
        }

        let builds = self
            .client
            .list_builds(&pipeline.org, Some(&pipeline.name), &query)
            .await?;
        Ok(match builds.into_iter().next() {
            Some(build) => Resolved::Found(ResolvedBuild::new(pipeline.org, pipeline.name, build.number)),
            None => Resolved::Skip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FlagPipelineResolver;
    use crate::error::ErrorCategory;
    use mockito::Matcher;

    #[test]
    fn test_parse_build_forms() {
        assert_eq!(parse_build_arg("").unwrap(), None);
        assert_eq!(parse_build_arg("7").unwrap(), Some(BuildArg::Number(7)));
        assert_eq!(
            parse_build_arg("acme/web/12").unwrap(),
            Some(BuildArg::Qualified(ResolvedBuild::new("acme", "web", 12)))
        );
        assert_eq!(
            parse_build_arg("http://bk.example.com/acme/web/builds/3").unwrap(),
            Some(BuildArg::Qualified(ResolvedBuild::new("acme", "web", 3)))
        );
    }

    #[test]
    fn test_parse_build_rejects_bad_input() {
        for input in ["0", "acme/web", "acme/web/x", "https://buildkite.com/acme/web/builds", "a/b/0"] {
            let err = parse_build_arg(input).unwrap_err();
            assert_eq!(
                err.downcast_ref::<CliError>().unwrap().category,
                ErrorCategory::Validation,
                "{input}"
            );
        }
    }

    #[tokio::test]
    async fn test_number_uses_pipeline_chain() {
        let pipelines = AggregateResolver::new().with(FlagPipelineResolver::new(Some("web"), "acme"));
        let resolver = BuildArgResolver::new(Some("42"), &pipelines);
        assert_eq!(
            resolver.resolve().await.unwrap(),
            Resolved::Found(ResolvedBuild::new("acme", "web", 42))
        );
    }

    #[tokio::test]
    async fn test_number_without_pipeline_is_error() {
        let pipelines = AggregateResolver::new();
        let resolver = BuildArgResolver::new(Some("42"), &pipelines);
        assert!(resolver.resolve().await.is_err());
    }

    #[tokio::test]
    async fn test_options_do_not_overwrite() {
        let mut options = BuildsListOptions::default();
        BranchFromFlag(vec!["release".into()]).apply(&mut options).await.unwrap();
        CurrentBranch(Some("main".into())).apply(&mut options).await.unwrap();
        UserFromFlag(Some("u1".into())).apply(&mut options).await.unwrap();
        UserFromFlag(Some("u2".into())).apply(&mut options).await.unwrap();
        When::new(false, UserFromFlag(Some("u3".into())))
            .apply(&mut options)
            .await
            .unwrap();

        assert_eq!(options.branch, vec!["release"]);
        assert_eq!(options.creator.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_query_resolver_uses_current_user() {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(r#"{"id":"user-1","name":"Ada","email":"ada@example.com"}"#)
            .create_async()
            .await;
        let builds = server
            .mock("GET", "/organizations/acme/pipelines/web/builds")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "1".into()),
                Matcher::UrlEncoded("branch[]".into(), "main".into()),
                Matcher::UrlEncoded("creator".into(), "user-1".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"number":99,"state":"passed"}]"#)
            .create_async()
            .await;

        let client = BuildkiteClient::new("token").unwrap().with_base_url(server.url());
        let pipelines = AggregateResolver::new().with(FlagPipelineResolver::new(Some("acme/web"), ""));
        let resolver = QueryBuildResolver::new(&client, &pipelines)
            .with(CurrentBranch(Some("main".into())))
            .with(When::new(true, CurrentUser(&client)));

        assert_eq!(
            resolver.resolve().await.unwrap(),
            Resolved::Found(ResolvedBuild::new("acme", "web", 99))
        );
        user.assert_async().await;
        builds.assert_async().await;
    }
}
