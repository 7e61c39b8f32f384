//
//  buildkite-cli
//  context/pipeline.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Pipeline Resolution
//!
//! Resolvers that produce a [`ResolvedPipeline`], and the pickers they use
//! when more than one candidate is found.
//!
//! ## Accepted Forms
//!
//! | Input | Organization | Pipeline |
//! |-------|--------------|----------|
//! | `web` | configured organization | `web` |
//! | `acme/web` | `acme` | `web` |
//! | `https://buildkite.com/acme/web` | `acme` | `web` |
//! | `https://buildkite.com/acme/web/builds/42` | `acme` | `web` |
//!
//! The first separator present decides the form: any `:` means URL, a `/`
//! without `:` means `org/name`, anything else is a bare name.
//!
//! ## Chain Order
//!
//! 1. [`FlagPipelineResolver`] (`--pipeline`)
//! 2. [`PositionalPipelineResolver`]
//! 3. [`RepoConfigPipelineResolver`] (`.bk.yaml` / `bk.yaml` preferences)
//! 4. [`RemotePipelineResolver`] (pipelines whose repository matches `origin`)

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{Resolved, Resolver};
use crate::api::BuildkiteClient;
use crate::config::Config;
use crate::error::CliError;
use crate::interactive;

/// A fully qualified pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPipeline {
    pub org: String,
    pub name: String,
}

impl ResolvedPipeline {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResolvedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// Parses a pipeline argument.
///
/// # Parameters
///
/// * `input` - A bare name, `org/name`, or a pipeline or build URL
/// * `default_org` - Organization used for bare names
///
/// # Returns
///
/// [`Resolved::Skip`] for empty input, otherwise the parsed pipeline.
///
/// # Errors
///
/// - Validation error for a malformed URL or `org/name`
/// - Configuration error for a bare name with no organization selected
///
/// # Example
///
/// ```rust
/// use buildkite_cli::context::{parse_pipeline, Resolved, ResolvedPipeline};
///
/// let parsed = parse_pipeline("https://buildkite.com/acme/web/builds/42", "other").unwrap();
/// assert_eq!(parsed, Resolved::Found(ResolvedPipeline::new("acme", "web")));
/// ```
pub fn parse_pipeline(input: &str, default_org: &str) -> Result<Resolved<ResolvedPipeline>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Resolved::Skip);
    }

    if input.contains(':') {
        return parse_pipeline_url(input).map(Resolved::Found);
    }

    if let Some((org, name)) = input.split_once('/') {
        if org.is_empty() || name.is_empty() || name.contains('/') {
            return Err(CliError::validation(format!("Invalid pipeline \"{input}\""))
                .with_suggestions(["Use <org>/<pipeline>, a bare pipeline slug, or a pipeline URL"])
                .into());
        }
        return Ok(Resolved::Found(ResolvedPipeline::new(org, name)));
    }

    if default_org.is_empty() {
        return Err(CliError::configuration("No organization selected")
            .with_suggestions([
                "Run `bk use <org>` to select an organization",
                "Or pass the pipeline as <org>/<pipeline>",
            ])
            .into());
    }
    Ok(Resolved::Found(ResolvedPipeline::new(default_org, input)))
}

fn parse_pipeline_url(input: &str) -> Result<ResolvedPipeline> {
    let invalid = || {
        CliError::validation(format!("Invalid pipeline URL \"{input}\""))
            .with_suggestions(["Expected https://buildkite.com/<org>/<pipeline>"])
    };

    let url = Url::parse(input).map_err(|e| invalid().with_original(e.into()))?;
    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let n = segments.len();
    if n >= 2 && segments[n - 2] == "builds" && segments[n - 1].chars().all(|c| c.is_ascii_digit()) {
        segments.truncate(n - 2);
    }

    match segments.as_slice() {
        [.., org, name] => Ok(ResolvedPipeline::new(*org, *name)),
        _ => Err(invalid().into()),
    }
}

/// Resolves from the `--pipeline` flag.
pub struct FlagPipelineResolver<'a> {
    value: Option<&'a str>,
    default_org: String,
}

impl<'a> FlagPipelineResolver<'a> {
    pub fn new(value: Option<&'a str>, default_org: impl Into<String>) -> Self {
        Self {
            value,
            default_org: default_org.into(),
        }
    }
}

#[async_trait]
impl Resolver<ResolvedPipeline> for FlagPipelineResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedPipeline>> {
        match self.value {
            Some(value) => parse_pipeline(value, &self.default_org),
            None => Ok(Resolved::Skip),
        }
    }
}

/// Resolves from `args[index]`, skipping when the argument is absent.
pub struct PositionalPipelineResolver<'a> {
    args: &'a [String],
    index: usize,
    default_org: String,
}

impl<'a> PositionalPipelineResolver<'a> {
    pub fn new(args: &'a [String], index: usize, default_org: impl Into<String>) -> Self {
        Self {
            args,
            index,
            default_org: default_org.into(),
        }
    }
}

#[async_trait]
impl Resolver<ResolvedPipeline> for PositionalPipelineResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedPipeline>> {
        match self.args.get(self.index) {
            Some(arg) => parse_pipeline(arg, &self.default_org),
            None => Ok(Resolved::Skip),
        }
    }
}

/// Chooses one pipeline out of several candidates.
///
/// `Ok(None)` means nothing was chosen and the resolver should skip.
pub trait PipelinePicker: Send + Sync {
    fn pick(&self, candidates: Vec<ResolvedPipeline>) -> Result<Option<ResolvedPipeline>>;
}

/// Asks the user with an interactive list.
pub struct InteractivePicker;

impl PipelinePicker for InteractivePicker {
    fn pick(&self, candidates: Vec<ResolvedPipeline>) -> Result<Option<ResolvedPipeline>> {
        let names: Vec<&str> = candidates.iter().map(|p| p.name.as_str()).collect();
        let choice = interactive::select("Select a pipeline", &names)?;
        Ok(choice.and_then(|idx| candidates.into_iter().nth(idx)))
    }
}

/// Takes the first candidate.
pub struct FirstPicker;

impl PipelinePicker for FirstPicker {
    fn pick(&self, candidates: Vec<ResolvedPipeline>) -> Result<Option<ResolvedPipeline>> {
        Ok(candidates.into_iter().next())
    }
}

/// Refuses to choose between several candidates.
pub struct StrictPicker;

impl PipelinePicker for StrictPicker {
    fn pick(&self, candidates: Vec<ResolvedPipeline>) -> Result<Option<ResolvedPipeline>> {
        if candidates.len() > 1 {
            let names: Vec<String> = candidates.iter().map(|p| p.name.clone()).collect();
            return Err(CliError::validation(format!(
                "Multiple pipelines match this repository: {}",
                names.join(", ")
            ))
            .with_suggestions(["Pass --pipeline <org>/<pipeline> to choose one"])
            .into());
        }
        Ok(candidates.into_iter().next())
    }
}

/// Wraps a picker and remembers its choice in the repository config.
///
/// The chosen pipeline moves to the head of the candidate list and the
/// reordered list is written back, so the next run offers it first.
pub struct CachingPicker<'a, P> {
    inner: P,
    config: &'a Config,
}

impl<'a, P: PipelinePicker> CachingPicker<'a, P> {
    pub fn new(inner: P, config: &'a Config) -> Self {
        Self { inner, config }
    }
}

impl<P: PipelinePicker> PipelinePicker for CachingPicker<'_, P> {
    fn pick(&self, candidates: Vec<ResolvedPipeline>) -> Result<Option<ResolvedPipeline>> {
        let names: Vec<String> = candidates.iter().map(|p| p.name.clone()).collect();
        let Some(chosen) = self.inner.pick(candidates)? else {
            return Ok(None);
        };

        let mut ordered = vec![chosen.name.clone()];
        ordered.extend(names.into_iter().filter(|n| *n != chosen.name));
        self.config.set_preferred_pipelines(&ordered)?;
        tracing::debug!("Cached preferred pipeline {}", chosen.name);
        Ok(Some(chosen))
    }
}

/// Resolves from the preferred pipelines in the config files.
pub struct RepoConfigPipelineResolver<'a> {
    config: &'a Config,
    picker: &'a dyn PipelinePicker,
}

impl<'a> RepoConfigPipelineResolver<'a> {
    pub fn new(config: &'a Config, picker: &'a dyn PipelinePicker) -> Self {
        Self { config, picker }
    }
}

#[async_trait]
impl Resolver<ResolvedPipeline> for RepoConfigPipelineResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedPipeline>> {
        let org = self.config.organization_slug();
        if org.is_empty() {
            return Ok(Resolved::Skip);
        }
        let mut candidates: Vec<ResolvedPipeline> = self
            .config
            .preferred_pipelines()
            .into_iter()
            .map(|name| ResolvedPipeline::new(org.clone(), name))
            .collect();

        match candidates.len() {
            0 => Ok(Resolved::Skip),
            1 => Ok(Resolved::Found(candidates.remove(0))),
            _ => Ok(self.picker.pick(candidates)?.map_or(Resolved::Skip, Resolved::Found)),
        }
    }
}

/// Resolves by asking the API which pipelines build the `origin` remote.
pub struct RemotePipelineResolver<'a> {
    client: &'a BuildkiteClient,
    org: String,
    remote_urls: Vec<String>,
    picker: &'a dyn PipelinePicker,
}

impl<'a> RemotePipelineResolver<'a> {
    pub fn new(
        client: &'a BuildkiteClient,
        org: impl Into<String>,
        remote_urls: Vec<String>,
        picker: &'a dyn PipelinePicker,
    ) -> Self {
        Self {
            client,
            org: org.into(),
            remote_urls,
            picker,
        }
    }
}

#[async_trait]
impl Resolver<ResolvedPipeline> for RemotePipelineResolver<'_> {
    async fn resolve(&self) -> Result<Resolved<ResolvedPipeline>> {
        if self.org.is_empty() || self.remote_urls.is_empty() {
            return Ok(Resolved::Skip);
        }

        let mut slugs: Vec<String> = Vec::new();
        for url in &self.remote_urls {
            for slug in self.client.pipelines_for_repository(&self.org, url).await? {
                if !slugs.contains(&slug) {
                    slugs.push(slug);
                }
            }
        }
        tracing::debug!("{} pipeline(s) match the origin remote", slugs.len());

        let mut candidates: Vec<ResolvedPipeline> = slugs
            .into_iter()
            .map(|slug| ResolvedPipeline::new(self.org.clone(), slug))
            .collect();
        match candidates.len() {
            0 => Ok(Resolved::Skip),
            1 => Ok(Resolved::Found(candidates.remove(0))),
            _ => Ok(self.picker.pick(candidates)?.map_or(Resolved::Skip, Resolved::Found)),
        }
    }
}
