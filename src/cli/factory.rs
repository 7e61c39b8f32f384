//
//  buildkite-cli
//  cli/factory.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Per-invocation dependencies shared by every command.
//!
//! The [`Factory`] owns the loaded configuration, the git facts read once at
//! startup and a lazily built API client. Commands ask it for the active
//! organization, an [`OutputWriter`], and the standard resolver chains.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use once_cell::sync::OnceCell;

use crate::api::{BuildkiteClient, RetryPolicy};
use crate::config::Config;
use crate::context::{
    AggregateResolver, BranchFromFlag, BuildArgResolver, CachingPicker, CurrentBranch, CurrentUser,
    FirstPicker, FlagPipelineResolver, GitContext, InteractivePicker, PipelinePicker,
    PositionalPipelineResolver, QueryBuildResolver, RemotePipelineResolver,
    RepoConfigPipelineResolver, ResolvedBuild, ResolvedPipeline, StrictPicker, UserFromFlag, When,
};
use crate::error::CliError;
use crate::fetch::{Confirmer, PromptConfirmer};
use crate::interactive::prompt_confirm_with_default;
use crate::output::{spin_while, OutputWriter};

use super::GlobalOptions;

/// Identifies one build on the command line.
///
/// With no explicit build, the most recent build matching the branch and
/// user filters is used, defaulting to the current git branch.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildTarget {
    /// Build number, ORG/PIPELINE/NUMBER, or build URL
    pub build: Option<String>,

    /// Pipeline as NAME, ORG/NAME, or URL
    #[arg(long, short = 'p')]
    pub pipeline: Option<String>,

    /// Branch to find the most recent build on
    #[arg(long, short = 'b')]
    pub branch: Vec<String>,

    /// Find the most recent build created by this user ID
    #[arg(long, short = 'u')]
    pub user: Option<String>,

    /// Find the most recent build created by you
    #[arg(long)]
    pub mine: bool,
}

/// Pickers used when several pipelines match.
///
/// Interactive sessions ask and remember the choice; otherwise the repo
/// config takes its first entry and a remote lookup must be unambiguous.
pub struct Pickers<'a> {
    repo: Box<dyn PipelinePicker + 'a>,
    remote: Box<dyn PipelinePicker + 'a>,
}

impl<'a> Pickers<'a> {
    pub fn repo(&self) -> &(dyn PipelinePicker + 'a) {
        self.repo.as_ref()
    }

    pub fn remote(&self) -> &(dyn PipelinePicker + 'a) {
        self.remote.as_ref()
    }
}

/// Per-invocation dependencies.
pub struct Factory {
    global: GlobalOptions,
    config: Config,
    origin_urls: Vec<String>,
    current_branch: Option<String>,
    client: OnceCell<Arc<BuildkiteClient>>,
}

impl Factory {
    /// Loads configuration and reads the surrounding git repository.
    pub fn new(global: GlobalOptions) -> Result<Self> {
        let config = Config::load()?;
        let git = GitContext::discover();
        Ok(Self::with_config(global, config, git.as_ref()))
    }

    pub fn with_config(global: GlobalOptions, config: Config, git: Option<&GitContext>) -> Self {
        Self {
            global,
            config,
            origin_urls: git.map(GitContext::origin_urls).unwrap_or_default(),
            current_branch: git.and_then(GitContext::current_branch),
            client: OnceCell::new(),
        }
    }

    pub fn global(&self) -> &GlobalOptions {
        &self.global
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_branch(&self) -> Option<&str> {
        self.current_branch.as_deref()
    }

    /// URLs of the repository's `origin` remote, fetch URL first.
    pub fn origin_urls(&self) -> &[String] {
        &self.origin_urls
    }

    /// The active organization.
    ///
    /// # Errors
    ///
    /// A configuration error pointing at `bk use` when none is selected.
    pub fn organization(&self) -> Result<String> {
        let org = self.config.organization_slug();
        if org.is_empty() {
            return Err(CliError::configuration("No organization selected")
                .with_suggestions([
                    "Run `bk use <org>` to select an organization",
                    "Run `bk configure` to add one",
                ])
                .into());
        }
        Ok(org)
    }

    /// The API client for the active organization, built on first use.
    ///
    /// # Errors
    ///
    /// An authentication error pointing at `bk configure` when no token is
    /// available.
    pub fn client(&self) -> Result<Arc<BuildkiteClient>> {
        self.client
            .get_or_try_init(|| {
                let token = self
                    .config
                    .api_token()?
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        CliError::authentication("No API token configured").with_suggestions([
                            "Run `bk configure` to add an API token",
                            "Or set BUILDKITE_API_TOKEN",
                        ])
                    })?;
                Ok(Arc::new(self.client_for_token(token)?))
            })
            .cloned()
    }

    /// A client for an explicit token, with the endpoint and retry options
    /// applied.
    pub fn client_for_token(&self, token: impl Into<String>) -> Result<BuildkiteClient> {
        let mut client = BuildkiteClient::new(token)?;
        if let Some(url) = &self.global.rest_endpoint {
            client = client.with_base_url(url.clone());
        }
        if let Some(url) = &self.global.graphql_endpoint {
            client = client.with_graphql_url(url.clone());
        }

        let policy = RetryPolicy::new(
            self.global.max_retries,
            Duration::from_secs(self.global.max_retry_delay),
        )
        .with_callback(Arc::new(|attempt, delay| {
            tracing::warn!("Rate limited, retrying in {}s (retry {})", delay.as_secs(), attempt + 1);
        }));
        Ok(client.with_retry(policy))
    }

    /// Writer honouring `--output`, `--no-pager` and `--quiet`.
    pub fn output(&self) -> OutputWriter {
        OutputWriter::new(self.global.output)
            .with_pager(!self.global.no_pager)
            .with_quiet(self.global.quiet)
    }

    /// True when prompts may be shown.
    pub fn is_interactive(&self) -> bool {
        !self.global.no_input && console::Term::stdout().is_term() && console::Term::stderr().is_term()
    }

    /// Asks before a destructive action.
    ///
    /// Nothing is asked when `skip` is set or prompts are unavailable.
    /// Declining is a user-aborted error.
    pub fn confirm(&self, message: &str, skip: bool) -> Result<()> {
        if skip || !self.is_interactive() {
            return Ok(());
        }
        if prompt_confirm_with_default(message, false)? {
            Ok(())
        } else {
            Err(CliError::user_aborted("Cancelled").into())
        }
    }

    /// Confirmer for long searches; only text output on a terminal asks.
    pub fn confirmer(&self) -> Option<&'static dyn Confirmer> {
        (self.global.output.is_text() && self.is_interactive()).then_some(&PromptConfirmer as &dyn Confirmer)
    }

    pub fn pickers(&self) -> Pickers<'_> {
        if self.is_interactive() {
            Pickers {
                repo: Box::new(CachingPicker::new(InteractivePicker, &self.config)),
                remote: Box::new(CachingPicker::new(InteractivePicker, &self.config)),
            }
        } else {
            Pickers {
                repo: Box::new(FirstPicker),
                remote: Box::new(StrictPicker),
            }
        }
    }

    /// The standard pipeline chain: flag, positional, repo config, then
    /// the git remote.
    pub fn pipeline_chain<'a>(
        &'a self,
        client: &'a BuildkiteClient,
        pickers: &'a Pickers<'a>,
        flag: Option<&'a str>,
        positional: &'a [String],
    ) -> AggregateResolver<'a, ResolvedPipeline> {
        let org = self.config.organization_slug();
        AggregateResolver::new()
            .with(FlagPipelineResolver::new(flag, org.clone()))
            .with(PositionalPipelineResolver::new(positional, 0, org.clone()))
            .with(RepoConfigPipelineResolver::new(&self.config, pickers.repo()))
            .with(RemotePipelineResolver::new(
                client,
                org,
                self.origin_urls.clone(),
                pickers.remote(),
            ))
    }

    /// Resolves a pipeline or fails with guidance.
    pub async fn resolve_pipeline(
        &self,
        client: &BuildkiteClient,
        flag: Option<&str>,
        positional: &[String],
    ) -> Result<ResolvedPipeline> {
        let pickers = self.pickers();
        let chain = self.pipeline_chain(client, &pickers, flag, positional);
        chain.resolve().await?.ok_or_else(|| {
            CliError::validation("Could not determine which pipeline to use")
                .with_suggestions([
                    "Pass the pipeline as NAME, ORG/NAME or its URL",
                    "Run the command inside a repository that has a Buildkite pipeline",
                ])
                .into()
        })
    }

    /// Resolves the build named by `target`.
    ///
    /// An explicit build wins; otherwise the most recent build matching the
    /// branch, user, `--mine` and current-branch defaults is used.
    pub async fn resolve_build(&self, client: &BuildkiteClient, target: &BuildTarget) -> Result<ResolvedBuild> {
        let pickers = self.pickers();
        let pipelines = self.pipeline_chain(client, &pickers, target.pipeline.as_deref(), &[]);
        let chain = AggregateResolver::new()
            .with(BuildArgResolver::new(target.build.as_deref(), &pipelines))
            .with(
                QueryBuildResolver::new(client, &pipelines)
                    .with(BranchFromFlag(target.branch.clone()))
                    .with(UserFromFlag(target.user.clone()))
                    .with(When::new(target.mine, CurrentUser(client)))
                    .with(CurrentBranch(self.current_branch.clone())),
            );

        chain.resolve().await?.ok_or_else(|| {
            CliError::not_found("No matching build found")
                .with_suggestions(["Pass a build number, ORG/PIPELINE/NUMBER or a build URL"])
                .into()
        })
    }

    /// Runs `fut` behind a spinner unless `--quiet` is set.
    pub async fn spin<F, T>(&self, title: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        spin_while(title, self.global.quiet, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FileTokenStore;
    use crate::config::{EnvOverrides, USER_CONFIG_FILE};
    use crate::error::ErrorCategory;

    fn factory(dir: &tempfile::TempDir, env: EnvOverrides, global: GlobalOptions) -> Factory {
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let store = Box::new(FileTokenStore::new(user_path.clone()));
        let config = Config::from_parts(user_path, None, store, env).unwrap();
        Factory::with_config(global, config, None)
    }

    fn category(err: anyhow::Error) -> ErrorCategory {
        err.downcast::<CliError>().unwrap().category
    }

    #[test]
    fn test_missing_organization_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = factory(&dir, EnvOverrides::default(), GlobalOptions::default());
        assert_eq!(category(f.organization().unwrap_err()), ErrorCategory::Configuration);
    }

    #[test]
    fn test_missing_token_is_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvOverrides {
            organization: Some("acme".into()),
            ..Default::default()
        };
        let f = factory(&dir, env, GlobalOptions::default());
        assert_eq!(f.organization().unwrap(), "acme");
        assert_eq!(category(f.client().unwrap_err()), ErrorCategory::Authentication);
    }

    #[test]
    fn test_client_is_built_once() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvOverrides {
            api_token: Some("bkua_test".into()),
            organization: Some("acme".into()),
        };
        let f = factory(&dir, env, GlobalOptions::default());
        let first = f.client().unwrap();
        let second = f.client().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_resolve_build_from_url_needs_no_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvOverrides {
            api_token: Some("bkua_test".into()),
            organization: Some("other".into()),
        };
        let global = GlobalOptions {
            no_input: true,
            ..Default::default()
        };
        let f = factory(&dir, env, global);
        let client = f.client().unwrap();
        let target = BuildTarget {
            build: Some("https://buildkite.com/acme/web/builds/42".into()),
            ..Default::default()
        };
        let build = f.resolve_build(&client, &target).await.unwrap();
        assert_eq!(build, ResolvedBuild::new("acme", "web", 42));
    }

    #[tokio::test]
    async fn test_resolve_pipeline_without_any_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvOverrides {
            api_token: Some("bkua_test".into()),
            organization: Some("acme".into()),
        };
        let f = factory(&dir, env, GlobalOptions {
            no_input: true,
            ..Default::default()
        });
        let client = f.client().unwrap();
        let err = f.resolve_pipeline(&client, None, &[]).await.unwrap_err();
        assert_eq!(category(err), ErrorCategory::Validation);

        let found = f.resolve_pipeline(&client, Some("web"), &[]).await.unwrap();
        assert_eq!(found, ResolvedPipeline::new("acme", "web"));
    }
}
