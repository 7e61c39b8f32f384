//
//  buildkite-cli
//  api/builds.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Builds: listing with server-side filters, lookup, creation, cancel and
//! rebuild.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::jobs::Job;
use super::{path_segment, query_string, BuildkiteClient};

/// A build of a pipeline.
///
/// Identity is `(organization, pipeline, number)`; see [`Build::org_slug`]
/// and [`Build::pipeline_slug`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    #[serde(default)]
    pub id: String,
    pub number: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub meta_data: BTreeMap<String, String>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub pipeline: Option<BuildPipeline>,
}

/// The user that created a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creator {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// The pipeline summary embedded in a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildPipeline {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

impl Build {
    /// Organization slug, from the build's API URL.
    pub fn org_slug(&self) -> Option<&str> {
        segment_after(&self.url, "organizations")
    }

    /// Pipeline slug, from the embedded pipeline or the API URL.
    pub fn pipeline_slug(&self) -> Option<&str> {
        match &self.pipeline {
            Some(p) if !p.slug.is_empty() => Some(p.slug.as_str()),
            _ => segment_after(&self.url, "pipelines"),
        }
    }

    /// First line of the commit message.
    pub fn headline(&self) -> &str {
        self.message
            .as_deref()
            .and_then(|m| m.lines().next())
            .unwrap_or_default()
    }

    /// True once the build can no longer change state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state.as_str(),
            "passed" | "failed" | "canceled" | "skipped" | "not_run"
        ) || (self.state == "blocked" && !self.jobs.iter().any(Job::is_active))
    }
}

fn segment_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let mut parts = url.split('/');
    parts.find(|p| *p == marker)?;
    parts.next().filter(|s| !s.is_empty())
}

/// Query options for listing builds.
///
/// Every field is a server-side filter; unset fields are omitted from the
/// query string.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::api::BuildsListOptions;
///
/// let opts = BuildsListOptions {
///     per_page: Some(1),
///     branch: vec!["main".to_string()],
///     ..Default::default()
/// };
/// assert_eq!(opts.to_query(), "?per_page=1&branch%5B%5D=main");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildsListOptions {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub state: Vec<String>,
    pub branch: Vec<String>,
    pub creator: Option<String>,
    pub commit: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub meta_data: BTreeMap<String, String>,
}

impl BuildsListOptions {
    /// Renders the options as an encoded query string.
    pub fn to_query(&self) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page".into(), page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page".into(), per_page.to_string()));
        }
        for state in &self.state {
            pairs.push(("state[]".into(), state.clone()));
        }
        for branch in &self.branch {
            pairs.push(("branch[]".into(), branch.clone()));
        }
        if let Some(creator) = &self.creator {
            pairs.push(("creator".into(), creator.clone()));
        }
        if let Some(commit) = &self.commit {
            pairs.push(("commit".into(), commit.clone()));
        }
        if let Some(from) = self.created_from {
            pairs.push((
                "created_from".into(),
                from.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(to) = self.created_to {
            pairs.push((
                "created_to".into(),
                to.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        for (key, value) in &self.meta_data {
            pairs.push((format!("meta_data[{key}]"), value.clone()));
        }
        query_string(&pairs)
    }
}

/// Request body for creating a build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateBuild {
    pub commit: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore_pipeline_branch_filters: bool,
}

pub(crate) fn build_path(org: &str, pipeline: &str, number: u64) -> String {
    format!(
        "organizations/{}/pipelines/{}/builds/{}",
        path_segment(org),
        path_segment(pipeline),
        number
    )
}

impl BuildkiteClient {
    /// Lists builds for a pipeline, or across the organization when
    /// `pipeline` is `None`.
    pub async fn list_builds(
        &self,
        org: &str,
        pipeline: Option<&str>,
        options: &BuildsListOptions,
    ) -> Result<Vec<Build>> {
        let base = match pipeline {
            Some(p) => format!(
                "organizations/{}/pipelines/{}/builds",
                path_segment(org),
                path_segment(p)
            ),
            None => format!("organizations/{}/builds", path_segment(org)),
        };
        self.get(&format!("{}{}", base, options.to_query())).await
    }

    pub async fn get_build(&self, org: &str, pipeline: &str, number: u64) -> Result<Build> {
        self.get(&build_path(org, pipeline, number)).await
    }

    pub async fn create_build(&self, org: &str, pipeline: &str, build: &CreateBuild) -> Result<Build> {
        let path = format!(
            "organizations/{}/pipelines/{}/builds",
            path_segment(org),
            path_segment(pipeline)
        );
        self.post(&path, build).await
    }

    pub async fn cancel_build(&self, org: &str, pipeline: &str, number: u64) -> Result<Build> {
        let path = format!("{}/cancel", build_path(org, pipeline, number));
        self.put(&path, &serde_json::json!({})).await
    }

    pub async fn rebuild_build(&self, org: &str, pipeline: &str, number: u64) -> Result<Build> {
        let path = format!("{}/rebuild", build_path(org, pipeline, number));
        self.put(&path, &serde_json::json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Build {
        serde_json::from_str(
            r#"{
                "id": "b-1",
                "number": 42,
                "state": "passed",
                "message": "Fix flaky test\n\nLonger body",
                "branch": "main",
                "commit": "abc123",
                "url": "https://api.buildkite.com/v2/organizations/acme/pipelines/web/builds/42",
                "web_url": "https://buildkite.com/acme/web/builds/42",
                "created_at": "2024-05-01T10:00:00Z",
                "started_at": "2024-05-01T10:00:05Z",
                "finished_at": "2024-05-01T10:02:05Z",
                "jobs": [],
                "unknown_field": {"ignored": true}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_identity_from_url() {
        let build = sample();
        assert_eq!(build.org_slug(), Some("acme"));
        assert_eq!(build.pipeline_slug(), Some("web"));
        assert_eq!(build.headline(), "Fix flaky test");
        assert!(build.is_finished());
    }

    #[test]
    fn test_build_survives_json_round_trip() {
        let build = sample();
        let back: Build = serde_json::from_str(&serde_json::to_string(&build).unwrap()).unwrap();
        assert_eq!(back.number, build.number);
        assert_eq!(back.org_slug(), build.org_slug());
    }

    #[test]
    fn test_query_includes_all_server_filters() {
        let mut meta = BTreeMap::new();
        meta.insert("release".to_string(), "v1".to_string());
        let opts = BuildsListOptions {
            page: Some(2),
            per_page: Some(100),
            state: vec!["failed".into(), "canceled".into()],
            branch: vec!["main".into()],
            creator: Some("u-1".into()),
            commit: Some("abc".into()),
            created_from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            created_to: None,
            meta_data: meta,
        };
        assert_eq!(
            opts.to_query(),
            "?page=2&per_page=100&state%5B%5D=failed&state%5B%5D=canceled&branch%5B%5D=main\
             &creator=u-1&commit=abc&created_from=2024-01-01T00%3A00%3A00Z&meta_data%5Brelease%5D=v1"
        );
    }

    #[test]
    fn test_create_body_omits_defaults() {
        let body = CreateBuild {
            commit: "HEAD".into(),
            branch: "main".into(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"commit":"HEAD","branch":"main"}"#
        );
    }

    #[tokio::test]
    async fn test_list_builds_for_organization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("per_page".into(), "1".into()),
                mockito::Matcher::UrlEncoded("state[]".into(), "running".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"number": 7, "state": "running"}]"#)
            .create_async()
            .await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        let opts = BuildsListOptions {
            per_page: Some(1),
            state: vec!["running".into()],
            ..Default::default()
        };
        let builds = client.list_builds("acme", None, &opts).await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].number, 7);
        mock.assert_async().await;
    }
}
