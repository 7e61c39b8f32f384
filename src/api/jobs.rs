//
//  buildkite-cli
//  api/jobs.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Jobs and job logs (REST). Job mutations go through GraphQL, see
//! [`super::graphql`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builds::build_path;
use super::{path_segment, BuildkiteClient};

/// A job within a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "label")]
    pub name: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub agent_query_rules: Vec<String>,
    #[serde(default)]
    pub exit_status: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub agent: Option<JobAgent>,
    /// The build this job belongs to. Filled in when jobs are listed
    /// outside their build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildRef>,
}

/// Minimal agent summary embedded in a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAgent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Back-reference from a job to its build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRef {
    pub org: String,
    pub pipeline: String,
    pub number: u64,
}

impl Job {
    /// Display label, falling back to the command and then the type.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.command.as_deref())
            .unwrap_or(&self.job_type)
    }

    pub fn state(&self) -> &str {
        self.state.as_deref().unwrap_or_default()
    }

    /// The `queue=` agent query rule, if any.
    pub fn queue(&self) -> Option<&str> {
        self.agent_query_rules
            .iter()
            .find_map(|rule| rule.strip_prefix("queue="))
    }

    /// True while the job may still run or change state.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            "pending" | "waiting" | "scheduled" | "assigned" | "accepted" | "running" | "canceling" | "timing_out"
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state(), "failed" | "timed_out" | "broken")
            || (self.state() == "finished" && self.exit_status.is_some_and(|c| c != 0))
    }
}

/// A job's log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub size: u64,
}

impl BuildkiteClient {
    pub async fn get_job_log(
        &self,
        org: &str,
        pipeline: &str,
        build: u64,
        job_id: &str,
    ) -> Result<JobLog> {
        let path = format!(
            "{}/jobs/{}/log",
            build_path(org, pipeline, build),
            path_segment(job_id)
        );
        self.get(&path).await
    }
}
