//
//  buildkite-cli
//  api/graphql.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # GraphQL Operations
//!
//! Operations only exposed through GraphQL: job mutations, locating a job's
//! build from its UUID, and listing jobs by cluster queue.
//!
//! REST UUIDs are turned into GraphQL node IDs with [`generate_graphql_id`].

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::jobs::{BuildRef, Job, JobAgent};
use super::BuildkiteClient;
use crate::error::CliError;
use crate::workers::{run_bounded, MAX_PARALLEL_LOOKUPS};

/// Node ID prefix for command jobs.
pub const COMMAND_JOB_PREFIX: &str = "JobTypeCommand---";

/// Node ID prefix for block jobs.
pub const BLOCK_JOB_PREFIX: &str = "JobTypeBlock---";

/// Builds a GraphQL node ID from a type prefix and a REST UUID.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::api::graphql::{generate_graphql_id, COMMAND_JOB_PREFIX};
///
/// assert_eq!(generate_graphql_id(COMMAND_JOB_PREFIX, "abc"), "Sm9iVHlwZUNvbW1hbmQtLS1hYmM=");
/// ```
pub fn generate_graphql_id(prefix: &str, uuid: &str) -> String {
    STANDARD.encode(format!("{prefix}{uuid}"))
}

/// Maps a GraphQL job state onto the REST vocabulary.
///
/// `FINISHED` splits into `passed`/`failed` on the exit status; the pre-run
/// states collapse into `scheduled`; everything else is lowercased.
pub fn translate_graphql_state(state: &str, exit_status: Option<&str>) -> String {
    match state {
        "FINISHED" => match exit_status.map(str::trim) {
            Some("0") => "passed".to_string(),
            _ => "failed".to_string(),
        },
        "RUNNING" => "running".to_string(),
        "SCHEDULED" | "ASSIGNED" | "ACCEPTED" => "scheduled".to_string(),
        "CANCELED" | "CANCELING" => "canceled".to_string(),
        "TIMED_OUT" | "TIMING_OUT" => "timed_out".to_string(),
        other => other.to_lowercase(),
    }
}

const CLUSTERS: &str = r#"
query Clusters($org: ID!, $cursor: String) {
  organization(slug: $org) {
    clusters(first: 100, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      edges { node { id name } }
    }
  }
}"#;

const CLUSTER_QUEUES: &str = r#"
query ClusterQueues($org: ID!, $cluster: ID!, $cursor: String) {
  organization(slug: $org) {
    cluster(id: $cluster) {
      queues(first: 100, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        edges { node { id key } }
      }
    }
  }
}"#;

const JOBS_BY_QUEUE: &str = r#"
query JobsByQueue($org: ID!, $queues: [ID!], $first: Int!, $cursor: String) {
  organization(slug: $org) {
    jobs(first: $first, after: $cursor, type: [COMMAND], clusterQueue: $queues, order: RECENTLY_CREATED) {
      pageInfo { hasNextPage endCursor }
      edges {
        node {
          ... on JobTypeCommand {
            uuid label command state exitStatus agentQueryRules url
            createdAt startedAt finishedAt
            agent { uuid name hostname }
            build { number pipeline { slug } }
          }
        }
      }
    }
  }
}"#;

const JOB_LOCATION: &str = r#"
query JobLocation($id: ID!) {
  node(id: $id) {
    ... on JobTypeCommand {
      uuid
      build { number pipeline { slug organization { slug } } }
    }
  }
}"#;

const RETRY_JOB: &str = r#"
mutation RetryJob($id: ID!) {
  jobTypeCommandRetry(input: { id: $id }) { jobTypeCommand { uuid state url } }
}"#;

const CANCEL_JOB: &str = r#"
mutation CancelJob($id: ID!) {
  jobTypeCommandCancel(input: { id: $id }) { jobTypeCommand { uuid state } }
}"#;

const REPRIORITIZE_JOB: &str = r#"
mutation ReprioritizeJob($id: ID!, $priority: Int!) {
  jobTypeCommandUpdate(input: { id: $id, priority: $priority }) { jobTypeCommand { uuid priority { number } } }
}"#;

const UNBLOCK_JOB: &str = r#"
mutation UnblockJob($id: ID!, $fields: JSON) {
  jobTypeBlockUnblock(input: { id: $id, fields: $fields }) { jobTypeBlock { uuid state } }
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "N: Deserialize<'de>"))]
struct Connection<N> {
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<Edge<N>>,
}

#[derive(Debug, Deserialize)]
struct Edge<N> {
    node: N,
}

#[derive(Debug, Deserialize)]
struct ClustersData {
    organization: Option<ClustersOrg>,
}

#[derive(Debug, Deserialize)]
struct ClustersOrg {
    clusters: Connection<IdNode>,
}

#[derive(Debug, Deserialize)]
struct IdNode {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueuesData {
    organization: Option<QueuesOrg>,
}

#[derive(Debug, Deserialize)]
struct QueuesOrg {
    cluster: Option<QueuesCluster>,
}

#[derive(Debug, Deserialize)]
struct QueuesCluster {
    queues: Connection<QueueNode>,
}

#[derive(Debug, Deserialize)]
struct QueueNode {
    id: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct JobsData {
    organization: Option<JobsOrg>,
}

#[derive(Debug, Deserialize)]
struct JobsOrg {
    jobs: Connection<GraphQLJob>,
}

/// A command job as returned by GraphQL. Non-command nodes decode with
/// every field absent and are skipped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQLJob {
    uuid: Option<String>,
    label: Option<String>,
    command: Option<String>,
    state: Option<String>,
    exit_status: Option<String>,
    #[serde(default)]
    agent_query_rules: Vec<String>,
    url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    agent: Option<GraphQLAgent>,
    build: Option<GraphQLBuild>,
}

#[derive(Debug, Deserialize)]
struct GraphQLAgent {
    uuid: String,
    #[serde(default)]
    name: String,
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQLBuild {
    number: u64,
    pipeline: GraphQLPipeline,
}

#[derive(Debug, Deserialize)]
struct GraphQLPipeline {
    slug: String,
    organization: Option<GraphQLOrg>,
}

#[derive(Debug, Deserialize)]
struct GraphQLOrg {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct NodeData<N> {
    node: Option<N>,
}

impl GraphQLJob {
    fn into_job(self, org: &str) -> Option<Job> {
        let uuid = self.uuid?;
        let state = self
            .state
            .as_deref()
            .map(|s| translate_graphql_state(s, self.exit_status.as_deref()));
        Some(Job {
            id: uuid,
            job_type: "script".to_string(),
            state,
            name: self.label,
            command: self.command,
            agent_query_rules: self.agent_query_rules,
            exit_status: self.exit_status.and_then(|s| s.parse().ok()),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            web_url: self.url,
            agent: self.agent.map(|a| JobAgent {
                id: a.uuid,
                name: a.name,
                hostname: a.hostname,
            }),
            build: self.build.map(|b| BuildRef {
                org: org.to_string(),
                pipeline: b.pipeline.slug,
                number: b.number,
            }),
        })
    }
}

/// A page of jobs plus the cursor for the next one.
#[derive(Debug)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub next_cursor: Option<String>,
}

impl BuildkiteClient {
    async fn cluster_ids(&self, org: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data: ClustersData = self
                .graphql(CLUSTERS, serde_json::json!({ "org": org, "cursor": cursor }))
                .await
                .context("Failed to list clusters")?;
            let Some(organization) = data.organization else {
                return Err(CliError::not_found(format!("Organization {org} not found")).into());
            };
            let page = organization.clusters;
            ids.extend(page.edges.into_iter().map(|e| e.node.id));
            match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn matching_queue_ids(&self, org: &str, cluster_id: &str, queue: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data: QueuesData = self
                .graphql(
                    CLUSTER_QUEUES,
                    serde_json::json!({ "org": org, "cluster": cluster_id, "cursor": cursor }),
                )
                .await?;
            let Some(cluster) = data.organization.and_then(|o| o.cluster) else {
                break;
            };
            let page = cluster.queues;
            ids.extend(
                page.edges
                    .into_iter()
                    .filter(|e| e.node.key.eq_ignore_ascii_case(queue))
                    .map(|e| e.node.id),
            );
            match (page.page_info.has_next_page, page.page_info.end_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(ids)
    }

    /// GraphQL IDs of every queue in the organization whose key matches
    /// `queue` case-insensitively.
    ///
    /// Clusters are enumerated first, then their queues are looked up with
    /// at most [`MAX_PARALLEL_LOOKUPS`] requests in flight.
    pub async fn queue_ids(self: &Arc<Self>, org: &str, queue: &str) -> Result<Vec<String>> {
        let clusters = self.cluster_ids(org).await?;
        tracing::debug!("Searching {} cluster(s) for queue {}", clusters.len(), queue);

        let items = clusters.into_iter().map(|id| (id.clone(), id)).collect();
        let outcomes = run_bounded(items, MAX_PARALLEL_LOOKUPS, None, |cluster_id| {
            let client = Arc::clone(self);
            let org = org.to_string();
            let queue = queue.to_string();
            async move { client.matching_queue_ids(&org, &cluster_id, &queue).await }
        })
        .await;

        let mut ids = Vec::new();
        for outcome in outcomes {
            ids.extend(outcome.result?);
        }
        Ok(ids)
    }

    /// One page of command jobs running on the given queues.
    pub async fn jobs_by_queue(
        &self,
        org: &str,
        queue_ids: &[String],
        first: usize,
        cursor: Option<&str>,
    ) -> Result<JobPage> {
        let data: JobsData = self
            .graphql(
                JOBS_BY_QUEUE,
                serde_json::json!({
                    "org": org,
                    "queues": queue_ids,
                    "first": first,
                    "cursor": cursor,
                }),
            )
            .await?;
        let Some(organization) = data.organization else {
            return Err(CliError::not_found(format!("Organization {org} not found")).into());
        };
        let page = organization.jobs;
        let next_cursor = match (page.page_info.has_next_page, page.page_info.end_cursor) {
            (true, Some(next)) => Some(next),
            _ => None,
        };
        Ok(JobPage {
            jobs: page
                .edges
                .into_iter()
                .filter_map(|e| e.node.into_job(org))
                .collect(),
            next_cursor,
        })
    }

    /// Finds the build that owns a command job.
    pub async fn locate_job(&self, job_uuid: &str) -> Result<BuildRef> {
        let data: NodeData<GraphQLJob> = self
            .graphql(
                JOB_LOCATION,
                serde_json::json!({ "id": generate_graphql_id(COMMAND_JOB_PREFIX, job_uuid) }),
            )
            .await?;
        let build = data
            .node
            .and_then(|n| n.build)
            .ok_or_else(|| CliError::not_found(format!("Job {job_uuid} not found")))?;
        let org = build
            .pipeline
            .organization
            .map(|o| o.slug)
            .unwrap_or_default();
        Ok(BuildRef {
            org,
            pipeline: build.pipeline.slug,
            number: build.number,
        })
    }

    pub async fn retry_job(&self, job_uuid: &str) -> Result<serde_json::Value> {
        self.graphql(
            RETRY_JOB,
            serde_json::json!({ "id": generate_graphql_id(COMMAND_JOB_PREFIX, job_uuid) }),
        )
        .await
    }

    pub async fn cancel_job(&self, job_uuid: &str) -> Result<serde_json::Value> {
        self.graphql(
            CANCEL_JOB,
            serde_json::json!({ "id": generate_graphql_id(COMMAND_JOB_PREFIX, job_uuid) }),
        )
        .await
    }

    pub async fn reprioritize_job(&self, job_uuid: &str, priority: i64) -> Result<serde_json::Value> {
        self.graphql(
            REPRIORITIZE_JOB,
            serde_json::json!({
                "id": generate_graphql_id(COMMAND_JOB_PREFIX, job_uuid),
                "priority": priority,
            }),
        )
        .await
    }

    /// Unblocks a block step, optionally submitting its form fields.
    pub async fn unblock_job(
        &self,
        job_uuid: &str,
        fields: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let fields = fields.map(|f| f.to_string());
        self.graphql(
            UNBLOCK_JOB,
            serde_json::json!({
                "id": generate_graphql_id(BLOCK_JOB_PREFIX, job_uuid),
                "fields": fields,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_id_is_base64_of_prefix_and_uuid() {
        let id = generate_graphql_id(BLOCK_JOB_PREFIX, "0190-ffff");
        let decoded = STANDARD.decode(id).unwrap();
        assert_eq!(decoded, b"JobTypeBlock---0190-ffff");
    }

    #[test]
    fn test_state_translation_table() {
        assert_eq!(translate_graphql_state("FINISHED", Some("0")), "passed");
        assert_eq!(translate_graphql_state("FINISHED", Some("1")), "failed");
        assert_eq!(translate_graphql_state("FINISHED", None), "failed");
        assert_eq!(translate_graphql_state("RUNNING", None), "running");
        assert_eq!(translate_graphql_state("ASSIGNED", None), "scheduled");
        assert_eq!(translate_graphql_state("ACCEPTED", None), "scheduled");
        assert_eq!(translate_graphql_state("CANCELING", None), "canceled");
        assert_eq!(translate_graphql_state("TIMING_OUT", None), "timed_out");
        assert_eq!(translate_graphql_state("BLOCKED", None), "blocked");
        assert_eq!(translate_graphql_state("WAITING_FAILED", None), "waiting_failed");
    }

    fn client(server: &mockito::Server) -> Arc<BuildkiteClient> {
        Arc::new(
            BuildkiteClient::new("t")
                .unwrap()
                .with_graphql_url(format!("{}/graphql", server.url())),
        )
    }

    #[tokio::test]
    async fn test_queue_ids_across_clusters() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .match_body(mockito::Matcher::Regex("query Clusters".into()))
            .with_status(200)
            .with_body(
                r#"{"data":{"organization":{"clusters":{
                    "pageInfo":{"hasNextPage":false,"endCursor":null},
                    "edges":[{"node":{"id":"C1","name":"one"}},{"node":{"id":"C2","name":"two"}}]}}}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/graphql")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("query ClusterQueues".into()),
                mockito::Matcher::PartialJson(serde_json::json!({"variables": {"cluster": "C1"}})),
            ]))
            .with_status(200)
            .with_body(
                r#"{"data":{"organization":{"cluster":{"queues":{
                    "pageInfo":{"hasNextPage":false,"endCursor":null},
                    "edges":[{"node":{"id":"Q1","key":"Deploy"}},{"node":{"id":"Q2","key":"test"}}]}}}}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/graphql")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("query ClusterQueues".into()),
                mockito::Matcher::PartialJson(serde_json::json!({"variables": {"cluster": "C2"}})),
            ]))
            .with_status(200)
            .with_body(
                r#"{"data":{"organization":{"cluster":{"queues":{
                    "pageInfo":{"hasNextPage":false,"endCursor":null},
                    "edges":[{"node":{"id":"Q3","key":"deploy"}}]}}}}}"#,
            )
            .create_async()
            .await;

        let ids = client(&server).queue_ids("acme", "deploy").await.unwrap();
        assert_eq!(ids, vec!["Q1", "Q3"]);
    }

    #[tokio::test]
    async fn test_jobs_by_queue_translates_states() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(
                r#"{"data":{"organization":{"jobs":{
                    "pageInfo":{"hasNextPage":true,"endCursor":"abc"},
                    "edges":[
                      {"node":{"uuid":"j1","label":"test","state":"FINISHED","exitStatus":"0",
                               "agentQueryRules":["queue=deploy"],
                               "build":{"number":12,"pipeline":{"slug":"web"}}}},
                      {"node":{}}
                    ]}}}}"#,
            )
            .create_async()
            .await;

        let page = client(&server)
            .jobs_by_queue("acme", &["Q1".to_string()], 50, None)
            .await
            .unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].state(), "passed");
        assert_eq!(page.jobs[0].build.as_ref().unwrap().number, 12);
    }

    #[test]
    fn test_connection_without_edges_is_empty() {
        let conn: Connection<IdNode> =
            serde_json::from_str(r#"{"pageInfo":{"hasNextPage":false,"endCursor":null}}"#).unwrap();
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);
    }
}
