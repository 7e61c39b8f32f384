//
//  buildkite-cli
//  api/pipelines.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Pipelines: view, create, and lookup by repository URL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{path_segment, BuildkiteClient};

/// A pipeline. Identity is `(organization, slug)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    #[serde(default)]
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub running_builds_count: Option<u64>,
    #[serde(default)]
    pub scheduled_builds_count: Option<u64>,
}

/// Request body for creating a pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeline {
    pub name: String,
    pub repository: String,
    pub configuration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

const PIPELINES_BY_REPOSITORY: &str = r#"
query PipelinesByRepository($org: ID!, $repository: PipelineRepositoryInput!) {
  organization(slug: $org) {
    pipelines(first: 100, repository: $repository) {
      edges { node { slug name repository { url } } }
    }
  }
}"#;

#[derive(Deserialize)]
struct OrganizationPipelines {
    organization: Option<PipelineConnectionOwner>,
}

#[derive(Deserialize)]
struct PipelineConnectionOwner {
    pipelines: Connection,
}

#[derive(Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct Edge {
    node: PipelineNode,
}

#[derive(Deserialize)]
struct PipelineNode {
    slug: String,
}

impl BuildkiteClient {
    pub async fn get_pipeline(&self, org: &str, slug: &str) -> Result<Pipeline> {
        let path = format!(
            "organizations/{}/pipelines/{}",
            path_segment(org),
            path_segment(slug)
        );
        self.get(&path).await
    }

    pub async fn create_pipeline(&self, org: &str, pipeline: &CreatePipeline) -> Result<Pipeline> {
        let path = format!("organizations/{}/pipelines", path_segment(org));
        self.post(&path, pipeline).await
    }

    /// Slugs of pipelines whose repository is exactly `repository_url`.
    pub async fn pipelines_for_repository(&self, org: &str, repository_url: &str) -> Result<Vec<String>> {
        let data: OrganizationPipelines = self
            .graphql(
                PIPELINES_BY_REPOSITORY,
                serde_json::json!({ "org": org, "repository": { "url": repository_url } }),
            )
            .await?;

        Ok(data
            .organization
            .map(|o| o.pipelines.edges.into_iter().map(|e| e.node.slug).collect())
            .unwrap_or_default())
    }
}
