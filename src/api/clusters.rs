//
//  buildkite-cli
//  api/clusters.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Clusters and their queues (REST).

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{path_segment, BuildkiteClient};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub graphql_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub default_queue_id: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Filled in by `cluster view`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queues: Vec<Queue>,
}

/// A named agent pool within a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Queue {
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl BuildkiteClient {
    pub async fn list_clusters(&self, org: &str) -> Result<Vec<Cluster>> {
        self.get(&format!("organizations/{}/clusters?per_page=100", path_segment(org)))
            .await
    }

    pub async fn get_cluster(&self, org: &str, id: &str) -> Result<Cluster> {
        self.get(&format!(
            "organizations/{}/clusters/{}",
            path_segment(org),
            path_segment(id)
        ))
        .await
    }

    pub async fn list_cluster_queues(&self, org: &str, cluster_id: &str) -> Result<Vec<Queue>> {
        self.get(&format!(
            "organizations/{}/clusters/{}/queues?per_page=100",
            path_segment(org),
            path_segment(cluster_id)
        ))
        .await
    }
}
