//
//  buildkite-cli
//  api/agents.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Agents: list, view and stop.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::jobs::Job;
use super::{path_segment, query_string, BuildkiteClient};

/// A connected (or recently connected) agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub connection_state: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub meta_data: Vec<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_job_finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub job: Option<Box<Job>>,
}

impl Agent {
    /// The queue this agent serves, from its `queue=` tag. Agents without
    /// one serve `default`.
    pub fn queue(&self) -> &str {
        self.meta_data
            .iter()
            .find_map(|tag| tag.strip_prefix("queue="))
            .unwrap_or("default")
    }

    /// Running or idle, derived from whether a job is assigned.
    pub fn activity(&self) -> &'static str {
        if self.job.is_some() {
            "running"
        } else {
            "idle"
        }
    }
}

/// Server-side filters for listing agents.
#[derive(Debug, Clone, Default)]
pub struct AgentListOptions {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub version: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AgentListOptions {
    pub fn to_query(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        if let Some(name) = &self.name {
            pairs.push(("name", name.clone()));
        }
        if let Some(hostname) = &self.hostname {
            pairs.push(("hostname", hostname.clone()));
        }
        if let Some(version) = &self.version {
            pairs.push(("version", version.clone()));
        }
        query_string(&pairs)
    }
}

#[derive(Serialize)]
struct StopAgent {
    force: bool,
}

impl BuildkiteClient {
    pub async fn list_agents(&self, org: &str, options: &AgentListOptions) -> Result<Vec<Agent>> {
        let path = format!("organizations/{}/agents{}", path_segment(org), options.to_query());
        self.get(&path).await
    }

    pub async fn get_agent(&self, org: &str, id: &str) -> Result<Agent> {
        let path = format!("organizations/{}/agents/{}", path_segment(org), path_segment(id));
        self.get(&path).await
    }

    /// Asks an agent to stop. With `force`, a running job is canceled.
    pub async fn stop_agent(&self, org: &str, id: &str, force: bool) -> Result<()> {
        let path = format!(
            "organizations/{}/agents/{}/stop",
            path_segment(org),
            path_segment(id)
        );
        self.put_no_content(&path, &StopAgent { force }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_from_tags() {
        let agent: Agent = serde_json::from_str(
            r#"{"id":"a1","name":"ci-1","meta_data":["os=linux","queue=deploy"]}"#,
        )
        .unwrap();
        assert_eq!(agent.queue(), "deploy");
        assert_eq!(agent.activity(), "idle");

        let untagged: Agent = serde_json::from_str(r#"{"id":"a2"}"#).unwrap();
        assert_eq!(untagged.queue(), "default");
    }

    #[test]
    fn test_agent_survives_json_round_trip() {
        let agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "name": "ci-1",
            "hostname": "ci-1.local",
            "version": "3.80.0",
            "connection_state": "connected",
            "meta_data": ["queue=deploy"],
            "priority": 2,
            "created_at": "2024-05-01T09:00:00Z",
            "job": { "id": "j1", "type": "script", "state": "running" }
        }))
        .unwrap();

        let back: Agent = serde_json::from_str(&serde_json::to_string(&agent).unwrap()).unwrap();
        assert_eq!(back, agent);
        assert_eq!(back.activity(), "running");
    }

    #[tokio::test]
    async fn test_stop_agent_sends_force() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/organizations/acme/agents/a1/stop")
            .match_body(r#"{"force":true}"#)
            .with_status(204)
            .create_async()
            .await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        client.stop_agent("acme", "a1", true).await.unwrap();
        mock.assert_async().await;
    }
}
