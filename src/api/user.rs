//
//  buildkite-cli
//  api/user.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! The authenticated user, token introspection and organization invites.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BuildkiteClient;
use crate::error::CliError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub graphql_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of `GET /access-token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessToken {
    pub uuid: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

const ORGANIZATION_ID: &str = r#"
query OrganizationId($slug: ID!) {
  organization(slug: $slug) { id }
}"#;

const INVITE_USERS: &str = r#"
mutation InviteUsers($organization: ID!, $emails: [String!]!) {
  organizationInvitationCreate(input: { organizationID: $organization, emails: $emails, role: MEMBER }) {
    organizationInvitationEdges { node { email } }
  }
}"#;

#[derive(Deserialize)]
struct OrganizationIdData {
    organization: Option<IdNode>,
}

#[derive(Deserialize)]
struct IdNode {
    id: String,
}

impl BuildkiteClient {
    pub async fn current_user(&self) -> Result<User> {
        self.get("user").await
    }

    /// Invites `emails` to the organization as members.
    pub async fn invite_users(&self, org: &str, emails: &[String]) -> Result<()> {
        let data: OrganizationIdData = self
            .graphql(ORGANIZATION_ID, serde_json::json!({ "slug": org }))
            .await
            .context("Failed to look up organization")?;
        let org_id = data
            .organization
            .ok_or_else(|| CliError::not_found(format!("Organization {org} not found")))?
            .id;

        let _: serde_json::Value = self
            .graphql(
                INVITE_USERS,
                serde_json::json!({ "organization": org_id, "emails": emails }),
            )
            .await?;
        Ok(())
    }
}
