//
//  buildkite-cli
//  api/annotations.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Build annotations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builds::build_path;
use super::BuildkiteClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl BuildkiteClient {
    pub async fn list_annotations(&self, org: &str, pipeline: &str, build: u64) -> Result<Vec<Annotation>> {
        let path = format!("{}/annotations?per_page=100", build_path(org, pipeline, build));
        self.get(&path).await
    }
}
