//
//  buildkite-cli
//  api/artifacts.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Build and job artifacts.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::builds::build_path;
use super::{path_segment, BuildkiteClient};

/// Artifacts per page when listing; builds rarely exceed this.
const ARTIFACTS_PER_PAGE: u32 = 100;

/// A file uploaded by a job. Unique within a build by `(job_id, path)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub sha1sum: Option<String>,
    #[serde(default)]
    pub download_url: String,
}

impl BuildkiteClient {
    /// Lists every artifact of a build, following pages until a short one.
    pub async fn list_artifacts(&self, org: &str, pipeline: &str, build: u64) -> Result<Vec<Artifact>> {
        let base = format!("{}/artifacts", build_path(org, pipeline, build));
        self.list_all_artifacts(&base).await
    }

    /// Lists the artifacts of one job.
    pub async fn list_job_artifacts(
        &self,
        org: &str,
        pipeline: &str,
        build: u64,
        job_id: &str,
    ) -> Result<Vec<Artifact>> {
        let base = format!(
            "{}/jobs/{}/artifacts",
            build_path(org, pipeline, build),
            path_segment(job_id)
        );
        self.list_all_artifacts(&base).await
    }

    async fn list_all_artifacts(&self, base: &str) -> Result<Vec<Artifact>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<Artifact> = self
                .get(&format!("{base}?page={page}&per_page={ARTIFACTS_PER_PAGE}"))
                .await?;
            let count = batch.len();
            all.extend(batch);
            if count < ARTIFACTS_PER_PAGE as usize {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}
