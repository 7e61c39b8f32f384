//
//  buildkite-cli
//  api/packages.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Package registry uploads.

use anyhow::Result;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{path_segment, BuildkiteClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl BuildkiteClient {
    /// Uploads `contents` as `file_name` to a registry.
    pub async fn push_package(
        &self,
        org: &str,
        registry: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Package> {
        let path = format!(
            "packages/organizations/{}/registries/{}/packages",
            path_segment(org),
            path_segment(registry)
        );
        let part = Part::bytes(contents).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        self.upload_multipart(&path, form).await
    }
}
