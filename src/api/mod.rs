//
//  buildkite-cli
//  api/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # API Client Layer
//!
//! HTTP access to the Buildkite REST (`/v2`) and GraphQL APIs.
//!
//! ## Architecture
//!
//! - [`client`]: Core HTTP client with authentication, retry and decoding
//! - [`error`]: [`ErrorResponse`] and [`GraphQLError`]
//! - [`retry`]: Rate-limit back-off policy
//! - Resource modules ([`builds`], [`jobs`], [`artifacts`], [`agents`],
//!   [`pipelines`], [`clusters`], [`annotations`], [`user`], [`packages`])
//!   hold the wire models and the endpoint methods on [`BuildkiteClient`]
//! - [`graphql`]: GraphQL-only operations (job mutations, queue lookups)
//!
//! Response models tolerate unknown fields, and most fields default when
//! absent so partially populated payloads still decode.

pub mod client;
pub mod error;
pub mod retry;

pub mod agents;
pub mod annotations;
pub mod artifacts;
pub mod builds;
pub mod clusters;
pub mod graphql;
pub mod jobs;
pub mod packages;
pub mod pipelines;
pub mod user;

pub use client::BuildkiteClient;
pub use error::{ErrorResponse, GraphQLError};
pub use retry::RetryPolicy;

pub use agents::Agent;
pub use annotations::Annotation;
pub use artifacts::Artifact;
pub use builds::{Build, BuildsListOptions, CreateBuild};
pub use clusters::{Cluster, Queue};
pub use jobs::{BuildRef, Job, JobLog};
pub use pipelines::Pipeline;
pub use user::{AccessToken, User};

/// Encodes key/value pairs as a query string, including the leading `?`.
///
/// Returns an empty string when there are no pairs.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::api::query_string;
///
/// let q = query_string(&[("branch[]", "main"), ("per_page", "100")]);
/// assert_eq!(q, "?branch%5B%5D=main&per_page=100");
/// ```
pub fn query_string<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    format!("?{}", serializer.finish())
}

/// Percent-encodes a single path segment.
pub fn path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_empty() {
        let pairs: [(&str, &str); 0] = [];
        assert_eq!(query_string(&pairs), "");
    }

    #[test]
    fn test_path_segment_encodes_spaces_and_slashes() {
        assert_eq!(path_segment("my pipeline"), "my%20pipeline");
        assert_eq!(path_segment("a/b"), "a%2Fb");
    }
}
