//
//  buildkite-cli
//  api/error.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # API Error Types
//!
//! Typed failures produced by [`BuildkiteClient`](super::BuildkiteClient).
//! A non-2xx REST response becomes an [`ErrorResponse`] carrying everything
//! needed to categorize it later; a GraphQL response with an `errors` array
//! becomes a [`GraphQLError`].

use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

/// Header carrying the number of seconds until the rate limit resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "RateLimit-Reset";

/// Delay used when a 429 response carries no usable reset hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// A REST response with status 400 or above.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::api::ErrorResponse;
/// use reqwest::header::HeaderMap;
///
/// let err = ErrorResponse {
///     status_code: 404,
///     status: "404 Not Found".to_string(),
///     url: "https://api.buildkite.com/v2/organizations/acme/agents/x".to_string(),
///     body: String::new(),
///     headers: HeaderMap::new(),
/// };
/// assert!(err.is_not_found());
/// assert_eq!(err.path(), "/v2/organizations/acme/agents/x");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{status} from {url}{}", summarize_body(.body))]
pub struct ErrorResponse {
    /// Numeric HTTP status.
    pub status_code: u16,
    /// Status line, e.g. `"404 Not Found"`.
    pub status: String,
    /// The request URL.
    pub url: String,
    /// Raw response body.
    pub body: String,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ErrorResponse {
    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.status_code == 403
    }

    /// 400, and 422 which the API uses for field validation failures.
    pub fn is_bad_request(&self) -> bool {
        matches!(self.status_code, 400 | 422)
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.status_code == 429
    }

    /// Time until the rate limit resets, from the `RateLimit-Reset` header.
    ///
    /// Falls back to one second when the header is missing or not a whole
    /// number of seconds.
    pub fn retry_after(&self) -> Duration {
        self.headers
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER)
    }

    /// The path portion of the request URL, without query string.
    pub fn path(&self) -> &str {
        let after_scheme = self.url.find("://").map(|i| i + 3).unwrap_or(0);
        let rest = &self.url[after_scheme..];
        let path = match rest.find('/') {
            Some(i) => &rest[i..],
            None => "/",
        };
        path.split('?').next().unwrap_or(path)
    }

    /// The `message` field of a JSON error body, if present.
    pub fn message(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

fn summarize_body(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// One or more errors reported in a GraphQL response body.
#[derive(Debug, Clone, Error)]
#[error("GraphQL error: {}", .messages.join("; "))]
pub struct GraphQLError {
    pub messages: Vec<String>,
}
