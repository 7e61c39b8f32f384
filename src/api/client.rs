//
//  buildkite-cli
//  api/client.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # HTTP Client Wrapper for the Buildkite API
//!
//! This module provides the core HTTP client for the Buildkite REST and
//! GraphQL APIs. It injects authentication and content headers, joins
//! endpoints onto a configurable base URL, decodes JSON responses, turns
//! error statuses into [`ErrorResponse`] values, and waits out rate limits
//! according to a [`RetryPolicy`].
//!
//! ## Features
//!
//! - Bearer token authentication
//! - Custom User-Agent header
//! - JSON serialization/deserialization, with empty bodies decoding to `None`
//! - Rate-limit retry with exponential back-off
//! - GraphQL queries with typed `data` and collected `errors`
//! - Memoized access-token introspection

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::error::{ErrorResponse, GraphQLError};
use super::retry::RetryPolicy;
use super::user::AccessToken;

/// Default REST endpoint.
pub const DEFAULT_REST_ENDPOINT: &str = "https://api.buildkite.com/v2/";

/// Default GraphQL endpoint.
pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "https://graphql.buildkite.com/v1";

/// The main HTTP client for the Buildkite API.
///
/// # Creating a Client
///
/// ```rust,no_run
/// use buildkite_cli::api::BuildkiteClient;
///
/// let client = BuildkiteClient::new("bkua_xxx")?
///     .with_base_url("https://api.buildkite.com/v2/")
///     .with_graphql_url("https://graphql.buildkite.com/v1");
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Endpoints
///
/// Endpoints are paths relative to the base URL, optionally with a query
/// string. A leading `/` is ignored, fragments are stripped, and the query
/// string is passed through verbatim so callers must encode it themselves
/// (see [`crate::api::query_string`]).
pub struct BuildkiteClient {
    /// The underlying HTTP client
    http: Client,
    /// REST base URL, always ending in `/`
    base_url: String,
    /// GraphQL endpoint
    graphql_url: String,
    /// API access token
    token: String,
    /// Rate-limit retry configuration
    retry: RetryPolicy,
    /// Memoized `GET /access-token` result
    token_info: OnceCell<AccessToken>,
}

impl std::fmt::Debug for BuildkiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildkiteClient")
            .field("base_url", &self.base_url)
            .field("graphql_url", &self.graphql_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GraphQLErrorItem {
    message: String,
}

impl BuildkiteClient {
    /// Creates a client for the public Buildkite API.
    ///
    /// # Parameters
    ///
    /// * `token` - The API access token sent as a bearer credential
    ///
    /// # Returns
    ///
    /// Returns `Ok(BuildkiteClient)` on success, or an error if the HTTP
    /// client could not be created.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
                .build()?,
            base_url: DEFAULT_REST_ENDPOINT.to_string(),
            graphql_url: DEFAULT_GRAPHQL_ENDPOINT.to_string(),
            token: token.into(),
            retry: RetryPolicy::default(),
            token_info: OnceCell::new(),
        })
    }

    /// Overrides the REST base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.base_url = url;
        self
    }

    /// Overrides the GraphQL endpoint.
    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = url.into();
        self
    }

    /// Sets the rate-limit retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the REST base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves an endpoint against the base URL.
    ///
    /// Absolute `http(s)://` URLs are returned unchanged.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use buildkite_cli::api::BuildkiteClient;
    ///
    /// let client = BuildkiteClient::new("t")?.with_base_url("https://api.buildkite.com/v2");
    /// assert_eq!(
    ///     client.endpoint_url("/organizations/acme/builds?state%5B%5D=failed#top"),
    ///     "https://api.buildkite.com/v2/organizations/acme/builds?state%5B%5D=failed"
    /// );
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.split('#').next().unwrap_or_default();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!("{}{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn auth_headers(&self, has_body: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .context("API token contains characters that are not valid in a header")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    /// Sends a single request and turns error statuses into [`ErrorResponse`].
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        extra_headers: &HeaderMap,
    ) -> Result<(StatusCode, String)> {
        let mut headers = self.auth_headers(body.is_some())?;
        headers.extend(extra_headers.clone());

        let mut request = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        tracing::debug!("{} {}", method, url);
        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!("{} {} -> {}", method, url, status);

        if status.as_u16() >= 400 {
            return Err(ErrorResponse {
                status_code: status.as_u16(),
                status: status.to_string(),
                url: url.to_string(),
                body: text,
                headers: response_headers,
            }
            .into());
        }

        Ok((status, text))
    }

    /// Performs a request through the retry policy and decodes the JSON body.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when the response body is empty, otherwise the
    /// decoded value.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Option<T>> {
        let url = self.endpoint_url(endpoint);
        let no_headers = HeaderMap::new();
        let (_, text) = self
            .retry
            .run(|| self.send_once(method.clone(), &url, body.as_deref(), &no_headers))
            .await?;

        if text.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to decode response from {url}"))?;
        Ok(Some(value))
    }

    async fn execute_required<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        self.execute(method, endpoint, body)
            .await?
            .with_context(|| format!("Empty response from {}", self.endpoint_url(endpoint)))
    }

    /// Makes an HTTP GET request and decodes the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.execute_required(Method::GET, endpoint, None).await
    }

    /// Makes an HTTP POST request with a compact JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, endpoint: &str, body: &B) -> Result<T> {
        let body = serde_json::to_vec(body)?;
        self.execute_required(Method::POST, endpoint, Some(body)).await
    }

    /// Makes an HTTP PUT request with a compact JSON body.
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, endpoint: &str, body: &B) -> Result<T> {
        let body = serde_json::to_vec(body)?;
        self.execute_required(Method::PUT, endpoint, Some(body)).await
    }

    /// Makes an HTTP PUT request whose response body is ignored.
    pub async fn put_no_content<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let body = serde_json::to_vec(body)?;
        self.execute::<serde_json::Value>(Method::PUT, endpoint, Some(body))
            .await?;
        Ok(())
    }

    /// Makes an HTTP DELETE request.
    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        self.execute::<serde_json::Value>(Method::DELETE, endpoint, None)
            .await?;
        Ok(())
    }

    /// Performs an arbitrary request and returns the raw body.
    ///
    /// Used by `bk api`; `headers` are added on top of the standard ones.
    pub async fn raw(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
        headers: &[(String, String)],
    ) -> Result<(StatusCode, String)> {
        let url = self.endpoint_url(endpoint);
        let mut extra = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .with_context(|| format!("Invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value.trim())
                .with_context(|| format!("Invalid value for header {name}"))?;
            extra.insert(name, value);
        }

        self.retry
            .run(|| self.send_once(method.clone(), &url, body.as_deref(), &extra))
            .await
    }

    /// Runs a GraphQL query and decodes its `data`.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphQLError`] when the response carries any `errors`,
    /// or when `data` is missing.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::to_vec(&GraphQLRequest { query, variables })?;
        let url = self.graphql_url.clone();
        let no_headers = HeaderMap::new();
        let (_, text) = self
            .retry
            .run(|| self.send_once(Method::POST, &url, Some(&body), &no_headers))
            .await?;

        let response: GraphQLResponse<T> = serde_json::from_str(&text)
            .context("Failed to decode GraphQL response")?;
        if !response.errors.is_empty() {
            return Err(GraphQLError {
                messages: response.errors.into_iter().map(|e| e.message).collect(),
            }
            .into());
        }
        response.data.ok_or_else(|| {
            GraphQLError {
                messages: vec!["Response contained no data".to_string()],
            }
            .into()
        })
    }

    /// Uploads a multipart form. Multipart bodies are streamed once, so
    /// rate-limited uploads are not retried.
    pub async fn upload_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let url = self.endpoint_url(endpoint);
        let headers = self.auth_headers(false)?;
        tracing::debug!("POST {} (multipart)", url);

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Upload to {url} failed"))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();

        if status.as_u16() >= 400 {
            return Err(ErrorResponse {
                status_code: status.as_u16(),
                status: status.to_string(),
                url,
                body: text,
                headers: response_headers,
            }
            .into());
        }
        serde_json::from_str(&text).context("Failed to decode upload response")
    }

    /// Starts a download of `url`, following redirects to storage.
    pub async fn download(&self, url: &str) -> Result<reqwest::Response> {
        let url = self.endpoint_url(url);
        let headers = self.auth_headers(false)?;
        let response = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("Download of {url} failed"))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let response_headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorResponse {
                status_code: status.as_u16(),
                status: status.to_string(),
                url,
                body,
                headers: response_headers,
            }
            .into());
        }
        Ok(response)
    }

    /// Returns the token's UUID and scopes, fetching them at most once.
    pub async fn access_token(&self) -> Result<&AccessToken> {
        self.token_info
            .get_or_try_init(|| async { self.get::<AccessToken>("access-token").await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(server: &mockito::Server) -> BuildkiteClient {
        BuildkiteClient::new("secret")
            .unwrap()
            .with_base_url(server.url())
            .with_graphql_url(format!("{}/graphql", server.url()))
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = BuildkiteClient::new("bkua_secret").unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("bkua_secret"));
    }

    #[test]
    fn test_endpoint_join_keeps_query_and_strips_fragment() {
        let c = BuildkiteClient::new("t").unwrap().with_base_url("https://api.example.com/v2");
        assert_eq!(
            c.endpoint_url("organizations/acme/builds?branch=main%2Fx#frag"),
            "https://api.example.com/v2/organizations/acme/builds?branch=main%2Fx"
        );
        assert_eq!(
            c.endpoint_url("/user"),
            "https://api.example.com/v2/user"
        );
        assert_eq!(
            c.endpoint_url("https://other.example.com/file"),
            "https://other.example.com/file"
        );
    }

    #[tokio::test]
    async fn test_get_sends_auth_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer secret")
            .match_header("accept", "application/json")
            .match_header("user-agent", format!("bk/{}", crate::VERSION).as_str())
            .with_status(200)
            .with_body(r#"{"id":"u1","name":"Ada","email":"ada@example.com"}"#)
            .create_async()
            .await;

        let value: serde_json::Value = client(&server).get("/user").await.unwrap();
        assert_eq!(value["name"], "Ada");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_body_decodes_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/organizations/acme/agents/a1/stop")
            .match_header("content-type", "application/json")
            .match_body(r#"{"force":true}"#)
            .with_status(204)
            .create_async()
            .await;

        let result: Option<serde_json::Value> = client(&server)
            .execute(
                Method::PUT,
                "organizations/acme/agents/a1/stop",
                Some(br#"{"force":true}"#.to_vec()),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_error_status_becomes_error_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/organizations/acme/pipelines/missing")
            .with_status(404)
            .with_body(r#"{"message":"No pipeline found"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .get::<serde_json::Value>("organizations/acme/pipelines/missing")
            .await
            .unwrap_err();
        let resp = err.downcast_ref::<ErrorResponse>().unwrap();
        assert!(resp.is_not_found());
        assert_eq!(resp.message().as_deref(), Some("No pipeline found"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/user")
            .with_status(429)
            .with_header("RateLimit-Reset", "0")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(r#"{"id":"u1"}"#)
            .expect(1)
            .create_async()
            .await;

        let c = client(&server).with_retry(RetryPolicy::new(2, Duration::from_secs(1)));
        let value: serde_json::Value = c.get("user").await.unwrap();
        assert_eq!(value["id"], "u1");
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let c = client(&server).with_retry(RetryPolicy::new(3, Duration::from_secs(1)));
        assert!(c.get::<serde_json::Value>("user").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_graphql_errors_are_collected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(r#"{"data":null,"errors":[{"message":"first"},{"message":"second"}]}"#)
            .create_async()
            .await;

        let err = client(&server)
            .graphql::<serde_json::Value>("query { viewer { id } }", serde_json::json!({}))
            .await
            .unwrap_err();
        let gql = err.downcast_ref::<GraphQLError>().unwrap();
        assert_eq!(gql.messages, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_access_token_is_memoized() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/access-token")
            .with_status(200)
            .with_body(r#"{"uuid":"tok-1","scopes":["read_builds","write_builds"]}"#)
            .expect(1)
            .create_async()
            .await;

        let c = client(&server);
        assert_eq!(c.access_token().await.unwrap().uuid, "tok-1");
        assert_eq!(c.access_token().await.unwrap().scopes.len(), 2);
        mock.assert_async().await;
    }
}
