//
//  buildkite-cli
//  fetch/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Paged Fetch Engine
//!
//! Drives page-by-page listing of builds and jobs, combining server-side
//! filters (part of each request) with client-side filters (applied to each
//! page after it arrives).
//!
//! ## Guarantees
//!
//! - Pages are requested in order, 1, 2, 3, ...; server order is preserved
//! - With a limit, no more than `limit` records are returned
//! - Two consecutive pages starting with the same record abort the fetch
//! - Every `max_limit` raw records the user is asked whether to keep
//!   scanning; declining returns what was found so far. Without a
//!   confirmer the scan continues until the source runs out
//!
//! ## Example
//!
//! ```rust,no_run
//! use buildkite_cli::api::{BuildkiteClient, BuildsListOptions};
//! use buildkite_cli::fetch::{fetch_paged, BuildFilter, BuildPages, FetchOptions};
//!
//! # async fn demo(client: &BuildkiteClient) -> anyhow::Result<()> {
//! let source = BuildPages::new(client, "acme", Some("web".into()), BuildsListOptions::default());
//! let filter = BuildFilter { message: Some("deploy".into()), ..Default::default() };
//! let builds = fetch_paged(&source, &FetchOptions::new(50, false), None, |page| filter.apply(page)).await?;
//! # Ok(())
//! # }
//! ```

pub mod filters;

pub use filters::*;

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::api::{Build, BuildRef, BuildkiteClient, BuildsListOptions, Job};
use crate::error::CliError;
use crate::interactive;

/// Records requested per page.
pub const PAGE_SIZE: usize = 100;

/// Raw records scanned between confirmations.
pub const MAX_LIMIT: usize = 5000;

/// A paged listing endpoint.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Fetches page `page` (starting at 1) of up to `per_page` records.
    async fn fetch_page(&self, page: u32, per_page: usize) -> Result<Vec<Self::Item>>;
}

/// Identity used to detect a backend returning the same page twice.
pub trait PageKey {
    type Key: PartialEq + Debug;

    fn page_key(&self) -> Self::Key;
}

impl PageKey for Build {
    type Key = u64;

    fn page_key(&self) -> u64 {
        self.number
    }
}

impl PageKey for Job {
    type Key = String;

    fn page_key(&self) -> String {
        self.id.clone()
    }
}

/// Asks whether to keep scanning after `max_limit` raw records.
pub trait Confirmer {
    fn confirm_continue(&self, scanned: usize, matching: usize) -> Result<bool>;
}

/// Confirms on the terminal.
pub struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm_continue(&self, scanned: usize, matching: usize) -> Result<bool> {
        interactive::prompt_confirm_with_default(
            &format!("Scanned {scanned} records, {matching} matched since the last check. Keep searching?"),
            false,
        )
    }
}

/// Limits for one paged fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: usize,
    pub unlimited: bool,
    pub page_size: usize,
    pub max_limit: usize,
}

impl FetchOptions {
    pub fn new(limit: usize, unlimited: bool) -> Self {
        Self {
            limit,
            unlimited,
            page_size: PAGE_SIZE,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Fetches pages from `source` until enough matching records are found.
///
/// # Parameters
///
/// * `source` - The paged endpoint
/// * `options` - Limit, page size and confirmation interval
/// * `confirmer` - Asked every `max_limit` raw records; with `None` the
///   fetch keeps going
/// * `filter` - Client-side filter applied to each page
///
/// # Returns
///
/// The matching records in server order. A declined confirmation returns
/// the records found so far.
///
/// # Errors
///
/// - The first error from `source` or `confirmer`
/// - An API error when two consecutive pages start with the same record
pub async fn fetch_paged<S, O, F>(
    source: &S,
    options: &FetchOptions,
    confirmer: Option<&dyn Confirmer>,
    mut filter: F,
) -> Result<Vec<O>>
where
    S: PageSource,
    S::Item: PageKey,
    F: FnMut(Vec<S::Item>) -> Vec<O>,
{
    let page_size = options.page_size.max(1);
    let mut matching: Vec<O> = Vec::new();
    let mut raw_fetched = 0usize;
    let mut raw_since_confirm = 0usize;
    let mut matching_since_confirm = 0usize;
    let mut previous_first: Option<<S::Item as PageKey>::Key> = None;
    let mut page: u32 = 1;

    loop {
        if !options.unlimited && matching.len() >= options.limit {
            break;
        }

        if raw_since_confirm >= options.max_limit {
            match confirmer {
                Some(confirmer) => {
                    if !confirmer.confirm_continue(raw_fetched, matching_since_confirm)? {
                        tracing::debug!("Search stopped by user after {} records", raw_fetched);
                        break;
                    }
                }
                None => tracing::debug!("Scanned {} records, continuing without confirmation", raw_fetched),
            }
            raw_since_confirm = 0;
            matching_since_confirm = 0;
        }

        tracing::debug!("Fetching page {} ({} per page)", page, page_size);
        let items = source.fetch_page(page, page_size).await?;
        if items.is_empty() {
            break;
        }

        let first = items[0].page_key();
        if page > 1 && previous_first.as_ref() == Some(&first) {
            tracing::debug!("Page {} starts with {:?} again", page, first);
            return Err(CliError::api("API returned duplicate results, stopping to prevent infinite loop").into());
        }
        previous_first = Some(first);

        let count = items.len();
        raw_fetched += count;
        raw_since_confirm += count;

        let mut matched = filter(items);
        if !options.unlimited {
            matched.truncate(options.limit - matching.len());
        }
        matching_since_confirm += matched.len();
        matching.extend(matched);

        if count < page_size {
            break;
        }
        page += 1;
    }

    tracing::debug!("Fetched {} records, {} matched", raw_fetched, matching.len());
    Ok(matching)
}

/// Builds of one pipeline, or of the whole organization.
pub struct BuildPages<'a> {
    client: &'a BuildkiteClient,
    org: String,
    pipeline: Option<String>,
    options: BuildsListOptions,
}

impl<'a> BuildPages<'a> {
    pub fn new(
        client: &'a BuildkiteClient,
        org: impl Into<String>,
        pipeline: Option<String>,
        options: BuildsListOptions,
    ) -> Self {
        Self {
            client,
            org: org.into(),
            pipeline,
            options,
        }
    }
}

#[async_trait]
impl PageSource for BuildPages<'_> {
    type Item = Build;

    async fn fetch_page(&self, page: u32, per_page: usize) -> Result<Vec<Build>> {
        let options = BuildsListOptions {
            page: Some(page),
            per_page: Some(per_page as u32),
            ..self.options.clone()
        };
        self.client
            .list_builds(&self.org, self.pipeline.as_deref(), &options)
            .await
    }
}

/// Command jobs of a page of builds, each tagged with its build.
pub fn jobs_of(builds: Vec<Build>) -> Vec<Job> {
    builds
        .into_iter()
        .flat_map(|build| {
            let build_ref = BuildRef {
                org: build.org_slug().unwrap_or_default().to_string(),
                pipeline: build.pipeline_slug().unwrap_or_default().to_string(),
                number: build.number,
            };
            build
                .jobs
                .into_iter()
                .filter(|job| job.job_type == "script")
                .map(move |mut job| {
                    job.build.get_or_insert_with(|| build_ref.clone());
                    job
                })
        })
        .collect()
}

/// Jobs on a set of queues, paged by GraphQL cursor.
///
/// Pages must be requested in order starting from 1; page 1 resets the
/// cursor.
pub struct QueueJobPages<'a> {
    client: &'a BuildkiteClient,
    org: String,
    queue_ids: Vec<String>,
    cursor: Mutex<CursorState>,
}

#[derive(Default)]
struct CursorState {
    next: Option<String>,
    exhausted: bool,
}

impl<'a> QueueJobPages<'a> {
    pub fn new(client: &'a BuildkiteClient, org: impl Into<String>, queue_ids: Vec<String>) -> Self {
        Self {
            client,
            org: org.into(),
            queue_ids,
            cursor: Mutex::new(CursorState::default()),
        }
    }
}

#[async_trait]
impl PageSource for QueueJobPages<'_> {
    type Item = Job;

    async fn fetch_page(&self, page: u32, per_page: usize) -> Result<Vec<Job>> {
        let cursor = {
            let mut state = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            if page == 1 {
                *state = CursorState::default();
            }
            if state.exhausted || self.queue_ids.is_empty() {
                return Ok(Vec::new());
            }
            state.next.clone()
        };

        let result = self
            .client
            .jobs_by_queue(&self.org, &self.queue_ids, per_page, cursor.as_deref())
            .await?;

        let mut state = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        state.exhausted = result.next_cursor.is_none();
        state.next = result.next_cursor;
        Ok(result.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use mockito::Matcher;
    use std::cell::Cell;

    fn builds_json(from: u64, count: u64, elapsed_minutes: impl Fn(u64) -> i64) -> String {
        let builds: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                let number = from - i;
                let start = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
                let finish = start + chrono::Duration::minutes(elapsed_minutes(number));
                serde_json::json!({
                    "number": number,
                    "state": "passed",
                    "started_at": start.to_rfc3339(),
                    "finished_at": finish.to_rfc3339(),
                })
            })
            .collect();
        serde_json::to_string(&builds).unwrap()
    }

    async fn mock_page(server: &mut mockito::ServerGuard, page: u32, body: String) -> mockito::Mock {
        server
            .mock("GET", "/organizations/acme/pipelines/web/builds")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), page.to_string()),
                Matcher::UrlEncoded("per_page".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    fn source(client: &BuildkiteClient) -> BuildPages<'_> {
        BuildPages::new(client, "acme", Some("web".into()), BuildsListOptions::default())
    }

    #[tokio::test]
    async fn test_limit_truncates_last_page() {
        let mut server = mockito::Server::new_async().await;
        let p1 = mock_page(&mut server, 1, builds_json(300, 100, |_| 1)).await;
        let p2 = mock_page(&mut server, 2, builds_json(200, 100, |_| 1)).await;
        let p3 = mock_page(&mut server, 3, builds_json(100, 100, |_| 1)).await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        let builds = fetch_paged(&source(&client), &FetchOptions::new(230, false), None, |b| b)
            .await
            .unwrap();

        assert_eq!(builds.len(), 230);
        assert_eq!(builds[0].number, 300);
        assert_eq!(builds[229].number, 71);
        p1.assert_async().await;
        p2.assert_async().await;
        p3.assert_async().await;
    }

    #[tokio::test]
    async fn test_duplicate_page_aborts() {
        let mut server = mockito::Server::new_async().await;
        let page = builds_json(100, 100, |_| 1);
        mock_page(&mut server, 1, page.clone()).await;
        mock_page(&mut server, 2, page).await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        let err = fetch_paged(&source(&client), &FetchOptions::new(0, true), None, |b| b)
            .await
            .unwrap_err();

        let cli = err.downcast_ref::<CliError>().unwrap();
        assert_eq!(cli.category, ErrorCategory::Api);
        assert_eq!(cli.exit_code(), 3);
        assert!(cli.details.contains("duplicate results"));
    }

    #[tokio::test]
    async fn test_duration_filter_applies_per_page() {
        let mut server = mockito::Server::new_async().await;
        let body = builds_json(10, 10, |n| if n % 2 == 0 { 20 } else { 2 });
        mock_page(&mut server, 1, body).await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        let filter = BuildFilter {
            duration: Some(">10m".parse().unwrap()),
            ..Default::default()
        };
        let builds = fetch_paged(&source(&client), &FetchOptions::new(50, false), None, |b| filter.apply(b))
            .await
            .unwrap();

        assert_eq!(builds.len(), 5);
        assert!(builds.iter().all(|b| b.number % 2 == 0));
    }

    #[tokio::test]
    async fn test_unlimited_with_no_matches_stops_on_empty_page() {
        let mut server = mockito::Server::new_async().await;
        mock_page(&mut server, 1, builds_json(200, 100, |_| 1)).await;
        mock_page(&mut server, 2, builds_json(100, 100, |_| 1)).await;
        mock_page(&mut server, 3, "[]".to_string()).await;

        let client = BuildkiteClient::new("t").unwrap().with_base_url(server.url());
        let builds: Vec<Build> = fetch_paged(&source(&client), &FetchOptions::new(0, true), None, |_| Vec::new())
            .await
            .unwrap();
        assert!(builds.is_empty());
    }

    struct Pages {
        pages: Vec<Vec<Build>>,
    }

    #[async_trait]
    impl PageSource for Pages {
        type Item = Build;

        async fn fetch_page(&self, page: u32, _per_page: usize) -> Result<Vec<Build>> {
            Ok(self.pages.get(page as usize - 1).cloned().unwrap_or_default())
        }
    }

    fn numbered(from: u64, count: u64) -> Vec<Build> {
        (0..count)
            .map(|i| serde_json::from_value(serde_json::json!({ "number": from - i })).unwrap())
            .collect()
    }

    struct Answer {
        value: bool,
        calls: Cell<usize>,
    }

    impl Confirmer for Answer {
        fn confirm_continue(&self, _scanned: usize, _matching: usize) -> Result<bool> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.value)
        }
    }

    fn small_options() -> FetchOptions {
        FetchOptions {
            limit: 0,
            unlimited: true,
            page_size: 2,
            max_limit: 4,
        }
    }

    #[tokio::test]
    async fn test_declined_confirmation_returns_partial_results() {
        let source = Pages {
            pages: vec![numbered(10, 2), numbered(8, 2), numbered(6, 2), numbered(4, 2)],
        };
        let answer = Answer { value: false, calls: Cell::new(0) };
        let builds = fetch_paged(&source, &small_options(), Some(&answer), |b| b).await.unwrap();

        assert_eq!(builds.len(), 4);
        assert_eq!(answer.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_accepted_confirmation_resets_counter() {
        let source = Pages {
            pages: vec![numbered(10, 2), numbered(8, 2), numbered(6, 2), numbered(4, 2), numbered(2, 1)],
        };
        let answer = Answer { value: true, calls: Cell::new(0) };
        let builds = fetch_paged(&source, &small_options(), Some(&answer), |b| b).await.unwrap();

        assert_eq!(builds.len(), 9);
        assert_eq!(answer.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_unlimited_without_confirmer_scans_every_page() {
        let source = Pages {
            pages: vec![numbered(10, 2), numbered(8, 2), numbered(6, 2), numbered(4, 2), numbered(2, 1)],
        };
        let builds = fetch_paged(&source, &small_options(), None, |b| b).await.unwrap();

        assert_eq!(builds.len(), 9);
        assert_eq!(builds[8].number, 2);
    }

    #[tokio::test]
    async fn test_no_prompt_when_cap_reached_on_last_page() {
        let source = Pages {
            pages: vec![numbered(4, 2), numbered(2, 1)],
        };
        let options = FetchOptions {
            max_limit: 3,
            ..small_options()
        };
        let answer = Answer { value: false, calls: Cell::new(0) };
        let builds = fetch_paged(&source, &options, Some(&answer), |b| b).await.unwrap();

        assert_eq!(builds.len(), 3);
        assert_eq!(answer.calls.get(), 0);
    }

    #[test]
    fn test_jobs_of_tags_build() {
        let build: Build = serde_json::from_value(serde_json::json!({
            "number": 5,
            "pipeline": { "slug": "web", "name": "Web" },
            "url": "https://api.buildkite.com/v2/organizations/acme/pipelines/web/builds/5",
            "jobs": [
                { "id": "j1", "type": "script", "state": "passed" },
                { "id": "w1", "type": "waiter" }
            ]
        }))
        .unwrap();

        let jobs = jobs_of(vec![build]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].build,
            Some(BuildRef { org: "acme".into(), pipeline: "web".into(), number: 5 })
        );
    }
}
