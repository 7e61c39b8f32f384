//
//  buildkite-cli
//  fetch/filters.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Client-side filters applied to each fetched page.
//!
//! ## Duration Grammar
//!
//! ```text
//! filter   := [op] literal
//! op       := ">=" | "<=" | ">" | "<"        (default ">=")
//! literal  := (digits ("s" | "m" | "h"))+   e.g. 45s, 10m, 1h30m
//! ```
//!
//! Elapsed time is `finished_at - started_at` for finished records and
//! `now - started_at` for running ones. Records that never started never
//! match a duration filter.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::{Build, Job};
use crate::error::CliError;

static DURATION_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d+[smh])+$").unwrap());
static DURATION_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)([smh])").unwrap());

/// Comparison in a duration filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    AtLeast,
    AtMost,
    GreaterThan,
    LessThan,
}

/// A parsed `--duration` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationFilter {
    pub comparison: Comparison,
    pub threshold: Duration,
}

impl DurationFilter {
    pub fn matches(&self, elapsed: Duration) -> bool {
        match self.comparison {
            Comparison::AtLeast => elapsed >= self.threshold,
            Comparison::AtMost => elapsed <= self.threshold,
            Comparison::GreaterThan => elapsed > self.threshold,
            Comparison::LessThan => elapsed < self.threshold,
        }
    }
}

impl FromStr for DurationFilter {
    type Err = CliError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (comparison, literal) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (Comparison::AtLeast, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Comparison::AtMost, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Comparison::GreaterThan, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Comparison::LessThan, rest)
        } else {
            (Comparison::AtLeast, trimmed)
        };

        let literal = literal.trim();
        if !DURATION_LITERAL.is_match(literal) {
            return Err(CliError::validation(format!("Invalid duration \"{input}\""))
                .with_suggestions(["Use a duration like 10m, >1h30m or <45s"]));
        }

        let mut seconds: i64 = 0;
        for caps in DURATION_PART.captures_iter(literal) {
            let value: i64 = caps[1]
                .parse()
                .map_err(|_| CliError::validation(format!("Duration \"{input}\" is too large")))?;
            let unit = match &caps[2] {
                "h" => 3600,
                "m" => 60,
                _ => 1,
            };
            seconds = value
                .checked_mul(unit)
                .and_then(|s| seconds.checked_add(s))
                .ok_or_else(|| CliError::validation(format!("Duration \"{input}\" is too large")))?;
        }

        Ok(Self {
            comparison,
            threshold: Duration::seconds(seconds),
        })
    }
}

/// Records with a start and optional finish time.
pub trait Elapsed {
    fn started(&self) -> Option<DateTime<Utc>>;
    fn finished(&self) -> Option<DateTime<Utc>>;

    /// Run time as of `now`, or `None` if the record never started.
    fn elapsed_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started()?;
        Some(self.finished().unwrap_or(now) - started)
    }
}

impl Elapsed for Build {
    fn started(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    fn finished(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

impl Elapsed for Job {
    fn started(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    fn finished(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

fn duration_matches<R: Elapsed>(filter: Option<&DurationFilter>, record: &R, now: DateTime<Utc>) -> bool {
    match filter {
        None => true,
        Some(filter) => record.elapsed_at(now).is_some_and(|e| filter.matches(e)),
    }
}

/// Client-side filters for builds.
#[derive(Debug, Clone, Default)]
pub struct BuildFilter {
    pub duration: Option<DurationFilter>,
    /// Case-insensitive substring of the build message.
    pub message: Option<String>,
}

impl BuildFilter {
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.message.as_deref().map_or(true, str::is_empty)
    }

    pub fn matches_at(&self, build: &Build, now: DateTime<Utc>) -> bool {
        if !duration_matches(self.duration.as_ref(), build, now) {
            return false;
        }
        match self.message.as_deref().filter(|m| !m.is_empty()) {
            None => true,
            Some(needle) => build
                .message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(&needle.to_lowercase())),
        }
    }

    /// Keeps the builds that match; with no filters set the input is
    /// returned as is.
    pub fn apply_at(&self, builds: Vec<Build>, now: DateTime<Utc>) -> Vec<Build> {
        if self.is_empty() {
            return builds;
        }
        builds.into_iter().filter(|b| self.matches_at(b, now)).collect()
    }

    pub fn apply(&self, builds: Vec<Build>) -> Vec<Build> {
        self.apply_at(builds, Utc::now())
    }
}

/// Client-side filters for jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Case-insensitive `queue=` agent rule.
    pub queue: Option<String>,
    /// Accepted states, case-insensitive; empty accepts all.
    pub states: Vec<String>,
    pub duration: Option<DurationFilter>,
}

impl JobFilter {
    pub fn is_empty(&self) -> bool {
        self.queue.as_deref().map_or(true, str::is_empty) && self.states.is_empty() && self.duration.is_none()
    }

    pub fn matches_at(&self, job: &Job, now: DateTime<Utc>) -> bool {
        if let Some(queue) = self.queue.as_deref().filter(|q| !q.is_empty()) {
            if !job.queue().is_some_and(|q| q.eq_ignore_ascii_case(queue)) {
                return false;
            }
        }
        if !self.states.is_empty() && !self.states.iter().any(|s| s.eq_ignore_ascii_case(job.state())) {
            return false;
        }
        duration_matches(self.duration.as_ref(), job, now)
    }

    pub fn apply_at(&self, jobs: Vec<Job>, now: DateTime<Utc>) -> Vec<Job> {
        if self.is_empty() {
            return jobs;
        }
        jobs.into_iter().filter(|j| self.matches_at(j, now)).collect()
    }

    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        self.apply_at(jobs, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_with(number: u64, message: &str, started: Option<i64>, finished: Option<i64>) -> Build {
        let at = |secs: i64| DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap();
        let mut build: Build = serde_json::from_value(serde_json::json!({ "number": number })).unwrap();
        build.message = Some(message.to_string());
        build.started_at = started.map(at);
        build.finished_at = finished.map(at);
        build
    }

    #[test]
    fn test_parse_duration_filter() {
        let f: DurationFilter = ">1h30m".parse().unwrap();
        assert_eq!(f.comparison, Comparison::GreaterThan);
        assert_eq!(f.threshold, Duration::seconds(5400));

        let f: DurationFilter = "45s".parse().unwrap();
        assert_eq!(f.comparison, Comparison::AtLeast);
        assert_eq!(f.threshold, Duration::seconds(45));

        assert_eq!("<=2m".parse::<DurationFilter>().unwrap().comparison, Comparison::AtMost);
        assert_eq!("<2m".parse::<DurationFilter>().unwrap().comparison, Comparison::LessThan);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", ">", "10", "10x", "1.5h", "m10", ">>10m"] {
            assert!(input.parse::<DurationFilter>().is_err(), "{input}");
        }
    }

    #[test]
    fn test_duration_excludes_unstarted() {
        let now = DateTime::from_timestamp(1_700_010_000, 0).unwrap();
        let filter = BuildFilter {
            duration: Some("<1h".parse().unwrap()),
            ..Default::default()
        };
        let builds = vec![
            build_with(3, "a", None, None),
            build_with(2, "b", Some(0), Some(60)),
            build_with(1, "c", Some(0), None),
        ];
        let kept = filter.apply_at(builds, now);
        assert_eq!(kept.iter().map(|b| b.number).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_message_is_case_insensitive() {
        let filter = BuildFilter {
            message: Some("FIX".into()),
            ..Default::default()
        };
        let builds = vec![build_with(2, "Fix flaky test", None, None), build_with(1, "Add docs", None, None)];
        let kept = filter.apply(builds);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].number, 2);
    }

    #[test]
    fn test_no_filters_returns_input() {
        let builds = vec![build_with(2, "a", None, None), build_with(1, "b", None, None)];
        assert_eq!(BuildFilter::default().apply(builds.clone()), builds);
    }

    #[test]
    fn test_job_filter_queue_and_state() {
        let job = |id: &str, state: &str, queue: &str| -> Job {
            serde_json::from_value(serde_json::json!({
                "id": id,
                "type": "script",
                "state": state,
                "agent_query_rules": [format!("queue={queue}")],
            }))
            .unwrap()
        };
        let filter = JobFilter {
            queue: Some("Linux".into()),
            states: vec!["failed".into()],
            duration: None,
        };
        let kept = filter.apply(vec![
            job("1", "failed", "linux"),
            job("2", "passed", "linux"),
            job("3", "failed", "macos"),
        ]);
        assert_eq!(kept.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(), vec!["1"]);
    }
}
