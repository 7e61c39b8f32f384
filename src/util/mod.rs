//
//  buildkite-cli
//  util/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Utility Module
//!
//! Small helpers shared by the commands.
//!
//! ## Categories
//!
//! - **Time Utilities**: [`format_time`], [`format_duration`], [`format_relative_time`]
//! - **Size Utilities**: [`format_size`]
//! - **Text Utilities**: [`strip_timestamps`], [`strip_html`]
//! - **Input Utilities**: [`parse_key_value`], [`parse_env_file`]
//! - **System Utilities**: [`open_browser`]
//!
//! ## Example
//!
//! ```rust
//! use buildkite_cli::util::{format_size, strip_timestamps};
//!
//! assert_eq!(format_size(1536), "1.5 KB");
//! assert_eq!(strip_timestamps("\x1b_bk;t=1700000000000\x07hello"), "\x1b_hello");
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CliError;

static LOG_TIMESTAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"bk;t=\d+\x07").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Formats a timestamp in local time, e.g. `2024-01-15 14:30`.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Formats a duration as its two largest units.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use buildkite_cli::util::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
/// assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Run time of a record that started at `started`, as of `now` when it has
/// not finished. `-` when it never started.
pub fn format_elapsed(
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    match started {
        Some(start) => {
            let elapsed = finished.unwrap_or(now) - start;
            format_duration(elapsed.to_std().unwrap_or_default())
        }
        None => "-".to_string(),
    }
}

/// Formats a timestamp relative to `now`, e.g. `5 minutes ago`.
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_seconds();
    if diff < 0 {
        return "in the future".to_string();
    }

    let plural = |n: i64, unit: &str| format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" });
    match diff {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(diff / 60, "minute"),
        3600..=86_399 => plural(diff / 3600, "hour"),
        86_400..=604_799 => plural(diff / 86_400, "day"),
        604_800..=2_591_999 => plural(diff / 604_800, "week"),
        2_592_000..=31_535_999 => plural(diff / 2_592_000, "month"),
        _ => plural(diff / 31_536_000, "year"),
    }
}

/// Formats a byte count with binary units.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Removes the agent's inline `bk;t=<millis>` BEL-terminated timestamps
/// from job log output.
pub fn strip_timestamps(log: &str) -> String {
    LOG_TIMESTAMP.replace_all(log, "").into_owned()
}

/// Reduces annotation HTML to plain text.
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, "");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    BLANK_RUNS.replace_all(text.trim(), "\n\n").into_owned()
}

/// Splits a `KEY=VALUE` argument.
///
/// The value may be empty and may itself contain `=`.
pub fn parse_key_value(input: &str) -> Result<(String, String)> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(CliError::validation(format!("Invalid KEY=VALUE pair \"{input}\"")).into()),
    }
}

/// Parses a list of `KEY=VALUE` arguments; later keys win.
pub fn parse_key_values<S: AsRef<str>>(inputs: &[S]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for input in inputs {
        let (key, value) = parse_key_value(input.as_ref())?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Reads an env file of `KEY=VALUE` lines.
///
/// Blank lines and lines starting with `#` are ignored; a leading
/// `export ` is allowed; matching single or double quotes around the value
/// are removed.
pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file {}", path.display()))?;
    parse_env_content(&content).with_context(|| format!("Invalid env file {}", path.display()))
}

fn parse_env_content(content: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = parse_key_value(line)?;
        let value = value.trim();
        let unquoted = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| {
                value
                    .strip_prefix(*open)
                    .and_then(|v| v.strip_suffix(*close))
            })
            .unwrap_or(value);
        map.insert(key, unquoted.to_string());
    }
    Ok(map)
}

/// Opens `url` in the default browser.
pub fn open_browser(url: &str) -> Result<()> {
    tracing::debug!("Opening {}", url);
    webbrowser::open(url).with_context(|| format!("Failed to open {url} in a browser"))
}
