//
//  buildkite-cli
//  output/table.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Table formatting on `comfy_table`, plus colouring for Buildkite states.
//!
//! ```rust
//! use buildkite_cli::output::TableBuilder;
//!
//! let table = TableBuilder::new()
//!     .color(false)
//!     .headers(["NUMBER", "STATE"])
//!     .row(["42", "passed"])
//!     .render();
//! assert!(table.contains("passed"));
//! ```

use std::io::{self, Write};

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;

/// A table with the shared preset and dynamic column widths.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Builder for tables with cyan headers.
pub struct TableBuilder {
    table: Table,
    color: bool,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            table: create_table(),
            color: console::colors_enabled(),
        }
    }

    pub fn color(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    /// Sets the header row. Call after [`color`](Self::color).
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        if self.color {
            self.table
                .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
        } else {
            self.table.set_header(headers);
        }
        self
    }

    pub fn row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let row: Vec<String> = cells.into_iter().map(Into::into).collect();
        self.table.add_row(row);
        self
    }

    pub fn rows<I, R, S>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for row in rows {
            self = self.row(row);
        }
        self
    }

    pub fn render(&self) -> String {
        self.table.to_string()
    }

    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", self.table)
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Colours a build, job or agent state.
///
/// | Colour | States |
/// |--------|--------|
/// | green | passed, connected |
/// | red | failed, broken, timed_out, canceled, lost |
/// | yellow | running, scheduled, creating, assigned, accepted, canceling, timing_out, blocked |
/// | dim | skipped, not_run, waiting, pending, disconnected |
pub fn format_status(status: &str, color: bool) -> String {
    if !color {
        return status.to_string();
    }

    match status.to_lowercase().as_str() {
        "passed" | "connected" => style(status).green().to_string(),
        "failed" | "broken" | "timed_out" | "canceled" | "lost" => style(status).red().to_string(),
        "running" | "scheduled" | "creating" | "assigned" | "accepted" | "canceling" | "timing_out"
        | "blocked" => style(status).yellow().to_string(),
        "skipped" | "not_run" | "waiting" | "pending" | "disconnected" => style(status).dim().to_string(),
        _ => status.to_string(),
    }
}

/// Shortens `s` to at most `max_len` characters, ending in `...`.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_status_without_color() {
        assert_eq!(format_status("failed", false), "failed");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Fix flaky deploy step", 10), "Fix fla...");
        assert_eq!(truncate("ünïcödé text", 6), "ünï...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_table_renders_rows() {
        let rendered = TableBuilder::new()
            .color(false)
            .headers(["NUMBER", "STATE"])
            .rows([["42", "passed"], ["41", "failed"]])
            .render();
        assert!(rendered.contains("NUMBER"));
        assert!(rendered.contains("42"));
        assert!(rendered.contains("failed"));
    }
}
