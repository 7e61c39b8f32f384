//
//  buildkite-cli
//  output/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Output Module
//!
//! Renders command results as JSON, YAML, or human-readable text.
//!
//! - **Text**: tables and detail views, routed through a pager when stdout
//!   is a terminal
//! - **JSON**: pretty-printed, for scripting
//! - **YAML**: for scripting and for reading nested data
//!
//! ## Architecture
//!
//! - [`table`]: table construction on `comfy_table` and state colouring
//! - [`pager`]: `PAGER` resolution and the pager child process
//! - [`spinner`]: progress indicator around slow futures
//!
//! ## Core Components
//!
//! - [`OutputFormat`]: the `-o/--output` value
//! - [`OutputWriter`]: entry point for results and status messages
//! - [`TableOutput`]: detail views rendered as text
//! - [`TableRow`]: list items rendered as table rows
//!
//! ## Example
//!
//! ```rust,ignore
//! use buildkite_cli::output::{OutputFormat, OutputWriter};
//!
//! let writer = OutputWriter::new(OutputFormat::Json);
//! writer.write_list(&builds, "builds")?;
//! writer.write_success("Build #42 canceled");
//! ```

pub mod pager;
pub mod spinner;
mod table;

pub use pager::{Pager, PagerError};
pub use spinner::spin_while;
pub use table::*;

use std::io::{self, Write};

use clap::ValueEnum;
use console::style;
use serde::Serialize;

/// Available output formats.
///
/// # Notes
///
/// Errors follow the same choice: JSON and YAML modes write a
/// machine-readable error document to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
    /// Tables and detail views for people.
    #[default]
    Text,
}

impl OutputFormat {
    pub fn is_text(self) -> bool {
        self == OutputFormat::Text
    }
}

/// A value with a human-readable detail view.
pub trait TableOutput {
    /// Renders the view into `out`.
    ///
    /// # Parameters
    ///
    /// * `out` - Destination, the pager or stdout
    /// * `color` - Whether ANSI styling is allowed
    fn print_table(&self, out: &mut dyn Write, color: bool) -> io::Result<()>;
}

/// A list item rendered as one row of a table.
pub trait TableRow {
    /// Column headers, in row order.
    fn headers() -> Vec<&'static str>;

    /// Cell values, one per header.
    fn cells(&self, color: bool) -> Vec<String>;
}

/// Writes results and status messages in the selected format.
///
/// # Example
///
/// ```rust,ignore
/// use buildkite_cli::output::{OutputFormat, OutputWriter};
///
/// let writer = OutputWriter::new(OutputFormat::Text).with_pager(true);
/// writer.write(&build_view)?;
/// writer.write_warning("Build is still running");
/// ```
///
/// # Notes
///
/// Colour is detected from the terminal and honours `NO_COLOR`. The pager
/// is used only for text output when stdout is a terminal.
pub struct OutputWriter {
    format: OutputFormat,
    color: bool,
    paging: bool,
    quiet: bool,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: console::colors_enabled(),
            paging: false,
            quiet: false,
        }
    }

    /// Enables the pager when stdout is a terminal.
    pub fn with_pager(mut self, enabled: bool) -> Self {
        self.paging = enabled && console::Term::stdout().is_term();
        self
    }

    /// Suppresses informational and success messages.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn color_enabled(&self) -> bool {
        self.color
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Writes a value; text output uses the caller's renderer.
    ///
    /// # Parameters
    ///
    /// * `value` - Serialized as is for JSON and YAML
    /// * `render` - Text renderer, given the destination and colour flag
    pub fn write_with<T, F>(&self, value: &T, render: F) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(&mut dyn Write, bool) -> io::Result<()>,
    {
        match self.format {
            OutputFormat::Json => write_json_to(&mut io::stdout().lock(), value),
            OutputFormat::Yaml => write_yaml_to(&mut io::stdout().lock(), value),
            OutputFormat::Text => self.page(|out| render(out, self.color)),
        }
    }

    /// Writes a value with a [`TableOutput`] view.
    pub fn write<T: Serialize + TableOutput>(&self, value: &T) -> anyhow::Result<()> {
        self.write_with(value, |out, color| value.print_table(out, color))
    }

    /// Writes a list as a table, or `No <noun> found.` when empty.
    ///
    /// JSON and YAML always write the list, empty or not.
    pub fn write_list<T: Serialize + TableRow>(&self, values: &[T], noun: &str) -> anyhow::Result<()> {
        if self.format.is_text() && values.is_empty() {
            println!("No {noun} found.");
            return Ok(());
        }
        self.write_with(values, |out, color| {
            let table = TableBuilder::new()
                .color(color)
                .headers(T::headers())
                .rows(values.iter().map(|v| v.cells(color)));
            table.write_to(out)
        })
    }

    fn page<F>(&self, render: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        if self.paging {
            if let Some(mut pager) = Pager::from_env()? {
                render(&mut pager)?;
                pager.cleanup()?;
                return Ok(());
            }
        }
        let stdout = io::stdout();
        let mut out = stdout.lock();
        render(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_warning(&self, msg: &str) {
        if self.color {
            eprintln!("{} {}", style("warning:").yellow().bold(), msg);
        } else {
            eprintln!("warning: {}", msg);
        }
    }

    /// Informational line; on stderr unless the output is text, so JSON
    /// and YAML stay parsable.
    pub fn write_info(&self, msg: &str) {
        if self.quiet {
            return;
        }
        if self.format.is_text() {
            println!("{}", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    pub fn write_success(&self, msg: &str) {
        if self.quiet {
            return;
        }
        let line = if self.color {
            format!("{} {}", style("✓").green().bold(), msg)
        } else {
            format!("✓ {}", msg)
        };
        if self.format.is_text() {
            println!("{}", line);
        } else {
            eprintln!("{}", line);
        }
    }
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn write_json_to<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes `value` as YAML.
pub fn write_yaml_to<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> anyhow::Result<()> {
    serde_yaml::to_writer(&mut *writer, value)?;
    Ok(())
}

/// Prints a bold header with an underline.
pub fn print_header(out: &mut dyn Write, text: &str, color: bool) -> io::Result<()> {
    if color {
        writeln!(out, "{}", style(text).bold())?;
    } else {
        writeln!(out, "{}", text)?;
    }
    writeln!(out, "{}", "-".repeat(console::measure_text_width(text)))
}

/// Prints a `key: value` line with a dimmed key.
pub fn print_field(out: &mut dyn Write, key: &str, value: &str, color: bool) -> io::Result<()> {
    if color {
        writeln!(out, "{}: {}", style(key).dim(), value)
    } else {
        writeln!(out, "{}: {}", key, value)
    }
}
