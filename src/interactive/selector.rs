//
//  buildkite-cli
//  interactive/selector.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Interactive Selectors Module
//!
//! Single-choice lists for picking an organization or a pipeline.
//!
//! # Example
//!
//! ```no_run
//! use buildkite_cli::interactive::selector::select;
//!
//! let pipelines = vec!["web", "api", "deploy"];
//! if let Some(idx) = select("Select a pipeline", &pipelines).unwrap() {
//!     println!("Selected: {}", pipelines[idx]);
//! }
//! ```

use anyhow::Result;
use dialoguer::Select;

/// Prompts the user to choose one item.
///
/// # Parameters
///
/// * `message` - The prompt message displayed above the list
/// * `items` - The choices, rendered with `ToString`
///
/// # Returns
///
/// The zero-based index of the chosen item, or `None` when the user
/// dismissed the list with Esc or `q`.
///
/// # Notes
///
/// - Arrow keys or j/k move the cursor
/// - Long lists scroll
pub fn select<T: ToString>(message: &str, items: &[T]) -> Result<Option<usize>> {
    select_with_default(message, items, 0)
}

/// Like [`select`], with the cursor starting on `default`.
pub fn select_with_default<T: ToString>(
    message: &str,
    items: &[T],
    default: usize,
) -> Result<Option<usize>> {
    if items.is_empty() {
        return Ok(None);
    }
    let selection = Select::new()
        .with_prompt(message)
        .items(items)
        .default(default.min(items.len() - 1))
        .interact_opt()?;
    Ok(selection)
}
