//
//  buildkite-cli
//  interactive/prompt.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Interactive Prompts Module
//!
//! Text, password and confirmation prompts used by `configure`, `use` and
//! the confirmation steps of destructive or long-running commands.
//!
//! # Example
//!
//! ```no_run
//! use buildkite_cli::interactive::prompt::{prompt_input, prompt_password};
//!
//! let org = prompt_input("Organization slug:").unwrap();
//! let token = prompt_password("API token:").unwrap();
//! ```

use anyhow::Result;
use dialoguer::{Confirm, Input, Password};

/// Prompts the user for a non-empty line of text.
///
/// # Parameters
///
/// * `message` - The prompt message displayed to the user
///
/// # Returns
///
/// The trimmed input. Errors if the terminal interaction fails.
///
/// # Example
///
/// ```no_run
/// use buildkite_cli::interactive::prompt::prompt_input;
///
/// let slug = prompt_input("Organization slug:").unwrap();
/// ```
pub fn prompt_input(message: &str) -> Result<String> {
    let input: String = Input::new()
        .with_prompt(message)
        .validate_with(|value: &String| {
            if value.trim().is_empty() {
                Err("A value is required")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(input.trim().to_string())
}

/// Prompts the user for a secret without echoing it.
///
/// # Notes
///
/// - Characters are not echoed
/// - The value is returned as a plain `String`
pub fn prompt_password(message: &str) -> Result<String> {
    let password = Password::new().with_prompt(message).interact()?;
    Ok(password.trim().to_string())
}

/// Prompts for a yes/no answer with a default.
///
/// # Parameters
///
/// * `message` - The question
/// * `default` - The answer taken when the user presses Enter
///
/// # Example
///
/// ```no_run
/// use buildkite_cli::interactive::prompt::prompt_confirm_with_default;
///
/// let proceed = prompt_confirm_with_default("Cancel build #42?", false).unwrap();
/// ```
pub fn prompt_confirm_with_default(message: &str, default: bool) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(message)
        .default(default)
        .interact()?;
    Ok(confirmed)
}
