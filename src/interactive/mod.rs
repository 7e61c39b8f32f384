//
//  buildkite-cli
//  interactive/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Terminal prompts built on `dialoguer`.
//!
//! Callers decide whether prompting is allowed (see
//! `Factory::is_interactive`); nothing here checks for a TTY.

pub mod prompt;
pub mod selector;

pub use prompt::*;
pub use selector::*;
