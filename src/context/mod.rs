//
//  buildkite-cli
//  context/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Target Resolution Module
//!
//! Turns loosely specified user input into a fully qualified target: a
//! `(org, pipeline)` pair or an `(org, pipeline, build)` triple.
//!
//! ## Overview
//!
//! Resolution is an ordered chain. Each link looks at one source (a flag,
//! a positional argument, the repository config, the git remote, an API
//! query) and either produces a value, skips, or fails:
//!
//! - [`Resolved::Found`] stops the chain with a value
//! - [`Resolved::Skip`] moves on to the next link
//! - An `Err` aborts the chain
//!
//! ## Architecture
//!
//! - [`Resolver`]: one link
//! - [`AggregateResolver`]: the ordered chain
//! - [`pipeline`]: pipeline links and the picker abstraction
//! - [`build`]: build links and the list-option builders
//! - [`git`]: repository facts used by the links
//!
//! ## Example
//!
//! ```rust,no_run
//! use buildkite_cli::context::{AggregateResolver, FlagPipelineResolver};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let chain = AggregateResolver::new()
//!     .with(FlagPipelineResolver::new(Some("acme/web"), "acme"));
//! if let Some(pipeline) = chain.resolve().await? {
//!     println!("{}/{}", pipeline.org, pipeline.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod git;
pub mod pipeline;

pub use build::*;
pub use git::GitContext;
pub use pipeline::*;

use anyhow::Result;
use async_trait::async_trait;

/// Outcome of a single resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The resolver produced a value; the chain stops here.
    Found(T),
    /// The resolver had nothing to say; try the next one.
    Skip,
}

/// One link in a resolution chain.
#[async_trait]
pub trait Resolver<T: Send>: Send + Sync {
    async fn resolve(&self) -> Result<Resolved<T>>;
}

/// An ordered list of resolvers evaluated first-match-wins.
///
/// # Example
///
/// ```rust,no_run
/// use buildkite_cli::context::{AggregateResolver, FlagPipelineResolver, PositionalPipelineResolver};
///
/// # async fn demo(args: Vec<String>) -> anyhow::Result<()> {
/// let chain = AggregateResolver::new()
///     .with(FlagPipelineResolver::new(None, "acme"))
///     .with(PositionalPipelineResolver::new(&args, 0, "acme"));
/// let pipeline = chain.resolve().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Notes
///
/// - Resolvers run sequentially, never concurrently
/// - Nothing is memoized; calling [`resolve`](Self::resolve) twice runs the
///   chain twice
pub struct AggregateResolver<'a, T> {
    resolvers: Vec<Box<dyn Resolver<T> + 'a>>,
}

impl<T: Send> Default for AggregateResolver<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Send> AggregateResolver<'a, T> {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Appends a resolver to the end of the chain.
    pub fn with(mut self, resolver: impl Resolver<T> + 'a) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Runs the chain.
    ///
    /// # Returns
    ///
    /// The first value produced, or `None` when every resolver skipped.
    ///
    /// # Errors
    ///
    /// The first error any resolver returns; later resolvers do not run.
    pub async fn resolve(&self) -> Result<Option<T>> {
        for (index, resolver) in self.resolvers.iter().enumerate() {
            if let Resolved::Found(value) = resolver.resolve().await? {
                tracing::debug!("Resolver {} of {} matched", index + 1, self.resolvers.len());
                return Ok(Some(value));
            }
        }
        tracing::debug!("No resolver matched");
        Ok(None)
    }
}
