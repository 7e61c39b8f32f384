//
//  buildkite-cli
//  context/git.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Git Repository Operations
//!
//! Thin wrapper over `git2` for the repository facts the resolvers need:
//! the work tree root (for `.bk.yaml`), the current branch, and the
//! `origin` remote URLs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use buildkite_cli::context::git::GitContext;
//!
//! if let Some(git) = GitContext::discover() {
//!     println!("Branch: {:?}", git.current_branch());
//!     println!("Origin: {:?}", git.origin_urls());
//! }
//! ```
//!
//! ## Notes
//!
//! - `discover` walks up from the current directory
//! - Bare repositories have no work tree and therefore no root directory

use std::path::{Path, PathBuf};

use anyhow::Result;
use git2::Repository;

pub struct GitContext {
    repo: Repository,
}

impl GitContext {
    /// Finds the repository containing the current directory.
    pub fn discover() -> Option<Self> {
        match Repository::discover(".") {
            Ok(repo) => Some(Self { repo }),
            Err(e) => {
                tracing::debug!("Not in a git repository: {}", e.message());
                None
            }
        }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    /// The checked-out branch, or `None` when HEAD is detached or unborn.
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(str::to_string)
    }

    /// Fetch and push URLs of `origin`, without duplicates.
    pub fn origin_urls(&self) -> Vec<String> {
        let Ok(remote) = self.repo.find_remote("origin") else {
            return Vec::new();
        };
        let mut urls: Vec<String> = Vec::new();
        for url in [remote.url(), remote.pushurl()].into_iter().flatten() {
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    pub fn root_dir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_urls_include_push_url() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.remote("origin", "https://github.com/acme/web.git").unwrap();
        repo.remote_set_pushurl("origin", Some("git@github.com:acme/web.git"))
            .unwrap();

        let git = GitContext::open_at(dir.path()).unwrap();
        assert_eq!(
            git.origin_urls(),
            vec!["https://github.com/acme/web.git", "git@github.com:acme/web.git"]
        );
        assert_eq!(
            git.root_dir().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_unborn_head_has_no_branch() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let git = GitContext::open_at(dir.path()).unwrap();
        assert_eq!(git.current_branch(), None);
        assert!(git.origin_urls().is_empty());
    }
}
