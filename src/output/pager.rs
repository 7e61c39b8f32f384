//
//  buildkite-cli
//  output/pager.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Pager child process for long text output.
//!
//! The command comes from `PAGER` (default `less -R`) and is split with
//! shell quoting rules. When the program is `less` and none of its
//! arguments already turns on raw control characters, `-R` is appended so
//! colours survive.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use thiserror::Error;

/// Pager used when `PAGER` is unset or empty.
pub const DEFAULT_PAGER: &str = "less -R";

/// Failure reported by [`Pager::cleanup`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pager failed: {0}")]
pub struct PagerError(String);

/// Resolves the pager argv from a `PAGER` value.
///
/// # Returns
///
/// `None` when the value cannot be split or names no program.
///
/// # Example
///
/// ```rust
/// use buildkite_cli::output::pager::pager_command;
///
/// assert_eq!(pager_command(None).unwrap(), vec!["less", "-R"]);
/// assert_eq!(pager_command(Some("/usr/bin/less -S")).unwrap(), vec!["/usr/bin/less", "-S", "-R"]);
/// assert_eq!(pager_command(Some("more")).unwrap(), vec!["more"]);
/// ```
pub fn pager_command(pager: Option<&str>) -> Option<Vec<String>> {
    let spec = pager.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PAGER);
    let mut argv = match shell_words::split(spec) {
        Ok(argv) => argv,
        Err(e) => {
            tracing::warn!("Ignoring PAGER {:?}: {}", spec, e);
            return None;
        }
    };
    let program = argv.first()?;
    if is_less(program) && !argv[1..].iter().any(|a| is_raw_flag(a)) {
        argv.push("-R".to_string());
    }
    Some(argv)
}

fn is_less(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "less" || n == "less.exe")
}

fn is_raw_flag(arg: &str) -> bool {
    arg == "-R" || arg == "--RAW-CONTROL-CHARS" || arg.starts_with("--RAW-CONTROL-CHARS=")
}

/// A running pager. Writes go to its stdin.
///
/// # Notes
///
/// - A pager the user quits early closes its stdin; further writes are
///   discarded instead of failing
/// - Dropping the pager runs [`cleanup`](Self::cleanup)
pub struct Pager {
    child: Child,
    stdin: Option<ChildStdin>,
    outcome: Option<Result<(), PagerError>>,
}

impl Pager {
    /// Spawns the pager named by `PAGER`.
    ///
    /// Returns `Ok(None)` when no usable pager command is configured.
    pub fn from_env() -> io::Result<Option<Self>> {
        let pager = std::env::var("PAGER").ok();
        match pager_command(pager.as_deref()) {
            Some(argv) => match Self::spawn(&argv) {
                Ok(pager) => Ok(Some(pager)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("Pager {:?} not found, writing to stdout", argv[0]);
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    pub fn spawn(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty pager command"))?;
        tracing::debug!("Starting pager {:?}", argv);
        let mut child = Command::new(program).args(args).stdin(Stdio::piped()).spawn()?;
        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            outcome: None,
        })
    }

    /// Closes the pipe and waits for the pager to exit.
    ///
    /// Only the first call does any work; later calls return the first
    /// call's result.
    pub fn cleanup(&mut self) -> Result<(), PagerError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        drop(self.stdin.take());
        let outcome = self
            .child
            .wait()
            .map(|status| tracing::debug!("Pager exited with {}", status))
            .map_err(|e| PagerError(e.to_string()));
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Write for Pager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(buf.len());
        };
        match stdin.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(buf.len())
            }
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut().map(|s| s.flush()) {
            Some(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.stdin = None;
                Ok(())
            }
            Some(result) => result,
            None => Ok(()),
        }
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_less_gets_raw_flag() {
        assert_eq!(pager_command(Some("less")).unwrap(), vec!["less", "-R"]);
        assert_eq!(pager_command(Some("")).unwrap(), vec!["less", "-R"]);
    }

    #[test]
    fn test_existing_raw_flag_is_kept() {
        assert_eq!(pager_command(Some("less -R")).unwrap(), vec!["less", "-R"]);
        assert_eq!(
            pager_command(Some("less --RAW-CONTROL-CHARS")).unwrap(),
            vec!["less", "--RAW-CONTROL-CHARS"]
        );
        assert_eq!(
            pager_command(Some("less --RAW-CONTROL-CHARS=X")).unwrap(),
            vec!["less", "--RAW-CONTROL-CHARS=X"]
        );
    }

    #[test]
    fn test_program_match_is_by_file_name() {
        assert_eq!(pager_command(Some("lesspipe")).unwrap(), vec!["lesspipe"]);
        assert_eq!(pager_command(Some("/opt/less/bin/most")).unwrap(), vec!["/opt/less/bin/most"]);
        assert_eq!(
            pager_command(Some("'/usr/local/bin/less' -F")).unwrap(),
            vec!["/usr/local/bin/less", "-F", "-R"]
        );
    }

    #[test]
    fn test_unbalanced_quotes_disable_pager() {
        assert_eq!(pager_command(Some("less 'oops")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_is_idempotent() {
        let mut pager = Pager::spawn(&["cat".to_string()]).unwrap();
        pager.write_all(b"").unwrap();
        let first = pager.cleanup();
        assert_eq!(first, Ok(()));
        assert_eq!(pager.cleanup(), first);
        assert_eq!(pager.cleanup(), first);
        pager.write_all(b"ignored after cleanup").unwrap();
    }
}
