//
//  buildkite-cli
//  output/spinner.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Spinner shown on stderr while a future runs.

use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

struct SpinnerGuard(ProgressBar);

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

/// Runs `fut` with a spinner titled `title`.
///
/// The spinner is skipped when `quiet` is set or stderr is not a terminal.
/// It is cleared when the future completes or is dropped, so a Ctrl-C
/// leaves the terminal clean.
///
/// # Example
///
/// ```rust,no_run
/// use buildkite_cli::output::spin_while;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let value = spin_while("Loading build", false, async { Ok::<_, anyhow::Error>(42) }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn spin_while<F, T>(title: &str, quiet: bool, fut: F) -> T
where
    F: Future<Output = T>,
{
    if quiet || !console::Term::stderr().is_term() {
        return fut.await;
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(title.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    let _guard = SpinnerGuard(bar);
    fut.await
}
