//
//  buildkite-cli
//  workers/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Concurrency Utilities
//!
//! Bounded fan-out for bulk operations (agent stop, artifact download,
//! queue lookups) and a single progress renderer fed by status events.
//!
//! ## Model
//!
//! - Tasks are dispatched in input order. Each one holds a semaphore permit
//!   for its whole lifetime, so at most `limit` run at once.
//! - Every task reports `InProgress`, then `Succeeded` or `Failed`, over an
//!   unbounded channel. One renderer task consumes the channel, so progress
//!   output is totally ordered.
//! - Results are re-associated with their input position; the returned
//!   vector is in input order regardless of completion order.
//! - Dropping the returned future drops the [`JoinSet`], which aborts every
//!   task still in flight.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

/// Concurrent agent stops.
pub const DEFAULT_STOP_PARALLELISM: usize = 5;

/// Concurrent artifact downloads.
pub const DEFAULT_DOWNLOAD_PARALLELISM: usize = 10;

/// Concurrent GraphQL lookups during queue resolution.
pub const MAX_PARALLEL_LOOKUPS: usize = 10;

/// Lifecycle of one task in a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// A progress event for one task. `index` is the task's input position,
/// which stays unique when ids repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub index: usize,
    pub id: String,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// The result of one task, tagged with its id.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub id: String,
    pub result: Result<T>,
}

fn notify(
    tx: &Option<UnboundedSender<StatusUpdate>>,
    index: usize,
    id: &str,
    status: TaskStatus,
    error: Option<String>,
) {
    if let Some(tx) = tx {
        // the renderer may already be gone during shutdown
        let _ = tx.send(StatusUpdate {
            index,
            id: id.to_string(),
            status,
            error,
        });
    }
}

/// Runs `task` for every item with at most `limit` in flight.
///
/// # Parameters
///
/// * `items` - `(id, input)` pairs, dispatched in order
/// * `limit` - Maximum concurrent tasks (clamped to at least 1)
/// * `updates` - Optional channel receiving [`StatusUpdate`] events
/// * `task` - Builds the future for one input
///
/// # Returns
///
/// One [`TaskOutcome`] per input, in input order.
///
/// # Example
///
/// ```rust,no_run
/// use buildkite_cli::workers::run_bounded;
///
/// # async fn example() {
/// let items = vec![("a".to_string(), 1), ("b".to_string(), 2)];
/// let outcomes = run_bounded(items, 5, None, |n| async move { Ok(n * 2) }).await;
/// assert_eq!(outcomes[1].result.as_ref().unwrap(), &4);
/// # }
/// ```
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<(String, I)>,
    limit: usize,
    updates: Option<UnboundedSender<StatusUpdate>>,
    task: F,
) -> Vec<TaskOutcome<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let ids: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
    for (index, id) in ids.iter().enumerate() {
        notify(&updates, index, id, TaskStatus::Pending, None);
    }

    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for (index, (id, item)) in items.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let fut = task(item);
        let tx = updates.clone();
        set.spawn(async move {
            let _permit = permit;
            notify(&tx, index, &id, TaskStatus::InProgress, None);
            let result = fut.await;
            match &result {
                Ok(_) => notify(&tx, index, &id, TaskStatus::Succeeded, None),
                Err(e) => notify(&tx, index, &id, TaskStatus::Failed, Some(format!("{e:#}"))),
            }
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = ids.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::warn!("Worker task failed: {}", e),
        }
    }

    ids.into_iter()
        .zip(slots)
        .map(|(id, slot)| {
            let result = slot.unwrap_or_else(|| Err(anyhow!("Task for {id} did not complete")));
            TaskOutcome { id, result }
        })
        .collect()
}

/// Spawns the progress renderer for a bulk operation.
///
/// On a terminal, each input position gets a live spinner line that is
/// redrawn on every event. Elsewhere, each event after `Pending` is printed as one line.
/// Drop every sender and await the handle to flush the final frame.
pub fn spawn_progress(
    ids: &[String],
    interactive: bool,
) -> (UnboundedSender<StatusUpdate>, JoinHandle<()>) {
    let (tx, rx) = unbounded_channel();
    let handle = if interactive {
        let multi = MultiProgress::new();
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bars: Vec<ProgressBar> = ids
            .iter()
            .map(|id| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(spinner.clone());
                bar.set_prefix(id.clone());
                bar.set_message("pending");
                bar
            })
            .collect();
        tokio::spawn(render_bars(rx, bars))
    } else {
        tokio::spawn(render_lines(rx))
    };
    (tx, handle)
}

async fn render_bars(mut rx: UnboundedReceiver<StatusUpdate>, bars: Vec<ProgressBar>) {
    while let Some(update) = rx.recv().await {
        let Some(bar) = bars.get(update.index) else {
            continue;
        };
        match update.status {
            TaskStatus::Pending => bar.set_message("pending"),
            TaskStatus::InProgress => {
                bar.enable_steady_tick(std::time::Duration::from_millis(100));
                bar.set_message("in progress");
            }
            TaskStatus::Succeeded => bar.finish_with_message(style("✓ done").green().to_string()),
            TaskStatus::Failed => bar.finish_with_message(
                style(format!("✗ {}", update.error.unwrap_or_default()))
                    .red()
                    .to_string(),
            ),
        }
    }
    for bar in &bars {
        if !bar.is_finished() {
            bar.abandon();
        }
    }
}

async fn render_lines(mut rx: UnboundedReceiver<StatusUpdate>) {
    while let Some(update) = rx.recv().await {
        match update.status {
            TaskStatus::Pending => {}
            TaskStatus::InProgress => eprintln!("{}: in progress", update.id),
            TaskStatus::Succeeded => eprintln!("{}: done", update.id),
            TaskStatus::Failed => eprintln!(
                "{}: failed: {}",
                update.id,
                update.error.unwrap_or_default()
            ),
        }
    }
}

/// Awaits three fetches concurrently and returns the first error in
/// argument order, after all three have finished.
pub async fn join3<A, B, C>(
    a: impl Future<Output = Result<A>>,
    b: impl Future<Output = Result<B>>,
    c: impl Future<Output = Result<C>>,
) -> Result<(A, B, C)> {
    let (a, b, c) = tokio::join!(a, b, c);
    let errors: Vec<String> = [a.as_ref().err(), b.as_ref().err(), c.as_ref().err()]
        .into_iter()
        .flatten()
        .map(|e| format!("{e:#}"))
        .collect();
    if errors.len() > 1 {
        tracing::debug!("Concurrent fetch failed: {}", errors.join("; "));
    }
    Ok((a?, b?, c?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_limit_and_keeps_input_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<(String, u64)> = "abcdefgh"
            .chars()
            .enumerate()
            .map(|(i, c)| (c.to_string(), 8 - i as u64))
            .collect();

        let outcomes = run_bounded(items, 3, None, |delay| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay * 5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(delay)
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f", "g", "h"]);
        assert_eq!(outcomes[0].result.as_ref().unwrap(), &8);
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_item() {
        let (tx, mut rx) = unbounded_channel();
        let items = vec![("ok".to_string(), true), ("bad".to_string(), false)];
        let outcomes = run_bounded(items, 2, Some(tx), |good| async move {
            if good {
                Ok(())
            } else {
                Err(anyhow!("boom"))
            }
        })
        .await;

        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());

        let mut events = Vec::new();
        while let Ok(update) = rx.try_recv() {
            events.push(update);
        }
        assert!(events
            .iter()
            .any(|u| u.id == "bad" && u.status == TaskStatus::Failed && u.error.as_deref() == Some("boom")));
        assert!(events
            .iter()
            .any(|u| u.id == "ok" && u.status == TaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_repeated_ids_get_separate_progress() {
        let (tx, mut rx) = unbounded_channel();
        let items = vec![("a1".to_string(), ()), ("a1".to_string(), ())];
        let outcomes = run_bounded(items, 2, Some(tx), |_| async { Ok(()) }).await;
        assert_eq!(outcomes.len(), 2);

        let bars = vec![ProgressBar::hidden(), ProgressBar::hidden()];
        let (render_tx, render_rx) = unbounded_channel();
        let mut finished = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if update.status == TaskStatus::Succeeded {
                finished.push(update.index);
            }
            render_tx.send(update).unwrap();
        }
        drop(render_tx);
        render_bars(render_rx, bars.clone()).await;

        finished.sort_unstable();
        assert_eq!(finished, vec![0, 1]);
        assert!(bars.iter().all(|bar| bar.is_finished()));
    }

    #[tokio::test]
    async fn test_join3_returns_first_error_in_order() {
        let result = join3(
            async { Ok::<_, anyhow::Error>(1) },
            async { Err::<u8, _>(anyhow!("second")) },
            async { Err::<u8, _>(anyhow!("third")) },
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "second");
    }
}
