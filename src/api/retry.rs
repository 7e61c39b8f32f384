//
//  buildkite-cli
//  api/retry.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Rate-Limit Retry
//!
//! Only `429 Too Many Requests` is retried. The delay before attempt `n`
//! (zero-based) is `RetryAfter × 2^n`, capped at the configured maximum.
//! Every other error is returned immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::ErrorResponse;

/// Default ceiling for a single retry delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Callback invoked before each sleep with `(attempt, delay)`.
pub type RetryCallback = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// How many times, and for how long, to wait out a rate limit.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Optional observer notified on each retry.
    pub on_retry: Option<RetryCallback>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            on_retry: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("max_delay", &self.max_delay)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            max_delay,
            on_retry: None,
        }
    }

    pub fn with_callback(mut self, callback: RetryCallback) -> Self {
        self.on_retry = Some(callback);
        self
    }

    /// Runs `op`, retrying while it fails with a 429 and attempts remain.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retry_after = match err.downcast_ref::<ErrorResponse>() {
                Some(resp) if resp.is_too_many_requests() => resp.retry_after(),
                _ => return Err(err),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }

            let delay = retry_delay(retry_after, attempt, self.max_delay);
            tracing::warn!(
                "Rate limited, retrying in {}s (attempt {}/{})",
                delay.as_secs(),
                attempt + 1,
                self.max_retries
            );
            if let Some(callback) = &self.on_retry {
                callback(attempt, delay);
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Delay before retry `attempt`: `retry_after × 2^attempt`, at most `max`.
pub fn retry_delay(retry_after: Duration, attempt: u32, max: Duration) -> Duration {
    retry_after
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn rate_limited(reset: &str) -> anyhow::Error {
        let mut headers = HeaderMap::new();
        headers.insert("RateLimit-Reset", HeaderValue::from_str(reset).unwrap());
        ErrorResponse {
            status_code: 429,
            status: "429 Too Many Requests".to_string(),
            url: "https://api.buildkite.com/v2/user".to_string(),
            body: String::new(),
            headers,
        }
        .into()
    }

    #[test]
    fn test_delay_sequence_doubles_and_caps() {
        let max = Duration::from_secs(10);
        let delays: Vec<u64> = (0..5)
            .map(|i| retry_delay(Duration::from_secs(1), i, max).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let max = Duration::from_secs(60);
        assert_eq!(retry_delay(Duration::from_secs(3), 40, max), max);
    }

    #[tokio::test]
    async fn test_retries_429_until_success() {
        let calls = AtomicU32::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let policy = RetryPolicy::new(3, Duration::from_secs(5))
            .with_callback(Arc::new(move |attempt, delay| {
                seen_cb.lock().unwrap().push((attempt, delay));
            }));

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(rate_limited("0"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, Duration::ZERO), (1, Duration::ZERO)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_secs(5));
        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited("0")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(5));
        let result: Result<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("connection reset")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
