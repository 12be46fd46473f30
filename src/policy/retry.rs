use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{KitError, Result};

/// Bounded repeat-on-failure policy.
///
/// The first try counts as attempt 1. Cancellation is never retried, and a
/// cancellation arriving during the pause surfaces as [`KitError::Canceled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            pause: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, pause: Duration) -> Self {
        Self { max_attempts, pause }
    }

    /// Runs `action` until it succeeds, fails with a cancellation, or the
    /// attempt budget is spent. `action` receives the attempt number.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut action: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match action(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_cancellation() || attempt >= self.max_attempts {
                return Err(err);
            }

            log::warn!(
                "attempt {attempt}/{} failed: {err}; repeating in {:?}",
                self.max_attempts,
                self.pause
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(KitError::Canceled),
                _ = tokio::time::sleep(self.pause) => {}
            }
            attempt += 1;
        }
    }
}

/// Shorthand for `RetryPolicy::new(max_attempts, pause).run(cancel, action)`.
pub async fn repeat<T, F, Fut>(
    cancel: &CancellationToken,
    max_attempts: u32,
    pause: Duration,
    action: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(max_attempts, pause).run(cancel, action).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use url::Url;

    fn status_error() -> KitError {
        KitError::HttpStatus {
            status: 500,
            url: Url::parse("https://example.com/").unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let res: Result<()> = repeat(&cancel, 3, Duration::from_secs(10), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(status_error()) }
        })
        .await;

        assert!(matches!(res, Err(KitError::HttpStatus { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let res: Result<()> = repeat(&cancel, 3, Duration::from_secs(10), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(KitError::Canceled) }
        })
        .await;

        assert!(matches!(res, Err(KitError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_a_later_attempt() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let res = RetryPolicy::new(5, Duration::from_secs(2))
            .run(&cancel, |attempt| async move {
                if attempt < 3 {
                    Err(status_error())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(res.unwrap(), 3);
        // two pauses between three attempts
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause_surfaces_as_cancellation() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let counter = calls.clone();
        let res: Result<()> = repeat(&cancel, 5, Duration::from_secs(10), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(status_error()) }
        })
        .await;

        assert!(matches!(res, Err(KitError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_budget_does_not_pause() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let res: Result<()> = repeat(&cancel, 1, Duration::from_secs(10), |_| async { Err(status_error()) }).await;

        assert!(res.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
