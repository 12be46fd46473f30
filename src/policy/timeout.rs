use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{KitError, Result};

/// Runs `action` on a cancellation scope linked to `cancel`, cancelling the
/// scope after `timeout`.
///
/// `action` receives the linked scope and should observe it at its suspension
/// points; the guard also stops polling `action` as soon as the scope is
/// cancelled. The outcome is classified as follows:
///
/// - the timer fired (and the caller did not cancel): [`KitError::Timeout`] with the bound,
/// - the caller cancelled: [`KitError::Canceled`],
/// - otherwise whatever `action` returned.
///
/// The timer task is always stopped and awaited before returning.
pub async fn with_timeout<T, F, Fut>(cancel: &CancellationToken, timeout: Duration, action: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scope = cancel.child_token();
    let fired = Arc::new(AtomicBool::new(false));

    let timer = {
        let scope = scope.clone();
        let fired = fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = scope.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    fired.store(true, Ordering::SeqCst);
                    scope.cancel();
                }
            }
        })
    };

    let result = tokio::select! {
        res = action(scope.clone()) => res,
        _ = scope.cancelled() => Err(KitError::Canceled),
    };

    timer.abort();
    let _ = timer.await;

    match result {
        Err(err) if err.is_cancellation() && fired.load(Ordering::SeqCst) && !cancel.is_cancelled() => {
            log::warn!("operation timed out after {timeout:?}");
            Err(KitError::Timeout(timeout))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn never_completing_action_times_out() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let res: Result<()> = with_timeout(&cancel, Duration::from_secs(1), |_scope| std::future::pending()).await;

        assert!(matches!(res, Err(KitError::Timeout(d)) if d == Duration::from_secs(1)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_is_not_a_timeout() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let res: Result<()> = with_timeout(&cancel, Duration::from_secs(5), |scope| async move {
            scope.cancelled().await;
            Err(KitError::Canceled)
        })
        .await;

        assert!(matches!(res, Err(KitError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_action_passes_through() {
        let cancel = CancellationToken::new();
        let res = with_timeout(&cancel, Duration::from_secs(1), |_| async { Ok(42) }).await;
        assert_eq!(res.unwrap(), 42);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn action_errors_are_not_reclassified() {
        let cancel = CancellationToken::new();
        let res: Result<()> = with_timeout(&cancel, Duration::from_secs(1), |_| async {
            Err(KitError::TransientTransport("reset".into()))
        })
        .await;
        assert!(matches!(res, Err(KitError::TransientTransport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn action_observing_its_scope_times_out_too() {
        let cancel = CancellationToken::new();
        let res: Result<()> = with_timeout(&cancel, Duration::from_secs(2), |scope| async move {
            tokio::select! {
                _ = scope.cancelled() => Err(KitError::Canceled),
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
            }
        })
        .await;
        assert!(matches!(res, Err(KitError::Timeout(_))));
    }
}
