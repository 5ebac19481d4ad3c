//! The reliably-send envelope.
//!
//! Submission errors fall in three classes. Expected errors, such as a duplicate submission, mean
//! the goal is already reached: they are logged and the call succeeds with no response.
//! Unrecoverable errors are returned at once. Everything else is retried with exponential backoff.

use std::{future::Future, time::Duration};

use tracing::{info, warn};
use vigilante_common::retry::{retry_with, Strategy};

use crate::errors::AppChainError;

/// Multiplier of the exponential backoff between two attempts.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Delay bounds of the envelope's backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBounds {
    /// Delay after the first failure.
    pub initial: Duration,

    /// Upper bound of the delay.
    pub max: Duration,
}

/// Runs `send` until it succeeds, fails with an unrecoverable error or fails with an expected
/// error, in which case `Ok(None)` is returned.
pub async fn reliably_send<T, Fut, F>(
    bounds: RetryBounds,
    expected: &[&str],
    unrecoverable: &[&str],
    mut send: F,
) -> Result<Option<T>, AppChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppChainError>>,
{
    let expected_owned: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    let unrecoverable_owned: Vec<String> = unrecoverable.iter().map(|s| s.to_string()).collect();

    let strategy = Strategy::exponential_backoff(bounds.initial, bounds.max, BACKOFF_MULTIPLIER)
        .stop_on(move |err: &AppChainError| {
            let msg = err.to_string();
            expected_owned
                .iter()
                .chain(unrecoverable_owned.iter())
                .any(|p| msg.contains(p.as_str()))
        });

    let res = retry_with(&strategy, || {
        let attempt = send();
        async move {
            attempt.await.inspect_err(|err| {
                warn!(%err, "message submission failed");
            })
        }
    })
    .await;

    match res {
        Ok(resp) => Ok(Some(resp)),
        Err(err) if err.matches_any(expected) => {
            info!(%err, "message submission hit an expected error");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const BOUNDS: RetryBounds = RetryBounds {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(100),
    };

    fn failed(log: &str) -> AppChainError {
        AppChainError::TxFailed {
            tx_hash: "AB".into(),
            code: 1,
            log: log.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let attempts = &AtomicUsize::new(0);

        let res = reliably_send(BOUNDS, &["duplicate"], &["invalid"], move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(AppChainError::Transport("connection refused".into()))
            } else {
                Ok(7u32)
            }
        })
        .await;

        assert_eq!(res, Ok(Some(7)));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn expected_errors_succeed_without_response() {
        let attempts = &AtomicUsize::new(0);

        let res: Result<Option<u32>, _> =
            reliably_send(BOUNDS, &["duplicate"], &["invalid"], move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(failed("duplicate unbonding"))
            })
            .await;

        assert_eq!(res, Ok(None));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_errors_propagate() {
        let attempts = &AtomicUsize::new(0);

        let res: Result<Option<u32>, _> =
            reliably_send(BOUNDS, &["duplicate"], &["invalid"], move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(failed("invalid signature"))
            })
            .await;

        assert_eq!(res, Err(failed("invalid signature")));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
