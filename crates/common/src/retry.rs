//! Composable retry policies for fallible async calls.
//!
//! A [`Strategy`] classifies each error and decides how long to wait before the next attempt.
//! [`retry_with`] drives a future-generating closure under a strategy. There is no explicit
//! cancellation handle: callers that need to abort a retry loop race it against their shutdown
//! signal and drop it.

use std::{future::Future, sync::Arc, time::Duration};

use rand::Rng;

/// Type alias for the error handler function to reduce type complexity.
pub type ErrorHandler<E> = Arc<dyn Fn(&E, usize) -> RetryAction + Send + Sync>;

/// Represents the action to take when an error occurs during retry attempts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryAction {
    /// Continue retrying with the specified delay.
    Retry(Duration),

    /// Stop retrying and return the error.
    Stop,
}

/// A retry strategy that determines how to handle errors and when to retry.
#[derive(Clone)]
pub struct Strategy<E> {
    /// Determines the action to take for a given error and retry attempt number.
    error_handler: ErrorHandler<E>,

    /// Maximum number of retry attempts (None for unlimited).
    max_retries: Option<usize>,

    /// Upper bound of the uniform random delay added to every retry.
    jitter: Duration,
}

impl<E> std::fmt::Debug for Strategy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("max_retries", &self.max_retries)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl<E> Strategy<E> {
    /// Creates a new retry strategy with the given error handler.
    ///
    /// This will retry indefinitely unless a maximum number of retries is set later with
    /// [`Self::with_max_retries`].
    pub fn new<F>(error_handler: F) -> Self
    where
        F: Fn(&E, usize) -> RetryAction + Send + Sync + 'static,
    {
        Self {
            error_handler: Arc::new(error_handler),
            max_retries: None,
            jitter: Duration::ZERO,
        }
    }

    /// Sets the maximum number of retry attempts.
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Adds a uniformly distributed delay in `[0, jitter)` to every retry.
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Creates a strategy that retries with exponential backoff, starting at `initial_delay` and
    /// never waiting longer than `max_delay`.
    pub fn exponential_backoff(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Strategy<E>
    where
        E: Send + Sync + 'static,
    {
        Strategy::new(move |_error, attempt| {
            let delay_ms = (initial_delay.as_millis() as f64 * multiplier.powi(attempt as i32))
                .min(max_delay.as_millis() as f64) as u64;
            RetryAction::Retry(Duration::from_millis(delay_ms))
        })
    }

    /// Creates a strategy that retries with a fixed delay.
    pub fn fixed_delay(delay: Duration) -> Strategy<E>
    where
        E: Send + Sync + 'static,
    {
        Strategy::new(move |_error, _attempt| RetryAction::Retry(delay))
    }

    /// Wraps this strategy so that errors matching `is_fatal` stop the loop immediately.
    pub fn stop_on<P>(self, is_fatal: P) -> Strategy<E>
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let inner = self.error_handler;
        Strategy {
            error_handler: Arc::new(move |error, attempt| {
                if is_fatal(error) {
                    RetryAction::Stop
                } else {
                    inner(error, attempt)
                }
            }),
            max_retries: self.max_retries,
            jitter: self.jitter,
        }
    }

    /// Computes the action for the given error at the given attempt, applying the retry cap and
    /// the jitter.
    pub fn next_action(&self, error: &E, attempt: usize) -> RetryAction {
        if self.max_retries.is_some_and(|max| attempt >= max) {
            return RetryAction::Stop;
        }

        match (self.error_handler)(error, attempt) {
            RetryAction::Retry(delay) if !self.jitter.is_zero() => {
                let extra = rand::thread_rng().gen_range(Duration::ZERO..self.jitter);
                RetryAction::Retry(delay + extra)
            }
            action => action,
        }
    }
}

/// Runs `generator` until it succeeds or the strategy says to stop, in which case the last error
/// is returned.
pub async fn retry_with<A, E, Fut, Gen>(strategy: &Strategy<E>, mut generator: Gen) -> Result<A, E>
where
    Fut: Future<Output = Result<A, E>>,
    Gen: FnMut() -> Fut,
{
    let mut attempt = 0;

    loop {
        match generator().await {
            Ok(result) => return Ok(result),
            Err(error) => match strategy.next_action(&error, attempt) {
                RetryAction::Retry(delay) => {
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryAction::Stop => return Err(error),
            },
        }
    }
}
