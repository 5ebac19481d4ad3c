//! State shared by the tracker components.

use std::{fmt, future::Future, sync::Arc};

use btc_notify::{errors::BtcRpcError, traits::ChainNotifier};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use vigilante_app_chain::{errors::AppChainError, traits::AppChainClient};
use vigilante_common::retry::{retry_with, Strategy};

use crate::{
    config::BtcStakingTrackerConfig, constants::BACKOFF_MULTIPLIER, metrics::TrackerMetrics,
    params::ParamsCache, traits::BtcNode,
};

/// Adapters, settings and shutdown signal handed to every component.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) cfg: Arc<BtcStakingTrackerConfig>,
    pub(crate) btc: Arc<dyn BtcNode>,
    pub(crate) notifier: Arc<dyn ChainNotifier>,
    pub(crate) app: Arc<dyn AppChainClient>,
    pub(crate) params: Arc<ParamsCache>,
    pub(crate) metrics: TrackerMetrics,
    pub(crate) cancel: CancellationToken,
}

#[cfg_attr(coverage_nightly, coverage(off))]
impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cfg", &self.cfg)
            .field("metrics", &self.metrics)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        cfg: BtcStakingTrackerConfig,
        btc: Arc<dyn BtcNode>,
        notifier: Arc<dyn ChainNotifier>,
        app: Arc<dyn AppChainClient>,
        metrics: TrackerMetrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            btc,
            notifier,
            app,
            params: Arc::new(ParamsCache::default()),
            metrics,
            cancel,
        }
    }

    /// Exponential backoff between `retry_sleep_time` and `max_retry_sleep_time`, never giving
    /// up.
    pub(crate) fn backoff<E: Send + Sync + 'static>(&self) -> Strategy<E> {
        Strategy::exponential_backoff(
            self.cfg.retry_sleep_time,
            self.cfg.max_retry_sleep_time,
            BACKOFF_MULTIPLIER,
        )
    }

    /// Runs `f` until it succeeds, backing off between failures.
    ///
    /// Gives up on shutdown and on the first error another attempt cannot fix.
    pub(crate) async fn retry<T, E, Fut, F>(&self, what: &'static str, mut f: F) -> Result<T, Halted<E>>
    where
        E: Permanence + fmt::Display + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>>,
        F: FnMut() -> Fut,
    {
        let strategy = self.backoff::<E>().stop_on(E::is_permanent);
        let attempts = retry_with(&strategy, || {
            let attempt = f();
            async move {
                attempt.await.inspect_err(|err| {
                    if !err.is_permanent() {
                        warn!(%what, %err, "request failed, retrying");
                    }
                })
            }
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halted::Shutdown),
            res = attempts => res.map_err(|err| {
                error!(%what, %err, "request failed for good");
                Halted::Permanent(err)
            }),
        }
    }

    /// Sleeps for `duration`. Returns `false` if shutdown was requested in the meantime.
    pub(crate) async fn sleep(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Errors that another attempt cannot fix.
pub(crate) trait Permanence {
    fn is_permanent(&self) -> bool;
}

impl Permanence for AppChainError {
    fn is_permanent(&self) -> bool {
        matches!(self, AppChainError::Decode(_))
    }
}

impl Permanence for BtcRpcError {
    fn is_permanent(&self) -> bool {
        matches!(self, BtcRpcError::Decode { .. })
    }
}

/// Why [`Context::retry`] returned without a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Halted<E> {
    /// Shutdown was requested.
    Shutdown,

    /// The last attempt failed with a permanent error.
    Permanent(E),
}

impl<E> Halted<E> {
    /// The caller's error for this outcome, `shutdown` standing for a requested shutdown.
    pub(crate) fn into_error<T: From<E>>(self, shutdown: T) -> T {
        match self {
            Halted::Shutdown => shutdown,
            Halted::Permanent(err) => err.into(),
        }
    }
}

/// Awaits every task of `tasks`, logging the ones that panicked.
pub(crate) async fn join_all(component: &'static str, tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            if err.is_panic() {
                error!(%component, %err, "task panicked");
            }
        }
    }
}
