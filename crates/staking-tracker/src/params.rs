//! Staking parameters cached by version.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use tracing::debug;
use vigilante_app_chain::errors::AppChainError;
use vigilante_primitives::params::StakingParams;

use crate::context::{Context, Halted};

/// Staking parameters fetched so far.
///
/// A version's parameters never change once published, entries are never evicted.
#[derive(Debug, Default)]
pub(crate) struct ParamsCache {
    by_version: Mutex<HashMap<u32, StakingParams>>,
}

impl ParamsCache {
    pub(crate) fn get(&self, version: u32) -> Option<StakingParams> {
        self.by_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&version)
            .cloned()
    }

    pub(crate) fn insert(&self, params: StakingParams) {
        self.by_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(params.version, params);
    }
}

impl Context {
    /// The parameters of `version`, fetched from the App chain on first use.
    ///
    /// Fails if shutdown is requested before the query succeeds or the parameters do not decode.
    pub(crate) async fn staking_params(
        &self,
        version: u32,
    ) -> Result<StakingParams, Halted<AppChainError>> {
        if let Some(params) = self.params.get(version) {
            return Ok(params);
        }

        let params = self
            .retry("btc_staking_params_by_version", || {
                self.app.btc_staking_params_by_version(version)
            })
            .await?;

        debug!(%version, "cached staking params");
        self.params.insert(params.clone());

        Ok(params)
    }
}
