use std::{sync::Arc, time::Duration};

use prometheus::Registry;
use secp256k1::{SecretKey, SECP256K1};
use tokio_util::sync::CancellationToken;
use vigilante_test_utils::{
    fixtures::{Covenant, DelegationFixture},
    mock_app_chain::MockAppChain,
    mock_btc::MockBtc,
};

use crate::{config::BtcStakingTrackerConfig, context::Context, metrics::TrackerMetrics};

/// Settings with intervals short enough for tests. Delegations are paged two at a time.
pub(crate) fn test_config() -> BtcStakingTrackerConfig {
    BtcStakingTrackerConfig {
        check_delegations_interval: Duration::from_millis(20),
        new_delegations_batch_size: 2,
        check_delegation_active_interval: Duration::from_millis(20),
        retry_submit_unbonding_tx_interval: Duration::from_millis(20),
        retry_jitter: Duration::from_millis(5),
        retry_sleep_time: Duration::from_millis(5),
        max_retry_sleep_time: Duration::from_millis(20),
        slashing_start_height: 0,
        evidences_page_size: 1,
        slashing_queue_capacity: 4,
    }
}

/// In-memory Bitcoin and App chain shared by the components under test.
pub(crate) struct TestEnv {
    pub(crate) btc: Arc<MockBtc>,
    pub(crate) app: Arc<MockAppChain>,
    pub(crate) cfg: BtcStakingTrackerConfig,
}

impl TestEnv {
    /// Both chains agree on a Bitcoin tip at `height`.
    pub(crate) fn new(height: u32) -> Self {
        let app = MockAppChain::new();
        app.set_btc_tip(height);

        Self {
            btc: Arc::new(MockBtc::with_height(height)),
            app: Arc::new(app),
            cfg: test_config(),
        }
    }

    /// A context over the mocks with fresh metrics and its own shutdown token.
    pub(crate) fn context(&self) -> Context {
        let metrics = TrackerMetrics::new(&Registry::new()).expect("fresh registry");

        Context::new(
            self.cfg.clone(),
            self.btc.clone(),
            self.btc.clone(),
            self.app.clone(),
            metrics,
            CancellationToken::new(),
        )
    }

    fn register(&self, fixture: &DelegationFixture) {
        self.app.add_params(fixture.covenant.params.clone());
        for sk in &fixture.fp_sks {
            self.app
                .add_finality_provider(sk.x_only_public_key(SECP256K1).0);
        }
        self.app.set_delegation(fixture.delegation.clone());
    }

    /// A delegation whose staking transaction is mined, ACTIVE on the App chain.
    pub(crate) fn active_delegation(
        &self,
        covenant: &Covenant,
        fp_sks: &[SecretKey],
    ) -> DelegationFixture {
        let fixture = DelegationFixture::new(covenant, fp_sks, self.btc.height() + 1);
        self.btc.mine(vec![fixture.delegation.staking_tx.clone()]);
        self.app.set_btc_tip(self.btc.height());
        self.register(&fixture);

        fixture
    }

    /// A delegation whose staking transaction is not included yet, PENDING on the App chain.
    pub(crate) fn pending_delegation(
        &self,
        covenant: &Covenant,
        fp_sks: &[SecretKey],
    ) -> DelegationFixture {
        let fixture = DelegationFixture::new(covenant, fp_sks, self.btc.height() + 50);
        self.register(&fixture);

        fixture
    }
}

/// Polls `cond` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
