//! Swap pipeline: register, verify, pay out and confirm
//!
//! Each `*_once` method is one pass of a background worker over the swaps in
//! the matching status. Failures of one swap are logged and never stop a pass.

use super::payout::{swap_from_tx_info, PayoutPlanner};
use crate::chain::{Bridge, ExtraArgs, PoolNonceHeight, RouterRegistry, TxStatus, VerifyArgs};
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::state::{RegisteredSwap, SwapKey, SwapResult, SwapStateMachine, SwapStatus};
use crate::tx::PayoutSender;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Status a swap is parked in when verification rejects it
pub fn failure_status(err: &RouterError) -> SwapStatus {
    match err.root() {
        RouterError::TxWithWrongValue => SwapStatus::WrongValue,
        RouterError::TxWithWrongPath => SwapStatus::WrongPath,
        RouterError::MissTokenConfig { .. } => SwapStatus::MissTokenConfig,
        RouterError::NoUnderlyingToken { .. } => SwapStatus::NoUnderlyingToken,
        RouterError::SwapInBlacklist(_) => SwapStatus::InBlacklist,
        _ => SwapStatus::VerifyFailed,
    }
}

/// Outcome of one worker pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct SwapPipeline {
    registry: Arc<RouterRegistry>,
    machine: Arc<SwapStateMachine>,
    planner: Arc<PayoutPlanner>,
    sender: PayoutSender,
    max_tx_not_found_secs: i64,
    scan_window_secs: i64,
    nonce_passed_wait_secs: i64,
    /// First time a lost payout's nonce was seen passed on chain
    nonce_passed_since: DashMap<SwapKey, i64>,
}

impl SwapPipeline {
    pub fn new(
        registry: Arc<RouterRegistry>,
        machine: Arc<SwapStateMachine>,
        planner: Arc<PayoutPlanner>,
        config: &RouterConfig,
    ) -> Self {
        let sender = PayoutSender::new(
            registry.clone(),
            machine.clone(),
            config.sign_with_private_key,
        );
        Self {
            registry,
            machine,
            planner,
            sender,
            max_tx_not_found_secs: config.max_tx_not_found_secs as i64,
            scan_window_secs: config.scan_window_secs as i64,
            nonce_passed_wait_secs: config.nonce_passed_wait_secs as i64,
            nonce_passed_since: DashMap::new(),
        }
    }

    pub fn machine(&self) -> &Arc<SwapStateMachine> {
        &self.machine
    }

    pub fn registry(&self) -> &Arc<RouterRegistry> {
        &self.registry
    }

    fn since(&self) -> i64 {
        now() - self.scan_window_secs
    }

    // ----- register -----

    /// Register every swap event of a source transaction.
    ///
    /// Events already registered are returned as stored.
    pub async fn register(
        &self,
        chain_id: u64,
        tx_hash: &str,
        log_index: u32,
    ) -> RouterResult<Vec<RegisteredSwap>> {
        let bridge = self.registry.get_bridge(chain_id)?;
        let args = VerifyArgs {
            log_index,
            allow_unstable: true,
        };
        let registrations = bridge.register_swap(tx_hash, &args).await?;

        let mut swaps = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let (status, memo) = match &registration.error {
                None => (SwapStatus::NotStable, String::new()),
                Some(e) if e.is_retryable() => (SwapStatus::NotStable, String::new()),
                Some(e) => (failure_status(e), e.to_string()),
            };
            let swap = swap_from_tx_info(registration.info, status, memo);
            match self.machine.register_swap(&swap).await {
                Ok(()) => swaps.push(swap),
                Err(RouterError::AlreadyExists { .. }) => {
                    debug!("Swap {} already registered", swap.key);
                    if let Some(existing) = self.machine.find_swap(&swap.key).await? {
                        swaps.push(existing);
                    }
                }
                Err(e) => return Err(e.context("register", &swap.key)),
            }
        }
        Ok(swaps)
    }

    // ----- verify -----

    pub async fn verify_once(&self) -> RouterResult<PassStats> {
        let swaps = self
            .machine
            .find_swaps_with_status(SwapStatus::NotStable, self.since(), None)
            .await?;
        let mut stats = PassStats {
            scanned: swaps.len(),
            ..Default::default()
        };
        for swap in swaps {
            match self.verify_swap(&swap).await {
                Ok(true) => stats.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.failed += 1;
                    log_swap_error("verify", &swap.key, &e);
                }
            }
        }
        Ok(stats)
    }

    /// Verify one `NotStable` swap; `Ok(false)` means try again later
    pub async fn verify_swap(&self, swap: &RegisteredSwap) -> RouterResult<bool> {
        let key = &swap.key;
        if self.registry.is_chain_paused(key.from_chain_id)
            || self.registry.is_chain_paused(swap.to_chain_id)
        {
            return Ok(false);
        }

        if let Some(reason) = self.registry.swap_blacklist_reason(swap) {
            self.set_failed(swap, SwapStatus::InBlacklist, &reason).await?;
            return Ok(true);
        }

        let bridge = self.registry.get_bridge(key.from_chain_id)?;
        let args = VerifyArgs {
            log_index: key.log_index,
            allow_unstable: false,
        };
        let verified = bridge
            .verify_transaction(&key.tx_id, &args)
            .await
            .and_then(|_| self.planner.check_swap(swap));

        match verified {
            Ok(true) => {
                self.machine
                    .update_swap_status(key, SwapStatus::WithBigValue, "big swap value")
                    .await?;
                metrics::record_swap_verified(key.from_chain_id, SwapStatus::WithBigValue);
                info!("Swap {} held back for its value", key);
            }
            Ok(false) => {
                self.machine.pass_swap_verify(key).await?;
                self.machine.add_initial_swap_result(swap).await?;
                metrics::record_swap_verified(key.from_chain_id, SwapStatus::NotSwapped);
                info!("Swap {} verified", key);
            }
            Err(e) if e.is_retryable() => {
                if swap.init_time + self.max_tx_not_found_secs >= now() {
                    debug!("Swap {} not verifiable yet: {}", key, e);
                    return Ok(false);
                }
                warn!(
                    "Swap {} not verifiable for {}s, marking failed: {}",
                    key,
                    now() - swap.init_time,
                    e
                );
                self.set_failed(swap, SwapStatus::VerifyFailed, &e.to_string())
                    .await?;
            }
            Err(e) => {
                info!("Swap {} rejected: {}", key, e);
                self.set_failed(swap, failure_status(&e), &e.to_string())
                    .await?;
            }
        }
        Ok(true)
    }

    async fn set_failed(
        &self,
        swap: &RegisteredSwap,
        status: SwapStatus,
        memo: &str,
    ) -> RouterResult<()> {
        self.machine.update_swap_status(&swap.key, status, memo).await?;
        metrics::record_swap_failed(swap.key.from_chain_id, status);
        Ok(())
    }

    // ----- swap -----

    pub async fn swap_once(&self) -> RouterResult<PassStats> {
        let swaps = self
            .machine
            .find_swaps_with_status(SwapStatus::NotSwapped, self.since(), None)
            .await?;
        let mut stats = PassStats {
            scanned: swaps.len(),
            ..Default::default()
        };
        for swap in swaps {
            match self.process_swap(&swap).await {
                Ok(true) => stats.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    stats.failed += 1;
                    log_swap_error("swap", &swap.key, &e);
                }
            }
        }
        Ok(stats)
    }

    /// Pay out one `NotSwapped` swap; `Ok(false)` means skipped for now
    pub async fn process_swap(&self, swap: &RegisteredSwap) -> RouterResult<bool> {
        let key = &swap.key;
        if self.registry.is_chain_paused(key.from_chain_id)
            || self.registry.is_chain_paused(swap.to_chain_id)
        {
            return Ok(false);
        }
        if let Some(reason) = self.registry.swap_blacklist_reason(swap) {
            self.set_failed(swap, SwapStatus::InBlacklist, &reason).await?;
            return Ok(true);
        }

        self.machine.add_initial_swap_result(swap).await?;
        let result = self
            .machine
            .find_result(key)
            .await?
            .ok_or_else(|| RouterError::SwapResultNotFound {
                key: key.to_string(),
            })?;
        let ready = matches!(
            result.status,
            SwapStatus::MatchTxEmpty | SwapStatus::Reswapping
        );
        if !ready || result.has_payout_artifacts() {
            warn!(
                "Swap {} already has a payout ({} nonce {} tx '{}')",
                key, result.status, result.swap_nonce, result.swap_tx
            );
            self.machine
                .update_swap_status(key, SwapStatus::Processed, "swap result exists")
                .await?;
            return Ok(true);
        }

        let args = self.planner.build_args(swap, ExtraArgs::default())?;
        self.sender.send(key, args).await?;
        Ok(true)
    }

    // ----- stable -----

    pub async fn stable_once(&self) -> RouterResult<PassStats> {
        let mut stats = PassStats::default();
        for chain_id in self.registry.chain_ids() {
            let bridge = self.registry.get_bridge(chain_id)?;
            let results = self
                .machine
                .find_results_to_stable(chain_id, self.since())
                .await?;
            stats.scanned += results.len();
            for result in results {
                match self.check_result(bridge.as_ref(), &result).await {
                    Ok(true) => stats.processed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        stats.failed += 1;
                        log_swap_error("stable", &result.key, &e);
                    }
                }
            }
        }
        self.machine.prune_locks();
        Ok(stats)
    }

    /// Check the payout of one `MatchTxNotStable` result; `Ok(true)` when it settled
    pub async fn check_result(&self, bridge: &dyn Bridge, result: &SwapResult) -> RouterResult<bool> {
        let mut found: Option<(String, TxStatus)> = None;
        for tx in result.all_swap_txs() {
            match bridge.get_transaction_status(&tx).await {
                Ok(status) if status.is_on_chain() => {
                    found = Some((tx, status));
                    break;
                }
                Ok(_) | Err(RouterError::TxNotFound { .. }) => {}
                Err(e) => return Err(e.context("stable", &result.key)),
            }
        }

        let Some((tx, status)) = found else {
            return self.check_lost_payout(bridge, result).await;
        };
        self.nonce_passed_since.remove(&result.key);

        let key = &result.key;
        if !tx.eq_ignore_ascii_case(&result.swap_tx) {
            info!("Replacement payout {} of swap {} landed", tx, key);
            self.machine.add_old_swap_tx(key, &tx).await?;
        }

        let required = self
            .registry
            .chain_config(result.to_chain_id)
            .map(|c| c.confirmations)
            .unwrap_or(1);
        if status.is_failed() {
            self.machine
                .update_swap_result_confirmation(
                    key,
                    SwapStatus::MatchTxFailed,
                    status.block_height,
                    status.block_time,
                    "payout tx reverted",
                )
                .await?;
            metrics::record_payout_failed(result.to_chain_id);
            warn!("Payout {} of swap {} reverted", tx, key);
            return Ok(true);
        }
        if status.confirmations >= required {
            self.machine
                .update_swap_result_confirmation(
                    key,
                    SwapStatus::MatchTxStable,
                    status.block_height,
                    status.block_time,
                    "",
                )
                .await?;
            metrics::record_payout_stable(result.to_chain_id);
            info!("Payout {} of swap {} is stable", tx, key);
            return Ok(true);
        }
        if result.swap_height == 0 {
            self.machine
                .update_swap_result_confirmation(
                    key,
                    SwapStatus::KeepStatus,
                    status.block_height,
                    status.block_time,
                    "",
                )
                .await?;
        }
        Ok(false)
    }

    /// A payout nowhere on chain fails once its nonce has been passed for long enough
    async fn check_lost_payout(&self, bridge: &dyn Bridge, result: &SwapResult) -> RouterResult<bool> {
        let Some(setter) = bridge.nonce_setter() else {
            return Ok(false);
        };
        let key = &result.key;
        let pool_nonce = setter
            .get_pool_nonce(&result.mpc, PoolNonceHeight::Latest)
            .await
            .map_err(|e| e.context("stable", key))?;
        if !setter.reswap_nonce_passed(pool_nonce, result.swap_nonce) {
            self.nonce_passed_since.remove(key);
            return Ok(false);
        }

        let since = *self.nonce_passed_since.entry(key.clone()).or_insert_with(now);
        if now() - since < self.nonce_passed_wait_secs {
            debug!(
                "Payout of swap {} missing with nonce {} passed (pool {})",
                key, result.swap_nonce, pool_nonce
            );
            return Ok(false);
        }

        self.machine
            .update_swap_result_status(
                key,
                SwapStatus::MatchTxFailed,
                &format!(
                    "payout tx not found and nonce {} passed (pool nonce {})",
                    result.swap_nonce, pool_nonce
                ),
            )
            .await?;
        self.nonce_passed_since.remove(key);
        metrics::record_payout_failed(result.to_chain_id);
        warn!("Payout of swap {} lost, marked failed", key);
        Ok(true)
    }
}

fn log_swap_error(worker: &str, key: &SwapKey, err: &RouterError) {
    if err.is_retryable() || err.is_rejection() {
        warn!("{} worker: swap {}: {}", worker, key, err);
    } else {
        error!("{} worker: swap {}: {}", worker, key, err);
        metrics::record_error(worker, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::FakeBridge;
    use crate::chain::{SwapInfo, SwapTxInfo};
    use crate::config::tests::SAMPLE;
    use crate::config::Settings;
    use crate::coordination::payout::tests::{two_chain_registry, SOURCE_USDC};
    use crate::state::MemoryStore;
    use ethers::types::U256;

    const TX: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
    const MPC: &str = "0x2222222222222222222222222222222222222222";

    struct Fixture {
        source: Arc<FakeBridge>,
        dest: Arc<FakeBridge>,
        pipeline: SwapPipeline,
    }

    fn fixture(nonce_passed_wait_secs: u64) -> Fixture {
        std::env::set_var("ROUTER_TEST_PUBKEY", "0x04abcd");
        let mut config = Settings::parse(SAMPLE).unwrap().router;
        config.nonce_passed_wait_secs = nonce_passed_wait_secs;

        let source = Arc::new(FakeBridge::new(1));
        let dest = Arc::new(FakeBridge::new(2));
        let registry = two_chain_registry(vec![
            source.clone() as Arc<dyn Bridge>,
            dest.clone() as Arc<dyn Bridge>,
        ]);
        let machine = Arc::new(SwapStateMachine::new(Arc::new(MemoryStore::new())));
        let planner = Arc::new(PayoutPlanner::new(registry.clone(), &config.identifier));
        let pipeline = SwapPipeline::new(registry, machine, planner, &config);
        Fixture {
            source,
            dest,
            pipeline,
        }
    }

    fn deposit(value: U256, from: &str) -> SwapTxInfo {
        SwapTxInfo {
            hash: TX.into(),
            log_index: 1,
            height: 90,
            timestamp: 0,
            from: from.into(),
            tx_to: "0x1111111111111111111111111111111111111111".into(),
            bind: "0x6666666666666666666666666666666666666666".into(),
            value,
            from_chain_id: 1,
            to_chain_id: 2,
            swap_info: SwapInfo::Erc20 {
                for_native: false,
                for_underlying: false,
                token: SOURCE_USDC.into(),
                token_id: "usdc".into(),
                path: vec![],
                amount_out_min: U256::zero(),
            },
        }
    }

    fn key() -> SwapKey {
        SwapKey::new(1, TX, 1)
    }

    async fn swap_status(f: &Fixture) -> SwapStatus {
        f.pipeline.machine().find_swap(&key()).await.unwrap().unwrap().status
    }

    async fn result(f: &Fixture) -> SwapResult {
        f.pipeline.machine().find_result(&key()).await.unwrap().unwrap()
    }

    fn mined(confirmations: u64, success: bool) -> TxStatus {
        TxStatus {
            confirmations,
            block_height: 120,
            block_hash: "0xbb".into(),
            block_time: 1_700_000_000,
            success: Some(success),
        }
    }

    #[test]
    fn test_failure_status_mapping() {
        let key = key();
        assert_eq!(
            failure_status(&RouterError::TxWithWrongValue.context("verify", &key)),
            SwapStatus::WrongValue
        );
        assert_eq!(
            failure_status(&RouterError::TxWithWrongPath),
            SwapStatus::WrongPath
        );
        assert_eq!(
            failure_status(&RouterError::TxWithWrongReceipt("no log".into())),
            SwapStatus::VerifyFailed
        );
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));

        let first = f.pipeline.register(1, TX, 1).await.unwrap();
        let second = f.pipeline.register(1, TX, 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].key, second[0].key);
        assert_eq!(second[0].status, SwapStatus::NotStable);
    }

    #[tokio::test]
    async fn test_full_swap_lifecycle() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();

        let stats = f.pipeline.verify_once().await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(swap_status(&f).await, SwapStatus::NotSwapped);
        assert_eq!(result(&f).await.status, SwapStatus::MatchTxEmpty);

        let stats = f.pipeline.swap_once().await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(swap_status(&f).await, SwapStatus::Processed);
        let paid = result(&f).await;
        assert_eq!(paid.status, SwapStatus::MatchTxNotStable);
        assert_eq!(paid.mpc, MPC);
        assert_eq!(f.dest.sent(), vec![paid.swap_tx.clone()]);

        // mined but not yet confirmed: height recorded, status kept
        f.dest.set_tx_status(&paid.swap_tx, mined(1, true));
        f.pipeline.stable_once().await.unwrap();
        let pending = result(&f).await;
        assert_eq!(pending.status, SwapStatus::MatchTxNotStable);
        assert_eq!(pending.swap_height, 120);

        f.dest.set_tx_status(&paid.swap_tx, mined(3, true));
        f.pipeline.stable_once().await.unwrap();
        assert_eq!(result(&f).await.status, SwapStatus::MatchTxStable);
    }

    #[tokio::test]
    async fn test_verify_marks_blacklisted_and_wrong_value() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x4444444444444444444444444444444444444444"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();
        assert_eq!(swap_status(&f).await, SwapStatus::InBlacklist);

        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::from(10u64), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();
        assert_eq!(swap_status(&f).await, SwapStatus::WrongValue);
    }

    #[tokio::test]
    async fn test_verify_retries_unstable_then_holds_big_value() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(11) + 1, "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();

        f.source.fail_verify(TX, || RouterError::TxNotStable);
        let stats = f.pipeline.verify_once().await.unwrap();
        assert_eq!(stats.processed, 0);
        assert_eq!(swap_status(&f).await, SwapStatus::NotStable);

        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(11) + 1, "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();
        assert_eq!(swap_status(&f).await, SwapStatus::WithBigValue);

        f.pipeline.machine().approve_big_value(&key()).await.unwrap();
        f.pipeline.swap_once().await.unwrap();
        assert_eq!(swap_status(&f).await, SwapStatus::Processed);
    }

    #[tokio::test]
    async fn test_paused_destination_is_skipped() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();

        f.pipeline.registry().pause_chain(2);
        let stats = f.pipeline.swap_once().await.unwrap();
        assert_eq!(stats.processed, 0);
        assert!(f.dest.sent().is_empty());
        assert_eq!(swap_status(&f).await, SwapStatus::NotSwapped);
    }

    #[tokio::test]
    async fn test_reverted_payout_then_reswap() {
        let f = fixture(600);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();
        f.pipeline.swap_once().await.unwrap();
        let paid = result(&f).await;

        f.dest.set_tx_status(&paid.swap_tx, mined(3, false));
        f.pipeline.stable_once().await.unwrap();
        assert_eq!(result(&f).await.status, SwapStatus::MatchTxFailed);

        // the chain has not moved past the payout nonce yet
        let err = f
            .pipeline
            .machine()
            .reswap(&key(), f.dest.as_ref())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonce too low"));

        f.dest.set_pool_nonce(MPC, 1);
        f.pipeline
            .machine()
            .reswap(&key(), f.dest.as_ref())
            .await
            .unwrap();
        assert_eq!(result(&f).await.status, SwapStatus::Reswapping);
        assert_eq!(swap_status(&f).await, SwapStatus::NotSwapped);

        f.pipeline.swap_once().await.unwrap();
        let repaid = result(&f).await;
        assert_eq!(repaid.status, SwapStatus::MatchTxNotStable);
        assert_eq!(repaid.swap_nonce, 1);
        assert_ne!(repaid.swap_tx, paid.swap_tx);
    }

    #[tokio::test]
    async fn test_lost_payout_fails_after_nonce_passed() {
        let f = fixture(0);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();
        f.pipeline.swap_once().await.unwrap();

        // tx unknown and pool nonce not past it: keep waiting
        f.pipeline.stable_once().await.unwrap();
        assert_eq!(result(&f).await.status, SwapStatus::MatchTxNotStable);

        f.dest.set_pool_nonce(MPC, 1);
        f.pipeline.stable_once().await.unwrap();
        let lost = result(&f).await;
        assert_eq!(lost.status, SwapStatus::MatchTxFailed);
        assert!(lost.memo.contains("nonce 0 passed"));
    }

    #[tokio::test]
    async fn test_failed_broadcast_waits_for_stable_check() {
        let f = fixture(0);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();

        f.dest.set_fail_send(true);
        let stats = f.pipeline.swap_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        let recorded = result(&f).await;
        assert_eq!(recorded.status, SwapStatus::MatchTxNotStable);
        assert!(!recorded.swap_tx.is_empty());
        assert_eq!(swap_status(&f).await, SwapStatus::Processed);
        assert!(f.dest.sent().is_empty());

        // no second payout while the first one is unresolved
        f.dest.set_fail_send(false);
        let stats = f.pipeline.swap_once().await.unwrap();
        assert_eq!(stats.scanned, 0);
        assert!(f.dest.sent().is_empty());

        // the tx did reach a node after all
        f.dest.set_tx_status(&recorded.swap_tx, mined(3, true));
        f.pipeline.stable_once().await.unwrap();
        let stable = result(&f).await;
        assert_eq!(stable.status, SwapStatus::MatchTxStable);
        assert_eq!(stable.swap_nonce, recorded.swap_nonce);
        assert_eq!(stable.swap_tx, recorded.swap_tx);
    }

    #[tokio::test]
    async fn test_failed_broadcast_lost_after_nonce_passed() {
        let f = fixture(0);
        f.source
            .add_swap(deposit(U256::exp10(8), "0x5555555555555555555555555555555555555555"));
        f.pipeline.register(1, TX, 1).await.unwrap();
        f.pipeline.verify_once().await.unwrap();

        f.dest.set_fail_send(true);
        f.pipeline.swap_once().await.unwrap();
        f.pipeline.stable_once().await.unwrap();
        assert_eq!(result(&f).await.status, SwapStatus::MatchTxNotStable);

        f.dest.set_pool_nonce(MPC, 1);
        f.pipeline.stable_once().await.unwrap();
        let lost = result(&f).await;
        assert_eq!(lost.status, SwapStatus::MatchTxFailed);
        assert!(lost.memo.contains("nonce 0 passed"));
        assert!(f.dest.sent().is_empty());
    }
}
