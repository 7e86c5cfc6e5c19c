//! Swap lifecycle state machine
//!
//! All status changes go through here. Updates to one swap are serialised by a
//! per-key async lock; the store update itself is a compare-and-set on the state
//! observed under that lock, so a second router process cannot slip in between.

use super::types::{
    QueryOrder, RegisteredSwap, ResultGuard, ResultUpdate, StatusQuery, SwapKey, SwapResult,
    SwapStatus, SwapUpdate,
};
use super::SwapStore;
use crate::chain::{Bridge, PoolNonceHeight};
use crate::error::{RouterError, RouterResult};

use dashmap::DashMap;
use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Upper bound on any status scan
pub const MAX_QUERY_RESULTS: usize = 1000;

/// Page size when scanning results waiting for confirmation
const RESULTS_TO_STABLE_LIMIT: usize = 100;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// One async mutex per swap key, created on demand
#[derive(Default)]
struct KeyedLocks {
    locks: DashMap<SwapKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &SwapKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody is holding or waiting on
    fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Operator-facing view of a swap
#[derive(Debug, Clone, Serialize)]
pub struct SwapStatusInfo {
    pub key: String,
    pub status: String,
    pub status_code: u16,
    pub memo: String,
    pub to_chain_id: u64,
    pub value: String,
    pub result: Option<SwapResultInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapResultInfo {
    pub status: String,
    pub status_code: u16,
    pub memo: String,
    pub swap_tx: String,
    pub old_swap_txs: Vec<String>,
    pub swap_nonce: u64,
    pub swap_height: u64,
    pub swap_value: String,
    pub mpc: String,
}

/// Enforces the swap transition graph on top of a `SwapStore`
pub struct SwapStateMachine {
    store: Arc<dyn SwapStore>,
    locks: KeyedLocks,
}

impl SwapStateMachine {
    pub fn new(store: Arc<dyn SwapStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SwapStore> {
        &self.store
    }

    /// Release lock entries for keys that are no longer being worked on
    pub fn prune_locks(&self) {
        self.locks.prune();
    }

    // ----- registered swaps -----

    /// Insert a new registered swap; a duplicate key is rejected
    pub async fn register_swap(&self, swap: &RegisteredSwap) -> RouterResult<()> {
        self.store.insert_swap(swap).await?;
        info!("Registered swap {} with status {}", swap.key, swap.status);
        crate::metrics::record_swap_registered(swap.key.from_chain_id, swap.status);
        Ok(())
    }

    /// `NotStable -> NotSwapped` after successful verification
    pub async fn pass_swap_verify(&self, key: &SwapKey) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let swap = self.require_swap(key).await?;
        if swap.status != SwapStatus::NotStable {
            return Err(RouterError::InvalidStatusTransition {
                from: swap.status,
                to: SwapStatus::NotSwapped,
            });
        }
        self.write_swap_status(&swap, SwapStatus::NotSwapped, Some(String::new()))
            .await
    }

    /// Generic registration status change; operator-only edges are rejected
    pub async fn update_swap_status(
        &self,
        key: &SwapKey,
        status: SwapStatus,
        memo: &str,
    ) -> RouterResult<()> {
        if status == SwapStatus::KeepStatus {
            return Ok(());
        }
        if status == SwapStatus::NotStable || !status.is_registration() {
            return Err(RouterError::GuardViolation(format!(
                "forbid update swap status to {}",
                status
            )));
        }

        let _guard = self.locks.lock(key).await;
        let swap = self.require_swap(key).await?;
        if !swap.status.can_transition_to(status) || swap.status.is_operator_only(status) {
            return Err(RouterError::InvalidStatusTransition {
                from: swap.status,
                to: status,
            });
        }

        let memo = if status == SwapStatus::NotSwapped {
            Some(String::new())
        } else if memo.is_empty() {
            None
        } else {
            Some(memo.to_string())
        };
        self.write_swap_status(&swap, status, memo).await
    }

    /// Manual recovery of a failed verification back to `NotStable`
    pub async fn reverify_swap(&self, key: &SwapKey) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let swap = self.require_swap(key).await?;
        if swap.status.is_registered_ok() {
            return Err(RouterError::GuardViolation(format!(
                "forbid reverify swap with status {}",
                swap.status
            )));
        }
        if let Some(result) = self.store.get_result(key).await? {
            if !result.swap_tx.is_empty() {
                return Err(RouterError::GuardViolation(
                    "forbid reverify swap with swaptx exists".to_string(),
                ));
            }
        }
        if !swap.status.can_transition_to(SwapStatus::NotStable) {
            return Err(RouterError::InvalidStatusTransition {
                from: swap.status,
                to: SwapStatus::NotStable,
            });
        }
        self.write_swap_status(&swap, SwapStatus::NotStable, Some(String::new()))
            .await
    }

    // ----- swap results -----

    /// Insert a swap result; a duplicate key is rejected
    pub async fn add_swap_result(&self, result: &SwapResult) -> RouterResult<()> {
        self.store.insert_result(result).await?;
        debug!("Added swap result {} with status {}", result.key, result.status);
        Ok(())
    }

    /// Create the result record for an accepted swap; an existing one is kept
    pub async fn add_initial_swap_result(&self, swap: &RegisteredSwap) -> RouterResult<()> {
        let result = SwapResult::from_swap(swap, SwapStatus::MatchTxEmpty, now());
        match self.store.insert_result(&result).await {
            Ok(()) | Err(RouterError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Record the payout nonce and signer for a swap, moving it to `MatchTxNotStable`.
    ///
    /// At most one nonce is ever recorded per swap; a repeated call with the same
    /// nonce and signer is a no-op.
    pub async fn assign_swap_nonce(
        &self,
        key: &SwapKey,
        mpc: &str,
        nonce: u64,
        swap_value: U256,
    ) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let result = self.require_result(key).await?;

        if result.status == SwapStatus::MatchTxNotStable {
            if result.swap_nonce == nonce && result.mpc.eq_ignore_ascii_case(mpc) {
                return Ok(());
            }
            return Err(RouterError::ForbidUpdateNonce {
                old: result.swap_nonce,
                new: nonce,
            });
        }
        if result.swap_nonce != 0 && result.swap_nonce != nonce {
            return Err(RouterError::ForbidUpdateNonce {
                old: result.swap_nonce,
                new: nonce,
            });
        }
        if !result.swap_tx.is_empty() {
            return Err(RouterError::ForbidUpdateSwapTx {
                old: result.swap_tx.clone(),
                new: String::new(),
            });
        }
        if !result
            .status
            .can_transition_to(SwapStatus::MatchTxNotStable)
        {
            return Err(RouterError::InvalidStatusTransition {
                from: result.status,
                to: SwapStatus::MatchTxNotStable,
            });
        }

        let update = ResultUpdate {
            status: Some(SwapStatus::MatchTxNotStable),
            mpc: Some(mpc.to_lowercase()),
            swap_nonce: Some(nonce),
            swap_value: Some(swap_value),
            memo: Some(String::new()),
            timestamp: now(),
            ..Default::default()
        };
        self.write_result(&result, &update).await?;

        let swap = self.require_swap(key).await?;
        if swap.status != SwapStatus::Processed {
            self.write_swap_status(&swap, SwapStatus::Processed, None)
                .await?;
        }

        info!("Assigned nonce {} from {} to swap {}", nonce, mpc, key);
        Ok(())
    }

    /// Field update of a swap result with write-once checks on nonce and tx
    pub async fn update_swap_result(&self, key: &SwapKey, update: ResultUpdate) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let result = self.require_result(key).await?;

        if result.status == SwapStatus::MatchTxStable {
            warn!("Ignore update of stable swap result {}", key);
            return Ok(());
        }

        let mut update = update;
        if let Some(status) = update.status {
            if status != SwapStatus::KeepStatus {
                if !status.is_result()
                    || !result.status.can_transition_to(status)
                    || result.status.is_operator_only(status)
                {
                    return Err(RouterError::InvalidStatusTransition {
                        from: result.status,
                        to: status,
                    });
                }
                if status == SwapStatus::MatchTxNotStable && update.memo.is_none() {
                    update.memo = Some(String::new());
                }
            }
        }

        check_payout_write_once(&result, &update)?;
        update.timestamp = now();
        self.write_result(&result, &update).await
    }

    /// Record the payout tx hash (write-once)
    pub async fn record_swap_tx(&self, key: &SwapKey, swap_tx: &str) -> RouterResult<()> {
        self.update_swap_result(
            key,
            ResultUpdate {
                swap_tx: Some(swap_tx.to_lowercase()),
                ..Default::default()
            },
        )
        .await
    }

    /// Status change of a result; moving back to `MatchTxEmpty` clears all payout artifacts
    pub async fn update_swap_result_status(
        &self,
        key: &SwapKey,
        status: SwapStatus,
        memo: &str,
    ) -> RouterResult<()> {
        if status == SwapStatus::MatchTxEmpty {
            return self.clear_swap_result(key, memo).await;
        }
        let mut update = ResultUpdate::with_status(status);
        if !memo.is_empty() {
            update.memo = Some(memo.to_string());
        }
        self.update_swap_result(key, update).await
    }

    /// Confirmation data observed on the destination chain
    pub async fn update_swap_result_confirmation(
        &self,
        key: &SwapKey,
        status: SwapStatus,
        swap_height: u64,
        swap_time: u64,
        memo: &str,
    ) -> RouterResult<()> {
        let update = ResultUpdate {
            status: Some(status),
            swap_height: Some(swap_height),
            swap_time: Some(swap_time),
            memo: if memo.is_empty() { None } else { Some(memo.to_string()) },
            ..Default::default()
        };
        self.update_swap_result(key, update).await
    }

    /// Reset a result to `MatchTxEmpty`, clearing tx, nonce, height, time and memo at once
    pub async fn clear_swap_result(&self, key: &SwapKey, memo: &str) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let result = self.require_result(key).await?;
        if result.status == SwapStatus::MatchTxEmpty && !result.has_payout_artifacts() {
            return Ok(());
        }
        if !result.status.can_transition_to(SwapStatus::MatchTxEmpty) {
            return Err(RouterError::InvalidStatusTransition {
                from: result.status,
                to: SwapStatus::MatchTxEmpty,
            });
        }
        let mut update = ResultUpdate::reset(SwapStatus::MatchTxEmpty);
        update.memo = Some(memo.to_string());
        update.timestamp = now();
        self.write_result(&result, &update).await?;
        info!("Cleared swap result {} ({})", key, memo);
        Ok(())
    }

    /// Roll back a payout that failed after its nonce was assigned.
    ///
    /// The result goes back to `MatchTxEmpty` and the swap to `NotSwapped`, so
    /// the swap worker builds it again.
    pub async fn abandon_payout(&self, key: &SwapKey, memo: &str) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let result = self.require_result(key).await?;
        if result.status != SwapStatus::MatchTxEmpty || result.has_payout_artifacts() {
            if !result.status.can_transition_to(SwapStatus::MatchTxEmpty) {
                return Err(RouterError::InvalidStatusTransition {
                    from: result.status,
                    to: SwapStatus::MatchTxEmpty,
                });
            }
            let mut update = ResultUpdate::reset(SwapStatus::MatchTxEmpty);
            update.memo = Some(memo.to_string());
            update.timestamp = now();
            self.write_result(&result, &update).await?;
        }

        let swap = self.require_swap(key).await?;
        if swap.status == SwapStatus::Processed {
            self.write_swap_status(&swap, SwapStatus::NotSwapped, Some(memo.to_string()))
                .await?;
        }
        warn!("Abandoned payout of swap {}: {}", key, memo);
        Ok(())
    }

    /// Replace the payout tx with `new_tx`, keeping the old hash for confirmation checks
    pub async fn add_old_swap_tx(&self, key: &SwapKey, new_tx: &str) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let result = self.require_result(key).await?;
        if result.swap_tx.eq_ignore_ascii_case(new_tx) {
            return Ok(());
        }

        let mut old_swap_txs = result.old_swap_txs.clone();
        if !result.swap_tx.is_empty() && !old_swap_txs.contains(&result.swap_tx) {
            old_swap_txs.push(result.swap_tx.clone());
        }
        let update = ResultUpdate {
            swap_tx: Some(new_tx.to_lowercase()),
            old_swap_txs: Some(old_swap_txs),
            timestamp: now(),
            ..Default::default()
        };
        self.write_result(&result, &update).await
    }

    // ----- operator actions -----

    /// Approve a swap held back for its value
    pub async fn approve_big_value(&self, key: &SwapKey) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let swap = self.require_swap(key).await?;
        if swap.status != SwapStatus::WithBigValue {
            return Err(RouterError::GuardViolation(format!(
                "swap status is {}, not big value status",
                swap.status
            )));
        }
        match self.store.get_result(key).await? {
            Some(result) if result.has_payout_artifacts() => {
                return Err(RouterError::GuardViolation("swaptx exists".to_string()));
            }
            Some(_) => {}
            None => {
                let result = SwapResult::from_swap(&swap, SwapStatus::MatchTxEmpty, now());
                match self.store.insert_result(&result).await {
                    Ok(()) | Err(RouterError::AlreadyExists { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        self.write_swap_status(&swap, SwapStatus::NotSwapped, Some(String::new()))
            .await?;
        info!("Approved big value swap {}", key);
        Ok(())
    }

    /// Retry a failed payout after proving the old one cannot land
    pub async fn reswap(&self, key: &SwapKey, bridge: &dyn Bridge) -> RouterResult<()> {
        let _guard = self.locks.lock(key).await;
        let swap = self.require_swap(key).await?;
        if swap.status != SwapStatus::Processed {
            return Err(RouterError::GuardViolation(format!(
                "swap status is {}, can not reswap",
                swap.status
            )));
        }
        let result = self.require_result(key).await?;
        if !result.status.can_reswap() {
            return Err(RouterError::GuardViolation(format!(
                "swap result status is {}, can not reswap",
                result.status
            )));
        }
        if result.swap_tx.is_empty() {
            return Err(RouterError::GuardViolation(
                "swap without swaptx".to_string(),
            ));
        }

        for tx in result.all_swap_txs() {
            match bridge.get_transaction_status(&tx).await {
                Ok(status) if status.is_on_chain() && !status.is_failed() => {
                    let update = ResultUpdate {
                        status: Some(SwapStatus::MatchTxNotStable),
                        swap_tx: Some(tx.clone()),
                        swap_height: Some(status.block_height),
                        swap_time: Some(status.block_time),
                        memo: Some(String::new()),
                        timestamp: now(),
                        ..Default::default()
                    };
                    self.write_result(&result, &update).await?;
                    return Err(RouterError::GuardViolation(format!(
                        "swap succeed with swaptx {}",
                        tx
                    )));
                }
                Ok(_) | Err(RouterError::TxNotFound { .. }) => {}
                Err(e) => return Err(e.context("reswap", key)),
            }
        }

        if let Some(nonce_setter) = bridge.nonce_setter() {
            let pool_nonce = nonce_setter
                .get_pool_nonce(&result.mpc, PoolNonceHeight::Latest)
                .await
                .map_err(|e| e.context("reswap", key))?;
            if !nonce_setter.reswap_nonce_passed(pool_nonce, result.swap_nonce) {
                return Err(RouterError::GuardViolation(format!(
                    "nonce too low: pool nonce {} has not passed swap nonce {}",
                    pool_nonce, result.swap_nonce
                )));
            }
        }

        let mut update = ResultUpdate::reset(SwapStatus::Reswapping);
        update.timestamp = now();
        self.write_result(&result, &update).await?;
        self.write_swap_status(&swap, SwapStatus::NotSwapped, Some(String::new()))
            .await?;

        info!("Reswap of {} accepted", key);
        Ok(())
    }

    // ----- queries -----

    pub async fn find_swap(&self, key: &SwapKey) -> RouterResult<Option<RegisteredSwap>> {
        self.store.get_swap(key).await
    }

    /// Exact lookup, falling back to the first swap of the tx when `log_index` is 0
    pub async fn find_swap_auto(&self, key: &SwapKey) -> RouterResult<Option<RegisteredSwap>> {
        match self.store.get_swap(key).await? {
            Some(swap) => Ok(Some(swap)),
            None if key.log_index == 0 => {
                self.store
                    .find_first_swap(key.from_chain_id, &key.tx_id)
                    .await
            }
            None => Ok(None),
        }
    }

    pub async fn find_result(&self, key: &SwapKey) -> RouterResult<Option<SwapResult>> {
        self.store.get_result(key).await
    }

    pub async fn find_result_auto(&self, key: &SwapKey) -> RouterResult<Option<SwapResult>> {
        match self.store.get_result(key).await? {
            Some(result) => Ok(Some(result)),
            None if key.log_index == 0 => {
                self.store
                    .find_first_result(key.from_chain_id, &key.tx_id)
                    .await
            }
            None => Ok(None),
        }
    }

    pub async fn find_swaps_with_status(
        &self,
        status: SwapStatus,
        since: i64,
        from_chain_id: Option<u64>,
    ) -> RouterResult<Vec<RegisteredSwap>> {
        let query = StatusQuery {
            status,
            since,
            from_chain_id,
            to_chain_id: None,
            order: QueryOrder::InitTime,
            limit: MAX_QUERY_RESULTS,
        };
        self.store.query_swaps(&query).await
    }

    pub async fn find_results_with_status(
        &self,
        status: SwapStatus,
        since: i64,
        to_chain_id: Option<u64>,
    ) -> RouterResult<Vec<SwapResult>> {
        let query = StatusQuery {
            status,
            since,
            from_chain_id: None,
            to_chain_id,
            order: QueryOrder::InitTime,
            limit: MAX_QUERY_RESULTS,
        };
        self.store.query_results(&query).await
    }

    /// Payouts waiting for confirmation on `to_chain_id`, lowest nonce first
    pub async fn find_results_to_stable(
        &self,
        to_chain_id: u64,
        since: i64,
    ) -> RouterResult<Vec<SwapResult>> {
        let query = StatusQuery {
            status: SwapStatus::MatchTxNotStable,
            since,
            from_chain_id: None,
            to_chain_id: Some(to_chain_id),
            order: QueryOrder::SwapNonce,
            limit: RESULTS_TO_STABLE_LIMIT,
        };
        self.store.query_results(&query).await
    }

    /// Next unused payout nonce for `mpc` according to the store
    pub async fn find_next_swap_nonce(&self, to_chain_id: u64, mpc: &str) -> RouterResult<u64> {
        Ok(self
            .store
            .max_swap_nonce(to_chain_id, &mpc.to_lowercase())
            .await?
            .map_or(0, |n| n + 1))
    }

    pub async fn status_counts(&self) -> RouterResult<Vec<(SwapStatus, u64)>> {
        self.store.count_by_status().await
    }

    /// Status string and reason for operators; `None` when the swap is unknown
    pub async fn swap_status_info(&self, key: &SwapKey) -> RouterResult<Option<SwapStatusInfo>> {
        let swap = match self.find_swap_auto(key).await? {
            Some(swap) => swap,
            None => return Ok(None),
        };
        let result = self.store.get_result(&swap.key).await?;
        Ok(Some(SwapStatusInfo {
            key: swap.key.to_string(),
            status: swap.status.to_string(),
            status_code: swap.status.code(),
            memo: swap.memo.clone(),
            to_chain_id: swap.to_chain_id,
            value: swap.value.to_string(),
            result: result.map(|r| SwapResultInfo {
                status: r.status.to_string(),
                status_code: r.status.code(),
                memo: r.memo,
                swap_tx: r.swap_tx,
                old_swap_txs: r.old_swap_txs,
                swap_nonce: r.swap_nonce,
                swap_height: r.swap_height,
                swap_value: r.swap_value.to_string(),
                mpc: r.mpc,
            }),
        }))
    }

    // ----- helpers -----

    async fn require_swap(&self, key: &SwapKey) -> RouterResult<RegisteredSwap> {
        self.store
            .get_swap(key)
            .await?
            .ok_or_else(|| RouterError::SwapNotFound {
                key: key.to_string(),
            })
    }

    async fn require_result(&self, key: &SwapKey) -> RouterResult<SwapResult> {
        self.store
            .get_result(key)
            .await?
            .ok_or_else(|| RouterError::SwapResultNotFound {
                key: key.to_string(),
            })
    }

    async fn write_swap_status(
        &self,
        swap: &RegisteredSwap,
        status: SwapStatus,
        memo: Option<String>,
    ) -> RouterResult<()> {
        let update = SwapUpdate {
            status: Some(status),
            memo,
            timestamp: now(),
        };
        if !self
            .store
            .update_swap(&swap.key, &update, Some(swap.status))
            .await?
        {
            return Err(RouterError::Store(format!(
                "swap {} changed concurrently",
                swap.key
            )));
        }
        debug!("Swap {} status {} -> {}", swap.key, swap.status, status);
        Ok(())
    }

    /// Compare-and-set against the state observed under the key lock
    async fn write_result(&self, observed: &SwapResult, update: &ResultUpdate) -> RouterResult<()> {
        let guard = ResultGuard::observed(observed);
        if self
            .store
            .update_result(&observed.key, update, &guard)
            .await?
        {
            return Ok(());
        }

        // Another process won the race; report what it recorded
        let current = self.require_result(&observed.key).await?;
        if current.swap_nonce != observed.swap_nonce {
            return Err(RouterError::ForbidUpdateNonce {
                old: current.swap_nonce,
                new: update.swap_nonce.unwrap_or(0),
            });
        }
        if !current.swap_tx.eq_ignore_ascii_case(&observed.swap_tx) {
            return Err(RouterError::ForbidUpdateSwapTx {
                old: current.swap_tx,
                new: update.swap_tx.clone().unwrap_or_default(),
            });
        }
        Err(RouterError::Store(format!(
            "swap result {} changed concurrently",
            observed.key
        )))
    }
}

/// Nonce and tx hash may be written once; writing the same value again is allowed
fn check_payout_write_once(current: &SwapResult, update: &ResultUpdate) -> RouterResult<()> {
    if let Some(nonce) = update.swap_nonce {
        if current.swap_nonce != 0 && nonce != current.swap_nonce {
            return Err(RouterError::ForbidUpdateNonce {
                old: current.swap_nonce,
                new: nonce,
            });
        }
    }
    if let Some(tx) = &update.swap_tx {
        if !current.swap_tx.is_empty() && !tx.eq_ignore_ascii_case(&current.swap_tx) {
            return Err(RouterError::ForbidUpdateSwapTx {
                old: current.swap_tx.clone(),
                new: tx.clone(),
            });
        }
    }

    let entering_not_stable = update.status == Some(SwapStatus::MatchTxNotStable)
        && current.status != SwapStatus::MatchTxNotStable;
    if entering_not_stable {
        if current.swap_nonce != 0 && update.swap_nonce != Some(current.swap_nonce) {
            return Err(RouterError::ForbidUpdateNonce {
                old: current.swap_nonce,
                new: update.swap_nonce.unwrap_or(0),
            });
        }
        let same_tx = update
            .swap_tx
            .as_deref()
            .map_or(false, |tx| tx.eq_ignore_ascii_case(&current.swap_tx));
        if !current.swap_tx.is_empty() && !same_tx {
            return Err(RouterError::ForbidUpdateSwapTx {
                old: current.swap_tx.clone(),
                new: update.swap_tx.clone().unwrap_or_default(),
            });
        }
    }
    Ok(())
}
