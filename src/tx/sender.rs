//! Payout sender: nonce assignment, build, sign and broadcast of one payout

use crate::chain::{Bridge, BuildTxArgs, RouterRegistry, SignedTransaction};
use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::state::{SwapKey, SwapStateMachine};

use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drives a single payout attempt against the destination bridge.
///
/// The swap result records the nonce before anything is signed, so two
/// attempts for the same swap can never both reach the network.
pub struct PayoutSender {
    registry: Arc<RouterRegistry>,
    machine: Arc<SwapStateMachine>,
    sign_with_private_key: bool,
}

impl PayoutSender {
    pub fn new(
        registry: Arc<RouterRegistry>,
        machine: Arc<SwapStateMachine>,
        sign_with_private_key: bool,
    ) -> Self {
        Self {
            registry,
            machine,
            sign_with_private_key,
        }
    }

    /// Send the payout described by `args`; returns the broadcast tx hash
    pub async fn send(&self, key: &SwapKey, mut args: BuildTxArgs) -> RouterResult<String> {
        let bridge = self.registry.get_bridge(args.to_chain_id)?;

        let nonce = self
            .assign_nonce(bridge.as_ref(), key, &args)
            .await
            .map_err(|e| e.context("assign nonce", key))?;
        if let Some(nonce) = nonce {
            args.extra.nonce = Some(nonce);
        }

        let signed = match self.build_and_sign(bridge.as_ref(), key, &mut args).await {
            Ok(signed) => signed,
            Err(e) => {
                self.roll_back(bridge.as_ref(), key, &args, nonce, &e).await;
                metrics::record_payout_failed(args.to_chain_id);
                return Err(e.context("send payout", key));
            }
        };

        // From here on the signed tx may reach the network, so it is kept
        // even when the broadcast reports an error. The stable worker decides
        // whether it landed or was lost.
        match bridge.send_transaction(&signed).await {
            Ok(tx_hash) => {
                if let (Some(setter), Some(nonce)) = (bridge.nonce_setter(), nonce) {
                    setter.set_nonce(&args.from, nonce + 1).await;
                }
                metrics::record_payout_sent(args.to_chain_id);
                info!(
                    "Sent payout {} for swap {} on chain {} (nonce {:?})",
                    tx_hash, key, args.to_chain_id, nonce
                );
                Ok(tx_hash)
            }
            Err(e) => {
                warn!(
                    "Broadcast of payout {} for swap {} failed, left for the stable check: {}",
                    signed.tx_hash, key, e
                );
                metrics::record_payout_failed(args.to_chain_id);
                Err(e.context("send payout", key))
            }
        }
    }

    /// Commit a nonce to the swap result; chains without nonces record zero
    async fn assign_nonce(
        &self,
        bridge: &dyn Bridge,
        key: &SwapKey,
        args: &BuildTxArgs,
    ) -> RouterResult<Option<u64>> {
        let setter = match bridge.nonce_setter() {
            Some(setter) => setter,
            None => {
                self.machine
                    .assign_swap_nonce(key, &args.from, 0, args.swap_value)
                    .await?;
                return Ok(None);
            }
        };

        let machine = self.machine.clone();
        let assign_key = key.clone();
        let mpc = args.from.clone();
        let swap_value = args.swap_value;
        let nonce = setter
            .allocate_nonce(
                &args.from,
                Box::new(move |nonce| {
                    async move {
                        machine
                            .assign_swap_nonce(&assign_key, &mpc, nonce, swap_value)
                            .await
                    }
                    .boxed()
                }),
            )
            .await?;
        Ok(Some(nonce))
    }

    /// Build, sign and record the payout tx; nothing is on the network yet
    async fn build_and_sign(
        &self,
        bridge: &dyn Bridge,
        key: &SwapKey,
        args: &mut BuildTxArgs,
    ) -> RouterResult<SignedTransaction> {
        let raw = bridge.build_raw_transaction(args).await?;
        let signed = if self.sign_with_private_key {
            bridge.sign_transaction_with_private_key(&raw).await?
        } else {
            bridge.mpc_sign_transaction(&raw, args).await?
        };
        bridge.verify_msg_hash(&raw, &signed.msg_hashes)?;
        debug!("Signed payout {} for swap {}", signed.tx_hash, key);

        self.machine.record_swap_tx(key, &signed.tx_hash).await?;
        Ok(signed)
    }

    /// Give back the nonce and reopen the swap; only for payouts never broadcast
    async fn roll_back(
        &self,
        bridge: &dyn Bridge,
        key: &SwapKey,
        args: &BuildTxArgs,
        nonce: Option<u64>,
        cause: &RouterError,
    ) {
        if cause.is_rejection() {
            warn!("Payout of swap {} rejected: {}", key, cause);
        } else {
            error!("Payout of swap {} failed: {}", key, cause);
            metrics::record_error("sender", cause);
        }

        if let (Some(setter), Some(nonce)) = (bridge.nonce_setter(), nonce) {
            setter.recycle_swap_nonce(&args.from, nonce).await;
        }
        if let Err(e) = self.machine.abandon_payout(key, &cause.to_string()).await {
            error!("Failed to reopen swap {} after payout failure: {}", key, e);
        }
    }
}
