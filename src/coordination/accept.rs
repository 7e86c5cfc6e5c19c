//! Judging sign requests from other router nodes
//!
//! A participant agrees to sign only when it can rebuild the exact payout
//! from the source chain on its own.

use super::payout::{swap_from_tx_info, PayoutPlanner};
use crate::chain::{BuildTxArgs, RouterRegistry, VerifyArgs};
use crate::error::{RouterError, RouterResult};
use crate::mpc::{AcceptDecision, SignInfoData};
use crate::state::SwapStatus;

use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AcceptVerifier {
    registry: Arc<RouterRegistry>,
    planner: Arc<PayoutPlanner>,
}

impl AcceptVerifier {
    pub fn new(registry: Arc<RouterRegistry>, planner: Arc<PayoutPlanner>) -> Self {
        Self { registry, planner }
    }

    pub async fn judge(&self, info: &SignInfoData) -> AcceptDecision {
        match self.check(info).await {
            Ok(decision) => decision,
            Err(e) if e.is_retryable() => {
                debug!("Sign request {} not decidable yet: {}", info.key, e);
                AcceptDecision::Skip
            }
            Err(e) => {
                warn!("Disagree with sign request {}: {}", info.key, e);
                AcceptDecision::Disagree
            }
        }
    }

    async fn check(&self, info: &SignInfoData) -> RouterResult<AcceptDecision> {
        let context = match info.msg_context.as_slice() {
            [context] => context,
            contexts => {
                return Err(RouterError::WrongRawTx(format!(
                    "want 1 msg context, have {}",
                    contexts.len()
                )))
            }
        };
        let args = BuildTxArgs::from_sign_context(context)?;
        if args.identifier != self.planner.identifier() {
            debug!(
                "Ignore sign request {} of router {}",
                info.key, args.identifier
            );
            return Ok(AcceptDecision::Ignore);
        }

        let source = self.registry.get_bridge(args.from_chain_id)?;
        let verify_args = VerifyArgs {
            log_index: args.log_index,
            allow_unstable: false,
        };
        let tx_info = source.verify_transaction(&args.swap_id, &verify_args).await?;
        let swap = swap_from_tx_info(tx_info, SwapStatus::NotSwapped, String::new());
        if let Some(reason) = self.registry.swap_blacklist_reason(&swap) {
            return Err(RouterError::SwapInBlacklist(reason));
        }
        self.planner.check_swap(&swap)?;

        let mut expected = self.planner.build_args(&swap, args.extra.clone())?;
        if !expected.from.eq_ignore_ascii_case(&args.from) {
            return Err(RouterError::MpcSign(format!(
                "sign with {} but router mpc is {}",
                args.from, expected.from
            )));
        }
        let dest = self.registry.get_bridge(expected.to_chain_id)?;
        let raw = dest.build_raw_transaction(&mut expected).await?;
        dest.verify_msg_hash(&raw, &info.msg_hash)?;

        info!(
            "Agree to sign payout of swap {}:{}:{} ({})",
            args.from_chain_id, args.swap_id, args.log_index, info.key
        );
        Ok(AcceptDecision::Agree)
    }
}
