//! Payout planning: swap value policy and the arguments of a payout
//!
//! The swap worker and the accept worker both go through `PayoutPlanner`, so a
//! participant re-deriving a payout builds exactly what the initiator built.

use crate::chain::value::{calc_swap_value, check_token_swap_value, is_big_value_swap, FeeRule};
use crate::chain::{BuildTxArgs, ExtraArgs, RouterRegistry, SwapInfo, SwapTxInfo, TokenInfo};
use crate::error::{RouterError, RouterResult};
use crate::state::{RegisteredSwap, SwapKey, SwapStatus};

use ethers::types::U256;
use std::sync::Arc;

pub struct PayoutPlanner {
    registry: Arc<RouterRegistry>,
    identifier: String,
}

/// Source and destination side of a token swap
struct TokenRoute {
    from: TokenInfo,
    to: TokenInfo,
}

impl PayoutPlanner {
    pub fn new(registry: Arc<RouterRegistry>, identifier: &str) -> Self {
        Self {
            registry,
            identifier: identifier.to_string(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Apply the token policy to a verified swap.
    ///
    /// Returns whether the swap needs operator approval for its value.
    pub fn check_swap(&self, swap: &RegisteredSwap) -> RouterResult<bool> {
        let route = match &swap.swap_info {
            SwapInfo::Erc20 { .. } | SwapInfo::Nft { .. } => self.token_route(swap)?,
            SwapInfo::AnyCall { .. } => return Ok(false),
        };

        match &swap.swap_info {
            SwapInfo::Erc20 {
                for_underlying,
                path,
                token_id,
                ..
            } => {
                if *for_underlying && route.to.underlying.is_none() {
                    return Err(RouterError::NoUnderlyingToken {
                        token: route.to.address.clone(),
                        chain_id: swap.to_chain_id,
                    });
                }
                if !path.is_empty() {
                    self.check_path(swap.to_chain_id, &route.to.address, path)?;
                }

                let limits = self
                    .registry
                    .tokens()
                    .get_swap_limits(token_id)
                    .ok_or(RouterError::TxWithWrongValue)?;
                let fee = self.fee_rule(token_id);
                if !check_token_swap_value(
                    swap.value,
                    &limits,
                    &fee,
                    route.from.decimals,
                    route.to.decimals,
                ) {
                    return Err(RouterError::TxWithWrongValue);
                }
                Ok(is_big_value_swap(swap.value, &limits, route.from.decimals))
            }
            SwapInfo::Nft { ids, amounts, .. } => {
                if ids.is_empty() || (!amounts.is_empty() && amounts.len() != ids.len()) {
                    return Err(RouterError::TxWithWrongValue);
                }
                Ok(false)
            }
            SwapInfo::AnyCall { .. } => Ok(false),
        }
    }

    /// Arguments of the payout for `swap`, signed by the destination router MPC
    pub fn build_args(&self, swap: &RegisteredSwap, extra: ExtraArgs) -> RouterResult<BuildTxArgs> {
        let to_chain_id = swap.to_chain_id;
        let chain = self.registry.chain_config(to_chain_id)?;

        let mut swap_info = swap.swap_info.clone();
        let (to_token, swap_value) = match &mut swap_info {
            SwapInfo::Erc20 {
                token_id, path, ..
            } => {
                let route = self.token_route(swap)?;
                if !path.is_empty() && !path[0].eq_ignore_ascii_case(&route.to.address) {
                    path.insert(0, route.to.address.clone());
                }
                let fee = self.fee_rule(token_id);
                let value =
                    calc_swap_value(swap.value, &fee, route.from.decimals, route.to.decimals);
                (route.to.address, value)
            }
            SwapInfo::Nft { .. } => (self.token_route(swap)?.to.address, swap.value),
            SwapInfo::AnyCall { .. } => (String::new(), U256::zero()),
        };

        Ok(BuildTxArgs {
            identifier: self.identifier.clone(),
            swap_id: swap.key.tx_id.clone(),
            log_index: swap.key.log_index,
            bind: swap.bind.clone(),
            from_chain_id: swap.key.from_chain_id,
            to_chain_id,
            swap_info,
            from: chain.router_mpc.to_lowercase(),
            to: chain.router_contract.to_lowercase(),
            value: U256::zero(),
            original_value: swap.value,
            swap_value,
            memo: String::new(),
            to_token,
            input: Vec::new(),
            extra,
        })
    }

    fn token_route(&self, swap: &RegisteredSwap) -> RouterResult<TokenRoute> {
        let (token, token_id) = match &swap.swap_info {
            SwapInfo::Erc20 {
                token, token_id, ..
            }
            | SwapInfo::Nft {
                token, token_id, ..
            } => (token, token_id),
            SwapInfo::AnyCall { .. } => {
                return Err(RouterError::SwapTypeNotSupported(
                    "anycall has no token route".to_string(),
                ))
            }
        };
        let tokens = self.registry.tokens();
        let from_chain_id = swap.key.from_chain_id;

        let from = tokens
            .get_token_config(from_chain_id, token)
            .ok_or_else(|| RouterError::MissTokenConfig {
                token: token.clone(),
                chain_id: from_chain_id,
            })?;
        let to_address = tokens
            .get_multichain_token(token_id, swap.to_chain_id)
            .ok_or_else(|| RouterError::MissTokenConfig {
                token: token_id.clone(),
                chain_id: swap.to_chain_id,
            })?;
        let to = tokens
            .get_token_config(swap.to_chain_id, &to_address)
            .ok_or(RouterError::MissTokenConfig {
                token: to_address,
                chain_id: swap.to_chain_id,
            })?;
        Ok(TokenRoute { from, to })
    }

    /// A trade path starts at the destination token and has at least one hop
    fn check_path(&self, to_chain_id: u64, to_token: &str, path: &[String]) -> RouterResult<()> {
        let bridge = self.registry.get_bridge(to_chain_id)?;
        let hops = if path[0].eq_ignore_ascii_case(to_token) {
            path.len()
        } else {
            path.len() + 1
        };
        if hops < 2 || path.iter().any(|token| !bridge.is_valid_address(token)) {
            return Err(RouterError::TxWithWrongPath);
        }
        Ok(())
    }

    fn fee_rule(&self, token_id: &str) -> FeeRule {
        self.registry
            .tokens()
            .get_fee_rule(token_id)
            .unwrap_or(FeeRule {
                rate_per_million: 0,
                maximum_fee: U256::zero(),
                minimum_fee: U256::zero(),
            })
    }
}

/// Registered swap for a verified swap event
pub fn swap_from_tx_info(info: SwapTxInfo, status: SwapStatus, memo: String) -> RegisteredSwap {
    let now = chrono::Utc::now().timestamp();
    RegisteredSwap {
        key: SwapKey::new(info.from_chain_id, &info.hash, info.log_index),
        swap_type: info.swap_info.swap_type(),
        swap_info: info.swap_info,
        value: info.value,
        from: info.from.to_lowercase(),
        bind: info.bind,
        to_chain_id: info.to_chain_id,
        status,
        init_time: now,
        timestamp: now,
        memo,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::testing::FakeBridge;
    use crate::chain::{Bridge, SwapType, TokenTables};
    use crate::config::tests::SAMPLE;
    use crate::config::{FeeConfig, Settings, SwapConfig, TokenConfig};

    pub(crate) const SOURCE_USDC: &str = "0x3333333333333333333333333333333333333333";
    pub(crate) const DEST_USDC: &str = "0x9999999999999999999999999999999999999999";

    /// Two chains with USDC on both: 6 decimals on chain 1, 18 on chain 2
    pub(crate) fn two_chain_settings() -> Settings {
        std::env::set_var("ROUTER_TEST_PUBKEY", "0x04abcd");
        let mut settings = Settings::parse(SAMPLE).unwrap();
        let mut dest = settings.chains["source"].clone();
        dest.chain_id = 2;
        dest.name = "dest".into();
        dest.router_contract = "0x8888888888888888888888888888888888888888".into();
        settings.chains.insert("dest".into(), dest);

        settings.tokens.push(TokenConfig {
            token_id: "USDC".into(),
            chain_id: 2,
            address: DEST_USDC.into(),
            decimals: 18,
            underlying: None,
            router_contract: None,
        });
        settings.swap_configs.insert(
            "usdc".into(),
            SwapConfig {
                maximum_swap: "1000000000000000000000000".into(),
                minimum_swap: "1000000000000000000".into(),
                big_value_threshold: "100000000000000000000000".into(),
            },
        );
        settings.fee_configs.insert(
            "usdc".into(),
            FeeConfig {
                swap_fee_rate_per_million: 1000,
                maximum_swap_fee: "10000000000000000000".into(),
                minimum_swap_fee: "0".into(),
            },
        );
        settings
    }

    pub(crate) fn two_chain_registry(bridges: Vec<Arc<dyn Bridge>>) -> Arc<RouterRegistry> {
        let settings = two_chain_settings();
        let tokens = Arc::new(TokenTables::from_settings(&settings).unwrap());
        Arc::new(RouterRegistry::new(
            bridges,
            settings.chains.values().cloned().collect(),
            tokens,
            &settings.blacklist,
        ))
    }

    pub(crate) fn usdc_swap(value: U256, path: Vec<String>) -> RegisteredSwap {
        RegisteredSwap {
            key: SwapKey::new(
                1,
                "0x00000000000000000000000000000000000000000000000000000000000000aa",
                1,
            ),
            swap_type: SwapType::Erc20,
            swap_info: SwapInfo::Erc20 {
                for_native: false,
                for_underlying: false,
                token: SOURCE_USDC.into(),
                token_id: "usdc".into(),
                path,
                amount_out_min: U256::zero(),
            },
            value,
            from: "0x5555555555555555555555555555555555555555".into(),
            bind: "0x6666666666666666666666666666666666666666".into(),
            to_chain_id: 2,
            status: SwapStatus::NotStable,
            init_time: 0,
            timestamp: 0,
            memo: String::new(),
        }
    }

    fn planner() -> PayoutPlanner {
        let registry = two_chain_registry(vec![
            Arc::new(FakeBridge::new(1)) as Arc<dyn Bridge>,
            Arc::new(FakeBridge::new(2)),
        ]);
        PayoutPlanner::new(registry, "bridge-router")
    }

    #[test]
    fn test_value_policy() {
        let planner = planner();
        // 100 tokens
        assert!(!planner.check_swap(&usdc_swap(U256::exp10(8), vec![])).unwrap());
        // above the big value threshold of 100_000 tokens
        assert!(planner
            .check_swap(&usdc_swap(U256::exp10(11) + 1, vec![]))
            .unwrap());
        // below the minimum of 1 token
        assert!(matches!(
            planner.check_swap(&usdc_swap(U256::from(999_999u64), vec![])),
            Err(RouterError::TxWithWrongValue)
        ));
    }

    #[test]
    fn test_missing_destination_token() {
        let planner = planner();
        let mut swap = usdc_swap(U256::exp10(8), vec![]);
        swap.to_chain_id = 56;
        assert!(matches!(
            planner.check_swap(&swap),
            Err(RouterError::MissTokenConfig { chain_id: 56, .. })
        ));
    }

    #[test]
    fn test_underlying_required_on_destination() {
        let planner = planner();
        let mut swap = usdc_swap(U256::exp10(8), vec![]);
        if let SwapInfo::Erc20 { for_underlying, .. } = &mut swap.swap_info {
            *for_underlying = true;
        }
        assert!(matches!(
            planner.check_swap(&swap),
            Err(RouterError::NoUnderlyingToken { chain_id: 2, .. })
        ));
    }

    #[test]
    fn test_path_check() {
        let planner = planner();
        let single = usdc_swap(U256::exp10(8), vec![DEST_USDC.into()]);
        assert!(matches!(
            planner.check_swap(&single),
            Err(RouterError::TxWithWrongPath)
        ));
        let bad = usdc_swap(U256::exp10(8), vec!["not-an-address".into()]);
        assert!(matches!(
            planner.check_swap(&bad),
            Err(RouterError::TxWithWrongPath)
        ));
        let trade = usdc_swap(
            U256::exp10(8),
            vec!["0x7777777777777777777777777777777777777777".into()],
        );
        assert!(planner.check_swap(&trade).is_ok());
    }

    #[test]
    fn test_build_args_converts_value_and_prepends_path() {
        let planner = planner();
        let swap = usdc_swap(
            U256::exp10(8),
            vec!["0x7777777777777777777777777777777777777777".into()],
        );
        let args = planner.build_args(&swap, ExtraArgs::default()).unwrap();

        assert_eq!(args.identifier, "bridge-router");
        assert_eq!(args.from, "0x2222222222222222222222222222222222222222");
        assert_eq!(args.to, "0x8888888888888888888888888888888888888888");
        assert_eq!(args.to_token, DEST_USDC);
        assert_eq!(args.original_value, U256::exp10(8));
        // 100 tokens minus the 0.1% fee, in 18 decimals
        assert_eq!(args.swap_value, U256::exp10(15) * 99_900);
        match &args.swap_info {
            SwapInfo::Erc20 { path, .. } => assert_eq!(path[0], DEST_USDC),
            other => panic!("unexpected swap info {:?}", other),
        }
    }
}
