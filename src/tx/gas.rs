//! Gas limit and gas price selection for payout transactions

use crate::chain::{ChainProvider, GasPrice};
use crate::config::ChainConfig;
use crate::error::RouterResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::{debug, warn};

const GWEI: u64 = 1_000_000_000;

/// Gas estimator for one destination chain
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage on top of the estimated gas limit
    gas_limit_buffer_percent: u64,
    /// Percentage added to the node's gas price
    plus_gas_price_percent: u64,
    /// Hard ceiling on the gas price (or fee cap), in wei; zero disables it
    max_gas_price: U256,
    default_gas_limit: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(plus_gas_price_percent: u64, max_gas_price_gwei: u64, default_gas_limit: u64) -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            plus_gas_price_percent,
            max_gas_price: U256::from(max_gas_price_gwei) * U256::from(GWEI),
            default_gas_limit,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            config.plus_gas_price_percent,
            config.max_gas_price_gwei,
            config.default_gas_limit,
        )
    }

    /// Estimated gas limit plus buffer.
    ///
    /// A failed estimate usually means the call would revert, so it is an
    /// error rather than a fall back to the default limit.
    pub async fn estimate_gas_limit(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
    ) -> RouterResult<u64> {
        let estimated = provider.estimate_gas(tx).await?;
        Ok(self.buffered_gas_limit(estimated))
    }

    fn buffered_gas_limit(&self, estimated: U256) -> u64 {
        let buffered = estimated
            .saturating_add(estimated.saturating_mul(self.gas_limit_buffer_percent.into()) / 100);
        if buffered > U256::from(u64::MAX) {
            return self.default_gas_limit;
        }
        buffered.as_u64()
    }

    pub fn default_gas_limit(&self) -> u64 {
        self.default_gas_limit
    }

    /// Get the gas price for a payout on this chain
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> RouterResult<GasPrice> {
        let gas_price = self.adjust(provider.get_gas_price().await?);
        debug!("Gas price for chain {}: {:?}", provider.chain_id(), gas_price);
        Ok(gas_price)
    }

    /// Add the configured percentage and cap at the configured maximum
    pub fn adjust(&self, gas_price: GasPrice) -> GasPrice {
        match gas_price {
            GasPrice::Legacy(price) => GasPrice::Legacy(self.cap(self.plus(price))),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let max_fee_per_gas = self.cap(self.plus(max_fee_per_gas));
                GasPrice::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas: self
                        .plus(max_priority_fee_per_gas)
                        .min(max_fee_per_gas),
                }
            }
        }
    }

    fn plus(&self, price: U256) -> U256 {
        price.saturating_add(price.saturating_mul(self.plus_gas_price_percent.into()) / 100)
    }

    fn cap(&self, price: U256) -> U256 {
        if !self.max_gas_price.is_zero() && price > self.max_gas_price {
            warn!(
                "Gas price {} above maximum, capped at {}",
                price, self.max_gas_price
            );
            return self.max_gas_price;
        }
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_percent_and_cap() {
        let estimator = GasEstimator::new(10, 100, 90_000);

        let price = estimator.adjust(GasPrice::Legacy(U256::from(50 * GWEI)));
        assert_eq!(price, GasPrice::Legacy(U256::from(55 * GWEI)));

        let price = estimator.adjust(GasPrice::Legacy(U256::from(95 * GWEI)));
        assert_eq!(price, GasPrice::Legacy(U256::from(100 * GWEI)));
    }

    #[test]
    fn test_eip1559_tip_never_above_fee_cap() {
        let estimator = GasEstimator::new(0, 10, 90_000);
        let price = estimator.adjust(GasPrice::Eip1559 {
            max_fee_per_gas: U256::from(30 * GWEI),
            max_priority_fee_per_gas: U256::from(12 * GWEI),
        });
        assert_eq!(
            price,
            GasPrice::Eip1559 {
                max_fee_per_gas: U256::from(10 * GWEI),
                max_priority_fee_per_gas: U256::from(10 * GWEI),
            }
        );
    }

    #[test]
    fn test_zero_max_disables_cap() {
        let estimator = GasEstimator::new(0, 0, 90_000);
        let high = U256::from(10_000u64) * U256::from(GWEI);
        assert_eq!(estimator.adjust(GasPrice::Legacy(high)), GasPrice::Legacy(high));
    }

    #[test]
    fn test_gas_limit_buffer() {
        let estimator = GasEstimator::new(0, 0, 90_000);
        assert_eq!(estimator.buffered_gas_limit(U256::from(100_000)), 120_000);
        assert_eq!(estimator.buffered_gas_limit(U256::MAX), 90_000);
    }
}
