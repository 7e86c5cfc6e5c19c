//! Config-contract update watching

use super::events::topics;
use super::provider::ChainProvider;
use crate::error::{RouterError, RouterResult};

use ethers::types::{Address, Filter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Widest block range asked for in one log query
const MAX_SCAN_RANGE: u64 = 5000;

/// Remembers the highest block a reload was triggered for
#[derive(Debug, Default)]
pub struct ReloadDeduper {
    last_block: AtomicU64,
}

impl ReloadDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an update at `block` is new; older or repeated blocks are not
    pub fn observe(&self, block: u64) -> bool {
        self.last_block.fetch_max(block, Ordering::SeqCst) < block
    }

    pub fn last_block(&self) -> u64 {
        self.last_block.load(Ordering::SeqCst)
    }
}

/// Polls the config contract for `UpdateConfig` events
pub struct ConfigUpdateWatcher {
    provider: ChainProvider,
    contract: Address,
    deduper: ReloadDeduper,
    /// Next block to scan; zero until the first poll
    cursor: AtomicU64,
}

impl ConfigUpdateWatcher {
    pub fn new(provider: ChainProvider, contract: &str) -> RouterResult<Self> {
        let contract = Address::from_str(contract).map_err(|e| {
            RouterError::Config(format!("invalid config contract {}: {}", contract, e))
        })?;
        Ok(Self {
            provider,
            contract,
            deduper: ReloadDeduper::new(),
            cursor: AtomicU64::new(0),
        })
    }

    /// Scan new blocks; returns the block of a not yet handled update
    pub async fn poll(&self) -> RouterResult<Option<u64>> {
        let latest = self.provider.get_block_number().await?;
        let from = match self.cursor.load(Ordering::SeqCst) {
            0 => latest,
            cursor => cursor,
        };
        if from > latest {
            return Ok(None);
        }
        let to = latest.min(from + MAX_SCAN_RANGE - 1);

        let filter = Filter::new()
            .address(self.contract)
            .topic0(*topics::UPDATE_CONFIG)
            .from_block(from)
            .to_block(to);
        let logs = self.provider.get_logs(&filter).await?;
        self.cursor.store(to + 1, Ordering::SeqCst);
        debug!(
            "Scanned config contract blocks {}..={}, found {} updates",
            from,
            to,
            logs.len()
        );

        let newest = logs
            .iter()
            .filter_map(|log| log.block_number)
            .map(|block| block.as_u64())
            .max();
        match newest {
            Some(block) if self.deduper.observe(block) => {
                info!("Config contract updated at block {}", block);
                Ok(Some(block))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduper_only_accepts_newer_blocks() {
        let deduper = ReloadDeduper::new();
        assert!(deduper.observe(100));
        assert!(!deduper.observe(100));
        assert!(!deduper.observe(99));
        assert!(deduper.observe(101));
        assert_eq!(deduper.last_block(), 101);
    }

    #[test]
    fn test_watcher_rejects_bad_contract() {
        let provider = ChainProvider::new(crate::config::ChainConfig {
            chain_id: 1,
            name: "config".to_string(),
            rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
            router_contract: String::new(),
            router_mpc: String::new(),
            router_mpc_pubkey: String::new(),
            confirmations: 1,
            initial_height: 0,
            gas_price_strategy: crate::config::GasPriceStrategy::Legacy,
            max_gas_price_gwei: 0,
            plus_gas_price_percent: 0,
            default_gas_limit: 300_000,
            private_key_env: None,
            enabled: true,
        })
        .unwrap();
        assert!(matches!(
            ConfigUpdateWatcher::new(provider, "not-an-address"),
            Err(RouterError::Config(_))
        ));
    }
}
