//! EVM chain provider with multi-RPC support and automatic failover

use crate::config::{ChainConfig, GasPriceStrategy};
use crate::error::{RouterError, RouterResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers with their urls (multiple for failover)
    http_providers: Vec<(String, Provider<Http>)>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Last known block number
    last_block: RwLock<u64>,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> RouterResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push((url.clone(), provider));
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(RouterError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            last_block: RwLock::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()].1
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Run a call against each provider in turn until one answers
    async fn with_failover<T, F, Fut>(&self, operation: &str, call: F) -> RouterResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = String::new();
        for _ in 0..self.http_providers.len() {
            match call(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "Failed to {} on chain {}: {}",
                        operation, self.config.chain_id, e
                    );
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(RouterError::ChainConnection {
            chain_id: self.config.chain_id,
            message: format!("all providers failed to {}: {}", operation, last_error),
        })
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> RouterResult<u64> {
        let block = self
            .with_failover("get block number", |p| async move { p.get_block_number().await })
            .await?
            .as_u64();
        *self.last_block.write().await = block;
        Ok(block)
    }

    /// Block number reported by one specific endpoint
    pub async fn get_block_number_of(&self, url: &str) -> RouterResult<u64> {
        let provider = match self.http_providers.iter().find(|(u, _)| u == url) {
            Some((_, provider)) => provider.clone(),
            None => Provider::<Http>::try_from(url).map_err(|e| RouterError::ChainConnection {
                chain_id: self.config.chain_id,
                message: e.to_string(),
            })?,
        };
        provider
            .get_block_number()
            .await
            .map(|b| b.as_u64())
            .map_err(|e| RouterError::ChainConnection {
                chain_id: self.config.chain_id,
                message: e.to_string(),
            })
    }

    /// Last block number seen by this provider
    pub async fn last_block(&self) -> u64 {
        *self.last_block.read().await
    }

    pub async fn get_block(&self, block_number: u64) -> RouterResult<Option<Block<H256>>> {
        self.with_failover("get block", |p| async move { p.get_block(block_number).await })
            .await
    }

    pub async fn get_transaction(&self, tx_hash: H256) -> RouterResult<Option<Transaction>> {
        self.with_failover("get transaction", |p| async move {
            p.get_transaction(tx_hash).await
        })
        .await
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> RouterResult<Option<TransactionReceipt>> {
        self.with_failover("get receipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Get logs for a filter
    pub async fn get_logs(&self, filter: &Filter) -> RouterResult<Vec<Log>> {
        self.with_failover("get logs", |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    pub async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> RouterResult<u64> {
        self.with_failover("get transaction count", |p| async move {
            p.get_transaction_count(address, Some(block.into())).await
        })
        .await
        .map(|n| n.as_u64())
    }

    pub async fn get_balance(&self, address: Address) -> RouterResult<U256> {
        self.with_failover("get balance", |p| async move {
            p.get_balance(address, None).await
        })
        .await
    }

    /// Broadcast to every endpoint; succeeds if any accepted it
    pub async fn send_raw_transaction(&self, raw: Bytes) -> RouterResult<H256> {
        let mut accepted = None;
        let mut last_error = String::new();
        for (url, provider) in &self.http_providers {
            match provider.send_raw_transaction(raw.clone()).await {
                Ok(pending) => {
                    accepted.get_or_insert(pending.tx_hash());
                }
                Err(e) => {
                    debug!("Broadcast to {} failed: {}", url, e);
                    last_error = e.to_string();
                }
            }
        }

        accepted.ok_or_else(|| RouterError::Transaction(format!("broadcast failed: {}", last_error)))
    }

    /// Estimate gas for a transaction
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> RouterResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| RouterError::GasEstimation(e.to_string()))
    }

    /// Get current gas price based on chain strategy
    pub async fn get_gas_price(&self) -> RouterResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy | GasPriceStrategy::Arbitrum => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| RouterError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 | GasPriceStrategy::Optimism => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    /// Estimate EIP-1559 fees
    async fn estimate_eip1559_fees(&self) -> RouterResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| RouterError::GasEstimation(e.to_string()))?
            .ok_or_else(|| RouterError::GasEstimation("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| RouterError::GasEstimation("No base fee in block".to_string()))?;

        let priority_fee = U256::from(2_000_000_000u64);

        // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
        let max_fee = base_fee * 2 + priority_fee;

        Ok((max_fee, priority_fee))
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
