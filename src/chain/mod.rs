//! Chain module - chain-agnostic bridge contract and the router registry
//!
//! This module provides:
//! - The `Bridge` capability trait every chain family implements
//! - The `NonceSetter` capability for account-nonce chains, backed by `NonceCache`
//! - `RouterRegistry`, the process-wide lookup of bridges, tokens and policy
//! - The EVM bridge with multi-RPC failover and router log parsing
//! - Config-contract reload listening

pub mod events;
pub mod evm;
pub mod provider;
pub mod registry;
pub mod reload;
pub mod types;
pub mod value;

#[cfg(test)]
pub mod testing;

pub use evm::EvmBridge;
pub use provider::{ChainProvider, GasPrice};
pub use registry::{RouterRegistry, TokenInfo, TokenTables};
pub use reload::{ConfigUpdateWatcher, ReloadDeduper};
pub use types::{
    BuildTxArgs, ExtraArgs, PoolNonceHeight, SwapInfo, SwapTxInfo, SwapType, TxInfo, TxStatus,
    VerifyArgs,
};

use crate::error::{RouterError, RouterResult};
use crate::tx::NonceCache;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::Bytes;
use futures::future::BoxFuture;

/// Unsigned payout transaction in its chain family's native form
#[derive(Debug, Clone)]
pub enum RawTransaction {
    Evm(TypedTransaction),
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub tx_hash: String,
    /// Message hashes the signature was produced for
    pub msg_hashes: Vec<String>,
}

/// One swap event found while registering a source transaction.
///
/// A log that fails verification is still reported so it can be stored with
/// the matching failure status.
#[derive(Debug)]
pub struct SwapRegistration {
    pub info: SwapTxInfo,
    pub error: Option<RouterError>,
}

/// Callback committing an allocated nonce to the swap record
pub type NonceAssign = Box<dyn FnOnce(u64) -> BoxFuture<'static, RouterResult<()>> + Send>;

/// Capability contract of one chain
#[async_trait]
pub trait Bridge: Send + Sync {
    fn chain_id(&self) -> u64;

    fn is_valid_address(&self, address: &str) -> bool;

    /// Derive the account address controlled by an MPC public key
    fn public_key_to_address(&self, pubkey: &str) -> RouterResult<String>;

    async fn get_latest_block_number(&self) -> RouterResult<u64>;

    /// Latest block of one specific RPC endpoint, bypassing failover
    async fn get_latest_block_number_of(&self, url: &str) -> RouterResult<u64>;

    /// `TxNotFound` when the chain does not know the hash
    async fn get_transaction(&self, tx_hash: &str) -> RouterResult<TxInfo>;

    /// `TxNotFound` when the chain does not know the hash
    async fn get_transaction_status(&self, tx_hash: &str) -> RouterResult<TxStatus>;

    /// Build the payout; fills `args.extra` with the gas and nonce actually used
    async fn build_raw_transaction(&self, args: &mut BuildTxArgs) -> RouterResult<RawTransaction>;

    /// Sign through the MPC network with the router's threshold key
    async fn mpc_sign_transaction(
        &self,
        raw: &RawTransaction,
        args: &BuildTxArgs,
    ) -> RouterResult<SignedTransaction>;

    async fn sign_transaction_with_private_key(
        &self,
        raw: &RawTransaction,
    ) -> RouterResult<SignedTransaction>;

    /// Broadcast and return the transaction hash
    async fn send_transaction(&self, signed: &SignedTransaction) -> RouterResult<String>;

    /// Check that `msg_hashes` are exactly the hashes to sign for `raw`
    fn verify_msg_hash(&self, raw: &RawTransaction, msg_hashes: &[String]) -> RouterResult<()>;

    /// Every swap event of a source transaction
    async fn register_swap(
        &self,
        tx_hash: &str,
        args: &VerifyArgs,
    ) -> RouterResult<Vec<SwapRegistration>>;

    /// Verify one swap event of a source transaction
    async fn verify_transaction(&self, tx_hash: &str, args: &VerifyArgs)
        -> RouterResult<SwapTxInfo>;

    async fn get_balance(&self, account: &str) -> RouterResult<ethers::types::U256>;

    /// Nonce capability, for chains whose payouts are ordered by account nonce
    fn nonce_setter(&self) -> Option<&dyn NonceSetter> {
        None
    }
}

/// Account-nonce capability; shared behavior is delegated to a `NonceCache`
#[async_trait]
pub trait NonceSetter: Send + Sync {
    fn nonce_cache(&self) -> &NonceCache;

    async fn get_pool_nonce(&self, address: &str, height: PoolNonceHeight) -> RouterResult<u64>;

    async fn allocate_nonce(&self, account: &str, assign: NonceAssign) -> RouterResult<u64> {
        self.nonce_cache().allocate(account, assign).await
    }

    async fn adjust_nonce(&self, account: &str, value: u64) -> u64 {
        self.nonce_cache().adjust(account, value).await
    }

    async fn set_nonce(&self, account: &str, value: u64) {
        self.nonce_cache().set(account, value).await
    }

    /// Seed the cache with the larger of the store's next nonce and the pending pool nonce
    async fn init_swap_nonce(&self, account: &str, db_next: u64) -> u64 {
        let pool_nonce = match self.get_pool_nonce(account, PoolNonceHeight::Pending).await {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                tracing::warn!("Init swap nonce could not read pool nonce of {}: {}", account, e);
                None
            }
        };
        self.nonce_cache().init(account, db_next, pool_nonce).await
    }

    async fn recycle_swap_nonce(&self, account: &str, nonce: u64) {
        self.nonce_cache().recycle(account, nonce).await
    }

    /// Whether the chain has moved past a recorded payout nonce, so the payout
    /// can no longer land and a reswap is safe
    fn reswap_nonce_passed(&self, pool_nonce: u64, recorded: u64) -> bool {
        pool_nonce > recorded
    }
}
