//! Chain-agnostic request and status types shared by all bridges

use crate::error::{RouterError, RouterResult};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of cross-chain transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapType {
    Erc20,
    Nft,
    AnyCall,
}

impl SwapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapType::Erc20 => "erc20",
            SwapType::Nft => "nft",
            SwapType::AnyCall => "anycall",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "erc20" => Some(SwapType::Erc20),
            "nft" => Some(SwapType::Nft),
            "anycall" => Some(SwapType::AnyCall),
            _ => None,
        }
    }
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind payload of a swap; exactly one kind is ever present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SwapInfo {
    Erc20 {
        for_native: bool,
        for_underlying: bool,
        token: String,
        token_id: String,
        path: Vec<String>,
        amount_out_min: U256,
    },
    Nft {
        token: String,
        token_id: String,
        ids: Vec<U256>,
        amounts: Vec<U256>,
        batch: bool,
        data: Vec<u8>,
    },
    AnyCall {
        call_from: String,
        call_to: Vec<String>,
        call_data: Vec<Vec<u8>>,
        callbacks: Vec<String>,
        call_nonces: Vec<U256>,
    },
}

impl SwapInfo {
    pub fn swap_type(&self) -> SwapType {
        match self {
            SwapInfo::Erc20 { .. } => SwapType::Erc20,
            SwapInfo::Nft { .. } => SwapType::Nft,
            SwapInfo::AnyCall { .. } => SwapType::AnyCall,
        }
    }

    /// Multichain token id, if this kind of swap moves a token
    pub fn token_id(&self) -> Option<&str> {
        match self {
            SwapInfo::Erc20 { token_id, .. } | SwapInfo::Nft { token_id, .. } => {
                Some(token_id.as_str())
            }
            SwapInfo::AnyCall { .. } => None,
        }
    }
}

/// Overrides for gas and nonce, filled in by the pipeline before building
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraArgs {
    pub gas: Option<u64>,
    /// Legacy gas price, or the fee cap of a dynamic-fee transaction
    pub gas_price: Option<U256>,
    /// Priority fee; set only for dynamic-fee transactions
    #[serde(default)]
    pub gas_tip_cap: Option<U256>,
    pub nonce: Option<u64>,
    /// Trade deadline (unix seconds) baked into swap-trade payouts
    #[serde(default)]
    pub deadline: Option<u64>,
}

/// Immutable per-attempt request to build a payout transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTxArgs {
    pub identifier: String,
    pub swap_id: String,
    pub log_index: u32,
    pub bind: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub swap_info: SwapInfo,
    /// Sender of the payout (the router's MPC address on the destination chain)
    pub from: String,
    /// Receiver of the payout transaction (the destination router contract)
    pub to: String,
    pub value: U256,
    pub original_value: U256,
    pub swap_value: U256,
    pub memo: String,
    /// Destination-chain token address resolved from the multichain token table
    pub to_token: String,
    /// Call data of the payout, filled in when the transaction is built
    #[serde(default)]
    pub input: Vec<u8>,
    pub extra: ExtraArgs,
}

impl BuildTxArgs {
    pub fn swap_type(&self) -> SwapType {
        self.swap_info.swap_type()
    }

    /// Context handed to the MPC network alongside the message hash.
    ///
    /// Participants decode it back into `BuildTxArgs` to rebuild the payout.
    pub fn sign_context(&self) -> RouterResult<String> {
        serde_json::to_string(self).map_err(|e| RouterError::Internal(e.to_string()))
    }

    pub fn from_sign_context(context: &str) -> RouterResult<Self> {
        serde_json::from_str(context).map_err(|e| RouterError::WrongRawTx(e.to_string()))
    }
}

/// Inclusion status of a transaction on its chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmations: u64,
    pub block_height: u64,
    pub block_hash: String,
    pub block_time: u64,
    /// Receipt status: `Some(true)` success, `Some(false)` reverted
    pub success: Option<bool>,
}

impl TxStatus {
    pub fn is_on_chain(&self) -> bool {
        self.block_height > 0
    }

    pub fn is_failed(&self) -> bool {
        self.success == Some(false)
    }
}

/// Transaction as seen on its chain, independent of the chain family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: u64,
    pub value: U256,
    pub input: Vec<u8>,
    /// `None` while the transaction is still in the pool
    pub block_height: Option<u64>,
}

/// Swap event found in a source-chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTxInfo {
    pub hash: String,
    pub log_index: u32,
    pub height: u64,
    pub timestamp: u64,
    pub from: String,
    pub tx_to: String,
    pub bind: String,
    pub value: U256,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub swap_info: SwapInfo,
}

/// Verification options for source-chain swap transactions
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyArgs {
    pub log_index: u32,
    pub allow_unstable: bool,
}

/// Block tag used when reading account nonces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolNonceHeight {
    Latest,
    Pending,
}
