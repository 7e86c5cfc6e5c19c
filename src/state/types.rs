//! Swap records, keys and the status transition graph

use crate::chain::{SwapInfo, SwapType};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique swap identifier: `(source chain, source tx, log index)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapKey {
    pub from_chain_id: u64,
    pub tx_id: String,
    pub log_index: u32,
}

impl SwapKey {
    pub fn new(from_chain_id: u64, tx_id: &str, log_index: u32) -> Self {
        Self {
            from_chain_id,
            tx_id: tx_id.to_lowercase(),
            log_index,
        }
    }
}

impl fmt::Display for SwapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.from_chain_id, self.tx_id, self.log_index)
    }
}

/// Status of a registered swap or of its swap result.
///
/// Discriminants are stable: they are persisted and reported over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SwapStatus {
    NotStable = 0,
    VerifyFailed = 1,
    WrongValue = 3,
    NotSwapped = 5,
    Processed = 7,
    MatchTxEmpty = 8,
    MatchTxNotStable = 9,
    MatchTxStable = 10,
    WithBigValue = 12,
    MatchTxFailed = 14,
    InBlacklist = 15,
    WrongPath = 19,
    MissTokenConfig = 20,
    NoUnderlyingToken = 21,
    KeepStatus = 255,
    Reswapping = 256,
}

use SwapStatus::*;

const ALL_STATUSES: [SwapStatus; 16] = [
    NotStable,
    VerifyFailed,
    WrongValue,
    NotSwapped,
    Processed,
    MatchTxEmpty,
    MatchTxNotStable,
    MatchTxStable,
    WithBigValue,
    MatchTxFailed,
    InBlacklist,
    WrongPath,
    MissTokenConfig,
    NoUnderlyingToken,
    KeepStatus,
    Reswapping,
];

impl SwapStatus {
    pub fn all() -> &'static [SwapStatus] {
        &ALL_STATUSES
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        ALL_STATUSES.iter().copied().find(|s| s.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotStable => "NotStable",
            VerifyFailed => "VerifyFailed",
            WrongValue => "WrongValue",
            NotSwapped => "NotSwapped",
            Processed => "Processed",
            MatchTxEmpty => "MatchTxEmpty",
            MatchTxNotStable => "MatchTxNotStable",
            MatchTxStable => "MatchTxStable",
            WithBigValue => "WithBigValue",
            MatchTxFailed => "MatchTxFailed",
            InBlacklist => "InBlacklist",
            WrongPath => "WrongPath",
            MissTokenConfig => "MissTokenConfig",
            NoUnderlyingToken => "NoUnderlyingToken",
            KeepStatus => "KeepStatus",
            Reswapping => "Reswapping",
        }
    }

    pub fn is_registration(self) -> bool {
        matches!(
            self,
            NotStable
                | VerifyFailed
                | WrongValue
                | NotSwapped
                | Processed
                | WithBigValue
                | InBlacklist
                | WrongPath
                | MissTokenConfig
                | NoUnderlyingToken
        )
    }

    pub fn is_result(self) -> bool {
        matches!(
            self,
            MatchTxEmpty | MatchTxNotStable | MatchTxStable | MatchTxFailed | Reswapping
        )
    }

    /// Registration statuses that represent forward progress
    pub fn is_registered_ok(self) -> bool {
        matches!(self, NotStable | NotSwapped | Processed)
    }

    /// Terminal registration failures, left only by manual re-verification
    pub fn is_verify_failure(self) -> bool {
        matches!(
            self,
            VerifyFailed | WrongValue | InBlacklist | WrongPath | MissTokenConfig | NoUnderlyingToken
        )
    }

    /// Result statuses an operator may reswap from
    pub fn can_reswap(self) -> bool {
        matches!(self, MatchTxFailed)
    }

    /// Whether `self -> to` is an edge of the transition graph.
    ///
    /// Same-status updates are accepted as idempotent.
    pub fn can_transition_to(self, to: SwapStatus) -> bool {
        if self == to {
            return self != KeepStatus;
        }
        match (self, to) {
            (
                NotStable,
                VerifyFailed | WrongValue | InBlacklist | WrongPath | MissTokenConfig
                | NoUnderlyingToken | WithBigValue | NotSwapped,
            ) => true,
            (WithBigValue, NotSwapped) => true,
            (NotSwapped, Processed | InBlacklist) => true,
            (Processed, NotSwapped) => true,
            (from, NotStable) if from.is_verify_failure() => true,

            (MatchTxEmpty | Reswapping, MatchTxNotStable) => true,
            (MatchTxNotStable, MatchTxStable | MatchTxFailed) => true,
            (MatchTxFailed, Reswapping | MatchTxNotStable) => true,
            (MatchTxNotStable | MatchTxFailed | Reswapping, MatchTxEmpty) => true,
            _ => false,
        }
    }

    /// Edges reserved for explicit operator actions (approve, reswap, reverify)
    pub fn is_operator_only(self, to: SwapStatus) -> bool {
        matches!(
            (self, to),
            (WithBigValue, NotSwapped)
                | (Processed, NotSwapped)
                | (MatchTxFailed, Reswapping)
                | (MatchTxFailed, MatchTxNotStable)
        ) || (self.is_verify_failure() && to == NotStable)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First-stage record, created when a deposit is detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredSwap {
    pub key: SwapKey,
    pub swap_type: SwapType,
    pub swap_info: SwapInfo,
    pub value: U256,
    pub from: String,
    pub bind: String,
    pub to_chain_id: u64,
    pub status: SwapStatus,
    pub init_time: i64,
    pub timestamp: i64,
    pub memo: String,
}

/// Second-stage record holding destination-chain payout artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub key: SwapKey,
    pub swap_type: SwapType,
    pub swap_info: SwapInfo,
    pub value: U256,
    pub from: String,
    pub bind: String,
    pub to_chain_id: u64,
    pub swap_tx: String,
    pub old_swap_txs: Vec<String>,
    pub swap_height: u64,
    pub swap_time: u64,
    pub swap_value: U256,
    pub swap_nonce: u64,
    /// Signer address that issued the payout
    pub mpc: String,
    pub status: SwapStatus,
    pub init_time: i64,
    pub timestamp: i64,
    pub memo: String,
}

impl SwapResult {
    pub fn from_swap(swap: &RegisteredSwap, status: SwapStatus, now: i64) -> Self {
        Self {
            key: swap.key.clone(),
            swap_type: swap.swap_type,
            swap_info: swap.swap_info.clone(),
            value: swap.value,
            from: swap.from.clone(),
            bind: swap.bind.clone(),
            to_chain_id: swap.to_chain_id,
            swap_tx: String::new(),
            old_swap_txs: Vec::new(),
            swap_height: 0,
            swap_time: 0,
            swap_value: U256::zero(),
            swap_nonce: 0,
            mpc: String::new(),
            status,
            init_time: swap.init_time,
            timestamp: now,
            memo: String::new(),
        }
    }

    pub fn has_payout_artifacts(&self) -> bool {
        self.swap_nonce != 0 || !self.swap_tx.is_empty()
    }

    /// Current tx first, then the ones it replaced
    pub fn all_swap_txs(&self) -> Vec<String> {
        let mut txs = Vec::with_capacity(self.old_swap_txs.len() + 1);
        if !self.swap_tx.is_empty() {
            txs.push(self.swap_tx.clone());
        }
        for tx in &self.old_swap_txs {
            if !txs.iter().any(|t| t.eq_ignore_ascii_case(tx)) {
                txs.push(tx.clone());
            }
        }
        txs
    }
}

/// Field set for a registered swap update
#[derive(Debug, Clone, Default)]
pub struct SwapUpdate {
    pub status: Option<SwapStatus>,
    pub memo: Option<String>,
    pub timestamp: i64,
}

/// Field set for a swap result update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct ResultUpdate {
    pub status: Option<SwapStatus>,
    pub mpc: Option<String>,
    pub swap_tx: Option<String>,
    pub old_swap_txs: Option<Vec<String>>,
    pub swap_height: Option<u64>,
    pub swap_time: Option<u64>,
    pub swap_value: Option<U256>,
    pub swap_nonce: Option<u64>,
    pub memo: Option<String>,
    pub timestamp: i64,
}

impl ResultUpdate {
    pub fn with_status(status: SwapStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Clears every payout artifact and moves to `status`
    pub fn reset(status: SwapStatus) -> Self {
        Self {
            status: Some(status),
            swap_tx: Some(String::new()),
            old_swap_txs: Some(Vec::new()),
            swap_height: Some(0),
            swap_time: Some(0),
            swap_nonce: Some(0),
            memo: Some(String::new()),
            ..Default::default()
        }
    }

    /// Apply to an in-memory record
    pub fn apply(&self, result: &mut SwapResult) {
        if let Some(status) = self.status {
            if status != KeepStatus {
                result.status = status;
            }
        }
        if let Some(mpc) = &self.mpc {
            result.mpc = mpc.clone();
        }
        if let Some(tx) = &self.swap_tx {
            result.swap_tx = tx.clone();
        }
        if let Some(old) = &self.old_swap_txs {
            result.old_swap_txs = old.clone();
        }
        if let Some(height) = self.swap_height {
            result.swap_height = height;
        }
        if let Some(time) = self.swap_time {
            result.swap_time = time;
        }
        if let Some(value) = self.swap_value {
            result.swap_value = value;
        }
        if let Some(nonce) = self.swap_nonce {
            result.swap_nonce = nonce;
        }
        if let Some(memo) = &self.memo {
            result.memo = memo.clone();
        }
        result.timestamp = self.timestamp;
    }
}

impl SwapUpdate {
    pub fn apply(&self, swap: &mut RegisteredSwap) {
        if let Some(status) = self.status {
            if status != KeepStatus {
                swap.status = status;
            }
        }
        if let Some(memo) = &self.memo {
            swap.memo = memo.clone();
        }
        swap.timestamp = self.timestamp;
    }
}

/// Compare-and-set condition checked by the store before applying an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultGuard {
    pub status: Option<SwapStatus>,
    pub swap_nonce: Option<u64>,
    pub swap_tx: Option<String>,
}

impl ResultGuard {
    /// Guard that the record still looks exactly like `observed`
    pub fn observed(observed: &SwapResult) -> Self {
        Self {
            status: Some(observed.status),
            swap_nonce: Some(observed.swap_nonce),
            swap_tx: Some(observed.swap_tx.clone()),
        }
    }

    pub fn matches(&self, result: &SwapResult) -> bool {
        self.status.map_or(true, |s| s == result.status)
            && self.swap_nonce.map_or(true, |n| n == result.swap_nonce)
            && self
                .swap_tx
                .as_ref()
                .map_or(true, |t| t.eq_ignore_ascii_case(&result.swap_tx))
    }
}

/// Ordering of status scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    InitTime,
    SwapNonce,
}

/// Bounded, time-windowed, status-filtered scan
#[derive(Debug, Clone)]
pub struct StatusQuery {
    pub status: SwapStatus,
    pub since: i64,
    pub from_chain_id: Option<u64>,
    pub to_chain_id: Option<u64>,
    pub order: QueryOrder,
    pub limit: usize,
}
