//! Error types for the cross-chain router
//!
//! Errors fall into four kinds:
//! - fatal configuration problems (abort startup)
//! - transient network failures (retried by the caller's retry policy)
//! - business-rule rejections (returned immediately, never retried)
//! - signature and verification mismatches (hard failure of one attempt)

use crate::state::{SwapKey, SwapStatus};

use thiserror::Error;

/// Main error type for the router
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("MPC rpc error on {rpc_addr}: {message}")]
    MpcRpc { rpc_addr: String, message: String },

    #[error("MPC sign error: {0}")]
    MpcSign(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Nonce error for chain {chain_id}: {message}")]
    Nonce { chain_id: u64, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("no bridge for chain id {chain_id}")]
    ChainNotFound { chain_id: u64 },

    #[error("chain {chain_id} is paused")]
    ChainPaused { chain_id: u64 },

    #[error("miss token config for {token} on chain {chain_id}")]
    MissTokenConfig { token: String, chain_id: u64 },

    #[error("no underlying token for {token} on chain {chain_id}")]
    NoUnderlyingToken { token: String, chain_id: u64 },

    #[error("swap {key} not found")]
    SwapNotFound { key: String },

    #[error("swap result {key} not found")]
    SwapResultNotFound { key: String },

    #[error("swap {key} already exists")]
    AlreadyExists { key: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: SwapStatus, to: SwapStatus },

    #[error("forbid update swap nonce from {old} to {new}")]
    ForbidUpdateNonce { old: u64, new: u64 },

    #[error("forbid update swap tx from {old} to {new}")]
    ForbidUpdateSwapTx { old: String, new: String },

    #[error("{0}")]
    GuardViolation(String),

    #[error("tx not stable")]
    TxNotStable,

    #[error("tx {tx_id} not found")]
    TxNotFound { tx_id: String },

    #[error("tx with wrong value")]
    TxWithWrongValue,

    #[error("tx with wrong path")]
    TxWithWrongPath,

    #[error("tx with wrong receipt or log: {0}")]
    TxWithWrongReceipt(String),

    #[error("tx sender {0} is in blacklist")]
    SwapInBlacklist(String),

    #[error("swap type not supported: {0}")]
    SwapTypeNotSupported(String),

    #[error("wrong raw tx: {0}")]
    WrongRawTx(String),

    #[error("wrong count of msg hashes: want {expected}, have {actual}")]
    WrongCountOfMsgHashes { expected: usize, actual: usize },

    #[error("msg hash mismatch: want {want}, have {have}")]
    MsgHashMismatch { want: String, have: String },

    #[error("signature count mismatch: requested {expected}, got {actual}")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("miss mpc public key for {0}")]
    MissMpcPublicKey(String),

    #[error("{operation} failed for swap {key}: {source}")]
    Swap {
        operation: String,
        key: String,
        #[source]
        source: Box<RouterError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to pick retry and alerting behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fatal,
    Transient,
    Rejected,
    Verification,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Fatal => "fatal",
            ErrorKind::Transient => "transient",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Verification => "verification",
        }
    }
}

impl RouterError {
    /// Wrap with the failing operation and the swap key it was working on
    pub fn context(self, operation: &str, key: &SwapKey) -> Self {
        RouterError::Swap {
            operation: operation.to_string(),
            key: key.to_string(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &RouterError {
        match self {
            RouterError::Swap { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            RouterError::Config(_)
            | RouterError::Wallet(_)
            | RouterError::MissMpcPublicKey(_)
            | RouterError::Internal(_) => ErrorKind::Fatal,

            RouterError::Database(_)
            | RouterError::Store(_)
            | RouterError::ChainConnection { .. }
            | RouterError::MpcRpc { .. }
            | RouterError::Timeout { .. }
            | RouterError::Nonce { .. }
            | RouterError::GasEstimation(_)
            | RouterError::TxNotStable
            | RouterError::TxNotFound { .. }
            | RouterError::Transaction(_) => ErrorKind::Transient,

            RouterError::SignatureCountMismatch { .. }
            | RouterError::InvalidSignature(_)
            | RouterError::MpcSign(_)
            | RouterError::MsgHashMismatch { .. }
            | RouterError::WrongCountOfMsgHashes { .. }
            | RouterError::WrongRawTx(_) => ErrorKind::Verification,

            _ => ErrorKind::Rejected,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal | ErrorKind::Verification)
    }

    /// Business-rule rejections are expected and never logged as hard errors
    pub fn is_rejection(&self) -> bool {
        self.kind() == ErrorKind::Rejected
    }
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind_of_root() {
        let key = SwapKey::new(1, "0xAB", 2);
        let err = RouterError::ChainConnection {
            chain_id: 1,
            message: "connection refused".to_string(),
        }
        .context("verify", &key);

        assert!(err.is_retryable());
        assert!(!err.should_alert());
        assert_eq!(
            err.to_string(),
            "verify failed for swap 1:0xab:2: Chain connection error for chain 1: connection refused"
        );
    }

    #[test]
    fn test_classification() {
        assert!(RouterError::ForbidUpdateNonce { old: 1, new: 2 }.is_rejection());
        assert!(RouterError::GuardViolation("swaptx exists".into()).is_rejection());
        assert!(RouterError::SignatureCountMismatch { expected: 2, actual: 1 }.should_alert());
        assert!(RouterError::Config("bad".into()).should_alert());
        assert!(!RouterError::Config("bad".into()).is_retryable());
    }
}
