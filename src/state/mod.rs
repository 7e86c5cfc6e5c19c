//! Durable swap state
//!
//! This module provides:
//! - Swap records, keys and the status transition graph
//! - The narrow `SwapStore` contract and its in-memory and PostgreSQL engines
//! - `SwapStateMachine`, which enforces transitions, guards and operator actions

pub mod machine;
pub mod memory;
pub mod postgres;
pub mod types;

pub use machine::{SwapStateMachine, SwapStatusInfo, MAX_QUERY_RESULTS};
pub use memory::MemoryStore;
pub use postgres::PgSwapStore;
pub use types::{
    QueryOrder, RegisteredSwap, ResultGuard, ResultUpdate, StatusQuery, SwapKey, SwapResult,
    SwapStatus, SwapUpdate,
};

use crate::error::RouterResult;

use async_trait::async_trait;

/// Storage contract for swap records.
///
/// Every update is "set these fields if and only if the record matches the guard";
/// `Ok(false)` means the record is missing or the guard did not hold.
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Insert if absent; `AlreadyExists` on a duplicate key
    async fn insert_swap(&self, swap: &RegisteredSwap) -> RouterResult<()>;

    /// Insert if absent; `AlreadyExists` on a duplicate key
    async fn insert_result(&self, result: &SwapResult) -> RouterResult<()>;

    async fn get_swap(&self, key: &SwapKey) -> RouterResult<Option<RegisteredSwap>>;

    async fn get_result(&self, key: &SwapKey) -> RouterResult<Option<SwapResult>>;

    /// First swap of a source transaction, ignoring the log index
    async fn find_first_swap(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<RegisteredSwap>>;

    /// First result of a source transaction, ignoring the log index
    async fn find_first_result(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<SwapResult>>;

    async fn update_swap(
        &self,
        key: &SwapKey,
        update: &SwapUpdate,
        expected_status: Option<SwapStatus>,
    ) -> RouterResult<bool>;

    async fn update_result(
        &self,
        key: &SwapKey,
        update: &ResultUpdate,
        guard: &ResultGuard,
    ) -> RouterResult<bool>;

    async fn query_swaps(&self, query: &StatusQuery) -> RouterResult<Vec<RegisteredSwap>>;

    async fn query_results(&self, query: &StatusQuery) -> RouterResult<Vec<SwapResult>>;

    /// Highest payout nonce used by `mpc` on `to_chain_id`
    async fn max_swap_nonce(&self, to_chain_id: u64, mpc: &str) -> RouterResult<Option<u64>>;

    /// Record counts per status across both tables
    async fn count_by_status(&self) -> RouterResult<Vec<(SwapStatus, u64)>>;

    async fn health_check(&self) -> RouterResult<()>;
}
