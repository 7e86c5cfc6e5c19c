//! In-memory swap store, used for development deployments and tests

use super::types::{
    QueryOrder, RegisteredSwap, ResultGuard, ResultUpdate, StatusQuery, SwapKey, SwapResult,
    SwapStatus, SwapUpdate,
};
use super::SwapStore;
use crate::error::{RouterError, RouterResult};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

/// Swap store backed by concurrent hash maps
#[derive(Default)]
pub struct MemoryStore {
    swaps: DashMap<SwapKey, RegisteredSwap>,
    results: DashMap<SwapKey, SwapResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_query(
    status: SwapStatus,
    timestamp: i64,
    from_chain_id: u64,
    to_chain_id: u64,
    query: &StatusQuery,
) -> bool {
    status == query.status
        && timestamp >= query.since
        && query.from_chain_id.map_or(true, |c| c == from_chain_id)
        && query.to_chain_id.map_or(true, |c| c == to_chain_id)
}

#[async_trait]
impl SwapStore for MemoryStore {
    async fn insert_swap(&self, swap: &RegisteredSwap) -> RouterResult<()> {
        match self.swaps.entry(swap.key.clone()) {
            Entry::Occupied(_) => Err(RouterError::AlreadyExists {
                key: swap.key.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(swap.clone());
                Ok(())
            }
        }
    }

    async fn insert_result(&self, result: &SwapResult) -> RouterResult<()> {
        match self.results.entry(result.key.clone()) {
            Entry::Occupied(_) => Err(RouterError::AlreadyExists {
                key: result.key.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(result.clone());
                Ok(())
            }
        }
    }

    async fn get_swap(&self, key: &SwapKey) -> RouterResult<Option<RegisteredSwap>> {
        Ok(self.swaps.get(key).map(|s| s.clone()))
    }

    async fn get_result(&self, key: &SwapKey) -> RouterResult<Option<SwapResult>> {
        Ok(self.results.get(key).map(|r| r.clone()))
    }

    async fn find_first_swap(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<RegisteredSwap>> {
        let tx_id = tx_id.to_lowercase();
        Ok(self
            .swaps
            .iter()
            .filter(|s| s.key.from_chain_id == from_chain_id && s.key.tx_id == tx_id)
            .min_by_key(|s| s.key.log_index)
            .map(|s| s.clone()))
    }

    async fn find_first_result(
        &self,
        from_chain_id: u64,
        tx_id: &str,
    ) -> RouterResult<Option<SwapResult>> {
        let tx_id = tx_id.to_lowercase();
        Ok(self
            .results
            .iter()
            .filter(|r| r.key.from_chain_id == from_chain_id && r.key.tx_id == tx_id)
            .min_by_key(|r| r.key.log_index)
            .map(|r| r.clone()))
    }

    async fn update_swap(
        &self,
        key: &SwapKey,
        update: &SwapUpdate,
        expected_status: Option<SwapStatus>,
    ) -> RouterResult<bool> {
        match self.swaps.get_mut(key) {
            Some(mut swap) => {
                if expected_status.map_or(false, |s| s != swap.status) {
                    return Ok(false);
                }
                update.apply(&mut swap);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_result(
        &self,
        key: &SwapKey,
        update: &ResultUpdate,
        guard: &ResultGuard,
    ) -> RouterResult<bool> {
        match self.results.get_mut(key) {
            Some(mut result) => {
                if !guard.matches(&result) {
                    return Ok(false);
                }
                update.apply(&mut result);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_swaps(&self, query: &StatusQuery) -> RouterResult<Vec<RegisteredSwap>> {
        let mut swaps: Vec<RegisteredSwap> = self
            .swaps
            .iter()
            .filter(|s| {
                matches_query(s.status, s.timestamp, s.key.from_chain_id, s.to_chain_id, query)
            })
            .map(|s| s.clone())
            .collect();
        swaps.sort_by_key(|s| s.init_time);
        swaps.truncate(query.limit);
        Ok(swaps)
    }

    async fn query_results(&self, query: &StatusQuery) -> RouterResult<Vec<SwapResult>> {
        let mut results: Vec<SwapResult> = self
            .results
            .iter()
            .filter(|r| {
                matches_query(r.status, r.timestamp, r.key.from_chain_id, r.to_chain_id, query)
            })
            .map(|r| r.clone())
            .collect();
        match query.order {
            QueryOrder::InitTime => results.sort_by_key(|r| r.init_time),
            QueryOrder::SwapNonce => results.sort_by_key(|r| r.swap_nonce),
        }
        results.truncate(query.limit);
        Ok(results)
    }

    async fn max_swap_nonce(&self, to_chain_id: u64, mpc: &str) -> RouterResult<Option<u64>> {
        Ok(self
            .results
            .iter()
            .filter(|r| r.to_chain_id == to_chain_id && r.mpc.eq_ignore_ascii_case(mpc))
            .map(|r| r.swap_nonce)
            .max())
    }

    async fn count_by_status(&self) -> RouterResult<Vec<(SwapStatus, u64)>> {
        let mut counts: HashMap<SwapStatus, u64> = HashMap::new();
        for swap in self.swaps.iter() {
            *counts.entry(swap.status).or_default() += 1;
        }
        for result in self.results.iter() {
            *counts.entry(result.status).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.code());
        Ok(counts)
    }

    async fn health_check(&self) -> RouterResult<()> {
        Ok(())
    }
}
