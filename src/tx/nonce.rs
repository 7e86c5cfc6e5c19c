//! Payout nonce cache shared by nonce-based chain bridges
//!
//! Handles:
//! - Local tracking of the next payout nonce per sender
//! - Serialised allocation, committed only when the swap records the nonce
//! - Recycling of nonces whose payout never made it on chain

use crate::error::RouterResult;

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Nonce that was allocated but never used on chain
#[derive(Debug, Clone, Copy)]
struct RecycledNonce {
    nonce: u64,
    since: Instant,
}

/// Per-sender nonce state
#[derive(Debug, Default)]
struct SenderNonceState {
    /// Next nonce to hand out
    next: u64,
    /// Lowest recycled nonce waiting to be reused
    recycled: Option<RecycledNonce>,
}

/// Next-nonce cache keyed by lowercase sender address
pub struct NonceCache {
    chain_id: u64,
    senders: DashMap<String, Arc<Mutex<SenderNonceState>>>,
    /// A recycled nonce is reused only after this long, so a late broadcast can still land
    recycle_ack: Duration,
}

impl NonceCache {
    /// Create an empty cache
    pub fn new(chain_id: u64, recycle_ack: Duration) -> Self {
        Self {
            chain_id,
            senders: DashMap::new(),
            recycle_ack,
        }
    }

    fn sender(&self, account: &str) -> Arc<Mutex<SenderNonceState>> {
        self.senders
            .entry(account.to_lowercase())
            .or_default()
            .clone()
    }

    /// Current next nonce for an account, 0 if unknown
    pub async fn current(&self, account: &str) -> u64 {
        let state = match self.senders.get(&account.to_lowercase()) {
            Some(state) => state.clone(),
            None => return 0,
        };
        let next = state.lock().await.next;
        next
    }

    /// Reconcile a nonce reported by the chain with the cached one.
    ///
    /// Returns the larger of the two, except that a reported value above
    /// `2 * cached + 1000` is treated as garbage and the cached value wins.
    pub async fn adjust(&self, account: &str, value: u64) -> u64 {
        let cached = self.current(account).await;
        if value > cached.saturating_mul(2).saturating_add(1000) {
            warn!(
                "Forbid adjust nonce on chain {} for {} (cached {}, reported {})",
                self.chain_id, account, cached, value
            );
            return cached;
        }
        cached.max(value)
    }

    /// Raise the next nonce; never lowers it
    pub async fn set(&self, account: &str, value: u64) {
        let state = self.sender(account);
        let mut state = state.lock().await;
        if value > state.next {
            debug!(
                "Set next nonce on chain {} for {}: {} -> {}",
                self.chain_id, account, state.next, value
            );
            state.next = value;
        }
    }

    /// Seed the cache from the store's next nonce and the chain's pending nonce
    pub async fn init(&self, account: &str, db_next: u64, pool_nonce: Option<u64>) -> u64 {
        let nonce = match pool_nonce {
            Some(pool) if pool > db_next => {
                warn!(
                    "Init swap nonce on chain {} with account nonce {} (store has {})",
                    self.chain_id, pool, db_next
                );
                pool
            }
            _ => db_next,
        };

        let state = self.sender(account);
        state.lock().await.next = nonce;
        info!(
            "Init swap nonce on chain {} for {}: {}",
            self.chain_id, account, nonce
        );
        nonce
    }

    /// Remember a nonce that will never be used; only the lowest one is kept
    pub async fn recycle(&self, account: &str, nonce: u64) {
        let state = self.sender(account);
        let mut state = state.lock().await;
        let replace = state.recycled.map_or(true, |r| nonce < r.nonce);
        if replace {
            state.recycled = Some(RecycledNonce {
                nonce,
                since: Instant::now(),
            });
            info!(
                "Recycled swap nonce {} on chain {} for {}",
                nonce, self.chain_id, account
            );
        }
    }

    /// Hand out a nonce and commit it through `assign`.
    ///
    /// Allocation for one sender is serialised. An acknowledged recycled nonce is
    /// preferred over the counter. The cache only moves when `assign` succeeds,
    /// so a rejected assignment leaves the nonce available for the next swap.
    pub async fn allocate<F, Fut>(&self, account: &str, assign: F) -> RouterResult<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = RouterResult<()>>,
    {
        let state = self.sender(account);
        let mut state = state.lock().await;

        if let Some(recycled) = state.recycled {
            if recycled.since.elapsed() >= self.recycle_ack {
                assign(recycled.nonce).await?;
                state.recycled = None;
                debug!(
                    "Allocated recycled nonce {} on chain {} for {}",
                    recycled.nonce, self.chain_id, account
                );
                return Ok(recycled.nonce);
            }
        }

        let nonce = state.next;
        assign(nonce).await?;
        state.next = nonce + 1;
        debug!(
            "Allocated nonce {} on chain {} for {}",
            nonce, self.chain_id, account
        );
        Ok(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use std::sync::atomic::{AtomicU64, Ordering};

    const ACCOUNT: &str = "0xAbCd000000000000000000000000000000000001";

    #[tokio::test]
    async fn test_set_is_monotonic_and_case_insensitive() {
        let cache = NonceCache::new(1, Duration::from_secs(300));
        cache.set(ACCOUNT, 10).await;
        cache.set(&ACCOUNT.to_lowercase(), 5).await;
        assert_eq!(cache.current(&ACCOUNT.to_uppercase()).await, 10);
    }

    #[tokio::test]
    async fn test_adjust_rejects_garbage() {
        let cache = NonceCache::new(1, Duration::from_secs(300));
        cache.set(ACCOUNT, 10).await;
        assert_eq!(cache.adjust(ACCOUNT, 8).await, 10);
        assert_eq!(cache.adjust(ACCOUNT, 12).await, 12);
        assert_eq!(cache.adjust(ACCOUNT, 1020).await, 1020);
        assert_eq!(cache.adjust(ACCOUNT, 1021).await, 10);
        // adjusting does not store
        assert_eq!(cache.current(ACCOUNT).await, 10);
    }

    #[tokio::test]
    async fn test_init_takes_max_of_store_and_pool() {
        let cache = NonceCache::new(1, Duration::from_secs(300));
        assert_eq!(cache.init(ACCOUNT, 7, Some(9)).await, 9);
        assert_eq!(cache.init(ACCOUNT, 7, Some(3)).await, 7);
        assert_eq!(cache.init(ACCOUNT, 4, None).await, 4);
    }

    #[tokio::test]
    async fn test_allocate_advances_only_on_success() {
        let cache = NonceCache::new(1, Duration::from_secs(300));
        cache.set(ACCOUNT, 3).await;

        let err = cache
            .allocate(ACCOUNT, |_| async { Err(RouterError::Internal("rejected".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.current(ACCOUNT).await, 3);

        let nonce = cache.allocate(ACCOUNT, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(nonce, 3);
        assert_eq!(cache.current(ACCOUNT).await, 4);
    }

    #[tokio::test]
    async fn test_recycled_nonce_reused_after_ack() {
        let cache = NonceCache::new(1, Duration::from_millis(0));
        cache.set(ACCOUNT, 10).await;
        cache.recycle(ACCOUNT, 8).await;
        cache.recycle(ACCOUNT, 9).await;

        let nonce = cache.allocate(ACCOUNT, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(nonce, 8);
        let nonce = cache.allocate(ACCOUNT, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(nonce, 10);
    }

    #[tokio::test]
    async fn test_recycled_nonce_waits_for_ack() {
        let cache = NonceCache::new(1, Duration::from_secs(300));
        cache.set(ACCOUNT, 10).await;
        cache.recycle(ACCOUNT, 8).await;

        let nonce = cache.allocate(ACCOUNT, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(nonce, 10);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_distinct() {
        let cache = Arc::new(NonceCache::new(1, Duration::from_secs(300)));
        let assigned = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let assigned = assigned.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .allocate(ACCOUNT, |_| async move {
                        assigned.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok(())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (0..8).collect::<Vec<u64>>());
        assert_eq!(assigned.load(Ordering::SeqCst), 8);
    }
}
