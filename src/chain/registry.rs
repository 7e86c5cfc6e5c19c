//! Process-wide router registry: bridges, token tables and swap policy

use super::value::{FeeRule, SwapLimits};
use super::Bridge;
use crate::config::{BlacklistConfig, ChainConfig, Settings};
use crate::error::{RouterError, RouterResult};
use crate::state::RegisteredSwap;

use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Token deployment on one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Multichain token id, lowercase
    pub token_id: String,
    pub chain_id: u64,
    pub address: String,
    pub decimals: u8,
    pub underlying: Option<String>,
    pub router_contract: Option<String>,
}

/// Token lookup tables; refreshed at runtime by the reload worker
#[derive(Default)]
pub struct TokenTables {
    /// (token id, chain id) -> token address
    multichain_tokens: DashMap<(String, u64), String>,
    /// (chain id, token address) -> token config
    token_configs: DashMap<(u64, String), TokenInfo>,
    swap_limits: DashMap<String, SwapLimits>,
    fee_rules: DashMap<String, FeeRule>,
}

impl TokenTables {
    pub fn from_settings(settings: &Settings) -> RouterResult<Self> {
        let tables = Self::default();
        tables.reload(settings)?;
        Ok(tables)
    }

    /// Replace all tables with the content of `settings`
    pub fn reload(&self, settings: &Settings) -> RouterResult<()> {
        let mut swap_limits = HashMap::new();
        for (token_id, config) in &settings.swap_configs {
            let limits = SwapLimits::try_from(config)
                .map_err(|e| RouterError::Config(format!("swap config {}: {}", token_id, e)))?;
            swap_limits.insert(token_id.to_lowercase(), limits);
        }
        let mut fee_rules = HashMap::new();
        for (token_id, config) in &settings.fee_configs {
            let rule = FeeRule::try_from(config)
                .map_err(|e| RouterError::Config(format!("fee config {}: {}", token_id, e)))?;
            fee_rules.insert(token_id.to_lowercase(), rule);
        }

        let mut multichain_tokens = HashMap::new();
        let mut token_configs = HashMap::new();
        for token in &settings.tokens {
            let info = TokenInfo {
                token_id: token.token_id.to_lowercase(),
                chain_id: token.chain_id,
                address: token.address.to_lowercase(),
                decimals: token.decimals,
                underlying: token.underlying.as_ref().map(|u| u.to_lowercase()),
                router_contract: token.router_contract.as_ref().map(|r| r.to_lowercase()),
            };
            multichain_tokens.insert((info.token_id.clone(), info.chain_id), info.address.clone());
            token_configs.insert((info.chain_id, info.address.clone()), info);
        }

        replace_all(&self.multichain_tokens, multichain_tokens);
        replace_all(&self.token_configs, token_configs);
        replace_all(&self.swap_limits, swap_limits);
        replace_all(&self.fee_rules, fee_rules);

        info!(
            "Loaded {} token configs, {} swap configs, {} fee configs",
            self.token_configs.len(),
            self.swap_limits.len(),
            self.fee_rules.len()
        );
        Ok(())
    }

    /// Address of a multichain token on `chain_id`
    pub fn get_multichain_token(&self, token_id: &str, chain_id: u64) -> Option<String> {
        self.multichain_tokens
            .get(&(token_id.to_lowercase(), chain_id))
            .map(|address| address.clone())
    }

    pub fn get_token_config(&self, chain_id: u64, address: &str) -> Option<TokenInfo> {
        self.token_configs
            .get(&(chain_id, address.to_lowercase()))
            .map(|info| info.clone())
    }

    pub fn get_swap_limits(&self, token_id: &str) -> Option<SwapLimits> {
        self.swap_limits.get(&token_id.to_lowercase()).map(|l| *l)
    }

    pub fn get_fee_rule(&self, token_id: &str) -> Option<FeeRule> {
        self.fee_rules.get(&token_id.to_lowercase()).map(|f| *f)
    }
}

/// Insert the new entries, then drop keys that are no longer configured
fn replace_all<K, V>(table: &DashMap<K, V>, entries: HashMap<K, V>)
where
    K: std::hash::Hash + Eq + Clone,
{
    let keep: HashSet<K> = entries.keys().cloned().collect();
    for (key, value) in entries {
        table.insert(key, value);
    }
    table.retain(|key, _| keep.contains(key));
}

/// Same as `replace_all` for sets: members present in both stay visible throughout
fn replace_set<K>(set: &DashSet<K>, members: impl IntoIterator<Item = K>)
where
    K: std::hash::Hash + Eq + Clone,
{
    let keep: HashSet<K> = members.into_iter().collect();
    for member in &keep {
        set.insert(member.clone());
    }
    set.retain(|member| keep.contains(member));
}

/// Bridges per chain id plus the shared lookup tables and policy sets
pub struct RouterRegistry {
    bridges: HashMap<u64, Arc<dyn Bridge>>,
    chain_configs: HashMap<u64, ChainConfig>,
    tokens: Arc<TokenTables>,
    /// MPC address (lowercase) -> public key
    mpc_public_keys: DashMap<String, String>,
    paused_chains: DashSet<u64>,
    blacklisted_chains: DashSet<u64>,
    blacklisted_tokens: DashSet<String>,
    blacklisted_accounts: DashSet<String>,
}

impl RouterRegistry {
    /// Build the registry once at startup
    pub fn new(
        bridges: Vec<Arc<dyn Bridge>>,
        chain_configs: Vec<ChainConfig>,
        tokens: Arc<TokenTables>,
        blacklist: &BlacklistConfig,
    ) -> Self {
        let registry = Self {
            bridges: bridges.into_iter().map(|b| (b.chain_id(), b)).collect(),
            chain_configs: chain_configs.into_iter().map(|c| (c.chain_id, c)).collect(),
            tokens,
            mpc_public_keys: DashMap::new(),
            paused_chains: DashSet::new(),
            blacklisted_chains: DashSet::new(),
            blacklisted_tokens: DashSet::new(),
            blacklisted_accounts: DashSet::new(),
        };
        registry.set_blacklist(blacklist);

        for config in registry.chain_configs.values() {
            if !config.router_mpc_pubkey.is_empty() {
                registry.set_mpc_public_key(&config.router_mpc, &config.router_mpc_pubkey);
            }
        }
        registry
    }

    pub fn get_bridge(&self, chain_id: u64) -> RouterResult<Arc<dyn Bridge>> {
        self.bridges
            .get(&chain_id)
            .cloned()
            .ok_or(RouterError::ChainNotFound { chain_id })
    }

    /// Sorted ids of all chains with a bridge
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.bridges.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn chain_config(&self, chain_id: u64) -> RouterResult<&ChainConfig> {
        self.chain_configs
            .get(&chain_id)
            .ok_or(RouterError::ChainNotFound { chain_id })
    }

    /// Address that signs payouts on `chain_id`
    pub fn router_mpc(&self, chain_id: u64) -> RouterResult<String> {
        Ok(self.chain_config(chain_id)?.router_mpc.to_lowercase())
    }

    pub fn tokens(&self) -> &Arc<TokenTables> {
        &self.tokens
    }

    pub fn set_mpc_public_key(&self, address: &str, pubkey: &str) {
        self.mpc_public_keys
            .insert(address.to_lowercase(), pubkey.to_string());
    }

    pub fn get_mpc_public_key(&self, address: &str) -> RouterResult<String> {
        self.mpc_public_keys
            .get(&address.to_lowercase())
            .map(|pk| pk.clone())
            .ok_or_else(|| RouterError::MissMpcPublicKey(address.to_string()))
    }

    pub fn pause_chain(&self, chain_id: u64) {
        if self.paused_chains.insert(chain_id) {
            warn!("Chain {} paused", chain_id);
        }
    }

    pub fn unpause_chain(&self, chain_id: u64) {
        if self.paused_chains.remove(&chain_id).is_some() {
            info!("Chain {} unpaused", chain_id);
        }
    }

    pub fn is_chain_paused(&self, chain_id: u64) -> bool {
        self.paused_chains.contains(&chain_id)
    }

    /// Replace the blacklists
    pub fn set_blacklist(&self, blacklist: &BlacklistConfig) {
        replace_set(&self.blacklisted_chains, blacklist.chain_ids.iter().copied());
        replace_set(
            &self.blacklisted_tokens,
            blacklist.token_ids.iter().map(|t| t.to_lowercase()),
        );
        replace_set(
            &self.blacklisted_accounts,
            blacklist.accounts.iter().map(|a| a.to_lowercase()),
        );
    }

    pub fn is_chain_blacklisted(&self, chain_id: u64) -> bool {
        self.blacklisted_chains.contains(&chain_id)
    }

    pub fn is_token_blacklisted(&self, token_id: &str) -> bool {
        self.blacklisted_tokens.contains(&token_id.to_lowercase())
    }

    pub fn is_account_blacklisted(&self, account: &str) -> bool {
        !account.is_empty() && self.blacklisted_accounts.contains(&account.to_lowercase())
    }

    /// Reason a swap is blacklisted, if it is
    pub fn swap_blacklist_reason(&self, swap: &RegisteredSwap) -> Option<String> {
        if self.is_chain_blacklisted(swap.key.from_chain_id) {
            return Some(format!("from chain {} is blacklisted", swap.key.from_chain_id));
        }
        if self.is_chain_blacklisted(swap.to_chain_id) {
            return Some(format!("to chain {} is blacklisted", swap.to_chain_id));
        }
        if let Some(token_id) = swap.swap_info.token_id() {
            if self.is_token_blacklisted(token_id) {
                return Some(format!("token {} is blacklisted", token_id));
            }
        }
        if self.is_account_blacklisted(&swap.from) {
            return Some(format!("account {} is blacklisted", swap.from));
        }
        if self.is_account_blacklisted(&swap.bind) {
            return Some(format!("account {} is blacklisted", swap.bind));
        }
        None
    }

    /// Reload token tables and blacklists from refreshed settings
    pub fn reload(&self, settings: &Settings) -> RouterResult<()> {
        self.tokens.reload(settings)?;
        self.set_blacklist(&settings.blacklist);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::FakeBridge;
    use crate::chain::{SwapInfo, SwapType};
    use crate::config::tests::SAMPLE;
    use crate::state::{SwapKey, SwapStatus};
    use ethers::types::U256;

    fn settings() -> Settings {
        std::env::set_var("ROUTER_TEST_PUBKEY", "0x04abcd");
        Settings::parse(SAMPLE).unwrap()
    }

    fn registry() -> RouterRegistry {
        let settings = settings();
        let tokens = Arc::new(TokenTables::from_settings(&settings).unwrap());
        RouterRegistry::new(
            vec![
                Arc::new(FakeBridge::new(1)) as Arc<dyn Bridge>,
                Arc::new(FakeBridge::new(2)),
            ],
            settings.chains.values().cloned().collect(),
            tokens,
            &settings.blacklist,
        )
    }

    fn swap(from: &str) -> RegisteredSwap {
        RegisteredSwap {
            key: SwapKey::new(1, "0xaa", 0),
            swap_type: SwapType::Erc20,
            swap_info: SwapInfo::Erc20 {
                for_native: false,
                for_underlying: false,
                token: "0x3333333333333333333333333333333333333333".into(),
                token_id: "USDC".into(),
                path: vec![],
                amount_out_min: U256::zero(),
            },
            value: U256::from(10),
            from: from.into(),
            bind: "0x6666666666666666666666666666666666666666".into(),
            to_chain_id: 2,
            status: SwapStatus::NotStable,
            init_time: 0,
            timestamp: 0,
            memo: String::new(),
        }
    }

    #[test]
    fn test_bridge_lookup() {
        let registry = registry();
        assert_eq!(registry.chain_ids(), vec![1, 2]);
        assert_eq!(registry.get_bridge(2).unwrap().chain_id(), 2);
        assert!(matches!(
            registry.get_bridge(9),
            Err(RouterError::ChainNotFound { chain_id: 9 })
        ));
    }

    #[test]
    fn test_token_tables_are_case_insensitive() {
        let registry = registry();
        let tokens = registry.tokens();
        assert_eq!(
            tokens.get_multichain_token("usdc", 1).as_deref(),
            Some("0x3333333333333333333333333333333333333333")
        );
        let info = tokens
            .get_token_config(1, "0x3333333333333333333333333333333333333333")
            .unwrap();
        assert_eq!(info.token_id, "usdc");
        assert_eq!(info.decimals, 6);
        assert!(tokens.get_swap_limits("USDC").is_some());
        assert!(tokens.get_fee_rule("usdc").is_none());
    }

    #[test]
    fn test_reload_drops_removed_tokens() {
        let registry = registry();
        let mut settings = settings();
        settings.tokens.clear();
        registry.reload(&settings).unwrap();
        assert!(registry.tokens().get_multichain_token("usdc", 1).is_none());
    }

    #[test]
    fn test_mpc_public_key_from_chain_config() {
        let registry = registry();
        assert_eq!(
            registry
                .get_mpc_public_key("0x2222222222222222222222222222222222222222")
                .unwrap(),
            "0x04abcd"
        );
        assert!(matches!(
            registry.get_mpc_public_key("0x01"),
            Err(RouterError::MissMpcPublicKey(_))
        ));
    }

    #[test]
    fn test_blacklist_and_pause() {
        let registry = registry();
        assert!(registry
            .swap_blacklist_reason(&swap("0x4444444444444444444444444444444444444444"))
            .is_some());
        assert!(registry
            .swap_blacklist_reason(&swap("0x5555555555555555555555555555555555555555"))
            .is_none());

        registry.pause_chain(2);
        assert!(registry.is_chain_paused(2));
        registry.unpause_chain(2);
        assert!(!registry.is_chain_paused(2));
    }

    #[test]
    fn test_blacklist_reload_never_drops_kept_entries() {
        let registry = registry();
        let mut settings = settings();
        let banned = "0x4444444444444444444444444444444444444444";
        settings.blacklist.accounts.push("0x7777777777777777777777777777777777777777".into());

        let stop = std::sync::atomic::AtomicBool::new(false);
        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    assert!(registry.is_account_blacklisted(banned));
                }
            });
            for _ in 0..500 {
                registry.reload(&settings).unwrap();
            }
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
            reader.join().unwrap();
        });

        assert!(registry.is_account_blacklisted("0x7777777777777777777777777777777777777777"));
        settings.blacklist.accounts.retain(|a| a != banned);
        registry.reload(&settings).unwrap();
        assert!(!registry.is_account_blacklisted(banned));
    }
}
