//! Signer nodes and signing groups

use crate::config::MpcNodeConfig;
use crate::error::{RouterError, RouterResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// One MPC node this router talks to
pub struct SignerNode {
    rpc_addr: String,
    /// On-chain account that signs envelopes for this node
    user: Address,
    wallet: LocalWallet,
    sign_groups: Vec<String>,
    /// Highest envelope nonce handed out, `u64::MAX` before the first one
    last_nonce: AtomicU64,
}

impl SignerNode {
    pub fn new(rpc_addr: &str, wallet: LocalWallet, sign_groups: Vec<String>) -> Self {
        Self {
            rpc_addr: rpc_addr.to_string(),
            user: wallet.address(),
            wallet,
            sign_groups,
            last_nonce: AtomicU64::new(u64::MAX),
        }
    }

    /// Load the node key from an env var or from a keystore file
    pub fn from_config(config: &MpcNodeConfig) -> RouterResult<Self> {
        let wallet = load_wallet(config)?;
        let node = Self::new(&config.rpc_address, wallet, config.sign_groups.clone());
        info!(
            "Loaded mpc node {} with user {:?}",
            node.rpc_addr, node.user
        );
        Ok(node)
    }

    pub fn rpc_addr(&self) -> &str {
        &self.rpc_addr
    }

    pub fn user(&self) -> Address {
        self.user
    }

    pub fn user_hex(&self) -> String {
        format!("{:?}", self.user)
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    pub fn sign_groups(&self) -> &[String] {
        &self.sign_groups
    }

    /// Envelope nonce to use given the node's reported nonce.
    ///
    /// Always strictly above every nonce this process handed out before, so a
    /// stale remote answer can never make two envelopes share a nonce.
    pub fn next_sign_nonce(&self, remote: u64) -> u64 {
        let mut chosen = remote;
        let _ = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                chosen = if last == u64::MAX {
                    remote
                } else {
                    remote.max(last + 1)
                };
                Some(chosen)
            });
        chosen
    }
}

fn load_wallet(config: &MpcNodeConfig) -> RouterResult<LocalWallet> {
    if let Some(var) = &config.private_key_env {
        let key = env::var(var)
            .map_err(|_| RouterError::Config(format!("Missing private key env {}", var)))?;
        return LocalWallet::from_str(key.trim_start_matches("0x"))
            .map_err(|e| RouterError::Wallet(e.to_string()));
    }

    match (&config.keystore_file, &config.password_file) {
        (Some(keystore), Some(password_file)) => {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                RouterError::Config(format!("Failed to read password file {}: {}", password_file, e))
            })?;
            LocalWallet::decrypt_keystore(keystore, password.trim())
                .map_err(|e| RouterError::Wallet(e.to_string()))
        }
        _ => Err(RouterError::Config(format!(
            "mpc node {} has neither private_key_env nor keystore_file and password_file",
            config.rpc_address
        ))),
    }
}

/// A signing group as registered in the MPC network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningGroup {
    pub group_id: String,
    pub needed: u32,
    pub total: u32,
}

impl SigningGroup {
    pub fn new(group_id: &str, needed: u32, total: u32) -> Self {
        Self {
            group_id: group_id.to_string(),
            needed,
            total,
        }
    }

    /// Threshold string sent with every sign request
    pub fn threshold(&self) -> String {
        format!("{}/{}", self.needed, self.total)
    }

    /// Expected member count: all oracles for the top group, the quorum for sign groups
    pub fn member_count(&self, is_sign_group: bool) -> u32 {
        if is_sign_group {
            self.needed
        } else {
            self.total
        }
    }
}
