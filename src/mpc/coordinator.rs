//! MPC signing coordinator
//!
//! Picks an initiator node, frames sign requests in signed envelopes, fails
//! over across the node's sign groups and validates the returned signatures.

use super::envelope::build_envelope;
use super::node::{SignerNode, SigningGroup};
use super::rpc::{AcceptData, MpcRpc, SignData, SignInfoData};
use crate::config::MpcConfig;
use crate::error::{RouterError, RouterResult};
use crate::metrics;
use crate::retry::{BoundedRetry, LivenessRetry};

use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

const ACCEPT_HISTORY_SIZE: usize = 500;

/// Result of a completed threshold signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutcome {
    pub rpc_addr: String,
    pub key_id: String,
    pub rsvs: Vec<String>,
}

/// Verdict of this node on a pending sign request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    Agree,
    Disagree,
    /// Not ours to judge (foreign identifier, unknown initiator); remembered
    Ignore,
    /// Cannot judge yet (source tx unstable); asked again next round
    Skip,
}

impl AcceptDecision {
    fn as_accept(self) -> Option<&'static str> {
        match self {
            AcceptDecision::Agree => Some("AGREE"),
            AcceptDecision::Disagree => Some("DISAGREE"),
            AcceptDecision::Ignore | AcceptDecision::Skip => None,
        }
    }
}

#[derive(Debug, Clone)]
struct AcceptRecord {
    key_id: String,
    decision: AcceptDecision,
    msg_hash: Vec<String>,
    msg_context: Vec<String>,
}

/// Summary of one accept round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptRound {
    pub pending: usize,
    pub agreed: usize,
    pub disagreed: usize,
}

/// Coordinates threshold signing against the external MPC network
pub struct MpcCoordinator {
    rpc: Arc<dyn MpcRpc>,
    group: SigningGroup,
    mode: String,
    default_node: Arc<SignerNode>,
    /// Nodes this router may start sign requests on; empty on oracle nodes
    initiators: Vec<Arc<SignerNode>>,
    /// Accounts whose sign requests this node will judge
    allowed_initiators: Vec<String>,
    self_enode: RwLock<String>,
    all_enodes: RwLock<Vec<String>>,
    accept_history: Mutex<VecDeque<AcceptRecord>>,
    sign_status_retry: BoundedRetry,
    sign_status_interval: Duration,
    liveness: LivenessRetry,
    initiator_backoff: Duration,
    ping_count: u32,
    max_accept_sign_interval_secs: i64,
}

impl MpcCoordinator {
    /// Build from config, loading node keys; server routers register initiators
    pub fn from_config(
        config: &MpcConfig,
        is_server: bool,
        rpc: Arc<dyn MpcRpc>,
    ) -> RouterResult<Self> {
        let default_node = Arc::new(SignerNode::from_config(&config.default_node)?);
        let mut initiators = Vec::new();
        if is_server {
            initiators.push(default_node.clone());
            for node_config in &config.other_nodes {
                initiators.push(Arc::new(SignerNode::from_config(node_config)?));
            }
        }
        Self::new(config, rpc, default_node, initiators)
    }

    pub fn new(
        config: &MpcConfig,
        rpc: Arc<dyn MpcRpc>,
        default_node: Arc<SignerNode>,
        initiators: Vec<Arc<SignerNode>>,
    ) -> RouterResult<Self> {
        check_nodes(&default_node, &initiators)?;

        let group = SigningGroup::new(&config.group_id, config.needed_oracles, config.total_oracles);
        info!(
            "Init mpc group {} with threshold {} and mode {}",
            group.group_id,
            group.threshold(),
            config.mode
        );

        Ok(Self {
            rpc,
            group,
            mode: config.mode.to_string(),
            default_node,
            initiators,
            allowed_initiators: config
                .initiators
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            self_enode: RwLock::new(String::new()),
            all_enodes: RwLock::new(Vec::new()),
            accept_history: Mutex::new(VecDeque::new()),
            sign_status_retry: BoundedRetry::new(
                config.sign_status_retry_count,
                Duration::from_secs(config.sign_status_interval_secs),
            ),
            sign_status_interval: Duration::from_secs(config.sign_status_interval_secs),
            liveness: LivenessRetry::new(Duration::from_secs(config.liveness_interval_secs)),
            initiator_backoff: Duration::from_secs(config.initiator_backoff_secs),
            ping_count: config.ping_count.max(1),
            max_accept_sign_interval_secs: config.max_accept_sign_interval_secs,
        })
    }

    /// Whether this router starts sign requests
    pub fn is_server(&self) -> bool {
        !self.initiators.is_empty()
    }

    pub fn group(&self) -> &SigningGroup {
        &self.group
    }

    pub async fn self_enode(&self) -> String {
        self.self_enode.read().await.clone()
    }

    /// Check the MPC network matches the configured groups.
    ///
    /// Lookups are retried until the nodes answer; any mismatch is fatal.
    pub async fn init(&self) -> RouterResult<()> {
        let default_addr = self.default_node.rpc_addr().to_string();
        let enode = self
            .liveness
            .run("get mpc enode", || self.rpc.get_enode(&default_addr))
            .await?;
        if !enode.contains('@') {
            return Err(RouterError::Config(format!(
                "wrong self enode, has no '@' char: {}",
                enode
            )));
        }
        info!("Got mpc enode {}", enode);
        *self.self_enode.write().await = enode;

        let group_id = self.group.group_id.clone();
        let enodes = self
            .verify_group(&default_addr, &group_id, false, true)
            .await?;
        *self.all_enodes.write().await = enodes;

        for (index, node) in self.initiators.iter().enumerate() {
            let include_self = index == 0;
            for sign_group in node.sign_groups() {
                self.verify_group(node.rpc_addr(), sign_group, true, include_self)
                    .await?;
            }
        }

        info!(
            "Init mpc success, server: {}, initiators: {}",
            self.is_server(),
            self.initiators.len()
        );
        Ok(())
    }

    async fn verify_group(
        &self,
        rpc_addr: &str,
        group_id: &str,
        is_sign_group: bool,
        include_self: bool,
    ) -> RouterResult<Vec<String>> {
        let info = self
            .liveness
            .run("get mpc group", || self.rpc.get_group_by_id(group_id, rpc_addr))
            .await?;
        debug!("Got mpc group {}: {:?}", group_id, info);

        let expected = self.group.member_count(is_sign_group);
        if info.count != expected {
            return Err(RouterError::Config(format!(
                "mpc group {} member count mismatch: have {}, want {}",
                group_id, info.count, expected
            )));
        }
        if info.enodes.len() as u32 != expected {
            return Err(RouterError::Config(format!(
                "mpc group {} enodes count mismatch: have {}, want {}",
                group_id,
                info.enodes.len(),
                expected
            )));
        }

        let self_enode = self.self_enode.read().await.clone();
        let exist = enode_exists_in(&self_enode, &info.enodes);
        if exist != include_self {
            return Err(RouterError::Config(format!(
                "self enode's existence in group {} mismatch: want {}, have {}",
                group_id, include_self, exist
            )));
        }

        if is_sign_group {
            let all_enodes = self.all_enodes.read().await;
            if let Some(unrelated) = info
                .enodes
                .iter()
                .find(|enode| !enode_exists_in(enode, &all_enodes))
            {
                return Err(RouterError::Config(format!(
                    "sign group {} has unrelated enode {}",
                    group_id, unrelated
                )));
            }
        }

        Ok(info.enodes)
    }

    /// Sign a single hash
    pub async fn sign_one(
        &self,
        pubkey: &str,
        msg_hash: &str,
        msg_context: &str,
    ) -> RouterResult<SignOutcome> {
        self.sign(pubkey, &[msg_hash.to_string()], &[msg_context.to_string()])
            .await
    }

    /// Request a threshold signature of every hash under `pubkey`
    pub async fn sign(
        &self,
        pubkey: &str,
        msg_hashes: &[String],
        msg_contexts: &[String],
    ) -> RouterResult<SignOutcome> {
        if pubkey.is_empty() {
            return Err(RouterError::MpcSign(
                "mpc sign with empty public key".to_string(),
            ));
        }
        debug!("Mpc sign {:?}", msg_hashes);

        let started = Instant::now();
        let node = self.select_initiator().await?;
        let result = self.sign_with_node(&node, pubkey, msg_hashes, msg_contexts).await;
        metrics::record_mpc_sign(result.is_ok(), started.elapsed());
        result
    }

    async fn sign_with_node(
        &self,
        node: &SignerNode,
        pubkey: &str,
        msg_hashes: &[String],
        msg_contexts: &[String],
    ) -> RouterResult<SignOutcome> {
        let groups = node.sign_groups().len();
        let start = rand::thread_rng().gen_range(0..groups);

        let mut last_error = None;
        for offset in 0..groups {
            let index = (start + offset) % groups;
            match self
                .sign_with_group(node, index, pubkey, msg_hashes, msg_contexts)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e @ RouterError::SignatureCountMismatch { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        "Mpc sign with group {} on {} failed: {}",
                        node.sign_groups()[index],
                        node.rpc_addr(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RouterError::MpcSign("no sign group available".to_string())))
    }

    async fn sign_with_group(
        &self,
        node: &SignerNode,
        group_index: usize,
        pubkey: &str,
        msg_hashes: &[String],
        msg_contexts: &[String],
    ) -> RouterResult<SignOutcome> {
        let rpc_addr = node.rpc_addr();
        let remote_nonce = self.rpc.get_sign_nonce(&node.user_hex(), rpc_addr).await?;
        let nonce = node.next_sign_nonce(remote_nonce);

        let data = SignData {
            tx_type: "SIGN".to_string(),
            pub_key: pubkey.to_string(),
            msg_hash: msg_hashes.to_vec(),
            msg_context: msg_contexts.to_vec(),
            key_type: "ECDSA".to_string(),
            group_id: node.sign_groups()[group_index].clone(),
            threshold: self.group.threshold(),
            mode: self.mode.clone(),
            timestamp: now_millis(),
        };
        let payload =
            serde_json::to_vec(&data).map_err(|e| RouterError::Internal(e.to_string()))?;
        let raw_tx = build_envelope(node.wallet(), nonce, &payload)?;

        let key_id = self.rpc.sign(&raw_tx, rpc_addr).await?;
        info!(
            "Mpc sign request {} sent to {} with nonce {}",
            key_id, rpc_addr, nonce
        );

        tokio::time::sleep(self.sign_status_interval).await;
        let status = self
            .sign_status_retry
            .run("get sign status", || self.rpc.get_sign_status(&key_id, rpc_addr))
            .await?;

        if status.rsv.len() != msg_hashes.len() {
            error!(
                "Mpc sign {} returned {} signatures for {} hashes",
                key_id,
                status.rsv.len(),
                msg_hashes.len()
            );
            return Err(RouterError::SignatureCountMismatch {
                expected: msg_hashes.len(),
                actual: status.rsv.len(),
            });
        }

        Ok(SignOutcome {
            rpc_addr: rpc_addr.to_string(),
            key_id,
            rsvs: status.rsv,
        })
    }

    /// Pick the node to start a sign request on.
    ///
    /// With several initiators the first one answering a ping wins; when none
    /// answers, wait and ask again. This never gives up.
    async fn select_initiator(&self) -> RouterResult<Arc<SignerNode>> {
        match self.initiators.as_slice() {
            [] => Err(RouterError::MpcSign(
                "this router is not an mpc initiator".to_string(),
            )),
            [only] => Ok(only.clone()),
            nodes => loop {
                for node in nodes {
                    if self.ping(node).await {
                        return Ok(node.clone());
                    }
                }
                warn!(
                    "No mpc initiator answered, retrying in {:?}",
                    self.initiator_backoff
                );
                tokio::time::sleep(self.initiator_backoff).await;
            },
        }
    }

    async fn ping(&self, node: &SignerNode) -> bool {
        for attempt in 0..self.ping_count {
            match self.rpc.get_enode(node.rpc_addr()).await {
                Ok(_) => return true,
                Err(e) => {
                    debug!("Ping mpc node {} failed: {}", node.rpc_addr(), e);
                    if attempt + 1 < self.ping_count {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        error!(
            "Ping mpc node {} failed {} times",
            node.rpc_addr(),
            self.ping_count
        );
        false
    }

    /// Answer a sign request from the default node; accept envelopes use nonce 0
    pub async fn accept(
        &self,
        key_id: &str,
        agree: bool,
        msg_hashes: &[String],
        msg_contexts: &[String],
    ) -> RouterResult<String> {
        let data = AcceptData {
            tx_type: "ACCEPTSIGN".to_string(),
            key: key_id.to_string(),
            accept: if agree { "AGREE" } else { "DISAGREE" }.to_string(),
            msg_hash: msg_hashes.to_vec(),
            msg_context: msg_contexts.to_vec(),
            timestamp: now_millis(),
        };
        let payload =
            serde_json::to_vec(&data).map_err(|e| RouterError::Internal(e.to_string()))?;
        let raw_tx = build_envelope(self.default_node.wallet(), 0, &payload)?;
        self.rpc
            .accept_sign(&raw_tx, self.default_node.rpc_addr())
            .await
    }

    /// Sign requests waiting for this node's answer
    pub async fn pending_sign_requests(&self) -> RouterResult<Vec<SignInfoData>> {
        self.rpc
            .get_cur_node_sign_info(
                self.max_accept_sign_interval_secs,
                self.default_node.rpc_addr(),
            )
            .await
    }

    /// Whether `account` may initiate sign requests this node judges
    pub fn is_allowed_initiator(&self, account: &str) -> bool {
        let account = account.to_lowercase();
        self.allowed_initiators.iter().any(|a| *a == account)
            || self
                .initiators
                .iter()
                .any(|node| node.user_hex() == account)
    }

    /// Judge and answer every pending sign request.
    ///
    /// Requests answered before are answered again with the remembered verdict.
    pub async fn accept_pending<F, Fut>(&self, verify: F) -> RouterResult<AcceptRound>
    where
        F: Fn(SignInfoData) -> Fut,
        Fut: Future<Output = AcceptDecision>,
    {
        let pending = self.pending_sign_requests().await?;
        let mut round = AcceptRound {
            pending: pending.len(),
            ..Default::default()
        };

        for info in pending {
            let key_id = info.key.clone();

            let remembered = self.remembered_decision(&key_id).await;
            let decision = match remembered {
                Some(AcceptDecision::Ignore) => continue,
                Some(decision) => decision,
                None => {
                    if !self.is_allowed_initiator(&info.account) {
                        debug!("Ignore sign {} from unknown initiator {}", key_id, info.account);
                        self.remember(&info, AcceptDecision::Ignore).await;
                        continue;
                    }
                    verify(info.clone()).await
                }
            };

            let Some(accept) = decision.as_accept() else {
                if decision == AcceptDecision::Ignore {
                    self.remember(&info, decision).await;
                }
                continue;
            };

            info!("Mpc accept sign {} with {}", key_id, accept);
            match self
                .accept(
                    &key_id,
                    decision == AcceptDecision::Agree,
                    &info.msg_hash,
                    &info.msg_context,
                )
                .await
            {
                Ok(_) => {
                    metrics::record_mpc_accept(accept);
                    if remembered.is_none() {
                        self.remember(&info, decision).await;
                    }
                    if decision == AcceptDecision::Agree {
                        round.agreed += 1;
                    } else {
                        round.disagreed += 1;
                    }
                }
                Err(e) => warn!("Mpc accept sign {} failed: {}", key_id, e),
            }
        }

        Ok(round)
    }

    async fn remembered_decision(&self, key_id: &str) -> Option<AcceptDecision> {
        self.accept_history
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.key_id == key_id)
            .map(|r| r.decision)
    }

    async fn remember(&self, info: &SignInfoData, decision: AcceptDecision) {
        let mut history = self.accept_history.lock().await;
        if history.len() == ACCEPT_HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(AcceptRecord {
            key_id: info.key.clone(),
            decision,
            msg_hash: info.msg_hash.clone(),
            msg_context: info.msg_context.clone(),
        });
    }

    /// Hashes and contexts this node answered for a sign request
    pub async fn accepted_request(&self, key_id: &str) -> Option<(Vec<String>, Vec<String>)> {
        self.accept_history
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.key_id == key_id)
            .map(|r| (r.msg_hash.clone(), r.msg_context.clone()))
    }
}

fn check_nodes(default_node: &SignerNode, initiators: &[Arc<SignerNode>]) -> RouterResult<()> {
    if default_node.rpc_addr().is_empty() {
        return Err(RouterError::Config("empty mpc rpc address".to_string()));
    }
    for (i, node) in initiators.iter().enumerate() {
        if node.rpc_addr().is_empty() {
            return Err(RouterError::Config("initiator: empty mpc rpc address".to_string()));
        }
        if node.user().is_zero() {
            return Err(RouterError::Config("initiator: empty mpc user".to_string()));
        }
        if node.sign_groups().is_empty() {
            return Err(RouterError::Config(format!(
                "initiator {} has empty sign groups",
                node.rpc_addr()
            )));
        }
        if initiators[..i]
            .iter()
            .any(|old| old.rpc_addr() == node.rpc_addr() || old.user() == node.user())
        {
            return Err(RouterError::Config(format!(
                "duplicate initiator {} ({:?})",
                node.rpc_addr(),
                node.user()
            )));
        }
    }
    Ok(())
}

/// Compare enodes by their id, the part before `@`
fn enode_exists_in(enode: &str, enodes: &[String]) -> bool {
    let id = enode.split('@').next().unwrap_or(enode);
    enodes
        .iter()
        .any(|item| item.split('@').next().unwrap_or(item) == id)
}

fn now_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::node::tests::test_node;
    use super::super::rpc::{GroupInfo, MockMpcRpc, SignStatus};
    use super::*;
    use crate::config::MpcNodeConfig;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::utils::rlp::Rlp;
    use std::sync::Mutex as StdMutex;

    fn mpc_config() -> MpcConfig {
        MpcConfig {
            api_prefix: "smpc_".to_string(),
            rpc_timeout_secs: 1,
            group_id: "group-a".to_string(),
            needed_oracles: 2,
            total_oracles: 3,
            mode: 0,
            sign_status_retry_count: 3,
            sign_status_interval_secs: 0,
            liveness_interval_secs: 0,
            initiator_backoff_secs: 0,
            ping_count: 1,
            default_node: MpcNodeConfig {
                rpc_address: "http://node-a".to_string(),
                sign_groups: vec!["sub-1".to_string(), "sub-2".to_string()],
                keystore_file: None,
                password_file: None,
                private_key_env: None,
            },
            other_nodes: vec![],
            initiators: vec![],
            accept_interval_secs: 0,
            max_accept_sign_interval_secs: 600,
        }
    }

    fn coordinator(rpc: MockMpcRpc) -> MpcCoordinator {
        let node = Arc::new(test_node("http://node-a", &["sub-1", "sub-2"]));
        MpcCoordinator::new(&mpc_config(), Arc::new(rpc), node.clone(), vec![node]).unwrap()
    }

    fn decode_envelope(raw: &str) -> (u64, serde_json::Value) {
        let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
        let (tx, _) = TypedTransaction::decode_signed(&Rlp::new(&bytes)).unwrap();
        let payload = serde_json::from_slice(tx.data().unwrap()).unwrap();
        (tx.nonce().unwrap().as_u64(), payload)
    }

    #[tokio::test]
    async fn test_sign_uses_increasing_envelope_nonces() {
        let envelopes = Arc::new(StdMutex::new(Vec::new()));
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_sign_nonce().returning(|_, _| Ok(5));
        let seen = envelopes.clone();
        rpc.expect_sign().returning(move |raw, _| {
            seen.lock().unwrap().push(raw.to_string());
            Ok("0xkey".to_string())
        });
        rpc.expect_get_sign_status().returning(|_, _| {
            Ok(SignStatus {
                status: "Success".to_string(),
                rsv: vec!["ab".repeat(65)],
                ..Default::default()
            })
        });
        let coordinator = coordinator(rpc);

        let first = coordinator.sign_one("04pub", "0x01", "{}").await.unwrap();
        assert_eq!(first.key_id, "0xkey");
        assert_eq!(first.rpc_addr, "http://node-a");
        coordinator.sign_one("04pub", "0x02", "{}").await.unwrap();

        let envelopes = envelopes.lock().unwrap();
        let (nonce1, payload1) = decode_envelope(&envelopes[0]);
        let (nonce2, payload2) = decode_envelope(&envelopes[1]);
        assert_eq!((nonce1, nonce2), (5, 6));
        assert_eq!(payload1["TxType"], "SIGN");
        assert_eq!(payload1["ThresHold"], "2/3");
        assert_eq!(payload2["MsgHash"][0], "0x02");
    }

    #[tokio::test]
    async fn test_signature_count_mismatch_is_not_retried() {
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_sign_nonce().returning(|_, _| Ok(0));
        rpc.expect_sign()
            .times(1)
            .returning(|_, _| Ok("0xkey".to_string()));
        rpc.expect_get_sign_status().returning(|_, _| {
            Ok(SignStatus {
                status: "Success".to_string(),
                rsv: vec![],
                ..Default::default()
            })
        });
        let coordinator = coordinator(rpc);

        let err = coordinator.sign_one("04pub", "0x01", "{}").await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::SignatureCountMismatch {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_sign_fails_over_to_next_group() {
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_sign_nonce().returning(|_, _| Ok(0));
        rpc.expect_sign().returning(|raw, _| {
            let (_, payload) = decode_envelope(raw);
            if payload["GroupID"] == "sub-1" {
                Err(RouterError::MpcRpc {
                    rpc_addr: "http://node-a".to_string(),
                    message: "group offline".to_string(),
                })
            } else {
                Ok("0xkey".to_string())
            }
        });
        rpc.expect_get_sign_status().returning(|_, _| {
            Ok(SignStatus {
                status: "Success".to_string(),
                rsv: vec!["00".repeat(65)],
                ..Default::default()
            })
        });
        let coordinator = coordinator(rpc);

        for _ in 0..4 {
            assert!(coordinator.sign_one("04pub", "0x01", "{}").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_sign_rejects_empty_pubkey() {
        let coordinator = coordinator(MockMpcRpc::new());
        assert!(matches!(
            coordinator.sign_one("", "0x01", "{}").await,
            Err(RouterError::MpcSign(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_polls_status_until_complete() {
        let polls = Arc::new(StdMutex::new(0));
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_sign_nonce().returning(|_, _| Ok(0));
        rpc.expect_sign().returning(|_, _| Ok("0xkey".to_string()));
        let counter = polls.clone();
        rpc.expect_get_sign_status().returning(move |_, _| {
            let mut polls = counter.lock().unwrap();
            *polls += 1;
            if *polls < 3 {
                Err(RouterError::MpcRpc {
                    rpc_addr: "http://node-a".to_string(),
                    message: "pending".to_string(),
                })
            } else {
                Ok(SignStatus {
                    status: "Success".to_string(),
                    rsv: vec!["00".repeat(65)],
                    ..Default::default()
                })
            }
        });
        let coordinator = coordinator(rpc);

        coordinator.sign_one("04pub", "0x01", "{}").await.unwrap();
        assert_eq!(*polls.lock().unwrap(), 3);
    }

    fn group(enodes: &[&str]) -> GroupInfo {
        GroupInfo {
            count: enodes.len() as u32,
            enodes: enodes.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_init_checks_group_membership() {
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_enode()
            .returning(|_| Ok("enode://aa@10.0.0.1:30303".to_string()));
        rpc.expect_get_group_by_id().returning(|group_id, _| {
            Ok(match group_id {
                "group-a" => group(&[
                    "enode://aa@10.0.0.1:1",
                    "enode://bb@10.0.0.2:1",
                    "enode://cc@10.0.0.3:1",
                ]),
                "sub-1" => group(&["enode://aa@x", "enode://bb@y"]),
                _ => group(&["enode://aa@x", "enode://cc@z"]),
            })
        });
        let coordinator = coordinator(rpc);

        coordinator.init().await.unwrap();
        assert_eq!(coordinator.self_enode().await, "enode://aa@10.0.0.1:30303");
    }

    #[tokio::test]
    async fn test_init_rejects_member_count_mismatch() {
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_enode()
            .returning(|_| Ok("enode://aa@10.0.0.1:30303".to_string()));
        rpc.expect_get_group_by_id()
            .returning(|_, _| Ok(group(&["enode://aa@x", "enode://bb@y"])));
        let coordinator = coordinator(rpc);

        let err = coordinator.init().await.unwrap_err();
        assert!(err.to_string().contains("member count mismatch"));
    }

    #[tokio::test]
    async fn test_init_rejects_unrelated_sign_group_enode() {
        let mut rpc = MockMpcRpc::new();
        rpc.expect_get_enode()
            .returning(|_| Ok("enode://aa@10.0.0.1:30303".to_string()));
        rpc.expect_get_group_by_id().returning(|group_id, _| {
            Ok(match group_id {
                "group-a" => group(&["enode://aa@1", "enode://bb@2", "enode://cc@3"]),
                _ => group(&["enode://aa@1", "enode://zz@9"]),
            })
        });
        let coordinator = coordinator(rpc);

        let err = coordinator.init().await.unwrap_err();
        assert!(err.to_string().contains("unrelated enode"));
    }

    #[test]
    fn test_duplicate_initiators_rejected() {
        let node = Arc::new(test_node("http://node-a", &["sub-1"]));
        let twin = Arc::new(test_node("http://node-a", &["sub-2"]));
        let result = MpcCoordinator::new(
            &mpc_config(),
            Arc::new(MockMpcRpc::new()),
            node.clone(),
            vec![node, twin],
        );
        assert!(matches!(result, Err(RouterError::Config(_))));
    }

    #[tokio::test]
    async fn test_accept_pending_answers_and_remembers() {
        let accepted = Arc::new(StdMutex::new(Vec::new()));
        let mut rpc = MockMpcRpc::new();
        let node = Arc::new(test_node("http://node-a", &["sub-1"]));
        let initiator = node.user_hex();
        rpc.expect_get_cur_node_sign_info().returning(move |_, _| {
            Ok(vec![
                SignInfoData {
                    account: initiator.clone(),
                    key: "0xgood".to_string(),
                    msg_hash: vec!["0x01".to_string()],
                    msg_context: vec!["{}".to_string()],
                    ..Default::default()
                },
                SignInfoData {
                    account: "0x9999999999999999999999999999999999999999".to_string(),
                    key: "0xforeign".to_string(),
                    ..Default::default()
                },
            ])
        });
        let seen = accepted.clone();
        rpc.expect_accept_sign().returning(move |raw, _| {
            seen.lock().unwrap().push(decode_envelope(raw));
            Ok("ok".to_string())
        });
        let coordinator =
            MpcCoordinator::new(&mpc_config(), Arc::new(rpc), node.clone(), vec![node]).unwrap();

        let round = coordinator
            .accept_pending(|_| async { AcceptDecision::Agree })
            .await
            .unwrap();
        assert_eq!(round.pending, 2);
        assert_eq!(round.agreed, 1);

        // second round replays the remembered verdict without judging again
        let round = coordinator
            .accept_pending(|_| async { AcceptDecision::Disagree })
            .await
            .unwrap();
        assert_eq!(round.agreed, 1);

        let accepted = accepted.lock().unwrap();
        assert_eq!(accepted.len(), 2);
        let (nonce, payload) = &accepted[0];
        assert_eq!(*nonce, 0);
        assert_eq!(payload["TxType"], "ACCEPTSIGN");
        assert_eq!(payload["Accept"], "AGREE");
        assert_eq!(payload["Key"], "0xgood");
        assert!(coordinator.accepted_request("0xgood").await.is_some());
    }

    #[test]
    fn test_enode_comparison_uses_id() {
        let enodes = vec!["enode://aa@1.1.1.1:1".to_string()];
        assert!(enode_exists_in("enode://aa@2.2.2.2:2", &enodes));
        assert!(!enode_exists_in("enode://bb@1.1.1.1:1", &enodes));
    }
}
