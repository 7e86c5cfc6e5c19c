//! JSON-RPC client of the MPC node API

use crate::error::{RouterError, RouterResult};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::providers::{Http, Provider};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Payload of a sign request envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignData {
    #[serde(rename = "TxType")]
    pub tx_type: String,
    #[serde(rename = "PubKey")]
    pub pub_key: String,
    #[serde(rename = "MsgHash")]
    pub msg_hash: Vec<String>,
    #[serde(rename = "MsgContext")]
    pub msg_context: Vec<String>,
    #[serde(rename = "Keytype")]
    pub key_type: String,
    #[serde(rename = "GroupID")]
    pub group_id: String,
    #[serde(rename = "ThresHold")]
    pub threshold: String,
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
}

/// Payload of an accept envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptData {
    #[serde(rename = "TxType")]
    pub tx_type: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Accept")]
    pub accept: String,
    #[serde(rename = "MsgHash")]
    pub msg_hash: Vec<String>,
    #[serde(rename = "MsgContext")]
    pub msg_context: Vec<String>,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupInfo {
    #[serde(rename = "Enodes", default)]
    pub enodes: Vec<String>,
    #[serde(rename = "Count", default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignStatus {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Rsv", default)]
    pub rsv: Vec<String>,
    #[serde(rename = "Tip", default)]
    pub tip: String,
    #[serde(rename = "Error", default)]
    pub error: String,
}

/// A sign request waiting for this node's agreement
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignInfoData {
    #[serde(rename = "Account", default)]
    pub account: String,
    #[serde(rename = "GroupId", default)]
    pub group_id: String,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "KeyType", default)]
    pub key_type: String,
    #[serde(rename = "Mode", default)]
    pub mode: String,
    #[serde(rename = "MsgContext", default)]
    pub msg_context: Vec<String>,
    #[serde(rename = "MsgHash", default)]
    pub msg_hash: Vec<String>,
    #[serde(rename = "Nonce", default)]
    pub nonce: String,
    #[serde(rename = "PubKey", default)]
    pub pub_key: String,
    #[serde(rename = "ThresHold", default)]
    pub threshold: String,
    #[serde(rename = "TimeStamp", default)]
    pub timestamp: String,
}

/// MPC node API; every call names the node it goes to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MpcRpc: Send + Sync {
    async fn get_enode(&self, rpc_addr: &str) -> RouterResult<String>;

    async fn get_group_by_id(&self, group_id: &str, rpc_addr: &str) -> RouterResult<GroupInfo>;

    async fn get_sign_nonce(&self, account: &str, rpc_addr: &str) -> RouterResult<u64>;

    /// Submit a sign envelope, returning the key id of the request
    async fn sign(&self, raw_tx: &str, rpc_addr: &str) -> RouterResult<String>;

    /// `Ok` only once the signature is complete
    async fn get_sign_status(&self, key_id: &str, rpc_addr: &str) -> RouterResult<SignStatus>;

    async fn accept_sign(&self, raw_tx: &str, rpc_addr: &str) -> RouterResult<String>;

    async fn get_cur_node_sign_info(
        &self,
        expired_interval_secs: i64,
        rpc_addr: &str,
    ) -> RouterResult<Vec<SignInfoData>>;
}

/// Response envelope shared by all node API calls
#[derive(Debug, Serialize, Deserialize)]
struct DataResult {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Tip", default)]
    tip: String,
    #[serde(rename = "Error", default)]
    error: String,
    #[serde(rename = "Data", default)]
    data: serde_json::Value,
}

/// Production client using the ethers HTTP transport
pub struct HttpMpcClient {
    api_prefix: String,
    timeout: Duration,
    providers: DashMap<String, Provider<Http>>,
}

impl HttpMpcClient {
    pub fn new(api_prefix: &str, timeout: Duration) -> Self {
        Self {
            api_prefix: api_prefix.to_string(),
            timeout,
            providers: DashMap::new(),
        }
    }

    fn provider(&self, rpc_addr: &str) -> RouterResult<Provider<Http>> {
        if let Some(provider) = self.providers.get(rpc_addr) {
            return Ok(provider.clone());
        }
        let provider = Provider::<Http>::try_from(rpc_addr).map_err(|e| RouterError::MpcRpc {
            rpc_addr: rpc_addr.to_string(),
            message: e.to_string(),
        })?;
        self.providers.insert(rpc_addr.to_string(), provider.clone());
        Ok(provider)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        rpc_addr: &str,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> RouterResult<T> {
        let provider = self.provider(rpc_addr)?;
        let method = format!("{}{}", self.api_prefix, method);
        debug!("Calling {} on mpc node {}", method, rpc_addr);

        let response: DataResult =
            tokio::time::timeout(self.timeout, provider.request::<_, DataResult>(&method, params))
                .await
                .map_err(|_| RouterError::Timeout {
                    operation: format!("{} on {}", method, rpc_addr),
                })?
                .map_err(|e| RouterError::MpcRpc {
                    rpc_addr: rpc_addr.to_string(),
                    message: e.to_string(),
                })?;

        decode_data(rpc_addr, &method, response)
    }
}

fn decode_data<T: DeserializeOwned>(
    rpc_addr: &str,
    method: &str,
    response: DataResult,
) -> RouterResult<T> {
    if response.status != "Success" {
        return Err(RouterError::MpcRpc {
            rpc_addr: rpc_addr.to_string(),
            message: format!(
                "{} status {}, tip '{}', error '{}'",
                method, response.status, response.tip, response.error
            ),
        });
    }

    // Some calls wrap their result as a JSON string
    let data = match response.data {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
        }
        other => other,
    };
    serde_json::from_value(data).map_err(|e| RouterError::MpcRpc {
        rpc_addr: rpc_addr.to_string(),
        message: format!("{} returned unexpected data: {}", method, e),
    })
}

#[derive(Deserialize)]
struct EnodeData {
    #[serde(rename = "Enode")]
    enode: String,
}

/// Classify a sign status: pending stays retryable, failure and timeout are final
pub fn check_sign_status(key_id: &str, rpc_addr: &str, status: SignStatus) -> RouterResult<SignStatus> {
    match status.status.as_str() {
        "Success" => Ok(status),
        "Failure" => Err(RouterError::MpcSign(format!(
            "sign {} failed: {} {}",
            key_id, status.tip, status.error
        ))),
        "Timeout" => Err(RouterError::MpcSign(format!("sign {} timed out", key_id))),
        other => Err(RouterError::MpcRpc {
            rpc_addr: rpc_addr.to_string(),
            message: format!("sign {} status {}", key_id, other),
        }),
    }
}

fn string_or_number(value: serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl MpcRpc for HttpMpcClient {
    async fn get_enode(&self, rpc_addr: &str) -> RouterResult<String> {
        let data: EnodeData = self.call(rpc_addr, "getEnode", vec![]).await?;
        Ok(data.enode)
    }

    async fn get_group_by_id(&self, group_id: &str, rpc_addr: &str) -> RouterResult<GroupInfo> {
        self.call(rpc_addr, "getGroupByID", vec![group_id.into()])
            .await
    }

    async fn get_sign_nonce(&self, account: &str, rpc_addr: &str) -> RouterResult<u64> {
        let data: serde_json::Value = self
            .call(rpc_addr, "getSignNonce", vec![account.into()])
            .await?;
        string_or_number(data).ok_or_else(|| RouterError::MpcRpc {
            rpc_addr: rpc_addr.to_string(),
            message: "sign nonce is not a number".to_string(),
        })
    }

    async fn sign(&self, raw_tx: &str, rpc_addr: &str) -> RouterResult<String> {
        self.call(rpc_addr, "sign", vec![raw_tx.into()]).await
    }

    async fn get_sign_status(&self, key_id: &str, rpc_addr: &str) -> RouterResult<SignStatus> {
        let status: SignStatus = self
            .call(rpc_addr, "getSignStatus", vec![key_id.into()])
            .await?;
        check_sign_status(key_id, rpc_addr, status)
    }

    async fn accept_sign(&self, raw_tx: &str, rpc_addr: &str) -> RouterResult<String> {
        self.call(rpc_addr, "acceptSign", vec![raw_tx.into()]).await
    }

    async fn get_cur_node_sign_info(
        &self,
        expired_interval_secs: i64,
        rpc_addr: &str,
    ) -> RouterResult<Vec<SignInfoData>> {
        let list: Option<Vec<SignInfoData>> = self
            .call(
                rpc_addr,
                "getCurNodeSignInfo",
                vec![expired_interval_secs.to_string().into()],
            )
            .await?;
        Ok(list.unwrap_or_default())
    }
}
