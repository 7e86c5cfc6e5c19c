//! In-memory bridge for exercising the swap pipeline in tests

use super::{
    Bridge, BuildTxArgs, NonceSetter, PoolNonceHeight, RawTransaction, SignedTransaction,
    SwapRegistration, SwapTxInfo, TxInfo, TxStatus, VerifyArgs,
};
use crate::error::{RouterError, RouterResult};
use crate::tx::NonceCache;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeBridge {
    chain_id: u64,
    nonces: NonceCache,
    pool_nonces: Mutex<HashMap<String, u64>>,
    tx_statuses: Mutex<HashMap<String, TxStatus>>,
    swaps: Mutex<HashMap<String, SwapTxInfo>>,
    verify_failures: Mutex<HashMap<String, fn() -> RouterError>>,
    sent: Mutex<Vec<String>>,
    fail_send: AtomicBool,
}

impl FakeBridge {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            nonces: NonceCache::new(chain_id, Duration::from_secs(300)),
            pool_nonces: Mutex::new(HashMap::new()),
            tx_statuses: Mutex::new(HashMap::new()),
            swaps: Mutex::new(HashMap::new()),
            verify_failures: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
        }
    }

    pub fn set_pool_nonce(&self, account: &str, nonce: u64) {
        self.pool_nonces
            .lock()
            .unwrap()
            .insert(account.to_lowercase(), nonce);
    }

    pub fn set_tx_status(&self, tx_hash: &str, status: TxStatus) {
        self.tx_statuses
            .lock()
            .unwrap()
            .insert(tx_hash.to_lowercase(), status);
    }

    pub fn add_swap(&self, info: SwapTxInfo) {
        self.swaps
            .lock()
            .unwrap()
            .insert(info.hash.to_lowercase(), info);
    }

    pub fn fail_verify(&self, tx_hash: &str, error: fn() -> RouterError) {
        self.verify_failures
            .lock()
            .unwrap()
            .insert(tx_hash.to_lowercase(), error);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn sign(&self, raw: &RawTransaction) -> SignedTransaction {
        let RawTransaction::Evm(tx) = raw;
        SignedTransaction {
            raw: tx.rlp(),
            tx_hash: format!("{:?}", tx.sighash()),
            msg_hashes: vec![format!("{:?}", tx.sighash())],
        }
    }
}

#[async_trait]
impl Bridge for FakeBridge {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn is_valid_address(&self, address: &str) -> bool {
        address.parse::<Address>().is_ok()
    }

    fn public_key_to_address(&self, pubkey: &str) -> RouterResult<String> {
        let hex = pubkey.trim_start_matches("0x");
        if hex.len() < 40 {
            return Err(RouterError::Wallet(format!("bad public key {}", pubkey)));
        }
        Ok(format!("0x{}", &hex[hex.len() - 40..]))
    }

    async fn get_latest_block_number(&self) -> RouterResult<u64> {
        Ok(100)
    }

    async fn get_latest_block_number_of(&self, _url: &str) -> RouterResult<u64> {
        Ok(100)
    }

    async fn get_transaction(&self, tx_hash: &str) -> RouterResult<TxInfo> {
        let status = self.get_transaction_status(tx_hash).await?;
        Ok(TxInfo {
            hash: tx_hash.to_lowercase(),
            block_height: Some(status.block_height),
            ..Default::default()
        })
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> RouterResult<TxStatus> {
        self.tx_statuses
            .lock()
            .unwrap()
            .get(&tx_hash.to_lowercase())
            .cloned()
            .ok_or_else(|| RouterError::TxNotFound {
                tx_id: tx_hash.to_string(),
            })
    }

    async fn build_raw_transaction(&self, args: &mut BuildTxArgs) -> RouterResult<RawTransaction> {
        let nonce = args.extra.nonce.unwrap_or_default();
        let gas = *args.extra.gas.get_or_insert(90_000);
        let gas_price = *args.extra.gas_price.get_or_insert(U256::from(1_000_000_000u64));
        let to = args
            .to
            .parse::<Address>()
            .map_err(|e| RouterError::Transaction(e.to_string()))?;

        let tx = TransactionRequest::new()
            .to(to)
            .nonce(nonce)
            .gas(gas)
            .gas_price(gas_price)
            .value(U256::zero())
            .data(Bytes::from(args.swap_id.clone().into_bytes()))
            .chain_id(self.chain_id);
        Ok(RawTransaction::Evm(TypedTransaction::Legacy(tx)))
    }

    async fn mpc_sign_transaction(
        &self,
        raw: &RawTransaction,
        _args: &BuildTxArgs,
    ) -> RouterResult<SignedTransaction> {
        Ok(self.sign(raw))
    }

    async fn sign_transaction_with_private_key(
        &self,
        raw: &RawTransaction,
    ) -> RouterResult<SignedTransaction> {
        Ok(self.sign(raw))
    }

    async fn send_transaction(&self, signed: &SignedTransaction) -> RouterResult<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(RouterError::ChainConnection {
                chain_id: self.chain_id,
                message: "broadcast refused".to_string(),
            });
        }
        self.sent.lock().unwrap().push(signed.tx_hash.clone());
        Ok(signed.tx_hash.clone())
    }

    fn verify_msg_hash(&self, raw: &RawTransaction, msg_hashes: &[String]) -> RouterResult<()> {
        let RawTransaction::Evm(tx) = raw;
        let want = format!("{:?}", tx.sighash());
        match msg_hashes {
            [have] if have.eq_ignore_ascii_case(&want) => Ok(()),
            [have] => Err(RouterError::MsgHashMismatch {
                want,
                have: have.clone(),
            }),
            _ => Err(RouterError::WrongCountOfMsgHashes {
                expected: 1,
                actual: msg_hashes.len(),
            }),
        }
    }

    async fn register_swap(
        &self,
        tx_hash: &str,
        args: &VerifyArgs,
    ) -> RouterResult<Vec<SwapRegistration>> {
        let info = self.verify_transaction(tx_hash, args).await;
        match info {
            Ok(info) => Ok(vec![SwapRegistration { info, error: None }]),
            Err(e) => Err(e),
        }
    }

    async fn verify_transaction(
        &self,
        tx_hash: &str,
        _args: &VerifyArgs,
    ) -> RouterResult<SwapTxInfo> {
        let key = tx_hash.to_lowercase();
        if let Some(error) = self.verify_failures.lock().unwrap().get(&key) {
            return Err(error());
        }
        self.swaps
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(RouterError::TxNotFound { tx_id: key })
    }

    async fn get_balance(&self, _account: &str) -> RouterResult<U256> {
        Ok(U256::zero())
    }

    fn nonce_setter(&self) -> Option<&dyn NonceSetter> {
        Some(self)
    }
}

#[async_trait]
impl NonceSetter for FakeBridge {
    fn nonce_cache(&self) -> &NonceCache {
        &self.nonces
    }

    async fn get_pool_nonce(&self, address: &str, _height: PoolNonceHeight) -> RouterResult<u64> {
        Ok(self
            .pool_nonces
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or_default())
    }
}
