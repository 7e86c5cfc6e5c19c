//! EVM chain family bridge
//!
//! This module provides:
//! - Verification of router swap-out receipts
//! - Payout call encoding per swap kind
//! - MPC and private key signing of payout transactions
//! - Account nonces through an embedded `NonceCache`

use super::events::{self, is_swap_out_log, parse_swap_log};
use super::provider::{ChainProvider, GasPrice};
use super::registry::TokenTables;
use super::{
    Bridge, BuildTxArgs, ExtraArgs, NonceSetter, PoolNonceHeight, RawTransaction,
    SignedTransaction, SwapInfo, SwapRegistration, SwapTxInfo, TxInfo, TxStatus, VerifyArgs,
};
use crate::config::ChainConfig;
use crate::error::{RouterError, RouterResult};
use crate::mpc::MpcCoordinator;
use crate::tx::{GasEstimator, NonceCache};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Eip1559TransactionRequest, Log, Signature, TransactionReceipt,
    TransactionRequest, H256, U256,
};
use ethers::utils::keccak256;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds a swap-trade payout stays executable after it is built
const SWAP_DEADLINE_OFFSET: u64 = 36_000;

/// Bridge for one EVM chain
pub struct EvmBridge {
    chain_id: u64,
    provider: ChainProvider,
    tokens: Arc<TokenTables>,
    gas: GasEstimator,
    nonces: NonceCache,
    mpc: Option<Arc<MpcCoordinator>>,
    wallet: Option<LocalWallet>,
    router_contract: Address,
    router_mpc: Address,
    router_mpc_pubkey: String,
    confirmations: u64,
    initial_height: u64,
}

impl EvmBridge {
    pub fn new(
        config: ChainConfig,
        tokens: Arc<TokenTables>,
        mpc: Option<Arc<MpcCoordinator>>,
        nonce_recycle_ack: Duration,
    ) -> RouterResult<Self> {
        let chain_id = config.chain_id;
        let router_contract = parse_config_address(&config.router_contract, "router_contract")?;
        let router_mpc = parse_config_address(&config.router_mpc, "router_mpc")?;
        let wallet = load_private_key(&config)?;

        if let Some(wallet) = &wallet {
            if wallet.address() != router_mpc {
                warn!(
                    "Private key of chain {} controls {:?}, not router mpc {:?}",
                    chain_id,
                    wallet.address(),
                    router_mpc
                );
            }
        }

        info!(
            "Init evm bridge for chain {} ({}), router {:?}, mpc {:?}",
            chain_id, config.name, router_contract, router_mpc
        );

        Ok(Self {
            chain_id,
            gas: GasEstimator::from_config(&config),
            nonces: NonceCache::new(chain_id, nonce_recycle_ack),
            router_mpc_pubkey: config.router_mpc_pubkey.clone(),
            confirmations: config.confirmations,
            initial_height: config.initial_height,
            provider: ChainProvider::new(config)?,
            tokens,
            mpc,
            wallet,
            router_contract,
            router_mpc,
        })
    }

    pub fn provider(&self) -> &ChainProvider {
        &self.provider
    }

    pub fn router_mpc(&self) -> Address {
        self.router_mpc
    }

    async fn get_receipt(&self, tx_hash: &str) -> RouterResult<TransactionReceipt> {
        self.provider
            .get_transaction_receipt(parse_tx_hash(tx_hash)?)
            .await?
            .ok_or_else(|| RouterError::TxNotFound {
                tx_id: tx_hash.to_string(),
            })
    }

    async fn receipt_status(&self, receipt: &TransactionReceipt) -> RouterResult<TxStatus> {
        let block_height = match receipt.block_number {
            Some(height) => height.as_u64(),
            None => return Ok(TxStatus::default()),
        };
        let latest = self.provider.get_block_number().await?;
        let block_time = self
            .provider
            .get_block(block_height)
            .await?
            .map(|block| block.timestamp.as_u64())
            .unwrap_or_default();

        Ok(TxStatus {
            confirmations: if latest >= block_height {
                latest - block_height + 1
            } else {
                0
            },
            block_height,
            block_hash: receipt
                .block_hash
                .map(|hash| format!("{:?}", hash))
                .unwrap_or_default(),
            block_time,
            success: receipt.status.map(|status| status.as_u64() == 1),
        })
    }

    /// Receipt of a source transaction that passed the chain-level checks
    async fn swap_receipt(
        &self,
        tx_hash: &str,
        allow_unstable: bool,
    ) -> RouterResult<(TransactionReceipt, TxStatus)> {
        let receipt = self.get_receipt(tx_hash).await?;
        let status = self.receipt_status(&receipt).await?;

        if !status.is_on_chain() {
            return Err(RouterError::TxNotStable);
        }
        if status.is_failed() {
            return Err(RouterError::TxWithWrongReceipt(
                "tx with failed receipt".to_string(),
            ));
        }
        if status.block_height < self.initial_height {
            return Err(RouterError::TxWithWrongReceipt(format!(
                "tx height {} lower than initial height {}",
                status.block_height, self.initial_height
            )));
        }
        if !allow_unstable && status.confirmations < self.confirmations {
            return Err(RouterError::TxNotStable);
        }
        Ok((receipt, status))
    }

    fn swap_from_log(
        &self,
        receipt: &TransactionReceipt,
        status: &TxStatus,
        log_index: usize,
        log: &Log,
    ) -> RouterResult<SwapTxInfo> {
        if log.address != self.router_contract {
            return Err(RouterError::TxWithWrongReceipt(format!(
                "log {} not emitted by router contract",
                log_index
            )));
        }
        let swap = parse_swap_log(log)?;

        Ok(SwapTxInfo {
            hash: format!("{:?}", receipt.transaction_hash),
            log_index: log_index as u32,
            height: status.block_height,
            timestamp: status.block_time,
            from: swap.from,
            tx_to: receipt
                .to
                .map(|to| format!("{:?}", to))
                .unwrap_or_default(),
            bind: swap.bind,
            value: swap.value,
            from_chain_id: swap.from_chain_id,
            to_chain_id: swap.to_chain_id,
            swap_info: swap.swap_info,
        })
    }

    /// Chain and token checks of a parsed swap; resolves its multichain token id
    fn check_swap(&self, info: &mut SwapTxInfo) -> RouterResult<()> {
        if info.from_chain_id != self.chain_id {
            return Err(RouterError::TxWithWrongReceipt(format!(
                "swap from chain {} found on chain {}",
                info.from_chain_id, self.chain_id
            )));
        }
        if info.to_chain_id == info.from_chain_id {
            return Err(RouterError::TxWithWrongReceipt(
                "swap to the same chain".to_string(),
            ));
        }

        let chain_id = self.chain_id;
        match &mut info.swap_info {
            SwapInfo::Erc20 {
                token,
                token_id,
                for_underlying,
                ..
            } => {
                let config = self.tokens.get_token_config(chain_id, token).ok_or_else(|| {
                    RouterError::MissTokenConfig {
                        token: token.clone(),
                        chain_id,
                    }
                })?;
                *token_id = config.token_id;
                *for_underlying = config.underlying.is_some();
            }
            SwapInfo::Nft {
                token, token_id, ..
            } => {
                let config = self.tokens.get_token_config(chain_id, token).ok_or_else(|| {
                    RouterError::MissTokenConfig {
                        token: token.clone(),
                        chain_id,
                    }
                })?;
                *token_id = config.token_id;
            }
            SwapInfo::AnyCall { .. } => {}
        }
        Ok(())
    }

    /// Call data of the payout; fills in the trade deadline when missing
    fn build_input(&self, args: &mut BuildTxArgs) -> RouterResult<Vec<u8>> {
        let swap_id = Token::FixedBytes(parse_tx_hash(&args.swap_id)?.as_bytes().to_vec());
        let from_chain_id = Token::Uint(U256::from(args.from_chain_id));

        let input = match &args.swap_info {
            SwapInfo::Erc20 {
                for_native,
                for_underlying,
                path,
                amount_out_min,
                ..
            } => {
                let receiver = Token::Address(parse_receiver(&args.bind)?);
                if path.is_empty() {
                    let token = parse_address(&args.to_token)?;
                    if *for_underlying {
                        let config = self
                            .tokens
                            .get_token_config(self.chain_id, &args.to_token)
                            .ok_or_else(|| RouterError::MissTokenConfig {
                                token: args.to_token.clone(),
                                chain_id: self.chain_id,
                            })?;
                        if config.underlying.is_none() {
                            return Err(RouterError::NoUnderlyingToken {
                                token: args.to_token.clone(),
                                chain_id: self.chain_id,
                            });
                        }
                    }
                    let selector = if *for_underlying {
                        *events::ANY_SWAP_IN_UNDERLYING
                    } else {
                        *events::ANY_SWAP_IN_AUTO
                    };
                    encode_call(
                        selector,
                        &[
                            swap_id,
                            Token::Address(token),
                            receiver,
                            Token::Uint(args.swap_value),
                            from_chain_id,
                        ],
                    )
                } else {
                    let deadline = *args
                        .extra
                        .deadline
                        .get_or_insert_with(|| now() + SWAP_DEADLINE_OFFSET);
                    let selector = if *for_native {
                        *events::ANY_SWAP_IN_EXACT_TOKENS_FOR_NATIVE
                    } else {
                        *events::ANY_SWAP_IN_EXACT_TOKENS_FOR_TOKENS
                    };
                    encode_call(
                        selector,
                        &[
                            swap_id,
                            Token::Uint(args.swap_value),
                            Token::Uint(*amount_out_min),
                            address_array(path)?,
                            receiver,
                            Token::Uint(U256::from(deadline)),
                            from_chain_id,
                        ],
                    )
                }
            }
            SwapInfo::Nft {
                ids,
                amounts,
                batch,
                ..
            } => {
                let token = Token::Address(parse_address(&args.to_token)?);
                let receiver = Token::Address(parse_receiver(&args.bind)?);
                let first_id = ids
                    .first()
                    .copied()
                    .ok_or_else(|| RouterError::WrongRawTx("nft swap without token id".to_string()))?;
                if *batch {
                    encode_call(
                        *events::NFT1155_BATCH_SWAP_IN,
                        &[
                            swap_id,
                            token,
                            receiver,
                            Token::Array(ids.iter().copied().map(Token::Uint).collect()),
                            Token::Array(amounts.iter().copied().map(Token::Uint).collect()),
                            from_chain_id,
                        ],
                    )
                } else if let Some(amount) = amounts.first() {
                    encode_call(
                        *events::NFT1155_SWAP_IN,
                        &[
                            swap_id,
                            token,
                            receiver,
                            Token::Uint(first_id),
                            Token::Uint(*amount),
                            from_chain_id,
                        ],
                    )
                } else {
                    encode_call(
                        *events::NFT721_SWAP_IN,
                        &[swap_id, token, receiver, Token::Uint(first_id), from_chain_id],
                    )
                }
            }
            SwapInfo::AnyCall {
                call_from,
                call_to,
                call_data,
                callbacks,
                call_nonces,
            } => encode_call(
                *events::ANY_EXEC,
                &[
                    Token::Address(parse_address(call_from)?),
                    address_array(call_to)?,
                    Token::Array(call_data.iter().cloned().map(Token::Bytes).collect()),
                    address_array(callbacks)?,
                    Token::Array(call_nonces.iter().copied().map(Token::Uint).collect()),
                    from_chain_id,
                ],
            ),
        };
        Ok(input)
    }

    fn new_transaction(
        &self,
        from: Address,
        nonce: u64,
        value: U256,
        input: Vec<u8>,
        gas_price: &GasPrice,
    ) -> TypedTransaction {
        match gas_price {
            GasPrice::Legacy(price) => TransactionRequest::new()
                .from(from)
                .to(self.router_contract)
                .nonce(nonce)
                .value(value)
                .data(Bytes::from(input))
                .gas_price(*price)
                .chain_id(self.chain_id)
                .into(),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(from)
                .to(self.router_contract)
                .nonce(nonce)
                .value(value)
                .data(Bytes::from(input))
                .max_fee_per_gas(*max_fee_per_gas)
                .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                .chain_id(self.chain_id)
                .into(),
        }
    }

    /// Turn an MPC `rsv` into an EIP-155 signature, checking it recovers to the router mpc
    fn signature_from_rsv(&self, rsv: &str, sighash: H256) -> RouterResult<Signature> {
        let bytes = hex::decode(rsv.trim_start_matches("0x"))
            .map_err(|e| RouterError::InvalidSignature(format!("{}: {}", rsv, e)))?;
        if bytes.len() != 65 {
            return Err(RouterError::InvalidSignature(format!(
                "wrong rsv length {}",
                bytes.len()
            )));
        }
        let recid = match bytes[64] {
            v @ (0 | 1) => v as u64,
            v @ (27 | 28) => (v - 27) as u64,
            v => {
                return Err(RouterError::InvalidSignature(format!(
                    "wrong recovery id {}",
                    v
                )))
            }
        };

        let mut signature = Signature {
            r: U256::from_big_endian(&bytes[0..32]),
            s: U256::from_big_endian(&bytes[32..64]),
            v: 27 + recid,
        };
        let signer = signature
            .recover(sighash)
            .map_err(|e| RouterError::InvalidSignature(e.to_string()))?;
        if signer != self.router_mpc {
            return Err(RouterError::InvalidSignature(format!(
                "signer {:?} is not router mpc {:?}",
                signer, self.router_mpc
            )));
        }

        signature.v = recid + 35 + 2 * self.chain_id;
        Ok(signature)
    }
}

#[async_trait]
impl Bridge for EvmBridge {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn is_valid_address(&self, address: &str) -> bool {
        address.len() == 42 && address.starts_with("0x") && Address::from_str(address).is_ok()
    }

    fn public_key_to_address(&self, pubkey: &str) -> RouterResult<String> {
        let bytes = hex::decode(pubkey.trim_start_matches("0x"))
            .map_err(|e| RouterError::MissMpcPublicKey(format!("{}: {}", pubkey, e)))?;
        let key = match bytes.len() {
            65 if bytes[0] == 4 => &bytes[1..],
            64 => &bytes[..],
            len => {
                return Err(RouterError::MissMpcPublicKey(format!(
                    "wrong public key length {}",
                    len
                )))
            }
        };
        let hash = keccak256(key);
        Ok(format!("{:?}", Address::from_slice(&hash[12..])))
    }

    async fn get_latest_block_number(&self) -> RouterResult<u64> {
        self.provider.get_block_number().await
    }

    async fn get_latest_block_number_of(&self, url: &str) -> RouterResult<u64> {
        self.provider.get_block_number_of(url).await
    }

    async fn get_transaction(&self, tx_hash: &str) -> RouterResult<TxInfo> {
        let tx = self
            .provider
            .get_transaction(parse_tx_hash(tx_hash)?)
            .await?
            .ok_or_else(|| RouterError::TxNotFound {
                tx_id: tx_hash.to_string(),
            })?;

        Ok(TxInfo {
            hash: format!("{:?}", tx.hash),
            from: format!("{:?}", tx.from),
            to: tx.to.map(|to| format!("{:?}", to)),
            nonce: tx.nonce.as_u64(),
            value: tx.value,
            input: tx.input.to_vec(),
            block_height: tx.block_number.map(|height| height.as_u64()),
        })
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> RouterResult<TxStatus> {
        let receipt = self.get_receipt(tx_hash).await?;
        self.receipt_status(&receipt).await
    }

    async fn build_raw_transaction(&self, args: &mut BuildTxArgs) -> RouterResult<RawTransaction> {
        if args.to_chain_id != self.chain_id {
            return Err(RouterError::Transaction(format!(
                "payout for chain {} built on chain {}",
                args.to_chain_id, self.chain_id
            )));
        }

        let input = self.build_input(args)?;
        args.input = input.clone();
        args.to = format!("{:?}", self.router_contract);
        let from = parse_address(&args.from)?;

        let gas_price = match (args.extra.gas_price, args.extra.gas_tip_cap) {
            (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            (Some(price), None) => GasPrice::Legacy(price),
            _ => self.gas.get_gas_price(&self.provider).await?,
        };
        let nonce = match args.extra.nonce {
            Some(nonce) => nonce,
            None => {
                self.get_pool_nonce(&args.from, PoolNonceHeight::Pending)
                    .await?
            }
        };

        let mut tx = self.new_transaction(from, nonce, args.value, input, &gas_price);
        let gas = match args.extra.gas {
            Some(gas) => gas,
            None => self.gas.estimate_gas_limit(&self.provider, &tx).await?,
        };
        tx.set_gas(gas);

        let (gas_price, gas_tip_cap) = match gas_price {
            GasPrice::Legacy(price) => (price, None),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (max_fee_per_gas, Some(max_priority_fee_per_gas)),
        };
        args.extra = ExtraArgs {
            gas: Some(gas),
            gas_price: Some(gas_price),
            gas_tip_cap,
            nonce: Some(nonce),
            deadline: args.extra.deadline,
        };

        debug!(
            "Built payout of swap {} on chain {} with nonce {} gas {}",
            args.swap_id, self.chain_id, nonce, gas
        );
        Ok(RawTransaction::Evm(tx))
    }

    async fn mpc_sign_transaction(
        &self,
        raw: &RawTransaction,
        args: &BuildTxArgs,
    ) -> RouterResult<SignedTransaction> {
        let RawTransaction::Evm(tx) = raw;
        let mpc = self
            .mpc
            .as_ref()
            .ok_or_else(|| RouterError::MpcSign("mpc signing is not configured".to_string()))?;
        if parse_address(&args.from)? != self.router_mpc {
            return Err(RouterError::MpcSign(format!(
                "sign with {} but router mpc is {:?}",
                args.from, self.router_mpc
            )));
        }
        if self.router_mpc_pubkey.is_empty() {
            return Err(RouterError::MissMpcPublicKey(format!("{:?}", self.router_mpc)));
        }

        let sighash = tx.sighash();
        let msg_hash = format!("{:?}", sighash);
        let outcome = mpc
            .sign_one(&self.router_mpc_pubkey, &msg_hash, &args.sign_context()?)
            .await?;
        let rsv = outcome
            .rsvs
            .first()
            .ok_or(RouterError::SignatureCountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let signature = self.signature_from_rsv(rsv, sighash)?;
        let raw_tx = tx.rlp_signed(&signature);
        let tx_hash = format!("{:?}", H256::from(keccak256(&raw_tx)));
        info!(
            "Mpc signed payout {} of swap {} (key {} on {})",
            tx_hash, args.swap_id, outcome.key_id, outcome.rpc_addr
        );

        Ok(SignedTransaction {
            raw: raw_tx,
            tx_hash,
            msg_hashes: vec![msg_hash],
        })
    }

    async fn sign_transaction_with_private_key(
        &self,
        raw: &RawTransaction,
    ) -> RouterResult<SignedTransaction> {
        let RawTransaction::Evm(tx) = raw;
        let wallet = self.wallet.as_ref().ok_or_else(|| {
            RouterError::Wallet(format!("no private key configured for chain {}", self.chain_id))
        })?;
        let signature = wallet
            .sign_transaction_sync(tx)
            .map_err(|e| RouterError::Wallet(e.to_string()))?;
        let raw_tx = tx.rlp_signed(&signature);
        let tx_hash = format!("{:?}", H256::from(keccak256(&raw_tx)));
        Ok(SignedTransaction {
            raw: raw_tx,
            tx_hash,
            msg_hashes: vec![format!("{:?}", tx.sighash())],
        })
    }

    async fn send_transaction(&self, signed: &SignedTransaction) -> RouterResult<String> {
        let tx_hash = self
            .provider
            .send_raw_transaction(signed.raw.clone())
            .await?;
        let tx_hash = format!("{:?}", tx_hash);
        if !tx_hash.eq_ignore_ascii_case(&signed.tx_hash) {
            warn!(
                "Send transaction hash mismatch on chain {}: {} != {}",
                self.chain_id, tx_hash, signed.tx_hash
            );
        }
        Ok(tx_hash)
    }

    fn verify_msg_hash(&self, raw: &RawTransaction, msg_hashes: &[String]) -> RouterResult<()> {
        let RawTransaction::Evm(tx) = raw;
        if msg_hashes.len() != 1 {
            return Err(RouterError::WrongCountOfMsgHashes {
                expected: 1,
                actual: msg_hashes.len(),
            });
        }
        let want = format!("{:?}", tx.sighash());
        if !msg_hashes[0].eq_ignore_ascii_case(&want) {
            return Err(RouterError::MsgHashMismatch {
                want,
                have: msg_hashes[0].clone(),
            });
        }
        Ok(())
    }

    async fn register_swap(
        &self,
        tx_hash: &str,
        args: &VerifyArgs,
    ) -> RouterResult<Vec<SwapRegistration>> {
        let (receipt, status) = self.swap_receipt(tx_hash, args.allow_unstable).await?;

        let mut registrations = Vec::new();
        for (index, log) in receipt.logs.iter().enumerate() {
            if args.log_index != 0 && index as u32 != args.log_index {
                continue;
            }
            if log.address != self.router_contract || !is_swap_out_log(log) {
                continue;
            }
            match self.swap_from_log(&receipt, &status, index, log) {
                Ok(mut info) => {
                    let error = self.check_swap(&mut info).err();
                    registrations.push(SwapRegistration { info, error });
                }
                Err(e) => warn!(
                    "Skip unparsable swap log {} of {} on chain {}: {}",
                    index, tx_hash, self.chain_id, e
                ),
            }
        }

        if registrations.is_empty() {
            return Err(RouterError::TxWithWrongReceipt(
                "swapout log not found".to_string(),
            ));
        }
        Ok(registrations)
    }

    async fn verify_transaction(
        &self,
        tx_hash: &str,
        args: &VerifyArgs,
    ) -> RouterResult<SwapTxInfo> {
        let (receipt, status) = self.swap_receipt(tx_hash, args.allow_unstable).await?;
        let index = args.log_index as usize;
        let log = receipt.logs.get(index).ok_or_else(|| {
            RouterError::TxWithWrongReceipt(format!(
                "log index {} out of range, receipt has {} logs",
                index,
                receipt.logs.len()
            ))
        })?;

        let mut info = self.swap_from_log(&receipt, &status, index, log)?;
        self.check_swap(&mut info)?;
        Ok(info)
    }

    async fn get_balance(&self, account: &str) -> RouterResult<U256> {
        self.provider.get_balance(parse_address(account)?).await
    }

    fn nonce_setter(&self) -> Option<&dyn NonceSetter> {
        Some(self)
    }
}

#[async_trait]
impl NonceSetter for EvmBridge {
    fn nonce_cache(&self) -> &NonceCache {
        &self.nonces
    }

    async fn get_pool_nonce(&self, address: &str, height: PoolNonceHeight) -> RouterResult<u64> {
        let block = match height {
            PoolNonceHeight::Latest => BlockNumber::Latest,
            PoolNonceHeight::Pending => BlockNumber::Pending,
        };
        let nonce = self
            .provider
            .get_transaction_count(parse_address(address)?, block)
            .await?;
        Ok(self.nonces.adjust(address, nonce).await)
    }
}

fn load_private_key(config: &ChainConfig) -> RouterResult<Option<LocalWallet>> {
    let Some(var) = &config.private_key_env else {
        return Ok(None);
    };
    let key = env::var(var)
        .map_err(|_| RouterError::Config(format!("Missing private key env {}", var)))?;
    let wallet = LocalWallet::from_str(key.trim_start_matches("0x"))
        .map_err(|e| RouterError::Wallet(e.to_string()))?;
    Ok(Some(wallet.with_chain_id(config.chain_id)))
}

fn parse_config_address(value: &str, field: &str) -> RouterResult<Address> {
    Address::from_str(value)
        .map_err(|e| RouterError::Config(format!("invalid {} {}: {}", field, value, e)))
}

fn parse_address(value: &str) -> RouterResult<Address> {
    Address::from_str(value)
        .map_err(|e| RouterError::WrongRawTx(format!("invalid address {}: {}", value, e)))
}

fn parse_receiver(bind: &str) -> RouterResult<Address> {
    match Address::from_str(bind) {
        Ok(receiver) if !receiver.is_zero() => Ok(receiver),
        _ => Err(RouterError::WrongRawTx(format!(
            "can not swapout to empty or invalid receiver {}",
            bind
        ))),
    }
}

fn parse_tx_hash(value: &str) -> RouterResult<H256> {
    H256::from_str(value)
        .map_err(|e| RouterError::WrongRawTx(format!("invalid hash {}: {}", value, e)))
}

fn address_array(addresses: &[String]) -> RouterResult<Token> {
    addresses
        .iter()
        .map(|address| parse_address(address).map(Token::Address))
        .collect::<RouterResult<Vec<_>>>()
        .map(Token::Array)
}

fn encode_call(selector: [u8; 4], params: &[Token]) -> Vec<u8> {
    let mut input = selector.to_vec();
    input.extend(abi::encode(params));
    input
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
