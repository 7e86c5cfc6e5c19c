//! Replay-safe framing of MPC requests
//!
//! Every request payload travels as the data field of a legacy transaction
//! signed by the node key, so the MPC network can authenticate the sender and
//! reject replays by nonce.

use crate::error::{RouterError, RouterResult};

use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use lazy_static::lazy_static;

/// Chain id the MPC wallet service signs envelopes for
pub const MPC_WALLET_SERVICE_ID: u64 = 30400;
pub const ENVELOPE_GAS: u64 = 100_000;
pub const ENVELOPE_GAS_PRICE: u64 = 80_000;

lazy_static! {
    pub static ref MPC_TO_ADDRESS: Address = Address::from_low_u64_be(0xdc);
}

/// Build the signed envelope and return it as `0x`-prefixed hex
pub fn build_envelope(wallet: &LocalWallet, nonce: u64, payload: &[u8]) -> RouterResult<String> {
    let tx: TypedTransaction = TransactionRequest::new()
        .nonce(nonce)
        .to(*MPC_TO_ADDRESS)
        .value(U256::zero())
        .gas(ENVELOPE_GAS)
        .gas_price(ENVELOPE_GAS_PRICE)
        .data(Bytes::from(payload.to_vec()))
        .chain_id(MPC_WALLET_SERVICE_ID)
        .into();

    let signature = wallet
        .sign_transaction_sync(&tx)
        .map_err(|e| RouterError::Wallet(e.to_string()))?;
    let raw = tx.rlp_signed(&signature);

    Ok(format!("0x{}", hex::encode(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::Signer;
    use ethers::utils::rlp::Rlp;

    #[test]
    fn test_envelope_is_signed_by_node() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let payload = br#"{"TxType":"SIGN"}"#;

        let raw = build_envelope(&wallet, 42, payload).unwrap();
        assert!(raw.starts_with("0x"));

        let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(&bytes)).unwrap();

        assert_eq!(tx.nonce(), Some(&U256::from(42)));
        assert_eq!(tx.to_addr(), Some(&*MPC_TO_ADDRESS));
        assert_eq!(tx.gas(), Some(&U256::from(ENVELOPE_GAS)));
        assert_eq!(tx.gas_price(), Some(U256::from(ENVELOPE_GAS_PRICE)));
        assert_eq!(tx.data().map(|d| d.to_vec()), Some(payload.to_vec()));
        assert_eq!(tx.chain_id(), Some(MPC_WALLET_SERVICE_ID.into()));
        assert_eq!(signature.recover(tx.sighash()).unwrap(), wallet.address());
    }

    #[test]
    fn test_to_address() {
        assert_eq!(
            format!("{:?}", *MPC_TO_ADDRESS),
            "0x00000000000000000000000000000000000000dc"
        );
    }
}
