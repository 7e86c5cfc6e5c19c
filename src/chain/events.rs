//! Router contract logs and payout call encodings
//!
//! This module provides:
//! - Topic hashes of the swap-out events emitted by router contracts
//! - Parsing of a receipt log into a chain-agnostic swap description
//! - Function selectors of the destination-chain payout calls

use crate::chain::types::SwapInfo;
use crate::error::{RouterError, RouterResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Log, H256, U256};
use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};

/// Keccak topic of an event signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from_slice(&Keccak256::digest(signature.as_bytes()))
}

/// First four bytes of the keccak hash of a function signature
pub fn func_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic signatures
pub mod topics {
    use super::event_topic;
    use ethers::types::H256;
    use lazy_static::lazy_static;

    lazy_static! {
        pub static ref LOG_ANY_SWAP_OUT: H256 =
            event_topic("LogAnySwapOut(address,address,address,uint256,uint256,uint256)");
        pub static ref LOG_ANY_SWAP_TRADE_TOKENS_FOR_TOKENS: H256 = event_topic(
            "LogAnySwapTradeTokensForTokens(address[],address,address,uint256,uint256,uint256,uint256)"
        );
        pub static ref LOG_ANY_SWAP_TRADE_TOKENS_FOR_NATIVE: H256 = event_topic(
            "LogAnySwapTradeTokensForNative(address[],address,address,uint256,uint256,uint256,uint256)"
        );
        pub static ref LOG_NFT721_SWAP_OUT: H256 =
            event_topic("LogNFT721SwapOut(address,address,address,uint256,uint256,uint256)");
        pub static ref LOG_NFT1155_SWAP_OUT: H256 = event_topic(
            "LogNFT1155SwapOut(address,address,address,uint256,uint256,uint256,uint256)"
        );
        pub static ref LOG_NFT1155_SWAP_OUT_BATCH: H256 = event_topic(
            "LogNFT1155SwapOutBatch(address,address,address,uint256[],uint256[],uint256,uint256)"
        );
        pub static ref LOG_ANY_CALL: H256 = event_topic(
            "LogAnyCall(address,address[],bytes[],address[],uint256[],uint256,uint256)"
        );
        /// Emitted by the on-chain config contract on every change
        pub static ref UPDATE_CONFIG: H256 = event_topic("UpdateConfig()");
    }
}

lazy_static! {
    pub static ref ANY_SWAP_IN_UNDERLYING: [u8; 4] =
        func_selector("anySwapInUnderlying(bytes32,address,address,uint256,uint256)");
    pub static ref ANY_SWAP_IN_AUTO: [u8; 4] =
        func_selector("anySwapInAuto(bytes32,address,address,uint256,uint256)");
    pub static ref ANY_SWAP_IN_EXACT_TOKENS_FOR_TOKENS: [u8; 4] = func_selector(
        "anySwapInExactTokensForTokens(bytes32,uint256,uint256,address[],address,uint256,uint256)"
    );
    pub static ref ANY_SWAP_IN_EXACT_TOKENS_FOR_NATIVE: [u8; 4] = func_selector(
        "anySwapInExactTokensForNative(bytes32,uint256,uint256,address[],address,uint256,uint256)"
    );
    pub static ref NFT721_SWAP_IN: [u8; 4] =
        func_selector("nft721SwapIn(bytes32,address,address,uint256,uint256)");
    pub static ref NFT1155_SWAP_IN: [u8; 4] =
        func_selector("nft1155SwapIn(bytes32,address,address,uint256,uint256,uint256)");
    pub static ref NFT1155_BATCH_SWAP_IN: [u8; 4] =
        func_selector("nft1155BatchSwapIn(bytes32,address,address,uint256[],uint256[],uint256)");
    pub static ref ANY_EXEC: [u8; 4] =
        func_selector("anyExec(address,address[],bytes[],address[],uint256[],uint256)");
}

/// Swap described by one router log; `token_id` is left empty for the bridge to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLog {
    pub from: String,
    pub bind: String,
    pub value: U256,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub swap_info: SwapInfo,
}

/// Whether a log carries one of the router's swap-out topics
pub fn is_swap_out_log(log: &Log) -> bool {
    match log.topics.first() {
        Some(topic) => [
            *topics::LOG_ANY_SWAP_OUT,
            *topics::LOG_ANY_SWAP_TRADE_TOKENS_FOR_TOKENS,
            *topics::LOG_ANY_SWAP_TRADE_TOKENS_FOR_NATIVE,
            *topics::LOG_NFT721_SWAP_OUT,
            *topics::LOG_NFT1155_SWAP_OUT,
            *topics::LOG_NFT1155_SWAP_OUT_BATCH,
            *topics::LOG_ANY_CALL,
        ]
        .contains(topic),
        None => false,
    }
}

/// Parse a router swap-out log
pub fn parse_swap_log(log: &Log) -> RouterResult<SwapLog> {
    let topic = log
        .topics
        .first()
        .copied()
        .ok_or_else(|| RouterError::TxWithWrongReceipt("log without topics".to_string()))?;

    if topic == *topics::LOG_ANY_SWAP_OUT {
        parse_swap_out(log)
    } else if topic == *topics::LOG_ANY_SWAP_TRADE_TOKENS_FOR_TOKENS {
        parse_swap_trade(log, false)
    } else if topic == *topics::LOG_ANY_SWAP_TRADE_TOKENS_FOR_NATIVE {
        parse_swap_trade(log, true)
    } else if topic == *topics::LOG_NFT721_SWAP_OUT {
        parse_nft721_swap_out(log)
    } else if topic == *topics::LOG_NFT1155_SWAP_OUT {
        parse_nft1155_swap_out(log)
    } else if topic == *topics::LOG_NFT1155_SWAP_OUT_BATCH {
        parse_nft1155_batch_swap_out(log)
    } else if topic == *topics::LOG_ANY_CALL {
        parse_any_call(log)
    } else {
        Err(RouterError::TxWithWrongReceipt(format!(
            "swapout log not found, topic {:?}",
            topic
        )))
    }
}

fn check_topics(log: &Log, expected: usize) -> RouterResult<()> {
    if log.topics.len() != expected {
        return Err(RouterError::TxWithWrongReceipt(format!(
            "wrong topics: want {}, have {}",
            expected,
            log.topics.len()
        )));
    }
    Ok(())
}

fn topic_address(topic: &H256) -> String {
    format!("{:?}", Address::from_slice(&topic.as_bytes()[12..]))
}

fn decode_data(log: &Log, types: &[ParamType]) -> RouterResult<Vec<Token>> {
    abi::decode(types, &log.data).map_err(|e| RouterError::EventParsing(e.to_string()))
}

fn token_uint(token: &Token) -> RouterResult<U256> {
    match token {
        Token::Uint(value) => Ok(*value),
        other => Err(RouterError::EventParsing(format!("expected uint, got {:?}", other))),
    }
}

fn token_chain_id(token: &Token) -> RouterResult<u64> {
    let value = token_uint(token)?;
    if value > U256::from(u64::MAX) {
        return Err(RouterError::EventParsing(format!("chain id {} out of range", value)));
    }
    Ok(value.as_u64())
}

fn token_addresses(token: &Token) -> RouterResult<Vec<String>> {
    match token {
        Token::Array(items) => items
            .iter()
            .map(|item| match item {
                Token::Address(address) => Ok(format!("{:?}", address)),
                other => Err(RouterError::EventParsing(format!(
                    "expected address, got {:?}",
                    other
                ))),
            })
            .collect(),
        other => Err(RouterError::EventParsing(format!("expected array, got {:?}", other))),
    }
}

fn token_uints(token: &Token) -> RouterResult<Vec<U256>> {
    match token {
        Token::Array(items) => items.iter().map(token_uint).collect(),
        other => Err(RouterError::EventParsing(format!("expected array, got {:?}", other))),
    }
}

fn token_bytes_list(token: &Token) -> RouterResult<Vec<Vec<u8>>> {
    match token {
        Token::Array(items) => items
            .iter()
            .map(|item| match item {
                Token::Bytes(bytes) => Ok(bytes.clone()),
                other => Err(RouterError::EventParsing(format!(
                    "expected bytes, got {:?}",
                    other
                ))),
            })
            .collect(),
        other => Err(RouterError::EventParsing(format!("expected array, got {:?}", other))),
    }
}

// LogAnySwapOut(address indexed token, address indexed from, address indexed to,
//               uint amount, uint fromChainID, uint toChainID)
fn parse_swap_out(log: &Log) -> RouterResult<SwapLog> {
    check_topics(log, 4)?;
    let data = decode_data(log, &[ParamType::Uint(256), ParamType::Uint(256), ParamType::Uint(256)])?;

    Ok(SwapLog {
        from: topic_address(&log.topics[2]),
        bind: topic_address(&log.topics[3]),
        value: token_uint(&data[0])?,
        from_chain_id: token_chain_id(&data[1])?,
        to_chain_id: token_chain_id(&data[2])?,
        swap_info: SwapInfo::Erc20 {
            for_native: false,
            for_underlying: false,
            token: topic_address(&log.topics[1]),
            token_id: String::new(),
            path: Vec::new(),
            amount_out_min: U256::zero(),
        },
    })
}

// LogAnySwapTradeTokensFor{Tokens,Native}(address[] path, address indexed from,
//     address indexed to, uint amountIn, uint amountOutMin, uint fromChainID, uint toChainID)
fn parse_swap_trade(log: &Log, for_native: bool) -> RouterResult<SwapLog> {
    check_topics(log, 3)?;
    let data = decode_data(
        log,
        &[
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
    )?;

    let mut path = token_addresses(&data[0])?;
    if path.len() < 3 {
        return Err(RouterError::TxWithWrongPath);
    }
    let token = path.remove(0);

    Ok(SwapLog {
        from: topic_address(&log.topics[1]),
        bind: topic_address(&log.topics[2]),
        value: token_uint(&data[1])?,
        from_chain_id: token_chain_id(&data[3])?,
        to_chain_id: token_chain_id(&data[4])?,
        swap_info: SwapInfo::Erc20 {
            for_native,
            for_underlying: false,
            token,
            token_id: String::new(),
            path,
            amount_out_min: token_uint(&data[2])?,
        },
    })
}

// LogNFT721SwapOut(address indexed token, address indexed from, address indexed to,
//                  uint tokenId, uint fromChainID, uint toChainID)
fn parse_nft721_swap_out(log: &Log) -> RouterResult<SwapLog> {
    check_topics(log, 4)?;
    let data = decode_data(log, &[ParamType::Uint(256), ParamType::Uint(256), ParamType::Uint(256)])?;

    Ok(SwapLog {
        from: topic_address(&log.topics[2]),
        bind: topic_address(&log.topics[3]),
        value: U256::zero(),
        from_chain_id: token_chain_id(&data[1])?,
        to_chain_id: token_chain_id(&data[2])?,
        swap_info: SwapInfo::Nft {
            token: topic_address(&log.topics[1]),
            token_id: String::new(),
            ids: vec![token_uint(&data[0])?],
            amounts: Vec::new(),
            batch: false,
            data: Vec::new(),
        },
    })
}

fn parse_nft1155_swap_out(log: &Log) -> RouterResult<SwapLog> {
    check_topics(log, 4)?;
    let data = decode_data(
        log,
        &[
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
    )?;

    Ok(SwapLog {
        from: topic_address(&log.topics[2]),
        bind: topic_address(&log.topics[3]),
        value: U256::zero(),
        from_chain_id: token_chain_id(&data[2])?,
        to_chain_id: token_chain_id(&data[3])?,
        swap_info: SwapInfo::Nft {
            token: topic_address(&log.topics[1]),
            token_id: String::new(),
            ids: vec![token_uint(&data[0])?],
            amounts: vec![token_uint(&data[1])?],
            batch: false,
            data: Vec::new(),
        },
    })
}

fn parse_nft1155_batch_swap_out(log: &Log) -> RouterResult<SwapLog> {
    check_topics(log, 4)?;
    let data = decode_data(
        log,
        &[
            ParamType::Array(Box::new(ParamType::Uint(256))),
            ParamType::Array(Box::new(ParamType::Uint(256))),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
    )?;

    Ok(SwapLog {
        from: topic_address(&log.topics[2]),
        bind: topic_address(&log.topics[3]),
        value: U256::zero(),
        from_chain_id: token_chain_id(&data[2])?,
        to_chain_id: token_chain_id(&data[3])?,
        swap_info: SwapInfo::Nft {
            token: topic_address(&log.topics[1]),
            token_id: String::new(),
            ids: token_uints(&data[0])?,
            amounts: token_uints(&data[1])?,
            batch: true,
            data: Vec::new(),
        },
    })
}

// LogAnyCall(address indexed from, address[] to, bytes[] data, address[] callbacks,
//            uint[] nonces, uint fromChainID, uint toChainID)
fn parse_any_call(log: &Log) -> RouterResult<SwapLog> {
    check_topics(log, 2)?;
    let data = decode_data(
        log,
        &[
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::Bytes)),
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Array(Box::new(ParamType::Uint(256))),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
    )?;

    let call_from = topic_address(&log.topics[1]);
    let call_to = token_addresses(&data[0])?;
    let call_data = token_bytes_list(&data[1])?;
    if call_to.is_empty() || call_to.len() != call_data.len() {
        return Err(RouterError::EventParsing(format!(
            "anycall with {} targets and {} calldata",
            call_to.len(),
            call_data.len()
        )));
    }

    Ok(SwapLog {
        from: call_from.clone(),
        bind: call_from.clone(),
        value: U256::zero(),
        from_chain_id: token_chain_id(&data[4])?,
        to_chain_id: token_chain_id(&data[5])?,
        swap_info: SwapInfo::AnyCall {
            call_from,
            call_to,
            call_data,
            callbacks: token_addresses(&data[2])?,
            call_nonces: token_uints(&data[3])?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;

    fn address_topic(address: &str) -> H256 {
        H256::from(address.parse::<Address>().unwrap())
    }

    fn log_with(topics: Vec<H256>, data: Vec<Token>) -> Log {
        Log {
            topics,
            data: Bytes::from(abi::encode(&data)),
            ..Default::default()
        }
    }

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";
    const FROM: &str = "0x2222222222222222222222222222222222222222";
    const BIND: &str = "0x3333333333333333333333333333333333333333";

    #[test]
    fn test_known_topics_and_selectors() {
        assert_eq!(
            format!("{:?}", *topics::LOG_ANY_SWAP_OUT),
            "0x97116cf6cd4f6412bb47914d6db18da9e16ab2142f543b86e207c24fbd16b23a"
        );
        assert_eq!(
            format!("{:?}", *topics::LOG_NFT721_SWAP_OUT),
            "0x0d45b0b9f5add3e1bb841982f1fa9303628b0b619b000cb1f9f1c3903329a4c7"
        );
        assert_eq!(hex::encode(*ANY_SWAP_IN_AUTO), "0175b1c4");
        assert_eq!(hex::encode(*ANY_SWAP_IN_UNDERLYING), "3f88de89");
        assert_eq!(hex::encode(*NFT721_SWAP_IN), "09493b23");
    }

    #[test]
    fn test_parse_swap_out() {
        let log = log_with(
            vec![
                *topics::LOG_ANY_SWAP_OUT,
                address_topic(TOKEN),
                address_topic(FROM),
                address_topic(BIND),
            ],
            vec![
                Token::Uint(U256::from(5_000_000u64)),
                Token::Uint(U256::from(1)),
                Token::Uint(U256::from(56)),
            ],
        );

        assert!(is_swap_out_log(&log));
        let swap = parse_swap_log(&log).unwrap();
        assert_eq!(swap.from, FROM);
        assert_eq!(swap.bind, BIND);
        assert_eq!(swap.value, U256::from(5_000_000u64));
        assert_eq!((swap.from_chain_id, swap.to_chain_id), (1, 56));
        match swap.swap_info {
            SwapInfo::Erc20 { token, path, .. } => {
                assert_eq!(token, TOKEN);
                assert!(path.is_empty());
            }
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_parse_swap_trade_requires_path() {
        let path = |n: usize| {
            Token::Array(
                (0..n)
                    .map(|i| Token::Address(Address::from_low_u64_be(i as u64 + 1)))
                    .collect(),
            )
        };
        let topics = vec![
            *topics::LOG_ANY_SWAP_TRADE_TOKENS_FOR_NATIVE,
            address_topic(FROM),
            address_topic(BIND),
        ];
        let uints = |path_token: Token| {
            vec![
                path_token,
                Token::Uint(U256::from(100)),
                Token::Uint(U256::from(90)),
                Token::Uint(U256::from(1)),
                Token::Uint(U256::from(10)),
            ]
        };

        let short = log_with(topics.clone(), uints(path(2)));
        assert!(matches!(parse_swap_log(&short), Err(RouterError::TxWithWrongPath)));

        let swap = parse_swap_log(&log_with(topics, uints(path(3)))).unwrap();
        match swap.swap_info {
            SwapInfo::Erc20 {
                for_native,
                path,
                amount_out_min,
                ..
            } => {
                assert!(for_native);
                assert_eq!(path.len(), 2);
                assert_eq!(amount_out_min, U256::from(90));
            }
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_parse_nft_batch() {
        let log = log_with(
            vec![
                *topics::LOG_NFT1155_SWAP_OUT_BATCH,
                address_topic(TOKEN),
                address_topic(FROM),
                address_topic(BIND),
            ],
            vec![
                Token::Array(vec![Token::Uint(U256::from(7)), Token::Uint(U256::from(8))]),
                Token::Array(vec![Token::Uint(U256::from(1)), Token::Uint(U256::from(2))]),
                Token::Uint(U256::from(1)),
                Token::Uint(U256::from(137)),
            ],
        );
        let swap = parse_swap_log(&log).unwrap();
        assert_eq!(swap.value, U256::zero());
        assert_eq!(swap.to_chain_id, 137);
        match swap.swap_info {
            SwapInfo::Nft { ids, amounts, batch, .. } => {
                assert!(batch);
                assert_eq!(ids, vec![U256::from(7), U256::from(8)]);
                assert_eq!(amounts.len(), 2);
            }
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_parse_any_call() {
        let log = log_with(
            vec![*topics::LOG_ANY_CALL, address_topic(FROM)],
            vec![
                Token::Array(vec![Token::Address(BIND.parse().unwrap())]),
                Token::Array(vec![Token::Bytes(vec![0xde, 0xad])]),
                Token::Array(vec![Token::Address(Address::zero())]),
                Token::Array(vec![Token::Uint(U256::from(3))]),
                Token::Uint(U256::from(1)),
                Token::Uint(U256::from(250)),
            ],
        );
        let swap = parse_swap_log(&log).unwrap();
        assert_eq!(swap.to_chain_id, 250);
        match swap.swap_info {
            SwapInfo::AnyCall {
                call_from,
                call_to,
                call_data,
                call_nonces,
                ..
            } => {
                assert_eq!(call_from, FROM);
                assert_eq!(call_to, vec![BIND.to_string()]);
                assert_eq!(call_data, vec![vec![0xde, 0xad]]);
                assert_eq!(call_nonces, vec![U256::from(3)]);
            }
            other => panic!("unexpected swap info {:?}", other),
        }
    }

    #[test]
    fn test_rejects_wrong_topics_and_unknown_logs() {
        let mut log = log_with(
            vec![*topics::LOG_ANY_SWAP_OUT, address_topic(TOKEN)],
            vec![Token::Uint(U256::one())],
        );
        assert!(matches!(
            parse_swap_log(&log),
            Err(RouterError::TxWithWrongReceipt(_))
        ));

        log.topics[0] = H256::repeat_byte(0x42);
        assert!(!is_swap_out_log(&log));
        assert!(parse_swap_log(&log).is_err());
    }
}
