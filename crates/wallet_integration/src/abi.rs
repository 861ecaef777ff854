//! Minimal contract ABI handling for the mint contract: zero-argument call
//! selectors, event topics and 32-byte word decoding.

use sha3::{Digest, Keccak256};
use shared::{
    domain::{Address, MintedEvent, TokenId},
    protocol::LogEntry,
};
use thiserror::Error;

pub const MINT_SIGNATURE: &str = "makeNFT()";
pub const TOTAL_MINTED_SIGNATURE: &str = "getTotalNFTsMintedSoFar()";
pub const MINTED_EVENT_SIGNATURE: &str = "NewNFTMinted(address,uint256)";

const WORD_LEN: usize = 32;
const SELECTOR_LEN: usize = 4;
const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
    #[error("expected at least {expected} bytes, got {actual}")]
    ShortPayload { expected: usize, actual: usize },
    #[error("uint256 value does not fit in 64 bits")]
    Overflow,
}

fn keccak(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn selector(signature: &str) -> [u8; SELECTOR_LEN] {
    let digest = keccak(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&digest[..SELECTOR_LEN]);
    out
}

/// Call data for a function that takes no arguments.
pub fn encode_call(signature: &str) -> String {
    format!("0x{}", hex::encode(selector(signature)))
}

pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak(signature.as_bytes())))
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|err| AbiError::InvalidHex(err.to_string()))
}

fn word_at(bytes: &[u8], index: usize) -> Result<&[u8], AbiError> {
    let start = index * WORD_LEN;
    let end = start + WORD_LEN;
    bytes.get(start..end).ok_or(AbiError::ShortPayload {
        expected: end,
        actual: bytes.len(),
    })
}

pub fn word_to_u64(word: &[u8]) -> Result<u64, AbiError> {
    if word.len() != WORD_LEN {
        return Err(AbiError::ShortPayload {
            expected: WORD_LEN,
            actual: word.len(),
        });
    }
    let (high, low) = word.split_at(WORD_LEN - 8);
    if high.iter().any(|byte| *byte != 0) {
        return Err(AbiError::Overflow);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}

pub fn word_to_address(word: &[u8]) -> Result<Address, AbiError> {
    if word.len() != WORD_LEN {
        return Err(AbiError::ShortPayload {
            expected: WORD_LEN,
            actual: word.len(),
        });
    }
    Ok(Address::new(format!(
        "0x{}",
        hex::encode(&word[WORD_LEN - ADDRESS_LEN..])
    )))
}

/// Decodes the single `uint256` returned by an `eth_call`.
pub fn decode_u64_result(raw: &str) -> Result<u64, AbiError> {
    let bytes = decode_hex(raw)?;
    word_to_u64(word_at(&bytes, 0)?)
}

/// Decodes a `NewNFTMinted(address,uint256)` log. Indexed parameters are read
/// from the topics, unindexed ones from the data words.
pub fn decode_minted_log(log: &LogEntry) -> Result<MintedEvent, AbiError> {
    if log.topics.len() >= 3 {
        let owner = decode_hex(&log.topics[1])?;
        let token_id = decode_hex(&log.topics[2])?;
        return Ok(MintedEvent {
            owner: word_to_address(&owner)?,
            token_id: TokenId(word_to_u64(&token_id)?),
        });
    }

    let data = decode_hex(&log.data)?;
    Ok(MintedEvent {
        owner: word_to_address(word_at(&data, 0)?)?,
        token_id: TokenId(word_to_u64(word_at(&data, 1)?)?),
    })
}
