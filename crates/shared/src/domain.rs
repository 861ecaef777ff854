use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! hex_string_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// Kept exactly as the wallet reported them; no checksum or case folding.
hex_string_newtype!(Address);
hex_string_newtype!(ChainId);
hex_string_newtype!(TxHash);

impl ChainId {
    /// Numeric value of a `0x`-prefixed chain id, if it parses.
    pub fn numeric(&self) -> Option<u64> {
        let raw = self.0.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))?;
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok()
    }

    /// `0x4` and `0x04` name the same network; non-hex ids compare as text.
    pub fn matches(&self, other: &ChainId) -> bool {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0.trim().eq_ignore_ascii_case(other.0.trim()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedEvent {
    pub owner: Address,
    pub token_id: TokenId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_compare_by_numeric_value() {
        assert!(ChainId::new("0x4").matches(&ChainId::new("0x04")));
        assert!(ChainId::new("0X4").matches(&ChainId::new("0x4")));
        assert!(!ChainId::new("0x1").matches(&ChainId::new("0x4")));
    }

    #[test]
    fn non_hex_chain_ids_fall_back_to_text_comparison() {
        assert_eq!(ChainId::new("rinkeby").numeric(), None);
        assert!(ChainId::new("Rinkeby").matches(&ChainId::new("rinkeby")));
        assert!(!ChainId::new("0x").matches(&ChainId::new("0x0")));
    }

    #[test]
    fn address_is_kept_verbatim() {
        let address = Address::new("0xABC");
        assert_eq!(address.to_string(), "0xABC");
        assert_eq!(
            serde_json::to_string(&address).expect("serialize"),
            "\"0xABC\""
        );
    }
}
