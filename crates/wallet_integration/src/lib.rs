use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, MintReceipt, MintedEvent, TxHash},
    error::{ErrorCode, RpcErrorObject},
};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod abi;

pub use abi::AbiError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet provider is unavailable")]
    ProviderUnavailable,
    #[error("request rejected by user: {0}")]
    UserRejected(String),
    #[error("wallet has no authorized account")]
    NoAuthorizedAccount,
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("wallet rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("wallet transport error: {0}")]
    Transport(String),
    #[error("contract abi error: {0}")]
    Abi(#[from] AbiError),
}

impl WalletError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WalletError::ProviderUnavailable => ErrorCode::ProviderUnavailable,
            WalletError::UserRejected(_) => ErrorCode::UserRejected,
            WalletError::TransactionFailed(_) => ErrorCode::TransactionFailed,
            WalletError::NoAuthorizedAccount
            | WalletError::Rpc { .. }
            | WalletError::Transport(_)
            | WalletError::Abi(_) => ErrorCode::QueryFailed,
        }
    }
}

impl From<RpcErrorObject> for WalletError {
    fn from(value: RpcErrorObject) -> Self {
        if value.is_user_rejection() {
            WalletError::UserRejected(value.message)
        } else if value.code == RpcErrorObject::UNAUTHORIZED {
            WalletError::NoAuthorizedAccount
        } else {
            WalletError::Rpc {
                code: value.code,
                message: value.message,
            }
        }
    }
}

/// Account and network queries answered by the wallet that holds the keys.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts the wallet to authorize accounts for this front end.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;
    /// Accounts already authorized; never prompts.
    async fn accounts(&self) -> Result<Vec<Address>, WalletError>;
    async fn chain_id(&self) -> Result<ChainId, WalletError>;
}

/// A submitted transaction that has not been confirmed yet.
#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn tx_hash(&self) -> &TxHash;
    async fn wait(self: Box<Self>) -> Result<MintReceipt, WalletError>;
}

#[async_trait]
pub trait MintContract: Send + Sync {
    fn address(&self) -> &Address;
    async fn mint(&self) -> Result<Box<dyn PendingTransaction>, WalletError>;
    async fn total_minted(&self) -> Result<u64, WalletError>;
    async fn subscribe_minted(&self) -> Result<broadcast::Receiver<MintedEvent>, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_code_maps_to_user_rejected() {
        let err = WalletError::from(RpcErrorObject::new(4001, "User rejected the request."));
        assert_eq!(
            err,
            WalletError::UserRejected("User rejected the request.".to_string())
        );
        assert_eq!(err.code(), ErrorCode::UserRejected);
    }

    #[test]
    fn unauthorized_code_means_no_authorized_account() {
        let err = WalletError::from(RpcErrorObject::new(
            4100,
            "The requested account has not been authorized by the user.",
        ));
        assert_eq!(err, WalletError::NoAuthorizedAccount);
    }

    #[test]
    fn other_rpc_codes_stay_rpc_errors() {
        let err = WalletError::from(RpcErrorObject::new(-32601, "method not found"));
        assert!(matches!(err, WalletError::Rpc { code: -32601, .. }));
        assert_eq!(err.code(), ErrorCode::QueryFailed);
    }
}
