//! UI/backend events and error modeling for the mint GUI controller.

use mint_client::{ControllerEvent, Operation};
use shared::error::{ApiError, ErrorCode};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Info(String),
    Controller(ControllerEvent),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Wallet,
    Rejected,
    Transaction,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Connect,
    Mint,
}

impl From<Operation> for UiErrorContext {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Connect => UiErrorContext::Connect,
            Operation::Mint => UiErrorContext::Mint,
        }
    }
}

pub fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Wallet => "Wallet",
        UiErrorCategory::Rejected => "Rejected",
        UiErrorCategory::Transaction => "Transaction",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("no wallet")
            || message_lower.contains("provider")
            || message_lower.contains("no authorized account")
        {
            UiErrorCategory::Wallet
        } else if message_lower.contains("rejected") || message_lower.contains("denied") {
            UiErrorCategory::Rejected
        } else if message_lower.contains("revert") || message_lower.contains("transaction") {
            UiErrorCategory::Transaction
        } else if message_lower.contains("timeout")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("transport")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Uses the structured code when the controller supplied one.
    pub fn from_api_error(operation: Operation, error: &ApiError) -> Self {
        let category = match error.code {
            ErrorCode::ProviderUnavailable => UiErrorCategory::Wallet,
            ErrorCode::UserRejected => UiErrorCategory::Rejected,
            ErrorCode::TransactionFailed => UiErrorCategory::Transaction,
            ErrorCode::QueryFailed => UiErrorCategory::Transport,
            ErrorCode::Busy => {
                return Self::from_message(operation.into(), error.message.clone())
            }
        };
        Self {
            category,
            context: operation.into(),
            message: error.message.clone(),
        }
    }

    /// Rejections are the user's own choice and don't warrant a banner.
    pub fn is_user_choice(&self) -> bool {
        self.category == UiErrorCategory::Rejected
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_backend_command_processor_disconnect_as_transport_error() {
        let err = UiError::from_message(
            UiErrorContext::Connect,
            "Backend command processor disconnected (possible startup/runtime failure)",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(!err.is_user_choice());
    }

    #[test]
    fn structured_codes_win_over_message_text() {
        let err = UiError::from_api_error(
            Operation::Mint,
            &ApiError::new(ErrorCode::UserRejected, "transaction denied"),
        );
        assert_eq!(err.category(), UiErrorCategory::Rejected);
        assert_eq!(err.context(), UiErrorContext::Mint);
        assert!(err.is_user_choice());
    }

    #[test]
    fn missing_provider_is_a_wallet_error() {
        let err = UiError::from_api_error(
            Operation::Connect,
            &ApiError::new(ErrorCode::ProviderUnavailable, "no wallet provider available"),
        );
        assert_eq!(err.category(), UiErrorCategory::Wallet);
        assert_eq!(err_label(err.category()), "Wallet");
    }
}
