//! Folds backend events into the state the mint page renders from.

use std::collections::VecDeque;

use mint_client::{mint_progress_line, ControllerEvent, Operation};

use crate::controller::events::{err_label, UiError, UiErrorContext, UiEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBannerSeverity {
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBanner {
    pub severity: StatusBannerSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintViewState {
    pub account: Option<String>,
    pub mint_count: u64,
    pub total_supply: u64,
    pub connect_in_flight: bool,
    pub mint_in_flight: bool,
    pub backend_available: bool,
    pub status: String,
    pub status_banner: Option<StatusBanner>,
    /// Modal alerts, shown one at a time in arrival order.
    pub alerts: VecDeque<String>,
    pub last_tx_url: Option<String>,
}

impl MintViewState {
    pub fn new(total_supply: u64) -> Self {
        Self {
            account: None,
            mint_count: 0,
            total_supply,
            connect_in_flight: false,
            mint_in_flight: false,
            backend_available: true,
            status: "Starting...".to_string(),
            status_banner: None,
            alerts: VecDeque::new(),
            last_tx_url: None,
        }
    }

    pub fn can_connect(&self) -> bool {
        self.backend_available && !self.connect_in_flight
    }

    pub fn can_mint(&self) -> bool {
        self.backend_available && self.account.is_some() && !self.mint_in_flight
    }

    /// Shown next to the Mint button only, so `None` until an account is connected.
    pub fn progress_line(&self) -> Option<String> {
        self.account
            .as_ref()
            .map(|_| mint_progress_line(self.mint_count, self.total_supply))
    }

    pub fn current_alert(&self) -> Option<&str> {
        self.alerts.front().map(String::as_str)
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    fn show_error(&mut self, err: &UiError) {
        self.status = format!("{} error: {}", err_label(err.category()), err.message());
        self.status_banner = Some(StatusBanner {
            severity: StatusBannerSeverity::Error,
            message: self.status.clone(),
        });
    }
}

pub fn reduce(state: &mut MintViewState, event: UiEvent) {
    match event {
        UiEvent::Info(message) => state.status = message,
        UiEvent::Error(err) => {
            if err.context() == UiErrorContext::BackendStartup {
                state.backend_available = false;
            }
            state.show_error(&err);
        }
        UiEvent::Controller(event) => reduce_controller_event(state, event),
    }
}

fn reduce_controller_event(state: &mut MintViewState, event: ControllerEvent) {
    match event {
        ControllerEvent::AccountConnected(account) => {
            state.status = format!("Connected {account}");
            state.account = Some(account.to_string());
        }
        ControllerEvent::MintCountUpdated(count) => state.mint_count = count,
        ControllerEvent::OperationStarted(Operation::Connect) => {
            state.connect_in_flight = true;
            state.status = "Waiting for wallet approval...".to_string();
        }
        ControllerEvent::OperationStarted(Operation::Mint) => {
            state.mint_in_flight = true;
            state.status = "Approve the mint in your wallet...".to_string();
        }
        ControllerEvent::OperationFinished(Operation::Connect) => state.connect_in_flight = false,
        ControllerEvent::OperationFinished(Operation::Mint) => state.mint_in_flight = false,
        ControllerEvent::MintSubmitted(tx_hash) => {
            state.status = format!("Mining... please wait. tx={tx_hash}");
        }
        ControllerEvent::MintConfirmed { explorer_url, .. } => {
            state.status = format!("Mined, see transaction: {explorer_url}");
            state.status_banner = None;
            state.last_tx_url = Some(explorer_url);
        }
        ControllerEvent::OperationFailed { operation, error } => {
            let err = UiError::from_api_error(operation, &error);
            if err.is_user_choice() {
                state.status = format!("{} cancelled in wallet", operation.label());
            } else {
                state.show_error(&err);
            }
        }
        ControllerEvent::Notice(notice) => state.alerts.push_back(notice.message()),
    }
}
