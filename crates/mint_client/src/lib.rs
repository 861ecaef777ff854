use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, MintReceipt, MintedEvent, TokenId, TxHash},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod config;
pub mod rpc;

pub use config::{load_settings, Settings};
pub use wallet_integration::{MintContract, PendingTransaction, WalletError, WalletProvider};

const CONTROLLER_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub expected_chain_id: ChainId,
    pub marketplace_asset_base_url: String,
    pub explorer_tx_base_url: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            expected_chain_id: ChainId::new("0x4"),
            marketplace_asset_base_url: "https://testnets.opensea.io/assets".to_string(),
            explorer_tx_base_url: "https://rinkeby.etherscan.io/tx".to_string(),
        }
    }
}

/// User-triggered operations that are guarded against overlapping clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Mint,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Connect => "wallet connection",
            Operation::Mint => "mint",
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{} is already in progress", .0.label())]
    Busy(Operation),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl ControllerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Busy(_) => ErrorCode::Busy,
            ControllerError::Wallet(err) => err.code(),
        }
    }
}

/// Blocking, user-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    WrongNetwork {
        expected: ChainId,
        actual: ChainId,
    },
    WalletMissing,
    TokenMinted {
        owner: Address,
        token_id: TokenId,
        asset_url: String,
    },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::WrongNetwork { expected, actual } => format!(
                "You are not connected to the expected network (wallet reports chain {actual}, expected {expected}). Switch networks in your wallet to continue."
            ),
            Notice::WalletMissing => {
                "No wallet provider found. Install or configure a wallet to continue.".to_string()
            }
            Notice::TokenMinted {
                owner,
                token_id,
                asset_url,
            } => format!(
                "Hey there! We've minted NFT #{token_id} and sent it to {owner}. It may be blank right now and can take up to 10 minutes to show up on the marketplace. Here's the link: {asset_url}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCheck {
    Matches(ChainId),
    Mismatch { expected: ChainId, actual: ChainId },
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    AccountConnected(Address),
    MintCountUpdated(u64),
    OperationStarted(Operation),
    OperationFinished(Operation),
    MintSubmitted(TxHash),
    MintConfirmed {
        receipt: MintReceipt,
        explorer_url: String,
    },
    OperationFailed {
        operation: Operation,
        error: ApiError,
    },
    Notice(Notice),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub account: Option<Address>,
    pub mint_count: u64,
    pub connect_in_flight: bool,
    pub mint_in_flight: bool,
    pub subscription_active: bool,
    pub last_mint_tx: Option<TxHash>,
}

#[derive(Default)]
struct ControllerState {
    account: Option<Address>,
    mint_count: u64,
    last_mint_tx: Option<TxHash>,
}

/// Marks an operation as in flight until dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    operation: Operation,
    events: &'a broadcast::Sender<ControllerEvent>,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        operation: Operation,
        events: &'a broadcast::Sender<ControllerEvent>,
    ) -> Result<Self, ControllerError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ControllerError::Busy(operation))?;
        let _ = events.send(ControllerEvent::OperationStarted(operation));
        Ok(Self {
            flag,
            operation,
            events,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        let _ = self
            .events
            .send(ControllerEvent::OperationFinished(self.operation));
    }
}

pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }

    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }

    async fn chain_id(&self) -> Result<ChainId, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }
}

pub struct MissingMintContract {
    address: Address,
}

impl MissingMintContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl MintContract for MissingMintContract {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn mint(&self) -> Result<Box<dyn PendingTransaction>, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }

    async fn total_minted(&self) -> Result<u64, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }

    async fn subscribe_minted(&self) -> Result<broadcast::Receiver<MintedEvent>, WalletError> {
        Err(WalletError::ProviderUnavailable)
    }
}

pub fn marketplace_asset_url(base_url: &str, contract: &Address, token_id: TokenId) -> String {
    format!("{}/{contract}/{token_id}", base_url.trim_end_matches('/'))
}

pub fn explorer_tx_url(base_url: &str, tx_hash: &TxHash) -> String {
    format!("{}/{tx_hash}", base_url.trim_end_matches('/'))
}

pub fn mint_progress_line(mint_count: u64, total_supply: u64) -> String {
    format!("{mint_count}/{total_supply} NFTs minted so far! Don't miss out!")
}

/// Mediates between a front end and the wallet/contract boundary.
pub struct ConnectionController {
    settings: ControllerSettings,
    wallet: Arc<dyn WalletProvider>,
    contract: Arc<dyn MintContract>,
    state: Mutex<ControllerState>,
    connect_in_flight: AtomicBool,
    mint_in_flight: AtomicBool,
    subscription: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ConnectionController {
    pub fn new(
        settings: ControllerSettings,
        wallet: Arc<dyn WalletProvider>,
        contract: Arc<dyn MintContract>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(CONTROLLER_EVENT_CAPACITY);
        Arc::new(Self {
            settings,
            wallet,
            contract,
            state: Mutex::new(ControllerState::default()),
            connect_in_flight: AtomicBool::new(false),
            mint_in_flight: AtomicBool::new(false),
            subscription: Mutex::new(None),
            events,
        })
    }

    /// Controller for a session where no wallet is reachable.
    pub fn without_wallet(settings: ControllerSettings, contract_address: Address) -> Arc<Self> {
        Self::new(
            settings,
            Arc::new(MissingWalletProvider),
            Arc::new(MissingMintContract::new(contract_address)),
        )
    }

    /// Builds the JSON-RPC backed controller, or a wallet-less one when no
    /// endpoint is configured.
    pub fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let controller_settings = settings.controller_settings();
        let contract_address = Address::new(settings.contract_address.clone());
        let Some(rpc_url) = settings.rpc_url.as_deref() else {
            warn!("wallet: no rpc endpoint configured; running without a wallet provider");
            return Ok(Self::without_wallet(controller_settings, contract_address));
        };

        let transport = Arc::new(
            rpc::JsonRpcTransport::new(rpc_url)
                .with_context(|| format!("failed to prepare wallet endpoint '{rpc_url}'"))?,
        );
        info!(
            "wallet: using rpc endpoint={} contract={}",
            transport.endpoint(),
            settings.contract_address
        );
        let wallet = rpc::JsonRpcWallet::new(Arc::clone(&transport));
        let contract = rpc::JsonRpcMintContract::new(
            transport,
            contract_address,
            Duration::from_millis(settings.receipt_poll_interval_ms),
            Duration::from_millis(settings.log_poll_interval_ms),
        );
        Ok(Self::new(
            controller_settings,
            Arc::new(wallet),
            Arc::new(contract),
        ))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let subscription_active = self.subscription_active().await;
        let state = self.state.lock().await;
        ControllerSnapshot {
            account: state.account.clone(),
            mint_count: state.mint_count,
            connect_in_flight: self.connect_in_flight.load(Ordering::Acquire),
            mint_in_flight: self.mint_in_flight.load(Ordering::Acquire),
            subscription_active,
            last_mint_tx: state.last_mint_tx.clone(),
        }
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    /// Picks up an account the wallet already authorized, without prompting.
    pub async fn check_existing_connection(&self) -> Option<Address> {
        let accounts = match self.wallet.accounts().await {
            Ok(accounts) => accounts,
            Err(WalletError::ProviderUnavailable) => {
                info!("wallet: no provider available; make sure a wallet is configured");
                return None;
            }
            Err(err) => {
                warn!("wallet: authorized account query failed: {err}");
                return None;
            }
        };

        let Some(account) = accounts.into_iter().next() else {
            info!("wallet: no authorized account found");
            return None;
        };

        info!("wallet: found authorized account={account}");
        self.on_connected(account.clone()).await;
        Some(account)
    }

    /// Advisory only: a mismatch raises a notice and nothing else.
    pub async fn check_network_identity(&self) -> NetworkCheck {
        let actual = match self.wallet.chain_id().await {
            Ok(chain_id) => chain_id,
            Err(WalletError::ProviderUnavailable) => {
                info!("wallet: no provider available; skipping network check");
                return NetworkCheck::Unavailable;
            }
            Err(err) => {
                warn!("wallet: chain id query failed: {err}");
                return NetworkCheck::Unavailable;
            }
        };

        let expected = self.settings.expected_chain_id.clone();
        if actual.matches(&expected) {
            debug!("wallet: connected to expected chain={actual}");
            return NetworkCheck::Matches(actual);
        }

        warn!("wallet: chain mismatch expected={expected} actual={actual}");
        self.emit(ControllerEvent::Notice(Notice::WrongNetwork {
            expected: expected.clone(),
            actual: actual.clone(),
        }));
        NetworkCheck::Mismatch { expected, actual }
    }

    pub async fn request_connection(&self) -> Result<Address, ControllerError> {
        let _guard =
            InFlightGuard::acquire(&self.connect_in_flight, Operation::Connect, &self.events)
                .inspect_err(|_| debug!("wallet: connection request already in flight"))?;

        let result = match self.wallet.request_accounts().await {
            Ok(accounts) => accounts
                .into_iter()
                .next()
                .ok_or(WalletError::NoAuthorizedAccount),
            Err(err) => Err(err),
        };

        match result {
            Ok(account) => {
                info!("wallet: connected account={account}");
                self.on_connected(account.clone()).await;
                Ok(account)
            }
            Err(err) => {
                self.report_failure(Operation::Connect, &err);
                Err(err.into())
            }
        }
    }

    pub async fn request_mint(&self) -> Result<MintReceipt, ControllerError> {
        let _guard = InFlightGuard::acquire(&self.mint_in_flight, Operation::Mint, &self.events)
            .inspect_err(|_| debug!("mint: request already in flight"))?;

        match self.submit_and_confirm_mint().await {
            Ok(receipt) => {
                let explorer_url =
                    explorer_tx_url(&self.settings.explorer_tx_base_url, &receipt.tx_hash);
                info!("mint: mined, see transaction: {explorer_url}");
                self.emit(ControllerEvent::MintConfirmed {
                    receipt: receipt.clone(),
                    explorer_url,
                });
                let _ = self.refresh_mint_count().await;
                Ok(receipt)
            }
            Err(err) => {
                self.report_failure(Operation::Mint, &err);
                Err(err.into())
            }
        }
    }

    async fn submit_and_confirm_mint(&self) -> Result<MintReceipt, WalletError> {
        info!("mint: asking wallet to approve the mint transaction");
        let pending = self.contract.mint().await?;
        let tx_hash = pending.tx_hash().clone();
        self.state.lock().await.last_mint_tx = Some(tx_hash.clone());
        self.emit(ControllerEvent::MintSubmitted(tx_hash.clone()));
        info!("mint: submitted tx={tx_hash}; waiting for confirmation");
        pending.wait().await
    }

    /// Queries the contract's running total. A failed query leaves the stored
    /// count untouched.
    pub async fn refresh_mint_count(&self) -> Result<u64, WalletError> {
        match self.contract.total_minted().await {
            Ok(count) => {
                self.state.lock().await.mint_count = count;
                debug!("mint: total minted so far={count}");
                self.emit(ControllerEvent::MintCountUpdated(count));
                Ok(count)
            }
            Err(err) => {
                warn!("mint: failed to refresh mint count: {err}");
                Err(err)
            }
        }
    }

    async fn subscription_active(&self) -> bool {
        self.subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Returns `Ok(false)` when a listener is already running.
    pub async fn activate_mint_event_subscription(&self) -> Result<bool, WalletError> {
        if self.subscription_active().await {
            debug!("mint: event listener already active");
            return Ok(false);
        }

        // The subscription lock is not held across the contract call.
        let mut receiver = self
            .contract
            .subscribe_minted()
            .await
            .inspect_err(|err| warn!("mint: failed to set up event listener: {err}"))?;

        let mut subscription = self.subscription.lock().await;
        if subscription
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            debug!("mint: event listener activated concurrently; dropping duplicate");
            return Ok(false);
        }

        let events = self.events.clone();
        let asset_base_url = self.settings.marketplace_asset_base_url.clone();
        let contract = self.contract.address().clone();
        *subscription = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(MintedEvent { owner, token_id }) => {
                        info!("mint: new token minted owner={owner} token_id={token_id}");
                        let asset_url = marketplace_asset_url(&asset_base_url, &contract, token_id);
                        let _ = events.send(ControllerEvent::Notice(Notice::TokenMinted {
                            owner,
                            token_id,
                            asset_url,
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("mint: event listener lagged; skipped={skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("mint: event source closed");
                        break;
                    }
                }
            }
        }));

        info!("mint: event listener set up");
        Ok(true)
    }

    async fn on_connected(&self, account: Address) {
        self.state.lock().await.account = Some(account.clone());
        self.emit(ControllerEvent::AccountConnected(account));
        let _ = self.refresh_mint_count().await;
        let _ = self.activate_mint_event_subscription().await;
    }

    fn report_failure(&self, operation: Operation, err: &WalletError) {
        match err {
            WalletError::ProviderUnavailable => {
                warn!("{}: no wallet provider available", operation.label());
                self.emit(ControllerEvent::Notice(Notice::WalletMissing));
            }
            WalletError::UserRejected(reason) => {
                info!("{}: rejected in wallet: {reason}", operation.label());
            }
            other => {
                error!("{}: failed: {other}", operation.label());
            }
        }
        self.emit(ControllerEvent::OperationFailed {
            operation,
            error: ApiError::new(err.code(), err.to_string()),
        });
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
