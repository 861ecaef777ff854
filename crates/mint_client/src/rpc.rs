//! Wallet and contract boundary spoken as JSON-RPC 2.0 over HTTP. The
//! endpoint owns the keys and signs `eth_sendTransaction` itself.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{Address, ChainId, MintReceipt, MintedEvent, TxHash},
    protocol::{
        methods, parse_quantity, quantity, CallRequest, LogEntry, LogFilter, RpcRequest,
        RpcResponse, TransactionReceipt, TransactionRequest,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, warn};
use url::Url;
use wallet_integration::{
    abi::{self, MINTED_EVENT_SIGNATURE, MINT_SIGNATURE, TOTAL_MINTED_SIGNATURE},
    MintContract, PendingTransaction, WalletError, WalletProvider,
};

const MINTED_EVENT_CAPACITY: usize = 64;

pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::new(),
            endpoint: Url::parse(endpoint)?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc: request id={id} method={method}");
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| WalletError::Transport(format!("{method}: {err}")))?;
        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|err| WalletError::Transport(format!("{method}: invalid response: {err}")))?;
        let value = envelope.into_result()?;
        serde_json::from_value(value)
            .map_err(|err| WalletError::Transport(format!("{method}: unexpected result: {err}")))
    }
}

pub struct JsonRpcWallet {
    transport: Arc<JsonRpcTransport>,
}

impl JsonRpcWallet {
    pub fn new(transport: Arc<JsonRpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.transport
            .call(methods::REQUEST_ACCOUNTS, json!([]))
            .await
    }

    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.transport.call(methods::ACCOUNTS, json!([])).await
    }

    async fn chain_id(&self) -> Result<ChainId, WalletError> {
        self.transport.call(methods::CHAIN_ID, json!([])).await
    }
}

pub struct JsonRpcPendingTransaction {
    transport: Arc<JsonRpcTransport>,
    tx_hash: TxHash,
    poll_interval: Duration,
}

#[async_trait]
impl PendingTransaction for JsonRpcPendingTransaction {
    fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    async fn wait(self: Box<Self>) -> Result<MintReceipt, WalletError> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .transport
                .call(methods::GET_TRANSACTION_RECEIPT, json!([self.tx_hash]))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.reverted() {
                    return Err(WalletError::TransactionFailed(format!(
                        "transaction {} reverted",
                        self.tx_hash
                    )));
                }
                return Ok(MintReceipt {
                    tx_hash: self.tx_hash.clone(),
                    block_number: receipt.block_number.as_deref().and_then(parse_quantity),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

pub struct JsonRpcMintContract {
    transport: Arc<JsonRpcTransport>,
    address: Address,
    receipt_poll_interval: Duration,
    log_poll_interval: Duration,
    minted: broadcast::Sender<MintedEvent>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl JsonRpcMintContract {
    pub fn new(
        transport: Arc<JsonRpcTransport>,
        address: Address,
        receipt_poll_interval: Duration,
        log_poll_interval: Duration,
    ) -> Self {
        let (minted, _) = broadcast::channel(MINTED_EVENT_CAPACITY);
        Self {
            transport,
            address,
            receipt_poll_interval,
            log_poll_interval,
            minted,
            poller: Mutex::new(None),
        }
    }

    async fn block_number(&self) -> Result<u64, WalletError> {
        latest_block(&self.transport).await
    }

    fn spawn_log_poller(&self, from_block: u64) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let address = self.address.clone();
        let interval = self.log_poll_interval;
        let sender = self.minted.clone();

        tokio::spawn(async move {
            let topic = abi::event_topic(MINTED_EVENT_SIGNATURE);
            let mut next_block = from_block;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if sender.receiver_count() == 0 {
                    debug!("rpc: no minted-event listeners left; stopping log poller");
                    break;
                }

                match fetch_minted_events(&transport, &address, &topic, next_block).await {
                    Ok((events, Some(latest))) => {
                        for event in events {
                            let _ = sender.send(event);
                        }
                        next_block = latest + 1;
                    }
                    Ok((_, None)) => {}
                    Err(err) => warn!("rpc: minted log poll failed from_block={next_block}: {err}"),
                }
            }
        })
    }
}

impl Drop for JsonRpcMintContract {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

async fn latest_block(transport: &JsonRpcTransport) -> Result<u64, WalletError> {
    let raw: String = transport.call(methods::BLOCK_NUMBER, json!([])).await?;
    parse_quantity(&raw)
        .ok_or_else(|| WalletError::Transport(format!("invalid block number '{raw}'")))
}

/// Returns the decoded events and the last block covered, or `None` when no
/// new block exists yet.
async fn fetch_minted_events(
    transport: &JsonRpcTransport,
    address: &Address,
    topic: &str,
    from_block: u64,
) -> Result<(Vec<MintedEvent>, Option<u64>), WalletError> {
    let latest = latest_block(transport).await?;
    if latest < from_block {
        return Ok((Vec::new(), None));
    }

    let filter = LogFilter {
        address: address.clone(),
        topics: vec![Some(topic.to_string())],
        from_block: quantity(from_block),
        to_block: quantity(latest),
    };
    let logs: Vec<LogEntry> = transport.call(methods::GET_LOGS, json!([filter])).await?;
    let events = logs
        .iter()
        .filter_map(|log| match abi::decode_minted_log(log) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(
                    "rpc: skipping undecodable minted log tx={:?}: {err}",
                    log.transaction_hash
                );
                None
            }
        })
        .collect();
    Ok((events, Some(latest)))
}

#[async_trait]
impl MintContract for JsonRpcMintContract {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn mint(&self) -> Result<Box<dyn PendingTransaction>, WalletError> {
        let accounts: Vec<Address> = self.transport.call(methods::ACCOUNTS, json!([])).await?;
        let from = accounts
            .into_iter()
            .next()
            .ok_or(WalletError::NoAuthorizedAccount)?;
        let request = TransactionRequest {
            from,
            to: self.address.clone(),
            data: abi::encode_call(MINT_SIGNATURE),
        };
        let tx_hash: TxHash = self
            .transport
            .call(methods::SEND_TRANSACTION, json!([request]))
            .await?;
        debug!("rpc: mint transaction submitted tx={tx_hash}");

        Ok(Box::new(JsonRpcPendingTransaction {
            transport: Arc::clone(&self.transport),
            tx_hash,
            poll_interval: self.receipt_poll_interval,
        }))
    }

    async fn total_minted(&self) -> Result<u64, WalletError> {
        let call = CallRequest {
            to: self.address.clone(),
            data: abi::encode_call(TOTAL_MINTED_SIGNATURE),
        };
        let raw: String = self
            .transport
            .call(methods::CALL, json!([call, "latest"]))
            .await?;
        Ok(abi::decode_u64_result(&raw)?)
    }

    async fn subscribe_minted(&self) -> Result<broadcast::Receiver<MintedEvent>, WalletError> {
        let receiver = self.minted.subscribe();
        let mut poller = self.poller.lock().await;
        if !poller.as_ref().is_some_and(|handle| !handle.is_finished()) {
            let start = self.block_number().await?;
            *poller = Some(self.spawn_log_poller(start + 1));
            debug!(
                "rpc: minted log poller started contract={} from_block={}",
                self.address,
                start + 1
            );
        }
        Ok(receiver)
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
