use super::*;
use std::collections::{HashMap, VecDeque};

use axum::{extract::State, routing::post, Json, Router};
use shared::{domain::TokenId, error::RpcErrorObject};
use tokio::net::TcpListener;

type Scripted = Result<Value, RpcErrorObject>;

/// Per-method scripted answers. The last answer for a method repeats.
#[derive(Clone, Default)]
struct MockNode {
    answers: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<Vec<RpcRequest>>>,
}

impl MockNode {
    async fn answer(&self, method: &str, answers: Vec<Scripted>) {
        self.answers
            .lock()
            .await
            .insert(method.to_string(), answers.into());
    }

    async fn calls_to(&self, method: &str) -> Vec<RpcRequest> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }
}

async fn handle_rpc(
    State(node): State<MockNode>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    node.calls.lock().await.push(request.clone());
    let mut answers = node.answers.lock().await;
    let scripted = match answers.get_mut(&request.method) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
    };
    Json(match scripted {
        Some(Ok(value)) => RpcResponse::success(request.id, value),
        Some(Err(err)) => RpcResponse::failure(request.id, err),
        None => RpcResponse::failure(
            request.id,
            RpcErrorObject::new(-32601, format!("method {} not found", request.method)),
        ),
    })
}

async fn spawn_mock_node() -> anyhow::Result<(Arc<JsonRpcTransport>, MockNode)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let node = MockNode::default();
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(node.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let transport = Arc::new(JsonRpcTransport::new(&format!("http://{addr}/"))?);
    Ok((transport, node))
}

fn contract(transport: Arc<JsonRpcTransport>) -> JsonRpcMintContract {
    JsonRpcMintContract::new(
        transport,
        Address::new("0xf14aa29cdfb105707df2e0e202226b81662dabf9"),
        Duration::from_millis(5),
        Duration::from_millis(5),
    )
}

fn word(value: u64) -> String {
    format!("{value:064x}")
}

#[test]
fn transport_parses_its_endpoint() {
    let transport = JsonRpcTransport::new("http://127.0.0.1:8545").expect("transport");
    assert_eq!(transport.endpoint().as_str(), "http://127.0.0.1:8545/");
    assert!(JsonRpcTransport::new("not a url").is_err());
}

#[tokio::test]
async fn wallet_queries_map_to_eth_methods() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(methods::ACCOUNTS, vec![Ok(json!(["0xABC"]))]).await;
    node.answer(methods::CHAIN_ID, vec![Ok(json!("0x4"))]).await;
    let wallet = JsonRpcWallet::new(transport);

    assert_eq!(
        wallet.accounts().await.expect("accounts"),
        vec![Address::new("0xABC")]
    );
    assert_eq!(wallet.chain_id().await.expect("chain"), ChainId::new("0x4"));
    assert_eq!(node.calls_to(methods::REQUEST_ACCOUNTS).await.len(), 0);
}

#[tokio::test]
async fn rejected_account_request_is_user_rejected() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(
        methods::REQUEST_ACCOUNTS,
        vec![Err(RpcErrorObject::new(4001, "User rejected the request."))],
    )
    .await;
    let wallet = JsonRpcWallet::new(transport);

    let err = wallet.request_accounts().await.expect_err("rejected");
    assert_eq!(
        err,
        WalletError::UserRejected("User rejected the request.".to_string())
    );
}

#[tokio::test]
async fn unknown_method_surfaces_rpc_error() {
    let (transport, _node) = spawn_mock_node().await.expect("spawn node");
    let wallet = JsonRpcWallet::new(transport);

    let err = wallet.chain_id().await.expect_err("not scripted");
    assert!(matches!(err, WalletError::Rpc { code: -32601, .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let transport =
        Arc::new(JsonRpcTransport::new(&format!("http://{addr}/")).expect("transport"));

    let err = JsonRpcWallet::new(transport)
        .accounts()
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, WalletError::Transport(_)));
}

#[tokio::test]
async fn total_minted_calls_counter_selector() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(methods::CALL, vec![Ok(json!(format!("0x{}", word(13))))])
        .await;

    let total = contract(transport).total_minted().await.expect("total");
    assert_eq!(total, 13);

    let calls = node.calls_to(methods::CALL).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].params[0]["to"],
        "0xf14aa29cdfb105707df2e0e202226b81662dabf9"
    );
    assert_eq!(
        calls[0].params[0]["data"],
        abi::encode_call(TOTAL_MINTED_SIGNATURE)
    );
    assert_eq!(calls[0].params[1], "latest");
}

#[tokio::test]
async fn mint_submits_from_first_account_and_polls_receipt() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(methods::ACCOUNTS, vec![Ok(json!(["0xabc", "0xdef"]))])
        .await;
    node.answer(methods::SEND_TRANSACTION, vec![Ok(json!("0xfeed"))])
        .await;
    node.answer(
        methods::GET_TRANSACTION_RECEIPT,
        vec![
            Ok(Value::Null),
            Ok(Value::Null),
            Ok(json!({
                "transactionHash": "0xfeed",
                "blockNumber": "0x2a",
                "status": "0x1",
                "logs": []
            })),
        ],
    )
    .await;

    let pending = contract(transport).mint().await.expect("submit");
    assert_eq!(pending.tx_hash(), &TxHash::new("0xfeed"));
    let receipt = pending.wait().await.expect("confirmed");
    assert_eq!(receipt.block_number, Some(42));

    let sends = node.calls_to(methods::SEND_TRANSACTION).await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].params[0]["from"], "0xabc");
    assert_eq!(sends[0].params[0]["data"], abi::encode_call(MINT_SIGNATURE));
    assert_eq!(node.calls_to(methods::GET_TRANSACTION_RECEIPT).await.len(), 3);
}

#[tokio::test]
async fn reverted_receipt_fails_the_transaction() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(methods::ACCOUNTS, vec![Ok(json!(["0xabc"]))]).await;
    node.answer(methods::SEND_TRANSACTION, vec![Ok(json!("0xbad"))])
        .await;
    node.answer(
        methods::GET_TRANSACTION_RECEIPT,
        vec![Ok(json!({
            "transactionHash": "0xbad",
            "blockNumber": "0x2b",
            "status": "0x0",
            "logs": []
        }))],
    )
    .await;

    let err = contract(transport)
        .mint()
        .await
        .expect("submit")
        .wait()
        .await
        .expect_err("reverted");
    assert!(matches!(err, WalletError::TransactionFailed(_)));
}

#[tokio::test]
async fn mint_without_authorized_account_is_refused() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(methods::ACCOUNTS, vec![Ok(json!([]))]).await;

    let err = match contract(transport).mint().await {
        Ok(_) => panic!("mint must not be submitted"),
        Err(err) => err,
    };
    assert_eq!(err, WalletError::NoAuthorizedAccount);
    assert!(node.calls_to(methods::SEND_TRANSACTION).await.is_empty());
}

#[tokio::test]
async fn minted_logs_are_delivered_to_subscribers() {
    let (transport, node) = spawn_mock_node().await.expect("spawn node");
    node.answer(
        methods::BLOCK_NUMBER,
        vec![Ok(json!("0x10")), Ok(json!("0x11"))],
    )
    .await;
    node.answer(
        methods::GET_LOGS,
        vec![Ok(json!([{
            "address": "0xf14aa29cdfb105707df2e0e202226b81662dabf9",
            "topics": [abi::event_topic(MINTED_EVENT_SIGNATURE)],
            "data": format!("0x{}{}", format!("{:0>64}", "abc"), word(7)),
            "blockNumber": "0x11",
            "transactionHash": "0xfeed"
        }]))],
    )
    .await;

    let contract = contract(transport);
    let mut receiver = contract.subscribe_minted().await.expect("subscribe");
    let event = tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("event within timeout")
        .expect("event");
    assert_eq!(event.token_id, TokenId(7));
    assert_eq!(
        event.owner,
        Address::new("0x0000000000000000000000000000000000000abc")
    );

    let log_calls = node.calls_to(methods::GET_LOGS).await;
    assert_eq!(log_calls[0].params[0]["fromBlock"], "0x11");
    assert_eq!(log_calls[0].params[0]["toBlock"], "0x11");

    // Block height stays at 0x11, so the same range is never queried twice.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(node.calls_to(methods::GET_LOGS).await.len(), 1);
}
