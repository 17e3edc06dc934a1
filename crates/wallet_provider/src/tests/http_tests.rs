use super::*;
use alloy_primitives::U256;
use axum::{extract::State, routing::post, Json, Router};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone)]
struct MockNode {
    accounts: Vec<Address>,
    supports_request_accounts: bool,
    call_result: String,
    receipt_after_polls: usize,
    receipt_status: &'static str,
    send_error: Option<Value>,
    accounts_error: Option<Value>,
    methods: Arc<Mutex<Vec<String>>>,
    last_params: Arc<Mutex<Option<Value>>>,
}

impl MockNode {
    fn new() -> Self {
        Self {
            accounts: vec![Address::repeat_byte(0xaa)],
            supports_request_accounts: true,
            call_result: format!("0x{}", hex::encode(U256::from(42u8).to_be_bytes::<32>())),
            receipt_after_polls: 0,
            receipt_status: "0x1",
            send_error: None,
            accounts_error: None,
            methods: Arc::new(Mutex::new(Vec::new())),
            last_params: Arc::new(Mutex::new(None)),
        }
    }
}

async fn handle_rpc(State(node): State<MockNode>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let polls = {
        let mut methods = node.methods.lock().await;
        methods.push(method.clone());
        methods
            .iter()
            .filter(|m| m.as_str() == "eth_getTransactionReceipt")
            .count()
    };
    *node.last_params.lock().await = Some(request["params"].clone());

    let outcome: Result<Value, Value> = match method.as_str() {
        "eth_requestAccounts" if !node.supports_request_accounts => {
            Err(json!({ "code": -32601, "message": "Method not found" }))
        }
        "eth_requestAccounts" | "eth_accounts" => match &node.accounts_error {
            Some(error) => Err(error.clone()),
            None => Ok(json!(node.accounts)),
        },
        "eth_call" => Ok(json!(node.call_result)),
        "eth_sendTransaction" => match &node.send_error {
            Some(error) => Err(error.clone()),
            None => Ok(json!(TxHash::repeat_byte(0x11))),
        },
        "eth_getTransactionReceipt" if polls <= node.receipt_after_polls => Ok(Value::Null),
        "eth_getTransactionReceipt" => Ok(mined_receipt(node.receipt_status)),
        _ => Err(json!({ "code": -32601, "message": "Method not found" })),
    };

    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}

fn mined_receipt(status: &str) -> Value {
    json!({
        "type": "0x2",
        "status": status,
        "cumulativeGasUsed": "0x5208",
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": TxHash::repeat_byte(0x11),
        "transactionIndex": "0x0",
        "blockHash": TxHash::repeat_byte(0x22),
        "blockNumber": "0x10",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "from": Address::repeat_byte(0xaa),
        "to": Address::repeat_byte(0xcc),
        "contractAddress": null,
    })
}

async fn spawn_node(node: MockNode) -> HttpWalletProvider {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/", post(handle_rpc)).with_state(node);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let endpoint = Url::parse(&format!("http://{addr}/")).expect("url");
    HttpWalletProvider::with_poll_interval(endpoint, Duration::from_millis(10))
}

#[tokio::test]
async fn request_accounts_returns_wallet_accounts() {
    let provider = spawn_node(MockNode::new()).await;
    let accounts = provider.request_accounts().await.expect("accounts");
    assert_eq!(accounts, vec![Address::repeat_byte(0xaa)]);
}

#[tokio::test]
async fn request_accounts_falls_back_to_eth_accounts() {
    let mut node = MockNode::new();
    node.supports_request_accounts = false;
    let methods = Arc::clone(&node.methods);
    let provider = spawn_node(node).await;

    let accounts = provider.request_accounts().await.expect("accounts");
    assert_eq!(accounts, vec![Address::repeat_byte(0xaa)]);
    assert_eq!(
        *methods.lock().await,
        vec!["eth_requestAccounts".to_string(), "eth_accounts".to_string()]
    );
}

#[tokio::test]
async fn call_returns_raw_bytes() {
    let provider = spawn_node(MockNode::new()).await;
    let data = provider
        .call(Address::repeat_byte(0xcc), Bytes::from(vec![0x70, 0xa0, 0x82, 0x31]))
        .await
        .expect("call");
    assert_eq!(U256::from_be_slice(&data), U256::from(42u8));
}

#[tokio::test]
async fn signer_is_refused_for_unknown_accounts() {
    let provider = spawn_node(MockNode::new()).await;
    let err = provider
        .signer(Address::repeat_byte(0xbb))
        .await
        .err()
        .expect("unauthorized");
    assert_eq!(err, ProviderError::Unauthorized(Some(Address::repeat_byte(0xbb))));
}

#[tokio::test]
async fn send_transaction_posts_from_to_and_data() {
    let node = MockNode::new();
    let last_params = Arc::clone(&node.last_params);
    let provider = spawn_node(node).await;

    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let hash = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::from(vec![0x01, 0x02]))
        .await
        .expect("send");
    assert_eq!(hash, TxHash::repeat_byte(0x11));

    let params = last_params.lock().await.clone().expect("params");
    let tx = &params[0];
    assert_eq!(
        tx["from"].as_str().map(str::to_ascii_lowercase),
        Some(format!("{:#x}", Address::repeat_byte(0xaa)))
    );
    assert_eq!(tx["data"], json!("0x0102"));
}

#[tokio::test]
async fn user_rejection_and_reverts_are_classified() {
    let mut node = MockNode::new();
    node.send_error = Some(json!({ "code": 4001, "message": "User rejected the request." }));
    let provider = spawn_node(node).await;
    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let err = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::new())
        .await
        .expect_err("rejected");
    assert_eq!(err, ProviderError::UserRejected);

    let mut node = MockNode::new();
    node.send_error = Some(json!({
        "code": 3,
        "message": "execution reverted: too early",
        "data": concat!(
            "0x08c379a0",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000009",
            "746f6f206561726c790000000000000000000000000000000000000000000000"
        ),
    }));
    let provider = spawn_node(node).await;
    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let err = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::new())
        .await
        .expect_err("reverted");
    assert_eq!(err, ProviderError::Reverted("too early".into()));

    let mut node = MockNode::new();
    node.send_error = Some(json!({ "code": -32000, "message": "execution reverted: already opted in" }));
    let provider = spawn_node(node).await;
    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let err = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::new())
        .await
        .expect_err("reverted");
    assert_eq!(err, ProviderError::Reverted("already opted in".into()));
}

#[tokio::test]
async fn unauthorized_send_names_the_account() {
    let mut node = MockNode::new();
    node.send_error = Some(json!({ "code": 4100, "message": "The requested account has not been authorized" }));
    let provider = spawn_node(node).await;
    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let err = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::new())
        .await
        .expect_err("unauthorized");
    assert_eq!(err, ProviderError::Unauthorized(Some(Address::repeat_byte(0xaa))));
}

#[tokio::test]
async fn unauthorized_accounts_lookup_refuses_the_signer() {
    let mut node = MockNode::new();
    node.accounts_error = Some(json!({ "code": 4100, "message": "unauthorized" }));
    let provider = spawn_node(node).await;
    let err = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .err()
        .expect("unauthorized");
    assert_eq!(err, ProviderError::Unauthorized(Some(Address::repeat_byte(0xaa))));

    assert_eq!(
        provider.request_accounts().await,
        Err(ProviderError::Unauthorized(None))
    );
}

#[tokio::test]
async fn node_errors_are_not_reported_as_reverts() {
    let mut node = MockNode::new();
    node.send_error = Some(json!({ "code": -32000, "message": "insufficient funds for gas * price + value" }));
    let provider = spawn_node(node).await;
    let signer = provider
        .signer(Address::repeat_byte(0xaa))
        .await
        .expect("signer");
    let err = signer
        .send_transaction(Address::repeat_byte(0xcc), Bytes::new())
        .await
        .expect_err("rejected by node");
    assert_eq!(
        err,
        ProviderError::Rpc {
            code: -32000,
            message: "insufficient funds for gas * price + value".into(),
        }
    );
}

#[tokio::test]
async fn wait_for_receipt_polls_until_mined() {
    let mut node = MockNode::new();
    node.receipt_after_polls = 2;
    let methods = Arc::clone(&node.methods);
    let provider = spawn_node(node).await;

    let receipt = provider
        .wait_for_receipt(TxHash::repeat_byte(0x11))
        .await
        .expect("receipt");
    assert!(receipt.success);
    assert_eq!(receipt.block_number, Some(16));
    let polls = methods
        .lock()
        .await
        .iter()
        .filter(|m| m.as_str() == "eth_getTransactionReceipt")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn failed_receipt_status_is_reported() {
    let mut node = MockNode::new();
    node.receipt_status = "0x0";
    let provider = spawn_node(node).await;
    let receipt = provider
        .wait_for_receipt(TxHash::repeat_byte(0x11))
        .await
        .expect("receipt");
    assert!(!receipt.success);
}

#[tokio::test]
async fn unreachable_node_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let provider = HttpWalletProvider::new(Url::parse(&format!("http://{addr}/")).expect("url"));
    assert!(matches!(
        provider.request_accounts().await,
        Err(ProviderError::Transport(_))
    ));
}
