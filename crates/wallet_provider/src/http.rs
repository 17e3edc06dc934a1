//! JSON-RPC wallet provider for nodes that manage unlocked accounts (anvil, hardhat, geth --dev).

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy_primitives::{hex, Address, Bytes, TxHash, TxKind};
use alloy_rpc_types_eth::{
    TransactionInput, TransactionReceipt as RpcReceipt, TransactionRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared::protocol::decode_revert_reason;
use tracing::{debug, info, warn};
use url::Url;

use crate::{codes, ProviderError, TransactionReceipt, TransactionSigner, WalletProvider};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

struct HttpInner {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
    poll_interval: Duration,
}

#[derive(Clone)]
pub struct HttpWalletProvider {
    inner: Arc<HttpInner>,
}

impl HttpWalletProvider {
    pub fn new(endpoint: Url) -> Self {
        Self::with_poll_interval(endpoint, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(endpoint: Url, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(HttpInner {
                http: Client::new(),
                endpoint,
                next_id: AtomicU64::new(1),
                poll_interval,
            }),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        self.request_as(method, params, None).await
    }

    /// Sends one request. `account` names the account the request acts for, so an
    /// authorization failure can say which one the wallet refused.
    async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        account: Option<Address>,
    ) -> Result<T, ProviderError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc: request id={id} method={method}");
        let response: RpcResponse = self
            .inner
            .http
            .post(self.inner.endpoint.clone())
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ProviderError::Transport(err.to_string()))?
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;

        if let Some(error) = response.error {
            return Err(map_rpc_error(error, account));
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|err| ProviderError::Malformed(format!("{method}: {err}")))
    }

    async fn accounts_for(&self, account: Option<Address>) -> Result<Vec<Address>, ProviderError> {
        self.request_as("eth_accounts", json!([]), account).await
    }
}

fn map_rpc_error(error: RpcErrorObject, account: Option<Address>) -> ProviderError {
    match error.code {
        codes::USER_REJECTED => ProviderError::UserRejected,
        codes::UNAUTHORIZED => ProviderError::Unauthorized(account),
        codes::DISCONNECTED | codes::CHAIN_DISCONNECTED => {
            ProviderError::Disconnected(error.message)
        }
        code if code == codes::EXECUTION_REVERTED
            || error.message.to_ascii_lowercase().contains("revert") =>
        {
            ProviderError::Reverted(revert_reason(&error))
        }
        code => ProviderError::Rpc {
            code,
            message: error.message,
        },
    }
}

fn revert_reason(error: &RpcErrorObject) -> String {
    let decoded = error
        .data
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|data| hex::decode(data).ok())
        .and_then(|data| decode_revert_reason(&data));
    if let Some(reason) = decoded {
        return reason;
    }
    let message = error.message.trim();
    message
        .strip_prefix("execution reverted:")
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or(message)
        .to_string()
}

fn call_request(from: Option<Address>, to: Address, data: Bytes) -> TransactionRequest {
    TransactionRequest {
        from,
        to: Some(TxKind::Call(to)),
        input: TransactionInput::both(data),
        ..Default::default()
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        match self.request("eth_requestAccounts", json!([])).await {
            Err(ProviderError::Rpc { code, .. }) if code == codes::METHOD_NOT_FOUND => {
                info!("rpc: eth_requestAccounts unsupported, falling back to eth_accounts");
                self.accounts_for(None).await
            }
            other => other,
        }
    }

    async fn signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>, ProviderError> {
        let accounts = self.accounts_for(Some(account)).await?;
        if !accounts.contains(&account) {
            return Err(ProviderError::Unauthorized(Some(account)));
        }
        Ok(Arc::new(HttpSigner {
            provider: self.clone(),
            account,
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        self.request("eth_call", json!([call_request(None, to, data), "latest"]))
            .await
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                // Pre-byzantium receipts carry a state root instead of a status and
                // count as successful.
                let success = receipt.status();
                if !success {
                    warn!("rpc: transaction reverted hash={hash}");
                }
                return Ok(TransactionReceipt {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number,
                    success,
                });
            }
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }
}

struct HttpSigner {
    provider: HttpWalletProvider,
    account: Address,
}

#[async_trait]
impl TransactionSigner for HttpSigner {
    fn address(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash, ProviderError> {
        let hash: TxHash = self
            .provider
            .request_as(
                "eth_sendTransaction",
                json!([call_request(Some(self.account), to, data)]),
                Some(self.account),
            )
            .await?;
        info!("rpc: transaction sent from={} hash={hash}", self.account);
        Ok(hash)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
