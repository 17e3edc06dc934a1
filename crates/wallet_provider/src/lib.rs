use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;
pub use http::HttpWalletProvider;

/// EIP-1193 provider error codes.
pub mod codes {
    pub const EXECUTION_REVERTED: i64 = 3;
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,
    /// EIP-1193 4100. Carries the account when the request was made on its behalf.
    #[error(
        "the wallet has not authorized {}",
        .0.map_or_else(|| "this request".to_string(), |account| format!("account {account}"))
    )]
    Unauthorized(Option<Address>),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("provider disconnected: {0}")]
    Disconnected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Wallet capability injected into the host environment.
///
/// Every method may suspend on a wallet prompt or a remote node for an unbounded time;
/// callers cancel by dropping the future.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;
    async fn signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>, ProviderError>;
    /// Read-only call at the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;
    /// Resolves once the chain reports a terminal outcome for `hash`.
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError>;
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;
    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<TxHash, ProviderError>;
}
