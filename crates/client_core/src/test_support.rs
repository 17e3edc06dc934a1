//! In-memory wallet and contract used by the controller and mirror tests.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{
    protocol::{ContractFunction, ContractInterface},
    units::parse_token_amount,
};
use tokio::sync::Semaphore;
use wallet_provider::{ProviderError, TransactionReceipt, TransactionSigner, WalletProvider};

use crate::{
    chain::{ChainHandle, WalletCapability},
    contract::ContractProxy,
};

pub(crate) fn user() -> Address {
    Address::with_last_byte(0xa1)
}

pub(crate) fn recipient() -> Address {
    Address::with_last_byte(0xb2)
}

pub(crate) fn contract_address() -> Address {
    Address::with_last_byte(0xcc)
}

pub(crate) fn tokens(amount: &str) -> U256 {
    parse_token_amount(amount).expect("test amount")
}

struct Sent {
    from: Address,
    function: ContractFunction,
    data: Bytes,
}

struct ChainState {
    accounts: Result<Vec<Address>, ProviderError>,
    balances: HashMap<Address, U256>,
    opted_in: HashMap<Address, bool>,
    last_executed: U256,
    chaos_executed: bool,
    read_error: Option<ProviderError>,
    send_error: Option<ProviderError>,
    receipt_error: Option<ProviderError>,
    receipt_success: bool,
    reads: Vec<ContractFunction>,
    sent: Vec<ContractFunction>,
    pending: HashMap<TxHash, Sent>,
    next_hash: u8,
}

struct FakeInner {
    interface: ContractInterface,
    state: Mutex<ChainState>,
    receipt_gate: Option<Semaphore>,
}

#[derive(Clone)]
pub(crate) struct FakeChain {
    inner: Arc<FakeInner>,
}

impl FakeChain {
    pub(crate) fn new() -> Self {
        Self::build(None)
    }

    /// Receipts stay pending until `release_receipt` is called once per transaction.
    pub(crate) fn holding_receipts() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(receipt_gate: Option<Semaphore>) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                interface: ContractInterface::chaos_coin().expect("chaos coin interface"),
                state: Mutex::new(ChainState {
                    accounts: Ok(vec![user()]),
                    balances: HashMap::new(),
                    opted_in: HashMap::new(),
                    last_executed: U256::ZERO,
                    chaos_executed: false,
                    read_error: None,
                    send_error: None,
                    receipt_error: None,
                    receipt_success: true,
                    reads: Vec::new(),
                    sent: Vec::new(),
                    pending: HashMap::new(),
                    next_hash: 0,
                }),
                receipt_gate,
            }),
        }
    }

    pub(crate) fn capability(&self) -> WalletCapability {
        WalletCapability::Available(Arc::new(self.clone()))
    }

    pub(crate) fn proxy(&self) -> ContractProxy {
        let chain = ChainHandle::acquire(&self.capability()).expect("chain handle");
        ContractProxy::bind(
            chain,
            contract_address(),
            ContractInterface::chaos_coin().expect("chaos coin interface"),
        )
        .expect("bound proxy")
    }

    pub(crate) fn set_accounts(&self, accounts: Result<Vec<Address>, ProviderError>) {
        self.inner.state.lock().accounts = accounts;
    }

    pub(crate) fn set_balance(&self, account: Address, balance: U256) {
        self.inner.state.lock().balances.insert(account, balance);
    }

    pub(crate) fn set_opted_in(&self, account: Address, opted_in: bool) {
        self.inner.state.lock().opted_in.insert(account, opted_in);
    }

    pub(crate) fn set_status(&self, last_executed: U256, chaos_executed: bool) {
        let mut state = self.inner.state.lock();
        state.last_executed = last_executed;
        state.chaos_executed = chaos_executed;
    }

    pub(crate) fn fail_reads(&self, err: Option<ProviderError>) {
        self.inner.state.lock().read_error = err;
    }

    pub(crate) fn fail_sends(&self, err: Option<ProviderError>) {
        self.inner.state.lock().send_error = err;
    }

    /// Receipt lookups fail with `err`; the transaction stays pending and has no effect.
    pub(crate) fn fail_receipts(&self, err: Option<ProviderError>) {
        self.inner.state.lock().receipt_error = err;
    }

    pub(crate) fn revert_receipts(&self) {
        self.inner.state.lock().receipt_success = false;
    }

    pub(crate) fn release_receipt(&self) {
        if let Some(gate) = &self.inner.receipt_gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn reads(&self) -> Vec<ContractFunction> {
        self.inner.state.lock().reads.clone()
    }

    pub(crate) fn sent(&self) -> Vec<ContractFunction> {
        self.inner.state.lock().sent.clone()
    }

    pub(crate) fn clear_log(&self) {
        let mut state = self.inner.state.lock();
        state.reads.clear();
        state.sent.clear();
    }

    fn function_for(&self, data: &[u8]) -> Result<ContractFunction, ProviderError> {
        let selector = data
            .get(..4)
            .ok_or_else(|| ProviderError::Malformed("calldata shorter than a selector".into()))?;
        ContractFunction::ALL
            .into_iter()
            .find(|function| {
                self.inner
                    .interface
                    .selector(*function)
                    .is_some_and(|known| known.as_slice() == selector)
            })
            .ok_or_else(|| ProviderError::Rpc {
                code: -32000,
                message: "unknown selector".into(),
            })
    }
}

fn address_arg(data: &[u8], index: usize) -> Address {
    let start = 4 + index * 32;
    Address::from_slice(&data[start + 12..start + 32])
}

fn uint_arg(data: &[u8], index: usize) -> U256 {
    let start = 4 + index * 32;
    U256::from_be_slice(&data[start..start + 32])
}

fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

fn apply(state: &mut ChainState, sent: Sent) {
    match sent.function {
        ContractFunction::Transfer => {
            let (to, amount) = (address_arg(&sent.data, 0), uint_arg(&sent.data, 1));
            let from_balance = state.balances.entry(sent.from).or_default();
            *from_balance = from_balance.saturating_sub(amount);
            *state.balances.entry(to).or_default() += amount;
        }
        ContractFunction::OptInToChaos => {
            state.opted_in.insert(sent.from, true);
        }
        ContractFunction::RequestChaos => {
            *state.balances.entry(sent.from).or_default() += tokens("100");
        }
        ContractFunction::ExecuteChaosBatch => {
            state.last_executed += U256::from(1);
            state.chaos_executed = true;
        }
        _ => {}
    }
}

#[async_trait]
impl WalletProvider for FakeChain {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.inner.state.lock().accounts.clone()
    }

    async fn signer(&self, account: Address) -> Result<Arc<dyn TransactionSigner>, ProviderError> {
        let authorized = matches!(&self.inner.state.lock().accounts, Ok(list) if list.contains(&account));
        if !authorized {
            return Err(ProviderError::Unauthorized(Some(account)));
        }
        Ok(Arc::new(FakeSigner {
            chain: self.clone(),
            address: account,
        }))
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        let function = self.function_for(&data)?;
        let mut state = self.inner.state.lock();
        state.reads.push(function);
        if let Some(err) = &state.read_error {
            return Err(err.clone());
        }
        let value = match function {
            ContractFunction::BalanceOf => state
                .balances
                .get(&address_arg(&data, 0))
                .copied()
                .unwrap_or_default(),
            ContractFunction::OptedIn => {
                U256::from(u8::from(state.opted_in.get(&address_arg(&data, 0)) == Some(&true)))
            }
            ContractFunction::LastExecuted => state.last_executed,
            ContractFunction::ChaosExecuted => U256::from(u8::from(state.chaos_executed)),
            other => {
                return Err(ProviderError::Rpc {
                    code: -32000,
                    message: format!("{other} is not a view function"),
                })
            }
        };
        Ok(word(value))
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError> {
        if let Some(gate) = &self.inner.receipt_gate {
            gate.acquire()
                .await
                .map_err(|err| ProviderError::Transport(err.to_string()))?
                .forget();
        }
        let mut state = self.inner.state.lock();
        if let Some(err) = &state.receipt_error {
            return Err(err.clone());
        }
        let sent = state
            .pending
            .remove(&hash)
            .ok_or_else(|| ProviderError::Malformed(format!("unknown transaction {hash}")))?;
        let success = state.receipt_success;
        if success {
            apply(&mut state, sent);
        }
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(1),
            success,
        })
    }
}

struct FakeSigner {
    chain: FakeChain,
    address: Address,
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, _to: Address, data: Bytes) -> Result<TxHash, ProviderError> {
        let function = self.chain.function_for(&data)?;
        let mut state = self.chain.inner.state.lock();
        state.sent.push(function);
        if let Some(err) = &state.send_error {
            return Err(err.clone());
        }
        state.next_hash += 1;
        let hash = TxHash::with_last_byte(state.next_hash);
        state.pending.insert(
            hash,
            Sent {
                from: self.address,
                function,
                data,
            },
        );
        Ok(hash)
    }
}
