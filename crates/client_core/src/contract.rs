use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use shared::{
    domain::{Confirmation, PendingTransaction, TxVerb},
    error::{ControllerError, RemoteCallError},
    protocol::{AbiValue, ContractCall, ContractFunction, ContractInterface, InterfaceError},
};
use tracing::{debug, info, warn};
use wallet_provider::TransactionSigner;

use crate::chain::{map_provider_error, ChainHandle};

const REQUIRED_FUNCTIONS: &[ContractFunction] = &[
    ContractFunction::RequestChaos,
    ContractFunction::OptInToChaos,
    ContractFunction::ExecuteChaosBatch,
    ContractFunction::Transfer,
    ContractFunction::BalanceOf,
    ContractFunction::OptedIn,
    ContractFunction::LastExecuted,
    ContractFunction::ChaosExecuted,
];

const RECEIPT_REVERTED: &str = "transaction reverted";

/// Typed access to one ChaosCoin deployment. Nothing here retries: every boundary error is
/// handed back to the caller as-is.
#[derive(Clone)]
pub struct ContractProxy {
    chain: ChainHandle,
    address: Address,
    interface: Arc<ContractInterface>,
}

impl ContractProxy {
    pub fn bind(
        chain: ChainHandle,
        address: Address,
        interface: ContractInterface,
    ) -> Result<Self, InterfaceError> {
        interface.ensure_supports(REQUIRED_FUNCTIONS)?;
        Ok(Self {
            chain,
            address,
            interface: Arc::new(interface),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn balance_of(&self, account: Address) -> Result<U256, ControllerError> {
        let value = self.read(ContractCall::BalanceOf(account)).await?;
        expect_output(ContractFunction::BalanceOf, value.as_uint())
    }

    pub async fn opted_in(&self, account: Address) -> Result<bool, ControllerError> {
        let value = self.read(ContractCall::OptedIn(account)).await?;
        expect_output(ContractFunction::OptedIn, value.as_bool())
    }

    pub async fn last_executed(&self) -> Result<U256, ControllerError> {
        let value = self.read(ContractCall::LastExecuted).await?;
        expect_output(ContractFunction::LastExecuted, value.as_uint())
    }

    pub async fn chaos_executed(&self) -> Result<bool, ControllerError> {
        let value = self.read(ContractCall::ChaosExecuted).await?;
        expect_output(ContractFunction::ChaosExecuted, value.as_bool())
    }

    pub async fn request_chaos(
        &self,
        signer: &dyn TransactionSigner,
    ) -> Result<PendingTransaction, ControllerError> {
        self.write(signer, TxVerb::RequestChaos, ContractCall::RequestChaos)
            .await
    }

    pub async fn opt_in_to_chaos(
        &self,
        signer: &dyn TransactionSigner,
    ) -> Result<PendingTransaction, ControllerError> {
        self.write(signer, TxVerb::OptInToChaos, ContractCall::OptInToChaos)
            .await
    }

    pub async fn execute_chaos_batch(
        &self,
        signer: &dyn TransactionSigner,
    ) -> Result<PendingTransaction, ControllerError> {
        self.write(
            signer,
            TxVerb::ExecuteChaosBatch,
            ContractCall::ExecuteChaosBatch,
        )
        .await
    }

    pub async fn transfer(
        &self,
        signer: &dyn TransactionSigner,
        to: Address,
        amount: U256,
    ) -> Result<PendingTransaction, ControllerError> {
        self.write(signer, TxVerb::Transfer, ContractCall::Transfer { to, amount })
            .await
    }

    /// Suspends until the chain reports a terminal outcome for `pending`.
    pub async fn await_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> Result<Confirmation, ControllerError> {
        let receipt = self
            .chain
            .provider()
            .wait_for_receipt(pending.hash)
            .await
            .map_err(map_provider_error)?;

        if receipt.success {
            info!(
                "contract: confirmed verb={} hash={} block={:?}",
                pending.verb, pending.hash, receipt.block_number
            );
            Ok(Confirmation::Confirmed {
                hash: receipt.transaction_hash,
                block_number: receipt.block_number,
            })
        } else {
            warn!(
                "contract: reverted verb={} hash={}",
                pending.verb, pending.hash
            );
            Ok(Confirmation::Failed {
                hash: receipt.transaction_hash,
                reason: RECEIPT_REVERTED.to_string(),
            })
        }
    }

    async fn read(&self, call: ContractCall) -> Result<AbiValue, ControllerError> {
        let function = call.function();
        let data = self.encode(&call)?;
        let raw = self
            .chain
            .provider()
            .call(self.address, data)
            .await
            .map_err(map_provider_error)?;
        debug!("contract: read {function} returned {} bytes", raw.len());
        self.interface
            .decode_output(function, &raw)
            .map_err(|err| RemoteCallError::InvalidResponse(err.to_string()).into())
    }

    async fn write(
        &self,
        signer: &dyn TransactionSigner,
        verb: TxVerb,
        call: ContractCall,
    ) -> Result<PendingTransaction, ControllerError> {
        let data = self.encode(&call)?;
        let hash = signer
            .send_transaction(self.address, data)
            .await
            .map_err(map_provider_error)?;
        info!(
            "contract: submitted verb={verb} from={} hash={hash}",
            signer.address()
        );
        Ok(PendingTransaction::new(verb, hash))
    }

    fn encode(&self, call: &ContractCall) -> Result<Bytes, ControllerError> {
        // The interface was verified in `bind`, so a failure here is a defect.
        self.interface
            .encode(call)
            .map_err(|err| ControllerError::StateInconsistency(err.to_string()))
    }
}

fn expect_output<T>(function: ContractFunction, value: Option<T>) -> Result<T, ControllerError> {
    value.ok_or_else(|| {
        ControllerError::StateInconsistency(format!("{function} decoded to an unexpected type"))
    })
}
