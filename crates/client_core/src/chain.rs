use std::sync::Arc;

use alloy_primitives::Address;
use shared::error::{ControllerError, RemoteCallError};
use tracing::{info, warn};
use wallet_provider::{ProviderError, TransactionSigner, WalletProvider};

/// Wallet capability as detected once when the controller is built.
#[derive(Clone)]
pub enum WalletCapability {
    Available(Arc<dyn WalletProvider>),
    Unavailable,
}

impl WalletCapability {
    pub fn detect(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        match provider {
            Some(provider) => Self::Available(provider),
            None => Self::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

#[derive(Clone)]
pub struct ChainHandle {
    provider: Arc<dyn WalletProvider>,
}

impl ChainHandle {
    pub fn acquire(capability: &WalletCapability) -> Result<Self, ControllerError> {
        match capability {
            WalletCapability::Available(provider) => Ok(Self {
                provider: Arc::clone(provider),
            }),
            WalletCapability::Unavailable => Err(ControllerError::NoProvider),
        }
    }

    /// Prompts the wallet. The returned list is never empty.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, ControllerError> {
        let accounts = self
            .provider
            .request_accounts()
            .await
            .map_err(map_provider_error)?;
        if accounts.is_empty() {
            warn!("wallet: request_accounts granted no accounts");
            return Err(ControllerError::UserDeclined);
        }
        info!("wallet: accounts granted count={}", accounts.len());
        Ok(accounts)
    }

    pub async fn get_signer(
        &self,
        address: Address,
    ) -> Result<Arc<dyn TransactionSigner>, ControllerError> {
        self.provider
            .signer(address)
            .await
            .map_err(map_provider_error)
    }

    pub(crate) fn provider(&self) -> &dyn WalletProvider {
        self.provider.as_ref()
    }
}

pub(crate) fn map_provider_error(err: ProviderError) -> ControllerError {
    match err {
        ProviderError::UserRejected => ControllerError::UserDeclined,
        ProviderError::Unauthorized(_) => RemoteCallError::SignerUnavailable.into(),
        ProviderError::Reverted(reason) => RemoteCallError::Reverted(reason).into(),
        ProviderError::Rpc { code, message } => RemoteCallError::Rejected { code, message }.into(),
        ProviderError::Disconnected(message) | ProviderError::Transport(message) => {
            RemoteCallError::NetworkUnavailable(message).into()
        }
        ProviderError::Malformed(message) => RemoteCallError::InvalidResponse(message).into(),
    }
}
