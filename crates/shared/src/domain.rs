use std::fmt;

use alloy_primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ValidationError,
    units::{format_token_amount, parse_token_amount},
};

/// State-changing contract verbs the controller can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxVerb {
    RequestChaos,
    OptInToChaos,
    ExecuteChaosBatch,
    Transfer,
}

/// What the local mirror must do once a verb's transaction confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Re-read balance and opt-in status from the chain.
    FullRefresh,
    /// Flip the cached opt-in flag to true without any read.
    OptInFlag,
}

impl TxVerb {
    pub const ALL: [TxVerb; 4] = [
        TxVerb::RequestChaos,
        TxVerb::OptInToChaos,
        TxVerb::ExecuteChaosBatch,
        TxVerb::Transfer,
    ];

    pub fn contract_name(self) -> &'static str {
        match self {
            Self::RequestChaos => "requestChaos",
            Self::OptInToChaos => "optInToChaos",
            Self::ExecuteChaosBatch => "executeChaosBatch",
            Self::Transfer => "transfer",
        }
    }

    pub fn refresh_policy(self) -> RefreshPolicy {
        match self {
            Self::OptInToChaos => RefreshPolicy::OptInFlag,
            Self::RequestChaos | Self::ExecuteChaosBatch | Self::Transfer => {
                RefreshPolicy::FullRefresh
            }
        }
    }
}

impl fmt::Display for TxVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "verb", rename_all = "snake_case")]
pub enum ControllerPhase {
    Disconnected,
    Connecting,
    Idle,
    Submitting(TxVerb),
}

impl ControllerPhase {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Idle | Self::Submitting(_))
    }
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Idle => f.write_str("connected (idle)"),
            Self::Submitting(verb) => write!(f, "connected (submitting {verb})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub address: Address,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            connected_at: Utc::now(),
        }
    }
}

/// Cached view of the connected account. Defaults read as zero balance, not opted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance_raw: U256,
    pub opted_in: bool,
}

impl AccountState {
    pub fn balance(&self) -> String {
        format_token_amount(self.balance_raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub verb: TxVerb,
    pub hash: TxHash,
    pub submitted_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(verb: TxVerb, hash: TxHash) -> Self {
        Self {
            verb,
            hash,
            submitted_at: Utc::now(),
        }
    }
}

/// Terminal outcome the chain reports for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed {
        hash: TxHash,
        block_number: Option<u64>,
    },
    Failed {
        hash: TxHash,
        reason: String,
    },
}

/// Raw transfer input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOrder {
    pub to: Address,
    pub amount: U256,
}

impl TransferIntent {
    pub fn new(recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    pub fn validate(&self) -> Result<TransferOrder, ValidationError> {
        let recipient = self.recipient.trim();
        if recipient.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        let to = recipient
            .parse::<Address>()
            .map_err(|_| ValidationError::InvalidRecipient(recipient.to_string()))?;

        let amount = parse_token_amount(&self.amount)?;
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }

        Ok(TransferOrder { to, amount })
    }
}

/// A user request handed to `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    RequestChaos,
    OptInToChaos,
    ExecuteChaosBatch,
    Transfer(TransferIntent),
}

impl TxRequest {
    pub fn verb(&self) -> TxVerb {
        match self {
            Self::RequestChaos => TxVerb::RequestChaos,
            Self::OptInToChaos => TxVerb::OptInToChaos,
            Self::ExecuteChaosBatch => TxVerb::ExecuteChaosBatch,
            Self::Transfer(_) => TxVerb::Transfer,
        }
    }
}

/// Contract-wide batch status, read on demand for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosStatus {
    pub last_executed: U256,
    pub chaos_executed: bool,
}

impl ChaosStatus {
    pub fn last_executed_at(&self) -> Option<DateTime<Utc>> {
        if self.last_executed.is_zero() {
            return None;
        }
        let secs = i64::try_from(self.last_executed).ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}
