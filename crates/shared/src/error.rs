use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ControllerPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Environment,
    UserDeclined,
    Validation,
    Remote,
    InvalidPhase,
    StateInconsistency,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative")]
    Negative,
    #[error("amount {0:?} is not a decimal number")]
    NotANumber(String),
    #[error("amount has {digits} fractional digits, at most 18 are allowed")]
    TooPrecise { digits: usize },
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("recipient address is required")]
    EmptyRecipient,
    #[error("invalid recipient address {0:?}")]
    InvalidRecipient(String),
    #[error("invalid amount: {0}")]
    Amount(#[from] AmountError),
    #[error("transfer amount must be greater than zero")]
    ZeroAmount,
    #[error("account is already opted in to Chaos")]
    AlreadyOptedIn,
}

/// Failures reported by the contract boundary. Surfaced verbatim, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    #[error("call reverted: {0}")]
    Reverted(String),
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("signer unavailable")]
    SignerUnavailable,
    #[error("invalid response from chain: {0}")]
    InvalidResponse(String),
    /// The node refused the request for a reason other than a contract revert
    /// (insufficient funds, nonce errors, internal errors).
    #[error("node rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("no wallet provider available")]
    NoProvider,
    #[error("user declined the wallet request")]
    UserDeclined,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        phase: ControllerPhase,
        operation: &'static str,
    },
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProvider => ErrorKind::Environment,
            Self::UserDeclined => ErrorKind::UserDeclined,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Remote(_) => ErrorKind::Remote,
            Self::InvalidPhase { .. } => ErrorKind::InvalidPhase,
            Self::StateInconsistency(_) => ErrorKind::StateInconsistency,
        }
    }

    /// Whether a fresh user action can reasonably succeed where this one failed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StateInconsistency(_))
    }
}
