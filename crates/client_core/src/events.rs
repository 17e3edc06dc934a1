//! Notifications the controller broadcasts to the presentation layer.

use alloy_primitives::TxHash;
use shared::{
    domain::{AccountState, ControllerPhase, PendingTransaction, Session, TxVerb},
    error::ControllerError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Submit(TxVerb),
}

/// Exactly one of these is emitted per `connect()` or `submit()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded {
        action: Action,
        hash: Option<TxHash>,
    },
    Failed {
        action: Action,
        error: ControllerError,
    },
}

impl Outcome {
    pub fn action(&self) -> Action {
        match self {
            Self::Succeeded { action, .. } | Self::Failed { action, .. } => *action,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Short notification text for toasts and status lines.
    pub fn message(&self) -> String {
        match self {
            Self::Succeeded { action, .. } => success_text(*action).to_string(),
            Self::Failed { action, error } => format!("{}: {error}", failure_text(*action)),
        }
    }
}

fn success_text(action: Action) -> &'static str {
    match action {
        Action::Connect => "Wallet connected",
        Action::Submit(TxVerb::RequestChaos) => "Successfully requested Chaos!",
        Action::Submit(TxVerb::OptInToChaos) => "Successfully opted in to Chaos!",
        Action::Submit(TxVerb::ExecuteChaosBatch) => "Successfully executed Chaos batch!",
        Action::Submit(TxVerb::Transfer) => "Transfer successful!",
    }
}

fn failure_text(action: Action) -> &'static str {
    match action {
        Action::Connect => "Failed to connect wallet",
        Action::Submit(TxVerb::RequestChaos) => "Failed to request Chaos",
        Action::Submit(TxVerb::OptInToChaos) => "Failed to opt in to Chaos",
        Action::Submit(TxVerb::ExecuteChaosBatch) => "Failed to execute Chaos batch",
        Action::Submit(TxVerb::Transfer) => "Transfer failed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    PhaseChanged(ControllerPhase),
    SessionChanged(Option<Session>),
    AccountStateChanged(AccountState),
    TransactionSubmitted(PendingTransaction),
    /// A confirmed transaction's follow-up read failed; the mirror kept its previous snapshot.
    RefreshFailed(ControllerError),
    Outcome(Outcome),
}
