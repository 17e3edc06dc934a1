pub mod chain;
pub mod config;
pub mod contract;
pub mod controller;
pub mod events;
pub mod mirror;

pub use chain::{ChainHandle, WalletCapability};
pub use config::{load_settings, Settings};
pub use contract::ContractProxy;
pub use controller::InteractionController;
pub use events::{Action, ControllerEvent, Outcome};
pub use mirror::StateMirror;

#[cfg(test)]
mod test_support;
