use std::{fs, path::Path, sync::Arc, time::Duration};

use alloy_primitives::Address;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::warn;
use url::Url;
use wallet_provider::HttpWalletProvider;

use crate::{chain::WalletCapability, controller::InteractionController};

pub const SETTINGS_FILE: &str = "chaos.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub confirmation_poll_ms: u64,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            confirmation_poll_ms: 1000,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    confirmation_poll_ms: Option<u64>,
    event_capacity: Option<usize>,
}

/// Defaults, then `chaos.toml` in the working directory, then environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        if let Err(err) = settings.apply_file(&raw) {
            warn!("config: ignoring {SETTINGS_FILE}: {err:#}");
        }
    }
    settings.apply_env(|key| std::env::var(key).ok());
    settings
}

pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let mut settings = Settings::default();
    settings
        .apply_file(&raw)
        .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

impl Settings {
    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg = toml::from_str::<SettingsFile>(raw)?;
        if let Some(v) = file_cfg.rpc_url {
            self.rpc_url = Some(v);
        }
        if let Some(v) = file_cfg.contract_address {
            self.contract_address = Some(v);
        }
        if let Some(v) = file_cfg.confirmation_poll_ms {
            self.confirmation_poll_ms = v;
        }
        if let Some(v) = file_cfg.event_capacity {
            self.event_capacity = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        for key in ["CHAOS_RPC_URL", "APP__RPC_URL"] {
            if let Some(v) = var(key) {
                self.rpc_url = Some(v);
            }
        }
        for key in [
            "VITE_CONTRACT_ADDRESS",
            "CHAOS_CONTRACT_ADDRESS",
            "APP__CONTRACT_ADDRESS",
        ] {
            if let Some(v) = var(key) {
                self.contract_address = Some(v);
            }
        }
        if let Some(parsed) = var("APP__CONFIRMATION_POLL_MS").and_then(|v| v.parse().ok()) {
            self.confirmation_poll_ms = parsed;
        }
        if let Some(parsed) = var("APP__EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
            self.event_capacity = parsed;
        }
    }

    pub fn contract_address(&self) -> anyhow::Result<Address> {
        let raw = self
            .contract_address
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| anyhow!("contract address is not configured (CHAOS_CONTRACT_ADDRESS)"))?;
        raw.parse::<Address>()
            .with_context(|| format!("invalid contract address '{raw}'"))
    }

    /// Resolves the wallet capability once. No RPC URL means no wallet in this environment.
    pub fn wallet_capability(&self) -> anyhow::Result<WalletCapability> {
        let Some(raw) = self.rpc_url.as_deref().map(str::trim).filter(|raw| !raw.is_empty())
        else {
            return Ok(WalletCapability::Unavailable);
        };
        let endpoint = Url::parse(raw).with_context(|| format!("invalid rpc url '{raw}'"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("rpc url must start with http:// or https://"));
        }
        let provider = HttpWalletProvider::with_poll_interval(
            endpoint,
            Duration::from_millis(self.confirmation_poll_ms.max(1)),
        );
        Ok(WalletCapability::Available(Arc::new(provider)))
    }

    pub fn build_controller(&self) -> anyhow::Result<InteractionController> {
        let controller = InteractionController::with_interface(
            self.wallet_capability()?,
            self.contract_address()?,
            shared::protocol::ContractInterface::chaos_coin()?,
            self.event_capacity,
        )?;
        Ok(controller)
    }
}
