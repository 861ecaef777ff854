use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::domain::ChainId;
use url::Url;

use crate::ControllerSettings;

pub const DEFAULT_SETTINGS_FILE: &str = "mint.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// JSON-RPC endpoint of the wallet. `None` runs without a wallet.
    pub rpc_url: Option<String>,
    pub contract_address: String,
    pub expected_chain_id: String,
    pub total_supply: u64,
    pub collection_url: String,
    pub marketplace_asset_base_url: String,
    pub explorer_tx_base_url: String,
    pub creator_handle: String,
    pub receipt_poll_interval_ms: u64,
    pub log_poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: "0xf14aa29cdfB105707df2E0E202226b81662Dabf9".into(),
            expected_chain_id: "0x4".into(),
            total_supply: 50,
            collection_url: "https://testnets.opensea.io/collection/squarenft-3uyldohbsq".into(),
            marketplace_asset_base_url: "https://testnets.opensea.io/assets".into(),
            explorer_tx_base_url: "https://rinkeby.etherscan.io/tx".into(),
            creator_handle: "heyztb".into(),
            receipt_poll_interval_ms: 1_000,
            log_poll_interval_ms: 4_000,
        }
    }
}

impl Settings {
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            expected_chain_id: ChainId::new(self.expected_chain_id.clone()),
            marketplace_asset_base_url: self.marketplace_asset_base_url.clone(),
            explorer_tx_base_url: self.explorer_tx_base_url.clone(),
        }
    }

    pub fn creator_url(&self) -> String {
        format!("https://twitter.com/{}", self.creator_handle)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(rpc_url) = &self.rpc_url {
            Url::parse(rpc_url).with_context(|| format!("invalid rpc_url '{rpc_url}'"))?;
        }
        for (name, value) in [
            ("collection_url", &self.collection_url),
            ("marketplace_asset_base_url", &self.marketplace_asset_base_url),
            ("explorer_tx_base_url", &self.explorer_tx_base_url),
        ] {
            Url::parse(value).with_context(|| format!("invalid {name} '{value}'"))?;
        }
        if !self.contract_address.starts_with("0x") {
            bail!(
                "contract_address must be 0x-prefixed, got '{}'",
                self.contract_address
            );
        }
        if self.receipt_poll_interval_ms == 0 || self.log_poll_interval_ms == 0 {
            bail!("poll intervals must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    expected_chain_id: Option<String>,
    total_supply: Option<u64>,
    collection_url: Option<String>,
    marketplace_asset_base_url: Option<String>,
    explorer_tx_base_url: Option<String>,
    creator_handle: Option<String>,
    receipt_poll_interval_ms: Option<u64>,
    log_poll_interval_ms: Option<u64>,
}

impl FileSettings {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.rpc_url {
            settings.rpc_url = Some(v);
        }
        if let Some(v) = self.contract_address {
            settings.contract_address = v;
        }
        if let Some(v) = self.expected_chain_id {
            settings.expected_chain_id = v;
        }
        if let Some(v) = self.total_supply {
            settings.total_supply = v;
        }
        if let Some(v) = self.collection_url {
            settings.collection_url = v;
        }
        if let Some(v) = self.marketplace_asset_base_url {
            settings.marketplace_asset_base_url = v;
        }
        if let Some(v) = self.explorer_tx_base_url {
            settings.explorer_tx_base_url = v;
        }
        if let Some(v) = self.creator_handle {
            settings.creator_handle = v;
        }
        if let Some(v) = self.receipt_poll_interval_ms {
            settings.receipt_poll_interval_ms = v;
        }
        if let Some(v) = self.log_poll_interval_ms {
            settings.log_poll_interval_ms = v;
        }
    }
}

/// Defaults, then the settings file, then environment variables.
///
/// An explicit `path` must exist; otherwise `mint.toml` in the working
/// directory is read when present.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default_path = PathBuf::from(DEFAULT_SETTINGS_FILE);
            default_path.exists().then_some(default_path)
        }
    };
    if let Some(file) = file {
        let raw = fs::read_to_string(&file)
            .with_context(|| format!("failed to read settings file '{}'", file.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", file.display()))?;
        file_cfg.apply(&mut settings);
    }

    apply_env(&mut settings, |name| std::env::var(name).ok())?;
    settings.validate()?;
    Ok(settings)
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    // APP__ names win over the short ones.
    let var = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
    };
    let parse_u64 = |name: &str, value: String| {
        value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {name} '{value}'"))
    };

    if let Some(v) = var(&["APP__RPC_URL", "MINT_RPC_URL"]) {
        settings.rpc_url = Some(v);
    }
    if let Some(v) = var(&["APP__CONTRACT_ADDRESS", "MINT_CONTRACT_ADDRESS"]) {
        settings.contract_address = v;
    }
    if let Some(v) = var(&["APP__EXPECTED_CHAIN_ID", "MINT_EXPECTED_CHAIN_ID"]) {
        settings.expected_chain_id = v;
    }
    if let Some(v) = var(&["APP__TOTAL_SUPPLY", "MINT_TOTAL_SUPPLY"]) {
        settings.total_supply = parse_u64("MINT_TOTAL_SUPPLY", v)?;
    }
    if let Some(v) = var(&["APP__COLLECTION_URL", "MINT_COLLECTION_URL"]) {
        settings.collection_url = v;
    }
    if let Some(v) = var(&[
        "APP__MARKETPLACE_ASSET_BASE_URL",
        "MINT_MARKETPLACE_ASSET_BASE_URL",
    ]) {
        settings.marketplace_asset_base_url = v;
    }
    if let Some(v) = var(&["APP__EXPLORER_TX_BASE_URL", "MINT_EXPLORER_TX_BASE_URL"]) {
        settings.explorer_tx_base_url = v;
    }
    if let Some(v) = var(&["APP__CREATOR_HANDLE", "MINT_CREATOR_HANDLE"]) {
        settings.creator_handle = v;
    }
    if let Some(v) = var(&[
        "APP__RECEIPT_POLL_INTERVAL_MS",
        "MINT_RECEIPT_POLL_INTERVAL_MS",
    ]) {
        settings.receipt_poll_interval_ms = parse_u64("MINT_RECEIPT_POLL_INTERVAL_MS", v)?;
    }
    if let Some(v) = var(&[
        "APP__LOG_POLL_INTERVAL_MS",
        "MINT_LOG_POLL_INTERVAL_MS",
    ]) {
        settings.log_poll_interval_ms = parse_u64("MINT_LOG_POLL_INTERVAL_MS", v)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_describe_the_rinkeby_collection() {
        let settings = Settings::default();
        assert_eq!(settings.expected_chain_id, "0x4");
        assert_eq!(settings.total_supply, 50);
        assert_eq!(settings.rpc_url, None);
        assert_eq!(settings.creator_url(), "https://twitter.com/heyztb");
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mint.toml");
        fs::write(
            &path,
            "rpc_url = \"http://127.0.0.1:8545\"\nexpected_chain_id = \"0x5\"\ntotal_supply = 100\n",
        )
        .expect("write settings");

        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.rpc_url.as_deref(), Some("http://127.0.0.1:8545"));
        assert_eq!(settings.expected_chain_id, "0x5");
        assert_eq!(settings.total_supply, 100);
        assert_eq!(settings.log_poll_interval_ms, 4_000);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_settings(Some(&dir.path().join("absent.toml"))).expect_err("missing");
        assert!(err.to_string().contains("failed to read settings file"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mint.toml");
        fs::write(&path, "rpc_uri = \"http://127.0.0.1:8545\"\n").expect("write settings");
        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn app_prefixed_env_wins_over_short_name() {
        let mut settings = Settings::default();
        apply_env(
            &mut settings,
            env_from(&[
                ("MINT_RPC_URL", "http://short:8545"),
                ("APP__RPC_URL", "http://app:8545"),
                ("MINT_TOTAL_SUPPLY", "75"),
                ("MINT_CREATOR_HANDLE", "   "),
            ]),
        )
        .expect("apply env");

        assert_eq!(settings.rpc_url.as_deref(), Some("http://app:8545"));
        assert_eq!(settings.total_supply, 75);
        assert_eq!(settings.creator_handle, "heyztb");
    }

    #[test]
    fn non_numeric_env_values_are_reported() {
        let mut settings = Settings::default();
        let err = apply_env(
            &mut settings,
            env_from(&[("MINT_LOG_POLL_INTERVAL_MS", "soon")]),
        )
        .expect_err("invalid number");
        assert!(err.to_string().contains("MINT_LOG_POLL_INTERVAL_MS"));
    }

    #[test]
    fn validation_rejects_bad_urls_and_zero_intervals() {
        let mut settings = Settings {
            rpc_url: Some("not a url".into()),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings.rpc_url = None;
        settings.receipt_poll_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn controller_settings_carry_links_and_chain() {
        let settings = Settings::default();
        let controller = settings.controller_settings();
        assert_eq!(controller.expected_chain_id, ChainId::new("0x4"));
        assert_eq!(
            controller.marketplace_asset_base_url,
            "https://testnets.opensea.io/assets"
        );
    }
}
