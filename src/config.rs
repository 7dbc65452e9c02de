//! Vision Pay configuration
//!
//! TOML file with `VISION_PAY_*` environment overrides. Every section has a
//! usable default so the binary runs without a config file.

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{default_assets, AssetConfig};
use crate::oracle::DEFAULT_PRICE_URL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSettings {
    pub id: String,
    /// Spending PIN; unset means every payment is refused
    #[serde(default)]
    pub pin: Option<String>,
    /// Opening balances by symbol, whole units
    #[serde(default)]
    pub balances: BTreeMap<String, Decimal>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
            pin: None,
            balances: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Prices older than this are refused
    pub rate_ttl_secs: u64,
    /// Refresh interval of the background price task (`prices --watch`)
    pub refresh_secs: u64,
    pub price_url: String,
    /// Fixed USD prices by symbol, used when live prices are off
    #[serde(default)]
    pub static_prices: BTreeMap<String, Decimal>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            rate_ttl_secs: 300,
            refresh_secs: 30,
            price_url: DEFAULT_PRICE_URL.to_string(),
            static_prices: BTreeMap::new(),
        }
    }
}

impl OracleSettings {
    pub fn rate_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayConfig {
    #[serde(default)]
    pub wallet: WalletSettings,
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub oracle: OracleSettings,
    /// sled directory for the payment ledger; in-memory when unset
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

impl Default for PayConfig {
    fn default() -> Self {
        Self {
            wallet: WalletSettings::default(),
            assets: default_assets(),
            oracle: OracleSettings::default(),
            ledger_path: None,
        }
    }
}

impl PayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: PayConfig = toml::from_str(raw).context("Failed to parse TOML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or defaults when the file does not exist, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("VISION_PAY_CONFIG").ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut cfg = match &path {
            Some(p) if p.exists() => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml_str(&raw)?
            }
            _ => Self::default(),
        };

        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;

        tracing::info!(
            config = %path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".into()),
            assets = cfg.assets.len(),
            ledger = ?cfg.ledger_path,
            "Loaded payment configuration"
        );
        Ok(cfg)
    }

    /// Apply `VISION_PAY_*` overrides read through `get`
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if let Some(val) = get("VISION_PAY_LEDGER") {
            let val = val.trim();
            self.ledger_path = (!val.is_empty()).then(|| PathBuf::from(val));
        }
        if let Some(val) = get("VISION_PAY_RATE_TTL_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) => self.oracle.rate_ttl_secs = secs,
                Err(_) => tracing::warn!("ignoring invalid VISION_PAY_RATE_TTL_SECS={}", val),
            }
        }
        if let Some(val) = get("VISION_PAY_PIN") {
            self.wallet.pin = Some(val.trim().to_string()).filter(|p| !p.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(anyhow!("at least one payment asset must be configured"));
        }
        for a in &self.assets {
            if a.id.trim().is_empty() || a.symbol.trim().is_empty() {
                return Err(anyhow!("asset id and symbol must be set"));
            }
            if a.network_fee_usd < Decimal::ZERO {
                return Err(anyhow!("asset {} has a negative network fee", a.id));
            }
            if a.decimals > 18 {
                return Err(anyhow!("asset {} decimals must be at most 18", a.id));
            }
        }
        if self.oracle.rate_ttl_secs == 0 {
            return Err(anyhow!("oracle.rate_ttl_secs must be at least 1"));
        }
        for (symbol, amount) in &self.wallet.balances {
            if *amount < Decimal::ZERO {
                return Err(anyhow!("opening balance for {} is negative", symbol));
            }
        }
        Ok(())
    }
}

/// `<config dir>/vision-pay/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vision-pay").join("config.toml"))
}
