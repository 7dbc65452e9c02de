//! Supported payment assets and their fee schedule

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Static description of an asset the wallet can pay with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Option id used by the UI (e.g. "btc")
    pub id: String,
    pub name: String,
    /// Ticker symbol, also the oracle key (e.g. "BTC")
    pub symbol: String,
    #[serde(default)]
    pub icon: String,
    /// Settlement precision; computed amounts are rounded up to this many places
    pub decimals: u32,
    /// Flat network fee per transfer, in USD
    pub network_fee_usd: Decimal,
    pub confirmation_time: String,
    /// CoinGecko id for live pricing (e.g. "bitcoin")
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

impl AssetConfig {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: &str,
        name: &str,
        symbol: &str,
        icon: &str,
        decimals: u32,
        network_fee_usd: Decimal,
        confirmation_time: &str,
        coingecko_id: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            icon: icon.to_string(),
            decimals,
            network_fee_usd,
            confirmation_time: confirmation_time.to_string(),
            coingecko_id: Some(coingecko_id.to_string()),
        }
    }
}

/// Default catalog shipped with the node
pub fn default_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig::new("btc", "Bitcoin", "BTC", "₿", 8, Decimal::new(250, 2), "10-60 minutes", "bitcoin"),
        AssetConfig::new("eth", "Ethereum", "ETH", "Ξ", 8, Decimal::new(300, 2), "1-5 minutes", "ethereum"),
        AssetConfig::new("usdt", "Tether", "USDT", "₮", 6, Decimal::new(100, 2), "1-5 minutes", "tether"),
        AssetConfig::new("sol", "Solana", "SOL", "◎", 6, Decimal::new(1, 2), "< 1 minute", "solana"),
    ]
}

/// Ordered set of assets; catalog order is option order
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    assets: Vec<AssetConfig>,
}

impl AssetCatalog {
    pub fn new(assets: Vec<AssetConfig>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let assets = assets
            .into_iter()
            .filter(|a| {
                let fresh = seen.insert(a.id.to_lowercase());
                if !fresh {
                    tracing::warn!(asset = %a.id, "duplicate asset id in catalog, keeping first");
                }
                fresh
            })
            .collect();
        Self { assets }
    }

    /// Look up an asset by option id (case-insensitive)
    pub fn get(&self, id: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.id.eq_ignore_ascii_case(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetConfig> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_ordered() {
        let catalog = AssetCatalog::new(default_assets());
        assert_eq!(catalog.get("BTC").map(|a| a.symbol.as_str()), Some("BTC"));
        assert!(catalog.get("doge").is_none());
        let ids: Vec<_> = catalog.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["btc", "eth", "usdt", "sol"]);
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let mut assets = default_assets();
        let mut dup = assets[0].clone();
        dup.name = "Shadow".into();
        assets.push(dup);
        let catalog = AssetCatalog::new(assets);
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.get("btc").unwrap().name, "Bitcoin");
    }
}
