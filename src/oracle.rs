//! USD price oracle
//!
//! Caches the USD price of every payable asset together with the time it was
//! observed. Lookups fail closed: a missing, non-positive or expired price is
//! reported as unavailable and never replaced by an older value.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::assets::AssetCatalog;
use crate::error::PaymentError;

pub const DEFAULT_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Price observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriceTick {
    usd: Decimal,
    observed_at: DateTime<Utc>,
}

/// Multi-asset price oracle
#[derive(Clone)]
pub struct PriceOracle {
    http: reqwest::Client,
    endpoint: String,
    ttl: chrono::Duration,
    prices: Arc<RwLock<HashMap<String, PriceTick>>>,
    last_update: Arc<RwLock<Option<DateTime<Utc>>>>,
}

/// One row of [`PriceOracle::snapshot`]
#[derive(Debug, Clone, Serialize)]
pub struct PriceView {
    pub symbol: String,
    pub usd: Decimal,
    pub observed_at: DateTime<Utc>,
    pub stale: bool,
}

impl PriceOracle {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            prices: Arc::new(RwLock::new(HashMap::new())),
            last_update: Arc::new(RwLock::new(None)),
        }
    }

    /// Oracle without a live source; prices come from `set_price` only
    pub fn offline(ttl: Duration) -> Self {
        Self::new(reqwest::Client::new(), DEFAULT_PRICE_URL, ttl)
    }

    /// Record a price observed now
    pub fn set_price(&self, symbol: &str, usd: Decimal) {
        self.set_price_at(symbol, usd, Utc::now());
    }

    pub fn set_price_at(&self, symbol: &str, usd: Decimal, observed_at: DateTime<Utc>) {
        self.prices
            .write()
            .insert(symbol.to_uppercase(), PriceTick { usd, observed_at });
        let mut last = self.last_update.write();
        if last.map_or(true, |t| t < observed_at) {
            *last = Some(observed_at);
        }
    }

    /// Current USD price of one unit of `symbol`
    pub fn rate(&self, symbol: &str) -> Result<Decimal, PaymentError> {
        self.rate_at(symbol, Utc::now())
    }

    pub fn rate_at(&self, symbol: &str, now: DateTime<Utc>) -> Result<Decimal, PaymentError> {
        let key = symbol.to_uppercase();
        let tick = self.prices.read().get(&key).copied();
        match tick {
            Some(t) if t.usd > Decimal::ZERO && now - t.observed_at <= self.ttl => Ok(t.usd),
            Some(t) => {
                tracing::warn!(
                    symbol = %key,
                    observed_at = %t.observed_at,
                    "price rejected (expired or non-positive)"
                );
                Err(PaymentError::RateUnavailable(key))
            }
            None => Err(PaymentError::RateUnavailable(key)),
        }
    }

    /// Time of the most recent price update
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read()
    }

    /// All cached prices sorted by symbol
    pub fn snapshot(&self) -> Vec<PriceView> {
        let now = Utc::now();
        let prices = self.prices.read();
        let mut out: Vec<PriceView> = prices
            .iter()
            .map(|(symbol, t)| PriceView {
                symbol: symbol.clone(),
                usd: t.usd,
                observed_at: t.observed_at,
                stale: now - t.observed_at > self.ttl,
            })
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Fetch latest USD prices for every catalog asset that has a CoinGecko id
    pub async fn refresh(&self, catalog: &AssetCatalog) -> Result<usize> {
        let ids: Vec<(&str, &str)> = catalog
            .iter()
            .filter_map(|a| a.coingecko_id.as_deref().map(|id| (id, a.symbol.as_str())))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let joined = ids.iter().map(|(id, _)| *id).collect::<Vec<_>>().join(",");
        tracing::debug!(ids = %joined, "refreshing price oracle");

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("ids", joined.as_str()), ("vs_currencies", "usd")])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch prices: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Price API returned status {}", response.status()));
        }

        let data: HashMap<String, CoinPrice> = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse price response: {}", e))?;

        Ok(self.apply_quotes(&ids, &data))
    }

    fn apply_quotes(&self, ids: &[(&str, &str)], data: &HashMap<String, CoinPrice>) -> usize {
        let now = Utc::now();
        let mut updated = 0;
        for (id, symbol) in ids {
            let usd = data
                .get(*id)
                .and_then(|p| p.usd)
                .and_then(|v| Decimal::try_from(v).ok())
                .filter(|v| *v > Decimal::ZERO);
            match usd {
                Some(usd) => {
                    self.set_price_at(symbol, usd, now);
                    tracing::debug!(symbol = %symbol, usd = %usd, "price updated");
                    updated += 1;
                }
                None => tracing::warn!(symbol = %symbol, "no usable price in response"),
            }
        }
        tracing::info!("✅ Price oracle refreshed: {}/{} assets", updated, ids.len());
        updated
    }
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    usd: Option<f64>,
}

/// Start background price refresh task
pub fn start_price_refresh_task(
    oracle: Arc<PriceOracle>,
    catalog: Arc<AssetCatalog>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Starting price oracle refresh task (interval: {}s)", interval_secs);

        let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = oracle.refresh(&catalog).await {
                tracing::warn!("Price oracle refresh failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::default_assets;

    fn oracle() -> PriceOracle {
        PriceOracle::offline(Duration::from_secs(300))
    }

    #[test]
    fn missing_price_fails_closed() {
        let oracle = oracle();
        assert_eq!(
            oracle.rate("btc"),
            Err(PaymentError::RateUnavailable("BTC".into()))
        );
    }

    #[test]
    fn expired_price_is_not_used() {
        let oracle = oracle();
        let now = Utc::now();
        oracle.set_price_at("BTC", Decimal::new(50_000, 0), now - chrono::Duration::seconds(301));
        assert!(oracle.rate_at("BTC", now).is_err());

        oracle.set_price_at("BTC", Decimal::new(51_000, 0), now - chrono::Duration::seconds(10));
        assert_eq!(oracle.rate_at("BTC", now), Ok(Decimal::new(51_000, 0)));
    }

    #[test]
    fn zero_price_is_unavailable() {
        let oracle = oracle();
        oracle.set_price("ETH", Decimal::ZERO);
        assert!(oracle.rate("ETH").is_err());
    }

    #[test]
    fn quotes_update_known_symbols_only() {
        let oracle = oracle();
        let catalog = AssetCatalog::new(default_assets());
        let ids: Vec<(&str, &str)> = catalog
            .iter()
            .filter_map(|a| a.coingecko_id.as_deref().map(|id| (id, a.symbol.as_str())))
            .collect();
        let data: HashMap<String, CoinPrice> = serde_json::from_str(
            r#"{"bitcoin":{"usd":50000.5},"ethereum":{"usd":-1},"tether":{}}"#,
        )
        .unwrap();

        assert_eq!(oracle.apply_quotes(&ids, &data), 1);
        assert_eq!(oracle.rate("BTC").unwrap(), "50000.5".parse::<Decimal>().unwrap());
        assert!(oracle.rate("ETH").is_err());
        assert!(oracle.rate("USDT").is_err());
        assert!(oracle.last_update().is_some());
    }

    #[test]
    fn snapshot_flags_stale_prices() {
        let oracle = oracle();
        oracle.set_price("SOL", Decimal::new(150, 0));
        oracle.set_price_at("BTC", Decimal::new(50_000, 0), Utc::now() - chrono::Duration::hours(1));
        let snap = oracle.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].symbol, "BTC");
        assert!(snap[0].stale);
        assert!(!snap[1].stale);
    }

    /// Minimal HTTP endpoint answering every request with `body`
    async fn serve_prices(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{}/api/v3/simple/price", addr)
    }

    #[tokio::test]
    async fn refresh_task_fills_prices_from_endpoint() {
        let url = serve_prices(r#"{"bitcoin":{"usd":50000.5},"solana":{"usd":150}}"#).await;
        let oracle = Arc::new(PriceOracle::new(reqwest::Client::new(), url, Duration::from_secs(300)));
        let catalog = Arc::new(AssetCatalog::new(default_assets()));

        let handle = start_price_refresh_task(oracle.clone(), catalog, 1);
        time::timeout(Duration::from_secs(5), async {
            while oracle.rate("BTC").is_err() {
                time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("refresh task never updated BTC");
        handle.abort();

        assert_eq!(oracle.rate("BTC").unwrap(), "50000.5".parse::<Decimal>().unwrap());
        assert_eq!(oracle.rate("SOL").unwrap(), Decimal::new(150, 0));
        assert!(oracle.rate("ETH").is_err());
    }

    #[cfg(feature = "live-prices-tests")]
    #[tokio::test]
    async fn live_refresh_fills_default_catalog() {
        let oracle = oracle();
        let catalog = AssetCatalog::new(default_assets());
        let updated = oracle.refresh(&catalog).await.unwrap();
        assert!(updated > 0);
        assert!(oracle.rate("BTC").is_ok());
    }
}
