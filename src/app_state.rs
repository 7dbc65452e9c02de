use anyhow::{Context, Result};
use std::sync::Arc;

use crate::assets::AssetCatalog;
use crate::calculator::CostCalculator;
use crate::config::PayConfig;
use crate::ledger::PaymentLedger;
use crate::modal::PaymentModal;
use crate::options::WalletOptionsProvider;
use crate::oracle::{start_price_refresh_task, PriceOracle};
use crate::processor::WalletPaymentProcessor;
use crate::types::PaymentRequest;
use crate::wallet::Wallet;

pub type Modal = PaymentModal<Arc<WalletOptionsProvider>, Arc<WalletPaymentProcessor>>;

/// Everything a payment needs, wired from one config
pub struct AppState {
    pub wallet: Arc<Wallet>,
    pub catalog: Arc<AssetCatalog>,
    pub oracle: Arc<PriceOracle>,
    pub calculator: CostCalculator,
    pub options: Arc<WalletOptionsProvider>,
    pub processor: Arc<WalletPaymentProcessor>,
}

impl AppState {
    pub fn from_config(cfg: &PayConfig) -> Result<Self> {
        let wallet = Arc::new(Wallet::new(cfg.wallet.id.clone()));
        for (symbol, amount) in &cfg.wallet.balances {
            wallet.credit(symbol, *amount);
        }
        if let Some(pin) = cfg.wallet.pin.as_deref() {
            wallet.set_pin(pin);
        }
        if !wallet.has_pin() {
            tracing::warn!("⚠️  no wallet PIN configured, payments will be refused");
        }

        let catalog = Arc::new(AssetCatalog::new(cfg.assets.clone()));

        let http = reqwest::Client::builder()
            .user_agent(concat!("vision-pay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        let oracle = Arc::new(PriceOracle::new(
            http,
            cfg.oracle.price_url.clone(),
            cfg.oracle.rate_ttl(),
        ));
        for (symbol, usd) in &cfg.oracle.static_prices {
            oracle.set_price(symbol, *usd);
        }

        let ledger = match &cfg.ledger_path {
            Some(path) => PaymentLedger::open(path)
                .with_context(|| format!("open payment ledger at {}", path.display()))?,
            None => PaymentLedger::temporary().context("open in-memory payment ledger")?,
        };

        let calculator = CostCalculator::new(oracle.clone(), catalog.clone());
        let options = Arc::new(WalletOptionsProvider::new(wallet.clone(), catalog.clone()));
        let processor = Arc::new(WalletPaymentProcessor::new(
            wallet.clone(),
            calculator.clone(),
            ledger,
        ));

        Ok(Self {
            wallet,
            catalog,
            oracle,
            calculator,
            options,
            processor,
        })
    }

    /// A fresh modal for one payment request
    pub fn modal(&self, request: PaymentRequest) -> Modal {
        PaymentModal::new(
            request,
            self.options.clone(),
            self.processor.clone(),
            self.calculator.clone(),
        )
    }

    /// Keep the oracle current in the background
    pub fn start_price_refresh(&self, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        start_price_refresh_task(self.oracle.clone(), self.catalog.clone(), interval_secs)
    }

    pub fn ledger(&self) -> &PaymentLedger {
        self.processor.ledger()
    }
}
