//! Payment options
//!
//! Lists every asset the wallet can pay with, in catalog order, with the
//! current balance and network fee metadata. Read-only.

use async_trait::async_trait;
use std::sync::Arc;

use crate::assets::AssetCatalog;
use crate::error::PaymentError;
use crate::types::CryptoPaymentOption;
use crate::wallet::Wallet;

#[async_trait]
pub trait OptionsProvider: Send + Sync {
    async fn available_options(&self) -> Result<Vec<CryptoPaymentOption>, PaymentError>;
}

/// Options backed by the local wallet and asset catalog
pub struct WalletOptionsProvider {
    wallet: Arc<Wallet>,
    catalog: Arc<AssetCatalog>,
}

impl WalletOptionsProvider {
    pub fn new(wallet: Arc<Wallet>, catalog: Arc<AssetCatalog>) -> Self {
        Self { wallet, catalog }
    }
}

#[async_trait]
impl OptionsProvider for WalletOptionsProvider {
    async fn available_options(&self) -> Result<Vec<CryptoPaymentOption>, PaymentError> {
        if self.catalog.is_empty() {
            return Err(PaymentError::LoadFailed("no payment assets configured".into()));
        }

        let options: Vec<CryptoPaymentOption> = self
            .catalog
            .iter()
            .map(|a| CryptoPaymentOption {
                id: a.id.clone(),
                name: a.name.clone(),
                symbol: a.symbol.clone(),
                icon: a.icon.clone(),
                balance: self.wallet.balance(&a.symbol),
                network_fee_usd: a.network_fee_usd,
                confirmation_time: a.confirmation_time.clone(),
            })
            .collect();

        tracing::debug!(wallet = %self.wallet.id(), count = options.len(), "payment options loaded");
        Ok(options)
    }
}

#[async_trait]
impl<T: OptionsProvider + ?Sized> OptionsProvider for Arc<T> {
    async fn available_options(&self) -> Result<Vec<CryptoPaymentOption>, PaymentError> {
        (**self).available_options().await
    }
}
