//! Cost calculation and affordability
//!
//! Prices a USD amount in a chosen asset. Amounts are rounded up at the
//! asset's settlement precision so the payer never under-pays, and the total
//! is the exact sum of the rounded parts.

use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use crate::assets::{AssetCatalog, AssetConfig};
use crate::error::PaymentError;
use crate::oracle::PriceOracle;
use crate::types::{CostBreakdown, CryptoPaymentOption};

#[derive(Clone)]
pub struct CostCalculator {
    oracle: Arc<PriceOracle>,
    catalog: Arc<AssetCatalog>,
}

impl CostCalculator {
    pub fn new(oracle: Arc<PriceOracle>, catalog: Arc<AssetCatalog>) -> Self {
        Self { oracle, catalog }
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn oracle(&self) -> &PriceOracle {
        &self.oracle
    }

    /// Crypto amount, network fee and totals for paying `amount_usd` with `option_id`
    pub fn calculate_total_cost(
        &self,
        amount_usd: Decimal,
        option_id: &str,
    ) -> Result<CostBreakdown, PaymentError> {
        if amount_usd <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount_usd));
        }
        let asset = self
            .catalog
            .get(option_id)
            .ok_or_else(|| PaymentError::UnknownOption(option_id.to_string()))?;
        let rate = self.oracle.rate(&asset.symbol)?;
        let cost = price_in_asset(amount_usd, asset, rate)?;

        tracing::debug!(
            asset = %asset.symbol,
            amount_usd = %amount_usd,
            rate = %rate,
            total_crypto = %cost.total_crypto,
            "cost calculated"
        );
        Ok(cost)
    }
}

/// Pure conversion at a known rate. Amounts too large for a `Decimal` are
/// refused as invalid rather than wrapped or truncated.
pub fn price_in_asset(
    amount_usd: Decimal,
    asset: &AssetConfig,
    rate_usd: Decimal,
) -> Result<CostBreakdown, PaymentError> {
    if rate_usd <= Decimal::ZERO {
        return Err(PaymentError::RateUnavailable(asset.symbol.clone()));
    }
    let overflow = || PaymentError::InvalidAmount(amount_usd);
    let to_crypto = |usd: Decimal| -> Result<Decimal, PaymentError> {
        usd.checked_div(rate_usd)
            .map(|v| v.round_dp_with_strategy(asset.decimals, RoundingStrategy::AwayFromZero))
            .ok_or_else(overflow)
    };

    let crypto_amount = to_crypto(amount_usd)?;
    let network_fee = to_crypto(asset.network_fee_usd)?;
    let total_crypto = crypto_amount.checked_add(network_fee).ok_or_else(overflow)?;
    let total_usd = amount_usd
        .checked_add(asset.network_fee_usd)
        .ok_or_else(overflow)?;

    Ok(CostBreakdown {
        crypto_amount,
        network_fee,
        total_crypto,
        total_usd,
        rate_usd,
    })
}

/// Whether the option's balance covers the computed total. Exact decimal
/// comparison, no tolerance.
pub fn can_afford(option: &CryptoPaymentOption, cost: &CostBreakdown) -> bool {
    option.balance >= cost.total_crypto
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::default_assets;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn btc() -> AssetConfig {
        let mut a = default_assets().remove(0);
        a.network_fee_usd = d("10");
        a
    }

    fn option_with_balance(balance: &str) -> CryptoPaymentOption {
        let a = btc();
        CryptoPaymentOption {
            id: a.id,
            name: a.name,
            symbol: a.symbol,
            icon: a.icon,
            balance: d(balance),
            network_fee_usd: a.network_fee_usd,
            confirmation_time: a.confirmation_time,
        }
    }

    #[test]
    fn fifty_dollars_in_btc() {
        let cost = price_in_asset(d("50"), &btc(), d("50000")).unwrap();
        assert_eq!(cost.crypto_amount, d("0.001"));
        assert_eq!(cost.network_fee, d("0.0002"));
        assert_eq!(cost.total_crypto, d("0.0012"));
        assert_eq!(cost.total_usd, d("60"));
        assert!(can_afford(&option_with_balance("0.002"), &cost));
    }

    #[test]
    fn five_hundred_dollars_exceeds_small_balance() {
        let cost = price_in_asset(d("500"), &btc(), d("50000")).unwrap();
        assert_eq!(cost.total_crypto, d("0.0102"));
        assert!(!can_afford(&option_with_balance("0.001"), &cost));
    }

    #[test]
    fn rounds_up_at_asset_precision() {
        // 10 / 30000 = 0.000333333.. -> 0.00033334 at 8 places
        let cost = price_in_asset(d("10"), &btc(), d("30000")).unwrap();
        assert_eq!(cost.crypto_amount, d("0.00033334"));
        assert_eq!(cost.total_crypto, cost.crypto_amount + cost.network_fee);
    }

    #[test]
    fn total_is_sum_of_parts_across_amounts() {
        for asset in default_assets() {
            for amount in ["0.01", "1", "3", "19.99", "250", "12345.67"] {
                let cost = price_in_asset(d(amount), &asset, d("1234.5678")).unwrap();
                assert_eq!(cost.total_crypto, cost.crypto_amount + cost.network_fee);
                assert!(cost.crypto_amount * cost.rate_usd >= d(amount));
            }
        }
    }

    #[test]
    fn exact_balance_is_affordable() {
        let cost = price_in_asset(d("50"), &btc(), d("50000")).unwrap();
        assert!(can_afford(&option_with_balance("0.0012"), &cost));
        assert!(!can_afford(&option_with_balance("0.00119999"), &cost));
    }

    #[test]
    fn oversized_amounts_are_refused() {
        let usdt = default_assets().remove(2);
        assert_eq!(
            price_in_asset(Decimal::MAX, &usdt, Decimal::ONE),
            Err(PaymentError::InvalidAmount(Decimal::MAX))
        );
        // quotient itself does not fit
        assert_eq!(
            price_in_asset(Decimal::MAX, &btc(), d("0.5")),
            Err(PaymentError::InvalidAmount(Decimal::MAX))
        );
        assert_eq!(
            price_in_asset(d("50"), &btc(), Decimal::ZERO),
            Err(PaymentError::RateUnavailable("BTC".into()))
        );
    }

    #[test]
    fn calculator_fails_closed_without_rate() {
        let oracle = Arc::new(PriceOracle::offline(Duration::from_secs(60)));
        let calc = CostCalculator::new(oracle.clone(), Arc::new(AssetCatalog::new(vec![btc()])));

        assert_eq!(
            calc.calculate_total_cost(d("50"), "btc"),
            Err(PaymentError::RateUnavailable("BTC".into()))
        );
        assert_eq!(
            calc.calculate_total_cost(d("50"), "doge"),
            Err(PaymentError::UnknownOption("doge".into()))
        );
        assert_eq!(
            calc.calculate_total_cost(Decimal::ZERO, "btc"),
            Err(PaymentError::InvalidAmount(Decimal::ZERO))
        );

        oracle.set_price("BTC", d("50000"));
        assert_eq!(calc.calculate_total_cost(d("50"), "BTC").unwrap().total_crypto, d("0.0012"));
    }
}
