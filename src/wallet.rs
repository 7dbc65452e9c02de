//! In-process crypto wallet
//!
//! Per-asset balances plus the spending PIN. Balances are whole units of each
//! asset held as exact decimals.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::PaymentError;

pub struct Wallet {
    id: String,
    balances: RwLock<BTreeMap<String, Decimal>>,
    pin_digest: RwLock<Option<String>>,
}

impl Wallet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            balances: RwLock::new(BTreeMap::new()),
            pin_digest: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self, symbol: &str) -> Decimal {
        let b = self.balances.read();
        b.get(&symbol.to_uppercase()).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> BTreeMap<String, Decimal> {
        self.balances.read().clone()
    }

    pub fn credit(&self, symbol: &str, amount: Decimal) {
        let mut b = self.balances.write();
        *b.entry(symbol.to_uppercase()).or_default() += amount;
    }

    pub fn debit(&self, symbol: &str, amount: Decimal) -> Result<(), PaymentError> {
        let symbol = symbol.to_uppercase();
        let mut b = self.balances.write();
        let e = b.entry(symbol.clone()).or_default();
        if *e < amount {
            return Err(PaymentError::InsufficientBalance {
                symbol,
                required: amount,
                available: *e,
            });
        }
        *e -= amount;
        Ok(())
    }

    pub fn set_pin(&self, pin: &str) {
        *self.pin_digest.write() = Some(pin_digest(&self.id, pin));
    }

    pub fn has_pin(&self) -> bool {
        self.pin_digest.read().is_some()
    }

    /// Empty PINs never verify, nor does anything when no PIN is set.
    pub fn verify_pin(&self, pin: &str) -> bool {
        if pin.is_empty() {
            return false;
        }
        match self.pin_digest.read().as_deref() {
            Some(stored) => stored == pin_digest(&self.id, pin),
            None => false,
        }
    }
}

fn pin_digest(wallet_id: &str, pin: &str) -> String {
    let mut h = Sha256::new();
    h.update(wallet_id.as_bytes());
    h.update(b":");
    h.update(pin.as_bytes());
    hex::encode(h.finalize())
}
