//! Payment ledger
//!
//! Persists every completed payment in sled, keyed by the submission's
//! request id. The processor consults it before executing so a replayed
//! submission returns the original record instead of paying twice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

use crate::error::PaymentError;
use crate::types::{CryptoPayment, PaymentPurpose, RequestId};

const PAYMENTS_TREE: &str = "crypto_payments";

/// One completed payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub wallet_id: String,
    pub purpose: PaymentPurpose,
    pub amount_usd: Decimal,
    pub network_fee: Decimal,
    pub payment: CryptoPayment,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PaymentLedger {
    db: Db,
}

impl PaymentLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PaymentError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Ledger that lives only as long as the process
    pub fn temporary() -> Result<Self, PaymentError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn get(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>, PaymentError> {
        let tree = self.db.open_tree(PAYMENTS_TREE)?;
        match tree.get(request_id.as_uuid().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store an entry; an existing entry for the same request id is kept and
    /// returned instead.
    pub fn record(&self, entry: &LedgerEntry) -> Result<LedgerEntry, PaymentError> {
        let tree = self.db.open_tree(PAYMENTS_TREE)?;
        let key = entry.payment.request_id.as_uuid().as_bytes().to_vec();
        let bytes = serde_json::to_vec(entry)?;

        match tree.compare_and_swap(key, None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => {
                tree.flush()?;
                Ok(entry.clone())
            }
            Err(cas) => {
                let current = cas
                    .current
                    .ok_or_else(|| PaymentError::Ledger("entry vanished during insert".into()))?;
                Ok(serde_json::from_slice(&current)?)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, request_id: &RequestId, bytes: &[u8]) -> Result<(), PaymentError> {
        let tree = self.db.open_tree(PAYMENTS_TREE)?;
        tree.insert(request_id.as_uuid().as_bytes(), bytes)?;
        Ok(())
    }

    /// Entries newest first, optionally filtered by purpose
    pub fn history(&self, purpose: Option<PaymentPurpose>) -> Result<Vec<LedgerEntry>, PaymentError> {
        let tree = self.db.open_tree(PAYMENTS_TREE)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, bytes) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&bytes)?;
            if purpose.map_or(true, |p| p == entry.purpose) {
                out.push(entry);
            }
        }
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(out)
    }

    /// USD paid per purpose, e.g. total tips sent
    pub fn totals_by_purpose(&self) -> Result<Vec<(PaymentPurpose, Decimal)>, PaymentError> {
        let entries = self.history(None)?;
        Ok(PaymentPurpose::ALL
            .iter()
            .map(|p| {
                let sum: Decimal = entries
                    .iter()
                    .filter(|e| e.purpose == *p)
                    .map(|e| e.amount_usd)
                    .sum();
                (*p, sum)
            })
            .filter(|(_, sum)| !sum.is_zero())
            .collect())
    }
}
