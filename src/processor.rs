//! Payment processing
//!
//! Executes a transfer for one user submission. A submission is identified by
//! its [`RequestId`]: a completed id replays the stored record and an id that
//! is still in flight is refused, so at most one payment runs per submission.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::calculator::CostCalculator;
use crate::error::PaymentError;
use crate::ledger::{LedgerEntry, PaymentLedger};
use crate::metrics;
use crate::types::{CostBreakdown, CryptoPayment, PaymentRequest, PaymentStatus, RequestId};
use crate::wallet::Wallet;

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
        option_id: &str,
        pin: &str,
        request_id: RequestId,
        quote: Option<CostBreakdown>,
    ) -> Result<CryptoPayment, PaymentError>;
}

#[async_trait]
impl<T: PaymentProcessor + ?Sized> PaymentProcessor for Arc<T> {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
        option_id: &str,
        pin: &str,
        request_id: RequestId,
        quote: Option<CostBreakdown>,
    ) -> Result<CryptoPayment, PaymentError> {
        (**self)
            .process_payment(request, option_id, pin, request_id, quote)
            .await
    }
}

/// A debited transfer ready to go on chain
#[derive(Debug, Clone)]
pub struct OutgoingTransfer {
    pub request_id: RequestId,
    pub wallet_id: String,
    pub symbol: String,
    pub amount: Decimal,
    pub network_fee: Decimal,
}

/// Hands a transfer to the network and returns its transaction hash
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, transfer: &OutgoingTransfer) -> Result<String, PaymentError>;
}

/// Settles inside the node; the hash is derived from the transfer itself
pub struct LocalBroadcaster;

#[async_trait]
impl Broadcaster for LocalBroadcaster {
    async fn broadcast(&self, transfer: &OutgoingTransfer) -> Result<String, PaymentError> {
        let mut h = Sha256::new();
        h.update(transfer.request_id.as_uuid().as_bytes());
        h.update(transfer.wallet_id.as_bytes());
        h.update(transfer.symbol.as_bytes());
        h.update(transfer.amount.to_string().as_bytes());
        h.update(transfer.network_fee.to_string().as_bytes());
        Ok(format!("0x{}", hex::encode(h.finalize())))
    }
}

/// Removes the in-flight marker however processing ends
struct InFlight<'a> {
    map: &'a DashMap<RequestId, ()>,
    id: RequestId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}

pub struct WalletPaymentProcessor {
    wallet: Arc<Wallet>,
    calculator: CostCalculator,
    ledger: PaymentLedger,
    broadcaster: Arc<dyn Broadcaster>,
    in_flight: DashMap<RequestId, ()>,
    /// Broadcast payments whose ledger write failed, kept so a replay of the
    /// same id still returns them instead of paying again
    unrecorded: DashMap<RequestId, CryptoPayment>,
}

impl WalletPaymentProcessor {
    pub fn new(wallet: Arc<Wallet>, calculator: CostCalculator, ledger: PaymentLedger) -> Self {
        Self::with_broadcaster(wallet, calculator, ledger, Arc::new(LocalBroadcaster))
    }

    pub fn with_broadcaster(
        wallet: Arc<Wallet>,
        calculator: CostCalculator,
        ledger: PaymentLedger,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            wallet,
            calculator,
            ledger,
            broadcaster,
            in_flight: DashMap::new(),
            unrecorded: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    fn completed(&self, request_id: &RequestId) -> Result<Option<CryptoPayment>, PaymentError> {
        if let Some(p) = self.unrecorded.get(request_id) {
            return Ok(Some(p.clone()));
        }
        Ok(self.ledger.get(request_id)?.map(|e| e.payment))
    }

    async fn execute(
        &self,
        request: &PaymentRequest,
        option_id: &str,
        pin: &str,
        request_id: RequestId,
        quote: Option<CostBreakdown>,
    ) -> Result<CryptoPayment, PaymentError> {
        if !self.wallet.has_pin() || !self.wallet.verify_pin(pin) {
            return Err(PaymentError::InvalidPin);
        }

        let cost = self.calculator.calculate_total_cost(request.amount_usd(), option_id)?;
        let asset = self
            .calculator
            .catalog()
            .get(option_id)
            .ok_or_else(|| PaymentError::UnknownOption(option_id.to_string()))?;
        let symbol = asset.symbol.clone();

        // never debit more or less than the user confirmed
        if let Some(q) = quote {
            if q.total_crypto != cost.total_crypto {
                return Err(PaymentError::QuoteChanged {
                    symbol,
                    quoted: q.total_crypto,
                    current: cost.total_crypto,
                });
            }
        }

        // debit first, refund on broadcast failure
        self.wallet.debit(&symbol, cost.total_crypto)?;

        let transfer = OutgoingTransfer {
            request_id,
            wallet_id: self.wallet.id().to_string(),
            symbol: symbol.clone(),
            amount: cost.crypto_amount,
            network_fee: cost.network_fee,
        };
        let tx_hash = match self.broadcaster.broadcast(&transfer).await {
            Ok(h) => h,
            Err(e) => {
                self.wallet.credit(&symbol, cost.total_crypto);
                tracing::warn!(request_id = %request_id, "broadcast failed, debit reverted: {}", e);
                return Err(match e {
                    PaymentError::Network(_) => e,
                    other => PaymentError::Network(other.to_string()),
                });
            }
        };

        let now = Utc::now();
        let entry = LedgerEntry {
            wallet_id: self.wallet.id().to_string(),
            purpose: request.purpose(),
            amount_usd: request.amount_usd(),
            network_fee: cost.network_fee,
            payment: CryptoPayment {
                transaction_hash: tx_hash,
                crypto_amount: cost.crypto_amount,
                crypto_currency: symbol,
                status: PaymentStatus::Confirmed,
                request_id,
                created_at: now,
            },
            recorded_at: now,
        };
        match self.ledger.record(&entry) {
            Ok(stored) => Ok(stored.payment),
            Err(e) => {
                // funds already left the wallet; report the payment, not the bookkeeping
                tracing::error!(
                    request_id = %request_id,
                    tx = %entry.payment.transaction_hash,
                    "payment broadcast but not recorded in ledger: {}",
                    e
                );
                self.unrecorded.insert(request_id, entry.payment.clone());
                Ok(entry.payment)
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for WalletPaymentProcessor {
    async fn process_payment(
        &self,
        request: &PaymentRequest,
        option_id: &str,
        pin: &str,
        request_id: RequestId,
        quote: Option<CostBreakdown>,
    ) -> Result<CryptoPayment, PaymentError> {
        if let Some(done) = self.completed(&request_id)? {
            tracing::info!(request_id = %request_id, "replayed submission, returning stored payment");
            return Ok(done);
        }

        if self.in_flight.insert(request_id, ()).is_some() {
            tracing::warn!(request_id = %request_id, "duplicate submission refused");
            metrics::record_failure(PaymentError::DuplicateSubmission.label());
            return Err(PaymentError::DuplicateSubmission);
        }
        let _guard = InFlight {
            map: &self.in_flight,
            id: request_id,
        };
        // a concurrent holder may have finished between the lookup and the insert
        if let Some(done) = self.completed(&request_id)? {
            return Ok(done);
        }

        match self.execute(request, option_id, pin, request_id, quote).await {
            Ok(payment) => {
                metrics::record_success(request.amount_usd());
                tracing::info!(
                    request_id = %request_id,
                    purpose = %request.purpose(),
                    amount = %payment.crypto_amount,
                    currency = %payment.crypto_currency,
                    tx = %payment.transaction_hash,
                    "💸 payment completed"
                );
                Ok(payment)
            }
            Err(e) => {
                metrics::record_failure(e.label());
                tracing::warn!(request_id = %request_id, reason = e.label(), "payment failed: {}", e);
                Err(e)
            }
        }
    }
}
