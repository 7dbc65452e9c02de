//! Payment data model
//!
//! Requests, the options a wallet can pay with, computed costs and the
//! resulting payment records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::PaymentError;

/// Business context a payment was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPurpose {
    Marketplace,
    Freelance,
    Tip,
    Subscription,
    Reward,
    P2p,
}

impl PaymentPurpose {
    pub const ALL: [PaymentPurpose; 6] = [
        PaymentPurpose::Marketplace,
        PaymentPurpose::Freelance,
        PaymentPurpose::Tip,
        PaymentPurpose::Subscription,
        PaymentPurpose::Reward,
        PaymentPurpose::P2p,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::Marketplace => "marketplace",
            PaymentPurpose::Freelance => "freelance",
            PaymentPurpose::Tip => "tip",
            PaymentPurpose::Subscription => "subscription",
            PaymentPurpose::Reward => "reward",
            PaymentPurpose::P2p => "p2p",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "marketplace" => Some(PaymentPurpose::Marketplace),
            "freelance" => Some(PaymentPurpose::Freelance),
            "tip" => Some(PaymentPurpose::Tip),
            "subscription" => Some(PaymentPurpose::Subscription),
            "reward" => Some(PaymentPurpose::Reward),
            "p2p" => Some(PaymentPurpose::P2p),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A USD-denominated payment a user wants to settle in crypto.
///
/// Fields are private; a request cannot change once it has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    amount_usd: Decimal,
    purpose: PaymentPurpose,
    description: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount_usd: Decimal, purpose: PaymentPurpose) -> Result<Self, PaymentError> {
        if amount_usd <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(amount_usd));
        }
        Ok(Self {
            amount_usd,
            purpose,
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn amount_usd(&self) -> Decimal {
        self.amount_usd
    }

    pub fn purpose(&self) -> PaymentPurpose {
        self.purpose
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// One asset the user can pay with, as shown when the modal opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoPaymentOption {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub icon: String,
    /// Wallet balance in whole units of the asset
    pub balance: Decimal,
    /// Network fee charged for a transfer, in USD
    pub network_fee_usd: Decimal,
    /// Human readable estimate, e.g. "10-60 minutes"
    pub confirmation_time: String,
}

/// Result of pricing a USD amount in a given asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Payment amount in the asset
    pub crypto_amount: Decimal,
    /// Network fee in the asset
    pub network_fee: Decimal,
    /// crypto_amount + network_fee
    pub total_crypto: Decimal,
    /// Payment amount plus network fee, in USD
    pub total_usd: Decimal,
    /// USD price of one unit used for the conversion
    pub rate_usd: Decimal,
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Confirmed => write!(f, "confirmed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Client generated id for one user submission; the processor never executes
/// two payments for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a successful processing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoPayment {
    pub transaction_hash: String,
    pub crypto_amount: Decimal,
    pub crypto_currency: String,
    pub status: PaymentStatus,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_non_positive_amounts() {
        assert_eq!(
            PaymentRequest::new(Decimal::ZERO, PaymentPurpose::Tip),
            Err(PaymentError::InvalidAmount(Decimal::ZERO))
        );
        assert!(PaymentRequest::new(Decimal::new(-5, 0), PaymentPurpose::Tip).is_err());

        let req = PaymentRequest::new(Decimal::new(50, 0), PaymentPurpose::Marketplace)
            .unwrap()
            .with_description("Vintage camera");
        assert_eq!(req.amount_usd(), Decimal::new(50, 0));
        assert_eq!(req.description(), Some("Vintage camera"));
    }

    #[test]
    fn purpose_parses_case_insensitively() {
        assert_eq!(PaymentPurpose::from_str("P2P"), Some(PaymentPurpose::P2p));
        assert_eq!(PaymentPurpose::from_str(" Tip "), Some(PaymentPurpose::Tip));
        assert_eq!(PaymentPurpose::from_str("gift"), None);
        for p in PaymentPurpose::ALL {
            assert_eq!(PaymentPurpose::from_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn purpose_serializes_lowercase() {
        let json = serde_json::to_string(&PaymentPurpose::Freelance).unwrap();
        assert_eq!(json, "\"freelance\"");
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
