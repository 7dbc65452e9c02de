//! Payment errors
//!
//! Every failure the payment flow can surface to a user. Messages are shown
//! verbatim on the error screen, so they are written for people, not logs.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Failed to load payment options: {0}")]
    LoadFailed(String),

    #[error("Payment amount must be greater than zero (got ${0})")]
    InvalidAmount(Decimal),

    #[error("Payment option {0} is not supported")]
    UnknownOption(String),

    #[error("Exchange rate for {0} is unavailable, payments are paused")]
    RateUnavailable(String),

    #[error("Insufficient {symbol} balance: need {required}, have {available}")]
    InsufficientBalance {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Price for {symbol} changed: confirmed {quoted}, now {current}")]
    QuoteChanged {
        symbol: String,
        quoted: Decimal,
        current: Decimal,
    },

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Network error: {0}")]
    Network(String),

    #[error("A payment for this submission is already in progress")]
    DuplicateSubmission,

    #[error("Payment ledger error: {0}")]
    Ledger(String),
}

/// How an error is presented by the modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Options could not be fetched; the modal shows a generic load failure.
    Load,
    /// Shown next to the selected option, the user can pick something else.
    Inline,
    /// Ends the attempt on the error screen with a retry action.
    Terminal,
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::LoadFailed(_) => ErrorKind::Load,
            PaymentError::InsufficientBalance { .. }
            | PaymentError::RateUnavailable(_)
            | PaymentError::QuoteChanged { .. }
            | PaymentError::UnknownOption(_)
            | PaymentError::InvalidAmount(_) => ErrorKind::Inline,
            PaymentError::InvalidPin
            | PaymentError::Network(_)
            | PaymentError::DuplicateSubmission
            | PaymentError::Ledger(_) => ErrorKind::Terminal,
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentError::LoadFailed(_) => "load_failed",
            PaymentError::InvalidAmount(_) => "invalid_amount",
            PaymentError::UnknownOption(_) => "unknown_option",
            PaymentError::RateUnavailable(_) => "rate_unavailable",
            PaymentError::InsufficientBalance { .. } => "insufficient_balance",
            PaymentError::QuoteChanged { .. } => "quote_changed",
            PaymentError::InvalidPin => "invalid_pin",
            PaymentError::Network(_) => "network",
            PaymentError::DuplicateSubmission => "duplicate",
            PaymentError::Ledger(_) => "ledger",
        }
    }
}

impl From<sled::Error> for PaymentError {
    fn from(e: sled::Error) -> Self {
        PaymentError::Ledger(e.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(e: serde_json::Error) -> Self {
        PaymentError::Ledger(format!("serialization error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pin_message_is_exact() {
        assert_eq!(PaymentError::InvalidPin.to_string(), "Invalid PIN");
    }

    #[test]
    fn insufficient_balance_is_inline() {
        let err = PaymentError::InsufficientBalance {
            symbol: "BTC".into(),
            required: Decimal::new(102, 4),
            available: Decimal::new(1, 3),
        };
        assert_eq!(err.kind(), ErrorKind::Inline);
        assert_eq!(
            err.to_string(),
            "Insufficient BTC balance: need 0.0102, have 0.001"
        );
        assert_eq!(PaymentError::Network("timeout".into()).kind(), ErrorKind::Terminal);
    }
}
