//! Vision Pay
//!
//! Crypto payment flow for marketplace purchases, freelance work, tips,
//! subscriptions, rewards and peer-to-peer transfers: list the assets a
//! wallet can pay with, price a USD amount in the chosen asset, check the
//! balance covers it, and execute the transfer at most once per submission.

pub mod app_state;
pub mod assets;
pub mod calculator;
pub mod config;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod metrics;
pub mod modal;
pub mod options;
pub mod oracle;
pub mod processor;
pub mod types;
pub mod wallet;

pub use calculator::{can_afford, CostCalculator};
pub use error::{ErrorKind, PaymentError};
pub use flow::{FlowEvent, FlowState, Selection, Step, TransitionError};
pub use modal::{ModalError, PaymentModal};
pub use options::{OptionsProvider, WalletOptionsProvider};
pub use processor::{PaymentProcessor, WalletPaymentProcessor};
pub use types::{
    CostBreakdown, CryptoPayment, CryptoPaymentOption, PaymentPurpose, PaymentRequest,
    PaymentStatus, RequestId,
};
