//! Payment modal controller
//!
//! Drives [`FlowState`] from user actions: loads options when opened, prices
//! the chosen option, runs exactly one processing attempt per submission and
//! clears transient state (PIN, errors) on close.

use crate::calculator::{can_afford, CostCalculator};
use crate::error::{ErrorKind, PaymentError};
use crate::flow::{FlowEvent, FlowState, Selection, TransitionError};
use crate::options::OptionsProvider;
use crate::processor::PaymentProcessor;
use crate::types::{CryptoPayment, CryptoPaymentOption, PaymentRequest, RequestId};

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load payment options";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModalError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct PaymentModal<O, P> {
    request: PaymentRequest,
    provider: O,
    processor: P,
    calculator: CostCalculator,
    options: Vec<CryptoPaymentOption>,
    load_error: Option<String>,
    alert: Option<String>,
    state: FlowState,
    is_open: bool,
}

impl<O: OptionsProvider, P: PaymentProcessor> PaymentModal<O, P> {
    pub fn new(request: PaymentRequest, provider: O, processor: P, calculator: CostCalculator) -> Self {
        Self {
            request,
            provider,
            processor,
            calculator,
            options: Vec::new(),
            load_error: None,
            alert: None,
            state: FlowState::default(),
            is_open: false,
        }
    }

    pub fn request(&self) -> &PaymentRequest {
        &self.request
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn options(&self) -> &[CryptoPaymentOption] {
        &self.options
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Inline message next to the selected option (e.g. insufficient balance)
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn can_submit(&self) -> bool {
        self.state.can_submit()
    }

    fn apply(&mut self, event: FlowEvent) -> Result<&FlowState, ModalError> {
        let next = self.state.transition(event)?;
        tracing::debug!(from = ?self.state.step(), to = ?next.step(), "payment flow transition");
        self.state = next;
        Ok(&self.state)
    }

    /// Open the modal and fetch fresh options
    pub async fn open(&mut self) -> Result<&[CryptoPaymentOption], ModalError> {
        if matches!(self.state, FlowState::Processing { .. }) {
            return Err(TransitionError::InFlight.into());
        }
        self.state = FlowState::default();
        self.alert = None;
        self.is_open = true;

        self.reload_options().await?;
        Ok(&self.options)
    }

    async fn reload_options(&mut self) -> Result<(), ModalError> {
        match self.provider.available_options().await {
            Ok(options) => {
                self.options = options;
                self.load_error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("payment options failed to load: {}", e);
                self.options.clear();
                self.load_error = Some(LOAD_FAILED_MESSAGE.to_string());
                Err(e.into())
            }
        }
    }

    /// Price the option and make it the current selection
    pub fn select(&mut self, option_id: &str) -> Result<&FlowState, ModalError> {
        if !matches!(self.state, FlowState::Select { .. }) {
            return Err(TransitionError::NotAllowed {
                event: "choose",
                step: self.state.step(),
            }
            .into());
        }
        let option = self
            .options
            .iter()
            .find(|o| o.id.eq_ignore_ascii_case(option_id))
            .cloned()
            .ok_or_else(|| PaymentError::UnknownOption(option_id.to_string()))?;

        let cost = match self
            .calculator
            .calculate_total_cost(self.request.amount_usd(), &option.id)
        {
            Ok(cost) => cost,
            Err(e) => {
                // never leave a previously priced selection behind on a failed re-price
                self.state = FlowState::default();
                self.alert = Some(e.to_string());
                return Err(e.into());
            }
        };

        let affordable = can_afford(&option, &cost);
        let alert = (!affordable).then(|| {
            PaymentError::InsufficientBalance {
                symbol: option.symbol.clone(),
                required: cost.total_crypto,
                available: option.balance,
            }
            .to_string()
        });

        self.apply(FlowEvent::Choose(Selection {
            option,
            cost,
            can_afford: affordable,
        }))?;
        self.alert = alert;
        Ok(&self.state)
    }

    /// select -> confirm
    pub fn proceed(&mut self) -> Result<&FlowState, ModalError> {
        self.apply(FlowEvent::Continue)
    }

    pub fn back(&mut self) -> Result<&FlowState, ModalError> {
        self.apply(FlowEvent::Back)
    }

    pub fn enter_pin(&mut self, pin: &str) -> Result<&FlowState, ModalError> {
        self.apply(FlowEvent::EnterPin(pin.to_string()))
    }

    /// One processing attempt for the current confirmation. Returns the
    /// resulting terminal state; a processor failure is reported through the
    /// error state, not as `Err`.
    pub async fn submit(&mut self) -> Result<&FlowState, ModalError> {
        let pin = self.state.pin().unwrap_or_default().to_string();
        let request_id = RequestId::new();
        self.apply(FlowEvent::Submit(request_id))?;

        let (option_id, quote) = match self.state.selection() {
            Some(s) => (s.option.id.clone(), s.cost),
            None => return Err(TransitionError::NothingSelected.into()),
        };

        let event = match self
            .processor
            .process_payment(&self.request, &option_id, &pin, request_id, Some(quote))
            .await
        {
            Ok(payment) => FlowEvent::Resolved(payment),
            Err(e) => {
                if e.kind() == ErrorKind::Inline {
                    self.alert = Some(e.to_string());
                }
                FlowEvent::Rejected(e.to_string())
            }
        };
        self.apply(event)
    }

    /// error -> select with all transient state cleared
    pub async fn retry(&mut self) -> Result<&FlowState, ModalError> {
        self.apply(FlowEvent::Retry)?;
        self.alert = None;
        // balances may have moved since the failed attempt
        self.reload_options().await?;
        Ok(&self.state)
    }

    /// Close the modal, discarding PIN, alerts and errors
    pub fn close(&mut self) -> Result<Option<CryptoPayment>, ModalError> {
        let completed = match &self.state {
            FlowState::Success { payment } => Some(payment.clone()),
            _ => None,
        };
        self.apply(FlowEvent::Close)?;
        self.alert = None;
        self.load_error = None;
        self.is_open = false;
        Ok(completed)
    }
}
