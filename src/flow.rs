//! Payment flow state machine
//!
//! `select -> confirm -> processing -> success | error`, as plain values.
//! [`FlowState::transition`] is pure: it never touches the current state and
//! returns either the next state or the reason the event was refused.

use serde::Serialize;
use thiserror::Error;

use crate::types::{CostBreakdown, CryptoPayment, CryptoPaymentOption, RequestId};

/// An option the user picked together with its priced cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub option: CryptoPaymentOption,
    pub cost: CostBreakdown,
    pub can_afford: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum FlowState {
    Select { selection: Option<Selection> },
    Confirm { selection: Selection, pin: String },
    Processing { selection: Selection, request_id: RequestId },
    Success { payment: CryptoPayment },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Select,
    Confirm,
    Processing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Pick (or re-pick) an option on the select screen
    Choose(Selection),
    /// Move from select to confirm
    Continue,
    /// Return from confirm to select, keeping the selection
    Back,
    EnterPin(String),
    /// Start processing under the given submission id
    Submit(RequestId),
    /// Processor resolved
    Resolved(CryptoPayment),
    /// Processor rejected; the message is shown as-is
    Rejected(String),
    /// Start over after an error
    Retry,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no payment option selected")]
    NothingSelected,
    #[error("a PIN is required")]
    PinRequired,
    #[error("balance does not cover the total cost")]
    CannotAfford,
    #[error("a payment is in progress and cannot be cancelled")]
    InFlight,
    #[error("{event} is not allowed during {step:?}")]
    NotAllowed { event: &'static str, step: Step },
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::Select { selection: None }
    }
}

impl FlowEvent {
    fn name(&self) -> &'static str {
        match self {
            FlowEvent::Choose(_) => "choose",
            FlowEvent::Continue => "continue",
            FlowEvent::Back => "back",
            FlowEvent::EnterPin(_) => "enter_pin",
            FlowEvent::Submit(_) => "submit",
            FlowEvent::Resolved(_) => "resolved",
            FlowEvent::Rejected(_) => "rejected",
            FlowEvent::Retry => "retry",
            FlowEvent::Close => "close",
        }
    }
}

impl FlowState {
    pub fn step(&self) -> Step {
        match self {
            FlowState::Select { .. } => Step::Select,
            FlowState::Confirm { .. } => Step::Confirm,
            FlowState::Processing { .. } => Step::Processing,
            FlowState::Success { .. } => Step::Success,
            FlowState::Error { .. } => Step::Error,
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        match self {
            FlowState::Select { selection } => selection.as_ref(),
            FlowState::Confirm { selection, .. } | FlowState::Processing { selection, .. } => {
                Some(selection)
            }
            _ => None,
        }
    }

    pub fn pin(&self) -> Option<&str> {
        match self {
            FlowState::Confirm { pin, .. } => Some(pin),
            _ => None,
        }
    }

    /// Whether the submit control is enabled
    pub fn can_submit(&self) -> bool {
        matches!(self, FlowState::Confirm { selection, pin } if selection.can_afford && !pin.is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Success { .. } | FlowState::Error { .. })
    }

    pub fn transition(&self, event: FlowEvent) -> Result<FlowState, TransitionError> {
        let refuse = |event: &FlowEvent| TransitionError::NotAllowed {
            event: event.name(),
            step: self.step(),
        };

        match (self, event) {
            (FlowState::Processing { .. }, FlowEvent::Close) => Err(TransitionError::InFlight),
            (_, FlowEvent::Close) => Ok(FlowState::default()),

            (FlowState::Select { .. }, FlowEvent::Choose(selection)) => Ok(FlowState::Select {
                selection: Some(selection),
            }),
            (FlowState::Select { selection }, FlowEvent::Continue) => match selection {
                Some(s) => Ok(FlowState::Confirm {
                    selection: s.clone(),
                    pin: String::new(),
                }),
                None => Err(TransitionError::NothingSelected),
            },

            (FlowState::Confirm { selection, .. }, FlowEvent::Back) => Ok(FlowState::Select {
                selection: Some(selection.clone()),
            }),
            (FlowState::Confirm { selection, .. }, FlowEvent::EnterPin(pin)) => {
                Ok(FlowState::Confirm {
                    selection: selection.clone(),
                    pin,
                })
            }
            (FlowState::Confirm { selection, pin }, FlowEvent::Submit(request_id)) => {
                if pin.is_empty() {
                    Err(TransitionError::PinRequired)
                } else if !selection.can_afford {
                    Err(TransitionError::CannotAfford)
                } else {
                    Ok(FlowState::Processing {
                        selection: selection.clone(),
                        request_id,
                    })
                }
            }

            (FlowState::Processing { .. }, FlowEvent::Resolved(payment)) => {
                Ok(FlowState::Success { payment })
            }
            (FlowState::Processing { .. }, FlowEvent::Rejected(message)) => {
                Ok(FlowState::Error { message })
            }

            (FlowState::Error { .. }, FlowEvent::Retry) => Ok(FlowState::default()),

            (_, event) => Err(refuse(&event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn selection(can_afford: bool) -> Selection {
        Selection {
            option: CryptoPaymentOption {
                id: "btc".into(),
                name: "Bitcoin".into(),
                symbol: "BTC".into(),
                icon: "₿".into(),
                balance: Decimal::new(2, 3),
                network_fee_usd: Decimal::new(10, 0),
                confirmation_time: "10-60 minutes".into(),
            },
            cost: CostBreakdown {
                crypto_amount: Decimal::new(1, 3),
                network_fee: Decimal::new(2, 4),
                total_crypto: Decimal::new(12, 4),
                total_usd: Decimal::new(60, 0),
                rate_usd: Decimal::new(50_000, 0),
            },
            can_afford,
        }
    }

    fn payment(id: RequestId) -> CryptoPayment {
        CryptoPayment {
            transaction_hash: "0x01".into(),
            crypto_amount: Decimal::new(1, 3),
            crypto_currency: "BTC".into(),
            status: PaymentStatus::Confirmed,
            request_id: id,
            created_at: Utc::now(),
        }
    }

    fn confirm(can_afford: bool, pin: &str) -> FlowState {
        FlowState::default()
            .transition(FlowEvent::Choose(selection(can_afford)))
            .and_then(|s| s.transition(FlowEvent::Continue))
            .and_then(|s| s.transition(FlowEvent::EnterPin(pin.into())))
            .unwrap()
    }

    #[test]
    fn happy_path() {
        let id = RequestId::new();
        let state = confirm(true, "1234");
        assert!(state.can_submit());

        let processing = state.transition(FlowEvent::Submit(id)).unwrap();
        assert_eq!(processing.step(), Step::Processing);
        assert!(!processing.can_submit());

        let done = processing.transition(FlowEvent::Resolved(payment(id))).unwrap();
        assert_eq!(done.step(), Step::Success);
        assert!(done.is_terminal());
    }

    #[test]
    fn transition_leaves_source_untouched() {
        let state = confirm(true, "1234");
        let before = state.clone();
        let _ = state.transition(FlowEvent::Submit(RequestId::new())).unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn continue_requires_selection() {
        assert_eq!(
            FlowState::default().transition(FlowEvent::Continue),
            Err(TransitionError::NothingSelected)
        );
    }

    #[test]
    fn unaffordable_selection_may_be_reviewed_but_not_submitted() {
        let state = confirm(false, "1234");
        assert_eq!(state.step(), Step::Confirm);
        assert!(!state.can_submit());
        assert_eq!(
            state.transition(FlowEvent::Submit(RequestId::new())),
            Err(TransitionError::CannotAfford)
        );
    }

    #[test]
    fn submit_requires_pin() {
        let state = confirm(true, "");
        assert!(!state.can_submit());
        assert_eq!(
            state.transition(FlowEvent::Submit(RequestId::new())),
            Err(TransitionError::PinRequired)
        );
    }

    #[test]
    fn processing_is_only_reachable_from_a_submittable_confirm() {
        let events = || {
            vec![
                FlowEvent::Choose(selection(true)),
                FlowEvent::Choose(selection(false)),
                FlowEvent::Continue,
                FlowEvent::Back,
                FlowEvent::EnterPin(String::new()),
                FlowEvent::EnterPin("9".into()),
                FlowEvent::Submit(RequestId::new()),
                FlowEvent::Rejected("boom".into()),
                FlowEvent::Retry,
                FlowEvent::Close,
            ]
        };
        // walk every sequence of up to four events
        let mut frontier = vec![FlowState::default()];
        for _ in 0..4 {
            let mut next = Vec::new();
            for state in &frontier {
                for event in events() {
                    if let Ok(to) = state.transition(event) {
                        if to.step() == Step::Processing && state.step() != Step::Processing {
                            assert!(state.can_submit(), "entered processing from {:?}", state);
                        }
                        next.push(to);
                    }
                }
            }
            frontier = next;
        }
    }

    #[test]
    fn rejection_keeps_message_verbatim_and_retry_resets() {
        let state = confirm(true, "1234")
            .transition(FlowEvent::Submit(RequestId::new()))
            .unwrap()
            .transition(FlowEvent::Rejected("Invalid PIN".into()))
            .unwrap();
        assert_eq!(state, FlowState::Error { message: "Invalid PIN".into() });

        let retried = state.transition(FlowEvent::Retry).unwrap();
        assert_eq!(retried, FlowState::Select { selection: None });
        assert_eq!(retried.pin(), None);
    }

    #[test]
    fn close_resets_except_while_processing() {
        let id = RequestId::new();
        let processing = confirm(true, "1234").transition(FlowEvent::Submit(id)).unwrap();
        assert_eq!(processing.transition(FlowEvent::Close), Err(TransitionError::InFlight));

        let success = processing.transition(FlowEvent::Resolved(payment(id))).unwrap();
        assert_eq!(success.transition(FlowEvent::Close).unwrap(), FlowState::default());

        let error = FlowState::Error { message: "x".into() };
        assert_eq!(error.transition(FlowEvent::Close).unwrap(), FlowState::default());
        assert_eq!(confirm(true, "1234").transition(FlowEvent::Close).unwrap(), FlowState::default());
    }

    #[test]
    fn terminal_states_accept_no_further_outcomes() {
        let id = RequestId::new();
        let success = FlowState::Success { payment: payment(id) };
        assert!(matches!(
            success.transition(FlowEvent::Rejected("late".into())),
            Err(TransitionError::NotAllowed { step: Step::Success, .. })
        ));
        assert!(success.transition(FlowEvent::Retry).is_err());
        assert!(success.transition(FlowEvent::Submit(id)).is_err());
    }

    #[test]
    fn back_keeps_selection_and_drops_pin() {
        let state = confirm(true, "1234").transition(FlowEvent::Back).unwrap();
        assert_eq!(state.step(), Step::Select);
        assert!(state.selection().is_some());
        let again = state.transition(FlowEvent::Continue).unwrap();
        assert_eq!(again.pin(), Some(""));
    }
}
