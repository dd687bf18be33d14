//! Per-chain currency-conversion context and policy.
//!
//! A chain step may request a conversion inquiry before its own invocation.
//! The inquiry's proposal (rate reference, resulting amount, exchange rate)
//! is folded into the chain's [`ConversionContext`]; every later step of the
//! same chain resolves its transaction amount against that context. Contexts
//! are strictly chain-scoped; nothing is shared across chains.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

use crate::api::ApiResponse;
use crate::catalog::{OperationDescriptor, OperationKind};
use crate::chain::ChainStep;

/// Transaction classification used by the rate inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Payment,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Refund => "REFUND",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monetary amount in the wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountData {
    pub amount: i64,
    pub currency_code: String,
    pub number_of_decimals: u32,
}

impl AmountData {
    pub fn new(amount: i64, currency_code: impl Into<String>) -> Self {
        Self {
            amount,
            currency_code: currency_code.into(),
            number_of_decimals: 2,
        }
    }
}

/// Conversion state accumulated by one chain. Once `rate_reference_id` is
/// set it persists for the remainder of the chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionContext {
    pub rate_reference_id: Option<String>,
    pub original_amount: Option<AmountData>,
    pub resulting_amount: Option<AmountData>,
    pub exchange_rate: Option<f64>,
}

impl ConversionContext {
    /// The amount to put on the wire: the conversion's resulting amount when
    /// an inquiry has run, else the step's declared amount.
    pub fn resolved_amount(&self, fallback_amount: i64, fallback_currency: &str) -> AmountData {
        match &self.resulting_amount {
            Some(resulting) => resulting.clone(),
            None => AmountData::new(fallback_amount, fallback_currency),
        }
    }
}

/// Owns one [`ConversionContext`] per chain and the policy for when an
/// inquiry runs.
#[derive(Debug, Default)]
pub struct ConversionManager {
    contexts: DashMap<String, ConversionContext>,
}

impl ConversionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the chain's context, lazily created.
    pub fn context_for(&self, chain_id: &str) -> ConversionContext {
        self.contexts
            .entry(chain_id.to_string())
            .or_default()
            .clone()
    }

    /// An inquiry runs only when the step explicitly asks for it and the
    /// operation is amount-bearing (pure queries and some reversal types
    /// are excluded by catalog declaration).
    pub fn should_convert(&self, step: &ChainStep, descriptor: &OperationDescriptor) -> bool {
        step.requests_conversion() && descriptor.supports_conversion
    }

    /// Transaction type for the inquiry. `None` for operations the catalog
    /// declares conversion-ineligible.
    pub fn classify(kind: OperationKind) -> Option<TransactionType> {
        match kind {
            OperationKind::CreatePayment
            | OperationKind::IncrementPayment
            | OperationKind::CapturePayment
            | OperationKind::ReverseAuthorization => Some(TransactionType::Payment),
            OperationKind::RefundPayment | OperationKind::StandaloneRefund => {
                Some(TransactionType::Refund)
            }
            _ => None,
        }
    }

    /// Fold a successful rate-inquiry response into the chain's context.
    pub fn apply_inquiry_response(&self, chain_id: &str, response: &ApiResponse) {
        let mut context = self.contexts.entry(chain_id.to_string()).or_default();
        let Some(proposal) = response.body.get("proposal") else {
            debug!(chain_id, "rate inquiry response carried no proposal");
            return;
        };

        if let Some(id) = proposal.get("rateReferenceId").and_then(Value::as_str) {
            context.rate_reference_id = Some(id.to_string());
        }
        if let Some(original) = proposal.get("originalAmount") {
            if let Ok(amount) = serde_json::from_value::<AmountData>(original.clone()) {
                context.original_amount = Some(amount);
            }
        }
        if let Some(resulting) = proposal.get("resultingAmount") {
            if let Ok(amount) = serde_json::from_value::<AmountData>(resulting.clone()) {
                context.resulting_amount = Some(amount);
            }
        }
        if let Some(rate) = proposal.get("rate") {
            context.exchange_rate = rate
                .get("exchangeRate")
                .or_else(|| rate.get("invertedExchangeRate"))
                .and_then(Value::as_f64);
        }

        info!(
            chain_id,
            rate_reference_id = context.rate_reference_id.as_deref().unwrap_or("none"),
            resulting_amount = ?context.resulting_amount,
            "updated conversion context from rate inquiry"
        );
    }

    /// Resolve the wire amount for a chain (conversion result over fallback).
    pub fn resolved_amount(
        &self,
        chain_id: &str,
        fallback_amount: i64,
        fallback_currency: &str,
    ) -> AmountData {
        self.context_for(chain_id)
            .resolved_amount(fallback_amount, fallback_currency)
    }

    pub fn rate_reference(&self, chain_id: &str) -> Option<String> {
        self.contexts
            .get(chain_id)
            .and_then(|context| context.rate_reference_id.clone())
    }

    /// Drop a chain's context once the chain reaches a terminal state.
    pub fn clear(&self, chain_id: &str) {
        self.contexts.remove(chain_id);
    }
}
