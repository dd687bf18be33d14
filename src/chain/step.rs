//! Step model and structured per-step outcomes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::api::{ApiResponse, ErrorDetail};
use crate::catalog::OperationKind;

/// One step of a chain: an operation plus its parameter bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Unique, ascending within the chain.
    pub order: u32,
    pub operation: OperationKind,
    /// Free-form parameters consumed by the operation's request builder
    /// (amounts, merchant identifiers, card data, conversion flags, ...).
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default)]
    pub tags: HashSet<String>,
    /// When set, the chain is parked (`scheduled`) for this many seconds
    /// before the step runs.
    #[serde(default)]
    pub defer_seconds: Option<i64>,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl ChainStep {
    pub fn new(order: u32, operation: OperationKind) -> Self {
        Self {
            order,
            operation,
            params: empty_params(),
            tags: HashSet::new(),
            defer_seconds: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_defer_seconds(mut self, seconds: i64) -> Self {
        self.defer_seconds = Some(seconds);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(Value::as_i64)
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether this step explicitly asked for a currency-conversion inquiry.
    pub fn requests_conversion(&self) -> bool {
        self.param_bool("use_conversion")
    }

    pub fn test_id(&self) -> String {
        self.param_str("test_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("step-{}", self.order))
    }
}

/// Why a step did not pass. Both variants leave the chain running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepFailure {
    /// A declared dependency was absent from the chain context; the
    /// operation was never invoked.
    MissingDependency { key: String },
    /// The invocation itself failed (transport error, non-2xx response, or
    /// a request that could not be built).
    Invocation { detail: ErrorDetail },
}

/// Outcome record for one executed (or skipped) step, consumed by the
/// external reporting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub chain_id: String,
    pub step_order: u32,
    pub operation: OperationKind,
    pub duration_ms: u64,
    pub passed: bool,
    pub failure: Option<StepFailure>,
    pub http_status: Option<u16>,
    pub trace_id: Option<String>,
    pub response: Option<Value>,
    pub recorded_at: NaiveDateTime,
}

impl StepResult {
    pub fn success(
        chain_id: &str,
        step: &ChainStep,
        duration_ms: u64,
        response: &ApiResponse,
        trace_id: String,
    ) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            step_order: step.order,
            operation: step.operation,
            duration_ms,
            passed: true,
            failure: None,
            http_status: Some(response.status),
            trace_id: Some(trace_id),
            response: Some(response.body.clone()),
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn invocation_failure(
        chain_id: &str,
        step: &ChainStep,
        duration_ms: u64,
        detail: ErrorDetail,
        http_status: Option<u16>,
        trace_id: Option<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            step_order: step.order,
            operation: step.operation,
            duration_ms,
            passed: false,
            failure: Some(StepFailure::Invocation { detail }),
            http_status,
            trace_id,
            response: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn missing_dependency(chain_id: &str, step: &ChainStep, key: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            step_order: step.order,
            operation: step.operation,
            duration_ms: 0,
            passed: false,
            failure: Some(StepFailure::MissingDependency {
                key: key.to_string(),
            }),
            http_status: None,
            trace_id: None,
            response: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn is_missing_dependency(&self) -> bool {
        matches!(self.failure, Some(StepFailure::MissingDependency { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_param_accessors_tolerate_missing_bag() {
        let step = ChainStep::new(1, OperationKind::Ping);
        assert_eq!(step.param_str("amount"), None);
        assert!(!step.requests_conversion());
        assert_eq!(step.test_id(), "step-1");
    }

    #[test]
    fn test_requests_conversion_flag() {
        let step = ChainStep::new(2, OperationKind::CreatePayment)
            .with_params(json!({"use_conversion": true, "test_id": "T-042"}));
        assert!(step.requests_conversion());
        assert_eq!(step.test_id(), "T-042");
    }
}
