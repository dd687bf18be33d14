//! Static operation catalog.
//!
//! Operation types are a closed set, registered explicitly once at startup
//! and shared immutably afterwards. Each entry pairs a declared contract
//! (dependencies, produced outputs, conversion eligibility) with the opaque
//! build/invoke capability.

pub mod operations;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::api::{ApiRequest, ApiResponse, TransactionClient};
use crate::chain::{ChainContext, ChainStep};
use crate::conversion::{ConversionContext, TransactionType};
use crate::core::errors::{ChainError, Result};

/// Closed set of operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreatePayment,
    IncrementPayment,
    CapturePayment,
    RefundPayment,
    GetPayment,
    GetRefund,
    ReverseAuthorization,
    StandaloneRefund,
    CaptureRefund,
    ReverseRefundAuthorization,
    TechnicalReversal,
    AccountVerification,
    Ping,
    RateInquiry,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatePayment => "create_payment",
            Self::IncrementPayment => "increment_payment",
            Self::CapturePayment => "capture_payment",
            Self::RefundPayment => "refund_payment",
            Self::GetPayment => "get_payment",
            Self::GetRefund => "get_refund",
            Self::ReverseAuthorization => "reverse_authorization",
            Self::StandaloneRefund => "standalone_refund",
            Self::CaptureRefund => "capture_refund",
            Self::ReverseRefundAuthorization => "reverse_refund_authorization",
            Self::TechnicalReversal => "technical_reversal",
            Self::AccountVerification => "account_verification",
            Self::Ping => "ping",
            Self::RateInquiry => "rate_inquiry",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared contract of one operation type.
#[derive(Debug, Clone, Default)]
pub struct OperationDescriptor {
    /// Output keys that must already exist in the chain context.
    pub dependencies: HashSet<String>,
    /// Output keys a successful invocation contributes to the chain context.
    pub produced_outputs: HashSet<String>,
    /// Whether a conversion inquiry may precede this operation.
    pub supports_conversion: bool,
}

impl OperationDescriptor {
    pub fn new(dependencies: &[&str], produced_outputs: &[&str], supports_conversion: bool) -> Self {
        Self {
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            produced_outputs: produced_outputs.iter().map(|o| o.to_string()).collect(),
            supports_conversion,
        }
    }
}

/// Everything a request builder may draw on beyond the step itself.
pub struct RequestContext<'a> {
    /// Outputs accumulated by earlier steps of the chain.
    pub outputs: &'a ChainContext,
    /// Snapshot of the chain's conversion context (empty if no inquiry ran).
    pub conversion: ConversionContext,
    /// Set when building a rate inquiry for a classified step.
    pub transaction_type: Option<TransactionType>,
}

/// One typed unit of work against the external API.
#[async_trait]
pub trait Operation: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn descriptor(&self) -> OperationDescriptor;

    /// JSON schema the step parameter bag is validated against before the
    /// request is built.
    fn params_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    fn build_request(&self, step: &ChainStep, ctx: &RequestContext<'_>)
        -> anyhow::Result<ApiRequest>;

    /// Output keys extracted from a successful response, merged into the
    /// chain context.
    fn extract_outputs(&self, _response: &ApiResponse) -> HashMap<String, Value> {
        HashMap::new()
    }

    async fn invoke(
        &self,
        client: &dyn TransactionClient,
        request: &ApiRequest,
    ) -> anyhow::Result<ApiResponse> {
        client.send(request).await
    }

    fn validate_params(&self, params: &Value) -> anyhow::Result<()> {
        let schema = self.params_schema();
        let compiled = jsonschema::validator_for(&schema)
            .map_err(|e| anyhow::anyhow!("failed to compile params schema: {}", e))?;
        if let Err(error) = compiled.validate(params) {
            anyhow::bail!("invalid parameters for {}: {}", self.kind(), error);
        }
        Ok(())
    }
}

/// A registered operation together with its cached descriptor.
pub struct CatalogEntry {
    pub descriptor: OperationDescriptor,
    pub operation: Arc<dyn Operation>,
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry mapping operation kinds to their contracts and capabilities.
/// Read-only after startup; `&self` lookups are safe to share across
/// workers without synchronization.
#[derive(Default)]
pub struct OperationCatalog {
    entries: HashMap<OperationKind, CatalogEntry>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in operation registered.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        operations::register_builtin(&mut catalog)?;
        Ok(catalog)
    }

    /// Registering the same type key twice is a startup configuration
    /// error, not a runtime one.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> Result<()> {
        let kind = operation.kind();
        if self.entries.contains_key(&kind) {
            return Err(ChainError::configuration(format!(
                "operation '{}' registered twice",
                kind
            )));
        }
        let descriptor = operation.descriptor();
        self.entries.insert(
            kind,
            CatalogEntry {
                descriptor,
                operation,
            },
        );
        Ok(())
    }

    /// Lookup of an unregistered kind is fatal for the calling chain.
    pub fn lookup(&self, kind: OperationKind) -> Result<&CatalogEntry> {
        self.entries
            .get(&kind)
            .ok_or_else(|| ChainError::UnknownOperation(kind.to_string()))
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<OperationKind> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
