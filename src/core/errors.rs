use thiserror::Error;

/// Unified error type for the chain-execution engine.
///
/// Per-step failures (missing dependency, invocation failure) are not errors
/// at this level; they are recorded as structured [`crate::chain::StepResult`]
/// values and the chain continues. `ChainError` covers the conditions that
/// abort a chain or surface to the caller.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The catalog has no entry for the requested operation type. Fatal for
    /// the chain that requested it.
    #[error("unknown operation type: {0}")]
    UnknownOperation(String),

    /// The currency-conversion rate inquiry failed. Fatal for the chain,
    /// since every later amount would be built on a missing rate.
    #[error("conversion inquiry failed for chain '{chain_id}': {message}")]
    ConversionInquiry { chain_id: String, message: String },

    /// Database/persistence errors, surfaced to the caller of the state
    /// mutation and never swallowed.
    #[error("persistence error: {0}")]
    Persistence(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Startup configuration errors, e.g. registering the same operation
    /// type twice.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A state mutation violated the chain lifecycle, e.g. `update_step`
    /// after a terminal status.
    #[error("invalid state for chain '{chain_id}': {message}")]
    InvalidState { chain_id: String, message: String },

    /// A chain/suite definition failed validation at load time.
    #[error("suite definition error: {0}")]
    Suite(String),
}

impl ChainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn suite(message: impl Into<String>) -> Self {
        Self::Suite(message.into())
    }

    pub fn conversion(chain_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConversionInquiry {
            chain_id: chain_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(chain_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            chain_id: chain_id.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the remaining steps of the chain it
    /// occurred in (as opposed to surfacing to the batch caller).
    pub fn is_fatal_for_chain(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperation(_) | Self::ConversionInquiry { .. }
        )
    }

    /// Error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownOperation(_) => "unknown_operation",
            Self::ConversionInquiry { .. } => "conversion_inquiry",
            Self::Persistence(_) => "persistence",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
            Self::InvalidState { .. } => "invalid_state",
            Self::Suite(_) => "suite",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ChainError>;
