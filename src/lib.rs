//! Chainrunner - declarative test chains against a transactional payment API.
//!
//! A chain is an ordered sequence of dependent steps sharing one accumulated
//! output context: identifiers produced by earlier steps (a payment id from a
//! creation step, a refund id from a refund step) feed the requests of later
//! steps. The engine resolves those dependencies at runtime, threads an
//! optional currency-conversion result through subsequent steps, runs many
//! independent chains in parallel under a bounded worker pool while keeping
//! each chain strictly sequential, and persists per-chain progress so
//! interrupted runs resume where they stopped.

// Core infrastructure modules
pub mod core {
    pub mod errors;
}

pub mod api;
pub mod catalog;
pub mod chain;
pub mod conversion;
pub mod scheduler;
pub mod state;
pub mod suite;
pub mod tags;

// Re-exports for convenience
pub use crate::core::errors::{ChainError, Result};
pub use api::{ApiRequest, ApiResponse, ErrorDetail, HttpMethod, TransactionClient};
pub use catalog::{
    CatalogEntry, Operation, OperationCatalog, OperationDescriptor, OperationKind, RequestContext,
};
pub use chain::{
    ChainContext, ChainOrchestrator, ChainOutcome, ChainReport, ChainStep, StepFailure, StepResult,
};
pub use conversion::{AmountData, ConversionContext, ConversionManager, TransactionType};
pub use scheduler::{BatchOptions, BatchReport, ConcurrencyScheduler};
pub use state::{ChainState, ChainStateStore, ChainStatus};
pub use suite::{ChainDefinition, ChainSuite};
pub use tags::{TagFilter, TagMode};
