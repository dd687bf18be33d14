//! Chain execution: accumulated context, step model and the orchestrator.

pub mod context;
pub mod orchestrator;
pub mod step;

pub use context::ChainContext;
pub use orchestrator::{ChainOrchestrator, ChainOutcome, ChainReport};
pub use step::{ChainStep, StepFailure, StepResult};
