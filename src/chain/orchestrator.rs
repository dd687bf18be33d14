//! Drives one chain's steps in order.
//!
//! For every step: resolve the operation, run the optional conversion
//! inquiry, validate declared dependencies against the chain context, build
//! and invoke the request, then merge produced outputs and advance the
//! persisted state in one write. Unknown operation types and conversion
//! failures abort the chain; everything else is a per-step failure the chain
//! survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::{ErrorDetail, TransactionClient};
use crate::catalog::{OperationCatalog, OperationKind, RequestContext};
use crate::chain::{ChainContext, ChainStep, StepResult};
use crate::conversion::{ConversionManager, TransactionType};
use crate::core::errors::{ChainError, Result};
use crate::state::{ChainState, ChainStateStore, ChainStatus};
use crate::suite::ChainDefinition;

/// Terminal disposition of one chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainOutcome {
    /// Every step was processed; individual steps may still have failed.
    Completed,
    /// A fatal error stopped the chain; `results` holds the partial set.
    Aborted { error: String },
    /// The chain parked itself on a deferred step and will resume later.
    Deferred { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub chain_id: String,
    pub execution_id: String,
    pub outcome: ChainOutcome,
    pub results: Vec<StepResult>,
}

impl ChainReport {
    pub fn aborted(chain_id: &str, execution_id: &str, error: String) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            execution_id: execution_id.to_string(),
            outcome: ChainOutcome::Aborted { error },
            results: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, ChainOutcome::Aborted { .. })
    }
}

pub struct ChainOrchestrator {
    catalog: Arc<OperationCatalog>,
    conversion: Arc<ConversionManager>,
    client: Arc<dyn TransactionClient>,
    store: Arc<ChainStateStore>,
}

impl ChainOrchestrator {
    pub fn new(
        catalog: Arc<OperationCatalog>,
        conversion: Arc<ConversionManager>,
        client: Arc<dyn TransactionClient>,
        store: Arc<ChainStateStore>,
    ) -> Self {
        Self {
            catalog,
            conversion,
            client,
            store,
        }
    }

    /// Run the chain to its next stopping point (completion, abort or
    /// deferral). An existing non-terminal row resumes from its persisted
    /// step index; otherwise a fresh row is created. `Err` is reserved for
    /// infrastructure failures (persistence, invalid definitions); in-chain
    /// fatals come back as an `Aborted` report with the partial results.
    pub async fn run(&self, chain: &ChainDefinition, execution_id: &str) -> Result<ChainReport> {
        chain.validate()?;
        let chain_id = chain.chain_id.as_str();

        let (mut state, resumed_from_schedule) = match self.store.load(chain_id)? {
            Some(existing) if !existing.status.is_terminal() => {
                if existing.status == ChainStatus::Scheduled {
                    match existing.scheduled_for {
                        Some(at) if at > Utc::now() => {
                            debug!(chain_id, until = %at, "chain is scheduled and not yet due");
                            return Ok(ChainReport {
                                chain_id: chain_id.to_string(),
                                execution_id: existing.execution_id,
                                outcome: ChainOutcome::Deferred { until: at },
                                results: Vec::new(),
                            });
                        }
                        _ => {
                            let mut resumed = existing;
                            resumed.resume()?;
                            self.store.persist(&resumed)?;
                            info!(chain_id, step = resumed.current_step_index, "resuming scheduled chain");
                            (resumed, true)
                        }
                    }
                } else {
                    info!(chain_id, step = existing.current_step_index, "resuming active chain");
                    (existing, false)
                }
            }
            _ => {
                let state = ChainState::create_new(
                    chain_id,
                    execution_id,
                    Some(json!({"steps": chain.steps.len()})),
                );
                self.store.persist(&state)?;
                (state, false)
            }
        };

        let execution_id = state.execution_id.clone();
        let mut context = ChainContext::from_outputs(state.previous_outputs.clone());
        let mut results = Vec::new();
        let total_steps = chain.steps.len();
        // The step a scheduled chain resumed into must not defer itself again.
        let resume_position = resumed_from_schedule.then_some(state.current_step_index);

        info!(
            chain_id,
            execution_id = %execution_id,
            total_steps,
            from_step = state.current_step_index,
            "starting chain execution"
        );

        for (position, step) in chain.steps.iter().enumerate() {
            let position = position as u32;
            if position < state.current_step_index {
                continue;
            }

            // A deferred step parks the chain unless this run just resumed
            // into it.
            if let Some(delay) = step.defer_seconds {
                if resume_position != Some(position) {
                    let until = Utc::now() + chrono::Duration::seconds(delay);
                    state.schedule_for_later(until, Some(delay))?;
                    self.store.persist(&state)?;
                    info!(chain_id, step = step.order, %until, "deferred chain execution");
                    return Ok(ChainReport {
                        chain_id: chain_id.to_string(),
                        execution_id,
                        outcome: ChainOutcome::Deferred { until },
                        results,
                    });
                }
            }

            debug!(
                chain_id,
                step = step.order,
                operation = %step.operation,
                progress = format!("{}/{}", position + 1, total_steps),
                "processing step"
            );

            // 1. Resolve the operation; an unknown type aborts the chain.
            let entry = match self.catalog.lookup(step.operation) {
                Ok(entry) => entry,
                Err(err) => {
                    error!(chain_id, step = step.order, error = %err, "aborting chain");
                    return self.abort(chain_id, &execution_id, state, results, err);
                }
            };

            // 2. Conversion inquiry first, when requested and eligible.
            let mut transaction_type = None;
            if self.conversion.should_convert(step, &entry.descriptor) {
                let classified = match ConversionManager::classify(step.operation) {
                    Some(classified) => classified,
                    None => {
                        let err = ChainError::conversion(
                            chain_id,
                            format!("operation '{}' cannot be classified", step.operation),
                        );
                        return self.abort(chain_id, &execution_id, state, results, err);
                    }
                };
                transaction_type = Some(classified);
                if let Err(err) = self
                    .run_conversion_inquiry(chain_id, &context, step, classified)
                    .await
                {
                    error!(chain_id, step = step.order, error = %err, "conversion inquiry failed");
                    return self.abort(chain_id, &execution_id, state, results, err);
                }
            }

            // 3. Declared dependencies must already be in the context.
            let missing = entry
                .descriptor
                .dependencies
                .iter()
                .find(|dependency| !context.contains(dependency));
            if let Some(missing) = missing {
                warn!(
                    chain_id,
                    step = step.order,
                    operation = %step.operation,
                    dependency = %missing,
                    "missing dependency, skipping step"
                );
                results.push(StepResult::missing_dependency(chain_id, step, missing));
                state.update_step(position + 1, HashMap::new())?;
                self.store.persist(&state)?;
                continue;
            }

            // 4. Validate parameters and build the request.
            let request_ctx = RequestContext {
                outputs: &context,
                conversion: self.conversion.context_for(chain_id),
                transaction_type,
            };
            let started = Instant::now();
            let request = entry
                .operation
                .validate_params(&step.params)
                .and_then(|_| entry.operation.build_request(step, &request_ctx));
            let request = match request {
                Ok(request) => request,
                Err(err) => {
                    warn!(chain_id, step = step.order, error = %err, "failed to build request");
                    results.push(StepResult::invocation_failure(
                        chain_id,
                        step,
                        started.elapsed().as_millis() as u64,
                        ErrorDetail::from_message(err.to_string()),
                        None,
                        None,
                    ));
                    state.update_step(position + 1, HashMap::new())?;
                    self.store.persist(&state)?;
                    continue;
                }
            };

            // 5-7. Invoke, then either merge outputs or record the failure.
            let trace_id = request.trace_id.clone();
            match entry.operation.invoke(self.client.as_ref(), &request).await {
                Ok(response) if response.is_success() => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let outputs = entry.operation.extract_outputs(&response);
                    context.merge(outputs.clone());
                    state.update_step(position + 1, outputs)?;
                    self.store.persist(&state)?;
                    info!(
                        chain_id,
                        step = step.order,
                        operation = %step.operation,
                        duration_ms,
                        "step succeeded"
                    );
                    results.push(StepResult::success(
                        chain_id, step, duration_ms, &response, trace_id,
                    ));
                }
                Ok(response) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    warn!(
                        chain_id,
                        step = step.order,
                        status = response.status,
                        duration_ms,
                        "step invocation returned failure status"
                    );
                    let trace_id = response.trace_id.clone().unwrap_or(trace_id);
                    results.push(StepResult::invocation_failure(
                        chain_id,
                        step,
                        duration_ms,
                        ErrorDetail::from_response(&response),
                        Some(response.status),
                        Some(trace_id),
                    ));
                    state.update_step(position + 1, HashMap::new())?;
                    self.store.persist(&state)?;
                }
                Err(err) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    warn!(
                        chain_id,
                        step = step.order,
                        error = %err,
                        duration_ms,
                        "step invocation failed"
                    );
                    results.push(StepResult::invocation_failure(
                        chain_id,
                        step,
                        duration_ms,
                        ErrorDetail::from_message(err.to_string()),
                        None,
                        Some(trace_id),
                    ));
                    state.update_step(position + 1, HashMap::new())?;
                    self.store.persist(&state)?;
                }
            }
        }

        state.mark_completed()?;
        self.store.persist(&state)?;
        self.conversion.clear(chain_id);
        info!(
            chain_id,
            execution_id = %execution_id,
            steps = results.len(),
            "completed chain execution"
        );
        Ok(ChainReport {
            chain_id: chain_id.to_string(),
            execution_id,
            outcome: ChainOutcome::Completed,
            results,
        })
    }

    /// Record a fatal in-chain error: persist the failed state, drop the
    /// conversion context and hand back the partial result set.
    fn abort(
        &self,
        chain_id: &str,
        execution_id: &str,
        mut state: ChainState,
        results: Vec<StepResult>,
        err: ChainError,
    ) -> Result<ChainReport> {
        state.mark_failed(err.to_string())?;
        self.store.persist(&state)?;
        self.conversion.clear(chain_id);
        Ok(ChainReport {
            chain_id: chain_id.to_string(),
            execution_id: execution_id.to_string(),
            outcome: ChainOutcome::Aborted {
                error: err.to_string(),
            },
            results,
        })
    }

    async fn run_conversion_inquiry(
        &self,
        chain_id: &str,
        context: &ChainContext,
        step: &ChainStep,
        transaction_type: TransactionType,
    ) -> Result<()> {
        let entry = self.catalog.lookup(OperationKind::RateInquiry).map_err(|_| {
            ChainError::conversion(chain_id, "rate_inquiry operation not registered")
        })?;

        let request_ctx = RequestContext {
            outputs: context,
            conversion: self.conversion.context_for(chain_id),
            transaction_type: Some(transaction_type),
        };
        let request = entry.operation.build_request(step, &request_ctx).map_err(|e| {
            ChainError::conversion(chain_id, format!("failed to build rate inquiry: {}", e))
        })?;

        debug!(chain_id, step = step.order, %transaction_type, "running conversion inquiry");
        match entry.operation.invoke(self.client.as_ref(), &request).await {
            Ok(response) if response.is_success() => {
                self.conversion.apply_inquiry_response(chain_id, &response);
                Ok(())
            }
            Ok(response) => Err(ChainError::conversion(
                chain_id,
                format!("rate inquiry returned status {}", response.status),
            )),
            Err(err) => Err(ChainError::conversion(chain_id, err.to_string())),
        }
    }
}
