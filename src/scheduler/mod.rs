//! Bounded-concurrency scheduler over independent chains.
//!
//! Each worker claims one whole chain and runs its orchestrator to
//! completion before claiming another; steps never span workers. Reports
//! from all workers flow through one mpsc channel into the aggregating
//! collector, the only shared mutable state of a batch.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

use crate::chain::{ChainOrchestrator, ChainReport, StepResult};
use crate::core::errors::{ChainError, Result};
use crate::suite::ChainDefinition;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of parallel workers; 1 means fully sequential.
    pub worker_count: usize,
    /// Execution id shared by all chains of the batch; generated if absent.
    pub execution_id: Option<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            execution_id: None,
        }
    }
}

impl BatchOptions {
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(ChainError::configuration(
                "worker_count must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Aggregated results of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub execution_id: String,
    pub reports: Vec<ChainReport>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn results(&self) -> impl Iterator<Item = &StepResult> {
        self.reports.iter().flat_map(|report| report.results.iter())
    }

    pub fn total_steps(&self) -> usize {
        self.reports.iter().map(|report| report.results.len()).sum()
    }

    pub fn passed(&self) -> usize {
        self.results().filter(|result| result.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total_steps() - self.passed()
    }

    /// Chains stopped by a fatal error, as opposed to chains that completed
    /// with some failed steps.
    pub fn aborted_chains(&self) -> usize {
        self.reports.iter().filter(|r| r.is_aborted()).count()
    }

    pub fn log_summary(&self) {
        info!(
            execution_id = %self.execution_id,
            chains = self.reports.len(),
            steps = self.total_steps(),
            passed = self.passed(),
            failed = self.failed(),
            aborted_chains = self.aborted_chains(),
            duration_ms = self.duration_ms,
            "batch complete"
        );
    }
}

pub struct ConcurrencyScheduler {
    orchestrator: Arc<ChainOrchestrator>,
}

impl ConcurrencyScheduler {
    pub fn new(orchestrator: Arc<ChainOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Run every chain of the batch under `worker_count` workers. A fatal
    /// chain-level error is caught at the chain boundary and recorded as an
    /// aborted report; it never takes down the scheduler or other chains.
    /// Completion order across chains reflects wall-clock duration, not
    /// submission order.
    pub async fn run_batch(
        &self,
        chains: Vec<ChainDefinition>,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        options.validate()?;
        let execution_id = options
            .execution_id
            .clone()
            .unwrap_or_else(cuid2::create_id);
        let started = Instant::now();
        let chain_count = chains.len();

        info!(
            execution_id = %execution_id,
            chains = chain_count,
            workers = options.worker_count,
            "starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(options.worker_count));
        let (report_tx, mut report_rx) = mpsc::channel::<ChainReport>(chain_count.max(1));
        let mut workers = FuturesUnordered::new();

        for chain in chains {
            let semaphore = semaphore.clone();
            let orchestrator = self.orchestrator.clone();
            let report_tx = report_tx.clone();
            let execution_id = execution_id.clone();

            workers.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let report = match orchestrator.run(&chain, &execution_id).await {
                    Ok(report) => report,
                    Err(err) => {
                        error!(
                            chain_id = %chain.chain_id,
                            error = %err,
                            category = err.category(),
                            "chain failed at the chain boundary"
                        );
                        ChainReport::aborted(&chain.chain_id, &execution_id, err.to_string())
                    }
                };
                let _ = report_tx.send(report).await;
            }));
        }
        drop(report_tx);

        let mut reports = Vec::with_capacity(chain_count);
        while let Some(report) = report_rx.recv().await {
            info!(
                chain_id = %report.chain_id,
                passed = report.passed(),
                failed = report.failed(),
                aborted = report.is_aborted(),
                "collected chain report"
            );
            reports.push(report);
        }

        // Surface worker panics without letting them poison the batch.
        while let Some(joined) = workers.next().await {
            if let Err(err) = joined {
                error!(error = %err, "chain worker panicked");
            }
        }

        let batch = BatchReport {
            execution_id,
            reports,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        batch.log_summary();
        Ok(batch)
    }
}
