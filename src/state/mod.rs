//! Durable, resumable per-chain execution state.
//!
//! Each chain has one row keyed by `chain_id`, stored as a single JSON
//! document in a sled tree. `update_step` changes the step index and the
//! output snapshot in one persisted write, so a reader can never observe one
//! without the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::core::errors::{ChainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Active,
    Scheduled,
    Completed,
    Failed,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent chain execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_id: String,
    pub execution_id: String,
    /// Index of the next step to execute; monotonically non-decreasing.
    pub current_step_index: u32,
    pub previous_outputs: HashMap<String, Value>,
    pub status: ChainStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub delay_seconds: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub chain_config: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainState {
    pub fn create_new(
        chain_id: impl Into<String>,
        execution_id: impl Into<String>,
        chain_config: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            chain_id: chain_id.into(),
            execution_id: execution_id.into(),
            current_step_index: 0,
            previous_outputs: HashMap::new(),
            status: ChainStatus::Active,
            scheduled_for: None,
            delay_seconds: None,
            error_message: None,
            retry_count: 0,
            chain_config,
            created_at: now,
            updated_at: now,
        }
    }

    fn guard_not_terminal(&self, operation: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ChainError::invalid_state(
                &self.chain_id,
                format!("{} after terminal status '{}'", operation, self.status),
            ));
        }
        Ok(())
    }

    /// Atomically (from the caller's perspective, one mutation + one
    /// persisted write) advance the step index and merge new outputs,
    /// overwriting existing keys.
    pub fn update_step(&mut self, step_index: u32, outputs: HashMap<String, Value>) -> Result<()> {
        self.guard_not_terminal("update_step")?;
        if step_index < self.current_step_index {
            return Err(ChainError::invalid_state(
                &self.chain_id,
                format!(
                    "step index must not decrease ({} -> {})",
                    self.current_step_index, step_index
                ),
            ));
        }
        self.current_step_index = step_index;
        self.previous_outputs.extend(outputs);
        self.touch();
        Ok(())
    }

    /// Park the chain for future execution.
    pub fn schedule_for_later(
        &mut self,
        scheduled_for: DateTime<Utc>,
        delay_seconds: Option<i64>,
    ) -> Result<()> {
        self.guard_not_terminal("schedule_for_later")?;
        self.scheduled_for = Some(scheduled_for);
        self.delay_seconds = delay_seconds;
        self.status = ChainStatus::Scheduled;
        self.touch();
        Ok(())
    }

    /// Flip a scheduled chain back to active; clears the schedule.
    pub fn resume(&mut self) -> Result<()> {
        if self.status != ChainStatus::Scheduled {
            return Err(ChainError::invalid_state(
                &self.chain_id,
                format!("resume from status '{}'", self.status),
            ));
        }
        self.status = ChainStatus::Active;
        self.scheduled_for = None;
        self.delay_seconds = None;
        self.touch();
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.guard_not_terminal("mark_completed")?;
        self.status = ChainStatus::Completed;
        self.touch();
        Ok(())
    }

    /// Terminal; retains the error message and the last output snapshot for
    /// diagnostics.
    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> Result<()> {
        self.guard_not_terminal("mark_failed")?;
        self.status = ChainStatus::Failed;
        self.error_message = Some(error_message.into());
        self.touch();
        Ok(())
    }

    pub fn has_output(&self, key: &str) -> bool {
        self.previous_outputs.contains_key(key)
    }

    pub fn get_output(&self, key: &str) -> Option<&Value> {
        self.previous_outputs.get(key)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Sled-backed store for chain rows. Rows are written only by the worker
/// owning the chain during a run; concurrent external resumption of the same
/// `chain_id` is outside this store's guarantees.
pub struct ChainStateStore {
    _db: sled::Db,
    tree: sled::Tree,
}

impl ChainStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree("chain_states")?;
        debug!(path = %path.as_ref().display(), "opened chain state store");
        Ok(Self { _db: db, tree })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree("chain_states")?;
        Ok(Self { _db: db, tree })
    }

    /// One insert + flush per row; the document carries index and outputs
    /// together, so torn states are unobservable.
    pub fn persist(&self, state: &ChainState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.tree.insert(state.chain_id.as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    pub fn load(&self, chain_id: &str) -> Result<Option<ChainState>> {
        match self.tree.get(chain_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn all(&self) -> Result<Vec<ChainState>> {
        let mut states = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry?;
            states.push(serde_json::from_slice(&bytes)?);
        }
        Ok(states)
    }

    /// Scheduled chains whose target time has passed.
    pub fn due_for_resume(&self, now: DateTime<Utc>) -> Result<Vec<ChainState>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|state| {
                state.status == ChainStatus::Scheduled
                    && state.scheduled_for.map(|at| at <= now).unwrap_or(true)
            })
            .collect())
    }

    /// External resumption entry point: flips every due `scheduled` row back
    /// to `active` and persists it. Returns the resumed states.
    pub fn resume_due(&self, now: DateTime<Utc>) -> Result<Vec<ChainState>> {
        let mut resumed = Vec::new();
        for mut state in self.due_for_resume(now)? {
            state.resume()?;
            self.persist(&state)?;
            info!(chain_id = %state.chain_id, "resumed scheduled chain");
            resumed.push(state);
        }
        Ok(resumed)
    }
}
