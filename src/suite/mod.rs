//! Chain/suite definitions and YAML loading.
//!
//! A suite file declares named chains of ordered steps. Definitions are
//! validated at load time so malformed chains fail before anything runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{error, info};

use crate::chain::ChainStep;
use crate::core::errors::{ChainError, Result};

/// One chain: an ordered sequence of dependent steps sharing one
/// accumulated output context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub chain_id: String,
    #[serde(default)]
    pub tags: HashSet<String>,
    pub steps: Vec<ChainStep>,
}

impl ChainDefinition {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            tags: HashSet::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Chain-level tags plus every step's tags.
    pub fn effective_tags(&self) -> HashSet<String> {
        let mut tags = self.tags.clone();
        for step in &self.steps {
            tags.extend(step.tags.iter().cloned());
        }
        tags
    }

    /// Step `order` values must be unique and strictly ascending.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.trim().is_empty() {
            return Err(ChainError::suite("chain_id must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(ChainError::suite(format!(
                "chain '{}' has no steps",
                self.chain_id
            )));
        }
        for window in self.steps.windows(2) {
            if window[1].order <= window[0].order {
                return Err(ChainError::suite(format!(
                    "chain '{}': step order must be strictly ascending ({} then {})",
                    self.chain_id, window[0].order, window[1].order
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSuite {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub chains: Vec<ChainDefinition>,
}

impl ChainSuite {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.chain_id.as_str()) {
                return Err(ChainError::suite(format!(
                    "duplicate chain_id '{}' in suite '{}'",
                    chain.chain_id, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn load_yaml_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let path = file_path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| ChainError::suite(format!("failed to open {}: {}", path.display(), e)))?;
        let mut yaml = String::new();
        file.read_to_string(&mut yaml)
            .map_err(|e| ChainError::suite(format!("failed to read {}: {}", path.display(), e)))?;

        let suite: ChainSuite = serde_yaml::from_str(&yaml)
            .map_err(|e| ChainError::suite(format!("failed to parse {}: {}", path.display(), e)))?;
        suite.validate()?;
        info!(
            suite = %suite.name,
            chains = suite.chains.len(),
            "loaded chain suite"
        );
        Ok(suite)
    }

    /// Load every suite in a directory; files that fail to load are logged
    /// and skipped.
    pub fn load_yaml_dir(dir_path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let dir = dir_path.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| ChainError::suite(format!("failed to read {}: {}", dir.display(), e)))?;

        let mut suites = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "error reading directory entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            match Self::load_yaml_file(entry.path()) {
                Ok(suite) => suites.push(suite),
                Err(e) => error!(path = %entry.path().display(), error = %e, "skipping suite"),
            }
        }
        Ok(suites)
    }

    pub fn total_steps(&self) -> usize {
        self.chains.iter().map(|chain| chain.steps.len()).sum()
    }
}
