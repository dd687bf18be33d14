//! Tag-based chain selection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use crate::suite::ChainDefinition;

/// How include tags combine. The two CLI entry points of the runner map to
/// different defaults: a single combined tag argument implies `All`, repeated
/// single-tag flags imply `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    All,
    Any,
}

/// Pure include/exclude predicate over free-form labels. Exclusion always
/// wins; an empty include set accepts everything not excluded.
#[derive(Debug, Clone)]
pub struct TagFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
    mode: TagMode,
}

impl TagFilter {
    pub fn new<I, E, S, T>(include: I, exclude: E, mode: TagMode) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// Combined `--tags a,b` argument: every include tag must be present.
    pub fn all_of<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(include, exclude, TagMode::All)
    }

    /// Repeated `--include-tags` flags: one matching include tag suffices.
    pub fn any_of<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(include, exclude, TagMode::Any)
    }

    pub fn matches(&self, tags: &HashSet<String>) -> bool {
        if !self.exclude.is_empty() && !self.exclude.is_disjoint(tags) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        match self.mode {
            TagMode::All => self.include.is_subset(tags),
            TagMode::Any => !self.include.is_disjoint(tags),
        }
    }

    /// Select chains by their effective tag set (chain tags plus step tags).
    /// Filtering whole chains keeps intra-chain dependencies intact.
    pub fn filter_chains(&self, chains: Vec<ChainDefinition>) -> Vec<ChainDefinition> {
        let before = chains.len();
        let filtered: Vec<ChainDefinition> = chains
            .into_iter()
            .filter(|chain| self.matches(&chain.effective_tags()))
            .collect();
        info!(
            before,
            after = filtered.len(),
            mode = ?self.mode,
            "applied tag filter"
        );
        debug!(include = ?self.include, exclude = ?self.exclude, "tag filter criteria");
        filtered
    }

    /// All distinct tags across the given chains, sorted.
    pub fn collect_tags(chains: &[ChainDefinition]) -> BTreeSet<String> {
        chains
            .iter()
            .flat_map(|chain| chain.effective_tags())
            .collect()
    }
}
