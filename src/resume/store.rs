//! Resumption state: which modules a retried build must still attempt.
//!
//! At the end of a failed build the store persists the coordinates of every
//! module that did not succeed under the `remainingProjects` key. The next
//! invocation, when resume is requested, reads them back and merges them with
//! any explicit user selection. The record is a durable key/value entry in a
//! sled database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::core::errors::{ReactorError, Result};
use crate::graph::project_graph::{ModuleId, ProjectGraph};
use crate::reactor::report::{BuildReport, BuildStatus};

const REMAINING_PROJECTS_KEY: &str = "remainingProjects";

/// A set of module selectors: `group:artifact`, `group:artifact:version`,
/// `:artifact`, or a bare artifact id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumptionSelector {
    selectors: BTreeSet<String>,
}

impl ResumptionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted comma-separated form. Blank entries are dropped,
    /// so an empty value parses to an empty selector set.
    pub fn parse(raw: &str) -> Self {
        Self {
            selectors: raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn insert(&mut self, selector: impl Into<String>) {
        self.selectors.insert(selector.into());
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().map(String::as_str)
    }

    /// Whether any selector identifies `module`.
    pub fn matches(&self, module: &ModuleId) -> bool {
        self.selectors
            .iter()
            .any(|selector| selector_matches(selector, module))
    }

    /// Selectors that identify no module of `graph`. These are warned about
    /// by the reactor, never treated as fatal.
    pub fn unmatched_selectors<'a>(&'a self, graph: &ProjectGraph) -> Vec<&'a str> {
        self.selectors
            .iter()
            .filter(|selector| !graph.modules().any(|m| selector_matches(selector, m)))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for ResumptionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for selector in &self.selectors {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(selector)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<String> for ResumptionSelector {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            selectors: iter.into_iter().collect(),
        }
    }
}

fn selector_matches(selector: &str, module: &ModuleId) -> bool {
    if let Some(artifact) = selector.strip_prefix(':') {
        return module.artifact_id == artifact;
    }
    let mut parts = selector.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(artifact), None, ..) => module.artifact_id == artifact,
        (Some(group), Some(artifact), None, _) => {
            module.group_id == group && module.artifact_id == artifact
        }
        (Some(group), Some(artifact), Some(version), None) => {
            module.group_id == group
                && module.artifact_id == artifact
                && module.version == version
        }
        _ => false,
    }
}

/// Durable store for the resumption record of one project.
pub struct ResumptionStateStore {
    db: sled::Db,
}

impl ResumptionStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| ReactorError::storage("open", e))?;
        Ok(Self { db })
    }

    /// Persist the modules a resumed build must reattempt. A successful
    /// build overwrites any stale record with an explicitly empty one, which
    /// stays distinguishable from a record that was never written.
    pub fn snapshot(&self, report: &BuildReport) -> Result<ResumptionSelector> {
        let selector: ResumptionSelector = match report.status {
            BuildStatus::Succeeded => ResumptionSelector::default(),
            BuildStatus::Failed => report
                .unsuccessful_modules()
                .into_iter()
                .map(ModuleId::coordinate)
                .collect(),
        };
        self.db
            .insert(REMAINING_PROJECTS_KEY, selector.to_string().as_bytes())
            .map_err(|e| ReactorError::storage("insert", e))?;
        self.db
            .flush()
            .map_err(|e| ReactorError::storage("flush", e))?;
        info!(remaining = selector.len(), "persisted resumption record");
        Ok(selector)
    }

    /// Read the persisted record. `None` means no record was ever written;
    /// an explicitly empty record yields `Some` with an empty selector set.
    pub fn load(&self) -> Result<Option<ResumptionSelector>> {
        match self
            .db
            .get(REMAINING_PROJECTS_KEY)
            .map_err(|e| ReactorError::storage("get", e))?
        {
            None => Ok(None),
            Some(raw) => {
                let text = String::from_utf8_lossy(&raw);
                debug!(raw = %text, "loaded resumption record");
                Ok(Some(ResumptionSelector::parse(&text)))
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.db
            .remove(REMAINING_PROJECTS_KEY)
            .map_err(|e| ReactorError::storage("remove", e))?;
        self.db
            .flush()
            .map_err(|e| ReactorError::storage("flush", e))?;
        Ok(())
    }

    /// Merge an explicit user selection with persisted data. An explicit
    /// selection always wins and is never overwritten; persisted data only
    /// fills in when the user supplied none.
    pub fn merge(
        explicit: &ResumptionSelector,
        persisted: Option<&ResumptionSelector>,
    ) -> ResumptionSelector {
        if !explicit.is_empty() {
            return explicit.clone();
        }
        persisted.cloned().unwrap_or_default()
    }
}
