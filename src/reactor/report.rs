//! Per-module outcomes and the build-wide report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::project_graph::ModuleId;

/// Lifecycle state of one module within a build.
///
/// Owned exclusively by the scheduler; transitions are the only mutations
/// that happen while a build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Pending => "pending",
            ModuleState::Ready => "ready",
            ModuleState::Running => "running",
            ModuleState::Succeeded => "succeeded",
            ModuleState::Failed => "failed",
            ModuleState::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(ModuleState::Pending),
            "ready" => Ok(ModuleState::Ready),
            "running" => Ok(ModuleState::Running),
            "succeeded" => Ok(ModuleState::Succeeded),
            "failed" => Ok(ModuleState::Failed),
            "skipped" => Ok(ModuleState::Skipped),
            _ => Err(format!("Unknown module state: {s}")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleState::Succeeded | ModuleState::Failed | ModuleState::Skipped
        )
    }
}

/// Result record for one module build; immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub module: ModuleId,
    pub state: ModuleState,
    pub duration_ms: u64,
    pub error_summary: Option<String>,
}

impl BuildOutcome {
    pub fn succeeded(module: ModuleId, duration_ms: u64) -> Self {
        Self {
            module,
            state: ModuleState::Succeeded,
            duration_ms,
            error_summary: None,
        }
    }

    pub fn failed(module: ModuleId, duration_ms: u64, error_summary: String) -> Self {
        Self {
            module,
            state: ModuleState::Failed,
            duration_ms,
            error_summary: Some(error_summary),
        }
    }

    pub fn skipped(module: ModuleId) -> Self {
        Self {
            module,
            state: ModuleState::Skipped,
            duration_ms: 0,
            error_summary: None,
        }
    }
}

/// Aggregate status of the whole build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

/// Ordered list of outcomes plus the aggregate status, exposed to the
/// logging/reporting layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub outcomes: Vec<BuildOutcome>,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn outcome_for(&self, module: &ModuleId) -> Option<&BuildOutcome> {
        self.outcomes.iter().find(|o| &o.module == module)
    }

    pub fn failed_modules(&self) -> Vec<&ModuleId> {
        self.modules_in_state(|state| state == ModuleState::Failed)
    }

    /// Modules whose final state is not `Succeeded`, in coordinate order.
    /// This is the set a resumed build must reattempt.
    pub fn unsuccessful_modules(&self) -> Vec<&ModuleId> {
        self.modules_in_state(|state| state != ModuleState::Succeeded)
    }

    fn modules_in_state(&self, include: impl Fn(ModuleState) -> bool) -> Vec<&ModuleId> {
        let mut modules: Vec<&ModuleId> = self
            .outcomes
            .iter()
            .filter(|o| include(o.state))
            .map(|o| &o.module)
            .collect();
        modules.sort();
        modules
    }
}
