//! Failure-policy coordination.
//!
//! The coordinator interprets each failed module under the active policy and
//! tells the scheduler which modules to skip, whether to stop dispatching,
//! and what the build's aggregate status is. Module-level failures are
//! absorbed here; they never escape the scheduler as errors.

use tracing::{info, warn};

use crate::core::errors::Result;
use crate::graph::project_graph::{ModuleId, ProjectGraph};
use crate::reactor::config::FailurePolicy;
use crate::reactor::report::{BuildOutcome, BuildStatus, ModuleState};

/// What the scheduler must do after a module failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDirective {
    /// Stop issuing new dispatches; skip everything not yet running.
    /// In-flight modules always run to completion.
    Halt,
    /// Skip exactly these modules; independent branches continue.
    Skip(Vec<ModuleId>),
    /// Record the failure and carry on scheduling.
    Continue,
}

#[derive(Debug)]
pub struct FailureCoordinator {
    policy: FailurePolicy,
}

impl FailureCoordinator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Decide the fate of the rest of the reactor after `module` failed.
    pub fn on_module_failure(
        &self,
        graph: &ProjectGraph,
        module: &ModuleId,
    ) -> Result<FailureDirective> {
        match self.policy {
            FailurePolicy::FailFast => {
                warn!(module = %module, "module failed, halting reactor (fail-fast)");
                Ok(FailureDirective::Halt)
            }
            FailurePolicy::FailAtEnd => {
                let dependents: Vec<ModuleId> = graph
                    .downstream_of(module, true)?
                    .into_iter()
                    .cloned()
                    .collect();
                warn!(
                    module = %module,
                    skipped = dependents.len(),
                    "module failed, skipping its dependents (fail-at-end)"
                );
                Ok(FailureDirective::Skip(dependents))
            }
            FailurePolicy::FailNever => {
                info!(module = %module, "module failed, continuing (fail-never)");
                Ok(FailureDirective::Continue)
            }
        }
    }

    /// Whether a prerequisite in `state` lets its dependents become ready.
    /// Under fail-never any terminal state unblocks; otherwise only success.
    pub fn satisfies_dependents(&self, state: ModuleState) -> bool {
        match state {
            ModuleState::Succeeded => true,
            ModuleState::Failed | ModuleState::Skipped => {
                self.policy == FailurePolicy::FailNever
            }
            _ => false,
        }
    }

    /// Aggregate status: failed if any module's final state is failed,
    /// regardless of policy.
    pub fn aggregate_status(outcomes: &[BuildOutcome]) -> BuildStatus {
        if outcomes.iter().any(|o| o.state == ModuleState::Failed) {
            BuildStatus::Failed
        } else {
            BuildStatus::Succeeded
        }
    }
}
