//! Reactor - a dependency-ordered scheduler for multi-module builds.
//!
//! Turns a module dependency graph into an execution plan: modules become
//! ready once their prerequisites succeed, ready modules are dispatched to a
//! bounded worker pool in descending-weight order, failures are interpreted
//! by a configurable policy, and the set of not-yet-successful modules can be
//! persisted so a failed build resumes without re-running finished work.

// Core infrastructure modules
pub mod core {
    pub mod errors;
}

pub mod graph;   // dependency graph + priority weights
pub mod reactor; // scheduler, executor, failure policy, report
pub mod resume;  // resumption selectors + persisted state

// Re-exports for convenience
pub use crate::core::errors::{ReactorError, Result};
pub use graph::{ModuleDescriptor, ModuleId, ProjectGraph, WeightCalculator};
pub use reactor::{
    BuildConfig, BuildContext, BuildOutcome, BuildReport, BuildStatus, FailureCoordinator,
    FailurePolicy, ModuleBuilder, ModuleState, Parallelism, Reactor, Scheduler,
};
pub use resume::{ResumptionSelector, ResumptionStateStore};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopBuilder;

    #[async_trait]
    impl ModuleBuilder for NoopBuilder {
        async fn build_module(
            &self,
            _module: &ModuleId,
            _ctx: &BuildContext,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_reactor_succeeds_immediately() {
        let graph = Arc::new(ProjectGraph::from_descriptors(vec![]).unwrap());
        let reactor = Reactor::new(graph, BuildConfig::default(), Arc::new(NoopBuilder)).unwrap();
        let report = reactor.run().await.unwrap();
        assert_eq!(report.status, BuildStatus::Succeeded);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn single_module_reactor_builds_it() {
        let graph = Arc::new(
            ProjectGraph::from_descriptors(vec![ModuleDescriptor::new(
                ModuleId::new("com.acme", "app", "1.0"),
                vec![],
            )])
            .unwrap(),
        );
        let reactor = Reactor::new(graph, BuildConfig::default(), Arc::new(NoopBuilder)).unwrap();
        let report = reactor.run().await.unwrap();
        assert_eq!(report.status, BuildStatus::Succeeded);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].state, ModuleState::Succeeded);
    }
}
