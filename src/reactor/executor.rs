//! Concurrent executor: drives the scheduler with a bounded worker pool.
//!
//! One task is spawned per claimed module, gated by a semaphore of `N`
//! permits, with outcomes reported back over an mpsc channel. A module is
//! only claimed once a permit is held, so at most `N` builds run at any
//! instant regardless of how many modules are ready.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::core::errors::{ReactorError, Result};
use crate::graph::project_graph::{ModuleId, ProjectGraph};
use crate::graph::weight::WeightCalculator;
use crate::reactor::config::BuildConfig;
use crate::reactor::policy::FailureCoordinator;
use crate::reactor::report::{BuildOutcome, BuildReport, BuildStatus};
use crate::reactor::scheduler::Scheduler;
use crate::resume::store::ResumptionSelector;

/// Render the payload of a panicked build task as an error summary.
fn panic_summary(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("module build panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("module build panicked: {message}")
    } else {
        "module build panicked".to_string()
    }
}

/// Immutable context handed to every worker task at dispatch time.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub graph: Arc<ProjectGraph>,
    pub config: BuildConfig,
}

/// The external "build one module" collaborator.
///
/// Opaque to this crate: it may take arbitrary wall-clock time and can fail.
/// It is called at most once per module per build and is never called for
/// two workers on the same module. An `Err` becomes a failed outcome; it is
/// never propagated out of the executor.
#[async_trait]
pub trait ModuleBuilder: Send + Sync + 'static {
    async fn build_module(&self, module: &ModuleId, ctx: &BuildContext) -> anyhow::Result<()>;
}

/// Orders and executes all modules of one multi-module build.
pub struct Reactor {
    graph: Arc<ProjectGraph>,
    weights: Arc<WeightCalculator>,
    config: BuildConfig,
    builder: Arc<dyn ModuleBuilder>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor").finish_non_exhaustive()
    }
}

impl Reactor {
    pub fn new(
        graph: Arc<ProjectGraph>,
        config: BuildConfig,
        builder: Arc<dyn ModuleBuilder>,
    ) -> Result<Self> {
        config.validate()?;
        let weights = Arc::new(WeightCalculator::new(graph.clone()));
        Ok(Self {
            graph,
            weights,
            config,
            builder,
        })
    }

    /// Build every module of the reactor.
    pub async fn run(&self) -> Result<BuildReport> {
        self.run_inner(None).await
    }

    /// Build only the modules matching `selection`; everything else is
    /// treated as already built. An empty selection restricts nothing and
    /// builds the whole reactor. Selectors matching nothing are warned about
    /// and otherwise ignored.
    pub async fn run_selected(&self, selection: &ResumptionSelector) -> Result<BuildReport> {
        if selection.is_empty() {
            return self.run_inner(None).await;
        }
        for selector in selection.unmatched_selectors(&self.graph) {
            warn!(selector, "resumption selector matches no module in the reactor");
        }
        self.run_inner(Some(selection)).await
    }

    async fn run_inner(&self, selection: Option<&ResumptionSelector>) -> Result<BuildReport> {
        let started_at = Utc::now();
        let scheduler = Arc::new(Scheduler::new(
            self.graph.clone(),
            self.weights.clone(),
            FailureCoordinator::new(self.config.failure_policy),
            selection,
        )?);

        let workers = self.config.parallelism.resolve();
        info!(
            modules = self.graph.len(),
            workers,
            policy = %self.config.failure_policy,
            "starting reactor build"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<BuildOutcome>();
        let ctx = Arc::new(BuildContext {
            graph: self.graph.clone(),
            config: self.config.clone(),
        });

        let mut outcomes = Vec::new();
        let mut active = 0usize;

        loop {
            // Dispatch while a permit is free and a module is ready. The
            // permit is taken before claiming, so a claimed module is always
            // immediately running.
            loop {
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let Some(module) = scheduler.claim_next() else {
                    drop(permit);
                    break;
                };
                active += 1;
                info!(module = %module, active, "dispatching module build");

                let builder = self.builder.clone();
                let ctx = ctx.clone();
                let tx = outcome_tx.clone();
                tokio::spawn(async move {
                    let start = Instant::now();
                    // A panicking collaborator must still produce an outcome,
                    // or the dispatch loop would wait for this task forever.
                    let result = AssertUnwindSafe(builder.build_module(&module, &ctx))
                        .catch_unwind()
                        .await;
                    let duration_ms = start.elapsed().as_millis() as u64;
                    let outcome = match result {
                        Ok(Ok(())) => BuildOutcome::succeeded(module, duration_ms),
                        Ok(Err(e)) => BuildOutcome::failed(module, duration_ms, format!("{e:#}")),
                        Err(panic) => {
                            BuildOutcome::failed(module, duration_ms, panic_summary(panic.as_ref()))
                        }
                    };
                    drop(permit);
                    let _ = tx.send(outcome);
                });
            }

            if active == 0 {
                // Nothing running and nothing claimable: the build is over.
                break;
            }

            match outcome_rx.recv().await {
                Some(outcome) => {
                    active -= 1;
                    match &outcome.error_summary {
                        None => info!(
                            module = %outcome.module,
                            duration_ms = outcome.duration_ms,
                            "module build succeeded"
                        ),
                        Some(summary) => error!(
                            module = %outcome.module,
                            duration_ms = outcome.duration_ms,
                            error = %summary,
                            "module build failed"
                        ),
                    }
                    let skipped = scheduler.record_outcome(&outcome)?;
                    outcomes.push(outcome);
                    for module in skipped {
                        info!(module = %module, "module skipped");
                        outcomes.push(BuildOutcome::skipped(module));
                    }
                }
                None => {
                    return Err(ReactorError::internal(
                        "outcome channel closed with builds in flight",
                    ));
                }
            }
        }

        let status = FailureCoordinator::aggregate_status(&outcomes);
        let report = BuildReport {
            outcomes,
            status,
            started_at,
            finished_at: Utc::now(),
        };
        match report.status {
            BuildStatus::Succeeded => info!(modules = report.outcomes.len(), "reactor build succeeded"),
            BuildStatus::Failed => error!(
                failed = report.failed_modules().len(),
                "reactor build failed"
            ),
        }
        Ok(report)
    }
}
