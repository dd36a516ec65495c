//! Scheduler: module state machine and the weighted ready queue.
//!
//! State machine per module: `Pending -> Ready -> Running -> {Succeeded |
//! Failed}`, with `Skipped` reachable from `Pending`/`Ready` only through the
//! failure coordinator. All mutable state lives behind one mutex with short
//! critical sections, so a ready module can never be claimed by two workers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::core::errors::{ReactorError, Result};
use crate::graph::project_graph::{ModuleId, ProjectGraph};
use crate::graph::weight::{PriorityKey, WeightCalculator};
use crate::reactor::policy::{FailureCoordinator, FailureDirective};
use crate::reactor::report::{BuildOutcome, ModuleState};
use crate::resume::store::ResumptionSelector;

pub struct Scheduler {
    graph: Arc<ProjectGraph>,
    weights: Arc<WeightCalculator>,
    coordinator: FailureCoordinator,
    inner: Mutex<SchedulerState>,
}

struct SchedulerState {
    states: HashMap<ModuleId, ModuleState>,
    /// Ready modules keyed by priority; first entry is dispatched next.
    ready: BTreeMap<PriorityKey, ModuleId>,
    halted: bool,
}

impl Scheduler {
    /// Seed every module `Pending` and promote those whose prerequisites are
    /// already satisfied. With a selection, modules outside it are treated as
    /// already built: transitioned straight to `Succeeded` without ever being
    /// dispatched.
    pub fn new(
        graph: Arc<ProjectGraph>,
        weights: Arc<WeightCalculator>,
        coordinator: FailureCoordinator,
        selection: Option<&ResumptionSelector>,
    ) -> Result<Self> {
        let mut states = HashMap::with_capacity(graph.len());
        for module in graph.modules() {
            let state = match selection {
                Some(selection) if !selection.matches(module) => ModuleState::Succeeded,
                _ => ModuleState::Pending,
            };
            states.insert(module.clone(), state);
        }

        let scheduler = Self {
            graph: graph.clone(),
            weights,
            coordinator,
            inner: Mutex::new(SchedulerState {
                states,
                ready: BTreeMap::new(),
                halted: false,
            }),
        };

        {
            let mut inner = scheduler.lock();
            for module in graph.modules() {
                scheduler.try_promote(&mut inner, module)?;
            }
        }

        Ok(scheduler)
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out the highest-priority ready module and mark it `Running`.
    /// Returns `None` when nothing is ready right now; the caller decides
    /// via [`Scheduler::is_finished`] whether the build is over.
    pub fn claim_next(&self) -> Option<ModuleId> {
        let mut inner = self.lock();
        let (key, module) = inner.ready.pop_first()?;
        inner.states.insert(module.clone(), ModuleState::Running);
        debug!(module = %module, key = ?key, "claimed for execution");
        Some(module)
    }

    /// Apply a terminal outcome, consult the failure coordinator, and promote
    /// newly eligible dependents. Returns the modules that were skipped as a
    /// consequence, in coordinate order, so the caller can record them.
    pub fn record_outcome(&self, outcome: &BuildOutcome) -> Result<Vec<ModuleId>> {
        let module = &outcome.module;
        if !matches!(outcome.state, ModuleState::Succeeded | ModuleState::Failed) {
            return Err(ReactorError::internal(format!(
                "non-terminal outcome recorded for {}: {}",
                module,
                outcome.state.as_str()
            )));
        }

        let mut inner = self.lock();
        inner.states.insert(module.clone(), outcome.state);

        let mut skipped = Vec::new();
        match outcome.state {
            ModuleState::Succeeded => {
                self.promote_dependents(&mut inner, module)?;
            }
            ModuleState::Failed => {
                match self.coordinator.on_module_failure(&self.graph, module)? {
                    FailureDirective::Halt => {
                        inner.halted = true;
                        inner.ready.clear();
                        for (m, state) in inner.states.iter_mut() {
                            if matches!(state, ModuleState::Pending | ModuleState::Ready) {
                                *state = ModuleState::Skipped;
                                skipped.push(m.clone());
                            }
                        }
                    }
                    FailureDirective::Skip(dependents) => {
                        for dependent in dependents {
                            let state = inner.states.get_mut(&dependent).ok_or_else(|| {
                                ReactorError::unknown_module(dependent.coordinate())
                            })?;
                            if !matches!(state, ModuleState::Pending | ModuleState::Ready) {
                                continue;
                            }
                            let was_ready = *state == ModuleState::Ready;
                            *state = ModuleState::Skipped;
                            if was_ready {
                                let key = self.weights.priority_key(&dependent)?;
                                inner.ready.remove(&key);
                            }
                            skipped.push(dependent);
                        }
                    }
                    FailureDirective::Continue => {
                        self.promote_dependents(&mut inner, module)?;
                    }
                }
            }
            _ => unreachable!("guarded above"),
        }

        skipped.sort();
        Ok(skipped)
    }

    /// The build is over when nothing is running and nothing is ready.
    pub fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.ready.is_empty()
            && !inner
                .states
                .values()
                .any(|state| *state == ModuleState::Running)
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }

    pub fn state_of(&self, module: &ModuleId) -> Option<ModuleState> {
        self.lock().states.get(module).copied()
    }

    /// Re-evaluate the direct dependents of a freshly terminal module.
    fn promote_dependents(
        &self,
        inner: &mut SchedulerState,
        module: &ModuleId,
    ) -> Result<()> {
        for dependent in self.graph.downstream_of(module, false)? {
            self.try_promote(inner, dependent)?;
        }
        Ok(())
    }

    /// Promote `module` from `Pending` to `Ready` if every prerequisite is in
    /// a state the coordinator treats as non-blocking.
    fn try_promote(&self, inner: &mut SchedulerState, module: &ModuleId) -> Result<()> {
        if inner.halted || inner.states.get(module) != Some(&ModuleState::Pending) {
            return Ok(());
        }
        let eligible = self.graph.upstream_of(module)?.iter().all(|upstream| {
            inner
                .states
                .get(*upstream)
                .is_some_and(|state| self.coordinator.satisfies_dependents(*state))
        });
        if eligible {
            inner.states.insert(module.clone(), ModuleState::Ready);
            let key = self.weights.priority_key(module)?;
            inner.ready.insert(key, module.clone());
            debug!(module = %module, "promoted to ready");
        }
        Ok(())
    }
}
