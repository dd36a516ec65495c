//! Priority weights for ready-queue ordering.
//!
//! A module's weight is the length of the longest chain of modules waiting on
//! it: `1 + max(weight(d))` over its direct dependents, or `1` when nothing
//! depends on it. Scheduling the heaviest ready module first keeps the
//! longest remaining chain moving, which maximizes achievable parallelism
//! late in the build.

use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::errors::Result;
use crate::graph::project_graph::{ModuleId, ProjectGraph};

/// Memoized weight computation over an immutable [`ProjectGraph`].
///
/// Safe for concurrent first-access from multiple workers: the weight is
/// computed outside any map lock and inserted with insert-if-absent, so a
/// racing duplicate computation is simply discarded. Weights are a pure
/// function of the graph, so every racer computes the same value.
#[derive(Debug)]
pub struct WeightCalculator {
    graph: Arc<ProjectGraph>,
    memo: DashMap<ModuleId, u64>,
}

impl WeightCalculator {
    pub fn new(graph: Arc<ProjectGraph>) -> Self {
        Self {
            graph,
            memo: DashMap::new(),
        }
    }

    /// Weight of `module`; computed lazily, cached for the build's lifetime.
    pub fn weight_of(&self, module: &ModuleId) -> Result<u64> {
        if let Some(weight) = self.memo.get(module) {
            return Ok(*weight);
        }

        // Recurse before touching the cache entry for this module, so the
        // shard lock is never held across a recursive call.
        let mut weight = 1;
        for dependent in self.graph.downstream_of(module, false)? {
            weight = weight.max(1 + self.weight_of(dependent)?);
        }

        Ok(*self.memo.entry(module.clone()).or_insert(weight))
    }

    /// Dispatch priority key for `module`.
    pub fn priority_key(&self, module: &ModuleId) -> Result<PriorityKey> {
        Ok(PriorityKey {
            weight: self.weight_of(module)?,
            coordinate: module.coordinate(),
        })
    }

    /// Orders modules by weight descending, ties broken by ascending
    /// coordinate. Deterministic across runs with identical inputs.
    pub fn compare_priority(&self, a: &ModuleId, b: &ModuleId) -> Result<Ordering> {
        Ok(self.priority_key(a)?.cmp(&self.priority_key(b)?))
    }
}

/// Ready-queue ordering key: `Ord` puts the highest-priority module first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityKey {
    weight: u64,
    coordinate: String,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| self.coordinate.cmp(&other.coordinate))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
