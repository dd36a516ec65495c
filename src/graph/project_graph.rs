//! Immutable dependency graph over the modules of one multi-module build.
//!
//! The graph is computed once at build start and never mutated afterwards, so
//! it is safe for concurrent read-only access from every scheduler worker.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

use crate::core::errors::{ReactorError, Result};

/// Identifying coordinate of one buildable module: group, artifact, version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ModuleId {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// The `group:artifact:version` form used in logs, reports and selectors.
    pub fn coordinate(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Graph construction input: one module plus its declared direct prerequisites.
///
/// Produced by the surrounding model-loading subsystem; this crate only
/// consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    /// Modules that must finish building before this one starts.
    #[serde(default)]
    pub upstream: Vec<ModuleId>,
}

impl ModuleDescriptor {
    pub fn new(id: ModuleId, upstream: Vec<ModuleId>) -> Self {
        Self { id, upstream }
    }
}

/// Directed acyclic graph over the modules of one build.
///
/// An edge `A -> B` means "A depends on B": B must finish before A starts.
#[derive(Debug)]
pub struct ProjectGraph {
    graph: DiGraph<ModuleId, ()>,
    indices: HashMap<ModuleId, NodeIndex>,
}

impl ProjectGraph {
    /// Build the graph from module descriptors.
    ///
    /// Fails with `DuplicateModule` if two descriptors share a coordinate and
    /// with `CycleDetected` if the declared dependencies are not acyclic.
    /// Upstream references to modules outside this reactor are external
    /// dependencies and do not become edges.
    pub fn from_descriptors(descriptors: Vec<ModuleDescriptor>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(descriptors.len());

        for descriptor in &descriptors {
            let idx = graph.add_node(descriptor.id.clone());
            if indices.insert(descriptor.id.clone(), idx).is_some() {
                return Err(ReactorError::DuplicateModule {
                    coordinate: descriptor.id.coordinate(),
                });
            }
        }

        for descriptor in &descriptors {
            let from = indices[&descriptor.id];
            for upstream in &descriptor.upstream {
                match indices.get(upstream) {
                    Some(&to) => {
                        graph.add_edge(from, to, ());
                    }
                    None => {
                        // Not part of this reactor; resolved externally.
                        debug!(
                            module = %descriptor.id,
                            dependency = %upstream,
                            "upstream reference is outside the reactor, ignoring"
                        );
                    }
                }
            }
        }

        if let Some(cycle) = find_cycle(&graph) {
            return Err(ReactorError::CycleDetected { cycle });
        }

        Ok(Self { graph, indices })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.indices.contains_key(module)
    }

    /// All modules of this reactor, in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.graph.node_weights()
    }

    fn index_of(&self, module: &ModuleId) -> Result<NodeIndex> {
        self.indices
            .get(module)
            .copied()
            .ok_or_else(|| ReactorError::unknown_module(module.coordinate()))
    }

    /// Direct prerequisites of `module`: every module it depends on.
    pub fn upstream_of(&self, module: &ModuleId) -> Result<Vec<&ModuleId>> {
        let idx = self.index_of(module)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| &self.graph[n])
            .collect())
    }

    /// Modules that depend on `module`, directly or (if `transitive`)
    /// through any chain of dependencies.
    pub fn downstream_of(&self, module: &ModuleId, transitive: bool) -> Result<Vec<&ModuleId>> {
        let start = self.index_of(module)?;
        if !transitive {
            return Ok(self
                .graph
                .neighbors_directed(start, Direction::Incoming)
                .map(|n| &self.graph[n])
                .collect());
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();
        while let Some(idx) = queue.pop_front() {
            for dependent in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if seen.insert(dependent) {
                    result.push(&self.graph[dependent]);
                    queue.push_back(dependent);
                }
            }
        }
        Ok(result)
    }
}

/// Extract one offending cycle for error reporting, or None if acyclic.
/// The reported path follows actual dependency edges, first and last entry
/// being the same module.
fn find_cycle(graph: &DiGraph<ModuleId, ()>) -> Option<Vec<String>> {
    for scc in tarjan_scc(graph) {
        let cyclic = scc.len() > 1 || graph.find_edge(scc[0], scc[0]).is_some();
        if !cyclic {
            continue;
        }
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();

        // Every node of a cyclic component has a successor inside it, so
        // walking in-component edges must revisit a node; the walk from that
        // node's first occurrence is a genuine cycle.
        let mut path = vec![scc[0]];
        let mut first_seen = HashMap::from([(scc[0], 0)]);
        let mut current = scc[0];
        loop {
            let Some(next) = graph
                .neighbors_directed(current, Direction::Outgoing)
                .find(|n| members.contains(n))
            else {
                break;
            };
            if let Some(&start) = first_seen.get(&next) {
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&n| graph[n].coordinate()).collect();
                cycle.push(graph[next].coordinate());
                return Some(cycle);
            }
            first_seen.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(artifact: &str) -> ModuleId {
        ModuleId::new("com.acme", artifact, "1.0")
    }

    fn diamond() -> ProjectGraph {
        // a depends on b and c; b and c depend on d
        ProjectGraph::from_descriptors(vec![
            ModuleDescriptor::new(id("a"), vec![id("b"), id("c")]),
            ModuleDescriptor::new(id("b"), vec![id("d")]),
            ModuleDescriptor::new(id("c"), vec![id("d")]),
            ModuleDescriptor::new(id("d"), vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn upstream_and_downstream_directions() {
        let graph = diamond();

        let mut upstream = graph.upstream_of(&id("a")).unwrap();
        upstream.sort();
        assert_eq!(upstream, vec![&id("b"), &id("c")]);

        assert!(graph.upstream_of(&id("d")).unwrap().is_empty());

        let mut direct = graph.downstream_of(&id("d"), false).unwrap();
        direct.sort();
        assert_eq!(direct, vec![&id("b"), &id("c")]);

        let mut transitive = graph.downstream_of(&id("d"), true).unwrap();
        transitive.sort();
        assert_eq!(transitive, vec![&id("a"), &id("b"), &id("c")]);
    }

    #[test]
    fn duplicate_module_is_fatal() {
        let err = ProjectGraph::from_descriptors(vec![
            ModuleDescriptor::new(id("a"), vec![]),
            ModuleDescriptor::new(id("a"), vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, ReactorError::DuplicateModule { .. }));
    }

    #[test]
    fn cycle_is_fatal_and_reported() {
        let err = ProjectGraph::from_descriptors(vec![
            ModuleDescriptor::new(id("a"), vec![id("b")]),
            ModuleDescriptor::new(id("b"), vec![id("a")]),
        ])
        .unwrap_err();
        match err {
            ReactorError::CycleDetected { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn reported_cycle_follows_dependency_edges() {
        // a depends on b, b on c, c on a.
        let err = ProjectGraph::from_descriptors(vec![
            ModuleDescriptor::new(id("a"), vec![id("b")]),
            ModuleDescriptor::new(id("b"), vec![id("c")]),
            ModuleDescriptor::new(id("c"), vec![id("a")]),
        ])
        .unwrap_err();
        let cycle = match err {
            ReactorError::CycleDetected { cycle } => cycle,
            other => panic!("expected CycleDetected, got {other:?}"),
        };

        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        // Each consecutive pair is a declared dependency.
        let depends_on = |from: &str, to: &str| match from.split(':').nth(1) {
            Some("a") => to.contains(":b:"),
            Some("b") => to.contains(":c:"),
            Some("c") => to.contains(":a:"),
            _ => false,
        };
        for pair in cycle.windows(2) {
            assert!(
                depends_on(&pair[0], &pair[1]),
                "{} -> {} is not a dependency edge",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn external_upstream_references_are_ignored() {
        let graph = ProjectGraph::from_descriptors(vec![ModuleDescriptor::new(
            id("a"),
            vec![ModuleId::new("org.external", "lib", "2.0")],
        )])
        .unwrap();
        assert!(graph.upstream_of(&id("a")).unwrap().is_empty());
    }

    #[test]
    fn unknown_module_lookup_fails() {
        let graph = diamond();
        let err = graph.upstream_of(&id("missing")).unwrap_err();
        assert!(matches!(err, ReactorError::UnknownModule { .. }));
    }
}
