use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::graph::{
    DependencyGraph,
    edge::EdgeKind,
    node::{Layer, Role},
};

/// Aggregated statistics derived from a built `DependencyGraph`.
#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub class_count: usize,
    pub unresolved_count: usize,
    pub edge_count: usize,
    pub projects: usize,
    pub by_role: BTreeMap<Role, usize>,
    pub by_layer: BTreeMap<Layer, usize>,
    pub by_edge_kind: BTreeMap<EdgeKind, usize>,
    /// Interfaces with at least one known implementer.
    pub interfaces_implemented: usize,
}

/// Compute statistics from a built `DependencyGraph`.
pub fn graph_stats(graph: &DependencyGraph) -> GraphStats {
    let mut by_role: BTreeMap<Role, usize> = BTreeMap::new();
    let mut by_layer: BTreeMap<Layer, usize> = BTreeMap::new();
    let mut projects: BTreeSet<&str> = BTreeSet::new();
    let classes = graph.classes();
    for class in &classes {
        *by_role.entry(class.role).or_insert(0) += 1;
        *by_layer.entry(class.layer).or_insert(0) += 1;
        if !class.project.is_empty() {
            projects.insert(class.project.as_str());
        }
    }

    let mut by_edge_kind: BTreeMap<EdgeKind, usize> = BTreeMap::new();
    for e in graph.graph.edge_indices() {
        *by_edge_kind.entry(graph.graph[e].kind).or_insert(0) += 1;
    }

    GraphStats {
        class_count: classes.len(),
        unresolved_count: graph.unresolved_count(),
        edge_count: graph.edge_count(),
        projects: projects.len(),
        by_role,
        by_layer,
        by_edge_kind,
        interfaces_implemented: graph.interface_index.values().filter(|v| !v.is_empty()).count(),
    }
}
