use std::collections::HashMap;

use petgraph::Directed;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::Graph;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::graph::DependencyGraph;

/// Detect dependency cycles between declared types.
///
/// Uses Kosaraju's SCC algorithm on a class-only subgraph (placeholders are left out, so
/// references to unknown types never close a cycle). SCCs with more than one node are
/// cycles; a type referencing itself is legal and not reported.
///
/// Each cycle lists its keys sorted, with the first key repeated at the end to close it.
/// Cycles are sorted by their first key.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    // kosaraju_scc wants a plain Graph, so project the class nodes into one.
    let mut class_graph: Graph<NodeIndex, (), Directed> = Graph::new();
    let mut orig_to_new: HashMap<NodeIndex, petgraph::graph::NodeIndex> = HashMap::new();

    for orig_idx in graph.graph.node_indices() {
        if graph.graph[orig_idx].is_unresolved() {
            continue;
        }
        let new_idx = class_graph.add_node(orig_idx);
        orig_to_new.insert(orig_idx, new_idx);
    }

    for edge_ref in graph.graph.edge_references() {
        if let (Some(&src), Some(&dst)) = (
            orig_to_new.get(&edge_ref.source()),
            orig_to_new.get(&edge_ref.target()),
        ) && src != dst
        {
            class_graph.add_edge(src, dst, ());
        }
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&class_graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut keys: Vec<String> = scc
                .iter()
                .map(|&new_idx| graph.graph[class_graph[new_idx]].key())
                .collect();
            keys.sort();
            let first = keys[0].clone();
            keys.push(first);
            keys
        })
        .collect();

    cycles.sort_by(|a, b| a[0].cmp(&b[0]));
    cycles
}
