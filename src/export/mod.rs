pub mod dot;
pub mod model;

use std::collections::BTreeSet;

use crate::graph::DependencyGraph;
use crate::graph::node::GraphNode;

use model::{ExportDocument, ExportFormat, ExportNode, ExportParams, ExportResult};

/// Export the dependency graph as a JSON node/edge list or DOT.
///
/// Steps:
/// 1. Select visible nodes: `--exclude` globs on declaring files, optional key
///    neighbourhood, placeholders only when asked for.
/// 2. Keep the edges whose endpoints are both visible.
/// 3. Render in the requested format.
pub fn export_graph(graph: &DependencyGraph, params: &ExportParams) -> anyhow::Result<ExportResult> {
    let doc = build_document(graph, params)?;
    let content = match params.format {
        ExportFormat::Json => serde_json::to_string_pretty(&doc)?,
        ExportFormat::Dot => dot::render_dot(&doc),
    };
    Ok(ExportResult {
        content,
        node_count: doc.nodes.len(),
        edge_count: doc.edges.len(),
    })
}

/// The filtered node/edge list, before rendering.
pub fn build_document(graph: &DependencyGraph, params: &ExportParams) -> anyhow::Result<ExportDocument> {
    let patterns: Vec<glob::Pattern> = params
        .exclude_patterns
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| anyhow::anyhow!("invalid exclude pattern `{p}`: {e}")))
        .collect::<anyhow::Result<_>>()?;

    let neighbourhood: Option<BTreeSet<String>> = match &params.key_filter {
        Some(key) => {
            let Some(node) = graph.node(key) else {
                anyhow::bail!("no type with key `{key}` in the graph");
            };
            let depth = params.depth.max(1);
            let origin = node.key();
            let mut keys = graph.all_upstream(&origin, depth);
            keys.extend(graph.all_downstream(&origin, depth));
            keys.insert(origin);
            Some(keys)
        }
        None => None,
    };

    let mut nodes: Vec<ExportNode> = graph
        .graph
        .node_indices()
        .filter_map(|idx| {
            let node = &graph.graph[idx];
            if neighbourhood.as_ref().is_some_and(|keys| !keys.contains(&node.key())) {
                return None;
            }
            match node {
                GraphNode::Class(c) => {
                    let file = crate::graph::normalize_path(c.file());
                    if patterns.iter().any(|p| p.matches(&file)) {
                        return None;
                    }
                    Some(ExportNode {
                        key: c.key(),
                        name: c.name().to_owned(),
                        role: Some(c.role),
                        layer: Some(c.layer),
                        project: c.project.clone(),
                        file,
                        unresolved: false,
                    })
                }
                GraphNode::Unresolved { key } => params.include_unresolved.then(|| ExportNode {
                    key: key.clone(),
                    name: crate::descriptor::short_name(key).to_owned(),
                    role: None,
                    layer: None,
                    project: String::new(),
                    file: String::new(),
                    unresolved: true,
                }),
            }
        })
        .collect();
    nodes.sort_by(|a, b| a.key.cmp(&b.key));

    let visible: BTreeSet<&str> = nodes.iter().map(|n| n.key.as_str()).collect();
    let edges = graph
        .edges()
        .into_iter()
        .filter(|e| visible.contains(e.source.as_str()) && visible.contains(e.target.as_str()))
        .collect();

    Ok(ExportDocument { nodes, edges })
}
