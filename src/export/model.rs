use serde::Serialize;

use crate::graph::edge::EdgeRecord;
use crate::graph::node::{Layer, Role};

/// Output format for graph export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
pub enum ExportFormat {
    /// Plain JSON node/edge list (default).
    #[default]
    Json,
    /// Graphviz DOT, for external visualization tools.
    Dot,
}

/// Parameters controlling a graph export operation.
#[derive(Debug, Clone, Default)]
pub struct ExportParams {
    pub format: ExportFormat,
    /// Export only this key and its N-hop neighbourhood (both directions).
    pub key_filter: Option<String>,
    /// Hop depth for the key neighbourhood (default: 1).
    pub depth: usize,
    /// Exclude types whose declaring file matches any of these glob patterns.
    pub exclude_patterns: Vec<String>,
    /// Keep placeholder nodes for unresolved references.
    pub include_unresolved: bool,
}

/// One exported node. Placeholders carry only their key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportNode {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    pub project: String,
    pub file: String,
    pub unresolved: bool,
}

/// The exported node/edge list, sorted by key and by (source, target, kind).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportDocument {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<EdgeRecord>,
}

/// Result of a graph export operation.
pub struct ExportResult {
    /// Rendered JSON or DOT text.
    pub content: String,
    pub node_count: usize,
    pub edge_count: usize,
}
