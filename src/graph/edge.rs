/// The kind of directed edge between two types in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Source takes target as a constructor parameter.
    Injects,
    /// Source extends target.
    Inherits,
    /// Source implements target interface.
    Implements,
    /// Entry point -> message it dispatches.
    Sends,
    /// Handler -> message it handles.
    Handles,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Injects => "injects",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Implements => "implements",
            EdgeKind::Sends => "sends",
            EdgeKind::Handles => "handles",
        }
    }
}

/// Edge weight stored in the graph. Endpoints live in the graph structure itself.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    /// Human-readable label, e.g. `constructor param: repository`.
    pub label: String,
}

impl GraphEdge {
    pub fn new(kind: EdgeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// An edge flattened to keys, as handed to callers and exported.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub label: String,
    /// True when the target is an unresolved placeholder.
    pub unresolved: bool,
}
