use serde::Serialize;

/// Category of a soft error collected during a run.
///
/// None of these interrupt processing: they are accumulated and returned next to the
/// primary result so the caller can decide what to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An edge target or an expected interface implementation is not in the graph.
    UnresolvedReference,
    /// A reference matched several candidates; all were kept.
    AmbiguousReference,
    /// A dependency cycle was observed. Informational only.
    CycleDetected,
    /// One source unit from the descriptor stream could not be used.
    MalformedDescriptor,
    /// An entry point had no resolvable message and produced no flow.
    SkippedEntryPoint,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedReference => "unresolved",
            DiagnosticKind::AmbiguousReference => "ambiguous",
            DiagnosticKind::CycleDetected => "cycle",
            DiagnosticKind::MalformedDescriptor => "malformed",
            DiagnosticKind::SkippedEntryPoint => "skipped",
        }
    }
}

/// A single soft error: what kind, which node/file/edge it concerns, and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Node key, file path or edge description the diagnostic is attached to.
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.subject, self.message)
    }
}
