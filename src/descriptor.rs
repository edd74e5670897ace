use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Structural kind of a declared type, as reported by the upstream analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralKind {
    #[default]
    Class,
    Record,
    Struct,
    Interface,
    Enum,
}

/// A constructor parameter: the injected dependency's declared name and type as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    /// Type as written in source, generics included (e.g. `IRepository<Contributor>`).
    pub type_name: String,
}

/// Structural facts about one declared type. Produced upstream, never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    /// Short identifier, e.g. `CreateContributorHandler`.
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Declaring project / compiled unit. Filled from the enclosing [`SourceUnit`] when empty.
    #[serde(default)]
    pub project: String,
    /// Declaring source file. Filled from the enclosing [`SourceUnit`] when empty.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub kind: StructuralKind,
    #[serde(default)]
    pub base_types: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub constructor_params: Vec<ParamDescriptor>,
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Message types the analyzer observed this type dispatching (mediator sends etc.).
    #[serde(default)]
    pub dispatches: Vec<String>,
}

impl ClassDescriptor {
    /// The unique graph key: `namespace.name`, or just `name` without a namespace.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// One line of the descriptor stream: everything extracted from a single source file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceUnit {
    pub file: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub classes: Vec<ClassDescriptor>,
    /// Set by the upstream analyzer when extraction of this file failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoded descriptor stream: usable descriptors plus diagnostics for skipped units.
#[derive(Debug, Default)]
pub struct DescriptorBatch {
    pub classes: Vec<ClassDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
    /// Files that contributed at least one unit (including empty ones).
    pub files: Vec<String>,
}

/// Load a JSON Lines descriptor stream from disk.
///
/// Lines are decoded in parallel; the returned batch preserves line order so that the
/// single-threaded graph insertion downstream is deterministic.
pub fn load_descriptors(path: &Path) -> anyhow::Result<DescriptorBatch> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor stream {}", path.display()))?;
    Ok(parse_descriptor_stream(&contents))
}

/// Decode a JSON Lines descriptor stream. Never fails: a bad line or a unit flagged with
/// an upstream error skips that file's contribution and records a diagnostic.
pub fn parse_descriptor_stream(contents: &str) -> DescriptorBatch {
    let lines: Vec<(usize, &str)> = contents
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    let decoded: Vec<(usize, Result<SourceUnit, serde_json::Error>)> = lines
        .par_iter()
        .map(|&(no, line)| (no + 1, serde_json::from_str::<SourceUnit>(line)))
        .collect();

    let mut batch = DescriptorBatch::default();
    for (line_no, result) in decoded {
        match result {
            Ok(unit) => {
                if let Some(err) = unit.error {
                    tracing::warn!(file = %unit.file, "skipping source unit: {err}");
                    batch.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MalformedDescriptor,
                        unit.file,
                        format!("upstream extraction failed: {err}"),
                    ));
                    continue;
                }
                batch.files.push(unit.file.clone());
                for mut class in unit.classes {
                    if class.file.is_empty() {
                        class.file = unit.file.clone();
                    }
                    if class.project.is_empty() {
                        class.project = unit.project.clone();
                    }
                    batch.classes.push(class);
                }
            }
            Err(err) => {
                tracing::warn!(line = line_no, "undecodable descriptor line: {err}");
                batch.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MalformedDescriptor,
                    format!("line {line_no}"),
                    err.to_string(),
                ));
            }
        }
    }
    batch
}

// ---------------------------------------------------------------------------
// Type-name helpers
// ---------------------------------------------------------------------------

static GENERIC_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*([^<>,\s]+)").unwrap_or_else(|e| panic!("invalid generic regex: {e}"))
});

/// Strip generic parameters: `IRepository<Contributor>` -> `IRepository`.
pub fn strip_generic(type_name: &str) -> &str {
    match type_name.find('<') {
        Some(idx) => type_name[..idx].trim(),
        None => type_name.trim(),
    }
}

/// First generic argument: `IRepository<Contributor>` -> `Contributor`.
pub fn generic_argument(type_name: &str) -> Option<&str> {
    GENERIC_ARG
        .captures(type_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Last dotted segment of a (generic-stripped) name: `App.Core.Foo` -> `Foo`.
pub fn short_name(type_name: &str) -> &str {
    let stripped = strip_generic(type_name);
    stripped.rsplit('.').next().unwrap_or(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_with_and_without_namespace() {
        let mut d: ClassDescriptor =
            serde_json::from_str(r#"{"name":"Foo","namespace":"App.Core"}"#).unwrap();
        assert_eq!(d.key(), "App.Core.Foo");
        d.namespace.clear();
        assert_eq!(d.key(), "Foo");
    }

    #[test]
    fn test_generic_helpers() {
        assert_eq!(strip_generic("IRepository<Contributor>"), "IRepository");
        assert_eq!(strip_generic("Plain"), "Plain");
        assert_eq!(generic_argument("IRepository<Contributor>"), Some("Contributor"));
        assert_eq!(generic_argument("IHandler< Foo , Bar>"), Some("Foo"));
        assert_eq!(generic_argument("Plain"), None);
        assert_eq!(short_name("App.Core.IRepository<App.Core.Foo>"), "IRepository");
    }

    #[test]
    fn test_stream_fills_file_and_project_from_unit() {
        let stream = r#"{"file":"src/A.cs","project":"App.Core","classes":[{"name":"A"}]}"#;
        let batch = parse_descriptor_stream(stream);
        assert_eq!(batch.classes.len(), 1);
        assert_eq!(batch.classes[0].file, "src/A.cs");
        assert_eq!(batch.classes[0].project, "App.Core");
        assert!(batch.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_units_are_skipped_not_fatal() {
        let stream = [
            r#"{"file":"a.cs","classes":[{"name":"A"}]}"#,
            r#"{not json"#,
            r#"{"file":"b.cs","error":"parse failure","classes":[{"name":"B"}]}"#,
            "",
            r#"{"file":"c.cs","classes":[{"name":"C"}]}"#,
        ]
        .join("\n");
        let batch = parse_descriptor_stream(&stream);
        let names: Vec<&str> = batch.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"], "order preserved, bad units skipped");
        assert_eq!(batch.diagnostics.len(), 2);
        assert!(
            batch
                .diagnostics
                .iter()
                .all(|d| d.kind == DiagnosticKind::MalformedDescriptor)
        );
        assert_eq!(batch.diagnostics[0].subject, "line 2");
        assert_eq!(batch.diagnostics[1].subject, "b.cs");
    }
}
