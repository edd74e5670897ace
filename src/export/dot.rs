use std::fmt::Write;

use crate::export::model::ExportDocument;
use crate::graph::edge::EdgeKind;
use crate::graph::node::Role;

/// Sanitize a string for use as a DOT node ID.
///
/// Replaces non-alphanumeric characters with `_`. Prepends `n` if the result
/// starts with a digit (DOT IDs must not start with a digit).
pub fn sanitize_dot_id(s: &str) -> String {
    let mut result: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, 'n');
    }
    if result.is_empty() {
        result = "node".to_string();
    }
    result
}

fn role_fillcolor(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::EntryPoint) => "#AED6F1",
        Some(Role::Message) => "#F9E79F",
        Some(Role::Handler) => "#A9DFBF",
        Some(Role::Repository) => "#FAD7A0",
        Some(Role::Entity) => "#F1948A",
        Some(Role::Service) => "#D7BDE2",
        Some(Role::Validator | Role::Middleware) => "#FDFEFE",
        Some(Role::Configuration | Role::Other) => "#EAECEE",
        None => "#FFFFFF",
    }
}

fn edge_style(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Injects => "style=solid",
        EdgeKind::Inherits => "style=solid arrowhead=onormal",
        EdgeKind::Implements => "style=dashed arrowhead=onormal",
        EdgeKind::Sends => "style=bold color=blue",
        EdgeKind::Handles => "style=bold color=darkgreen",
    }
}

/// Render an export document as a DOT digraph, one cluster per project.
pub fn render_dot(doc: &ExportDocument) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "digraph code_flow {{");
    let _ = writeln!(out, "    rankdir=LR;");
    let _ = writeln!(out, "    node [shape=box style=filled fontname=monospace];");

    let mut projects: Vec<&str> = doc.nodes.iter().map(|n| n.project.as_str()).collect();
    projects.sort();
    projects.dedup();

    for project in projects {
        let nodes = doc.nodes.iter().filter(|n| n.project == project);
        let indent = if project.is_empty() {
            "    "
        } else {
            let _ = writeln!(out, "    subgraph cluster_{} {{", sanitize_dot_id(project));
            let _ = writeln!(out, "        label=\"{}\";", project);
            "        "
        };
        for node in nodes {
            let role = node.role.map(|r| r.as_str()).unwrap_or("unresolved");
            let style = if node.unresolved { " style=\"filled,dashed\"" } else { "" };
            let _ = writeln!(
                out,
                "{indent}{} [label=\"{}\\n{}\" fillcolor=\"{}\"{}];",
                sanitize_dot_id(&node.key),
                node.name,
                role,
                role_fillcolor(node.role),
                style
            );
        }
        if !project.is_empty() {
            let _ = writeln!(out, "    }}");
        }
    }

    for edge in &doc.edges {
        let _ = writeln!(
            out,
            "    {} -> {} [{} label=\"{}\"];",
            sanitize_dot_id(&edge.source),
            sanitize_dot_id(&edge.target),
            edge_style(edge.kind),
            edge.kind.as_str()
        );
    }

    let _ = writeln!(out, "}}");
    out
}
