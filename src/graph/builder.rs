use std::collections::BTreeSet;

use petgraph::stable_graph::NodeIndex;

use crate::descriptor::{ClassDescriptor, generic_argument, short_name, strip_generic};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::query::circular::find_cycles;

use super::DependencyGraph;
use super::Resolution;
use super::classify::{classify_layer, classify_role};
use super::edge::{EdgeKind, GraphEdge};
use super::node::{ClassNode, Layer, Role};

/// A finished graph plus every soft error met while building it.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub graph: DependencyGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Single-writer graph construction. All mutation of a [`DependencyGraph`] goes through
/// one builder on one thread; the finished graph is then shared read-only.
pub struct GraphBuilder {
    graph: DependencyGraph,
    diagnostics: Vec<Diagnostic>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::from_graph(DependencyGraph::new())
    }

    /// Continue mutating an existing graph (partial runs).
    pub fn from_graph(graph: DependencyGraph) -> Self {
        Self {
            graph,
            diagnostics: Vec::new(),
        }
    }

    /// Build a graph wholesale from a descriptor sequence.
    ///
    /// Every node is registered before any edge is wired, so references resolve the same
    /// way regardless of stream order.
    pub fn build(descriptors: &[ClassDescriptor]) -> BuildOutput {
        let mut builder = Self::new();
        builder.add_all(descriptors);
        builder.finish()
    }

    /// Patch a previously built graph: drop the types of `removed_files`, replace the types
    /// of the files that `changed` descriptors come from, then re-infer message edges.
    ///
    /// Edges pointing *at* replaced types are kept as-is until the next full build.
    pub fn patch(
        graph: DependencyGraph,
        removed_files: &[String],
        changed_files: &[String],
        changed: &[ClassDescriptor],
    ) -> BuildOutput {
        let mut builder = Self::from_graph(graph);
        let stale: BTreeSet<&String> = removed_files.iter().chain(changed_files).collect();
        for file in stale {
            let dropped = builder.graph.remove_file(file);
            tracing::debug!(file = %file, dropped = dropped.len(), "removed stale nodes");
        }
        builder.add_all(changed);
        builder.finish()
    }

    /// Classify and add one descriptor.
    pub fn add_descriptor(&mut self, descriptor: ClassDescriptor) -> NodeIndex {
        let role = classify_role(&descriptor);
        let layer = classify_layer(&descriptor.project, role);
        let project = descriptor.project.clone();
        self.add_class(descriptor, role, project, layer)
    }

    /// Insert or replace the node for the descriptor's key and wire its structural edges
    /// (`inherits`, `implements`, `injects`). Idempotent per key.
    pub fn add_class(&mut self, descriptor: ClassDescriptor, role: Role, project: String, layer: Layer) -> NodeIndex {
        let key = descriptor.key();
        let idx = self.graph.upsert_class(ClassNode {
            descriptor: descriptor.clone(),
            role,
            project,
            layer,
        });

        for base in &descriptor.base_types {
            let res = self
                .graph
                .connect(idx, base, EdgeKind::Inherits, &format!("extends {base}"));
            self.note_ambiguity(&key, base, &res);
        }

        for iface in &descriptor.interfaces {
            let res = self
                .graph
                .connect(idx, iface, EdgeKind::Implements, &format!("implements {iface}"));
            for target in res.targets() {
                self.graph.register_implementer(&target, &key);
            }
            self.note_ambiguity(&key, iface, &res);
        }

        for param in &descriptor.constructor_params {
            let res = self.graph.connect(
                idx,
                &param.type_name,
                EdgeKind::Injects,
                &format!("constructor param: {}", param.name),
            );
            self.note_ambiguity(&key, &param.type_name, &res);
        }

        idx
    }

    /// Recompute every `handles` and `sends` edge from the current node set.
    pub fn link_messages(&mut self) {
        self.graph
            .remove_edges_of_kind(&[EdgeKind::Handles, EdgeKind::Sends]);

        let handlers = self.keys_with_role(Role::Handler);
        for handler in handlers {
            let Some(class) = self.graph.class(&handler) else {
                continue;
            };
            let d = class.descriptor.clone();
            let mut targets: Vec<String> = Vec::new();

            // Generic argument of a handler interface names the message.
            for iface in &d.interfaces {
                if let Some(arg) = generic_argument(iface) {
                    targets.extend(self.messages_named(arg));
                }
            }
            // Naming convention: XHandler handles XCommand / XQuery / X.
            if targets.is_empty()
                && let Some(base) = d.name.strip_suffix("Handler")
            {
                for candidate in [format!("{base}Command"), format!("{base}Query"), base.to_owned()] {
                    let found = self.messages_named(&candidate);
                    if !found.is_empty() {
                        targets.extend(found);
                        break;
                    }
                }
            }
            self.link(&handler, targets, EdgeKind::Handles, "handles");
        }

        let entries = self.keys_with_role(Role::EntryPoint);
        for entry in entries {
            let Some(class) = self.graph.class(&entry) else {
                continue;
            };
            let d = class.descriptor.clone();
            let mut targets: Vec<String> = Vec::new();

            for dispatched in &d.dispatches {
                targets.extend(self.messages_named(dispatched));
            }
            for param in &d.constructor_params {
                targets.extend(self.messages_named(&param.type_name));
            }
            // Endpoint<XRequest> dispatches XCommand / XQuery, or failing that any
            // message whose name starts with X.
            for base in &d.base_types {
                let Some(arg) = generic_argument(base) else {
                    continue;
                };
                let direct = self.messages_named(arg);
                if !direct.is_empty() {
                    targets.extend(direct);
                    continue;
                }
                let stem = short_name(arg).strip_suffix("Request").unwrap_or(short_name(arg));
                if stem.is_empty() {
                    continue;
                }
                let mut found: Vec<String> = [format!("{stem}Command"), format!("{stem}Query")]
                    .iter()
                    .flat_map(|c| self.messages_named(c))
                    .collect();
                if found.is_empty() {
                    found = self
                        .keys_with_role(Role::Message)
                        .into_iter()
                        .filter(|k| self.graph.class(k).is_some_and(|c| c.name().starts_with(stem)))
                        .collect();
                }
                targets.extend(found);
            }
            self.link(&entry, targets, EdgeKind::Sends, "dispatches");
        }
    }

    /// Infer message edges, collect unresolved-reference and cycle diagnostics, and hand
    /// back the frozen graph.
    pub fn finish(mut self) -> BuildOutput {
        self.link_messages();

        for edge in self.graph.edges() {
            if edge.unresolved {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedReference,
                    &edge.source,
                    format!("{} target `{}` is not a known type", edge.kind.as_str(), edge.target),
                ));
            }
        }

        for cycle in find_cycles(&self.graph) {
            let subject = cycle.first().cloned().unwrap_or_default();
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::CycleDetected,
                subject,
                format!("dependency cycle: {}", cycle.join(" -> ")),
            ));
        }

        tracing::info!(
            classes = self.graph.class_count(),
            edges = self.graph.edge_count(),
            unresolved = self.graph.unresolved_count(),
            diagnostics = self.diagnostics.len(),
            "built dependency graph"
        );

        BuildOutput {
            graph: self.graph,
            diagnostics: self.diagnostics,
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn add_all(&mut self, descriptors: &[ClassDescriptor]) {
        for d in descriptors {
            let role = classify_role(d);
            let layer = classify_layer(&d.project, role);
            self.graph.upsert_class(ClassNode {
                descriptor: d.clone(),
                role,
                project: d.project.clone(),
                layer,
            });
        }
        for d in descriptors {
            self.add_descriptor(d.clone());
        }
    }

    fn keys_with_role(&self, role: Role) -> Vec<String> {
        self.graph
            .classes()
            .into_iter()
            .filter(|c| c.role == role)
            .map(|c| c.key())
            .collect()
    }

    /// Declared message types a reference resolves to.
    fn messages_named(&self, reference: &str) -> Vec<String> {
        self.graph
            .resolve_reference(strip_generic(reference))
            .into_iter()
            .filter(|k| self.graph.class(k).is_some_and(|c| c.role == Role::Message))
            .collect()
    }

    fn link(&mut self, source: &str, targets: Vec<String>, kind: EdgeKind, verb: &str) {
        let Some(&from) = self.graph.key_index.get(source) else {
            return;
        };
        for target in targets {
            let Some(&to) = self.graph.key_index.get(&target) else {
                continue;
            };
            let name = short_name(&target).to_owned();
            self.graph
                .add_edge_once(from, to, GraphEdge::new(kind, format!("{verb} {name}")));
        }
    }

    fn note_ambiguity(&mut self, key: &str, reference: &str, res: &Resolution) {
        if let Resolution::Ambiguous(candidates) = res {
            tracing::warn!(from = key, reference, "ambiguous type reference");
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::AmbiguousReference,
                key,
                format!("`{reference}` matches {}", candidates.join(", ")),
            ));
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
