pub mod naming;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::descriptor::{StructuralKind, generic_argument, short_name, strip_generic};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::graph::DependencyGraph;
use crate::graph::edge::EdgeKind;
use crate::graph::node::{ClassNode, Layer, Role};

use naming::{derive_entry, derive_flow_name, slugify};

/// Handler key or short name -> event names the handler is known to raise.
pub type RaisesMap = HashMap<String, Vec<String>>;

/// Constructor parameters whose type contains one of these are plumbing, not flow steps.
const PLUMBING_PARAMS: &[&str] = &["mediator", "logger"];

/// Dispatch interfaces skipped by exact short name; `IEmailSender` is still a service.
const PLUMBING_TYPES: &[&str] = &["ISender", "IPublisher"];

fn is_plumbing(type_name: &str) -> bool {
    let lower = strip_generic(type_name).to_lowercase();
    PLUMBING_PARAMS.iter().any(|p| lower.contains(p)) || PLUMBING_TYPES.contains(&short_name(type_name))
}

/// One position in a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStep {
    pub key: String,
    pub role: Role,
    pub action: String,
    pub file: String,
    pub project: String,
    pub layer: Layer,
    /// The step's type could not be resolved to a declared node.
    pub unresolved: bool,
}

impl FlowStep {
    fn from_node(node: &ClassNode, action: impl Into<String>) -> Self {
        Self {
            key: node.key(),
            role: node.role,
            action: action.into(),
            file: node.file().to_owned(),
            project: node.project.clone(),
            layer: node.layer,
            unresolved: false,
        }
    }

    fn unresolved(key: &str, role: Role, action: impl Into<String>) -> Self {
        Self {
            key: key.to_owned(),
            role,
            action: action.into(),
            file: String::new(),
            project: String::new(),
            layer: Layer::Unknown,
            unresolved: true,
        }
    }
}

/// One observable request traced from entry point to data access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestFlow {
    pub name: String,
    /// `VERB /route`, or the trigger name for non-HTTP entry points.
    pub entry: String,
    pub http_verb: Option<String>,
    /// Key of the dispatched message.
    pub message: String,
    pub steps: Vec<FlowStep>,
    /// Short name of the entity the flow ends at.
    pub target_entity: Option<String>,
    pub side_effects: Vec<String>,
    /// Keys of validators and middleware attached to the flow.
    pub cross_cutting: Vec<String>,
}

impl RequestFlow {
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Identifier of the document rendered downstream for this flow.
    pub fn output_id(&self) -> String {
        format!("flows/{}.md", self.slug())
    }

    pub fn step_keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.key.as_str())
    }
}

/// Flows plus the soft errors met while tracing them.
#[derive(Debug, Default)]
pub struct TraceOutput {
    pub flows: Vec<RequestFlow>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Trace every request flow in the graph. Read-only over `graph`.
///
/// Entry points are visited in key order; each message an entry point sends yields one
/// flow. The result is sorted by flow name, then entry.
pub fn trace_flows(graph: &DependencyGraph, raises: &RaisesMap) -> TraceOutput {
    let mut tracer = Tracer {
        graph,
        raises,
        diagnostics: Vec::new(),
    };
    let mut flows: Vec<RequestFlow> = Vec::new();

    let middleware: Vec<String> = graph
        .classes()
        .into_iter()
        .filter(|c| c.role == Role::Middleware)
        .map(|c| c.key())
        .collect();

    for entry in graph.classes().into_iter().filter(|c| c.role == Role::EntryPoint) {
        let messages = targets_of(graph, &entry.key(), EdgeKind::Sends);
        if messages.is_empty() {
            tracing::debug!(entry = %entry.key(), "entry point dispatches no known message");
            tracer.diagnostics.push(Diagnostic::new(
                DiagnosticKind::SkippedEntryPoint,
                entry.key(),
                "no resolvable message dispatched",
            ));
            continue;
        }
        for message_key in messages {
            let Some(message) = graph.class(&message_key) else {
                continue;
            };
            let mut flow = tracer.trace_one(entry, message);
            flow.cross_cutting.extend(middleware.iter().cloned());
            flows.push(flow);
        }
    }

    flows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.entry.cmp(&b.entry)));
    tracing::info!(flows = flows.len(), "traced request flows");
    TraceOutput {
        flows,
        diagnostics: tracer.diagnostics,
    }
}

struct Tracer<'g> {
    graph: &'g DependencyGraph,
    raises: &'g RaisesMap,
    diagnostics: Vec<Diagnostic>,
}

impl<'g> Tracer<'g> {
    fn trace_one(&mut self, entry: &ClassNode, message: &ClassNode) -> RequestFlow {
        let graph = self.graph;
        let message_name = message.name();
        let is_query = is_query(message);
        let kind_word = if is_query { "query" } else { "command" };
        let name = derive_flow_name(message_name);
        let shape = derive_entry(&entry.descriptor, &name, is_query);

        let entry_action = match &shape.verb {
            Some(verb) => format!("receives HTTP {verb}"),
            None => format!("triggered by {}", entry.name()),
        };
        let mut steps = vec![
            FlowStep::from_node(entry, entry_action),
            FlowStep::from_node(message, format!("carries {kind_word}")),
        ];
        let mut target_entity: Option<String> = None;
        let mut side_effects: Vec<String> = Vec::new();

        // Handler: the node with a `handles` edge into the message.
        let handlers: Vec<String> = graph
            .incoming_edges(&message.key())
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Handles)
            .map(|e| e.source)
            .collect();
        let handler = match handlers.as_slice() {
            [] => None,
            [only] => graph.class(only),
            [first, ..] => {
                self.warn_ambiguous(&message.key(), "handler", &handlers);
                graph.class(first)
            }
        };

        match handler {
            Some(handler) => {
                steps.push(FlowStep::from_node(handler, format!("handles {kind_word}")));
                let (collaborators, entities) = self.collaborators(handler);
                steps.extend(collaborators);
                if let Some(first) = entities.iter().find(|s| !s.unresolved) {
                    target_entity = Some(short_name(&first.key).to_owned());
                }
                steps.extend(entities);
                side_effects = self
                    .raises
                    .get(&handler.key())
                    .or_else(|| self.raises.get(handler.name()))
                    .cloned()
                    .unwrap_or_default();
            }
            None => {
                let base = message_base(message_name);
                let key = format!("{base}Handler");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedReference,
                    message.key(),
                    format!("no handler handles `{message_name}`"),
                ));
                steps.push(FlowStep::unresolved(&key, Role::Handler, format!("handles {kind_word}")));
            }
        }

        RequestFlow {
            name,
            entry: shape.label,
            http_verb: shape.verb,
            message: message.key(),
            steps,
            target_entity,
            side_effects,
            cross_cutting: self.validators_for(message),
        }
    }

    /// Repository/service steps from the handler's constructor parameters, in declaration
    /// order, plus the entity steps their repositories point at.
    fn collaborators(&mut self, handler: &ClassNode) -> (Vec<FlowStep>, Vec<FlowStep>) {
        let mut steps: Vec<FlowStep> = Vec::new();
        let mut entities: Vec<FlowStep> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for param in &handler.descriptor.constructor_params {
            let type_name = param.type_name.as_str();
            if is_plumbing(type_name) {
                continue;
            }
            let lower = strip_generic(type_name).to_lowercase();

            let resolved = self.resolve_param(&handler.key(), type_name);
            let step = match resolved {
                Some(node) => {
                    if !matches!(node.role, Role::Repository | Role::Service | Role::Other) {
                        continue;
                    }
                    FlowStep::from_node(node, action_for(node.role, node.name()))
                }
                None => {
                    let role = if lower.contains("repository") {
                        Role::Repository
                    } else {
                        Role::Service
                    };
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::UnresolvedReference,
                        handler.key(),
                        format!("dependency `{type_name}` has no implementation"),
                    ));
                    FlowStep::unresolved(strip_generic(type_name), role, action_for(role, short_name(type_name)))
                }
            };

            let is_repository = step.role == Role::Repository;
            if seen.insert(step.key.clone()) {
                steps.push(step);
            }

            if is_repository && let Some(arg) = generic_argument(type_name) {
                let entity = match self.graph.resolve_reference(arg).first() {
                    Some(key) => self.graph.class(key).map(|n| FlowStep::from_node(n, "domain entity")),
                    None => None,
                }
                .unwrap_or_else(|| FlowStep::unresolved(arg, Role::Entity, "domain entity"));
                if seen.insert(entity.key.clone()) {
                    entities.push(entity);
                }
            }
        }
        (steps, entities)
    }

    /// A concrete declared type, or the first implementer of an interface.
    fn resolve_param(&mut self, handler: &str, type_name: &str) -> Option<&'g ClassNode> {
        let graph = self.graph;
        let implementers = graph.resolve_interface(type_name);
        if let Some(first) = implementers.first() {
            if implementers.len() > 1 {
                let keys: Vec<String> = implementers.iter().map(|c| c.key()).collect();
                self.warn_ambiguous(handler, type_name, &keys);
            }
            return Some(first);
        }
        let declared: Vec<String> = graph.resolve_reference(type_name);
        let concrete: Vec<&'g ClassNode> = declared
            .iter()
            .filter_map(|k| graph.class(k))
            .filter(|c| c.descriptor.kind != StructuralKind::Interface)
            .collect();
        if concrete.len() > 1 {
            let keys: Vec<String> = concrete.iter().map(|c| c.key()).collect();
            self.warn_ambiguous(handler, type_name, &keys);
        }
        concrete.first().copied()
    }

    /// Validators attached to `message`: generic argument naming the message, or the
    /// `<MessageBase>Validator` naming convention.
    fn validators_for(&self, message: &ClassNode) -> Vec<String> {
        let message_name = message.name();
        let by_convention = format!("{}Validator", message_base(message_name));
        self.graph
            .classes()
            .into_iter()
            .filter(|c| c.role == Role::Validator)
            .filter(|c| {
                c.name() == by_convention
                    || c.descriptor
                        .base_types
                        .iter()
                        .chain(&c.descriptor.interfaces)
                        .filter_map(|t| generic_argument(t))
                        .any(|arg| short_name(arg) == message_name)
            })
            .map(|c| c.key())
            .collect()
    }

    fn warn_ambiguous(&mut self, subject: &str, what: &str, candidates: &[String]) {
        tracing::warn!(subject, what, "several candidates, taking the first");
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::AmbiguousReference,
            subject,
            format!("`{what}` has several candidates ({}); using `{}`", candidates.join(", "), candidates[0]),
        ));
    }
}

fn targets_of(graph: &DependencyGraph, key: &str, kind: EdgeKind) -> Vec<String> {
    graph
        .outgoing_edges(key)
        .into_iter()
        .filter(|e| e.kind == kind && !e.unresolved)
        .map(|e| e.target)
        .collect()
}

fn is_query(message: &ClassNode) -> bool {
    message.name().ends_with("Query")
        || message
            .descriptor
            .interfaces
            .iter()
            .any(|i| short_name(i) == "IQuery")
}

/// Message name without its trailing `Command`/`Query`.
fn message_base(message_name: &str) -> &str {
    message_name
        .strip_suffix("Command")
        .or_else(|| message_name.strip_suffix("Query"))
        .unwrap_or(message_name)
}

fn action_for(role: Role, name: &str) -> String {
    match role {
        Role::Repository => "persists/retrieves data".to_owned(),
        _ => format!("calls {name}"),
    }
}
