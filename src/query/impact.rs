use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::descriptor::short_name;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::flow::RequestFlow;
use crate::graph::node::Layer;
use crate::graph::{DependencyGraph, paths_match};
use crate::state::RepositoryState;
use crate::state::changes::affected_outputs;

/// Test artifact -> keys of the types it exercises.
pub type TestOwnership = HashMap<String, Vec<String>>;

/// How close an impacted item is to the change. Ordered strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    /// One hop: depends on a changed type.
    Direct,
    /// Two hops.
    Indirect,
    /// Three or more hops, up to the configured depth.
    Transitive,
}

impl ImpactLevel {
    pub fn from_hops(hops: usize) -> Self {
        match hops {
            0 | 1 => ImpactLevel::Direct,
            2 => ImpactLevel::Indirect,
            _ => ImpactLevel::Transitive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Direct => "direct",
            ImpactLevel::Indirect => "indirect",
            ImpactLevel::Transitive => "transitive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Class,
    Flow,
    Output,
    Test,
}

/// One thing in the blast radius of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactedItem {
    pub name: String,
    pub kind: ItemKind,
    pub level: ImpactLevel,
    pub reason: String,
    /// Source file, output id or test artifact.
    pub location: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImpactReport {
    pub changed_files: Vec<String>,
    pub changed_keys: Vec<String>,
    /// Unix seconds.
    pub timestamp: u64,
    pub classes: Vec<ImpactedItem>,
    pub flows: Vec<ImpactedItem>,
    pub outputs: Vec<ImpactedItem>,
    pub tests: Vec<ImpactedItem>,
    /// Entry points of the affected flows (`VERB /route`), deduplicated and sorted.
    pub endpoints: Vec<String>,
    pub risk: RiskLevel,
    pub diagnostics: Vec<Diagnostic>,
}

impl ImpactReport {
    pub fn total(&self) -> usize {
        self.classes.len() + self.flows.len() + self.outputs.len() + self.tests.len()
    }

    /// Output ids to regenerate, sorted.
    pub fn output_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.outputs.iter().map(|o| o.name.clone()).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactOptions {
    /// Upstream traversal hop cap.
    pub max_depth: usize,
    /// Fan-in above which a changed domain type is critical.
    pub fan_in_threshold: usize,
    /// Outputs regenerated on every non-empty change.
    pub always_regenerate: Vec<String>,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            fan_in_threshold: 3,
            always_regenerate: vec!["SUMMARY.md".to_owned()],
        }
    }
}

/// Read-only inputs of an impact run.
pub struct ImpactContext<'a> {
    pub graph: &'a DependencyGraph,
    pub flows: &'a [RequestFlow],
    pub tests: &'a TestOwnership,
    pub state: Option<&'a RepositoryState>,
}

/// Strongest level seen for an item so far, with the reason that produced it.
#[derive(Debug, Clone)]
struct Hit {
    level: ImpactLevel,
    reason: String,
    location: String,
}

#[derive(Default)]
struct Hits(BTreeMap<String, Hit>);

impl Hits {
    /// Keep the strongest level; on a tie the first reason stays.
    fn offer(&mut self, name: &str, level: ImpactLevel, reason: impl FnOnce() -> String, location: &str) {
        match self.0.get_mut(name) {
            Some(existing) if existing.level <= level => {}
            Some(existing) => {
                existing.level = level;
                existing.reason = reason();
            }
            None => {
                self.0.insert(
                    name.to_owned(),
                    Hit {
                        level,
                        reason: reason(),
                        location: location.to_owned(),
                    },
                );
            }
        }
    }

    fn into_items(self, kind: ItemKind) -> Vec<ImpactedItem> {
        let mut items: Vec<ImpactedItem> = self
            .0
            .into_iter()
            .map(|(name, hit)| ImpactedItem {
                name,
                kind,
                level: hit.level,
                reason: hit.reason,
                location: hit.location,
            })
            .collect();
        items.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        items
    }
}

/// Compute the blast radius of `changed_keys`.
///
/// Each changed key is processed completely before the next (upstream BFS, then flows,
/// then outputs and tests), and results are merged keeping the strongest level per item.
/// Changed keys are never reported as impacted classes themselves.
pub fn analyze_impact(
    ctx: &ImpactContext<'_>,
    changed_files: &[String],
    changed_keys: &[String],
    options: &ImpactOptions,
) -> ImpactReport {
    let graph = ctx.graph;
    let changed: BTreeSet<&str> = changed_keys.iter().map(String::as_str).collect();
    let mut report = ImpactReport {
        changed_files: changed_files.to_vec(),
        changed_keys: changed.iter().map(|k| k.to_string()).collect(),
        timestamp: crate::state::now_secs(),
        ..Default::default()
    };

    let mut classes = Hits::default();
    let mut flows = Hits::default();
    let mut outputs = Hits::default();
    let mut tests = Hits::default();
    let mut endpoints: BTreeSet<String> = BTreeSet::new();
    // Per changed key: layer and fan-in, for the structural part of the risk.
    let mut structure: Vec<(Layer, usize)> = Vec::new();

    for &key in &changed {
        if graph.node(key).is_none() {
            report.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnresolvedReference,
                key,
                "changed type is not in the graph",
            ));
        }

        // Upstream BFS; hop distance sets the level.
        let upstream = graph.upstream_with_hops(key, options.max_depth);
        let mut reached: Vec<(&str, ImpactLevel)> = vec![(key, ImpactLevel::Direct)];
        for (dependent, hops) in &upstream {
            if changed.contains(dependent.as_str()) {
                continue;
            }
            let level = ImpactLevel::from_hops(*hops);
            let location = graph.class(dependent).map(|c| c.file()).unwrap_or_default();
            classes.offer(dependent, level, || class_reason(graph, dependent, key, *hops), location);
            reached.push((dependent.as_str(), level));
        }

        // Flows passing through the changed type or anything it reached.
        for flow in ctx.flows {
            let level = reached
                .iter()
                .filter(|(k, _)| flow.step_keys().any(|s| s == *k))
                .map(|(_, l)| *l)
                .min();
            let Some(level) = level else {
                continue;
            };
            endpoints.insert(flow.entry.clone());
            let output = flow.output_id();
            let overlap: Vec<&str> = reached
                .iter()
                .map(|(k, _)| *k)
                .filter(|k| flow.step_keys().any(|s| s == *k))
                .collect();
            flows.offer(&flow.name, level, || format!("passes through {}", overlap.join(", ")), &output);
            outputs.offer(&output, level, || format!("flow '{}' affected", flow.name), &output);
        }

        // Outputs recorded against the source files of everything reached.
        if let Some(state) = ctx.state {
            for (k, level) in &reached {
                let Some(file) = graph.class(k).map(|c| c.file().to_owned()) else {
                    continue;
                };
                for id in affected_outputs(state, &[file.clone()]) {
                    outputs.offer(&id, *level, || format!("produced from {file}"), &id);
                }
            }
        }

        // Tests exercising anything reached.
        for (artifact, owned) in ctx.tests {
            let level = reached
                .iter()
                .filter(|(k, _)| owned.iter().any(|o| o == k))
                .map(|(_, l)| *l)
                .min();
            if let Some(level) = level {
                tests.offer(artifact, level, || format!("exercises {}", short_name(key)), artifact);
            }
        }

        let layer = graph.class(key).map(|c| c.layer).unwrap_or(Layer::Unknown);
        structure.push((layer, graph.fan_in(key)));
        tracing::debug!(key, reached = reached.len(), "processed changed type");
    }

    // Flow count is the whole report's, deduplicated across changed keys.
    let flow_count = flows.0.len();
    report.risk = structure
        .iter()
        .map(|&(layer, fan_in)| risk_for(flow_count, layer, fan_in, options.fan_in_threshold))
        .max()
        .unwrap_or_else(|| risk_for(flow_count, Layer::Unknown, 0, options.fan_in_threshold));

    // Changed files themselves, including removed ones with no node left.
    if let Some(state) = ctx.state {
        for id in affected_outputs(state, changed_files) {
            outputs.offer(&id, ImpactLevel::Direct, || "source file changed".to_owned(), &id);
        }
    }
    if !changed.is_empty() || !changed_files.is_empty() {
        for id in &options.always_regenerate {
            outputs.offer(id, ImpactLevel::Direct, || "always regenerated".to_owned(), id);
        }
    }

    report.classes = classes.into_items(ItemKind::Class);
    report.flows = flows.into_items(ItemKind::Flow);
    report.outputs = outputs.into_items(ItemKind::Output);
    report.tests = tests.into_items(ItemKind::Test);
    report.endpoints = endpoints.into_iter().collect();

    tracing::info!(
        changed = report.changed_keys.len(),
        impacted = report.total(),
        risk = report.risk.as_str(),
        "impact analysis complete"
    );
    report
}

/// Risk of a change touching `flow_count` flows, for one changed type's layer and
/// fan-in. Monotonic non-decreasing in `flow_count`.
pub fn risk_for(flow_count: usize, layer: Layer, fan_in: usize, fan_in_threshold: usize) -> RiskLevel {
    if flow_count >= 5 || (layer == Layer::Domain && fan_in > fan_in_threshold) {
        RiskLevel::Critical
    } else if flow_count >= 3 {
        RiskLevel::High
    } else if flow_count >= 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Keys of the types declared in any of `files`, by exact path or path suffix. Sorted.
pub fn keys_for_files(graph: &DependencyGraph, files: &[String]) -> Vec<String> {
    graph
        .classes()
        .into_iter()
        .filter(|c| files.iter().any(|f| paths_match(c.file(), f)))
        .map(|c| c.key())
        .collect()
}

fn class_reason(graph: &DependencyGraph, dependent: &str, changed: &str, hops: usize) -> String {
    let changed_name = short_name(changed);
    if hops <= 1 {
        // Name the edge that links the two.
        if let Some(edge) = graph
            .outgoing_edges(dependent)
            .into_iter()
            .find(|e| e.target == changed || short_name(&e.target) == changed_name)
        {
            return format!("{} {changed_name}", edge.kind.as_str());
        }
        return format!("depends on {changed_name}");
    }
    format!("depends on {changed_name} through {hops} hops")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::EdgeKind;
    use crate::graph::node::Role;
    use crate::graph::tests::class_node;
    use crate::flow::FlowStep;

    /// A injects B, B injects C.
    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for k in ["A", "B", "C"] {
            g.upsert_class(class_node(k, &format!("{k}.cs")));
        }
        for (from, to) in [("A", "B"), ("B", "C")] {
            let idx = g.key_index[from];
            g.connect(idx, to, EdgeKind::Injects, "ctor");
        }
        g
    }

    fn flow(name: &str, keys: &[&str]) -> RequestFlow {
        RequestFlow {
            name: name.into(),
            entry: format!("POST /api/{name}"),
            http_verb: Some("POST".into()),
            message: keys.first().copied().unwrap_or_default().into(),
            steps: keys
                .iter()
                .map(|k| FlowStep {
                    key: k.to_string(),
                    role: Role::Other,
                    action: String::new(),
                    file: format!("{k}.cs"),
                    project: String::new(),
                    layer: Layer::Unknown,
                    unresolved: false,
                })
                .collect(),
            target_entity: None,
            side_effects: vec![],
            cross_cutting: vec![],
        }
    }

    fn names(items: &[ImpactedItem], level: ImpactLevel) -> Vec<&str> {
        items.iter().filter(|i| i.level == level).map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_chain_levels() {
        let g = chain();
        let ctx = ImpactContext {
            graph: &g,
            flows: &[],
            tests: &TestOwnership::new(),
            state: None,
        };
        let report = analyze_impact(&ctx, &[], &["C".to_string()], &ImpactOptions::default());
        assert_eq!(names(&report.classes, ImpactLevel::Direct), vec!["B"]);
        assert_eq!(names(&report.classes, ImpactLevel::Indirect), vec!["A"]);
        assert!(names(&report.classes, ImpactLevel::Transitive).is_empty());
        assert_eq!(report.classes[0].reason, "injects C");
        assert_eq!(report.risk, RiskLevel::Low);
    }

    #[test]
    fn test_depth_cap_and_changed_not_reported() {
        let g = chain();
        let ctx = ImpactContext {
            graph: &g,
            flows: &[],
            tests: &TestOwnership::new(),
            state: None,
        };
        let options = ImpactOptions {
            max_depth: 1,
            ..Default::default()
        };
        let report = analyze_impact(&ctx, &[], &["C".to_string(), "B".to_string()], &options);
        let all: Vec<&str> = report.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(all, vec!["A"], "B is changed, so only A is impacted");
    }

    #[test]
    fn test_strongest_level_kept_across_changed_keys() {
        // A injects B, B injects C, A also injects C directly.
        let mut g = chain();
        let a = g.key_index["A"];
        g.connect(a, "C", EdgeKind::Injects, "ctor");
        let ctx = ImpactContext {
            graph: &g,
            flows: &[],
            tests: &TestOwnership::new(),
            state: None,
        };
        let report = analyze_impact(&ctx, &[], &["C".to_string()], &ImpactOptions::default());
        assert_eq!(names(&report.classes, ImpactLevel::Direct), vec!["A", "B"]);
    }

    #[test]
    fn test_flows_outputs_and_tests() {
        let g = chain();
        let flows = vec![flow("Create Thing", &["A", "B"]), flow("Other", &["X"])];
        let tests = TestOwnership::from([
            ("BTests".to_string(), vec!["B".to_string()]),
            ("CTests".to_string(), vec!["C".to_string()]),
            ("XTests".to_string(), vec!["X".to_string()]),
        ]);
        let mut state = RepositoryState::new();
        crate::state::changes::record_outputs(&mut state, "docs/a.md", ["A.cs".to_string()]);
        let ctx = ImpactContext {
            graph: &g,
            flows: &flows,
            tests: &tests,
            state: Some(&state),
        };
        let report = analyze_impact(&ctx, &["C.cs".to_string()], &["C".to_string()], &ImpactOptions::default());

        assert_eq!(report.flows.len(), 1);
        assert_eq!(report.flows[0].name, "Create Thing");
        assert_eq!(report.flows[0].level, ImpactLevel::Direct, "B is one hop from C");

        let outputs: Vec<(&str, ImpactLevel)> = report.outputs.iter().map(|o| (o.name.as_str(), o.level)).collect();
        assert_eq!(
            outputs,
            vec![
                ("SUMMARY.md", ImpactLevel::Direct),
                ("flows/create-thing.md", ImpactLevel::Direct),
                ("docs/a.md", ImpactLevel::Indirect),
            ]
        );

        assert_eq!(names(&report.tests, ImpactLevel::Direct), vec!["BTests", "CTests"]);
        assert!(report.tests.iter().all(|t| t.name != "XTests"));
        assert_eq!(report.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_risk_thresholds() {
        assert_eq!(risk_for(0, Layer::Application, 0, 3), RiskLevel::Low);
        assert_eq!(risk_for(1, Layer::Application, 0, 3), RiskLevel::Medium);
        assert_eq!(risk_for(2, Layer::Application, 0, 3), RiskLevel::Medium);
        assert_eq!(risk_for(3, Layer::Application, 0, 3), RiskLevel::High);
        assert_eq!(risk_for(4, Layer::Application, 0, 3), RiskLevel::High);
        assert_eq!(risk_for(5, Layer::Application, 0, 3), RiskLevel::Critical);
        assert_eq!(risk_for(0, Layer::Domain, 4, 3), RiskLevel::Critical);
        assert_eq!(risk_for(0, Layer::Domain, 3, 3), RiskLevel::Low, "threshold is exclusive");
        assert_eq!(risk_for(0, Layer::Infrastructure, 10, 3), RiskLevel::Low);
    }

    #[test]
    fn test_risk_monotonic_in_flow_count() {
        for layer in [Layer::Domain, Layer::Application, Layer::Unknown] {
            for fan_in in [0, 3, 4, 10] {
                let mut prev = RiskLevel::Low;
                for flows in 0..10 {
                    let risk = risk_for(flows, layer, fan_in, 3);
                    assert!(risk >= prev, "{flows} flows lowered risk for {layer:?}/{fan_in}");
                    prev = risk;
                }
            }
        }
    }

    #[test]
    fn test_unknown_changed_key_is_diagnosed() {
        let g = chain();
        let ctx = ImpactContext {
            graph: &g,
            flows: &[],
            tests: &TestOwnership::new(),
            state: None,
        };
        let report = analyze_impact(&ctx, &[], &["Nope".to_string()], &ImpactOptions::default());
        assert_eq!(report.total(), 1, "only the always-regenerated output");
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_keys_for_files() {
        let g = chain();
        assert_eq!(keys_for_files(&g, &["/repo/B.cs".to_string()]), vec!["B"]);
        assert!(keys_for_files(&g, &["Z.cs".to_string()]).is_empty());
    }

    #[test]
    fn test_risk_counts_flows_across_changed_keys() {
        let mut g = DependencyGraph::new();
        for k in ["C1", "C2"] {
            g.upsert_class(class_node(k, &format!("{k}.cs")));
        }
        let flows = vec![
            flow("F1", &["C1"]),
            flow("F2", &["C1"]),
            flow("F3", &["C2"]),
            flow("F4", &["C2"]),
        ];
        let ctx = ImpactContext {
            graph: &g,
            flows: &flows,
            tests: &TestOwnership::new(),
            state: None,
        };
        let options = ImpactOptions::default();

        let one = analyze_impact(&ctx, &[], &["C1".to_string()], &options);
        assert_eq!(one.flows.len(), 2);
        assert_eq!(one.risk, RiskLevel::Medium);

        let both = analyze_impact(&ctx, &[], &["C1".to_string(), "C2".to_string()], &options);
        assert_eq!(both.flows.len(), 4);
        assert_eq!(both.risk, RiskLevel::High, "two keys with two flows each touch four flows");
    }

    #[test]
    fn test_domain_fan_in_stays_critical_per_key() {
        // C1 is a domain type with four dependents; C2 is untouched by any flow.
        let mut g = DependencyGraph::new();
        let mut entity = class_node("C1", "C1.cs");
        entity.layer = Layer::Domain;
        g.upsert_class(entity);
        g.upsert_class(class_node("C2", "C2.cs"));
        for k in ["D1", "D2", "D3", "D4"] {
            let idx = g.upsert_class(class_node(k, &format!("{k}.cs")));
            g.connect(idx, "C1", EdgeKind::Injects, "ctor");
        }
        let ctx = ImpactContext {
            graph: &g,
            flows: &[],
            tests: &TestOwnership::new(),
            state: None,
        };
        let report = analyze_impact(&ctx, &[], &["C2".to_string(), "C1".to_string()], &ImpactOptions::default());
        assert_eq!(report.risk, RiskLevel::Critical);
    }

    #[test]
    fn test_endpoints_of_affected_flows() {
        let g = chain();
        let mut create = flow("Create Thing", &["A", "B"]);
        create.entry = "POST /api/Things".into();
        let mut update = flow("Update Thing", &["A"]);
        update.entry = "PUT /api/Things".into();
        let mut again = flow("Create Thing Again", &["B"]);
        again.entry = "POST /api/Things".into();
        let flows = vec![create, update, again, flow("Other", &["X"])];
        let ctx = ImpactContext {
            graph: &g,
            flows: &flows,
            tests: &TestOwnership::new(),
            state: None,
        };
        let report = analyze_impact(&ctx, &[], &["C".to_string()], &ImpactOptions::default());
        assert_eq!(report.endpoints, vec!["POST /api/Things", "PUT /api/Things"]);
    }
}
