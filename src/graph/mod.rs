pub mod builder;
pub mod classify;
pub mod edge;
pub mod node;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::Directed;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;

use crate::descriptor::{short_name, strip_generic};
use edge::{EdgeKind, EdgeRecord, GraphEdge};
use node::{ClassNode, GraphNode};

/// Outcome of wiring one type reference into an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one known type matched.
    Resolved(String),
    /// Several known types share the referenced short name; an edge went to each.
    Ambiguous(Vec<String>),
    /// No known type matched; the edge points at a placeholder with this key.
    Unresolved(String),
}

impl Resolution {
    /// Keys the new edge(s) point at.
    pub fn targets(&self) -> Vec<String> {
        match self {
            Resolution::Resolved(k) | Resolution::Unresolved(k) => vec![k.clone()],
            Resolution::Ambiguous(keys) => keys.clone(),
        }
    }
}

/// The class-level dependency graph: a directed petgraph StableGraph keyed by qualified
/// type name, with O(1) key lookup and a derived interface -> implementers index.
///
/// Adjacency lives in the StableGraph itself, so dependents/dependencies are always
/// consistent with the edge set after every insertion or removal.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub graph: StableGraph<GraphNode, GraphEdge, Directed>,
    /// Qualified key (or placeholder key) -> node index.
    pub key_index: HashMap<String, NodeIndex>,
    /// Short type name -> qualified keys of declared types, in insertion order.
    pub short_name_index: HashMap<String, Vec<String>>,
    /// Interface key -> implementer keys, in insertion order.
    pub interface_index: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Node index for `key`. A qualified key that is not declared falls back to a
    /// placeholder carrying its short name, so dependents of removed or never-declared
    /// types are still reachable.
    pub fn index_of(&self, key: &str) -> Option<NodeIndex> {
        if let Some(&idx) = self.key_index.get(key) {
            return Some(idx);
        }
        let short = short_name(key);
        match self.key_index.get(short) {
            Some(&idx) if self.graph[idx].is_unresolved() => Some(idx),
            _ => None,
        }
    }

    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.index_of(key).map(|idx| &self.graph[idx])
    }

    pub fn class(&self, key: &str) -> Option<&ClassNode> {
        self.key_index
            .get(key)
            .and_then(|&idx| self.graph[idx].as_class())
    }

    /// All declared classes, sorted by key.
    pub fn classes(&self) -> Vec<&ClassNode> {
        let mut classes: Vec<&ClassNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph[idx].as_class())
            .collect();
        classes.sort_by_key(|c| c.key());
        classes
    }

    pub fn class_count(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&idx| !self.graph[idx].is_unresolved())
            .count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].is_unresolved())
            .count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Resolve a type reference as written (generics allowed) to declared keys.
    ///
    /// An exact key match wins; otherwise every declared type with the same short name
    /// is returned, in insertion order.
    pub fn resolve_reference(&self, reference: &str) -> Vec<String> {
        let stripped = strip_generic(reference);
        if self.class(stripped).is_some() {
            return vec![stripped.to_owned()];
        }
        self.short_name_index
            .get(short_name(stripped))
            .cloned()
            .unwrap_or_default()
    }

    /// All nodes implementing `interface`, in insertion order. Never an error: an
    /// interface nobody implements yields an empty vector.
    pub fn resolve_interface(&self, interface: &str) -> Vec<&ClassNode> {
        let stripped = strip_generic(interface);
        let mut index_keys: Vec<String> = Vec::new();
        if self.key_index.contains_key(stripped) {
            index_keys.push(stripped.to_owned());
        }
        let short = short_name(stripped);
        if let Some(keys) = self.short_name_index.get(short) {
            index_keys.extend(keys.iter().cloned());
        }
        if short != stripped && self.key_index.contains_key(short) {
            index_keys.push(short.to_owned());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for ik in &index_keys {
            for implementer in self.interface_index.get(ik).into_iter().flatten() {
                if seen.insert(implementer.as_str())
                    && let Some(class) = self.class(implementer)
                {
                    out.push(class);
                }
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Mutation (single writer)
    // -----------------------------------------------------------------------

    /// Insert or replace the node for `node.key()`.
    ///
    /// Replacing discards edges where the node is the source and keeps edges where it is
    /// only the target. A placeholder with the same key, or with the node's short name,
    /// is upgraded and its incoming edges now reach the declared type.
    pub fn upsert_class(&mut self, node: ClassNode) -> NodeIndex {
        let key = node.key();
        let short = node.name().to_owned();

        let idx = match self.key_index.get(&key).copied() {
            Some(existing) => {
                if !self.graph[existing].is_unresolved() {
                    self.clear_outgoing(existing);
                    self.forget_implementer(&key);
                }
                self.graph[existing] = GraphNode::Class(node);
                existing
            }
            None => {
                let idx = self.graph.add_node(GraphNode::Class(node));
                self.key_index.insert(key.clone(), idx);
                idx
            }
        };

        let names = self.short_name_index.entry(short.clone()).or_default();
        if !names.contains(&key) {
            names.push(key.clone());
        }

        if short != key {
            self.adopt_placeholder(&short, idx, &key);
        }
        idx
    }

    /// Add `kind` edges from `source` to whatever `reference` resolves to, creating a
    /// placeholder target when nothing does.
    pub fn connect(&mut self, source: NodeIndex, reference: &str, kind: EdgeKind, label: &str) -> Resolution {
        let candidates = self.resolve_reference(reference);
        match candidates.len() {
            0 => {
                let key = strip_generic(reference).to_owned();
                let target = match self.key_index.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let idx = self.graph.add_node(GraphNode::Unresolved { key: key.clone() });
                        self.key_index.insert(key.clone(), idx);
                        idx
                    }
                };
                self.add_edge_once(source, target, GraphEdge::new(kind, label));
                Resolution::Unresolved(key)
            }
            1 => {
                let target = self.key_index[&candidates[0]];
                self.add_edge_once(source, target, GraphEdge::new(kind, label));
                Resolution::Resolved(candidates[0].clone())
            }
            _ => {
                for c in &candidates {
                    let target = self.key_index[c];
                    self.add_edge_once(source, target, GraphEdge::new(kind, label));
                }
                Resolution::Ambiguous(candidates)
            }
        }
    }

    /// Add an edge between two existing nodes unless an identical-kind edge exists.
    pub fn add_edge_once(&mut self, source: NodeIndex, target: NodeIndex, edge: GraphEdge) -> Option<EdgeIndex> {
        let exists = self
            .graph
            .edges_directed(source, Direction::Outgoing)
            .any(|e| e.target() == target && e.weight().kind == edge.kind);
        if exists {
            return None;
        }
        Some(self.graph.add_edge(source, target, edge))
    }

    /// Record `implementer` under `interface` in the interface index (insertion order).
    pub fn register_implementer(&mut self, interface: &str, implementer: &str) {
        let list = self.interface_index.entry(interface.to_owned()).or_default();
        if !list.iter().any(|k| k == implementer) {
            list.push(implementer.to_owned());
        }
    }

    /// Remove every edge of the given kinds. Used before re-inferring message edges.
    pub fn remove_edges_of_kind(&mut self, kinds: &[EdgeKind]) {
        let doomed: Vec<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|&e| kinds.contains(&self.graph[e].kind))
            .collect();
        for e in doomed {
            self.graph.remove_edge(e);
        }
    }

    /// Remove every type declared in `file`. Returns the removed keys, sorted.
    ///
    /// A removed type that still has dependents becomes a placeholder with the same key,
    /// so the dangling references stay visible as unresolved.
    pub fn remove_file(&mut self, file: &str) -> Vec<String> {
        let mut doomed: Vec<(NodeIndex, String, String)> = self
            .graph
            .node_indices()
            .filter_map(|idx| {
                let class = self.graph[idx].as_class()?;
                paths_match(class.file(), file)
                    .then(|| (idx, class.key(), class.name().to_owned()))
            })
            .collect();
        doomed.sort_by(|a, b| a.1.cmp(&b.1));

        for (idx, key, short) in &doomed {
            self.clear_outgoing(*idx);
            self.forget_implementer(key);
            if let Some(names) = self.short_name_index.get_mut(short) {
                names.retain(|k| k != key);
                if names.is_empty() {
                    self.short_name_index.remove(short);
                }
            }
            let has_dependents = self
                .graph
                .edges_directed(*idx, Direction::Incoming)
                .next()
                .is_some();
            if has_dependents {
                self.graph[*idx] = GraphNode::Unresolved { key: key.clone() };
            } else {
                self.graph.remove_node(*idx);
                self.key_index.remove(key);
                self.interface_index.remove(key);
            }
        }
        doomed.into_iter().map(|(_, key, _)| key).collect()
    }

    // -----------------------------------------------------------------------
    // Adjacency and traversal (read-only)
    // -----------------------------------------------------------------------

    /// Distinct keys of nodes with an edge into `key`, sorted.
    pub fn dependents(&self, key: &str) -> Vec<String> {
        self.neighbours(key, Direction::Incoming)
    }

    /// Distinct keys of nodes `key` has an edge to, sorted. May include placeholders.
    pub fn dependencies(&self, key: &str) -> Vec<String> {
        self.neighbours(key, Direction::Outgoing)
    }

    /// Number of distinct nodes directly depending on `key`.
    pub fn fan_in(&self, key: &str) -> usize {
        self.dependents(key).len()
    }

    /// Outgoing edges of `key` as records, in insertion order.
    pub fn outgoing_edges(&self, key: &str) -> Vec<EdgeRecord> {
        self.edge_records(key, Direction::Outgoing)
    }

    /// Incoming edges of `key` as records, in insertion order.
    pub fn incoming_edges(&self, key: &str) -> Vec<EdgeRecord> {
        self.edge_records(key, Direction::Incoming)
    }

    /// Every edge in the graph, sorted by (source, target, kind).
    pub fn edges(&self) -> Vec<EdgeRecord> {
        let mut out: Vec<EdgeRecord> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (s, t) = self.graph.edge_endpoints(e)?;
                Some(self.record(s, t, &self.graph[e]))
            })
            .collect();
        out.sort_by(|a, b| {
            (a.source.as_str(), a.target.as_str(), a.kind).cmp(&(b.source.as_str(), b.target.as_str(), b.kind))
        });
        out
    }

    /// Everything that transitively depends on `key`, up to `max_hops`. Excludes `key`.
    pub fn all_upstream(&self, key: &str, max_hops: usize) -> BTreeSet<String> {
        self.walk(key, max_hops, Direction::Incoming)
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    /// Everything `key` transitively depends on, up to `max_hops`. Excludes `key`.
    pub fn all_downstream(&self, key: &str, max_hops: usize) -> BTreeSet<String> {
        self.walk(key, max_hops, Direction::Outgoing)
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    /// Upstream nodes with their BFS hop distance from `key`, sorted by (hop, key).
    pub fn upstream_with_hops(&self, key: &str, max_hops: usize) -> Vec<(String, usize)> {
        self.walk(key, max_hops, Direction::Incoming)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Iterative BFS with an explicit visited set: each node is reached once, at its
    /// shortest hop distance, so cycles terminate and never produce duplicates.
    fn walk(&self, key: &str, max_hops: usize, direction: Direction) -> Vec<(String, usize)> {
        let Some(start) = self.index_of(key) else {
            return Vec::new();
        };
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);
        let mut reached: Vec<(String, usize)> = Vec::new();

        while let Some((current, hop)) = queue.pop_front() {
            if hop >= max_hops {
                continue;
            }
            for edge_ref in self.graph.edges_directed(current, direction) {
                let next = match direction {
                    Direction::Incoming => edge_ref.source(),
                    Direction::Outgoing => edge_ref.target(),
                };
                if visited.insert(next) {
                    reached.push((self.graph[next].key(), hop + 1));
                    queue.push_back((next, hop + 1));
                }
            }
        }

        reached.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        reached
    }

    fn neighbours(&self, key: &str, direction: Direction) -> Vec<String> {
        let Some(idx) = self.index_of(key) else {
            return Vec::new();
        };
        let set: BTreeSet<String> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Incoming => self.graph[e.source()].key(),
                Direction::Outgoing => self.graph[e.target()].key(),
            })
            .collect();
        set.into_iter().collect()
    }

    fn edge_records(&self, key: &str, direction: Direction) -> Vec<EdgeRecord> {
        let Some(idx) = self.index_of(key) else {
            return Vec::new();
        };
        // petgraph yields adjacency most-recent-first; reverse for insertion order.
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| self.record(e.source(), e.target(), e.weight()))
            .collect();
        records.reverse();
        records
    }

    fn record(&self, source: NodeIndex, target: NodeIndex, edge: &GraphEdge) -> EdgeRecord {
        EdgeRecord {
            source: self.graph[source].key(),
            target: self.graph[target].key(),
            kind: edge.kind,
            label: edge.label.clone(),
            unresolved: self.graph[target].is_unresolved(),
        }
    }

    /// Drop outgoing edges of `idx`, then any placeholder left without incoming edges.
    fn clear_outgoing(&mut self, idx: NodeIndex) {
        let outgoing: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        for (edge, target) in outgoing {
            self.graph.remove_edge(edge);
            if self.graph[target].is_unresolved()
                && self
                    .graph
                    .edges_directed(target, Direction::Incoming)
                    .next()
                    .is_none()
            {
                let key = self.graph[target].key();
                self.graph.remove_node(target);
                self.key_index.remove(&key);
                self.interface_index.remove(&key);
            }
        }
    }

    fn forget_implementer(&mut self, key: &str) {
        self.interface_index.retain(|_, implementers| {
            implementers.retain(|k| k != key);
            !implementers.is_empty()
        });
    }

    /// Fold a short-name placeholder into the declared node at `idx`.
    fn adopt_placeholder(&mut self, short: &str, idx: NodeIndex, key: &str) {
        let Some(&placeholder) = self.key_index.get(short) else {
            return;
        };
        if placeholder == idx || !self.graph[placeholder].is_unresolved() {
            return;
        }
        let incoming: Vec<(NodeIndex, GraphEdge)> = self
            .graph
            .edges_directed(placeholder, Direction::Incoming)
            .map(|e| (e.source(), e.weight().clone()))
            .collect();
        self.graph.remove_node(placeholder);
        self.key_index.remove(short);
        for (source, edge) in incoming {
            self.add_edge_once(source, idx, edge);
        }
        if let Some(implementers) = self.interface_index.remove(short) {
            for implementer in implementers {
                self.register_implementer(key, &implementer);
            }
        }
    }
}

/// Normalise path separators so `src\A.cs` and `src/A.cs` compare equal.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Same file under different roots: equal after normalisation, or one is a
/// path-component suffix of the other (`/repo/src/A.cs` vs `src/A.cs`).
pub fn paths_match(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    let a = a.trim_start_matches("./");
    let b = b.trim_start_matches("./");
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.ends_with(&format!("/{b}")) || b.ends_with(&format!("/{a}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::descriptor::ClassDescriptor;
    use node::{Layer, Role};

    pub(crate) fn class_node(key: &str, file: &str) -> ClassNode {
        let (namespace, name) = match key.rsplit_once('.') {
            Some((ns, n)) => (ns.to_owned(), n.to_owned()),
            None => (String::new(), key.to_owned()),
        };
        ClassNode {
            descriptor: ClassDescriptor {
                name,
                namespace,
                project: "App".into(),
                file: file.into(),
                kind: Default::default(),
                base_types: vec![],
                interfaces: vec![],
                constructor_params: vec![],
                attributes: vec![],
                dispatches: vec![],
            },
            role: Role::Other,
            project: "App".into(),
            layer: Layer::Unknown,
        }
    }

    fn injects(g: &mut DependencyGraph, from: &str, to: &str) {
        let idx = g.key_index[from];
        g.connect(idx, to, EdgeKind::Injects, "ctor");
    }

    /// A injects B, B injects C.
    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for k in ["A", "B", "C"] {
            g.upsert_class(class_node(k, &format!("{k}.cs")));
        }
        injects(&mut g, "A", "B");
        injects(&mut g, "B", "C");
        g
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let g = chain();
        assert_eq!(g.dependents("C"), vec!["B"]);
        assert_eq!(g.dependencies("A"), vec!["B"]);
        assert!(g.dependents("A").is_empty());
        assert_eq!(g.fan_in("B"), 1);
    }

    #[test]
    fn test_upstream_hops_and_origin_excluded() {
        let g = chain();
        assert_eq!(
            g.upstream_with_hops("C", 5),
            vec![("B".to_string(), 1), ("A".to_string(), 2)]
        );
        assert!(!g.all_upstream("C", 5).contains("C"));
        assert_eq!(g.all_upstream("C", 1), BTreeSet::from(["B".to_string()]));
        assert_eq!(
            g.all_downstream("A", 5),
            BTreeSet::from(["B".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_mutual_injection_terminates() {
        let mut g = DependencyGraph::new();
        g.upsert_class(class_node("A", "A.cs"));
        g.upsert_class(class_node("B", "B.cs"));
        injects(&mut g, "A", "B");
        injects(&mut g, "B", "A");
        assert_eq!(g.all_upstream("A", 50), BTreeSet::from(["B".to_string()]));
        assert_eq!(g.upstream_with_hops("A", 50).len(), 1, "B visited once");
        assert_eq!(g.all_downstream("B", 50), BTreeSet::from(["A".to_string()]));
    }

    #[test]
    fn test_self_reference_is_legal() {
        let mut g = DependencyGraph::new();
        g.upsert_class(class_node("A", "A.cs"));
        injects(&mut g, "A", "A");
        assert_eq!(g.edge_count(), 1);
        assert!(g.all_upstream("A", 10).is_empty());
    }

    #[test]
    fn test_zero_depth_reaches_nothing() {
        let g = chain();
        assert!(g.all_upstream("C", 0).is_empty());
    }

    #[test]
    fn test_unresolved_edge_upgraded_when_type_arrives() {
        let mut g = DependencyGraph::new();
        g.upsert_class(class_node("App.A", "A.cs"));
        let a = g.key_index["App.A"];
        let res = g.connect(a, "IClock", EdgeKind::Injects, "ctor");
        assert_eq!(res, Resolution::Unresolved("IClock".into()));
        assert_eq!(g.unresolved_count(), 1);
        assert!(g.outgoing_edges("App.A")[0].unresolved);

        g.upsert_class(class_node("App.Time.IClock", "IClock.cs"));
        assert_eq!(g.unresolved_count(), 0, "placeholder folded into declared type");
        assert_eq!(g.dependents("App.Time.IClock"), vec!["App.A"]);
        assert!(!g.outgoing_edges("App.A")[0].unresolved);
    }

    #[test]
    fn test_replace_drops_outgoing_keeps_incoming() {
        let mut g = chain();
        g.upsert_class(class_node("B", "B.cs"));
        assert!(g.dependencies("B").is_empty(), "outgoing edges discarded");
        assert_eq!(g.dependents("B"), vec!["A"], "incoming edges kept");
        assert_eq!(g.class_count(), 3, "same key replaces, never duplicates");
    }

    #[test]
    fn test_ambiguous_reference_connects_all_candidates() {
        let mut g = DependencyGraph::new();
        g.upsert_class(class_node("X.Foo", "x.cs"));
        g.upsert_class(class_node("Y.Foo", "y.cs"));
        g.upsert_class(class_node("A", "a.cs"));
        let a = g.key_index["A"];
        let res = g.connect(a, "Foo", EdgeKind::Injects, "ctor");
        assert_eq!(res, Resolution::Ambiguous(vec!["X.Foo".into(), "Y.Foo".into()]));
        assert_eq!(g.dependencies("A").len(), 2);
    }

    #[test]
    fn test_remove_file_downgrades_referenced_nodes() {
        let mut g = chain();
        let removed = g.remove_file("C.cs");
        assert_eq!(removed, vec!["C"]);
        assert_eq!(g.class_count(), 2);
        assert!(g.node("C").is_some_and(|n| n.is_unresolved()));
        assert_eq!(g.dependents("C"), vec!["B"]);

        let removed = g.remove_file("A.cs");
        assert_eq!(removed, vec!["A"]);
        assert!(g.node("A").is_none(), "unreferenced nodes are deleted outright");
        assert!(g.dependents("B").is_empty());
    }

    #[test]
    fn test_paths_match() {
        assert!(paths_match("src\\Web\\A.cs", "src/Web/A.cs"));
        assert!(paths_match("/repo/src/A.cs", "src/A.cs"));
        assert!(paths_match("./src/A.cs", "src/A.cs"));
        assert!(!paths_match("/repo/src/BA.cs", "A.cs"));
        assert!(!paths_match("", "A.cs"));
    }

    #[test]
    fn test_remove_edges_of_kind() {
        let mut g = chain();
        let a = g.key_index["A"];
        let c = g.key_index["C"];
        g.add_edge_once(a, c, GraphEdge::new(EdgeKind::Sends, "dispatches C"));
        assert_eq!(g.edge_count(), 3);
        g.remove_edges_of_kind(&[EdgeKind::Sends, EdgeKind::Handles]);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_add_edge_once_dedupes_same_kind() {
        let mut g = chain();
        let a = g.key_index["A"];
        let b = g.key_index["B"];
        assert!(g.add_edge_once(a, b, GraphEdge::new(EdgeKind::Injects, "again")).is_none());
        assert!(g.add_edge_once(a, b, GraphEdge::new(EdgeKind::Inherits, "base")).is_some());
    }
}
