use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use serde::{Serialize, Serializer};

use lineage_core::{ChangeType, LineKind, LineageError};

/// A vertex of the evolution graph.
///
/// Lines are keyed by their trimmed text, so the same text seen in two iterations
/// is one node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphNode {
    /// Source of every version-0 line.
    Root,
    /// Target of every deleted line.
    Sink,
    Line(String),
}

impl GraphNode {
    /// Text of a line node.
    pub fn text(&self) -> Option<&str> {
        match self {
            GraphNode::Line(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Root => f.write_str("ROOT"),
            GraphNode::Sink => f.write_str("SINK"),
            GraphNode::Line(text) => f.write_str(text),
        }
    }
}

impl Serialize for GraphNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What an edge (or an edge-less insertion) records.
///
/// # Examples
///
/// ```
/// use lineage_core::{ChangeType, LineKind};
/// use lineage_graph::Transition;
///
/// assert_eq!(Transition::Change(ChangeType::Rename).to_string(), "Rename");
/// assert_eq!(Transition::Insertion(LineKind::Code).to_string(), "Insertion (Code)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transition {
    /// A matched pair and its classification.
    Change(ChangeType),
    /// A version-0 line leaving ROOT.
    Original,
    Insertion(LineKind),
    Deletion(LineKind),
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Change(change) => write!(f, "{change}"),
            Transition::Original => f.write_str("Original"),
            Transition::Insertion(kind) => write!(f, "Insertion ({kind})"),
            Transition::Deletion(kind) => write!(f, "Deletion ({kind})"),
        }
    }
}

impl Serialize for Transition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Attributes of one directed edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub version_from: i32,
    pub version_to: i32,
    pub similarity: f64,
    pub transition: Transition,
}

/// Count of one transition between two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionCount {
    pub version_from: i32,
    pub version_to: i32,
    pub transition: Transition,
    pub count: usize,
}

/// One original line and everything it turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSummary {
    pub line: String,
    pub change_count: usize,
    pub descendants: Vec<GraphNode>,
}

/// Size and shape of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub lines: usize,
    pub edges: usize,
    pub originals: usize,
    pub unchanged_originals: usize,
    pub transitions: Vec<TransitionCount>,
}

type EdgeKey = (NodeIndex, NodeIndex, i32, i32);

/// Directed multigraph of line transitions across the versions of one lineage.
///
/// Parallel edges between the same two lines are kept apart by their version pair;
/// writing the same `(from, to, version pair)` again replaces the attributes. Every
/// write also bumps a counter keyed by `(version_from, version_to, transition)`.
///
/// # Examples
///
/// ```
/// use lineage_core::ChangeType;
/// use lineage_graph::EvolutionGraph;
///
/// let mut graph = EvolutionGraph::new();
/// graph.add_original("int x = 0;").unwrap();
/// graph.add_edge("int x = 0;", "int y = 0;", 0, 1, 0.93, ChangeType::Rename).unwrap();
/// graph.add_edge("int y = 0;", "int y = 1;", 1, 2, 0.88, ChangeType::LiteralChange).unwrap();
///
/// assert_eq!(graph.original_nodes(), vec!["int x = 0;"]);
/// assert_eq!(graph.change_count("int x = 0;"), 2);
/// assert!(graph.add_edge("int y = 1;", "int z = 1;", 2, 4, 0.9, ChangeType::Rename).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EvolutionGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    nodes: HashMap<GraphNode, NodeIndex>,
    edges: HashMap<EdgeKey, EdgeIndex>,
    counters: BTreeMap<(i32, i32, Transition), usize>,
}

impl Default for EvolutionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionGraph {
    /// An empty graph holding only the two sentinels.
    pub fn new() -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            counters: BTreeMap::new(),
        };
        graph.node(GraphNode::Root);
        graph.node(GraphNode::Sink);
        graph
    }

    /// Record that `old` at `version_from` became `new` at `version_to`.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::GraphContract`] for an empty line text or when
    /// `version_to` is not `version_from + 1`.
    pub fn add_edge(
        &mut self,
        old: &str,
        new: &str,
        version_from: i32,
        version_to: i32,
        similarity: f64,
        change: ChangeType,
    ) -> Result<(), LineageError> {
        let old = line_text(old)?;
        let new = line_text(new)?;
        check_adjacent(version_from, version_to)?;
        let edge = GraphEdge {
            version_from,
            version_to,
            similarity,
            transition: Transition::Change(change),
        };
        self.upsert(GraphNode::Line(old), GraphNode::Line(new), edge);
        Ok(())
    }

    /// Record a version-0 line as a child of ROOT.
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::GraphContract`] for an empty line text.
    pub fn add_original(&mut self, line: &str) -> Result<(), LineageError> {
        let line = line_text(line)?;
        let edge = GraphEdge {
            version_from: -1,
            version_to: 0,
            similarity: 1.0,
            transition: Transition::Original,
        };
        self.upsert(GraphNode::Root, GraphNode::Line(line), edge);
        Ok(())
    }

    /// Record that `line` disappeared between two versions.
    ///
    /// # Errors
    ///
    /// Same contract as [`EvolutionGraph::add_edge`].
    pub fn add_deletion(
        &mut self,
        line: &str,
        version_from: i32,
        version_to: i32,
        kind: LineKind,
    ) -> Result<(), LineageError> {
        let line = line_text(line)?;
        check_adjacent(version_from, version_to)?;
        let edge = GraphEdge {
            version_from,
            version_to,
            similarity: 0.0,
            transition: Transition::Deletion(kind),
        };
        self.upsert(GraphNode::Line(line), GraphNode::Sink, edge);
        Ok(())
    }

    /// Record that `line` appeared between two versions.
    ///
    /// Only the node and the counter are added: ROOT feeds version 0 alone.
    ///
    /// # Errors
    ///
    /// Same contract as [`EvolutionGraph::add_edge`].
    pub fn add_insertion(
        &mut self,
        line: &str,
        version_from: i32,
        version_to: i32,
        kind: LineKind,
    ) -> Result<(), LineageError> {
        let line = line_text(line)?;
        check_adjacent(version_from, version_to)?;
        self.node(GraphNode::Line(line));
        *self
            .counters
            .entry((version_from, version_to, Transition::Insertion(kind)))
            .or_default() += 1;
        Ok(())
    }

    /// Union of `self` and `other`; neither is modified.
    ///
    /// Edges are keyed by endpoints and version pair, `other` winning on attributes.
    /// Counters are summed.
    pub fn merge(&self, other: &EvolutionGraph) -> EvolutionGraph {
        let mut merged = self.clone();
        for node in other.graph.node_weights() {
            merged.node(node.clone());
        }
        for edge in other.graph.edge_references() {
            let u = merged.node(other.graph[edge.source()].clone());
            let v = merged.node(other.graph[edge.target()].clone());
            merged.put_edge(u, v, edge.weight().clone());
        }
        for (key, count) in &other.counters {
            *merged.counters.entry(*key).or_default() += count;
        }
        merged
    }

    /// Whether `line` is a node.
    pub fn contains(&self, line: &str) -> bool {
        self.index_of(line).is_some()
    }

    /// Every node reachable from `line`, SINK included, `line` itself excluded.
    pub fn descendants(&self, line: &str) -> BTreeSet<GraphNode> {
        let Some(start) = self.index_of(line) else {
            return BTreeSet::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut found = BTreeSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                found.insert(self.graph[idx].clone());
            }
        }
        found
    }

    /// Number of nodes reachable from `line`.
    pub fn change_count(&self, line: &str) -> usize {
        self.descendants(line).len()
    }

    /// Lines whose only predecessor is ROOT, sorted.
    pub fn original_nodes(&self) -> Vec<&str> {
        self.lines_where(|g, idx| g.only_root_parent(idx))
    }

    /// Originals that never changed or disappeared.
    pub fn unchanged_originals(&self) -> Vec<&str> {
        self.lines_where(|g, idx| {
            g.only_root_parent(idx)
                && g.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .next()
                    .is_none()
        })
    }

    /// The line `line` came from: the source of its earliest incoming edge.
    ///
    /// A line fed by ROOT, or by nothing, is its own origin. `None` for unknown lines.
    pub fn original_of(&self, line: &str) -> Option<&str> {
        let idx = self.index_of(line)?;
        let earliest = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .min_by(|a, b| {
                (a.weight().version_from, &self.graph[a.source()])
                    .cmp(&(b.weight().version_from, &self.graph[b.source()]))
            });
        let own = self.graph[idx].text()?;
        Some(
            earliest
                .and_then(|e| self.graph[e.source()].text())
                .unwrap_or(own),
        )
    }

    /// Every original line with what it turned into.
    pub fn lineage_summary(&self) -> Vec<LineSummary> {
        self.original_nodes()
            .into_iter()
            .map(|line| {
                let descendants: Vec<GraphNode> = self.descendants(line).into_iter().collect();
                LineSummary {
                    line: line.to_string(),
                    change_count: descendants.len(),
                    descendants,
                }
            })
            .collect()
    }

    /// Transition counters keyed by `(version_from, version_to, transition)`.
    pub fn counters(&self) -> &BTreeMap<(i32, i32, Transition), usize> {
        &self.counters
    }

    /// Counter value for one transition between two versions.
    pub fn transition_count(
        &self,
        version_from: i32,
        version_to: i32,
        transition: Transition,
    ) -> usize {
        self.counters
            .get(&(version_from, version_to, transition))
            .copied()
            .unwrap_or(0)
    }

    /// Number of line nodes, sentinels excluded.
    pub fn line_count(&self) -> usize {
        self.graph.node_count() - 2
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every edge as `(from, to, attributes)`.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &GraphEdge)> {
        self.graph
            .edge_references()
            .map(move |e| (&self.graph[e.source()], &self.graph[e.target()], e.weight()))
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            lines: self.line_count(),
            edges: self.edge_count(),
            originals: self.original_nodes().len(),
            unchanged_originals: self.unchanged_originals().len(),
            transitions: self
                .counters
                .iter()
                .map(|(&(version_from, version_to, transition), &count)| TransitionCount {
                    version_from,
                    version_to,
                    transition,
                    count,
                })
                .collect(),
        }
    }

    fn node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.nodes.insert(node, idx);
        idx
    }

    fn index_of(&self, line: &str) -> Option<NodeIndex> {
        self.nodes
            .get(&GraphNode::Line(line.trim().to_string()))
            .copied()
    }

    fn upsert(&mut self, from: GraphNode, to: GraphNode, edge: GraphEdge) {
        let u = self.node(from);
        let v = self.node(to);
        *self
            .counters
            .entry((edge.version_from, edge.version_to, edge.transition))
            .or_default() += 1;
        self.put_edge(u, v, edge);
    }

    fn put_edge(&mut self, u: NodeIndex, v: NodeIndex, edge: GraphEdge) {
        let key = (u, v, edge.version_from, edge.version_to);
        match self.edges.get(&key) {
            Some(&e) => self.graph[e] = edge,
            None => {
                let e = self.graph.add_edge(u, v, edge);
                self.edges.insert(key, e);
            }
        }
    }

    fn only_root_parent(&self, idx: NodeIndex) -> bool {
        let mut parents = self.graph.neighbors_directed(idx, Direction::Incoming);
        let Some(first) = parents.next() else {
            return false;
        };
        self.graph[first] == GraphNode::Root && parents.all(|p| p == first)
    }

    fn lines_where(&self, keep: impl Fn(&Self, NodeIndex) -> bool) -> Vec<&str> {
        let mut lines: Vec<&str> = self
            .graph
            .node_indices()
            .filter(|&idx| keep(self, idx))
            .filter_map(|idx| self.graph[idx].text())
            .collect();
        lines.sort_unstable();
        lines
    }
}

fn line_text(line: &str) -> Result<String, LineageError> {
    let text = line.trim();
    if text.is_empty() {
        return Err(LineageError::GraphContract(
            "line text must not be empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

fn check_adjacent(version_from: i32, version_to: i32) -> Result<(), LineageError> {
    if i64::from(version_to) - i64::from(version_from) != 1 {
        return Err(LineageError::GraphContract(format!(
            "versions {version_from} -> {version_to} are not adjacent"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> EvolutionGraph {
        let mut g = EvolutionGraph::new();
        g.add_original("int x = 0;").unwrap();
        g.add_original("return x;").unwrap();
        g.add_original("// keep").unwrap();
        g.add_edge("int x = 0;", "int y = 0;", 0, 1, 0.9, ChangeType::Rename)
            .unwrap();
        g.add_edge("return x;", "return y;", 0, 1, 0.9, ChangeType::Rename)
            .unwrap();
        g.add_deletion("return y;", 1, 2, LineKind::Code).unwrap();
        g
    }

    #[test]
    fn contract_violations_are_rejected() {
        let mut g = EvolutionGraph::new();
        for (from, to) in [(0, 0), (0, 2), (3, 2), (i32::MAX, i32::MIN)] {
            let err = g
                .add_edge("a;", "b;", from, to, 1.0, ChangeType::Rename)
                .unwrap_err();
            assert!(matches!(err, LineageError::GraphContract(_)), "{from} -> {to}");
        }
        assert!(g.add_edge("  ", "b;", 0, 1, 1.0, ChangeType::Rename).is_err());
        assert!(g.add_original("").is_err());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn descendants_reach_the_sink() {
        let g = chain();
        let d = g.descendants("return x;");
        assert!(d.contains(&GraphNode::Line("return y;".into())));
        assert!(d.contains(&GraphNode::Sink));
        assert!(!d.contains(&GraphNode::Line("return x;".into())));
        assert_eq!(g.change_count("return x;"), 2);
        assert!(g.descendants("missing").is_empty());
    }

    #[test]
    fn originals_and_unchanged() {
        let g = chain();
        assert_eq!(g.original_nodes(), vec!["// keep", "int x = 0;", "return x;"]);
        assert_eq!(g.unchanged_originals(), vec!["// keep"]);
    }

    #[test]
    fn origin_of_lines() {
        let g = chain();
        assert_eq!(g.original_of("int y = 0;"), Some("int x = 0;"));
        assert_eq!(g.original_of("int x = 0;"), Some("int x = 0;"));
        assert_eq!(g.original_of("nothing"), None);
    }

    #[test]
    fn rewriting_an_edge_replaces_attributes() {
        let mut g = EvolutionGraph::new();
        g.add_edge("a;", "b;", 0, 1, 0.7, ChangeType::Rename).unwrap();
        g.add_edge("a;", "b;", 0, 1, 0.8, ChangeType::SyntaxOnly).unwrap();
        g.add_edge("a;", "b;", 1, 2, 0.9, ChangeType::Rename).unwrap();
        assert_eq!(g.edge_count(), 2, "version pair keys parallel edges");
        let (_, _, first) = g.edges().next().unwrap();
        assert_eq!(first.transition, Transition::Change(ChangeType::SyntaxOnly));
        assert_eq!(g.transition_count(0, 1, Transition::Change(ChangeType::Rename)), 1);
        assert_eq!(g.transition_count(0, 1, Transition::Change(ChangeType::SyntaxOnly)), 1);
    }

    #[test]
    fn insertions_have_no_root_edge() {
        let mut g = EvolutionGraph::new();
        g.add_insertion("log(x);", 2, 3, LineKind::Code).unwrap();
        assert!(g.contains("log(x);"));
        assert_eq!(g.edge_count(), 0);
        assert!(g.original_nodes().is_empty());
        assert_eq!(g.transition_count(2, 3, Transition::Insertion(LineKind::Code)), 1);
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let a = chain();
        let mut b = EvolutionGraph::new();
        b.add_edge("int y = 0;", "int z = 0;", 1, 2, 0.9, ChangeType::Rename)
            .unwrap();
        let (edges_a, edges_b) = (a.edge_count(), b.edge_count());

        let merged = a.merge(&b);
        assert_eq!(a.edge_count(), edges_a);
        assert_eq!(b.edge_count(), edges_b);
        assert_eq!(merged.edge_count(), edges_a + edges_b);
        assert_eq!(merged.change_count("int x = 0;"), 2);
    }

    #[test]
    fn summary_lists_counters() {
        let summary = chain().summary();
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.originals, 3);
        assert_eq!(summary.unchanged_originals, 1);
        assert_eq!(
            summary.transitions[0],
            TransitionCount {
                version_from: -1,
                version_to: 0,
                transition: Transition::Original,
                count: 3,
            }
        );
    }
}
