use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::types::{ArchLayer, Location};

/// A namespace node; `layer` is `None` when the namespace could not be
/// classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub namespace: String,
    pub layer: Option<ArchLayer>,
}

/// One `using` directive from a file in `from` referencing `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_namespace: String,
    pub from_layer: Option<ArchLayer>,
    pub to_namespace: String,
    pub to_layer: Option<ArchLayer>,
    pub location: Location,
}

impl DependencyEdge {
    /// Whether the edge breaks the layer policy. Edges with an unknown end
    /// are never policy violations.
    pub fn violates_policy(&self) -> bool {
        match (self.from_layer, self.to_layer) {
            (Some(from), Some(to)) => from != to && !from.allowed_dependencies().contains(&to),
            _ => false,
        }
    }
}

/// Directed dependency graph between namespaces.
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, DependencyEdge>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Ensure a namespace exists as a node. A later call with a known layer
    /// fills in a node first created without one.
    pub fn ensure_node(&mut self, namespace: &str, layer: Option<ArchLayer>) -> NodeIndex {
        if let Some(&idx) = self.index.get(namespace) {
            if self.graph[idx].layer.is_none() {
                self.graph[idx].layer = layer;
            }
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            namespace: namespace.to_string(),
            layer,
        });
        self.index.insert(namespace.to_string(), idx);
        idx
    }

    /// Add a dependency as an edge.
    pub fn add_dependency(&mut self, edge: DependencyEdge) {
        let from_idx = self.ensure_node(&edge.from_namespace, edge.from_layer);
        let to_idx = self.ensure_node(&edge.to_namespace, edge.to_layer);
        self.graph.add_edge(from_idx, to_idx, edge);
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.graph.edge_references().map(|e| e.weight())
    }

    /// Strongly connected groups of more than one namespace. Namespaces within
    /// a group are sorted, and groups are sorted by their first member.
    pub fn find_cycles(&self) -> Vec<Vec<&GraphNode>> {
        let mut cycles: Vec<Vec<&GraphNode>> = petgraph::algo::kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut nodes: Vec<&GraphNode> = scc.iter().map(|&idx| &self.graph[idx]).collect();
                nodes.sort_by(|a, b| a.namespace.cmp(&b.namespace));
                nodes
            })
            .collect();
        cycles.sort_by(|a, b| a[0].namespace.cmp(&b[0].namespace));
        cycles
    }

    /// First edge (by location) that runs between two members of `cycle`.
    pub fn cycle_edge(&self, cycle: &[&GraphNode]) -> Option<&DependencyEdge> {
        let members: Vec<&str> = cycle.iter().map(|n| n.namespace.as_str()).collect();
        self.edges()
            .filter(|e| {
                members.contains(&e.from_namespace.as_str())
                    && members.contains(&e.to_namespace.as_str())
            })
            .min_by(|a, b| a.location.cmp(&b.location))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get all nodes
    pub fn nodes(&self) -> Vec<&GraphNode> {
        self.graph.node_weights().collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn edge(from: &str, from_layer: Option<ArchLayer>, to: &str, to_layer: Option<ArchLayer>) -> DependencyEdge {
        DependencyEdge {
            from_namespace: from.to_string(),
            from_layer,
            to_namespace: to.to_string(),
            to_layer,
            location: Location {
                file: PathBuf::from(format!("{from}.cs")),
                line: 1,
                column: 1,
            },
        }
    }

    #[test]
    fn test_policy_violation() {
        use ArchLayer::*;
        assert!(edge("A", Some(Domain), "B", Some(Infrastructure)).violates_policy());
        assert!(edge("A", Some(Application), "B", Some(Presentation)).violates_policy());
        assert!(!edge("A", Some(Presentation), "B", Some(Domain)).violates_policy());
        assert!(!edge("A", Some(Domain), "B", Some(Domain)).violates_policy());
        assert!(!edge("A", Some(Domain), "B", None).violates_policy());
    }

    #[test]
    fn test_no_duplicate_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(edge("A", None, "B", None));
        graph.add_dependency(edge("A", None, "B", None));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_layer_filled_in_later() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(edge("App", Some(ArchLayer::Application), "Dom", None));
        graph.ensure_node("Dom", Some(ArchLayer::Domain));
        let dom = graph.nodes().into_iter().find(|n| n.namespace == "Dom").unwrap();
        assert_eq!(dom.layer, Some(ArchLayer::Domain));
    }

    #[test]
    fn test_find_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(edge("B", None, "A", None));
        graph.add_dependency(edge("A", None, "B", None));
        graph.add_dependency(edge("A", None, "C", None));

        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        let names: Vec<_> = cycles[0].iter().map(|n| n.namespace.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        let first = graph.cycle_edge(&cycles[0]).unwrap();
        assert_eq!(first.from_namespace, "A");
    }
}
