use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::error::EditError;

/// Type alias for graph node identifiers ("A", "B", ...)
pub type NodeId = String;

/// Horizontal canvas bounds node positions are clamped to
pub const CANVAS_X: (f64, f64) = (30.0, 620.0);
/// Vertical canvas bounds node positions are clamped to
pub const CANVAS_Y: (f64, f64) = (30.0, 270.0);
/// Largest accepted edge weight; path sums over it stay far from `u64::MAX`
pub const MAX_WEIGHT: u64 = u32::MAX as u64;

/// Canvas coordinates of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this position clamped into the drawable canvas
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(CANVAS_X.0, CANVAS_X.1),
            y: self.y.clamp(CANVAS_Y.0, CANVAS_Y.1),
        }
    }
}

/// A graph vertex together with the per-run algorithm state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique, stable identifier
    pub id: NodeId,
    /// Where the renderer draws the node
    pub position: Position,
    /// Tentative distance (Dijkstra) or connecting key (Prim); `None` is +∞
    pub distance: Option<u64>,
    /// Node this one was reached from
    pub predecessor: Option<NodeId>,
    /// Settled by the selection loop
    pub visited: bool,
    /// Part of the spanning tree being built
    pub in_tree: bool,
}

impl Node {
    /// Creates a node with cleared algorithm state
    pub fn new(id: impl Into<NodeId>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            distance: None,
            predecessor: None,
            visited: false,
            in_tree: false,
        }
    }

    fn clear_state(&mut self) {
        self.distance = None;
        self.predecessor = None;
        self.visited = false;
        self.in_tree = false;
    }
}

/// An undirected weighted edge. Both travel directions share the weight and the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    pub weight: u64,
    pub in_tree: bool,
}

impl Edge {
    pub fn new(a: impl Into<NodeId>, b: impl Into<NodeId>, weight: u64) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            weight,
            in_tree: false,
        }
    }

    /// True if this edge joins `x` and `y` in either direction
    pub fn connects(&self, x: &str, y: &str) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    /// The endpoint opposite `id`, if `id` is an endpoint
    pub fn opposite(&self, id: &str) -> Option<&str> {
        if self.a == id {
            Some(&self.b)
        } else if self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }

    fn touches(&self, id: &str) -> bool {
        self.a == id || self.b == id
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

/// One direction of an undirected edge as seen from a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<'a> {
    pub to: &'a str,
    pub weight: u64,
}

/// What the renderer should highlight right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Focus {
    Node { id: NodeId },
    Edge { a: NodeId, b: NodeId },
}

/// Mutable weighted graph shared by Dijkstra, Prim and Kruskal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Current highlight set by the active executor
    pub focus: Option<Focus>,
}

impl Graph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// The six-node demo graph the visualizer starts with
    pub fn demo() -> Self {
        let mut graph = Self::new();
        for (id, x, y) in [
            ("A", 100.0, 150.0),
            ("B", 250.0, 80.0),
            ("C", 250.0, 220.0),
            ("D", 400.0, 80.0),
            ("E", 400.0, 220.0),
            ("F", 550.0, 150.0),
        ] {
            graph.nodes.push(Node::new(id, Position::new(x, y)));
        }
        for (a, b, weight) in [
            ("A", "B", 4),
            ("A", "C", 2),
            ("B", "D", 5),
            ("C", "B", 1),
            ("C", "E", 10),
            ("D", "F", 3),
            ("E", "D", 2),
            ("E", "F", 6),
        ] {
            graph.edges.push(Edge::new(a, b, weight));
        }
        graph
    }

    /// Nodes in insertion order (the order every tie-break follows)
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Undirected edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.connects(a, b))
    }

    pub fn edge_mut(&mut self, a: &str, b: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.connects(a, b))
    }

    /// Outgoing directed view of `id`: every incident edge, oriented away from it,
    /// in edge insertion order
    pub fn neighbors<'a>(&'a self, id: &str) -> Vec<Neighbor<'a>> {
        self.edges
            .iter()
            .filter_map(|edge| {
                edge.opposite(id).map(|to| Neighbor {
                    to,
                    weight: edge.weight,
                })
            })
            .collect()
    }

    /// Linear scan for the unvisited node with the smallest finite distance.
    /// Ties go to the node inserted first.
    pub fn closest_unvisited(&self) -> Option<(NodeId, u64)> {
        let mut best: Option<(&Node, u64)> = None;
        for node in self.nodes.iter().filter(|n| !n.visited) {
            let Some(distance) = node.distance else {
                continue;
            };
            match best {
                Some((_, current)) if distance >= current => {}
                _ => best = Some((node, distance)),
            }
        }
        best.map(|(node, distance)| (node.id.clone(), distance))
    }

    /// Clears distances, predecessors, visited/in-tree flags and the highlight
    pub fn reset_algorithm_state(&mut self) {
        for node in &mut self.nodes {
            node.clear_state();
        }
        for edge in &mut self.edges {
            edge.in_tree = false;
        }
        self.focus = None;
    }

    /// Walks predecessors back from `target`. Returns `None` when the walk never reaches `start`.
    pub fn path_to(&self, start: &str, target: &str) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut current = Some(target.to_string());
        while let Some(id) = current {
            if id == start {
                path.push(id);
                path.reverse();
                return Some(path);
            }
            // A predecessor chain can never be longer than the node count
            if path.len() > self.nodes.len() {
                return None;
            }
            current = self.node(&id).and_then(|n| n.predecessor.clone());
            path.push(id);
        }
        None
    }

    /// Sum of the weights of all edges flagged in-tree, each undirected edge counted once
    pub fn tree_weight(&self) -> u64 {
        self.edges
            .iter()
            .filter(|e| e.in_tree)
            .map(|e| e.weight)
            .sum()
    }

    pub fn add_node(&mut self, id: &str, position: Position) -> Result<(), EditError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EditError::EmptyNodeId);
        }
        if self.contains(id) {
            return Err(EditError::DuplicateNode(id.to_string()));
        }
        self.nodes.push(Node::new(id, position.clamped()));
        Ok(())
    }

    /// Removes a node together with every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Result<(), EditError> {
        if !self.contains(id) {
            return Err(EditError::UnknownNode(id.to_string()));
        }
        self.nodes.retain(|n| n.id != id);
        self.edges.retain(|e| !e.touches(id));
        Ok(())
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), EditError> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| EditError::UnknownNode(id.to_string()))?;
        node.position = position.clamped();
        Ok(())
    }

    pub fn add_edge(&mut self, a: &str, b: &str, weight: u64) -> Result<(), EditError> {
        self.require_node(a)?;
        self.require_node(b)?;
        if a == b {
            return Err(EditError::SelfLoop(a.to_string()));
        }
        check_weight(weight)?;
        if self.edge(a, b).is_some() {
            return Err(EditError::DuplicateEdge(a.to_string(), b.to_string()));
        }
        self.edges.push(Edge::new(a, b, weight));
        Ok(())
    }

    pub fn remove_edge(&mut self, a: &str, b: &str) -> Result<(), EditError> {
        let before = self.edges.len();
        self.edges.retain(|e| !e.connects(a, b));
        if self.edges.len() == before {
            return Err(EditError::UnknownEdge(a.to_string(), b.to_string()));
        }
        Ok(())
    }

    /// Changes the weight of an edge; both directions observe the new value
    pub fn set_weight(&mut self, a: &str, b: &str, weight: u64) -> Result<(), EditError> {
        check_weight(weight)?;
        let edge = self
            .edge_mut(a, b)
            .ok_or_else(|| EditError::UnknownEdge(a.to_string(), b.to_string()))?;
        edge.weight = weight;
        Ok(())
    }

    fn require_node(&self, id: &str) -> Result<(), EditError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(EditError::UnknownNode(id.to_string()))
        }
    }
}

fn check_weight(weight: u64) -> Result<(), EditError> {
    if weight == 0 || weight > MAX_WEIGHT {
        return Err(EditError::InvalidWeight(weight));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_graph_shape() {
        let graph = Graph::demo();
        assert_eq!(graph.nodes().len(), 6);
        assert_eq!(graph.edges().len(), 8);
        assert_eq!(graph.edge("B", "C").map(|e| e.weight), Some(1));
        assert!(graph.nodes().iter().all(|n| n.distance.is_none()));
    }

    #[test]
    fn test_neighbors_are_oriented_away() {
        let graph = Graph::demo();
        let from_c: Vec<_> = graph.neighbors("C").iter().map(|n| (n.to, n.weight)).collect();
        assert_eq!(from_c, vec![("A", 2), ("B", 1), ("E", 10)]);
    }

    #[test]
    fn test_set_weight_affects_both_directions() {
        let mut graph = Graph::demo();
        graph.set_weight("B", "A", 9).unwrap();
        assert_eq!(graph.edge("A", "B").unwrap().weight, 9);
        assert!(graph.neighbors("A").iter().any(|n| n.to == "B" && n.weight == 9));
        assert!(graph.neighbors("B").iter().any(|n| n.to == "A" && n.weight == 9));
    }

    #[test]
    fn test_edit_rejections_leave_graph_unchanged() {
        let mut graph = Graph::demo();
        let before = graph.clone();

        assert_eq!(
            graph.add_node("A", Position::new(0.0, 0.0)),
            Err(EditError::DuplicateNode("A".to_string()))
        );
        assert_eq!(graph.add_node("  ", Position::new(0.0, 0.0)), Err(EditError::EmptyNodeId));
        assert_eq!(graph.add_edge("A", "D", 0), Err(EditError::InvalidWeight(0)));
        assert_eq!(
            graph.add_edge("A", "B", 3),
            Err(EditError::DuplicateEdge("A".to_string(), "B".to_string()))
        );
        assert_eq!(graph.add_edge("A", "A", 3), Err(EditError::SelfLoop("A".to_string())));
        assert_eq!(graph.set_weight("A", "B", 0), Err(EditError::InvalidWeight(0)));
        assert_eq!(
            graph.remove_edge("A", "F"),
            Err(EditError::UnknownEdge("A".to_string(), "F".to_string()))
        );

        assert_eq!(graph, before);
    }

    #[test]
    fn test_weights_above_cap_are_rejected() {
        let mut graph = Graph::demo();
        let before = graph.clone();
        assert_eq!(
            graph.set_weight("A", "C", u64::MAX),
            Err(EditError::InvalidWeight(u64::MAX))
        );
        assert_eq!(
            graph.add_edge("A", "F", MAX_WEIGHT + 1),
            Err(EditError::InvalidWeight(MAX_WEIGHT + 1))
        );
        assert_eq!(graph, before);

        graph.set_weight("A", "C", MAX_WEIGHT).unwrap();
        assert_eq!(graph.edge("A", "C").map(|e| e.weight), Some(MAX_WEIGHT));
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = Graph::demo();
        graph.remove_node("D").unwrap();
        assert!(!graph.contains("D"));
        assert!(graph.edges().iter().all(|e| e.a != "D" && e.b != "D"));
        assert_eq!(graph.edges().len(), 5);
    }

    #[test]
    fn test_positions_are_clamped() {
        let mut graph = Graph::demo();
        graph.move_node("A", Position::new(-50.0, 900.0)).unwrap();
        assert_eq!(graph.node("A").unwrap().position, Position::new(30.0, 270.0));

        graph.add_node("G", Position::new(1000.0, 100.0)).unwrap();
        assert_eq!(graph.node("G").unwrap().position, Position::new(620.0, 100.0));
    }

    #[test]
    fn test_path_to_requires_reaching_start() {
        let mut graph = Graph::demo();
        graph.node_mut("C").unwrap().predecessor = Some("A".to_string());
        graph.node_mut("B").unwrap().predecessor = Some("C".to_string());

        assert_eq!(
            graph.path_to("A", "B"),
            Some(vec!["A".to_string(), "C".to_string(), "B".to_string()])
        );
        assert_eq!(graph.path_to("A", "F"), None);
        assert_eq!(graph.path_to("A", "A"), Some(vec!["A".to_string()]));
    }
}
