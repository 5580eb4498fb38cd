use std::collections::HashSet;
use tracing::debug;

use crate::engine::executor::{Completion, Executor, ExecutorKind, Outcome, RunReport, Step};
use crate::engine::graph::{Focus, Graph, NodeId};
use crate::engine::trace::Trace;
use crate::engine::union_find::UnionFind;

#[derive(Debug, Clone)]
struct Candidate {
    a: NodeId,
    b: NodeId,
    weight: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Init,
    Consider(usize),
    Decide(usize),
}

/// Builds a minimum spanning forest by scanning edges cheapest first
#[derive(Debug, Clone)]
pub struct Kruskal {
    phase: Phase,
    sorted: Vec<Candidate>,
    sets: UnionFind<NodeId>,
    total_weight: u64,
    accepted: usize,
}

impl Default for Kruskal {
    fn default() -> Self {
        Self::new()
    }
}

impl Kruskal {
    pub fn new() -> Self {
        Self {
            phase: Phase::Init,
            sorted: Vec::new(),
            sets: UnionFind::new(Vec::new()),
            total_weight: 0,
            accepted: 0,
        }
    }

    fn init(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        graph.reset_algorithm_state();

        let mut seen = HashSet::new();
        self.sorted = graph
            .edges()
            .iter()
            .filter(|e| {
                let key = if e.a <= e.b {
                    (e.a.clone(), e.b.clone())
                } else {
                    (e.b.clone(), e.a.clone())
                };
                seen.insert(key)
            })
            .map(|e| Candidate {
                a: e.a.clone(),
                b: e.b.clone(),
                weight: e.weight,
            })
            .collect();
        self.sorted.sort_by_key(|c| c.weight);

        self.sets = UnionFind::new(graph.nodes().iter().map(|n| n.id.clone()));
        self.total_weight = 0;
        self.accepted = 0;

        trace.info("Starting Kruskal's algorithm");
        trace.info(format!("Sorted {} edges by weight", self.sorted.len()));
        self.phase = Phase::Consider(0);
        Step::Continue
    }

    fn consider(&mut self, index: usize, graph: &mut Graph, trace: &mut Trace) -> Step {
        let Some(edge) = self.sorted.get(index) else {
            graph.focus = None;
            trace.success(format!(
                "MST complete! Total weight: {}, Edges in MST: {}",
                self.total_weight, self.accepted
            ));
            return Step::Done(RunReport::new(
                ExecutorKind::Kruskal,
                Outcome::Success(Completion::SpanningTree {
                    total_weight: self.total_weight,
                    edges: self.accepted,
                }),
            ));
        };

        graph.focus = Some(Focus::Edge {
            a: edge.a.clone(),
            b: edge.b.clone(),
        });
        trace.info(format!(
            "Considering edge {}-{} (weight: {})",
            edge.a, edge.b, edge.weight
        ));
        self.phase = Phase::Decide(index);
        Step::Continue
    }

    fn decide(&mut self, index: usize, graph: &mut Graph, trace: &mut Trace) -> Step {
        let Some(edge) = self.sorted.get(index).cloned() else {
            return self.consider(index, graph, trace);
        };

        if self.sets.union(&edge.a, &edge.b) {
            if let Some(e) = graph.edge_mut(&edge.a, &edge.b) {
                e.in_tree = true;
            }
            for id in [&edge.a, &edge.b] {
                if let Some(node) = graph.node_mut(id) {
                    node.in_tree = true;
                }
            }
            self.total_weight = self.total_weight.saturating_add(edge.weight);
            self.accepted += 1;
            debug!(a = %edge.a, b = %edge.b, total = self.total_weight, "edge accepted");
            trace.detail(format!("✓ Added to MST (total weight: {})", self.total_weight));
        } else {
            debug!(a = %edge.a, b = %edge.b, "edge rejected");
            trace.detail("✗ Rejected (would create cycle)");
        }

        self.phase = Phase::Consider(index + 1);
        Step::Continue
    }
}

impl Executor for Kruskal {
    type Model = Graph;

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Kruskal
    }

    fn step(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        match self.phase {
            Phase::Init => self.init(graph, trace),
            Phase::Consider(index) => self.consider(index, graph, trace),
            Phase::Decide(index) => self.decide(index, graph, trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::Position;

    fn run(graph: &mut Graph) -> (RunReport, Trace) {
        let mut kruskal = Kruskal::new();
        let mut trace = Trace::new();
        for _ in 0..1000 {
            if let Step::Done(report) = kruskal.step(graph, &mut trace) {
                return (report, trace);
            }
        }
        panic!("Kruskal did not terminate");
    }

    #[test]
    fn test_demo_graph_tree() {
        let mut graph = Graph::demo();
        let (report, trace) = run(&mut graph);

        assert_eq!(
            report.outcome,
            Outcome::Success(Completion::SpanningTree {
                total_weight: 13,
                edges: 5
            })
        );
        assert_eq!(trace.entries()[1].line, "Sorted 8 edges by weight");
        assert_eq!(trace.entries()[2].line, "Considering edge C-B (weight: 1)");
        let rejected = trace
            .entries()
            .iter()
            .filter(|e| e.line.contains("Rejected"))
            .count();
        assert_eq!(rejected, 3);
        assert!(!graph.edge("C", "E").unwrap().in_tree);
        assert!(graph.edge("B", "D").unwrap().in_tree);
        assert!(graph.focus.is_none());
    }

    #[test]
    fn test_forest_on_disconnected_graph() {
        let mut graph = Graph::demo();
        graph.add_node("Y", Position::new(500.0, 260.0)).unwrap();
        graph.add_node("Z", Position::new(600.0, 260.0)).unwrap();
        graph.add_edge("Y", "Z", 7).unwrap();

        let (report, _) = run(&mut graph);
        assert_eq!(
            report.outcome,
            Outcome::Success(Completion::SpanningTree {
                total_weight: 20,
                edges: 6
            })
        );
        assert!(graph.node("Z").unwrap().in_tree);
    }

    #[test]
    fn test_focus_tracks_considered_edge() {
        let mut graph = Graph::demo();
        let mut kruskal = Kruskal::new();
        let mut trace = Trace::new();
        kruskal.step(&mut graph, &mut trace);
        kruskal.step(&mut graph, &mut trace);
        assert_eq!(
            graph.focus,
            Some(Focus::Edge {
                a: "C".to_string(),
                b: "B".to_string()
            })
        );
        assert!(!graph.edge("C", "B").unwrap().in_tree);
        kruskal.step(&mut graph, &mut trace);
        assert!(graph.edge("B", "C").unwrap().in_tree);
    }
}
