use tracing::debug;

use crate::engine::executor::{Completion, Executor, ExecutorKind, FailureReason, Outcome, RunReport, Step};
use crate::engine::graph::{Focus, Graph, NodeId};
use crate::engine::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Init,
    Select,
    Relax(NodeId),
}

/// Grows a minimum spanning tree outward from `start`.
/// Node distance holds the cheapest known edge into the tree, not a path length.
#[derive(Debug, Clone)]
pub struct Prim {
    start: NodeId,
    phase: Phase,
    total_weight: u64,
}

impl Prim {
    pub fn new(start: impl Into<NodeId>) -> Self {
        Self {
            start: start.into(),
            phase: Phase::Init,
            total_weight: 0,
        }
    }

    fn init(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        graph.reset_algorithm_state();
        self.total_weight = 0;
        let Some(start) = graph.node_mut(&self.start) else {
            trace.failure(format!("Start node {} does not exist", self.start));
            return self.done(Outcome::Failure(FailureReason::UnknownStart));
        };
        start.distance = Some(0);
        trace.info(format!("Starting Prim's algorithm from node {}", self.start));
        self.phase = Phase::Select;
        Step::Continue
    }

    fn select(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        let Some((id, key)) = graph.closest_unvisited() else {
            graph.focus = None;
            if graph.nodes().iter().any(|n| !n.visited) {
                trace.failure("Graph is disconnected - MST cannot span all nodes");
                return self.done(Outcome::Failure(FailureReason::Disconnected));
            }
            let edges = graph.edges().iter().filter(|e| e.in_tree).count();
            trace.success(format!(
                "MST complete! Total weight: {}, Edges in MST: {edges}",
                self.total_weight
            ));
            return self.done(Outcome::Success(Completion::SpanningTree {
                total_weight: self.total_weight,
                edges,
            }));
        };

        debug!(node = %id, key, "pulling node into tree");
        graph.focus = Some(Focus::Node { id: id.clone() });
        let predecessor = graph.node_mut(&id).and_then(|node| {
            node.in_tree = true;
            node.visited = true;
            node.predecessor.clone()
        });

        match predecessor {
            Some(from) => {
                self.total_weight = self.total_weight.saturating_add(key);
                if let Some(edge) = graph.edge_mut(&from, &id) {
                    edge.in_tree = true;
                }
                trace.info(format!("Adding node {id} to MST (edge weight: {key})"));
            }
            None => trace.info(format!("Starting node {id} added to MST")),
        }

        self.phase = Phase::Relax(id);
        Step::Continue
    }

    fn relax(&mut self, id: NodeId, graph: &mut Graph, trace: &mut Trace) -> Step {
        let candidates: Vec<(NodeId, u64)> = graph
            .neighbors(&id)
            .into_iter()
            .map(|n| (n.to.to_string(), n.weight))
            .collect();

        for (to, weight) in candidates {
            let Some(neighbor) = graph.node_mut(&to) else {
                continue;
            };
            if neighbor.in_tree {
                continue;
            }
            if neighbor.distance.map_or(true, |key| weight < key) {
                neighbor.distance = Some(weight);
                neighbor.predecessor = Some(id.clone());
                trace.detail(format!("Updated {to}: key = {weight} (via {id})"));
            }
        }

        self.phase = Phase::Select;
        Step::Continue
    }

    fn done(&self, outcome: Outcome) -> Step {
        Step::Done(RunReport::new(ExecutorKind::Prim, outcome))
    }
}

impl Executor for Prim {
    type Model = Graph;

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Prim
    }

    fn step(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Select) {
            Phase::Init => self.init(graph, trace),
            Phase::Select => self.select(graph, trace),
            Phase::Relax(id) => self.relax(id, graph, trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::Position;

    fn run(graph: &mut Graph, start: &str) -> (RunReport, Trace) {
        let mut prim = Prim::new(start);
        let mut trace = Trace::new();
        for _ in 0..1000 {
            if let Step::Done(report) = prim.step(graph, &mut trace) {
                return (report, trace);
            }
        }
        panic!("Prim did not terminate");
    }

    #[test]
    fn test_demo_graph_tree() {
        let mut graph = Graph::demo();
        let (report, trace) = run(&mut graph, "A");

        // A-C 2, C-B 1, B-D 5, E-D 2, D-F 3
        assert_eq!(
            report.outcome,
            Outcome::Success(Completion::SpanningTree {
                total_weight: 13,
                edges: 5
            })
        );
        assert_eq!(graph.tree_weight(), 13);
        assert!(graph.nodes().iter().all(|n| n.in_tree));
        assert_eq!(trace.entries()[1].line, "Starting node A added to MST");
        assert_eq!(trace.last().unwrap().line, "MST complete! Total weight: 13, Edges in MST: 5");
    }

    #[test]
    fn test_disconnected_graph_fails() {
        let mut graph = Graph::demo();
        graph.add_node("Z", Position::new(300.0, 260.0)).unwrap();
        let (report, trace) = run(&mut graph, "B");

        assert_eq!(report.outcome, Outcome::Failure(FailureReason::Disconnected));
        assert_eq!(
            trace.last().unwrap().line,
            "Graph is disconnected - MST cannot span all nodes"
        );
        assert!(!graph.node("Z").unwrap().in_tree);
        assert_eq!(graph.tree_weight(), 13);
    }

    #[test]
    fn test_missing_start_is_reported() {
        let mut graph = Graph::demo();
        let (report, trace) = run(&mut graph, "Q");

        assert_eq!(report.outcome, Outcome::Failure(FailureReason::UnknownStart));
        assert_eq!(trace.last().unwrap().line, "Start node Q does not exist");
        assert!(graph.nodes().iter().all(|n| !n.in_tree));
    }

    #[test]
    fn test_key_is_edge_weight_not_path_length() {
        let mut graph = Graph::demo();
        let mut prim = Prim::new("A");
        let mut trace = Trace::new();
        // init, select A, relax A, select C, relax C
        for _ in 0..5 {
            prim.step(&mut graph, &mut trace);
        }
        assert_eq!(graph.node("B").unwrap().distance, Some(1));
        assert_eq!(graph.node("E").unwrap().distance, Some(10));
    }
}
