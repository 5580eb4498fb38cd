use tracing::{debug, trace};

use crate::engine::executor::{Completion, Executor, ExecutorKind, FailureReason, Outcome, RunReport, Step};
use crate::engine::graph::{Focus, Graph, NodeId};
use crate::engine::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Init,
    Select,
    Settle(NodeId),
}

/// Single-source shortest path from `start`, stopping once `target` is settled
#[derive(Debug, Clone)]
pub struct Dijkstra {
    start: NodeId,
    target: NodeId,
    phase: Phase,
}

impl Dijkstra {
    pub fn new(start: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            start: start.into(),
            target: target.into(),
            phase: Phase::Init,
        }
    }

    fn init(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        graph.reset_algorithm_state();
        let Some(start) = graph.node_mut(&self.start) else {
            trace.failure(format!("Start node {} does not exist", self.start));
            let outcome = Outcome::Failure(FailureReason::UnknownStart);
            return Step::Done(RunReport::new(ExecutorKind::Dijkstra, outcome));
        };
        start.distance = Some(0);
        trace.info(format!("Starting from node {}", self.start));
        self.phase = Phase::Select;
        Step::Continue
    }

    fn select(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        match graph.closest_unvisited() {
            Some((id, distance)) => {
                debug!(node = %id, distance, "selected closest unvisited node");
                graph.focus = Some(Focus::Node { id: id.clone() });
                trace.info(format!("Visiting node {id} with distance {distance}"));
                self.phase = Phase::Settle(id);
                Step::Continue
            }
            None => {
                if graph.nodes().iter().any(|n| !n.visited) {
                    trace.info("No more reachable nodes");
                }
                self.finish(graph, trace)
            }
        }
    }

    fn settle(&mut self, id: NodeId, graph: &mut Graph, trace: &mut Trace) -> Step {
        let Some(distance) = graph.node(&id).and_then(|n| n.distance) else {
            return self.finish(graph, trace);
        };
        if let Some(node) = graph.node_mut(&id) {
            node.visited = true;
        }

        if id == self.target {
            trace.success(format!("Reached target node {}!", self.target));
            return self.finish(graph, trace);
        }

        let relaxations: Vec<(NodeId, u64)> = graph
            .neighbors(&id)
            .into_iter()
            .map(|n| (n.to.to_string(), n.weight))
            .collect();

        for (to, weight) in relaxations {
            let Some(neighbor) = graph.node_mut(&to) else {
                continue;
            };
            if neighbor.visited {
                continue;
            }
            let candidate = distance.saturating_add(weight);
            if neighbor.distance.map_or(true, |current| candidate < current) {
                neighbor.distance = Some(candidate);
                neighbor.predecessor = Some(id.clone());
                trace!(node = %to, candidate, "relaxed edge");
                trace.detail(format!("Updated {to}: distance = {candidate} (via {id})"));
            }
        }

        self.phase = Phase::Select;
        Step::Continue
    }

    fn finish(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        graph.focus = None;
        let distance = graph.node(&self.target).and_then(|n| n.distance);
        let outcome = match (graph.path_to(&self.start, &self.target), distance) {
            (Some(path), Some(distance)) => {
                trace.success(format!(
                    "Shortest path: {} (distance: {distance})",
                    path.join(" → ")
                ));
                Outcome::Success(Completion::ShortestPath { path, distance })
            }
            _ => {
                trace.failure(format!("No path found from {} to {}", self.start, self.target));
                Outcome::Failure(FailureReason::NoPath)
            }
        };
        Step::Done(RunReport::new(ExecutorKind::Dijkstra, outcome))
    }
}

impl Executor for Dijkstra {
    type Model = Graph;

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Dijkstra
    }

    fn step(&mut self, graph: &mut Graph, trace: &mut Trace) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Select) {
            Phase::Init => self.init(graph, trace),
            Phase::Select => self.select(graph, trace),
            Phase::Settle(id) => self.settle(id, graph, trace),
        }
    }
}
