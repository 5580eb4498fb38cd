use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::engine::config::SimConfig;
use crate::engine::dijkstra::Dijkstra;
use crate::engine::error::{EditError, SimError};
use crate::engine::events::{EventBroadcaster, SimEvent};
use crate::engine::executor::{Executor, ExecutorKind, RunReport, RunRequest, Step};
use crate::engine::graph::{Graph, NodeId, Position};
use crate::engine::grid::{Cell, Grid, DEFAULT_WALL_DENSITY};
use crate::engine::kruskal::Kruskal;
use crate::engine::message::ParticipantId;
use crate::engine::paxos::{Paxos, PaxosCluster};
use crate::engine::pbft::{Pbft, PbftCluster};
use crate::engine::prim::Prim;
use crate::engine::search::GridSearch;
use crate::engine::trace::{Trace, TraceEntry};

fn default_density() -> f64 {
    DEFAULT_WALL_DENSITY
}

/// Edit commands accepted while no executor is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    AddNode { id: NodeId, x: f64, y: f64 },
    RemoveNode { id: NodeId },
    MoveNode { id: NodeId, x: f64, y: f64 },
    AddEdge { a: NodeId, b: NodeId, weight: u64 },
    RemoveEdge { a: NodeId, b: NodeId },
    SetWeight { a: NodeId, b: NodeId, weight: u64 },
    ToggleWall { row: usize, col: usize },
    PaintWall { row: usize, col: usize },
    PlaceStart { row: usize, col: usize },
    PlaceEnd { row: usize, col: usize },
    /// Removes visited/path marks, keeping walls
    ClearSearch,
    RandomizeWalls {
        #[serde(default = "default_density")]
        density: f64,
        /// Fixed seed for reproducible mazes
        #[serde(default)]
        seed: Option<u64>,
    },
    SetPaxosFaulty { id: ParticipantId, faulty: bool },
    SetByzantine { id: ParticipantId, byzantine: bool },
}

/// All mutable models the executors operate on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Models {
    pub graph: Graph,
    pub grid: Grid,
    pub paxos: PaxosCluster,
    pub pbft: PbftCluster,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            graph: Graph::demo(),
            grid: Grid::default(),
            paxos: PaxosCluster::default(),
            pbft: PbftCluster::default(),
        }
    }
}

/// The installed executor, dispatching to the model it owns
#[derive(Debug, Clone)]
enum ActiveRun {
    Dijkstra(Dijkstra),
    Prim(Prim),
    Kruskal(Kruskal),
    Search(GridSearch),
    Paxos(Paxos),
    Pbft(Pbft),
}

impl ActiveRun {
    fn kind(&self) -> ExecutorKind {
        match self {
            ActiveRun::Dijkstra(e) => e.kind(),
            ActiveRun::Prim(e) => e.kind(),
            ActiveRun::Kruskal(e) => e.kind(),
            ActiveRun::Search(e) => e.kind(),
            ActiveRun::Paxos(e) => e.kind(),
            ActiveRun::Pbft(e) => e.kind(),
        }
    }

    fn step(&mut self, models: &mut Models, trace: &mut Trace) -> Step {
        match self {
            ActiveRun::Dijkstra(e) => e.step(&mut models.graph, trace),
            ActiveRun::Prim(e) => e.step(&mut models.graph, trace),
            ActiveRun::Kruskal(e) => e.step(&mut models.graph, trace),
            ActiveRun::Search(e) => e.step(&mut models.grid, trace),
            ActiveRun::Paxos(e) => e.step(&mut models.paxos, trace),
            ActiveRun::Pbft(e) => e.step(&mut models.pbft, trace),
        }
    }
}

/// Read-only view of everything a renderer draws
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub graph: Graph,
    pub grid: Grid,
    pub paxos: PaxosCluster,
    pub pbft: PbftCluster,
    pub trace: Vec<TraceEntry>,
    pub running: bool,
    pub executor: Option<ExecutorKind>,
    pub generation: u64,
    pub delay_ms: u64,
    pub last_report: Option<RunReport>,
}

/// Sequences executor steps and owns the trace, the running flag and cancellation.
///
/// At most one executor is installed at a time. Each `run` or `reset` bumps the
/// generation counter; a driver that finds a different generation after
/// suspending abandons its run.
#[derive(Debug)]
pub struct Simulator {
    models: Models,
    trace: Trace,
    active: Option<ActiveRun>,
    steps: usize,
    generation: u64,
    delay: Duration,
    last_report: Option<RunReport>,
    events: Option<EventBroadcaster>,
}

impl Simulator {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            models: Models::default(),
            trace: Trace::new(),
            active: None,
            steps: 0,
            generation: 0,
            delay: config.step_delay,
            last_report: None,
            events: None,
        }
    }

    /// Attaches an event broadcaster that observes every state change
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn running_kind(&self) -> Option<ExecutorKind> {
        self.active.as_ref().map(ActiveRun::kind)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn models(&self) -> &Models {
        &self.models
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Installs an executor. Returns the generation the driver must hold on to.
    pub fn run(&mut self, request: RunRequest) -> Result<u64, SimError> {
        if let Some(kind) = self.running_kind() {
            self.reject("run", &SimError::Busy(kind));
            return Err(SimError::Busy(kind));
        }

        let active = match self.build(request) {
            Ok(active) => active,
            Err(err) => {
                self.reject("run", &err);
                return Err(err);
            }
        };
        let kind = active.kind();

        self.generation += 1;
        self.steps = 0;
        self.last_report = None;
        self.active = Some(active);
        info!(executor = %kind, generation = self.generation, "▶️ Run started");
        self.emit(SimEvent::run_started(kind, self.generation));
        Ok(self.generation)
    }

    fn build(&self, request: RunRequest) -> Result<ActiveRun, SimError> {
        let graph = &self.models.graph;
        let require_node = |id: &str| {
            if graph.contains(id) {
                Ok(())
            } else {
                Err(SimError::InvalidRun(format!("unknown node {id}")))
            }
        };

        Ok(match request {
            RunRequest::Dijkstra { start, target } => {
                require_node(&start)?;
                require_node(&target)?;
                ActiveRun::Dijkstra(Dijkstra::new(start, target))
            }
            RunRequest::Prim { start } => {
                require_node(&start)?;
                ActiveRun::Prim(Prim::new(start))
            }
            RunRequest::Kruskal => ActiveRun::Kruskal(Kruskal::new()),
            RunRequest::Dfs => ActiveRun::Search(GridSearch::dfs()),
            RunRequest::Bfs => ActiveRun::Search(GridSearch::bfs()),
            RunRequest::Paxos { round, value } => {
                if value.trim().is_empty() {
                    return Err(SimError::InvalidRun("proposal value must not be empty".to_string()));
                }
                if round == Some(u64::MAX) {
                    return Err(SimError::InvalidRun(format!("round must be below {}", u64::MAX)));
                }
                ActiveRun::Paxos(Paxos::new(round, value))
            }
            RunRequest::Pbft { request } => {
                if request.trim().is_empty() {
                    return Err(SimError::InvalidRun("client request must not be empty".to_string()));
                }
                ActiveRun::Pbft(Pbft::new(request))
            }
        })
    }

    /// Pulls one transition out of the installed executor.
    /// Returns `None` when nothing is running.
    pub fn step(&mut self) -> Option<Step> {
        let active = self.active.as_mut()?;
        let kind = active.kind();
        let before = self.trace.len();
        let step = active.step(&mut self.models, &mut self.trace);
        self.steps += 1;
        trace!(executor = %kind, step = self.steps, "step applied");

        let appended = self.trace.since(before).to_vec();
        if !appended.is_empty() {
            self.emit(SimEvent::trace_appended(appended));
        }
        self.emit(SimEvent::step_completed(kind, self.steps));

        if let Step::Done(report) = &step {
            self.active = None;
            self.last_report = Some(report.clone());
            info!(
                executor = %kind,
                steps = self.steps,
                success = report.outcome.is_success(),
                "🏁 Run finished"
            );
            self.emit(SimEvent::run_finished(report.clone()));
        }
        Some(step)
    }

    /// Steps the installed executor until it terminates, ignoring the delay
    pub fn run_to_completion(&mut self) -> Option<RunReport> {
        loop {
            match self.step()? {
                Step::Continue => {}
                Step::Done(report) => return Some(report),
            }
        }
    }

    /// Abandons the running executor. Model mutations it already made stay.
    pub fn cancel(&mut self) -> Option<RunReport> {
        let active = self.active.take()?;
        let kind = active.kind();
        self.generation += 1;
        let report = RunReport::cancelled(kind);
        self.last_report = Some(report.clone());
        warn!(executor = %kind, steps = self.steps, "⏹️ Run cancelled");
        self.emit(SimEvent::run_cancelled(kind));
        Some(report)
    }

    /// Cancels any run, restores every model to its defaults and clears the trace
    pub fn reset(&mut self) {
        self.cancel();
        self.generation += 1;
        self.models = Models::default();
        self.trace.clear();
        self.steps = 0;
        self.last_report = None;
        info!(generation = self.generation, "🔄 Simulator reset");
        self.emit(SimEvent::reset());
    }

    /// Applies an edit; refused with [`SimError::Busy`] while an executor runs
    pub fn edit(&mut self, op: EditOp) -> Result<(), SimError> {
        if let Some(kind) = self.running_kind() {
            self.reject("edit", &SimError::Busy(kind));
            return Err(SimError::Busy(kind));
        }

        if let Err(err) = self.apply(&op) {
            let err = SimError::from(err);
            self.reject("edit", &err);
            return Err(err);
        }
        debug!(?op, "edit applied");
        self.emit(SimEvent::model_edited(format!("{op:?}")));
        Ok(())
    }

    fn apply(&mut self, op: &EditOp) -> Result<(), EditError> {
        let Models {
            graph,
            grid,
            paxos,
            pbft,
        } = &mut self.models;

        match op {
            EditOp::AddNode { id, x, y } => graph.add_node(id, Position::new(*x, *y)),
            EditOp::RemoveNode { id } => graph.remove_node(id),
            EditOp::MoveNode { id, x, y } => graph.move_node(id, Position::new(*x, *y)),
            EditOp::AddEdge { a, b, weight } => graph.add_edge(a, b, *weight),
            EditOp::RemoveEdge { a, b } => graph.remove_edge(a, b),
            EditOp::SetWeight { a, b, weight } => graph.set_weight(a, b, *weight),
            EditOp::ToggleWall { row, col } => grid.toggle_wall(Cell::new(*row, *col)),
            EditOp::PaintWall { row, col } => grid.paint_wall(Cell::new(*row, *col)),
            EditOp::PlaceStart { row, col } => grid.place_start(Cell::new(*row, *col)),
            EditOp::PlaceEnd { row, col } => grid.place_end(Cell::new(*row, *col)),
            EditOp::ClearSearch => {
                grid.clear_search();
                Ok(())
            }
            EditOp::RandomizeWalls { density, seed } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(*seed),
                    None => StdRng::from_entropy(),
                };
                grid.randomize_walls(*density, &mut rng)
            }
            EditOp::SetPaxosFaulty { id, faulty } => paxos.set_faulty(*id, *faulty),
            EditOp::SetByzantine { id, byzantine } => pbft.set_byzantine(*id, *byzantine),
        }
    }

    /// Changes the delay used from the next suspension point on
    pub fn set_speed(&mut self, delay: Duration) {
        self.delay = delay;
        let delay_ms = delay.as_millis() as u64;
        info!(delay_ms, "⏱️ Step delay changed");
        self.emit(SimEvent::speed_changed(delay_ms));
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            graph: self.models.graph.clone(),
            grid: self.models.grid.clone(),
            paxos: self.models.paxos.clone(),
            pbft: self.models.pbft.clone(),
            trace: self.trace.entries().to_vec(),
            running: self.is_running(),
            executor: self.running_kind(),
            generation: self.generation,
            delay_ms: self.delay.as_millis() as u64,
            last_report: self.last_report.clone(),
        }
    }

    fn reject(&self, command: &str, err: &SimError) {
        warn!(command, error = %err, "❌ Command rejected");
        self.emit(SimEvent::command_rejected(command, err.to_string()));
    }

    fn emit(&self, event: SimEvent) {
        if let Some(events) = &self.events {
            // No subscribers is not an error for a simulator
            let _ = events.emit(event);
        }
    }
}

/// Shared handle used by the servers, the console and the step driver
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    inner: Arc<Mutex<Simulator>>,
}

impl SimulatorHandle {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(simulator)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Simulator> {
        self.inner.lock().await
    }

    /// Installs an executor and spawns the driver that steps it.
    /// The driver's result is the final report, or `None` if the run was cancelled.
    pub async fn run(&self, request: RunRequest) -> Result<JoinHandle<Option<RunReport>>, SimError> {
        let generation = self.inner.lock().await.run(request)?;
        let handle = self.clone();
        Ok(tokio::spawn(async move { drive(handle, generation).await }))
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    pub async fn cancel(&self) -> Option<RunReport> {
        self.inner.lock().await.cancel()
    }

    pub async fn edit(&self, op: EditOp) -> Result<(), SimError> {
        self.inner.lock().await.edit(op)
    }

    pub async fn set_speed(&self, delay: Duration) {
        self.inner.lock().await.set_speed(delay);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.snapshot()
    }
}

/// Pulls steps for one run, suspending for the configured delay in between.
/// The lock is only held while a step is applied, so commands interleave
/// with the run at every suspension point.
async fn drive(handle: SimulatorHandle, generation: u64) -> Option<RunReport> {
    debug!(generation, "step driver started");
    loop {
        let delay = {
            let mut sim = handle.inner.lock().await;
            if sim.generation() != generation {
                debug!(generation, "run superseded, driver exiting");
                return None;
            }
            match sim.step()? {
                Step::Continue => sim.delay(),
                Step::Done(report) => return Some(report),
            }
        };

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::SimEventType;
    use crate::engine::executor::{Completion, FailureReason, Outcome};
    use crate::engine::graph::MAX_WEIGHT;
    use crate::engine::grid::CellKind;

    fn simulator() -> Simulator {
        Simulator::new(&SimConfig::default())
    }

    #[test]
    fn test_run_rejected_while_running() {
        let mut sim = simulator();
        sim.run(RunRequest::Kruskal).unwrap();
        assert_eq!(
            sim.run(RunRequest::Bfs),
            Err(SimError::Busy(ExecutorKind::Kruskal))
        );
        assert_eq!(sim.running_kind(), Some(ExecutorKind::Kruskal));
    }

    #[test]
    fn test_edit_rejected_while_running_leaves_snapshot() {
        let mut sim = simulator();
        sim.run(RunRequest::Dijkstra {
            start: "A".to_string(),
            target: "F".to_string(),
        })
        .unwrap();
        sim.step();
        sim.step();
        let before = sim.snapshot();

        let result = sim.edit(EditOp::AddEdge {
            a: "A".to_string(),
            b: "F".to_string(),
            weight: 1,
        });
        assert_eq!(result, Err(SimError::Busy(ExecutorKind::Dijkstra)));
        assert_eq!(sim.snapshot(), before);
    }

    #[test]
    fn test_invalid_edit_is_typed() {
        let mut sim = simulator();
        assert_eq!(
            sim.edit(EditOp::AddEdge {
                a: "A".to_string(),
                b: "B".to_string(),
                weight: 9,
            }),
            Err(SimError::Edit(EditError::DuplicateEdge(
                "A".to_string(),
                "B".to_string()
            )))
        );
        assert_eq!(
            sim.edit(EditOp::SetPaxosFaulty { id: 0, faulty: true }),
            Err(SimError::Edit(EditError::InvalidFaultTarget(0)))
        );
    }

    #[test]
    fn test_unknown_start_node_rejected() {
        let mut sim = simulator();
        let result = sim.run(RunRequest::Prim {
            start: "Q".to_string(),
        });
        assert!(matches!(result, Err(SimError::InvalidRun(_))));
        assert!(!sim.is_running());
        assert_eq!(sim.generation(), 0);
    }

    #[test]
    fn test_heaviest_weights_run_without_overflow() {
        let mut sim = simulator();
        let oversized = sim.edit(EditOp::SetWeight {
            a: "A".to_string(),
            b: "C".to_string(),
            weight: u64::MAX,
        });
        assert_eq!(oversized, Err(SimError::Edit(EditError::InvalidWeight(u64::MAX))));

        for (a, b) in [("A", "B"), ("A", "C"), ("B", "D"), ("D", "F")] {
            sim.edit(EditOp::SetWeight {
                a: a.to_string(),
                b: b.to_string(),
                weight: MAX_WEIGHT,
            })
            .unwrap();
        }
        sim.run(RunRequest::Dijkstra {
            start: "A".to_string(),
            target: "F".to_string(),
        })
        .unwrap();
        let report = sim.run_to_completion().unwrap();
        assert!(report.outcome.is_success());
        assert!(!sim.is_running());

        sim.run(RunRequest::Kruskal).unwrap();
        assert!(sim.run_to_completion().unwrap().outcome.is_success());
    }

    #[test]
    fn test_last_paxos_round_rejected() {
        let mut sim = simulator();
        let result = sim.run(RunRequest::Paxos {
            round: Some(u64::MAX),
            value: "Value-A".to_string(),
        });
        assert!(matches!(result, Err(SimError::InvalidRun(_))));
        assert!(!sim.is_running());

        sim.run(RunRequest::Paxos {
            round: Some(u64::MAX - 1),
            value: "Value-A".to_string(),
        })
        .unwrap();
        assert!(sim.run_to_completion().unwrap().outcome.is_success());
    }

    #[test]
    fn test_trace_accumulates_across_runs() {
        let mut sim = simulator();
        sim.run(RunRequest::Kruskal).unwrap();
        sim.run_to_completion();
        let after_first = sim.trace().len();

        sim.run(RunRequest::Prim {
            start: "A".to_string(),
        })
        .unwrap();
        sim.run_to_completion();
        assert!(sim.trace().len() > after_first);
        assert_eq!(
            sim.trace().entries()[after_first].line,
            "Starting Prim's algorithm from node A"
        );
    }

    #[test]
    fn test_reset_after_partial_run() {
        let mut sim = simulator();
        sim.edit(EditOp::PaintWall { row: 0, col: 0 }).unwrap();
        sim.run(RunRequest::Bfs).unwrap();
        for _ in 0..7 {
            sim.step();
        }
        assert!(sim.models().grid.count(CellKind::Visited) > 0);

        sim.reset();
        assert!(!sim.is_running());
        assert!(sim.trace().is_empty());
        assert_eq!(sim.models(), &Models::default());
        assert!(sim.last_report().is_none());
        assert_eq!(sim.step(), None);
    }

    #[test]
    fn test_cancel_keeps_partial_mutations() {
        let mut sim = simulator();
        sim.run(RunRequest::Bfs).unwrap();
        for _ in 0..5 {
            sim.step();
        }
        let generation = sim.generation();
        let report = sim.cancel().unwrap();

        assert_eq!(report.outcome, Outcome::Cancelled);
        assert!(sim.generation() > generation);
        assert!(sim.models().grid.count(CellKind::Visited) > 0);
        assert_eq!(sim.last_report(), Some(&report));
        assert!(sim.cancel().is_none());
    }

    #[test]
    fn test_consensus_faults_through_edits() {
        let mut sim = simulator();
        sim.edit(EditOp::SetByzantine { id: 3, byzantine: true }).unwrap();
        sim.edit(EditOp::SetByzantine { id: 4, byzantine: true }).unwrap();
        sim.run(RunRequest::Pbft {
            request: "Transaction-X".to_string(),
        })
        .unwrap();
        let report = sim.run_to_completion().unwrap();
        assert_eq!(report.outcome, Outcome::Failure(FailureReason::CommitQuorum));

        sim.edit(EditOp::SetPaxosFaulty { id: 2, faulty: true }).unwrap();
        sim.run(RunRequest::Paxos {
            round: None,
            value: "Value-A".to_string(),
        })
        .unwrap();
        let report = sim.run_to_completion().unwrap();
        assert_eq!(
            report.outcome,
            Outcome::Success(Completion::Consensus {
                value: "Value-A".to_string(),
                votes: 2
            })
        );
    }

    #[test]
    fn test_seeded_randomize_is_reproducible() {
        let mut first = simulator();
        let mut second = simulator();
        let op = EditOp::RandomizeWalls {
            density: 0.3,
            seed: Some(7),
        };
        first.edit(op.clone()).unwrap();
        second.edit(op).unwrap();
        assert_eq!(first.models().grid, second.models().grid);
        assert!(first.models().grid.count(CellKind::Wall) > 0);
    }

    #[test]
    fn test_edit_op_json() {
        let op: EditOp = serde_json::from_str(r#"{"op":"randomize_walls"}"#).unwrap();
        assert_eq!(
            op,
            EditOp::RandomizeWalls {
                density: 0.3,
                seed: None
            }
        );
        let op: EditOp =
            serde_json::from_str(r#"{"op":"add_node","id":"G","x":600.0,"y":40.0}"#).unwrap();
        assert!(matches!(op, EditOp::AddNode { .. }));
    }

    #[test]
    fn test_events_follow_run() {
        let (events, mut receiver) = EventBroadcaster::new(256);
        let mut sim = simulator().with_events(events);
        sim.run(RunRequest::Kruskal).unwrap();
        sim.run_to_completion();

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(event.event_type);
        }
        assert!(matches!(kinds.first(), Some(SimEventType::RunStarted { .. })));
        assert!(matches!(kinds.last(), Some(SimEventType::RunFinished { .. })));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, SimEventType::TraceAppended { .. })));
    }
}
