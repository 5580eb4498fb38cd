use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

use crate::engine::executor::{Completion, Executor, ExecutorKind, FailureReason, Outcome, RunReport, Step};
use crate::engine::grid::{Cell, CellKind, Grid};
use crate::engine::trace::Trace;

/// Frontier discipline of a grid search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Stack: the most recently pushed neighbour is explored first
    DepthFirst,
    /// FIFO queue: finds a minimum-length path
    BreadthFirst,
}

/// A frontier cell together with the cells walked to reach it
#[derive(Debug, Clone)]
struct Entry {
    cell: Cell,
    path: Vec<Cell>,
}

#[derive(Debug, Clone)]
enum Phase {
    Init,
    Pop,
    Expand(Entry),
}

/// Start-to-end search over the 4-connected open cells of a [`Grid`]
#[derive(Debug, Clone)]
pub struct GridSearch {
    strategy: Strategy,
    phase: Phase,
    frontier: VecDeque<Entry>,
    visited: HashSet<Cell>,
    explored: usize,
}

impl GridSearch {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            phase: Phase::Init,
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            explored: 0,
        }
    }

    pub fn dfs() -> Self {
        Self::new(Strategy::DepthFirst)
    }

    pub fn bfs() -> Self {
        Self::new(Strategy::BreadthFirst)
    }

    fn init(&mut self, grid: &mut Grid, trace: &mut Trace) -> Step {
        grid.clear_search();
        let start = grid.start();
        self.frontier.clear();
        self.visited.clear();
        self.explored = 0;
        self.frontier.push_back(Entry {
            cell: start,
            path: Vec::new(),
        });
        self.visited.insert(start);
        trace.info(format!("Starting {} from {start}", self.kind()));
        self.phase = Phase::Pop;
        Step::Continue
    }

    fn pop(&mut self, grid: &mut Grid, trace: &mut Trace) -> Step {
        let next = match self.strategy {
            Strategy::DepthFirst => self.frontier.pop_back(),
            Strategy::BreadthFirst => self.frontier.pop_front(),
        };
        let Some(entry) = next else {
            trace.failure(format!("No path found. Nodes explored: {}", self.explored));
            return Step::Done(RunReport::new(
                self.kind(),
                Outcome::Failure(FailureReason::NoPath),
            ));
        };

        self.explored += 1;
        trace!(cell = %entry.cell, explored = self.explored, "exploring cell");
        if grid.kind(entry.cell) == CellKind::Empty {
            grid.set(entry.cell, CellKind::Current);
        }
        self.phase = Phase::Expand(entry);
        Step::Continue
    }

    fn expand(&mut self, entry: Entry, grid: &mut Grid, trace: &mut Trace) -> Step {
        if grid.kind(entry.cell) == CellKind::Current {
            grid.set(entry.cell, CellKind::Visited);
        }

        if entry.cell == grid.end() {
            for &cell in &entry.path {
                if grid.kind(cell) == CellKind::Visited {
                    grid.set(cell, CellKind::Path);
                }
            }
            let mut path = entry.path;
            path.push(entry.cell);
            debug!(explored = self.explored, length = path.len(), "reached end cell");
            trace.success(format!(
                "Found path! Nodes explored: {}, Path length: {}",
                self.explored,
                path.len()
            ));
            return Step::Done(RunReport::new(
                self.kind(),
                Outcome::Success(Completion::MazePath {
                    path,
                    explored: self.explored,
                }),
            ));
        }

        let mut neighbors = grid.open_neighbors(entry.cell);
        if self.strategy == Strategy::DepthFirst {
            // pushed in reverse so the first direction is popped first
            neighbors.reverse();
        }
        for next in neighbors {
            if self.visited.insert(next) {
                let mut path = entry.path.clone();
                path.push(entry.cell);
                self.frontier.push_back(Entry { cell: next, path });
            }
        }

        self.phase = Phase::Pop;
        Step::Continue
    }
}

impl Executor for GridSearch {
    type Model = Grid;

    fn kind(&self) -> ExecutorKind {
        match self.strategy {
            Strategy::DepthFirst => ExecutorKind::Dfs,
            Strategy::BreadthFirst => ExecutorKind::Bfs,
        }
    }

    fn step(&mut self, grid: &mut Grid, trace: &mut Trace) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Pop) {
            Phase::Init => self.init(grid, trace),
            Phase::Pop => self.pop(grid, trace),
            Phase::Expand(entry) => self.expand(entry, grid, trace),
        }
    }
}
