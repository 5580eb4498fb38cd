use crate::engine::executor::ExecutorKind;
use crate::engine::graph::NodeId;
use crate::engine::grid::Cell;

/// Rejections raised synchronously by the command surface.
/// A rejected command never mutates the model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("an executor is already running ({0})")]
    Busy(ExecutorKind),
    #[error("invalid edit: {0}")]
    Edit(#[from] EditError),
    #[error("invalid run parameters: {0}")]
    InvalidRun(String),
}

/// User input errors for topology, grid and participant edits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("node id must not be empty")]
    EmptyNodeId,
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("edge weight must be between 1 and {max}, got {0}", max = crate::engine::graph::MAX_WEIGHT)]
    InvalidWeight(u64),
    #[error("edge {0}-{1} already exists")]
    DuplicateEdge(NodeId, NodeId),
    #[error("edge {0}-{0} would be a self loop")]
    SelfLoop(NodeId),
    #[error("unknown edge {0}-{1}")]
    UnknownEdge(NodeId, NodeId),
    #[error("cell {0} is outside the grid")]
    OutOfGrid(Cell),
    #[error("cell {0} is occupied")]
    CellOccupied(Cell),
    #[error("unknown participant {0}")]
    UnknownParticipant(usize),
    #[error("participant {0} cannot be marked faulty")]
    InvalidFaultTarget(usize),
    #[error("wall density must be within [0, 1], got {0}")]
    InvalidDensity(f64),
}
