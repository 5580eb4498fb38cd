use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::graph::NodeId;
use crate::engine::grid::Cell;
use crate::engine::trace::Trace;

/// Default value a Paxos proposer proposes
pub const DEFAULT_PROPOSAL_VALUE: &str = "Value-A";
/// Default client request submitted to the PBFT primary
pub const DEFAULT_CLIENT_REQUEST: &str = "Transaction-X";

/// The algorithms the engine can animate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Dijkstra,
    Prim,
    Kruskal,
    Dfs,
    Bfs,
    Paxos,
    Pbft,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorKind::Dijkstra => "Dijkstra",
            ExecutorKind::Prim => "Prim",
            ExecutorKind::Kruskal => "Kruskal",
            ExecutorKind::Dfs => "DFS",
            ExecutorKind::Bfs => "BFS",
            ExecutorKind::Paxos => "Paxos",
            ExecutorKind::Pbft => "PBFT",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dijkstra" => Ok(ExecutorKind::Dijkstra),
            "prim" => Ok(ExecutorKind::Prim),
            "kruskal" => Ok(ExecutorKind::Kruskal),
            "dfs" => Ok(ExecutorKind::Dfs),
            "bfs" => Ok(ExecutorKind::Bfs),
            "paxos" => Ok(ExecutorKind::Paxos),
            "pbft" => Ok(ExecutorKind::Pbft),
            other => Err(format!("unknown executor '{other}'")),
        }
    }
}

fn default_proposal_value() -> String {
    DEFAULT_PROPOSAL_VALUE.to_string()
}

fn default_client_request() -> String {
    DEFAULT_CLIENT_REQUEST.to_string()
}

/// Parameters for starting a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "snake_case")]
pub enum RunRequest {
    Dijkstra {
        start: NodeId,
        target: NodeId,
    },
    Prim {
        start: NodeId,
    },
    Kruskal,
    Dfs,
    Bfs,
    Paxos {
        /// Proposal number; `None` picks one above every promise seen so far
        #[serde(default)]
        round: Option<u64>,
        #[serde(default = "default_proposal_value")]
        value: String,
    },
    Pbft {
        #[serde(default = "default_client_request")]
        request: String,
    },
}

impl RunRequest {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            RunRequest::Dijkstra { .. } => ExecutorKind::Dijkstra,
            RunRequest::Prim { .. } => ExecutorKind::Prim,
            RunRequest::Kruskal => ExecutorKind::Kruskal,
            RunRequest::Dfs => ExecutorKind::Dfs,
            RunRequest::Bfs => ExecutorKind::Bfs,
            RunRequest::Paxos { .. } => ExecutorKind::Paxos,
            RunRequest::Pbft { .. } => ExecutorKind::Pbft,
        }
    }
}

/// Why a run ended without reaching its goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnknownStart,
    NoPath,
    Disconnected,
    NoMajorityPromise,
    NoMajorityAccept,
    PrepareQuorum,
    CommitQuorum,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FailureReason::UnknownStart => "start node does not exist",
            FailureReason::NoPath => "no path found",
            FailureReason::Disconnected => "graph is disconnected",
            FailureReason::NoMajorityPromise => "no majority promise",
            FailureReason::NoMajorityAccept => "no majority accept",
            FailureReason::PrepareQuorum => "failed to reach prepare quorum",
            FailureReason::CommitQuorum => "failed to reach commit quorum",
        };
        write!(f, "{reason}")
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completion {
    ShortestPath { path: Vec<NodeId>, distance: u64 },
    SpanningTree { total_weight: u64, edges: usize },
    MazePath { path: Vec<Cell>, explored: usize },
    Consensus { value: String, votes: usize },
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Success(Completion),
    Failure(FailureReason),
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Outcome::Failure(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Whether designated faulty participants were tolerated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultTolerance {
    pub faulty: Vec<usize>,
    pub tolerated: bool,
}

/// Summary handed back to the caller when a run ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub executor: ExecutorKind,
    pub outcome: Outcome,
    /// Present for consensus runs with at least one designated fault
    pub faults: Option<FaultTolerance>,
}

impl RunReport {
    pub fn new(executor: ExecutorKind, outcome: Outcome) -> Self {
        Self {
            executor,
            outcome,
            faults: None,
        }
    }

    /// Attaches the fault verdict: faults are tolerated exactly when the run succeeded
    pub fn with_faults(mut self, faulty: Vec<usize>) -> Self {
        if !faulty.is_empty() {
            let tolerated = self.outcome.is_success();
            self.faults = Some(FaultTolerance { faulty, tolerated });
        }
        self
    }

    pub fn cancelled(executor: ExecutorKind) -> Self {
        Self::new(executor, Outcome::Cancelled)
    }
}

/// Result of pulling one transition out of an executor
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The executor did a unit of work and wants to be resumed after the delay
    Continue,
    /// The run reached its terminal state
    Done(RunReport),
}

/// A resumable algorithm: each call to [`Executor::step`] performs one discrete
/// unit of work against the model and appends its trace lines
pub trait Executor {
    type Model;

    fn kind(&self) -> ExecutorKind;

    fn step(&mut self, model: &mut Self::Model, trace: &mut Trace) -> Step;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("PBFT".parse::<ExecutorKind>(), Ok(ExecutorKind::Pbft));
        assert_eq!("bfs".parse::<ExecutorKind>(), Ok(ExecutorKind::Bfs));
        assert!("raft".parse::<ExecutorKind>().is_err());
    }

    #[test]
    fn test_run_request_json_defaults() {
        let request: RunRequest = serde_json::from_str(r#"{"executor":"paxos"}"#).unwrap();
        assert_eq!(
            request,
            RunRequest::Paxos {
                round: None,
                value: "Value-A".to_string()
            }
        );

        let request: RunRequest =
            serde_json::from_str(r#"{"executor":"dijkstra","start":"A","target":"F"}"#).unwrap();
        assert_eq!(request.kind(), ExecutorKind::Dijkstra);
    }

    #[test]
    fn test_fault_verdict_follows_outcome() {
        let report = RunReport::new(ExecutorKind::Pbft, Outcome::Failure(FailureReason::CommitQuorum))
            .with_faults(vec![3, 4]);
        assert_eq!(
            report.faults,
            Some(FaultTolerance {
                faulty: vec![3, 4],
                tolerated: false
            })
        );

        let report = RunReport::new(
            ExecutorKind::Paxos,
            Outcome::Success(Completion::Consensus {
                value: "v".to_string(),
                votes: 2,
            }),
        )
        .with_faults(Vec::new());
        assert!(report.faults.is_none());
    }
}
