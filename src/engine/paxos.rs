use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::engine::error::EditError;
use crate::engine::executor::{Completion, Executor, ExecutorKind, FailureReason, Outcome, RunReport, Step};
use crate::engine::message::{Message, ParticipantId, PriorAccept, Recipient};
use crate::engine::trace::Trace;

/// Role a Paxos server plays for the whole simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Proposer,
    Acceptor,
    Learner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Proposer => write!(f, "Proposer"),
            Role::Acceptor => write!(f, "Acceptor"),
            Role::Learner => write!(f, "Learner"),
        }
    }
}

/// Phase the cluster is currently animating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaxosPhase {
    Idle,
    Prepare,
    Accept,
    Learn,
}

/// A Paxos participant. Every field is meaningful for every role so the
/// renderer can draw all servers the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: ParticipantId,
    pub role: Role,
    /// Highest round this acceptor promised not to undercut
    pub promised_round: Option<u64>,
    /// Round of the last proposal this acceptor accepted
    pub accepted_round: Option<u64>,
    /// Value accepted (acceptors) or learned (learners)
    pub accepted_value: Option<String>,
    pub learned: bool,
    /// Non-responsive acceptor: drops every message addressed to it
    pub faulty: bool,
}

impl Server {
    pub fn new(id: ParticipantId, role: Role) -> Self {
        Self {
            id,
            role,
            promised_round: None,
            accepted_round: None,
            accepted_value: None,
            learned: false,
            faulty: false,
        }
    }

    fn prior(&self) -> Option<PriorAccept> {
        match (self.accepted_round, &self.accepted_value) {
            (Some(round), Some(value)) => Some(PriorAccept {
                round,
                value: value.clone(),
            }),
            _ => None,
        }
    }
}

/// Single-proposer Paxos cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaxosCluster {
    pub servers: Vec<Server>,
    pub phase: PaxosPhase,
    /// Messages in flight during the current step
    pub messages: Vec<Message>,
}

impl Default for PaxosCluster {
    /// Server 0 proposes, servers 1-3 accept, servers 4-5 learn
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl PaxosCluster {
    pub fn new(acceptors: usize, learners: usize) -> Self {
        let mut servers = vec![Server::new(0, Role::Proposer)];
        servers.extend((1..=acceptors).map(|id| Server::new(id, Role::Acceptor)));
        servers.extend((acceptors + 1..=acceptors + learners).map(|id| Server::new(id, Role::Learner)));
        Self {
            servers,
            phase: PaxosPhase::Idle,
            messages: Vec::new(),
        }
    }

    pub fn server(&self, id: ParticipantId) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn proposer_id(&self) -> ParticipantId {
        self.servers
            .iter()
            .find(|s| s.role == Role::Proposer)
            .map(|s| s.id)
            .unwrap_or(0)
    }

    pub fn ids_with_role(&self, role: Role) -> Vec<ParticipantId> {
        self.servers
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.id)
            .collect()
    }

    /// Number of acceptor replies needed to advance a phase: ceil(acceptors / 2)
    pub fn majority(&self) -> usize {
        self.ids_with_role(Role::Acceptor).len().div_ceil(2)
    }

    /// Highest round any acceptor has promised
    pub fn highest_promise(&self) -> Option<u64> {
        self.servers.iter().filter_map(|s| s.promised_round).max()
    }

    pub fn faulty_ids(&self) -> Vec<ParticipantId> {
        self.servers.iter().filter(|s| s.faulty).map(|s| s.id).collect()
    }

    /// Marks an acceptor as non-responsive (or restores it)
    pub fn set_faulty(&mut self, id: ParticipantId, faulty: bool) -> Result<(), EditError> {
        let server = self
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(EditError::UnknownParticipant(id))?;
        if server.role != Role::Acceptor {
            return Err(EditError::InvalidFaultTarget(id));
        }
        server.faulty = faulty;
        Ok(())
    }

    fn server_mut(&mut self, id: ParticipantId) -> Option<&mut Server> {
        self.servers.iter_mut().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    BroadcastPrepare,
    CollectPromises,
    CheckPromises,
    BroadcastAccept,
    CollectAccepted,
    CheckAccepted,
    Announce,
}

/// One proposal attempt by server 0
#[derive(Debug, Clone)]
pub struct Paxos {
    requested_round: Option<u64>,
    round: u64,
    value: String,
    phase: Phase,
    promises: Vec<Message>,
    accepted: Vec<ParticipantId>,
}

impl Paxos {
    /// `round: None` proposes one above the highest promise seen so far
    pub fn new(round: Option<u64>, value: impl Into<String>) -> Self {
        Self {
            requested_round: round,
            round: 0,
            value: value.into(),
            phase: Phase::BroadcastPrepare,
            promises: Vec::new(),
            accepted: Vec::new(),
        }
    }

    fn broadcast_prepare(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        self.round = self
            .requested_round
            .unwrap_or_else(|| cluster.highest_promise().map_or(1, |n| n.saturating_add(1)));
        self.promises.clear();
        self.accepted.clear();

        for id in cluster.faulty_ids() {
            trace.warn(format!("⚠️ Acceptor {id} is faulty (non-responsive)"));
        }

        let proposer = cluster.proposer_id();
        cluster.phase = PaxosPhase::Prepare;
        cluster.messages = cluster
            .ids_with_role(Role::Acceptor)
            .into_iter()
            .map(|to| Message::Prepare {
                from: proposer,
                to: Recipient::Participant(to),
                round: self.round,
            })
            .collect();
        info!(round = self.round, value = %self.value, "paxos prepare broadcast");
        trace.info(format!(
            "Phase 1a: Proposer sends PREPARE(n={}) to acceptors",
            self.round
        ));
        self.phase = Phase::CollectPromises;
        Step::Continue
    }

    fn collect_promises(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        let proposer = cluster.proposer_id();
        let round = self.round;

        for id in cluster.ids_with_role(Role::Acceptor) {
            let Some(acceptor) = cluster.server_mut(id) else {
                continue;
            };
            if acceptor.faulty {
                trace.detail(format!("Phase 1b: Acceptor {id} does not respond"));
                continue;
            }
            match acceptor.promised_round {
                Some(promised) if round <= promised => {
                    trace.info(format!(
                        "Phase 1b: Acceptor {id} rejects (already promised n={promised})"
                    ));
                }
                _ => {
                    acceptor.promised_round = Some(round);
                    let prior = acceptor.prior();
                    let note = prior
                        .as_ref()
                        .map(|p| format!(" (previously accepted: {})", p.value))
                        .unwrap_or_default();
                    trace.info(format!(
                        "Phase 1b: Acceptor {id} promises to accept n={round}{note}"
                    ));
                    self.promises.push(Message::Promise {
                        from: id,
                        to: Recipient::Participant(proposer),
                        round,
                        prior,
                    });
                }
            }
        }

        cluster.messages = self.promises.clone();
        self.phase = Phase::CheckPromises;
        Step::Continue
    }

    fn check_promises(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        let acceptors = cluster.ids_with_role(Role::Acceptor).len();
        cluster.messages.clear();

        if self.promises.len() < cluster.majority() {
            trace.failure("❌ Failed to get majority promises");
            return self.fail(cluster, trace, FailureReason::NoMajorityPromise);
        }
        trace.success(format!(
            "✓ Received majority promises ({}/{acceptors})",
            self.promises.len()
        ));

        // Adopt the value of the promise carrying the highest prior round
        let mut highest: Option<&PriorAccept> = None;
        for message in &self.promises {
            if let Message::Promise {
                prior: Some(prior), ..
            } = message
            {
                if highest.map_or(true, |h| prior.round > h.round) {
                    highest = Some(prior);
                }
            }
        }
        if let Some(prior) = highest {
            debug!(prior_round = prior.round, value = %prior.value, "adopting previously accepted value");
            self.value = prior.value.clone();
            trace.info(format!("Using previously accepted value: {}", self.value));
        }

        cluster.phase = PaxosPhase::Accept;
        self.phase = Phase::BroadcastAccept;
        Step::Continue
    }

    fn broadcast_accept(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        let proposer = cluster.proposer_id();
        trace.info(format!(
            "Phase 2a: Proposer sends ACCEPT(n={}, value={})",
            self.round, self.value
        ));
        cluster.messages = cluster
            .ids_with_role(Role::Acceptor)
            .into_iter()
            .map(|to| Message::Accept {
                from: proposer,
                to: Recipient::Participant(to),
                round: self.round,
                value: self.value.clone(),
            })
            .collect();
        self.phase = Phase::CollectAccepted;
        Step::Continue
    }

    fn collect_accepted(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        let proposer = cluster.proposer_id();
        let round = self.round;
        let mut replies = Vec::new();

        for id in cluster.ids_with_role(Role::Acceptor) {
            let Some(acceptor) = cluster.server_mut(id) else {
                continue;
            };
            if acceptor.faulty {
                trace.detail(format!("Phase 2b: Acceptor {id} does not respond"));
                continue;
            }
            match acceptor.promised_round {
                Some(promised) if round >= promised => {
                    acceptor.accepted_round = Some(round);
                    acceptor.accepted_value = Some(self.value.clone());
                    self.accepted.push(id);
                    trace.info(format!(
                        "Phase 2b: Acceptor {id} accepted (n={round}, value={})",
                        self.value
                    ));
                    replies.push(Message::Accepted {
                        from: id,
                        to: Recipient::Participant(proposer),
                        round,
                        value: self.value.clone(),
                    });
                }
                Some(promised) => {
                    trace.info(format!(
                        "Phase 2b: Acceptor {id} ignores ACCEPT (promised n={promised})"
                    ));
                }
                None => {
                    trace.info(format!("Phase 2b: Acceptor {id} ignores ACCEPT (no promise)"));
                }
            }
        }

        cluster.messages = replies;
        self.phase = Phase::CheckAccepted;
        Step::Continue
    }

    fn check_accepted(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        let acceptors = cluster.ids_with_role(Role::Acceptor).len();
        cluster.messages.clear();

        if self.accepted.len() < cluster.majority() {
            trace.failure("❌ Failed to get majority acceptance");
            return self.fail(cluster, trace, FailureReason::NoMajorityAccept);
        }
        trace.success(format!(
            "✓ Majority accepted ({}/{acceptors})",
            self.accepted.len()
        ));

        // Learners hear about the value from the first acceptor that accepted it
        let informant = self
            .accepted
            .first()
            .copied()
            .unwrap_or_else(|| cluster.proposer_id());
        cluster.phase = PaxosPhase::Learn;
        let learners = cluster.ids_with_role(Role::Learner);
        cluster.messages = learners
            .iter()
            .map(|&to| Message::Accepted {
                from: informant,
                to: Recipient::Participant(to),
                round: self.round,
                value: self.value.clone(),
            })
            .collect();
        for id in learners {
            if let Some(learner) = cluster.server_mut(id) {
                learner.learned = true;
                learner.accepted_value = Some(self.value.clone());
            }
        }
        trace.info(format!("Learners receive consensus value: {}", self.value));

        self.phase = Phase::Announce;
        Step::Continue
    }

    fn announce(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        cluster.messages.clear();
        cluster.phase = PaxosPhase::Idle;
        trace.success(format!("🎉 Consensus achieved: {}", self.value));

        let faulty = cluster.faulty_ids();
        if !faulty.is_empty() {
            trace.success(format!(
                "✓ Faulty acceptor(s) {} tolerated",
                join_ids(&faulty)
            ));
        }
        info!(round = self.round, value = %self.value, "paxos consensus reached");
        Step::Done(
            RunReport::new(
                ExecutorKind::Paxos,
                Outcome::Success(Completion::Consensus {
                    value: self.value.clone(),
                    votes: self.accepted.len(),
                }),
            )
            .with_faults(faulty),
        )
    }

    fn fail(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace, reason: FailureReason) -> Step {
        cluster.phase = PaxosPhase::Idle;
        cluster.messages.clear();
        let faulty = cluster.faulty_ids();
        if !faulty.is_empty() {
            trace.failure(format!(
                "✗ Faulty acceptor(s) {} not tolerated",
                join_ids(&faulty)
            ));
        }
        info!(round = self.round, %reason, "paxos run failed");
        Step::Done(RunReport::new(ExecutorKind::Paxos, Outcome::Failure(reason)).with_faults(faulty))
    }
}

impl Executor for Paxos {
    type Model = PaxosCluster;

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Paxos
    }

    fn step(&mut self, cluster: &mut PaxosCluster, trace: &mut Trace) -> Step {
        match self.phase {
            Phase::BroadcastPrepare => self.broadcast_prepare(cluster, trace),
            Phase::CollectPromises => self.collect_promises(cluster, trace),
            Phase::CheckPromises => self.check_promises(cluster, trace),
            Phase::BroadcastAccept => self.broadcast_accept(cluster, trace),
            Phase::CollectAccepted => self.collect_accepted(cluster, trace),
            Phase::CheckAccepted => self.check_accepted(cluster, trace),
            Phase::Announce => self.announce(cluster, trace),
        }
    }
}

pub(crate) fn join_ids(ids: &[ParticipantId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
