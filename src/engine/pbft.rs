use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::error::EditError;
use crate::engine::executor::{Completion, Executor, ExecutorKind, FailureReason, Outcome, RunReport, Step};
use crate::engine::message::{Message, ParticipantId, Recipient};
use crate::engine::paxos::join_ids;
use crate::engine::trace::Trace;

/// Default number of replicas, tolerating one Byzantine fault
pub const DEFAULT_REPLICAS: usize = 5;

/// How far a replica got in the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaPhase {
    Idle,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

/// A PBFT replica as drawn on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ParticipantId,
    pub is_primary: bool,
    /// Byzantine replicas stay silent and never adopt the request
    pub is_byzantine: bool,
    pub phase: ReplicaPhase,
    /// PREPARE votes received, plus the replica's own
    pub prepare_count: usize,
    /// COMMIT votes received, plus the replica's own
    pub commit_count: usize,
    pub value: Option<String>,
    pub replied: bool,
}

impl Replica {
    pub fn new(id: ParticipantId, is_primary: bool) -> Self {
        Self {
            id,
            is_primary,
            is_byzantine: false,
            phase: ReplicaPhase::Idle,
            prepare_count: 0,
            commit_count: 0,
            value: None,
            replied: false,
        }
    }

    fn is_honest(&self) -> bool {
        !self.is_byzantine
    }

    fn clear_round(&mut self) {
        self.phase = ReplicaPhase::Idle;
        self.prepare_count = 0;
        self.commit_count = 0;
        self.value = None;
        self.replied = false;
    }
}

/// Replica group in a fixed view with replica 0 as primary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PbftCluster {
    pub replicas: Vec<Replica>,
    pub view: u64,
    pub seq: u64,
    /// Messages in flight during the current step
    pub messages: Vec<Message>,
}

impl Default for PbftCluster {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}

impl PbftCluster {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: (0..replicas).map(|id| Replica::new(id, id == 0)).collect(),
            view: 0,
            seq: 1,
            messages: Vec::new(),
        }
    }

    pub fn replica(&self, id: ParticipantId) -> Option<&Replica> {
        self.replicas.get(id)
    }

    /// Maximum Byzantine replicas the group tolerates: floor((n - 1) / 3)
    pub fn max_faults(&self) -> usize {
        self.replicas.len().saturating_sub(1) / 3
    }

    /// Votes needed to be prepared: 2f + 1
    pub fn quorum(&self) -> usize {
        2 * self.max_faults() + 1
    }

    pub fn primary_id(&self) -> ParticipantId {
        self.replicas
            .iter()
            .find(|r| r.is_primary)
            .map(|r| r.id)
            .unwrap_or(0)
    }

    pub fn byzantine_ids(&self) -> Vec<ParticipantId> {
        self.replicas
            .iter()
            .filter(|r| r.is_byzantine)
            .map(|r| r.id)
            .collect()
    }

    pub fn set_byzantine(&mut self, id: ParticipantId, byzantine: bool) -> Result<(), EditError> {
        let replica = self
            .replicas
            .get_mut(id)
            .ok_or(EditError::UnknownParticipant(id))?;
        replica.is_byzantine = byzantine;
        Ok(())
    }

    fn clear_round(&mut self) {
        self.replicas.iter_mut().for_each(Replica::clear_round);
        self.messages.clear();
    }

    fn votes_for(&self, id: ParticipantId) -> usize {
        self.messages.iter().filter(|m| m.is_for(id)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Request,
    PrePrepare,
    Prepare,
    CountPrepares,
    Commit,
    CountCommits,
    Reply,
    Announce,
}

/// One client request driven through the three-phase protocol
#[derive(Debug, Clone)]
pub struct Pbft {
    request: String,
    phase: Phase,
    replies: usize,
}

impl Pbft {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            phase: Phase::Request,
            replies: 0,
        }
    }

    fn request(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        cluster.clear_round();
        self.replies = 0;

        for id in cluster.byzantine_ids() {
            warn!(replica = id, "replica designated byzantine");
            trace.warn(format!("⚠️ Node {id} is Byzantine (faulty)"));
        }
        trace.info(format!(
            "Starting PBFT with {} replicas (f={}, quorum={})",
            cluster.replicas.len(),
            cluster.max_faults(),
            cluster.quorum()
        ));
        trace.info(format!("Client sends request: {}", self.request));
        info!(request = %self.request, replicas = cluster.replicas.len(), "pbft request submitted");

        self.phase = Phase::PrePrepare;
        Step::Continue
    }

    fn pre_prepare(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        let primary = cluster.primary_id();
        let (view, seq) = (cluster.view, cluster.seq);
        if let Some(replica) = cluster.replicas.get_mut(primary) {
            replica.phase = ReplicaPhase::PrePrepare;
            replica.value = Some(self.request.clone());
        }
        cluster.messages = cluster
            .replicas
            .iter()
            .filter(|r| r.id != primary)
            .map(|r| Message::PrePrepare {
                from: primary,
                to: Recipient::Participant(r.id),
                view,
                seq,
                value: self.request.clone(),
            })
            .collect();
        trace.info(format!("Pre-Prepare: Primary ({primary}) broadcasts request"));

        self.phase = Phase::Prepare;
        Step::Continue
    }

    fn prepare(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        let (view, seq) = (cluster.view, cluster.seq);

        // Honest backups adopt the pre-prepared request
        for replica in cluster.replicas.iter_mut().filter(|r| !r.is_primary && r.is_honest()) {
            replica.value = Some(self.request.clone());
            replica.phase = ReplicaPhase::Prepare;
        }

        let senders: Vec<ParticipantId> = cluster
            .replicas
            .iter()
            .filter(|r| !r.is_primary && r.is_honest())
            .map(|r| r.id)
            .collect();
        let ids: Vec<ParticipantId> = cluster.replicas.iter().map(|r| r.id).collect();
        let mut messages = Vec::new();
        for &from in &senders {
            for &to in ids.iter().filter(|&&to| to != from) {
                messages.push(Message::PrepareVote {
                    from,
                    to: Recipient::Participant(to),
                    view,
                    seq,
                    value: self.request.clone(),
                });
            }
        }
        cluster.messages = messages;
        trace.info("Prepare: Replicas broadcast PREPARE messages");

        self.phase = Phase::CountPrepares;
        Step::Continue
    }

    fn count_prepares(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        let counts: Vec<(ParticipantId, usize)> = cluster
            .replicas
            .iter()
            .filter(|r| r.is_honest())
            .map(|r| (r.id, cluster.votes_for(r.id)))
            .collect();
        for (id, received) in counts {
            // Own vote included
            let count = received + 1;
            if let Some(replica) = cluster.replicas.get_mut(id) {
                replica.prepare_count = count;
            }
            trace.detail(format!("Replica {id} received {count} PREPARE messages"));
        }
        cluster.messages.clear();

        self.phase = Phase::Commit;
        Step::Continue
    }

    fn commit(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        let quorum = cluster.quorum();
        let prepared: Vec<ParticipantId> = cluster
            .replicas
            .iter()
            .filter(|r| r.is_honest() && r.prepare_count >= quorum)
            .map(|r| r.id)
            .collect();
        debug!(prepared = prepared.len(), quorum, "prepare phase tallied");

        if prepared.is_empty() {
            trace.failure("❌ Failed to reach prepare quorum");
            return self.fail(cluster, trace, FailureReason::PrepareQuorum);
        }
        trace.success(format!(
            "✓ {} replicas reached prepare quorum ({quorum} needed)",
            prepared.len()
        ));
        trace.info("Commit: Prepared replicas broadcast COMMIT messages");

        let (view, seq) = (cluster.view, cluster.seq);
        let ids: Vec<ParticipantId> = cluster.replicas.iter().map(|r| r.id).collect();
        for &id in &prepared {
            if let Some(replica) = cluster.replicas.get_mut(id) {
                replica.phase = ReplicaPhase::Commit;
            }
        }
        let mut messages = Vec::new();
        for &from in &prepared {
            for &to in ids.iter().filter(|&&to| to != from) {
                messages.push(Message::Commit {
                    from,
                    to: Recipient::Participant(to),
                    view,
                    seq,
                });
            }
        }
        cluster.messages = messages;

        self.phase = Phase::CountCommits;
        Step::Continue
    }

    fn count_commits(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        let counts: Vec<(ParticipantId, usize)> = cluster
            .replicas
            .iter()
            .filter(|r| r.is_honest())
            .map(|r| (r.id, cluster.votes_for(r.id)))
            .collect();
        for (id, received) in counts {
            let count = received + 1;
            if let Some(replica) = cluster.replicas.get_mut(id) {
                replica.commit_count = count;
            }
            trace.detail(format!("Replica {id} received {count} COMMIT messages"));
        }
        cluster.messages.clear();

        self.phase = Phase::Reply;
        Step::Continue
    }

    fn reply(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        // Committing takes one vote more than preparing
        let needed = cluster.quorum() + 1;
        let committed: Vec<ParticipantId> = cluster
            .replicas
            .iter()
            .filter(|r| r.is_honest() && r.commit_count >= needed)
            .map(|r| r.id)
            .collect();
        debug!(committed = committed.len(), needed, "commit phase tallied");

        if committed.is_empty() {
            trace.failure("❌ Failed to reach commit quorum");
            return self.fail(cluster, trace, FailureReason::CommitQuorum);
        }
        trace.success(format!(
            "✓ {} replicas reached commit quorum",
            committed.len()
        ));
        trace.info("Reply: Replicas send REPLY to client");

        let (view, seq) = (cluster.view, cluster.seq);
        for &id in &committed {
            if let Some(replica) = cluster.replicas.get_mut(id) {
                replica.phase = ReplicaPhase::Reply;
                replica.replied = true;
            }
        }
        cluster.messages = committed
            .iter()
            .map(|&from| Message::Reply {
                from,
                to: Recipient::Client,
                view,
                seq,
                value: self.request.clone(),
            })
            .collect();
        self.replies = committed.len();

        self.phase = Phase::Announce;
        Step::Continue
    }

    fn announce(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        cluster.messages.clear();
        trace.success(format!(
            "🎉 Consensus achieved! Client received {} matching replies",
            self.replies
        ));
        trace.info(format!("Request \"{}\" committed successfully", self.request));

        let byzantine = cluster.byzantine_ids();
        if !byzantine.is_empty() {
            trace.success(format!(
                "✓ Byzantine node {} was tolerated (f={} failures max)",
                join_ids(&byzantine),
                cluster.max_faults()
            ));
        }
        info!(request = %self.request, replies = self.replies, "pbft request committed");
        Step::Done(
            RunReport::new(
                ExecutorKind::Pbft,
                Outcome::Success(Completion::Consensus {
                    value: self.request.clone(),
                    votes: self.replies,
                }),
            )
            .with_faults(byzantine),
        )
    }

    fn fail(&mut self, cluster: &mut PbftCluster, trace: &mut Trace, reason: FailureReason) -> Step {
        cluster.messages.clear();
        let byzantine = cluster.byzantine_ids();
        if !byzantine.is_empty() {
            trace.failure(format!(
                "✗ Byzantine node {} not tolerated (f={} failures max)",
                join_ids(&byzantine),
                cluster.max_faults()
            ));
        }
        info!(request = %self.request, %reason, "pbft request failed");
        Step::Done(RunReport::new(ExecutorKind::Pbft, Outcome::Failure(reason)).with_faults(byzantine))
    }
}

impl Executor for Pbft {
    type Model = PbftCluster;

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Pbft
    }

    fn step(&mut self, cluster: &mut PbftCluster, trace: &mut Trace) -> Step {
        match self.phase {
            Phase::Request => self.request(cluster, trace),
            Phase::PrePrepare => self.pre_prepare(cluster, trace),
            Phase::Prepare => self.prepare(cluster, trace),
            Phase::CountPrepares => self.count_prepares(cluster, trace),
            Phase::Commit => self.commit(cluster, trace),
            Phase::CountCommits => self.count_commits(cluster, trace),
            Phase::Reply => self.reply(cluster, trace),
            Phase::Announce => self.announce(cluster, trace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cluster: &mut PbftCluster, request: &str) -> (RunReport, Trace) {
        let mut pbft = Pbft::new(request);
        let mut trace = Trace::new();
        for _ in 0..100 {
            if let Step::Done(report) = pbft.step(cluster, &mut trace) {
                return (report, trace);
            }
        }
        panic!("PBFT did not terminate");
    }

    fn has_line(trace: &Trace, line: &str) -> bool {
        trace.entries().iter().any(|e| e.line == line)
    }

    #[test]
    fn test_quorum_sizes() {
        assert_eq!(PbftCluster::new(4).max_faults(), 1);
        assert_eq!(PbftCluster::new(5).quorum(), 3);
        assert_eq!(PbftCluster::new(7).max_faults(), 2);
        assert_eq!(PbftCluster::new(7).quorum(), 5);
    }

    #[test]
    fn test_all_honest_commits() {
        let mut cluster = PbftCluster::default();
        let (report, trace) = run(&mut cluster, "Transaction-X");

        assert_eq!(
            report.outcome,
            Outcome::Success(Completion::Consensus {
                value: "Transaction-X".to_string(),
                votes: 5
            })
        );
        assert!(report.faults.is_none());
        assert!(cluster.replicas.iter().all(|r| r.replied));
        // Logged counts include the replica's own vote
        assert!(has_line(&trace, "Replica 0 received 5 PREPARE messages"));
        assert!(has_line(&trace, "Replica 1 received 4 PREPARE messages"));
        assert!(has_line(&trace, "Replica 3 received 5 COMMIT messages"));
        assert_eq!(cluster.replica(0).unwrap().prepare_count, 5);
        assert!(has_line(&trace, "Request \"Transaction-X\" committed successfully"));
    }

    #[test]
    fn test_single_byzantine_backup_is_tolerated() {
        let mut cluster = PbftCluster::default();
        cluster.set_byzantine(2, true).unwrap();
        let (report, trace) = run(&mut cluster, "Transaction-X");

        assert!(report.outcome.is_success());
        assert_eq!(report.faults.as_ref().map(|f| f.tolerated), Some(true));
        let byzantine = cluster.replica(2).unwrap();
        assert_eq!(byzantine.value, None);
        assert!(!byzantine.replied);
        assert_eq!(byzantine.prepare_count, 0);
        assert!(cluster
            .replicas
            .iter()
            .filter(|r| r.id != 2)
            .all(|r| r.replied && r.value.as_deref() == Some("Transaction-X")));
        assert_eq!(trace.entries()[0].line, "⚠️ Node 2 is Byzantine (faulty)");
        assert!(has_line(&trace, "✓ Byzantine node 2 was tolerated (f=1 failures max)"));
    }

    #[test]
    fn test_two_byzantine_backups_fail_commit() {
        let mut cluster = PbftCluster::default();
        cluster.set_byzantine(3, true).unwrap();
        cluster.set_byzantine(4, true).unwrap();
        let (report, trace) = run(&mut cluster, "Transaction-X");

        assert_eq!(report.outcome, Outcome::Failure(FailureReason::CommitQuorum));
        assert_eq!(
            report.faults.as_ref().map(|f| (f.faulty.clone(), f.tolerated)),
            Some((vec![3, 4], false))
        );
        // Only the primary collects enough PREPAREs
        assert_eq!(cluster.replica(0).unwrap().prepare_count, 3);
        assert_eq!(cluster.replica(1).unwrap().prepare_count, 2);
        assert!(has_line(&trace, "Replica 0 received 3 PREPARE messages"));
        assert!(has_line(&trace, "Replica 1 received 2 PREPARE messages"));
        assert!(has_line(&trace, "✓ 1 replicas reached prepare quorum (3 needed)"));
        assert!(cluster.replicas.iter().all(|r| r.commit_count <= 2));
        assert!(cluster.replicas.iter().all(|r| !r.replied));
    }

    #[test]
    fn test_byzantine_primary_is_tolerated() {
        let mut cluster = PbftCluster::default();
        cluster.set_byzantine(0, true).unwrap();
        let (report, _) = run(&mut cluster, "Transaction-X");

        // The primary still orders the request; its silence afterwards is absorbed
        assert!(report.outcome.is_success());
        assert!(!cluster.replica(0).unwrap().replied);
        assert_eq!(cluster.replica(1).unwrap().prepare_count, 4);
        assert_eq!(cluster.replica(1).unwrap().commit_count, 4);
    }

    #[test]
    fn test_too_few_honest_replicas_fail_prepare() {
        let mut cluster = PbftCluster::new(4);
        for id in 1..4 {
            cluster.set_byzantine(id, true).unwrap();
        }
        let (report, trace) = run(&mut cluster, "Transaction-X");
        assert_eq!(report.outcome, Outcome::Failure(FailureReason::PrepareQuorum));
        assert!(has_line(&trace, "❌ Failed to reach prepare quorum"));
    }

    #[test]
    fn test_prepare_step_messages_skip_byzantine() {
        let mut cluster = PbftCluster::default();
        cluster.set_byzantine(4, true).unwrap();
        let mut pbft = Pbft::new("Transaction-X");
        let mut trace = Trace::new();
        for _ in 0..3 {
            pbft.step(&mut cluster, &mut trace);
        }
        // Backups 1-3 each send to the four other replicas
        assert_eq!(cluster.messages.len(), 12);
        assert!(cluster.messages.iter().all(|m| m.from() != 4 && m.from() != 0));
    }

    #[test]
    fn test_new_request_clears_previous_round() {
        let mut cluster = PbftCluster::default();
        run(&mut cluster, "first");
        let mut pbft = Pbft::new("second");
        let mut trace = Trace::new();
        pbft.step(&mut cluster, &mut trace);
        assert!(cluster.replicas.iter().all(|r| !r.replied && r.value.is_none()));
    }

    #[test]
    fn test_unknown_replica_rejected() {
        let mut cluster = PbftCluster::default();
        assert_eq!(
            cluster.set_byzantine(5, true),
            Err(EditError::UnknownParticipant(5))
        );
    }
}
