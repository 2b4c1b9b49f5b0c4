use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_core::{CommitteeId, CommitteeInfo, CommitteeNode, KeyPair};

use crate::agent::Agent;
use crate::error::ConsensusError;
use crate::events::ActionEvent;
use crate::net::{PrePrepareMsg, RequestMsg, SignedVoteMsg, VoteResult};
use crate::round::CommitteeRound;
use crate::transport::{node_table, Transport, TransportContext, TransportFactory};

/// Configuration for the round coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of each committee's action queue
    pub action_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig { action_capacity: 32 }
    }
}

/// Lifecycle commands from the election layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Start,
    Stop,
    Switch,
}

struct CommitteeServer {
    round: Arc<CommitteeRound>,
    nodes: Vec<CommitteeNode>,
    transport: Option<Arc<dyn Transport>>,
    actions_tx: mpsc::Sender<ActionEvent>,
    /// Taken when the action loop starts
    actions_rx: Option<mpsc::Receiver<ActionEvent>>,
    worker: Option<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    /// Scheduled for teardown by the next `clear`
    retiring: bool,
}

impl CommitteeServer {
    fn upsert_node(&mut self, node: CommitteeNode) {
        match self
            .nodes
            .iter_mut()
            .find(|n| n.public_key == node.public_key)
        {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    /// Stop the transport and signal the action loop. Returns the loop's handle.
    fn shut_down(&mut self) -> Option<JoinHandle<()>> {
        if let Some(transport) = &self.transport {
            transport.stop();
        }
        self.stop_tx.send_replace(true);
        self.worker.take()
    }
}

/// Drives one agreement round per active committee
pub struct RoundCoordinator {
    config: CoordinatorConfig,
    keys: KeyPair,
    agent: Arc<dyn Agent>,
    factory: Arc<dyn TransportFactory>,
    committees: HashMap<CommitteeId, CommitteeServer>,
    /// Action loops of cleared committees, joined by `finish`
    retired: Vec<(CommitteeId, JoinHandle<()>)>,
}

impl RoundCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        keys: KeyPair,
        agent: Arc<dyn Agent>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        RoundCoordinator {
            config,
            keys,
            agent,
            factory,
            committees: HashMap::new(),
            retired: Vec::new(),
        }
    }

    /// Hex public key of the local node
    pub fn node_id(&self) -> String {
        self.keys.public.to_hex()
    }

    /// Register an elected committee. The first member leads.
    pub fn put_committee(&mut self, info: CommitteeInfo) -> Result<(), ConsensusError> {
        let cid = info.id;
        if self.committees.contains_key(&cid) {
            return Err(ConsensusError::DuplicateCommittee(cid));
        }
        let leader = info
            .members
            .first()
            .map(|m| m.public_key)
            .ok_or(ConsensusError::EmptyCommittee(cid))?;

        let mut nodes: Vec<CommitteeNode> = Vec::with_capacity(info.members.len());
        for member in &info.members {
            if !nodes.iter().any(|n| n.public_key == member.public_key) {
                nodes.push(CommitteeNode::from_member(member));
            }
        }

        let round = Arc::new(CommitteeRound::new(
            cid,
            leader,
            self.keys.clone(),
            Arc::clone(&self.agent),
        ));
        let (actions_tx, actions_rx) = mpsc::channel(self.config.action_capacity.max(1));
        let (stop_tx, _) = watch::channel(false);

        info!(cid, members = nodes.len(), leader = %leader, "registered committee");
        self.committees.insert(
            cid,
            CommitteeServer {
                round,
                nodes,
                transport: None,
                actions_tx,
                actions_rx: Some(actions_rx),
                worker: None,
                stop_tx,
                retiring: false,
            },
        );
        Ok(())
    }

    /// Merge endpoint information for a committee's members.
    ///
    /// The first call builds the committee's transport; later calls push the
    /// refreshed routing table into it.
    pub fn put_nodes(
        &mut self,
        cid: CommitteeId,
        nodes: Vec<CommitteeNode>,
    ) -> Result<(), ConsensusError> {
        if nodes.is_empty() {
            return Err(ConsensusError::EmptyNodeList(cid));
        }
        let node_id = self.node_id();
        let server = self
            .committees
            .get_mut(&cid)
            .ok_or(ConsensusError::UnknownCommittee(cid))?;

        for node in nodes {
            server.upsert_node(node);
        }

        match &server.transport {
            Some(transport) => {
                transport.update_nodes(&node_table(&server.nodes));
                debug!(cid, nodes = server.nodes.len(), "updated node table");
            }
            None => {
                let transport = self.factory.create(TransportContext {
                    node_id,
                    committee_id: cid,
                    nodes: server.nodes.clone(),
                    actions: server.actions_tx.clone(),
                    round: Arc::clone(&server.round),
                });
                server.transport = Some(transport);
                info!(cid, nodes = server.nodes.len(), "built committee transport");
            }
        }
        Ok(())
    }

    pub fn notify(&mut self, cid: CommitteeId, action: NotifyAction) -> Result<(), ConsensusError> {
        info!(cid, ?action, "committee notification");
        match action {
            NotifyAction::Start => self.start_committee(cid),
            NotifyAction::Stop => {
                if self.retire(cid).is_ok() {
                    self.clear(cid);
                }
                Ok(())
            }
            NotifyAction::Switch => Ok(()),
        }
    }

    fn start_committee(&mut self, cid: CommitteeId) -> Result<(), ConsensusError> {
        let server = self
            .committees
            .get_mut(&cid)
            .ok_or(ConsensusError::UnknownCommittee(cid))?;
        let transport = server
            .transport
            .clone()
            .ok_or(ConsensusError::TransportNotReady(cid))?;
        let actions = server
            .actions_rx
            .take()
            .ok_or(ConsensusError::AlreadyStarted(cid))?;

        transport.start();
        let round = Arc::clone(&server.round);
        let shutdown = server.stop_tx.subscribe();
        server.worker = Some(tokio::spawn(run_action_loop(
            round, transport, actions, shutdown,
        )));

        server
            .actions_tx
            .try_send(ActionEvent::Fetch)
            .map_err(|_| ConsensusError::ActionQueueFull(cid))
    }

    /// Schedule a committee for teardown by `clear(0)`. It keeps running until then.
    pub fn retire(&mut self, cid: CommitteeId) -> Result<(), ConsensusError> {
        let server = self
            .committees
            .get_mut(&cid)
            .ok_or(ConsensusError::UnknownCommittee(cid))?;
        server.retiring = true;
        debug!(cid, "committee retiring");
        Ok(())
    }

    pub fn is_retiring(&self, cid: CommitteeId) -> bool {
        self.committees.get(&cid).is_some_and(|s| s.retiring)
    }

    /// Drop committees. Id 0 removes every retiring committee.
    pub fn clear(&mut self, cid: CommitteeId) {
        let doomed: Vec<CommitteeId> = if cid == 0 {
            self.committees
                .iter()
                .filter(|(_, s)| s.retiring)
                .map(|(id, _)| *id)
                .collect()
        } else {
            vec![cid]
        };

        for id in doomed {
            if let Some(mut server) = self.committees.remove(&id) {
                if let Some(worker) = server.shut_down() {
                    self.retired.push((id, worker));
                }
                info!(cid = id, "cleared committee");
            }
        }
    }

    /// Stop every transport and every action loop
    pub async fn finish(&mut self) {
        for (cid, server) in self.committees.iter_mut() {
            if let Some(worker) = server.shut_down() {
                self.retired.push((*cid, worker));
            }
        }

        for (cid, worker) in self.retired.drain(..) {
            if let Err(e) = worker.await {
                warn!(cid, error = %e, "action loop panicked");
            }
        }
        info!("round coordinator finished");
    }

    fn round(&self, cid: CommitteeId) -> Result<&Arc<CommitteeRound>, ConsensusError> {
        self.committees
            .get(&cid)
            .map(|s| &s.round)
            .ok_or(ConsensusError::UnknownCommittee(cid))
    }

    pub fn committee_round(&self, cid: CommitteeId) -> Option<Arc<CommitteeRound>> {
        self.committees.get(&cid).map(|s| Arc::clone(&s.round))
    }

    pub fn get_request(&self, cid: CommitteeId) -> Result<RequestMsg, ConsensusError> {
        self.round(cid)?.get_request()
    }

    pub fn insert_block(&self, cid: CommitteeId, msg: &PrePrepareMsg) -> bool {
        self.round(cid).is_ok_and(|r| r.insert_block(msg))
    }

    pub fn check_msg(&self, cid: CommitteeId, msg: &RequestMsg) -> Result<(), ConsensusError> {
        self.round(cid)?.check_msg(msg)
    }

    pub fn reply_result(&self, cid: CommitteeId, msg: &RequestMsg, result: VoteResult) -> bool {
        self.round(cid).is_ok_and(|r| r.reply_result(msg, result))
    }

    pub fn broadcast(&self, cid: CommitteeId, height: u64) {
        if let Ok(round) = self.round(cid) {
            round.broadcast(height);
        }
    }

    pub fn sign_msg(
        &self,
        cid: CommitteeId,
        height: i64,
        result: VoteResult,
    ) -> Option<SignedVoteMsg> {
        self.round(cid).ok()?.sign_msg(height, result)
    }

    pub fn current_height(&self, cid: CommitteeId) -> Option<u64> {
        self.round(cid).ok().map(|r| r.current_height())
    }

    pub fn is_leader(&self, cid: CommitteeId) -> bool {
        self.round(cid).is_ok_and(|r| r.is_leader())
    }

    pub fn committee_ids(&self) -> Vec<CommitteeId> {
        let mut ids: Vec<CommitteeId> = self.committees.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn nodes(&self, cid: CommitteeId) -> Option<&[CommitteeNode]> {
        self.committees.get(&cid).map(|s| s.nodes.as_slice())
    }
}

async fn run_action_loop(
    round: Arc<CommitteeRound>,
    transport: Arc<dyn Transport>,
    mut actions: mpsc::Receiver<ActionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let cid = round.cid();
    info!(cid, "action loop started");

    while !*shutdown.borrow() {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            action = actions.recv() => {
                let Some(action) = action else { break };
                match action {
                    ActionEvent::Fetch => match round.get_request() {
                        Ok(request) => {
                            if let Some(height) = request.block_height() {
                                round.set_current_height(height);
                            }
                            transport.put_request(request);
                        }
                        Err(e) => warn!(cid, error = %e, "fetch failed"),
                    },
                    ActionEvent::Broadcast { height } => round.broadcast(height),
                    ActionEvent::Finish => break,
                }
            }
        }
    }

    info!(cid, "action loop is quit");
}
