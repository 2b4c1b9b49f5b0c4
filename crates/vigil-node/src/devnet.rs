use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_consensus::{
    ActionEvent, Agent, AgentError, CommitteeRound, RequestMsg, Transport, TransportContext,
    TransportFactory, VoteResult,
};
use vigil_core::{genesis_header, Block, BlockHeader, NodeId, PublicKey};
use vigil_health::{HealthMgr, SwitchOutcome, SwitchValidator};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// In-memory chain: extends its head with one payload item per block
pub struct DevAgent {
    head: Mutex<BlockHeader>,
    proposer: PublicKey,
}

impl DevAgent {
    pub fn new(chain_id: u64, proposer: PublicKey) -> Self {
        DevAgent {
            head: Mutex::new(genesis_header(chain_id, now_secs())),
            proposer,
        }
    }

    pub fn height(&self) -> u64 {
        self.head().height
    }

    fn head(&self) -> BlockHeader {
        self.head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_extends_head(&self, block: &Block) -> Result<(), AgentError> {
        let head = self.head();
        let head_hash = head
            .hash()
            .map_err(|e| AgentError::Unavailable(e.to_string()))?;
        if block.header.parent_hash != head_hash || block.height() != head.height + 1 {
            return Err(AgentError::Rejected(format!(
                "block {} does not extend head {}",
                block.height(),
                head.height
            )));
        }
        if !block.verify_payload_root() {
            return Err(AgentError::Rejected("payload root mismatch".to_string()));
        }
        Ok(())
    }
}

impl Agent for DevAgent {
    fn fetch_candidate_block(&self) -> Result<Block, AgentError> {
        let head = self.head();
        let payload = vec![format!("devnet block {}", head.height + 1).into_bytes()];
        Block::child_of(&head, self.proposer, now_secs(), payload)
            .map_err(|e| AgentError::Unavailable(e.to_string()))
    }

    fn verify_block(&self, block: &Block) -> Result<(), AgentError> {
        self.check_extends_head(block)
    }

    fn finalize_and_broadcast(&self, block: &Block) -> Result<(), AgentError> {
        let mut head = self.head.lock().unwrap_or_else(PoisonError::into_inner);
        let head_hash = head
            .hash()
            .map_err(|e| AgentError::Unavailable(e.to_string()))?;
        if block.header.parent_hash != head_hash {
            return Err(AgentError::Rejected("stale block".to_string()));
        }
        *head = block.header.clone();
        info!(height = block.height(), "committed block");
        Ok(())
    }

    fn rebroadcast(&self, block: &Block) -> Result<(), AgentError> {
        debug!(height = block.height(), "rebroadcast block");
        Ok(())
    }
}

/// Single-member agreement: every request is agreed after one round time
pub struct LoopbackTransport {
    round: Arc<CommitteeRound>,
    actions: mpsc::Sender<ActionEvent>,
    health: Arc<HealthMgr>,
    local_id: NodeId,
    round_time: Duration,
    running: Arc<AtomicBool>,
}

impl Transport for LoopbackTransport {
    fn start(&self) {
        self.running.store(true, Ordering::Release);
        info!(cid = self.round.cid(), "loopback transport started");
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        info!(cid = self.round.cid(), "loopback transport stopped");
    }

    fn put_request(&self, request: RequestMsg) {
        let round = Arc::clone(&self.round);
        let actions = self.actions.clone();
        let health = Arc::clone(&self.health);
        let local_id = self.local_id.clone();
        let running = Arc::clone(&self.running);
        let round_time = self.round_time;

        tokio::spawn(async move {
            tokio::time::sleep(round_time).await;
            if !running.load(Ordering::Acquire) {
                return;
            }

            let result = match round.check_msg(&request) {
                Ok(()) => VoteResult::Agree,
                Err(e) => {
                    warn!(height = request.height, error = %e, "candidate rejected");
                    VoteResult::Against
                }
            };
            if let Some(vote) = round.sign_msg(request.height, result) {
                debug!(height = vote.height, sig = %vote.signature.to_hex(), "signed vote");
            }
            if result == VoteResult::Agree && round.reply_result(&request, result) {
                // Our own progress is the only liveness evidence here
                health.update(&local_id);
            } else if let Some(height) = request.block_height() {
                round.store().remove(height);
            }

            if actions.send(ActionEvent::Fetch).await.is_err() {
                debug!("action loop gone");
            }
        });
    }

    fn update_nodes(&self, table: &BTreeMap<String, String>) {
        debug!(cid = self.round.cid(), nodes = table.len(), "node table updated");
    }
}

pub struct LoopbackFactory {
    pub health: Arc<HealthMgr>,
    pub local_id: NodeId,
    pub round_time: Duration,
}

impl TransportFactory for LoopbackFactory {
    fn create(&self, ctx: TransportContext) -> Arc<dyn Transport> {
        info!(
            cid = ctx.committee_id,
            node = %ctx.node_id,
            members = ctx.nodes.len(),
            "creating loopback transport"
        );
        Arc::new(LoopbackTransport {
            round: ctx.round,
            actions: ctx.actions,
            health: Arc::clone(&self.health),
            local_id: self.local_id.clone(),
            round_time: self.round_time,
            running: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Stand-in for chain reconfiguration: accept every proposed switch
pub async fn run_reconfiguration(
    health: Arc<HealthMgr>,
    mut proposals: mpsc::Receiver<SwitchValidator>,
) {
    while let Some(proposal) = proposals.recv().await {
        info!(?proposal, "reconfiguring committee");

        let outcome = match proposal.infos.remove_add_pair() {
            Some((remove, add)) => match health.verify_switch(remove, add) {
                Ok(()) => SwitchOutcome::Applied,
                Err(e) => SwitchOutcome::Rejected(e.to_string()),
            },
            None => SwitchOutcome::Rejected("malformed switch".to_string()),
        };

        if let Err(e) = health.confirm(proposal.confirm(outcome)) {
            warn!(error = %e, "cannot confirm switch");
        }
    }
    debug!("proposal channel closed");
}
