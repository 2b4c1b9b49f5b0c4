use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use vigil_core::serialize::{from_hex_blob, to_hex_blob};
use vigil_core::{hash_encoded, sign, Block, CommitteeId, KeyPair, PublicKey};

use crate::agent::Agent;
use crate::error::ConsensusError;
use crate::net::{PrePrepareMsg, RequestMsg, SignedVoteMsg, VoteResult};
use crate::store::RoundStore;

/// Agreement round state of one committee.
///
/// Shared between the coordinator, the committee's action loop and its
/// transport. Every engine callback lands here.
pub struct CommitteeRound {
    cid: CommitteeId,
    leader: PublicKey,
    keys: KeyPair,
    node_id: String,
    agent: Arc<dyn Agent>,
    store: RoundStore,
    current_height: AtomicU64,
}

impl CommitteeRound {
    pub fn new(cid: CommitteeId, leader: PublicKey, keys: KeyPair, agent: Arc<dyn Agent>) -> Self {
        let node_id = keys.public.to_hex();
        CommitteeRound {
            cid,
            leader,
            keys,
            node_id,
            agent,
            store: RoundStore::new(),
            current_height: AtomicU64::new(0),
        }
    }

    pub fn cid(&self) -> CommitteeId {
        self.cid
    }

    pub fn leader(&self) -> &PublicKey {
        &self.leader
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &RoundStore {
        &self.store
    }

    pub fn is_leader(&self) -> bool {
        self.leader == self.keys.public
    }

    /// Height of the last request handed to the transport
    pub fn current_height(&self) -> u64 {
        self.current_height.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_height(&self, height: u64) {
        self.current_height.store(height, Ordering::Release);
    }

    /// Fetch the next candidate from the agent and wrap it as a leader request
    pub fn get_request(&self) -> Result<RequestMsg, ConsensusError> {
        if !self.is_leader() {
            return Err(ConsensusError::NotLeader);
        }

        debug!(cid = self.cid, "fetching candidate block");
        let block = self.agent.fetch_candidate_block()?;
        let height = block.height();
        let request_height =
            i64::try_from(height).map_err(|_| ConsensusError::HeightOutOfRange(height))?;
        let operation = to_hex_blob(&block)?;

        self.store.insert_next(block)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        info!(cid = self.cid, height, "built leader request");
        Ok(RequestMsg {
            client_id: self.node_id.clone(),
            timestamp,
            operation,
            height: request_height,
        })
    }

    /// Store the block carried by a pre-prepare. Returns false if it does not decode.
    pub fn insert_block(&self, msg: &PrePrepareMsg) -> bool {
        match from_hex_blob::<Block>(&msg.request.operation) {
            Ok(block) => {
                debug!(cid = self.cid, height = block.height(), "stored proposed block");
                self.store.put(block);
                true
            }
            Err(e) => {
                warn!(cid = self.cid, height = msg.request.height, error = %e, "undecodable pre-prepare");
                false
            }
        }
    }

    /// Have the agent verify the block pending at the request's height
    pub fn check_msg(&self, msg: &RequestMsg) -> Result<(), ConsensusError> {
        let block = self.pending(msg)?;
        self.agent.verify_block(&block)?;
        Ok(())
    }

    /// Finalize the block pending at the request's height.
    ///
    /// The entry is removed whatever the agent answers; the return value
    /// says whether finalization succeeded.
    pub fn reply_result(&self, msg: &RequestMsg, result: VoteResult) -> bool {
        let Ok(block) = self.pending(msg) else {
            return false;
        };

        let finalized = self.agent.finalize_and_broadcast(&block);
        self.store.remove(block.height());

        match finalized {
            Ok(()) => {
                info!(cid = self.cid, height = block.height(), ?result, "finalized block");
                true
            }
            Err(e) => {
                warn!(cid = self.cid, height = block.height(), error = %e, "finalize failed");
                false
            }
        }
    }

    /// Re-announce the block pending at `height`, if any
    pub fn broadcast(&self, height: u64) {
        if let Some(block) = self.store.get(height) {
            if let Err(e) = self.agent.rebroadcast(&block) {
                warn!(cid = self.cid, height, error = %e, "rebroadcast failed");
            }
        }
    }

    /// Sign a vote on the block pending at `height`
    pub fn sign_msg(&self, height: i64, result: VoteResult) -> Option<SignedVoteMsg> {
        let key = u64::try_from(height).ok()?;
        let block = self.store.get(key)?;

        let digest = block
            .hash()
            .and_then(|block_hash| hash_encoded(&(block_hash, height, result, self.keys.public)));
        let digest = match digest {
            Ok(d) => d,
            Err(e) => {
                warn!(cid = self.cid, height, error = %e, "cannot hash vote");
                return None;
            }
        };

        Some(SignedVoteMsg {
            height,
            result,
            signature: sign(&self.keys.secret, digest.as_bytes()),
        })
    }

    fn pending(&self, msg: &RequestMsg) -> Result<Block, ConsensusError> {
        msg.block_height()
            .and_then(|height| self.store.get(height))
            .ok_or(ConsensusError::BlockNotFound(msg.height))
    }
}
