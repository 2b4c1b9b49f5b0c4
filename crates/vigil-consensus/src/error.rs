use thiserror::Error;
use vigil_core::CommitteeId;

/// Failure reported by the block agent
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Block rejected: {0}")]
    Rejected(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Local node must be the leader")]
    NotLeader,

    #[error("Block at height {0} already pending")]
    DuplicateHeight(u64),

    #[error("Height discontinuity: expected {expected}, got {got}")]
    HeightDiscontinuity { expected: u64, got: u64 },

    #[error("Height {0} out of range")]
    HeightOutOfRange(u64),

    #[error("Unknown committee: {0}")]
    UnknownCommittee(CommitteeId),

    #[error("Committee {0} already registered")]
    DuplicateCommittee(CommitteeId),

    #[error("Committee {0} has no members")]
    EmptyCommittee(CommitteeId),

    #[error("Empty node list for committee {0}")]
    EmptyNodeList(CommitteeId),

    #[error("Transport for committee {0} not built yet")]
    TransportNotReady(CommitteeId),

    #[error("Committee {0} already started")]
    AlreadyStarted(CommitteeId),

    #[error("Action queue full for committee {0}")]
    ActionQueueFull(CommitteeId),

    #[error("No pending block at height {0}")]
    BlockNotFound(i64),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Core error: {0}")]
    Core(#[from] vigil_core::CoreError),
}
