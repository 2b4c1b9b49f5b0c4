use vigil_core::Block;

use crate::error::AgentError;

/// Block production and execution, owned by the chain.
///
/// Calls are made synchronously from the action loop and from engine
/// callbacks; implementations must not block for long.
pub trait Agent: Send + Sync {
    /// Build the next candidate block on top of the local head
    fn fetch_candidate_block(&self) -> Result<Block, AgentError>;

    /// Execute and validate a candidate proposed by the leader
    fn verify_block(&self, block: &Block) -> Result<(), AgentError>;

    /// Commit an agreed block and announce it to the network
    fn finalize_and_broadcast(&self, block: &Block) -> Result<(), AgentError>;

    /// Re-announce a pending block
    fn rebroadcast(&self, block: &Block) -> Result<(), AgentError>;
}
