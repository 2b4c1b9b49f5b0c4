//! Vigil Consensus - Round coordination
//!
//! This crate drives the per-height lifecycle of a committee's agreement
//! round: fetching a candidate block, holding it while the engine votes,
//! verifying and finalizing it through the agent.

pub mod agent;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod net;
pub mod round;
pub mod store;
pub mod transport;

pub use agent::Agent;
pub use coordinator::{CoordinatorConfig, NotifyAction, RoundCoordinator};
pub use error::{AgentError, ConsensusError};
pub use events::ActionEvent;
pub use net::{PrePrepareMsg, RequestMsg, SignedVoteMsg, VoteResult};
pub use round::CommitteeRound;
pub use store::RoundStore;
pub use transport::{Transport, TransportContext, TransportFactory};
