pub mod block;
pub mod committee;
pub mod switch;
pub mod validator;

pub use block::{genesis_header, Block, BlockHeader};
pub use committee::{CommitteeId, CommitteeInfo, CommitteeMember, CommitteeNode};
pub use switch::{SwitchEntry, SwitchInfos, ValidatorState};
pub use validator::{NodeEndpoint, NodeId, ValidatorIdentity};
