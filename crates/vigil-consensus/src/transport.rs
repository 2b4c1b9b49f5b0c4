use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use vigil_core::{CommitteeId, CommitteeNode};

use crate::events::ActionEvent;
use crate::net::RequestMsg;
use crate::round::CommitteeRound;

/// Agreement engine endpoint of one committee.
///
/// Implementations run their own message exchange and call back into the
/// [`CommitteeRound`] they were built with.
pub trait Transport: Send + Sync {
    fn start(&self);

    fn stop(&self);

    /// Submit a leader request for agreement
    fn put_request(&self, request: RequestMsg);

    /// Replace the `name -> "ip:port"` routing table
    fn update_nodes(&self, table: &BTreeMap<String, String>);
}

/// Everything a transport needs to join one committee
pub struct TransportContext {
    pub node_id: String,
    pub committee_id: CommitteeId,
    pub nodes: Vec<CommitteeNode>,
    /// Feeds the committee's action loop
    pub actions: mpsc::Sender<ActionEvent>,
    pub round: Arc<CommitteeRound>,
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, ctx: TransportContext) -> Arc<dyn Transport>;
}

/// Routing table keyed by hex public key. Members without an endpoint are left out.
pub fn node_table(nodes: &[CommitteeNode]) -> BTreeMap<String, String> {
    nodes
        .iter()
        .filter_map(CommitteeNode::endpoint)
        .map(|e| (e.id.as_str().to_string(), e.socket_addr()))
        .collect()
}
