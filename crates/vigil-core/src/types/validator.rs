use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Address, PublicKey};

/// Network identity of a peer (hex node id as assigned by the p2p layer)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a validator can currently be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeEndpoint {
    pub id: NodeId,
    pub ip: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(id: NodeId, ip: impl Into<String>, port: u16) -> Self {
        NodeEndpoint {
            id,
            ip: ip.into(),
            port,
        }
    }

    /// `ip:port` form used in transport node tables
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// A validator as admitted to a committee pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    pub public_key: PublicKey,
    pub address: Address,
    pub endpoint: NodeEndpoint,
}

impl ValidatorIdentity {
    pub fn new(public_key: PublicKey, endpoint: NodeEndpoint) -> Self {
        ValidatorIdentity {
            address: public_key.address(),
            public_key,
            endpoint,
        }
    }
}
