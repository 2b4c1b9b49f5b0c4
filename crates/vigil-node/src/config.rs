use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use vigil_consensus::CoordinatorConfig;
use vigil_core::{KeyPair, NodeEndpoint, NodeId, PublicKey, ValidatorIdentity};
use vigil_health::{HealthConfig, HEALTH_OUT, MIX_VALIDATOR};

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chain ID
    pub chain_id: u64,

    /// Committee served by this node. Zero is reserved.
    pub committee_id: u64,

    /// Validator private key (hex). A throwaway key is generated when absent.
    pub validator_key: Option<String>,

    /// Address other members reach this node on
    pub listen_ip: String,
    pub listen_port: u16,

    /// Pause between agreement rounds of the loopback engine
    pub round_time_ms: u64,

    /// Capacity of each committee's action queue
    pub action_capacity: usize,

    pub health: HealthSettings,

    /// Working committee. The first member leads.
    pub committee: Vec<MemberConfig>,

    /// Standby validators eligible to replace stalled members
    pub standby: Vec<MemberConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    pub health_out: u32,
    pub min_validators: usize,
    pub sweep_interval_ms: u64,
    pub proposal_capacity: usize,
    pub confirmation_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Public key hex
    pub public_key: String,
    pub ip: String,
    pub port: u16,
}

impl MemberConfig {
    pub fn identity(&self) -> Result<ValidatorIdentity> {
        let public_key = PublicKey::from_hex(&self.public_key)?;
        let endpoint = NodeEndpoint::new(NodeId::new(&self.public_key), &self.ip, self.port);
        Ok(ValidatorIdentity::new(public_key, endpoint))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            chain_id: 1,
            committee_id: 1,
            validator_key: None,
            listen_ip: "127.0.0.1".to_string(),
            listen_port: 30310,
            round_time_ms: 2000,
            action_capacity: CoordinatorConfig::default().action_capacity,
            health: HealthSettings::default(),
            committee: Vec::new(),
            standby: Vec::new(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        let defaults = HealthConfig::default();
        HealthSettings {
            health_out: HEALTH_OUT,
            min_validators: MIX_VALIDATOR,
            sweep_interval_ms: defaults.sweep_interval.as_millis() as u64,
            proposal_capacity: defaults.proposal_capacity,
            confirmation_capacity: defaults.confirmation_capacity,
        }
    }
}

impl NodeConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.committee_id == 0 {
            bail!("committee_id 0 is reserved");
        }
        if self.health.sweep_interval_ms == 0 {
            bail!("health.sweep_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn keypair(&self) -> Result<Option<KeyPair>> {
        match &self.validator_key {
            Some(hex) => Ok(Some(KeyPair::from_secret(vigil_core::SecretKey::from_hex(hex)?))),
            None => Ok(None),
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            health_out: self.health.health_out,
            min_validators: self.health.min_validators,
            sweep_interval: Duration::from_millis(self.health.sweep_interval_ms),
            proposal_capacity: self.health.proposal_capacity,
            confirmation_capacity: self.health.confirmation_capacity,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            action_capacity: self.action_capacity,
        }
    }

    pub fn committee_identities(&self) -> Result<Vec<ValidatorIdentity>> {
        self.committee.iter().map(MemberConfig::identity).collect()
    }

    pub fn standby_identities(&self) -> Result<Vec<ValidatorIdentity>> {
        self.standby.iter().map(MemberConfig::identity).collect()
    }
}

fn sample_member(keys: &KeyPair, port: u16) -> MemberConfig {
    MemberConfig {
        public_key: keys.public.to_hex(),
        ip: "127.0.0.1".to_string(),
        port,
    }
}

/// Sample devnet: the local leader, four silent peers and two standbys.
///
/// The peers never answer, so after `health_out` sweeps the manager starts
/// replacing them until the committee is down to its minimum size.
pub fn generate_sample_config() -> NodeConfig {
    let local = KeyPair::generate();

    let mut committee = vec![sample_member(&local, 30310)];
    committee.extend((1..=4).map(|i| sample_member(&KeyPair::generate(), 30310 + i)));
    let standby = (0..2)
        .map(|i| sample_member(&KeyPair::generate(), 30320 + i))
        .collect();

    NodeConfig {
        validator_key: Some(local.secret.to_hex()),
        health: HealthSettings {
            health_out: 30,
            ..Default::default()
        },
        committee,
        standby,
        ..Default::default()
    }
}
