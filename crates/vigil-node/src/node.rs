use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vigil_consensus::{NotifyAction, RoundCoordinator};
use vigil_core::{
    CommitteeInfo, CommitteeMember, CommitteeNode, KeyPair, NodeEndpoint, NodeId,
    ValidatorIdentity,
};
use vigil_health::{HealthMgr, HealthStats};

use crate::config::NodeConfig;
use crate::devnet::{run_reconfiguration, DevAgent, LoopbackFactory};

/// The Vigil devnet node
pub struct Node {
    config: NodeConfig,
    keys: KeyPair,
    committee: Vec<ValidatorIdentity>,
    standby: Vec<ValidatorIdentity>,
}

/// A launched node; dropped subsystems keep running until [`RunningNode::shutdown`]
pub struct RunningNode {
    cid: u64,
    agent: Arc<DevAgent>,
    health: Arc<HealthMgr>,
    coordinator: RoundCoordinator,
    health_task: JoinHandle<()>,
    reconfig_task: JoinHandle<()>,
}

impl Node {
    /// Create a new node from configuration
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let keys = match config.keypair()? {
            Some(keys) => keys,
            None => {
                let keys = KeyPair::generate();
                warn!("No validator key configured, using ephemeral key {}", keys.public);
                keys
            }
        };

        let mut committee = config.committee_identities()?;
        if !committee.iter().any(|m| m.public_key == keys.public) {
            let id = NodeId::new(keys.public.to_hex());
            let endpoint = NodeEndpoint::new(id, &config.listen_ip, config.listen_port);
            committee.insert(0, ValidatorIdentity::new(keys.public, endpoint));
        }
        let standby = config.standby_identities()?;

        Ok(Node {
            config,
            keys,
            committee,
            standby,
        })
    }

    pub fn local_id(&self) -> NodeId {
        NodeId::new(self.keys.public.to_hex())
    }

    /// Wire the health manager and the round coordinator and start both
    pub fn launch(self) -> Result<RunningNode> {
        let cid = self.config.committee_id;

        let health = Arc::new(HealthMgr::new(cid, self.config.health_config()));
        for identity in &self.committee {
            health.put_work_health(identity.clone());
        }
        health.set_back_validators(self.standby.clone());
        let proposals = health
            .take_proposals()
            .ok_or_else(|| anyhow!("proposal receiver already taken"))?;

        let agent = Arc::new(DevAgent::new(self.config.chain_id, self.keys.public));
        let factory = Arc::new(LoopbackFactory {
            health: Arc::clone(&health),
            local_id: self.local_id(),
            round_time: Duration::from_millis(self.config.round_time_ms),
        });
        let mut coordinator = RoundCoordinator::new(
            self.config.coordinator_config(),
            self.keys.clone(),
            agent.clone(),
            factory,
        );

        let members = self
            .committee
            .iter()
            .map(|m| CommitteeMember {
                coinbase: m.public_key,
                public_key: m.public_key,
            })
            .collect();
        coordinator.put_committee(CommitteeInfo { id: cid, members })?;

        let nodes = self
            .committee
            .iter()
            .map(|m| CommitteeNode {
                coinbase: m.public_key,
                public_key: m.public_key,
                ip: m.endpoint.ip.clone(),
                port: m.endpoint.port,
            })
            .collect();
        coordinator.put_nodes(cid, nodes)?;
        coordinator.notify(cid, NotifyAction::Start)?;

        let health_task = health.start()?;
        let reconfig_task = tokio::spawn(run_reconfiguration(Arc::clone(&health), proposals));

        info!(
            cid,
            node = %self.keys.public,
            leader = coordinator.is_leader(cid),
            working = self.committee.len(),
            standby = self.standby.len(),
            "node launched"
        );

        Ok(RunningNode {
            cid,
            agent,
            health,
            coordinator,
            health_task,
            reconfig_task,
        })
    }

    /// Run until interrupted
    pub async fn run(self) -> Result<()> {
        info!("Starting Vigil node");
        let running = self.launch()?;

        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, shutting down");

        running.shutdown().await
    }
}

impl RunningNode {
    pub fn height(&self) -> u64 {
        self.agent.height()
    }

    pub fn health_stats(&self) -> HealthStats {
        self.health.stats()
    }

    pub fn current_round(&self) -> Option<u64> {
        self.coordinator.current_height(self.cid)
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.coordinator.finish().await;
        self.health.stop();
        (&mut self.health_task).await?;
        self.reconfig_task.abort();

        info!(
            height = self.height(),
            round = ?self.current_round(),
            stats = ?self.health_stats(),
            "node stopped"
        );
        Ok(())
    }
}
