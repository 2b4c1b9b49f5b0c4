use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_core::{
    Address, CommitteeId, NodeEndpoint, NodeId, PublicKey, SwitchEntry, SwitchInfos,
    ValidatorIdentity, ValidatorState,
};

use crate::config::HealthConfig;
use crate::error::HealthError;
use crate::health::Health;
use crate::switch::{SwitchOrigin, SwitchOutcome, SwitchValidator};

/// Immutable view of the working and standby pools.
///
/// The manager swaps in a new snapshot whenever pool membership changes;
/// readers keep iterating the one they cloned.
#[derive(Debug, Default, Clone)]
pub struct HealthPools {
    work: HashMap<NodeId, Arc<Health>>,
    /// Sorted by address
    back: Vec<Arc<Health>>,
}

impl HealthPools {
    pub fn work(&self) -> &HashMap<NodeId, Arc<Health>> {
        &self.work
    }

    pub fn back(&self) -> &[Arc<Health>] {
        &self.back
    }

    /// Validators currently `Used`, across both pools
    pub fn used_count(&self) -> usize {
        self.work
            .values()
            .chain(self.back.iter())
            .filter(|h| h.state() == ValidatorState::Used)
            .count()
    }
}

/// Proposal counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStats {
    pub emitted: u64,
    pub dropped: u64,
}

/// Committee health and failover manager for one chain.
pub struct HealthMgr {
    cid: CommitteeId,
    config: HealthConfig,
    pools: RwLock<Arc<HealthPools>>,
    proposal_tx: mpsc::Sender<SwitchValidator>,
    proposal_rx: Mutex<Option<mpsc::Receiver<SwitchValidator>>>,
    confirm_tx: mpsc::Sender<SwitchValidator>,
    confirm_rx: Mutex<Option<mpsc::Receiver<SwitchValidator>>>,
    shutdown_tx: watch::Sender<bool>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl HealthMgr {
    pub fn new(cid: CommitteeId, config: HealthConfig) -> Self {
        let (proposal_tx, proposal_rx) = mpsc::channel(config.proposal_capacity.max(1));
        let (confirm_tx, confirm_rx) = mpsc::channel(config.confirmation_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        HealthMgr {
            cid,
            config,
            pools: RwLock::new(Arc::new(HealthPools::default())),
            proposal_tx,
            proposal_rx: Mutex::new(Some(proposal_rx)),
            confirm_tx,
            confirm_rx: Mutex::new(Some(confirm_rx)),
            shutdown_tx,
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn cid(&self) -> CommitteeId {
        self.cid
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub fn stats(&self) -> HealthStats {
        HealthStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Current pool snapshot
    pub fn snapshot(&self) -> Arc<HealthPools> {
        let guard = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    fn replace_pools(&self, update: impl FnOnce(&mut HealthPools)) {
        let mut guard = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = (**guard).clone();
        update(&mut next);
        *guard = Arc::new(next);
    }

    /// Hand out the proposal receiver. There is a single consumer; later calls get `None`.
    pub fn take_proposals(&self) -> Option<mpsc::Receiver<SwitchValidator>> {
        self.proposal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Admit a validator into the working set as `Used`.
    ///
    /// A standby entry with the same address is dropped from `back`.
    pub fn put_work_health(&self, identity: ValidatorIdentity) -> Arc<Health> {
        let id = identity.endpoint.id.clone();
        let health = Arc::new(Health::new(identity, ValidatorState::Used));
        let address = *health.address();
        let admitted = Arc::clone(&health);

        self.replace_pools(|pools| {
            pools.back.retain(|h| h.address() != &address);
            pools.work.insert(id, admitted);
        });

        debug!(cid = self.cid, health = %health, "admitted working validator");
        health
    }

    /// Replace the standby pool wholesale. Entries start `Unused`, sorted by address.
    pub fn set_back_validators(&self, identities: Vec<ValidatorIdentity>) {
        self.replace_pools(|pools| {
            let mut back: Vec<Arc<Health>> = Vec::with_capacity(identities.len());
            for identity in identities {
                if pools.work.values().any(|h| h.address() == &identity.address) {
                    warn!(
                        cid = self.cid,
                        address = %identity.address,
                        "skipping standby validator already in the working set"
                    );
                    continue;
                }
                if back.iter().any(|h| h.address() == &identity.address) {
                    continue;
                }
                back.push(Arc::new(Health::new(identity, ValidatorState::Unused)));
            }
            back.sort_by(|a, b| a.address().cmp(b.address()));
            pools.back = back;
        });
    }

    /// Update the reachable address of a known validator
    pub fn update_health_info(&self, id: NodeId, ip: &str, port: u16, public_key: &PublicKey) {
        if let Some(health) = self.get_health(public_key) {
            health.set_endpoint(NodeEndpoint::new(id, ip, port));
            info!(cid = self.cid, info = %health, "updated health info");
        }
    }

    /// Reset the silence counter of the validator reachable as `id`
    pub fn update(&self, id: &NodeId) {
        let pools = self.snapshot();
        if let Some(health) = pools.work.get(id) {
            health.reset_tick();
            return;
        }
        if let Some(health) = pools
            .work
            .values()
            .chain(pools.back.iter())
            .find(|h| &h.endpoint().id == id)
        {
            health.reset_tick();
        }
    }

    pub fn get_health_from_work(&self, address: &Address) -> Option<Arc<Health>> {
        self.snapshot()
            .work
            .values()
            .find(|h| h.address() == address)
            .cloned()
    }

    /// Look a validator up by public key, working set first
    pub fn get_health(&self, public_key: &PublicKey) -> Option<Arc<Health>> {
        let pools = self.snapshot();
        pools
            .work
            .values()
            .chain(pools.back.iter())
            .find(|h| h.public_key() == public_key)
            .cloned()
    }

    /// One liveness sweep over both pools
    pub fn sweep(&self) {
        let pools = self.snapshot();

        for health in pools.work.values() {
            if health.state() == ValidatorState::Used {
                health.advance_tick();
            }
            self.check_switch_validator(&pools, health);
        }

        for health in &pools.back {
            if health.state() == ValidatorState::Used {
                health.advance_standby_tick();
            }
            self.check_switch_validator(&pools, health);
        }
    }

    fn check_switch_validator(&self, pools: &HealthPools, health: &Arc<Health>) {
        if health.state() != ValidatorState::Used || health.tick() <= self.config.health_out {
            return;
        }

        let active = pools.used_count();
        if active <= self.config.min_validators {
            debug!(
                cid = self.cid,
                active,
                min = self.config.min_validators,
                address = %health.address(),
                "validator stalled but committee is at minimum size"
            );
            return;
        }

        if !health.transition(ValidatorState::Used, ValidatorState::Switching) {
            return;
        }

        let add = self.pick_unused_validator(pools);
        let proposal = self.make_switch_validator(pools, health, add, "health timeout");
        self.emit(proposal);
    }

    /// First `Unused` standby entry in address order, claimed as `Switching`
    fn pick_unused_validator(&self, pools: &HealthPools) -> Option<Arc<Health>> {
        pools
            .back
            .iter()
            .find(|h| h.transition(ValidatorState::Unused, ValidatorState::Switching))
            .cloned()
    }

    fn make_switch_validator(
        &self,
        pools: &HealthPools,
        remove: &Arc<Health>,
        add: Option<Arc<Health>>,
        reason: &str,
    ) -> SwitchValidator {
        let mut vals = Vec::with_capacity(pools.work.len() + 2);
        if let Some(add) = &add {
            vals.push(SwitchEntry::new(*add.public_key(), ValidatorState::Add));
        }
        vals.push(SwitchEntry::new(*remove.public_key(), ValidatorState::Removed));

        let mut working: Vec<&Arc<Health>> = pools.work.values().collect();
        working.sort_by(|a, b| a.address().cmp(b.address()));
        for health in working.into_iter().chain(pools.back.iter()) {
            if health.public_key() != remove.public_key() && health.state() == ValidatorState::Used
            {
                vals.push(SwitchEntry::new(*health.public_key(), ValidatorState::Used));
            }
        }

        SwitchValidator {
            remove: Some(Arc::clone(remove)),
            add,
            infos: SwitchInfos { cid: self.cid, vals },
            reason: reason.to_string(),
            origin: SwitchOrigin::Proposal,
        }
    }

    fn emit(&self, proposal: SwitchValidator) {
        let remove = proposal.remove.as_ref().map(|h| *h.address());
        let add = proposal.add.as_ref().map(|h| *h.address());

        match self.proposal_tx.try_send(proposal) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                info!(cid = self.cid, ?remove, ?add, "proposed validator switch");
            }
            Err(err) => {
                let (cause, proposal) = match err {
                    TrySendError::Full(p) => ("queue full", p),
                    TrySendError::Closed(p) => ("queue closed", p),
                };
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(cid = self.cid, ?remove, ?add, cause, "dropped validator switch proposal");

                // Release the claims so the next sweep proposes again
                if let Some(remove) = &proposal.remove {
                    remove.transition(ValidatorState::Switching, ValidatorState::Used);
                }
                if let Some(add) = &proposal.add {
                    add.transition(ValidatorState::Switching, ValidatorState::Unused);
                }
            }
        }
    }

    /// Queue a switch result for the control loop
    pub fn confirm(&self, result: SwitchValidator) -> Result<(), HealthError> {
        self.confirm_tx.try_send(result).map_err(|err| match err {
            TrySendError::Full(_) => HealthError::ConfirmationQueueFull,
            TrySendError::Closed(_) => HealthError::ChannelClosed,
        })
    }

    /// Apply a switch result. Proposals echoed back are ignored.
    pub fn apply_switch_result(&self, result: SwitchValidator) -> Result<(), HealthError> {
        let outcome = match &result.origin {
            SwitchOrigin::Proposal => {
                debug!(cid = self.cid, "ignoring switch proposal on the result path");
                return Ok(());
            }
            SwitchOrigin::Confirmation(outcome) => outcome,
        };

        let applied = self.apply_confirmation(&result.infos, outcome);
        match &applied {
            Ok(()) => info!(cid = self.cid, result = "success", ?outcome, "switch"),
            Err(err) => warn!(cid = self.cid, result = "failed", error = %err, "switch"),
        }
        applied
    }

    fn apply_confirmation(
        &self,
        infos: &SwitchInfos,
        outcome: &SwitchOutcome,
    ) -> Result<(), HealthError> {
        if infos.cid != self.cid {
            return Err(HealthError::MalformedSwitch(format!(
                "committee {} does not match {}",
                infos.cid, self.cid
            )));
        }

        let (remove_entry, add_entry) = infos.remove_add_pair().ok_or_else(|| {
            HealthError::MalformedSwitch("expected [add?, removed, ..] entries".to_string())
        })?;

        let remove = self
            .get_health(&remove_entry.public_key)
            .ok_or_else(|| HealthError::UnknownValidator(remove_entry.public_key.to_hex()))?;
        let add = match add_entry {
            Some(entry) => Some(
                self.get_health(&entry.public_key)
                    .ok_or_else(|| HealthError::UnknownValidator(entry.public_key.to_hex()))?,
            ),
            None => None,
        };

        if !matches!(
            remove.state(),
            ValidatorState::Used | ValidatorState::Switching
        ) {
            return Err(HealthError::SwitchValidation {
                detail: format!("remove {} is {}", remove_entry, remove.simple_string()),
            });
        }
        if let (Some(add), Some(entry)) = (&add, add_entry) {
            if !matches!(
                add.state(),
                ValidatorState::Unused | ValidatorState::Switching
            ) {
                return Err(HealthError::SwitchValidation {
                    detail: format!("add {} is {}", entry, add.simple_string()),
                });
            }
        }

        match outcome {
            SwitchOutcome::Applied => {
                remove.set_state(ValidatorState::Removed);
                if let Some(add) = &add {
                    add.set_state(ValidatorState::Used);
                }
            }
            SwitchOutcome::Rejected(reason) => {
                debug!(cid = self.cid, reason = %reason, "releasing rejected switch");
                remove.transition(ValidatorState::Switching, ValidatorState::Used);
                if let Some(add) = &add {
                    add.transition(ValidatorState::Switching, ValidatorState::Unused);
                }
            }
        }
        Ok(())
    }

    /// Check a remote substitution against local liveness evidence
    pub fn verify_switch(
        &self,
        remove: &SwitchEntry,
        add: Option<&SwitchEntry>,
    ) -> Result<(), HealthError> {
        let r = self
            .get_health(&remove.public_key)
            .ok_or_else(|| HealthError::UnknownValidator(format!("remove {}", remove)))?;

        let mut snapshot = format!("remove[{}]", r.simple_string());
        let r_ok = matches!(r.state(), ValidatorState::Used | ValidatorState::Switching)
            && r.tick() > self.config.health_out;

        let mut a_ok = true;
        if let Some(entry) = add {
            if let Some(a) = self.get_health(&entry.public_key) {
                a_ok = a.state() != ValidatorState::Removed;
                snapshot.push_str(&format!(" add[{}]", a.simple_string()));
            }
        }

        if r_ok && a_ok {
            return Ok(());
        }

        let add_desc = add.map(|e| e.to_string()).unwrap_or_else(|| "none".to_string());
        Err(HealthError::SwitchValidation {
            detail: format!("wrong state {} remove:{} add:{}", snapshot, remove, add_desc),
        })
    }

    /// Spawn the control loop. Fails if it was already started.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, HealthError> {
        if self.config.sweep_interval.is_zero() {
            return Err(HealthError::ZeroSweepInterval);
        }
        let confirmations = self
            .confirm_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(HealthError::AlreadyStarted)?;
        let shutdown = self.shutdown_tx.subscribe();

        let mgr = Arc::clone(self);
        Ok(tokio::spawn(async move {
            mgr.run(confirmations, shutdown).await;
        }))
    }

    /// Signal the control loop to exit
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    async fn run(
        self: Arc<Self>,
        mut confirmations: mpsc::Receiver<SwitchValidator>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.config.sweep_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(cid = self.cid, ?period, "health manager started");

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                Some(result) = confirmations.recv() => {
                    let _ = self.apply_switch_result(result);
                }

                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        info!(cid = self.cid, "health manager is quit");
    }
}
