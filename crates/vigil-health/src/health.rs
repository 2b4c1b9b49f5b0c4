use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

use vigil_core::{Address, NodeEndpoint, PublicKey, ValidatorIdentity, ValidatorState};

/// Liveness record of one validator.
///
/// `tick` and `state` are atomics so the sweep, network handlers and the
/// reconfiguration path can touch a record without a shared lock. Transitions
/// that must be exclusive go through [`Health::transition`].
pub struct Health {
    public_key: PublicKey,
    address: Address,
    endpoint: RwLock<NodeEndpoint>,
    tick: AtomicU32,
    /// Advanced instead of `tick` while a `Used` record sits in the standby pool
    standby_tick: AtomicU32,
    state: AtomicU8,
}

impl Health {
    pub fn new(identity: ValidatorIdentity, state: ValidatorState) -> Self {
        Health {
            public_key: identity.public_key,
            address: identity.address,
            endpoint: RwLock::new(identity.endpoint),
            tick: AtomicU32::new(0),
            standby_tick: AtomicU32::new(0),
            state: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_endpoint(&self, endpoint: NodeEndpoint) {
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = endpoint;
    }

    pub fn tick(&self) -> u32 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn standby_tick(&self) -> u32 {
        self.standby_tick.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ValidatorState {
        // Only valid discriminants are ever stored
        ValidatorState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ValidatorState::Unused)
    }

    /// Advance the primary counter, returning the new value
    pub(crate) fn advance_tick(&self) -> u32 {
        self.tick.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    pub(crate) fn advance_standby_tick(&self) -> u32 {
        self.standby_tick.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Fresh liveness evidence arrived
    pub fn reset_tick(&self) {
        self.tick.store(0, Ordering::Release);
    }

    /// Compare-and-swap the state. Returns false if the record was not in `from`.
    pub fn transition(&self, from: ValidatorState, to: ValidatorState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_state(&self, to: ValidatorState) {
        self.state.store(to.as_u8(), Ordering::Release);
    }

    /// Short `state:<s>,tick:<t>` form used in switch diagnostics
    pub fn simple_string(&self) -> String {
        format!("state:{},tick:{}", self.state(), self.tick())
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.endpoint();
        write!(
            f,
            "id:{},ip:{},port:{},tick:{},state:{},addr:{}",
            endpoint.id,
            endpoint.ip,
            endpoint.port,
            self.tick(),
            self.state(),
            self.address
        )
    }
}

impl fmt::Debug for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Health")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("tick", &self.tick())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{KeyPair, NodeId};

    fn record(state: ValidatorState) -> Health {
        let kp = KeyPair::generate();
        let endpoint = NodeEndpoint::new(NodeId::new("node-1"), "10.0.0.1", 30303);
        Health::new(ValidatorIdentity::new(kp.public, endpoint), state)
    }

    #[test]
    fn test_tick_advance_and_reset() {
        let health = record(ValidatorState::Used);
        assert_eq!(health.advance_tick(), 1);
        assert_eq!(health.advance_tick(), 2);
        health.reset_tick();
        assert_eq!(health.tick(), 0);
        assert_eq!(health.standby_tick(), 0);
    }

    #[test]
    fn test_transition_is_exclusive() {
        let health = record(ValidatorState::Used);
        assert!(health.transition(ValidatorState::Used, ValidatorState::Switching));
        // Second attempt loses: already switching
        assert!(!health.transition(ValidatorState::Used, ValidatorState::Switching));
        assert_eq!(health.state(), ValidatorState::Switching);
    }

    #[test]
    fn test_endpoint_update_keeps_liveness() {
        let health = record(ValidatorState::Used);
        health.advance_tick();
        health.set_endpoint(NodeEndpoint::new(NodeId::new("node-2"), "10.0.0.2", 30304));

        assert_eq!(health.endpoint().id, NodeId::new("node-2"));
        assert_eq!(health.tick(), 1);
        assert_eq!(health.state(), ValidatorState::Used);
        assert_eq!(health.simple_string(), "state:used,tick:1");
    }
}
