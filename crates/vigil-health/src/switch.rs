use std::fmt;
use std::sync::Arc;

use vigil_core::SwitchInfos;

use crate::health::Health;

/// Result reported back by the reconfiguration path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Applied,
    Rejected(String),
}

/// Where a [`SwitchValidator`] came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOrigin {
    /// Emitted by the local liveness sweep
    Proposal,
    /// Fed back after the substitution went through reconfiguration
    Confirmation(SwitchOutcome),
}

/// A proposed or confirmed substitution of one working validator
#[derive(Clone)]
pub struct SwitchValidator {
    pub remove: Option<Arc<Health>>,
    pub add: Option<Arc<Health>>,
    pub infos: SwitchInfos,
    pub reason: String,
    pub origin: SwitchOrigin,
}

impl SwitchValidator {
    /// Confirmation for a substitution described by `infos`.
    ///
    /// Only the membership snapshot crosses the reconfiguration boundary,
    /// so the health records are resolved again on arrival.
    pub fn confirmation(infos: SwitchInfos, outcome: SwitchOutcome) -> Self {
        SwitchValidator {
            remove: None,
            add: None,
            infos,
            reason: String::new(),
            origin: SwitchOrigin::Confirmation(outcome),
        }
    }

    /// Turn a received proposal into its confirmation
    pub fn confirm(self, outcome: SwitchOutcome) -> Self {
        SwitchValidator {
            origin: SwitchOrigin::Confirmation(outcome),
            ..self
        }
    }
}

impl fmt::Debug for SwitchValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchValidator")
            .field("remove", &self.remove.as_ref().map(|h| *h.address()))
            .field("add", &self.add.as_ref().map(|h| *h.address()))
            .field("cid", &self.infos.cid)
            .field("vals", &self.infos.vals.len())
            .field("reason", &self.reason)
            .field("origin", &self.origin)
            .finish()
    }
}
