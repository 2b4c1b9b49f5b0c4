//! Vigil Health - Validator liveness tracking and committee failover
//!
//! This crate keeps a liveness record per validator, sweeps them on a fixed
//! interval, and proposes substitutions of stalled working validators with
//! standby ones.

pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod switch;

pub use config::{HealthConfig, HEALTH_OUT, MIX_VALIDATOR};
pub use error::HealthError;
pub use health::Health;
pub use manager::{HealthMgr, HealthPools, HealthStats};
pub use switch::{SwitchOrigin, SwitchOutcome, SwitchValidator};
