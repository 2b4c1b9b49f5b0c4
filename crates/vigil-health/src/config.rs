use std::time::Duration;

/// Sweeps of silence after which a working validator is considered stalled
/// (ten minutes at the default one-second sweep).
pub const HEALTH_OUT: u32 = 60 * 10;

/// The active committee must stay strictly above this size for a
/// substitution to be proposed.
pub const MIX_VALIDATOR: usize = 4;

/// Configuration for the health manager
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Tick threshold; a validator is stalled once its tick exceeds it
    pub health_out: u32,
    /// Minimum active committee size (exclusive)
    pub min_validators: usize,
    /// Liveness sweep period
    pub sweep_interval: Duration,
    /// Capacity of the outbound proposal queue; proposals beyond it are dropped
    pub proposal_capacity: usize,
    /// Capacity of the inbound confirmation queue
    pub confirmation_capacity: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            health_out: HEALTH_OUT,
            min_validators: MIX_VALIDATOR,
            sweep_interval: Duration::from_secs(1),
            proposal_capacity: 16,
            confirmation_capacity: 16,
        }
    }
}
