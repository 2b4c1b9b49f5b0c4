use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Health manager already started")]
    AlreadyStarted,

    #[error("Sweep interval must be non-zero")]
    ZeroSweepInterval,

    #[error("Validator not found: {0}")]
    UnknownValidator(String),

    #[error("Malformed switch payload: {0}")]
    MalformedSwitch(String),

    #[error("Switch rejected: {detail}")]
    SwitchValidation { detail: String },

    #[error("Confirmation queue is full")]
    ConfirmationQueueFull,

    #[error("Health manager channel closed")]
    ChannelClosed,
}
