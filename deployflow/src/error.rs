//! Fatal error taxonomy.
//!
//! Operations return `anyhow::Result` and attach context as they propagate.
//! When a failure belongs to one of the kinds below, the innermost layer
//! raises a [`DeployError`] so the binary can find it in the chain and pick a
//! stable exit code.

use thiserror::Error;

/// Classified fatal conditions. None of them are retried automatically.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The target string does not name any supported repository form.
    #[error("unsupported target '{0}'")]
    UnsupportedTarget(String),

    /// Cloning, downloading or opening the source failed.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A listed directory or read file does not exist in the repository.
    #[error("not found: {0}")]
    NotFound(String),

    /// The oracle broke the response contract for the current stage.
    #[error("oracle protocol violation: {0}")]
    OracleProtocolViolation(String),

    /// The user declined a confirmation.
    #[error("aborted by user: {0}")]
    UserAborted(String),

    /// The oracle reported that it cannot proceed.
    #[error("oracle halted: {0}")]
    OracleHalted(String),

    /// A destination or workspace directory would clobber existing data.
    #[error("workspace conflict: {0}")]
    WorkspaceConflict(String),

    /// A configured turn ceiling was reached before a terminal state.
    #[error("turn limit of {limit} exceeded in {phase}")]
    TurnLimitExceeded { phase: &'static str, limit: u32 },
}

impl DeployError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::OracleProtocolViolation(msg.into())
    }

    pub fn source_unavailable(err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable(format!("{err:#}"))
    }
}

/// Find the classified error anywhere in an `anyhow` chain.
pub fn classify(err: &anyhow::Error) -> Option<&DeployError> {
    err.chain().find_map(|cause| cause.downcast_ref::<DeployError>())
}
