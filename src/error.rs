use thiserror::Error;

/// Failure taxonomy for the burn tool. Every fallible path funnels into one
/// of these so the dispatcher can exit non-zero with a single diagnostic.
#[derive(Debug, Error)]
pub enum BurnError {
    #[error("invalid usage: {0}")]
    Config(String),

    #[error("{0} command not found in PATH")]
    ToolMissing(&'static str),

    #[error("failed to launch detached worker: {0}")]
    Launch(String),

    #[error("{0}")]
    Discovery(String),

    #[error("binding pid {pid} to core {core} failed: {reason}")]
    Bind { core: u32, pid: u32, reason: String },

    #[error("kill command failed: {0}")]
    Kill(String),
}
