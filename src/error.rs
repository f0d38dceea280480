//! Internal sandbox errors.
//!
//! These never cross the public boundary: `Sandbox::run` converts them into
//! `ExecutionResult::Failed` so callers always receive a result value.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// The temporary script could not be created or written
    #[error("could not prepare script file: {0}")]
    ScriptFile(#[source] std::io::Error),

    /// The interpreter process could not be started
    #[error("failed to launch '{}': {source}", .interpreter.display())]
    Launch {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed after it started
    #[error("failed while waiting for the program: {0}")]
    Wait(#[source] std::io::Error),

    /// The timeout is zero, negative, NaN or too large to represent
    #[error("invalid timeout: {0} seconds")]
    InvalidTimeout(f64),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
