//! Error taxonomy for the execution core.
//!
//! Only configuration and initialization failures surface as `Err`; every
//! steady-state remote failure is folded into an [`crate::ExecResult`] with a
//! non-zero exit code so the tool-call surface stays uniform.

use thiserror::Error;

/// Errors that propagate out of the core.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Missing or invalid environment configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote workspace could not be created or probed.
    #[error("workspace initialization failed: {0}")]
    Init(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
