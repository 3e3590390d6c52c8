//! Inputs and outputs of the exec surface.

use serde::{Deserialize, Serialize};

/// One command to run in the remote workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInput {
    /// Argv; joined with spaces and lowered to a shell string before submission.
    pub cmd: Vec<String>,
    /// Host-shaped working directory. Also the session key, verbatim.
    pub workdir: Option<String>,
    /// Forwarded to the remote as whole seconds (floor); 0 or absent forwards nothing.
    pub timeout_ms: Option<u64>,
}

impl ExecInput {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            workdir: None,
            timeout_ms: None,
        }
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Outcome of an exec or patch operation.
///
/// Never an error value: remote failures are reported through a non-zero
/// `exit_code` with the message in `stderr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// A failed result carrying only an error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
        }
    }
}
