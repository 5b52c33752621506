//! External Command Execution
//!
//! Abstracts subprocess invocation so device CLI tools can be scripted in
//! tests without spawning real processes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Captured output of one finished subprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit status code; `None` when the process was killed by a signal
    pub status: Option<i32>,
    /// Captured stdout, lossily decoded as UTF-8
    pub stdout: String,
    /// Captured stderr, lossily decoded as UTF-8
    pub stderr: String,
}

impl CommandOutput {
    /// True when the process exited with status 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Subprocess runner trait
///
/// Runs an external program to completion and captures its output. A failure
/// to *launch* the program (not installed, not executable) is an error;
/// a program that launches and exits non-zero is a successful `run` whose
/// [`CommandOutput::success`] is false. Callers decide what a non-zero exit
/// means for them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::command::CommandRunner;
///
/// async fn list_udids(runner: &dyn CommandRunner) -> Vec<String> {
///     match runner.run("idevice_id", &["-l"]).await {
///         Ok(output) => output.stdout.lines().map(str::to_string).collect(),
///         Err(_) => Vec::new(),
///     }
/// }
/// ```
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, wait for exit, capture stdout and stderr
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::NotAvailable`] when the program cannot
    /// be launched at all, or an IO error for other spawn failures.
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_exit() {
        let ok = CommandOutput {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        };
        let failed = CommandOutput {
            status: Some(255),
            ..Default::default()
        };
        let killed = CommandOutput {
            status: None,
            ..Default::default()
        };

        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }
}
