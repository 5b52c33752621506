//! Command Runner Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    command::{CommandOutput, CommandRunner},
    error::{BridgeError, Result},
};
use tokio::process::Command;
use tracing::debug;

/// Tokio-based subprocess runner
///
/// Spawns the program, waits for it to exit, and captures both output
/// streams. Stdin is closed so tools that prompt interactively fail fast
/// instead of hanging on input.
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error from spawn into BridgeError
    fn map_spawn_error(program: &str, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotAvailable(program.to_string())
        } else {
            BridgeError::Io(e)
        }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| Self::map_spawn_error(program, e))?;

        let captured = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            program,
            status = ?captured.status,
            stdout_len = captured.stdout.len(),
            "Ran external command"
        );
        Ok(captured)
    }
}
