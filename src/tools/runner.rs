//! Process-backed [`ToolRunner`] implementation.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ToolCommand, ToolOutput, ToolRunner};
use crate::core::CbscanError;
use crate::utils::platform::command_exists;

/// Runs tools as real subprocesses with `tokio::process`.
///
/// Output is always captured. A timed-out child is killed (`kill_on_drop`)
/// and reported as [`CbscanError::ToolTimeout`]; a non-zero exit becomes
/// [`CbscanError::ToolFailed`]. No retries are attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ToolRunner for SystemToolRunner {
    fn is_available(&self, tool: &str) -> bool {
        command_exists(tool)
    }

    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        let start = std::time::Instant::now();
        let rendered = command.display();
        let label = command.context.as_deref().unwrap_or("-");

        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments());
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env_vars {
            tracing::trace!(target: "tools", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(target: "tools", "({}) Executing command: {}", label, rendered);

        let output = match timeout(command.timeout(), cmd.output()).await {
            Ok(result) => {
                result.with_context(|| format!("Failed to execute {rendered}"))?
            }
            Err(_) => {
                tracing::warn!(
                    target: "tools",
                    "({}) Command timed out after {} seconds: {}",
                    label,
                    command.timeout().as_secs(),
                    rendered
                );
                return Err(CbscanError::ToolTimeout {
                    tool: command.program().to_string(),
                    operation: command.operation(),
                    seconds: command.timeout().as_secs(),
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "tools",
                "({}) Command failed with exit code: {:?}",
                label,
                output.status.code()
            );
            return Err(CbscanError::ToolFailed {
                tool: command.program().to_string(),
                operation: command.operation(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
                code: output.status.code(),
            }
            .into());
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(target: "tools", "({}) {}", label, stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "tools::perf",
                "({}) {} took {:.2}s",
                label,
                rendered,
                elapsed.as_secs_f64()
            );
        }

        Ok(ToolOutput {
            stdout,
            stderr,
        })
    }
}
