//! External tool port.
//!
//! The dependency strategies never spawn processes directly. They describe an
//! invocation with [`ToolCommand`] and hand it to a [`ToolRunner`], which
//! answers two questions: "is tool X on PATH" and "run tool X with these
//! arguments". [`SystemToolRunner`] is the real implementation; tests supply
//! their own runner that records calls and fakes the tool's side effects.

pub mod command;
pub mod runner;

use anyhow::Result;
use std::future::Future;

pub use command::ToolCommand;
pub use runner::SystemToolRunner;

use crate::core::CbscanError;

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Capability to locate and run external tools.
pub trait ToolRunner: Send + Sync {
    /// Whether `tool` can be executed.
    fn is_available(&self, tool: &str) -> bool;

    /// Run a command to completion, honoring its timeout.
    ///
    /// Implementations must return [`CbscanError::ToolFailed`] on a non-zero
    /// exit and [`CbscanError::ToolTimeout`] when the timeout elapses.
    fn run(&self, command: &ToolCommand) -> impl Future<Output = Result<ToolOutput>> + Send;

    /// Precondition check: fails with [`CbscanError::ToolNotFound`] when the
    /// tool is missing.
    fn require(&self, tool: &str) -> Result<(), CbscanError> {
        if self.is_available(tool) {
            Ok(())
        } else {
            Err(CbscanError::ToolNotFound {
                tool: tool.to_string(),
            })
        }
    }
}
