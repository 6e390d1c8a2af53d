//! In-memory [`ToolRunner`] for tests.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::core::CbscanError;
use crate::tools::{ToolCommand, ToolOutput, ToolRunner};

/// Records every invocation and imitates the side effects strategies rely on.
///
/// - Only tools registered with [`FakeRunner::with_tool`] are "on PATH".
/// - `export` / `vendor` create each [`FakeRunner::materialize`] entry under
///   the last absolute-path argument (the output directory).
/// - [`FakeRunner::respond`] sets stdout per operation.
/// - [`FakeRunner::fail_on`] makes one operation exit non-zero.
#[derive(Debug, Default)]
pub struct FakeRunner {
    tools: HashSet<String>,
    responses: HashMap<String, String>,
    failing: Option<String>,
    materialize: Vec<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    /// Runner with no tools available.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `tool` as installed.
    #[must_use]
    pub fn with_tool(mut self, tool: &str) -> Self {
        self.tools.insert(tool.to_string());
        self
    }

    /// Stdout returned for `operation`.
    #[must_use]
    pub fn respond(mut self, operation: &str, stdout: &str) -> Self {
        self.responses.insert(operation.to_string(), stdout.to_string());
        self
    }

    /// Fail `operation` with exit code 1.
    #[must_use]
    pub fn fail_on(mut self, operation: &str) -> Self {
        self.failing = Some(operation.to_string());
        self
    }

    /// Relative directories created by `export` / `vendor`.
    #[must_use]
    pub fn materialize<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.materialize.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Every invocation so far as `[program, args...]`.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl ToolRunner for FakeRunner {
    fn is_available(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }

    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        let mut call = vec![command.program().to_string()];
        call.extend(command.arguments().iter().cloned());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        let operation = command.operation();
        if self.failing.as_deref() == Some(operation.as_str()) {
            return Err(CbscanError::ToolFailed {
                tool: command.program().to_string(),
                operation,
                stderr: "simulated failure".to_string(),
                code: Some(1),
            }
            .into());
        }

        if matches!(operation.as_str(), "export" | "vendor")
            && let Some(out) = command.arguments().iter().rev().find(|a| Path::new(a).is_absolute())
        {
            let out = Path::new(out);
            std::fs::create_dir_all(out)?;
            for dir in &self.materialize {
                std::fs::create_dir_all(out.join(dir))?;
            }
        }

        Ok(ToolOutput {
            stdout: self.responses.get(&operation).cloned().unwrap_or_default(),
            stderr: String::new(),
        })
    }
}
