//! Builder describing one external tool invocation.
//!
//! A [`ToolCommand`] is plain data: program, arguments, working directory,
//! timeout and a context label for logs. Executing it is the job of a
//! [`ToolRunner`](super::ToolRunner), which keeps strategy code testable
//! without real binaries.
//!
//! ```rust,ignore
//! use cbscan_cli::tools::ToolCommand;
//! use std::time::Duration;
//!
//! let cmd = ToolCommand::new("berks")
//!     .args(["list", "--format", "json"])
//!     .current_dir("/path/to/cookbook")
//!     .with_timeout(Duration::from_secs(60))
//!     .with_context("nginx");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::DEFAULT_TOOL_TIMEOUT;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable name or path.
    pub(crate) program: String,

    /// Arguments passed to the executable.
    pub(crate) args: Vec<String>,

    /// Working directory (defaults to the process directory).
    pub(crate) current_dir: Option<PathBuf>,

    /// Extra environment variables.
    pub(crate) env_vars: Vec<(String, String)>,

    /// Hard limit on the run time.
    pub(crate) timeout: Duration,

    /// Label included in log lines (typically the cookbook name).
    pub(crate) context: Option<String>,
}

impl ToolCommand {
    /// Creates a command for `program` with the default timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            context: None,
        }
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds an environment variable for this invocation only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Overrides the timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets a context label for logging.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The executable.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument list.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// The timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The first argument, used as the operation name in errors.
    #[must_use]
    pub fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Rendered command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_basic() {
        let cmd = ToolCommand::new("berks").arg("list").args(["--format", "json"]);
        assert_eq!(cmd.program(), "berks");
        assert_eq!(cmd.arguments(), ["list", "--format", "json"]);
        assert_eq!(cmd.operation(), "list");
        assert_eq!(cmd.display(), "berks list --format json");
        assert_eq!(cmd.timeout(), DEFAULT_TOOL_TIMEOUT);
    }

    #[test]
    fn test_command_builder_with_dir_and_timeout() {
        let cmd = ToolCommand::new("chef")
            .current_dir("/tmp/cookbook")
            .with_timeout(Duration::from_secs(5))
            .with_context("web");
        assert_eq!(cmd.working_dir(), Some(Path::new("/tmp/cookbook")));
        assert_eq!(cmd.timeout(), Duration::from_secs(5));
        assert_eq!(cmd.context.as_deref(), Some("web"));
        assert_eq!(cmd.operation(), "unknown");
    }
}
