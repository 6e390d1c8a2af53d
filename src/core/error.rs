//! Error handling for cbscan
//!
//! This module provides the error types and user-friendly error reporting for the
//! cookbook scanner. The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can react to specific failure modes
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Configuration**: [`CbscanError::NoStrategyDetected`], [`CbscanError::ToolNotFound`],
//!   [`CbscanError::ConfigError`]
//! - **External tools**: [`CbscanError::ToolFailed`], [`CbscanError::ToolTimeout`]
//! - **Malformed input**: [`CbscanError::MalformedLockFile`]
//! - **Resolution misses**: [`CbscanError::RecipeNotFound`], [`CbscanError::CookbookNotFound`]
//!
//! Resolution misses are only raised at the outer CLI boundary (for example when
//! the entry recipe itself cannot be found). Inside the analysis core they are
//! recorded as gaps and the run continues.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cbscan_cli::core::{CbscanError, user_friendly_error};
//!
//! let error = CbscanError::ToolNotFound { tool: "berks".to_string() };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // colored error with a suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for cbscan operations.
#[derive(Error, Debug, Clone)]
pub enum CbscanError {
    /// No dependency resolution mechanism was found for a cookbook directory.
    ///
    /// Raised when neither a policy lock file (in the directory or one of its
    /// ancestors) nor a `Berksfile` + `metadata.rb` pair is present.
    #[error("No dependency resolution strategy detected for {path}")]
    NoStrategyDetected {
        /// The cookbook directory that was inspected
        path: String,
        /// Marker files that would have selected a strategy
        expected: Vec<String>,
    },

    /// A required external tool is not on the executable search path.
    #[error("Required tool '{tool}' is not installed or not found in PATH")]
    ToolNotFound {
        /// Executable name that was looked up
        tool: String,
    },

    /// An external tool exited with a non-zero status.
    #[error("'{tool} {operation}' failed")]
    ToolFailed {
        /// Executable that was run
        tool: String,
        /// Subcommand that failed (e.g. "install", "export")
        operation: String,
        /// Captured standard error (or stdout when stderr was empty)
        stderr: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
    },

    /// An external tool did not finish within the configured timeout.
    #[error("'{tool} {operation}' timed out after {seconds} seconds")]
    ToolTimeout {
        /// Executable that was run
        tool: String,
        /// Subcommand that timed out
        operation: String,
        /// The timeout that elapsed
        seconds: u64,
    },

    /// The lock document is not valid JSON or lacks the expected sections.
    #[error("Malformed lock file {file}: {reason}")]
    MalformedLockFile {
        /// Path (or label) of the lock document
        file: String,
        /// Underlying parse error or the missing section
        reason: String,
    },

    /// A recipe reference could not be resolved to a file.
    #[error("Recipe '{name}' not found in any cookbook directory")]
    RecipeNotFound {
        /// The `cookbook::recipe` reference
        name: String,
    },

    /// A cookbook could not be located.
    #[error("Cookbook '{name}' not found")]
    CookbookNotFound {
        /// Cookbook name
        name: String,
    },

    /// Configuration file problem.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// File system operation failed.
    #[error("File system error during {operation}: {path}")]
    FileSystemError {
        /// What was being attempted
        operation: String,
        /// Path involved
        path: String,
    },

    /// Catch-all with a free-form message.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Error wrapper carrying a user-facing suggestion and extra details.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: CbscanError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: CbscanError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Returns true when the error chain contains a tool failure or timeout.
///
/// Callers use this to decide whether to fall back to local-only cookbooks
/// instead of aborting the run.
#[must_use]
pub fn is_tool_failure(error: &anyhow::Error) -> bool {
    matches!(
        find_cbscan_error(error),
        Some(CbscanError::ToolFailed { .. } | CbscanError::ToolTimeout { .. })
    )
}

/// The first [`CbscanError`] in the chain, whether it was the source of the
/// error or attached as context.
fn find_cbscan_error(error: &anyhow::Error) -> Option<&CbscanError> {
    error
        .downcast_ref::<CbscanError>()
        .or_else(|| error.chain().find_map(|c| c.downcast_ref::<CbscanError>()))
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Recognizes [`CbscanError`] anywhere in the chain, plus common I/O and
/// JSON errors; everything else is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(cbscan_error) = find_cbscan_error(&error) {
        return create_error_context(cbscan_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(CbscanError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check file ownership and permissions of the cookbook tree")
                .with_details(io_error.to_string());
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(CbscanError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the cookbook path exists and is spelled correctly")
                .with_details(io_error.to_string());
            }
            _ => {}
        }
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(CbscanError::Other {
        message,
    })
}

fn create_error_context(error: CbscanError) -> ErrorContext {
    match &error {
        CbscanError::NoStrategyDetected { expected, .. } => {
            let expected = expected.join(", ");
            ErrorContext::new(error)
                .with_suggestion(format!("Add one of the following to the cookbook: {expected}"))
                .with_details(
                    "cbscan needs a Policyfile.lock.json (in the cookbook or up to a few parent \
                     directories) or a Berksfile next to metadata.rb to find dependencies",
                )
        }
        CbscanError::ToolNotFound { tool } => {
            let hint = match tool.as_str() {
                "berks" => "Install Berkshelf ('gem install berkshelf') or Chef Workstation",
                _ => "Install Chef Workstation from https://www.chef.io/downloads",
            };
            ErrorContext::new(error.clone())
                .with_suggestion(hint)
                .with_details("External tools must be available in PATH before dependencies can be fetched")
        }
        CbscanError::ToolFailed { stderr, .. } => {
            let details = stderr.lines().take(10).collect::<Vec<_>>().join("\n");
            ErrorContext::new(error.clone())
                .with_suggestion("Run the command manually in the cookbook directory to see the full output, or omit --fetch to analyze local cookbooks only")
                .with_details(details)
        }
        CbscanError::ToolTimeout { .. } => ErrorContext::new(error)
            .with_suggestion("Raise [tools] timeout_secs in the cbscan config, or check network access to the supermarket")
            .with_details("The external tool was stopped after the timeout elapsed; no retry was attempted"),
        CbscanError::MalformedLockFile { .. } => ErrorContext::new(error)
            .with_suggestion("Regenerate the lock file with 'chef install' and try again")
            .with_details("The lock document must contain 'cookbook_locks' and 'solution_dependencies'"),
        CbscanError::RecipeNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Check the --recipe value; use 'cookbook::recipe' or a bare cookbook name for its default recipe"),
        CbscanError::CookbookNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Check the cookbook name, or pass --fetch so dependencies are materialized first"),
        CbscanError::ConfigError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax of your cbscan config file"),
        CbscanError::FileSystemError { .. } | CbscanError::Other { .. } => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let error = CbscanError::ToolTimeout {
            tool: "chef".to_string(),
            operation: "install".to_string(),
            seconds: 30,
        };
        assert_eq!(error.to_string(), "'chef install' timed out after 30 seconds");
    }

    #[test]
    fn test_user_friendly_error_finds_typed_error_in_chain() {
        let error = Err::<(), _>(CbscanError::ToolNotFound {
            tool: "berks".to_string(),
        })
        .context("Fetching dependencies")
        .unwrap_err();

        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, CbscanError::ToolNotFound { .. }));
        assert!(ctx.suggestion.unwrap().contains("Berkshelf"));
    }

    #[test]
    fn test_is_tool_failure() {
        let failed = anyhow::Error::from(CbscanError::ToolFailed {
            tool: "chef".to_string(),
            operation: "export".to_string(),
            stderr: "boom".to_string(),
            code: Some(1),
        })
        .context("fetch");
        assert!(is_tool_failure(&failed));

        let missing = anyhow::Error::from(CbscanError::ToolNotFound {
            tool: "chef".to_string(),
        });
        assert!(!is_tool_failure(&missing));
    }

    #[test]
    fn test_typed_context_is_recognized() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = anyhow::Error::new(io).context(CbscanError::FileSystemError {
            operation: "open cookbook directory".to_string(),
            path: "/nowhere".to_string(),
        });

        let ctx = user_friendly_error(error);
        assert!(ctx.to_string().contains("/nowhere"));
    }

    #[test]
    fn test_generic_error_keeps_chain() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let ctx = user_friendly_error(error);
        let rendered = ctx.to_string();
        assert!(rendered.contains("outer"));
        assert!(rendered.contains("root cause"));
    }
}
