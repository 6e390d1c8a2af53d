//! Configuration management for cbscan.
//!
//! - [`analyzer`] - the user-level [`AnalyzerConfig`] (tool names, timeouts,
//!   scratch directory names, analysis limits)
//! - [`parser`] - generic TOML loading with file-path error context
//!
//! The configuration is resolved once per CLI invocation and passed down
//! explicitly; nothing in the analysis core reads it from global state.

pub mod analyzer;
pub mod parser;

pub use analyzer::{AnalysisConfig, AnalyzerConfig, LockfileConfig, ToolsConfig, WorkspaceConfig};
pub use parser::parse_config;
