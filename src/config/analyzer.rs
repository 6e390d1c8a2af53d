//! Analyzer configuration (`~/.cbscan/config.toml`).
//!
//! Every key is optional; a missing file yields [`AnalyzerConfig::default`].
//!
//! ```toml
//! [tools]
//! chef = "chef"
//! berks = "berks"
//! timeout_secs = 300
//!
//! [lockfile]
//! search_depth = 5
//!
//! [workspace]
//! export_dir = "policy-export"
//! vendor_dir = "berks-cookbooks"
//!
//! [analysis]
//! value_display_limit = 80
//! max_tree_depth = 64
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::parse_config;
use crate::constants::{
    CONFIG_ENV_VAR, DEFAULT_BERKS_TOOL, DEFAULT_CHEF_TOOL, DEFAULT_EXPORT_DIR,
    DEFAULT_LOCK_SEARCH_DEPTH, DEFAULT_MAX_TREE_DEPTH, DEFAULT_TOOL_TIMEOUT,
    DEFAULT_VALUE_DISPLAY_LIMIT, DEFAULT_VENDOR_DIR,
};
use crate::core::CbscanError;

/// Top-level configuration for an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// External tool names and limits.
    pub tools: ToolsConfig,
    /// Lock file discovery.
    pub lockfile: LockfileConfig,
    /// Scratch directory names.
    pub workspace: WorkspaceConfig,
    /// Parser and tree builder limits.
    pub analysis: AnalysisConfig,
}

/// `[tools]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Executable used for the Policyfile workflow.
    pub chef: String,
    /// Executable used for the Berkshelf workflow.
    pub berks: String,
    /// Timeout applied to every external invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            chef: DEFAULT_CHEF_TOOL.to_string(),
            berks: DEFAULT_BERKS_TOOL.to_string(),
            timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
        }
    }
}

impl ToolsConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[lockfile]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockfileConfig {
    /// Number of ancestor directories searched for `Policyfile.lock.json`.
    pub search_depth: usize,
}

impl Default for LockfileConfig {
    fn default() -> Self {
        Self {
            search_depth: DEFAULT_LOCK_SEARCH_DEPTH,
        }
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory name `chef export` output is copied into.
    pub export_dir: String,
    /// Directory name `berks vendor` writes into.
    pub vendor_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            export_dir: DEFAULT_EXPORT_DIR.to_string(),
            vendor_dir: DEFAULT_VENDOR_DIR.to_string(),
        }
    }
}

/// `[analysis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum characters of an attribute value kept for display.
    pub value_display_limit: usize,
    /// Maximum recipe include depth followed by the tree builder.
    pub max_tree_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            value_display_limit: DEFAULT_VALUE_DISPLAY_LIMIT,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from an explicit path, `$CBSCAN_CONFIG`, or the
    /// default location, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an explicitly requested file does not exist.
    pub fn load_with_optional(path: Option<&str>) -> Result<Self> {
        if let Some(explicit) = path {
            let resolved = expand_path(explicit)?;
            if !resolved.exists() {
                return Err(CbscanError::ConfigError {
                    message: format!("config file {} does not exist", resolved.display()),
                }
                .into());
            }
            return Self::load_from(&resolved);
        }

        if let Ok(from_env) = std::env::var(CONFIG_ENV_VAR)
            && !from_env.is_empty()
        {
            let resolved = expand_path(&from_env)?;
            if resolved.exists() {
                return Self::load_from(&resolved);
            }
            tracing::debug!("{} points to missing file {}", CONFIG_ENV_VAR, resolved.display());
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::load_from(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = parse_config(path)?;
        config.validate().with_context(|| format!("Invalid config in {}", path.display()))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `~/.cbscan/config.toml`, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".cbscan").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.tools.timeout_secs == 0 {
            return Err(CbscanError::ConfigError {
                message: "tools.timeout_secs must be greater than zero".to_string(),
            }
            .into());
        }
        for (key, value) in [
            ("workspace.export_dir", &self.workspace.export_dir),
            ("workspace.vendor_dir", &self.workspace.vendor_dir),
        ] {
            if value.is_empty() || value.contains('/') || value.contains('\\') || value == ".." {
                return Err(CbscanError::ConfigError {
                    message: format!("{key} must be a plain directory name, got '{value}'"),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand config path '{raw}'"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.tools.chef, "chef");
        assert_eq!(config.tools.berks, "berks");
        assert_eq!(config.tools.timeout(), DEFAULT_TOOL_TIMEOUT);
        assert_eq!(config.lockfile.search_depth, 5);
        assert_eq!(config.workspace.export_dir, "policy-export");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[tools]\ntimeout_secs = 12\n\n[analysis]\nmax_tree_depth = 3\n")
            .unwrap();

        let config = AnalyzerConfig::load_from(&path).unwrap();
        assert_eq!(config.tools.timeout_secs, 12);
        assert_eq!(config.tools.chef, "chef");
        assert_eq!(config.analysis.max_tree_depth, 3);
        assert_eq!(config.analysis.value_display_limit, DEFAULT_VALUE_DISPLAY_LIMIT);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[tools]\ntimeout_secs = 0\n").unwrap();

        assert!(AnalyzerConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_rejects_nested_export_dir() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[workspace]\nexport_dir = \"a/b\"\n").unwrap();

        assert!(AnalyzerConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.toml");
        let result = AnalyzerConfig::load_with_optional(Some(missing.to_str().unwrap()));
        assert!(result.is_err());
    }
}
