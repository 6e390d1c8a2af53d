//! Shared plumbing for the analysis commands.
//!
//! Every command runs the same lifecycle: detect the dependency strategy,
//! optionally fetch dependencies, work against the local cookbooks plus
//! whatever was fetched, then clean up the scratch directory. [`Session`]
//! owns that lifecycle so commands only implement their output.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::analysis::{StructuralAnalysis, collect_cookbooks, is_cookbook_root};
use crate::config::AnalyzerConfig;
use crate::core::{CbscanError, is_tool_failure};
use crate::parser::ParseOptions;
use crate::strategy::{DependencySpec, DependencyStrategy, ResolvedDependencies, cookbook_name_for};
use crate::tools::ToolRunner;
use crate::utils::Spinner;

/// Settings resolved once per invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub config: AnalyzerConfig,
    /// Suppress spinners
    pub no_progress: bool,
}

impl CommandContext {
    /// A spinner, or a hidden one under `--no-progress`.
    #[must_use]
    pub fn spinner(&self, msg: impl Into<String>) -> Spinner {
        if self.no_progress {
            Spinner::hidden()
        } else {
            Spinner::start(msg)
        }
    }
}

/// What a command needs from the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Run the strategy's fetch step
    pub fetch: bool,
    /// Fail when no strategy applies instead of analyzing local files only
    pub require_strategy: bool,
}

/// One analysis run over a cookbook directory.
#[derive(Debug)]
pub struct Session<R: ToolRunner> {
    /// Canonical directory the command was pointed at
    pub cookbook_dir: PathBuf,
    /// Name of the cookbook under analysis
    pub name: String,
    strategy: Option<DependencyStrategy<R>>,
    /// Dependencies reported by fetch, or declared ones without it
    pub dependencies: Vec<DependencySpec>,
    /// On-disk locations of fetched dependencies
    pub resolved: ResolvedDependencies,
    /// A fetch was requested but failed with a tool error
    pub fetch_failed: bool,
}

impl<R: ToolRunner> Session<R> {
    /// Detect the strategy for `dir` and fetch when asked.
    ///
    /// A tool failure during fetch is logged and the session continues with
    /// local cookbooks only. Any other error cleans up before returning.
    ///
    /// # Errors
    ///
    /// Missing directory, malformed lock file, missing tool, or no strategy
    /// when one is required.
    pub async fn open(
        dir: &Path,
        runner: R,
        ctx: &CommandContext,
        options: SessionOptions,
    ) -> Result<Self> {
        let cookbook_dir = dir.canonicalize().map_err(|e| {
            anyhow::Error::new(e).context(CbscanError::FileSystemError {
                operation: "open cookbook directory".to_string(),
                path: dir.display().to_string(),
            })
        })?;

        let strategy = match DependencyStrategy::detect(&cookbook_dir, runner, &ctx.config) {
            Ok(strategy) => Some(strategy),
            Err(e)
                if !options.fetch
                    && !options.require_strategy
                    && matches!(
                        e.downcast_ref::<CbscanError>(),
                        Some(CbscanError::NoStrategyDetected { .. })
                    ) =>
            {
                tracing::debug!("No dependency strategy for {}: {e}", cookbook_dir.display());
                None
            }
            Err(e) => return Err(e),
        };

        let name = strategy
            .as_ref()
            .map_or_else(|| cookbook_name_for(&cookbook_dir), DependencyStrategy::detect_name);

        let mut session = Self {
            cookbook_dir,
            name,
            strategy,
            dependencies: Vec::new(),
            resolved: ResolvedDependencies::default(),
            fetch_failed: false,
        };

        if options.fetch {
            if let Err(e) = session.fetch(ctx).await {
                session.cleanup();
                return Err(e);
            }
        } else if let Some(strategy) = &session.strategy {
            session.dependencies = strategy.declared_dependencies();
        }
        Ok(session)
    }

    async fn fetch(&mut self, ctx: &CommandContext) -> Result<()> {
        let Some(strategy) = self.strategy.as_mut() else {
            return Ok(());
        };

        let spinner = ctx.spinner(format!("Fetching dependencies ({})", strategy.kind_name()));
        let result = strategy.fetch().await;
        spinner.finish_and_clear();

        match result {
            Ok(deps) => {
                self.resolved = strategy.dependency_paths(&deps);
                self.dependencies = deps;
                Ok(())
            }
            Err(e) if is_tool_failure(&e) => {
                tracing::warn!("{e:#}; continuing with local cookbooks only");
                self.dependencies = strategy.declared_dependencies();
                self.fetch_failed = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The detected strategy, if any.
    #[must_use]
    pub const fn strategy(&self) -> Option<&DependencyStrategy<R>> {
        self.strategy.as_ref()
    }

    /// Strategy name for reports.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.as_ref().map_or("none", DependencyStrategy::kind_name)
    }

    /// Ordered directories for the path resolver and the collector.
    ///
    /// A cookbook root also contributes its parent so sibling cookbooks
    /// resolve; fetched dependencies come last.
    #[must_use]
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.cookbook_dir.clone()];
        if is_cookbook_root(&self.cookbook_dir)
            && let Some(parent) = self.cookbook_dir.parent()
        {
            dirs.push(parent.to_path_buf());
        }
        dirs.extend(self.resolved.resolved.iter().map(|dep| dep.path.clone()));
        dirs
    }

    /// Parse every reachable cookbook and aggregate the result.
    #[must_use]
    pub fn analyze(&self, ctx: &CommandContext) -> StructuralAnalysis {
        let spinner = ctx.spinner("Analyzing cookbooks");
        let files = collect_cookbooks(&self.search_dirs(), &ParseOptions::from_config(&ctx.config));
        spinner.finish_and_clear();
        StructuralAnalysis::build(files)
    }

    /// Remove the scratch directory; failures are only logged.
    pub fn cleanup(&mut self) {
        if let Some(strategy) = self.strategy.as_mut()
            && let Err(e) = strategy.cleanup()
        {
            tracing::warn!("Failed to clean up {}: {e:#}", strategy.scratch_dir().display());
        }
    }
}

/// Load the configuration named by `--config`, the environment, or the
/// default location.
///
/// # Errors
///
/// Fails when an existing configuration file is unreadable or invalid.
pub fn load_config(path: Option<&str>) -> Result<AnalyzerConfig> {
    AnalyzerConfig::load_with_optional(path).context("Failed to load configuration")
}

/// Check a `--format` value against the accepted list.
///
/// # Errors
///
/// An error naming the accepted values.
pub fn validate_format(format: &str, accepted: &[&str]) -> Result<()> {
    if accepted.contains(&format) {
        return Ok(());
    }
    Err(CbscanError::Other {
        message: format!("Invalid format '{format}'. Valid formats are: {}", accepted.join(", ")),
    }
    .into())
}
