//! Dependency resolution strategies.
//!
//! A cookbook tree resolves its dependencies in one of two ways:
//!
//! - **Policyfile**: a `Policyfile.lock.json` in the cookbook directory or one
//!   of its ancestors pins every cookbook. Dependencies are exported with
//!   `chef export` and live under `cookbook_artifacts/{name}-{identifier}`.
//! - **Berkshelf**: a `Berksfile` next to `metadata.rb`. Dependencies are
//!   listed with `berks list` and vendored with `berks vendor`.
//!
//! [`DependencyStrategy::detect`] picks one by inspecting the filesystem.
//! Both variants expose the same operations; every external process goes
//! through the injected [`ToolRunner`].
//!
//! # Lifecycle
//!
//! ```text
//! detect -> fetch -> dependency_paths -> ... -> cleanup
//! ```
//!
//! `cleanup` removes the scratch directory the strategy created and may be
//! called any number of times, including when `fetch` never ran. Two
//! concurrent fetches against the same policy directory collide on the
//! fixed-name export directory; callers serialize them.

pub mod berkshelf;
pub mod policyfile;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use berkshelf::BerkshelfStrategy;
pub use policyfile::PolicyfileStrategy;

use crate::config::AnalyzerConfig;
use crate::constants::{BERKSFILE, METADATA_RB, POLICYFILE_LOCK};
use crate::core::CbscanError;
use crate::metadata::MetadataExtractor;
use crate::tools::ToolRunner;

/// A dependency reported by a strategy's fetch step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    /// Cookbook name
    pub name: String,
    /// Resolved version
    pub version: String,
    /// Content identifier (lock-file strategy only)
    pub identifier: Option<String>,
}

/// A dependency materialized on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependencyPath {
    /// Cookbook name
    pub name: String,
    /// Content identifier, when known
    pub identifier: Option<String>,
    /// Absolute directory holding the cookbook's files
    pub path: PathBuf,
}

/// Outcome of [`DependencyStrategy::dependency_paths`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedDependencies {
    /// Dependencies found on disk, in request order
    pub resolved: Vec<ResolvedDependencyPath>,
    /// Names whose directory was not found
    pub missing: Vec<String>,
}

/// Settings shared by both strategies.
#[derive(Debug, Clone)]
pub struct StrategySettings {
    /// Executable for the strategy's tool
    pub tool: String,
    /// Per-invocation timeout
    pub timeout: Duration,
    /// Fixed name of the export/vendor directory
    pub scratch_dir: String,
}

/// Which strategy applies to a directory, without constructing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    /// Lock file found at the given path
    Policyfile(PathBuf),
    /// `Berksfile` + `metadata.rb` in the cookbook directory
    Berkshelf,
}

/// The strategy selected for a cookbook directory.
#[derive(Debug)]
pub enum DependencyStrategy<R: ToolRunner> {
    /// Lock-file based resolution
    Policyfile(PolicyfileStrategy<R>),
    /// Manifest based resolution
    Berkshelf(BerkshelfStrategy<R>),
}

/// Inspect `cookbook_dir` (and ancestors, for the lock file) without side effects.
///
/// A lock file takes precedence over a manifest pair.
#[must_use]
pub fn classify(cookbook_dir: &Path, search_depth: usize) -> Option<StrategyKind> {
    if let Some(lock) = policyfile::find_lock_file(cookbook_dir, search_depth) {
        return Some(StrategyKind::Policyfile(lock));
    }
    if berkshelf::has_manifest_pair(cookbook_dir) {
        return Some(StrategyKind::Berkshelf);
    }
    None
}

impl<R: ToolRunner> DependencyStrategy<R> {
    /// Select and construct the strategy for `cookbook_dir`.
    ///
    /// # Errors
    ///
    /// [`CbscanError::NoStrategyDetected`] listing the expected marker files
    /// when neither strategy applies; a malformed lock file is reported as
    /// [`CbscanError::MalformedLockFile`].
    pub fn detect(cookbook_dir: &Path, runner: R, config: &AnalyzerConfig) -> Result<Self> {
        let timeout = config.tools.timeout();
        match classify(cookbook_dir, config.lockfile.search_depth) {
            Some(StrategyKind::Policyfile(lock_path)) => {
                tracing::info!(
                    target: "strategy",
                    "Using Policyfile strategy for {} (lock: {})",
                    cookbook_dir.display(),
                    lock_path.display()
                );
                let settings = StrategySettings {
                    tool: config.tools.chef.clone(),
                    timeout,
                    scratch_dir: config.workspace.export_dir.clone(),
                };
                Ok(Self::Policyfile(PolicyfileStrategy::new(
                    cookbook_dir,
                    &lock_path,
                    runner,
                    settings,
                )?))
            }
            Some(StrategyKind::Berkshelf) => {
                tracing::info!(
                    target: "strategy",
                    "Using Berkshelf strategy for {}",
                    cookbook_dir.display()
                );
                let settings = StrategySettings {
                    tool: config.tools.berks.clone(),
                    timeout,
                    scratch_dir: config.workspace.vendor_dir.clone(),
                };
                Ok(Self::Berkshelf(BerkshelfStrategy::new(cookbook_dir, runner, settings)))
            }
            None => Err(CbscanError::NoStrategyDetected {
                path: cookbook_dir.display().to_string(),
                expected: expected_markers(config.lockfile.search_depth),
            }
            .into()),
        }
    }

    /// Short strategy name for logs and reports.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Policyfile(_) => "policyfile",
            Self::Berkshelf(_) => "berkshelf",
        }
    }

    /// Whether this strategy's markers are present for `dir`.
    #[must_use]
    pub fn can_handle(&self, dir: &Path, search_depth: usize) -> bool {
        match self {
            Self::Policyfile(_) => policyfile::find_lock_file(dir, search_depth).is_some(),
            Self::Berkshelf(_) => berkshelf::has_manifest_pair(dir),
        }
    }

    /// Name of the cookbook under analysis.
    #[must_use]
    pub fn detect_name(&self) -> String {
        match self {
            Self::Policyfile(s) => s.detect_name(),
            Self::Berkshelf(s) => s.detect_name(),
        }
    }

    /// Whether the cookbook declares any dependency, without running tools.
    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        match self {
            Self::Policyfile(s) => s.has_dependencies(),
            Self::Berkshelf(s) => s.has_dependencies(),
        }
    }

    /// Dependencies known without running any tool: the lock's closure, or
    /// the `depends` lines of `metadata.rb`.
    #[must_use]
    pub fn declared_dependencies(&self) -> Vec<DependencySpec> {
        match self {
            Self::Policyfile(s) => s.locked_dependencies(),
            Self::Berkshelf(s) => s.declared_dependencies(),
        }
    }

    /// Run the external tool and materialize dependencies on disk.
    ///
    /// # Errors
    ///
    /// [`CbscanError::ToolNotFound`], [`CbscanError::ToolFailed`] or
    /// [`CbscanError::ToolTimeout`]; never an empty success in their place.
    pub async fn fetch(&mut self) -> Result<Vec<DependencySpec>> {
        match self {
            Self::Policyfile(s) => s.fetch().await,
            Self::Berkshelf(s) => s.fetch().await,
        }
    }

    /// Map dependencies to their on-disk directories.
    ///
    /// Missing directories are logged and reported in
    /// [`ResolvedDependencies::missing`].
    #[must_use]
    pub fn dependency_paths(&self, deps: &[DependencySpec]) -> ResolvedDependencies {
        match self {
            Self::Policyfile(s) => s.dependency_paths(deps),
            Self::Berkshelf(s) => s.dependency_paths(deps),
        }
    }

    /// Directory the fetch step writes into.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        match self {
            Self::Policyfile(s) => s.export_dir(),
            Self::Berkshelf(s) => s.vendor_dir(),
        }
    }

    /// Remove the scratch directory. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails only if an existing directory cannot be removed.
    pub fn cleanup(&mut self) -> Result<()> {
        match self {
            Self::Policyfile(s) => s.cleanup(),
            Self::Berkshelf(s) => s.cleanup(),
        }
    }
}

fn expected_markers(search_depth: usize) -> Vec<String> {
    vec![
        format!("{POLICYFILE_LOCK} (in the directory or up to {search_depth} parent levels)"),
        format!("{BERKSFILE} + {METADATA_RB}"),
    ]
}

/// Cookbook name for `dir`: declared metadata name, else the directory name.
pub(crate) fn cookbook_name_for(dir: &Path) -> String {
    MetadataExtractor::cookbook_name(dir).unwrap_or_else(|| {
        dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeRunner;
    use tempfile::tempdir;

    #[test]
    fn test_classify_prefers_lock_file() {
        let temp = tempdir().unwrap();
        let cookbook = temp.path().join("cookbooks").join("web");
        std::fs::create_dir_all(&cookbook).unwrap();
        std::fs::write(cookbook.join(BERKSFILE), "").unwrap();
        std::fs::write(cookbook.join(METADATA_RB), "name 'web'").unwrap();
        assert_eq!(classify(&cookbook, 5), Some(StrategyKind::Berkshelf));

        std::fs::write(temp.path().join(POLICYFILE_LOCK), "{}").unwrap();
        assert_eq!(
            classify(&cookbook, 5),
            Some(StrategyKind::Policyfile(temp.path().join(POLICYFILE_LOCK)))
        );
    }

    #[test]
    fn test_detect_none_lists_markers() {
        let temp = tempdir().unwrap();
        let err = DependencyStrategy::detect(
            temp.path(),
            FakeRunner::new(),
            &AnalyzerConfig::default(),
        )
        .unwrap_err();
        match err.downcast_ref::<CbscanError>() {
            Some(CbscanError::NoStrategyDetected { expected, .. }) => {
                assert_eq!(expected.len(), 2);
                assert!(expected[0].contains(POLICYFILE_LOCK));
                assert!(expected[1].contains(BERKSFILE));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_berksfile_without_metadata_is_not_handled() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(BERKSFILE), "").unwrap();
        assert_eq!(classify(temp.path(), 5), None);
    }

    #[test]
    fn test_cookbook_name_for_falls_back_to_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("my_cookbook");
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(cookbook_name_for(&dir), "my_cookbook");
        std::fs::write(dir.join(METADATA_RB), "name 'declared'").unwrap();
        assert_eq!(cookbook_name_for(&dir), "declared");
    }
}
