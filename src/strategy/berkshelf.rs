//! Manifest based dependency resolution (`berks install` / `list` / `vendor`).

use anyhow::{Context, Result};
use dashmap::DashSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::{
    DependencySpec, ResolvedDependencies, ResolvedDependencyPath, StrategySettings,
    cookbook_name_for,
};
use crate::constants::{BERKS_SELF_LOCATION, BERKSFILE, METADATA_RB};
use crate::core::CbscanError;
use crate::metadata::MetadataExtractor;
use crate::tools::{ToolCommand, ToolRunner};
use crate::utils::fs::{normalize_path, remove_dir_all};

/// Cookbook directories `berks install` already ran for in this process.
static INSTALLED: LazyLock<DashSet<PathBuf>> = LazyLock::new(DashSet::new);

/// Whether `dir` holds both `Berksfile` and `metadata.rb`.
#[must_use]
pub fn has_manifest_pair(dir: &Path) -> bool {
    dir.join(BERKSFILE).is_file() && dir.join(METADATA_RB).is_file()
}

#[derive(Debug, Deserialize)]
struct BerksList {
    #[serde(default)]
    cookbooks: Vec<BerksListEntry>,
}

#[derive(Debug, Deserialize)]
struct BerksListEntry {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    location: Option<String>,
}

/// Parse `berks list --format json` output into dependencies.
///
/// The entry located at `source at .` is the cookbook itself; every other
/// entry is a dependency.
///
/// # Errors
///
/// Fails when the output is not the expected JSON shape.
pub fn parse_list_output(stdout: &str) -> Result<Vec<DependencySpec>> {
    let list: BerksList = serde_json::from_str(stdout.trim())
        .context("Unexpected output from 'berks list --format json'")?;
    Ok(list
        .cookbooks
        .into_iter()
        .filter(|entry| entry.location.as_deref() != Some(BERKS_SELF_LOCATION))
        .map(|entry| DependencySpec {
            name: entry.name,
            version: entry.version,
            identifier: None,
        })
        .collect())
}

/// Berkshelf strategy.
#[derive(Debug)]
pub struct BerkshelfStrategy<R: ToolRunner> {
    cookbook_dir: PathBuf,
    runner: R,
    settings: StrategySettings,
}

impl<R: ToolRunner> BerkshelfStrategy<R> {
    /// Create the strategy for `cookbook_dir`.
    pub fn new(cookbook_dir: &Path, runner: R, settings: StrategySettings) -> Self {
        Self {
            cookbook_dir: cookbook_dir.to_path_buf(),
            runner,
            settings,
        }
    }

    /// Whether the manifest pair is present directly in `dir`.
    #[must_use]
    pub fn can_handle(dir: &Path) -> bool {
        has_manifest_pair(dir)
    }

    /// `<cookbook-dir>/<vendor-dir>`.
    #[must_use]
    pub fn vendor_dir(&self) -> PathBuf {
        self.cookbook_dir.join(&self.settings.scratch_dir)
    }

    /// Cookbook name from `metadata.rb`, else the directory name.
    #[must_use]
    pub fn detect_name(&self) -> String {
        cookbook_name_for(&self.cookbook_dir)
    }

    /// Whether `metadata.rb` declares any `depends`.
    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        MetadataExtractor::from_dir(&self.cookbook_dir)
            .ok()
            .flatten()
            .is_some_and(|metadata| !metadata.depends.is_empty())
    }

    /// `depends` entries of `metadata.rb`; versions are the declared
    /// constraints, or empty.
    #[must_use]
    pub fn declared_dependencies(&self) -> Vec<DependencySpec> {
        MetadataExtractor::from_dir(&self.cookbook_dir)
            .ok()
            .flatten()
            .map(|metadata| {
                metadata
                    .depends
                    .into_iter()
                    .map(|(name, constraint)| DependencySpec {
                        name,
                        version: constraint.unwrap_or_default(),
                        identifier: None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Install (once per process), list, then vendor into the vendor directory.
    ///
    /// # Errors
    ///
    /// Tool missing, non-zero exit, timeout, or unparseable list output.
    pub async fn fetch(&mut self) -> Result<Vec<DependencySpec>> {
        self.runner.require(&self.settings.tool)?;

        let key = normalize_path(&self.cookbook_dir);
        if INSTALLED.contains(&key) {
            tracing::debug!(
                target: "strategy",
                "berks install already ran for {}; skipping",
                self.cookbook_dir.display()
            );
        } else {
            let install = self.command().arg("install").with_context("berks-install");
            self.runner.run(&install).await?;
            INSTALLED.insert(key);
        }

        let list = self.command().args(["list", "--format", "json"]).with_context("berks-list");
        let output = self.runner.run(&list).await?;
        let deps = parse_list_output(&output.stdout).map_err(|e| CbscanError::ToolFailed {
            tool: self.settings.tool.clone(),
            operation: "list".to_string(),
            stderr: format!("{e:#}"),
            code: None,
        })?;

        let vendor_dir = self.vendor_dir();
        // berks refuses to vendor into an existing directory
        remove_dir_all(&vendor_dir)?;
        let vendor = self
            .command()
            .arg("vendor")
            .arg(vendor_dir.display().to_string())
            .with_context("berks-vendor");
        self.runner.run(&vendor).await?;

        tracing::info!(
            target: "strategy",
            "Vendored {} dependencies to {}",
            deps.len(),
            vendor_dir.display()
        );
        Ok(deps)
    }

    /// Match each dependency to `<vendor-dir>/{name}`.
    #[must_use]
    pub fn dependency_paths(&self, deps: &[DependencySpec]) -> ResolvedDependencies {
        let vendor_dir = self.vendor_dir();
        let mut result = ResolvedDependencies::default();
        for dep in deps {
            let path = vendor_dir.join(&dep.name);
            if path.is_dir() {
                result.resolved.push(ResolvedDependencyPath {
                    name: dep.name.clone(),
                    identifier: dep.identifier.clone(),
                    path,
                });
            } else {
                tracing::warn!(
                    target: "strategy",
                    "Dependency '{}' not found under {}",
                    dep.name,
                    vendor_dir.display()
                );
                result.missing.push(dep.name.clone());
            }
        }
        result
    }

    /// Remove the vendor directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory exists but cannot be removed.
    pub fn cleanup(&mut self) -> Result<()> {
        remove_dir_all(&self.vendor_dir())
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.settings.tool)
            .current_dir(&self.cookbook_dir)
            .with_timeout(self.settings.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeRunner;
    use std::time::Duration;
    use tempfile::TempDir;

    const LIST: &str = r#"{"cookbooks": [
        {"name": "web", "version": "1.0.0", "location": "source at ."},
        {"name": "apt", "version": "7.4.0", "location": "https://supermarket.chef.io"},
        {"name": "nginx", "version": "12.0.0"}
    ]}"#;

    fn setup(runner: FakeRunner) -> (TempDir, BerkshelfStrategy<FakeRunner>) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("web");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(BERKSFILE), "source 'https://supermarket.chef.io'\nmetadata\n")
            .unwrap();
        std::fs::write(dir.join(METADATA_RB), "name 'web'\ndepends 'apt'\ndepends 'nginx'\n")
            .unwrap();
        let settings = StrategySettings {
            tool: "berks".to_string(),
            timeout: Duration::from_secs(5),
            scratch_dir: "berks-cookbooks".to_string(),
        };
        let strategy = BerkshelfStrategy::new(&dir, runner, settings);
        (temp, strategy)
    }

    #[test]
    fn test_parse_list_output_excludes_self() {
        let deps = parse_list_output(LIST).unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["apt", "nginx"]);
        assert_eq!(deps[0].version, "7.4.0");
    }

    #[test]
    fn test_parse_list_output_rejects_garbage() {
        assert!(parse_list_output("Installing apt (7.4.0)").is_err());
    }

    #[test]
    fn test_name_and_dependencies_from_metadata() {
        let (_temp, strategy) = setup(FakeRunner::new());
        assert_eq!(strategy.detect_name(), "web");
        assert!(strategy.has_dependencies());
        let declared: Vec<_> =
            strategy.declared_dependencies().into_iter().map(|d| d.name).collect();
        assert_eq!(declared, vec!["apt", "nginx"]);
    }

    #[tokio::test]
    async fn test_fetch_installs_once_and_vendors() {
        let runner = FakeRunner::new()
            .with_tool("berks")
            .respond("list", LIST)
            .materialize(["apt/recipes", "nginx"]);
        let (temp, mut strategy) = setup(runner);

        let deps = strategy.fetch().await.unwrap();
        let resolved = strategy.dependency_paths(&deps);
        assert_eq!(resolved.resolved.len(), 2);
        assert_eq!(resolved.resolved[0].path, temp.path().join("web/berks-cookbooks/apt"));

        strategy.fetch().await.unwrap();
        let ops: Vec<String> = strategy.runner.calls().iter().map(|c| c[1].clone()).collect();
        assert_eq!(ops, vec!["install", "list", "vendor", "list", "vendor"]);

        strategy.cleanup().unwrap();
        assert!(!strategy.vendor_dir().exists());
        strategy.cleanup().unwrap();
    }

    #[tokio::test]
    async fn test_missing_vendored_cookbook() {
        let runner =
            FakeRunner::new().with_tool("berks").respond("list", LIST).materialize(["apt"]);
        let (_temp, mut strategy) = setup(runner);
        let deps = strategy.fetch().await.unwrap();
        let resolved = strategy.dependency_paths(&deps);
        assert_eq!(resolved.missing, vec!["nginx"]);
    }

    #[tokio::test]
    async fn test_missing_berks_is_fatal() {
        let (_temp, mut strategy) = setup(FakeRunner::new());
        let err = strategy.fetch().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CbscanError>(), Some(CbscanError::ToolNotFound { .. })));
    }
}
