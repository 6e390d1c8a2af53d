//! Lock-file based dependency resolution (`chef install` / `chef export`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{
    DependencySpec, ResolvedDependencies, ResolvedDependencyPath, StrategySettings,
    cookbook_name_for,
};
use crate::constants::{COOKBOOK_ARTIFACTS_DIR, POLICYFILE, POLICYFILE_LOCK};
use crate::lockfile::CookbookRegistry;
use crate::tools::{ToolCommand, ToolRunner};
use crate::utils::fs::{copy_dir, normalize_path, remove_dir_all};

/// Find `Policyfile.lock.json` in `dir` or up to `depth` ancestor levels.
#[must_use]
pub fn find_lock_file(dir: &Path, depth: usize) -> Option<PathBuf> {
    let start = if dir.is_absolute() {
        normalize_path(dir)
    } else {
        std::env::current_dir().map(|cwd| normalize_path(&cwd.join(dir))).ok()?
    };
    start.ancestors().take(depth + 1).map(|d| d.join(POLICYFILE_LOCK)).find(|p| p.is_file())
}

/// Policyfile strategy.
#[derive(Debug)]
pub struct PolicyfileStrategy<R: ToolRunner> {
    cookbook_dir: PathBuf,
    lock_path: PathBuf,
    policy_dir: PathBuf,
    registry: CookbookRegistry,
    runner: R,
    settings: StrategySettings,
}

impl<R: ToolRunner> PolicyfileStrategy<R> {
    /// Load the lock document at `lock_path` for the cookbook in `cookbook_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the lock document cannot be read or is malformed.
    pub fn new(
        cookbook_dir: &Path,
        lock_path: &Path,
        runner: R,
        settings: StrategySettings,
    ) -> Result<Self> {
        let registry = CookbookRegistry::load(lock_path)?;
        let policy_dir = lock_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self {
            cookbook_dir: cookbook_dir.to_path_buf(),
            lock_path: lock_path.to_path_buf(),
            policy_dir,
            registry,
            runner,
            settings,
        })
    }

    /// Whether a lock file is reachable from `dir`.
    #[must_use]
    pub fn can_handle(dir: &Path, depth: usize) -> bool {
        find_lock_file(dir, depth).is_some()
    }

    /// The parsed lock document.
    #[must_use]
    pub const fn registry(&self) -> &CookbookRegistry {
        &self.registry
    }

    /// Path of the lock document in use.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// `<policy-dir>/<export-dir>`.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.policy_dir.join(&self.settings.scratch_dir)
    }

    /// Cookbook name: the lock entry whose source is this directory, else metadata.
    #[must_use]
    pub fn detect_name(&self) -> String {
        self.registry
            .lookup_by_path(&self.cookbook_dir)
            .map(|record| record.name.clone())
            .unwrap_or_else(|| cookbook_name_for(&self.cookbook_dir))
    }

    /// Whether the lock pins anything besides the cookbook itself.
    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        let name = self.detect_name();
        self.registry.cookbooks().any(|record| record.name != name)
    }

    /// Dependencies of the cookbook under analysis according to the lock.
    ///
    /// When the cookbook is not in the lock (a policy-only directory), every
    /// locked cookbook is a dependency.
    #[must_use]
    pub fn locked_dependencies(&self) -> Vec<DependencySpec> {
        let name = self.detect_name();
        let records = if self.registry.get(&name).is_some() {
            self.registry.transitive_dependencies(&name)
        } else {
            self.registry.cookbooks().cloned().collect()
        };
        records
            .into_iter()
            .filter(|record| record.name != name)
            .map(|record| DependencySpec {
                name: record.name,
                version: record.version,
                identifier: Some(record.identifier),
            })
            .collect()
    }

    /// `chef install` then `chef export` into a temporary directory, copied to
    /// the export directory.
    ///
    /// # Errors
    ///
    /// Tool missing, non-zero exit, timeout, or a failed copy.
    pub async fn fetch(&mut self) -> Result<Vec<DependencySpec>> {
        self.runner.require(&self.settings.tool)?;

        let policyfile = self.policy_dir.join(POLICYFILE);
        let target = if policyfile.is_file() {
            let install = self
                .command()
                .args(["install", POLICYFILE])
                .with_context("policyfile-install");
            self.runner.run(&install).await?;
            POLICYFILE
        } else {
            tracing::debug!(
                target: "strategy",
                "No {} next to the lock; exporting {} directly",
                POLICYFILE,
                POLICYFILE_LOCK
            );
            POLICYFILE_LOCK
        };

        let staging = tempfile::TempDir::new().context("Failed to create staging directory")?;
        let staged_export = staging.path().join(&self.settings.scratch_dir);
        let export = self
            .command()
            .arg("export")
            .arg(target)
            .arg(staged_export.display().to_string())
            .arg("--force")
            .with_context("policyfile-export");
        self.runner.run(&export).await?;

        let export_dir = self.export_dir();
        remove_dir_all(&export_dir)?;
        copy_dir(&staged_export, &export_dir).with_context(|| {
            format!("Failed to copy export into {}", export_dir.display())
        })?;

        // install may rewrite the lock
        self.registry = CookbookRegistry::load(&self.lock_path)?;
        let deps = self.locked_dependencies();
        tracing::info!(
            target: "strategy",
            "Exported {} dependencies to {}",
            deps.len(),
            export_dir.display()
        );
        Ok(deps)
    }

    /// Match each dependency to `cookbook_artifacts/{name}-{identifier}`.
    #[must_use]
    pub fn dependency_paths(&self, deps: &[DependencySpec]) -> ResolvedDependencies {
        let artifacts = self.export_dir().join(COOKBOOK_ARTIFACTS_DIR);
        let mut result = ResolvedDependencies::default();

        for dep in deps {
            let identifier = dep
                .identifier
                .clone()
                .or_else(|| self.registry.get(&dep.name).map(|r| r.identifier.clone()));
            let candidate = identifier.as_ref().map(|id| artifacts.join(format!("{}-{id}", dep.name)));
            match candidate {
                Some(path) if path.is_dir() => result.resolved.push(ResolvedDependencyPath {
                    name: dep.name.clone(),
                    identifier,
                    path,
                }),
                _ => {
                    tracing::warn!(
                        target: "strategy",
                        "Dependency '{}' not found under {}",
                        dep.name,
                        artifacts.display()
                    );
                    result.missing.push(dep.name.clone());
                }
            }
        }
        result
    }

    /// Remove the export directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory exists but cannot be removed.
    pub fn cleanup(&mut self) -> Result<()> {
        let export_dir = self.export_dir();
        if export_dir.exists() {
            tracing::debug!(target: "strategy", "Removing {}", export_dir.display());
        }
        remove_dir_all(&export_dir)
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.settings.tool)
            .current_dir(&self.policy_dir)
            .with_timeout(self.settings.timeout)
    }
}
